//! Response framing.
//!
//! Only two responses exist and neither carries headers. The body, if
//! any, follows directly and the connection close marks its end.

pub const STATUS_OK: &[u8] = b"HTTP/1.0 200 OK\r\n\r\n";
pub const STATUS_NOT_FOUND: &[u8] = b"HTTP/1.0 404 Not Found\r\n\r\n";

/// Status line for a request whose file did (`true`) or did not open.
#[inline]
pub fn status_line(found: bool) -> &'static [u8] {
    if found {
        STATUS_OK
    } else {
        STATUS_NOT_FOUND
    }
}
