//! `HttpPathExtractor` — default `PathExtractor` implementation.
//!
//! Parses the request line with `httparse` and hands back the path
//! component of the target. Headers are parsed only as far as needed to
//! reach the path; a request whose header block is cut off by the fixed
//! receive buffer still yields its path.

use fsrv_core::error::{Result, ServeError};
use fsrv_core::request::PathExtractor;

/// Headers inspected per request. More than this is not an error; the
/// path is already known by the time the limit is hit.
const MAX_HEADERS: usize = 32;

#[derive(Debug, Default, Clone, Copy)]
pub struct HttpPathExtractor;

impl HttpPathExtractor {
    pub fn new() -> Self {
        Self
    }
}

/// Reduce a request target to its path: drop any scheme/authority of an
/// absolute-form target, then the query string and fragment.
fn path_of(target: &str) -> &str {
    let rest = target
        .strip_prefix("http://")
        .or_else(|| target.strip_prefix("https://"));
    let target = match rest {
        Some(rest) => match rest.find('/') {
            Some(i) => &rest[i..],
            None => "/",
        },
        None => target,
    };
    let end = target.find(['?', '#']).unwrap_or(target.len());
    &target[..end]
}

impl PathExtractor for HttpPathExtractor {
    fn extract(&self, raw: &[u8]) -> Result<String> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);

        // httparse fills `path` as soon as the request line is through,
        // even when the header block is partial or oversized.
        let outcome = req.parse(raw);
        match (req.path, outcome) {
            (Some(target), _) => {
                let path = path_of(target);
                if path.is_empty() {
                    return Err(ServeError::BadRequest(format!("empty path in {target:?}")));
                }
                Ok(path.to_owned())
            }
            (None, Ok(httparse::Status::Partial)) => {
                Err(ServeError::BadRequest("incomplete request line".into()))
            }
            (None, Ok(httparse::Status::Complete(_))) => {
                Err(ServeError::BadRequest("request has no target".into()))
            }
            (None, Err(e)) => Err(ServeError::BadRequest(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(raw: &[u8]) -> Result<String> {
        HttpPathExtractor::new().extract(raw)
    }

    #[test]
    fn simple_get() {
        assert_eq!(
            extract(b"GET /static/a.bin HTTP/1.0\r\n\r\n").unwrap(),
            "/static/a.bin"
        );
    }

    #[test]
    fn query_and_fragment_are_stripped() {
        assert_eq!(extract(b"GET /x.txt?v=2#top HTTP/1.0\r\n\r\n").unwrap(), "/x.txt");
        assert_eq!(extract(b"GET /y#frag HTTP/1.1\r\n\r\n").unwrap(), "/y");
    }

    #[test]
    fn absolute_form_keeps_only_path() {
        assert_eq!(
            extract(b"GET http://example.com/static/z HTTP/1.0\r\n\r\n").unwrap(),
            "/static/z"
        );
        assert_eq!(extract(b"GET http://example.com HTTP/1.0\r\n\r\n").unwrap(), "/");
    }

    #[test]
    fn truncated_headers_still_yield_path() {
        assert_eq!(
            extract(b"GET /big HTTP/1.0\r\nHost: a\r\nX-Long: aaaa").unwrap(),
            "/big"
        );
    }

    #[test]
    fn too_many_headers_still_yield_path() {
        let mut raw = b"GET /many HTTP/1.0\r\n".to_vec();
        for i in 0..(MAX_HEADERS + 4) {
            raw.extend_from_slice(format!("X-{i}: v\r\n").as_bytes());
        }
        raw.extend_from_slice(b"\r\n");
        assert_eq!(extract(&raw).unwrap(), "/many");
    }

    #[test]
    fn garbage_is_bad_request() {
        assert!(matches!(extract(b"\x00\x01\x02\r\n\r\n"), Err(ServeError::BadRequest(_))));
        assert!(matches!(extract(b"GET"), Err(ServeError::BadRequest(_))));
        assert!(matches!(extract(b"GET ?q HTTP/1.0\r\n\r\n"), Err(ServeError::BadRequest(_))));
    }
}
