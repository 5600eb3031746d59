//! Request-path extraction abstraction.
//!
//! The core does not interpret HTTP beyond the request path. Whatever
//! parses the raw bytes returns the path by value; the connection keeps
//! it, so nothing is shared between requests.
//!
//! # Implementors
//!
//! - `HttpPathExtractor` (default): `httparse`-based, strips query and fragment.

use crate::error::Result;

pub trait PathExtractor {
    /// Extract the request path from one received buffer.
    ///
    /// Returns `ServeError::BadRequest` when no request line can be found.
    fn extract(&self, raw: &[u8]) -> Result<String>;
}
