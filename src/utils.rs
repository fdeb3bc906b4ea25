//! Small helpers shared by the workloads.

use crate::error::RecordError;
use bytes::{BufMut, Bytes, BytesMut};
use regex::Regex;
use std::sync::OnceLock;

/// Borrow a byte slice as `&str`.
///
/// Returns an error if the slice contains invalid UTF-8.
pub fn str_from_bytes(buf: &[u8]) -> Result<&str, RecordError> {
    Ok(std::str::from_utf8(buf)?)
}

/// Convert a line to [`Bytes`], terminated by a newline.
pub fn line_to_bytes(line: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(line.len() + 1);
    buf.put_slice(line.as_bytes());
    buf.put_u8(b'\n');
    buf.freeze()
}

/// Whether `s` begins with a URL scheme token such as `http:` or `ftp:`.
pub fn has_url_scheme(s: &str) -> bool {
    static SCHEME: OnceLock<Regex> = OnceLock::new();
    SCHEME
        .get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").expect("valid scheme regex"))
        .is_match(s)
}
