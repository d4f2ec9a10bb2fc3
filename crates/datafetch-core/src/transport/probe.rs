//! HTTP HEAD probing (availability checks).

use super::headers::ResponseHeaders;
use super::{CurlOptions, TransportError};
use std::str;

/// HEAD `url`; returns the status code and the final response headers.
/// Non-2xx codes are returned, not raised, so callers can treat 404 as "absent".
pub fn probe(url: &str, curl: &CurlOptions) -> Result<(u32, ResponseHeaders), TransportError> {
    let mut lines: Vec<String> = Vec::new();

    let mut easy = curl.easy(url)?;
    easy.nobody(true)?;

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                lines.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.perform()?;
    }

    let code = easy.response_code()?;
    let headers = ResponseHeaders::parse(lines.iter().map(String::as_str));
    tracing::debug!(url, code, content_length = ?headers.content_length, "HEAD probe");
    Ok((code, headers))
}
