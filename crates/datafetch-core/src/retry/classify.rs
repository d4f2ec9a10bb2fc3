//! Map HTTP status codes and curl errors onto retry `ErrorKind`s.

use crate::retry::policy::ErrorKind;

/// Implemented by adapter errors so `run_with_retry` can decide on them.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// 408 counts as a timeout; job APIs and S3 answer 429/503 when overloaded.
pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        408 => ErrorKind::Timeout,
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Other,
    }
}

pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        ErrorKind::Timeout
    } else if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_ssl_connect_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        ErrorKind::Connection
    } else {
        // Local write errors, aborted callbacks, malformed URLs.
        ErrorKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_kinds() {
        for (code, kind) in [
            (408, ErrorKind::Timeout),
            (429, ErrorKind::Throttled),
            (503, ErrorKind::Throttled),
            (500, ErrorKind::Http5xx(500)),
            (502, ErrorKind::Http5xx(502)),
            (401, ErrorKind::Other),
            (403, ErrorKind::Other),
            (404, ErrorKind::Other),
        ] {
            assert_eq!(classify_http_status(code), kind, "HTTP {code}");
        }
    }

    #[test]
    fn curl_error_kinds() {
        // CURLE_OPERATION_TIMEDOUT, CURLE_COULDNT_CONNECT, CURLE_PARTIAL_FILE, CURLE_WRITE_ERROR
        assert_eq!(classify_curl_error(&curl::Error::new(28)), ErrorKind::Timeout);
        assert_eq!(classify_curl_error(&curl::Error::new(7)), ErrorKind::Connection);
        assert_eq!(classify_curl_error(&curl::Error::new(18)), ErrorKind::Connection);
        assert_eq!(classify_curl_error(&curl::Error::new(23)), ErrorKind::Other);
    }
}
