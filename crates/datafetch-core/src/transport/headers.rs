//! Response header collection and parsing.

/// Headers of the final response (after redirects) that the adapters care about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl ResponseHeaders {
    /// Parse raw header lines as handed over by curl's header callback.
    /// A status line (`HTTP/...`) starts a new response, so with redirects only
    /// the last response's headers are kept.
    pub fn parse<'a, I>(lines: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = ResponseHeaders::default();
        for line in lines {
            let line = line.trim();
            if line.starts_with("HTTP/") {
                out = ResponseHeaders::default();
                continue;
            }
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let (name, value) = (name.trim(), value.trim());
            if name.eq_ignore_ascii_case("content-length") {
                out.content_length = value.parse::<u64>().ok();
            } else if name.eq_ignore_ascii_case("content-type") {
                out.content_type = Some(value.to_string());
            } else if name.eq_ignore_ascii_case("etag") {
                out.etag = Some(value.trim_matches('"').to_string());
            } else if name.eq_ignore_ascii_case("last-modified") {
                out.last_modified = Some(value.to_string());
            }
        }
        out
    }
}
