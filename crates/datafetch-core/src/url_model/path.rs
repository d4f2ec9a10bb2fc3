//! URL path handling.

/// Last non-empty path segment of `url`, ignoring query and fragment.
/// `None` if the URL cannot be parsed or has no usable segment.
pub fn filename_from_url_path(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}

/// Join an optional base URL and an optional suffix with exactly one `/`.
///
/// Both present: `base/suffix`; only one: that one; neither: `None`.
pub fn join_url(base: Option<&str>, suffix: Option<&str>) -> Option<String> {
    let base = base.filter(|s| !s.is_empty());
    let suffix = suffix.filter(|s| !s.is_empty());
    match (base, suffix) {
        (Some(b), Some(s)) => Some(format!(
            "{}/{}",
            b.trim_end_matches('/'),
            s.trim_start_matches('/')
        )),
        (Some(b), None) => Some(b.to_string()),
        (None, Some(s)) => Some(s.to_string()),
        (None, None) => None,
    }
}
