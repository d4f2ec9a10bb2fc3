//! Linux-safe filename sanitization.

/// Linux NAME_MAX in bytes.
const NAME_MAX: usize = 255;

fn is_forbidden(c: char) -> bool {
    c == '\0' || c == '/' || c == '\\' || c.is_control() || c == ' ' || c == '\t'
}

/// Make a candidate filename safe for a Linux filesystem.
///
/// Forbidden characters (NUL, separators, control chars, blanks) become a
/// single `_` per run; leading/trailing dots and underscores are trimmed;
/// the result is cut at a char boundary to at most 255 bytes.
pub fn sanitize_filename_for_linux(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if is_forbidden(c) {
            if !out.ends_with('_') {
                out.push('_');
            }
        } else {
            out.push(c);
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    let mut end = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}
