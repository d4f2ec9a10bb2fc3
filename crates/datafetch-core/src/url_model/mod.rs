//! URL helpers: joining base URLs with suffixes and deriving local filenames.

mod path;
mod sanitize;

pub use path::{filename_from_url_path, join_url};
pub use sanitize::sanitize_filename_for_linux;

/// Default filename when the URL path yields nothing usable.
pub const DEFAULT_FILENAME: &str = "download.bin";

/// Local filename for a download from `url`: the last path segment,
/// sanitized, or `download.bin`.
///
/// - `derive_filename("http://host/f")` → `"f"`
/// - `derive_filename("https://example.com/a/b/era5.nc?sig=1")` → `"era5.nc"`
pub fn derive_filename(url: &str) -> String {
    let Some(raw) = filename_from_url_path(url) else {
        return DEFAULT_FILENAME.to_string();
    };
    let sanitized = sanitize_filename_for_linux(&raw);
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_filename_from_url_path() {
        assert_eq!(derive_filename("http://host/f"), "f");
        assert_eq!(
            derive_filename("https://download.example.com/cache/adaptor-1234.grib"),
            "adaptor-1234.grib"
        );
    }

    #[test]
    fn derive_filename_empty_path_fallback() {
        assert_eq!(derive_filename("https://example.com/"), DEFAULT_FILENAME);
        assert_eq!(derive_filename("https://example.com"), DEFAULT_FILENAME);
        assert_eq!(derive_filename("not a url"), DEFAULT_FILENAME);
    }

    #[test]
    fn derive_filename_sanitizes() {
        assert_eq!(derive_filename("https://example.com/my%20file.nc"), "my%20file.nc");
        assert_eq!(derive_filename("https://example.com/..."), DEFAULT_FILENAME);
    }
}
