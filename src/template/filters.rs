//! Custom filters for manifest templates
//!
//! - `base64_encode`: Encode string to base64 (Secret data)
//! - `upper` / `lower`: Case conversion

use base64::{engine::general_purpose::STANDARD, Engine};

/// Base64 encode filter
///
/// Usage: `{{ value | base64_encode }}`
pub fn base64_encode(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}

/// Upper case filter
pub fn upper(value: &str) -> String {
    value.to_uppercase()
}

/// Lower case filter
pub fn lower(value: &str) -> String {
    value.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_encode() {
        assert_eq!(base64_encode("hello"), "aGVsbG8=");
        assert_eq!(base64_encode(""), "");
    }

    #[test]
    fn test_case_filters() {
        assert_eq!(upper("Web"), "WEB");
        assert_eq!(lower("Web"), "web");
    }
}
