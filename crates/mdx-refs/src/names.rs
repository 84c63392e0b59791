//! Index name validation.
//!
//! Valid index names:
//! - Must be non-empty
//! - Must not contain whitespace, control characters, `:`, `*`, `?` or `\`
//! - Must not contain `..`
//! - Must not start or end with `/`
//! - Must not contain consecutive slashes (`//`)

use crate::error::{RegistryError, Result};

/// Characters that are forbidden anywhere in an index name.
const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', ':', '?', '*', '\\'];

fn invalid(name: &str, reason: impl Into<String>) -> RegistryError {
    RegistryError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate an index name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use mdx_refs::names::validate_index_name;
///
/// assert!(validate_index_name("orders").is_ok());
/// assert!(validate_index_name("orders/by_customer").is_ok());
/// assert!(validate_index_name("").is_err());
/// assert!(validate_index_name("bad..name").is_err());
/// ```
pub fn validate_index_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "index name must not be empty"));
    }

    for ch in FORBIDDEN_CHARS {
        if name.contains(*ch) {
            return Err(invalid(
                name,
                format!("contains forbidden character: {ch:?}"),
            ));
        }
    }
    if name.chars().any(char::is_control) {
        return Err(invalid(name, "contains a control character"));
    }

    if name.contains("..") {
        return Err(invalid(name, "must not contain '..'"));
    }

    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid(name, "must not start or end with '/'"));
    }

    if name.contains("//") {
        return Err(invalid(name, "must not contain consecutive slashes '//'"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_simple_names() {
        assert!(validate_index_name("orders").is_ok());
        assert!(validate_index_name("orders_v2").is_ok());
        assert!(validate_index_name("users.email").is_ok());
    }

    #[test]
    fn valid_nested_names() {
        assert!(validate_index_name("shop/orders/by_customer").is_ok());
    }

    #[test]
    fn reject_empty_name() {
        assert!(validate_index_name("").is_err());
    }

    #[test]
    fn reject_double_dot() {
        assert!(validate_index_name("a..b").is_err());
    }

    #[test]
    fn reject_whitespace_and_control() {
        assert!(validate_index_name("has space").is_err());
        assert!(validate_index_name("has\ttab").is_err());
        assert!(validate_index_name("bell\u{7}").is_err());
    }

    #[test]
    fn reject_forbidden_chars() {
        assert!(validate_index_name("a:b").is_err());
        assert!(validate_index_name("a?b").is_err());
        assert!(validate_index_name("a*b").is_err());
        assert!(validate_index_name("a\\b").is_err());
    }

    #[test]
    fn reject_slash_boundaries() {
        assert!(validate_index_name("/leading").is_err());
        assert!(validate_index_name("trailing/").is_err());
        assert!(validate_index_name("a//b").is_err());
    }

    #[test]
    fn error_carries_reason() {
        let err = validate_index_name("a..b").unwrap_err();
        assert!(err.to_string().contains("'..'"));
    }
}
