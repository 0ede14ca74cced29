//! Object key validation.
//!
//! Object keys are `/`-separated strings relative to a bucket root. This
//! module makes sure they never escape that root.

use crate::error::{ErrorKind, Result};

/// Validates and normalizes an object key.
///
/// Empty segments and `.` are dropped, `..` pops the previous segment (but
/// may never leave the bucket root). Null bytes are rejected.
///
/// # Examples
///
/// ```
/// use sitenav_remote::validate_key;
/// assert_eq!(validate_key("avatars/abc-1700000000000.png").unwrap(), "avatars/abc-1700000000000.png");
/// assert_eq!(validate_key("/avatars//./x.png/").unwrap(), "avatars/x.png");
/// assert_eq!(validate_key("avatars/tmp/../x.png").unwrap(), "avatars/x.png");
/// assert!(validate_key("../secrets").is_err());
/// assert!(validate_key("a\0b").is_err());
/// assert!(validate_key("./").is_err());
/// ```
pub fn validate(key: impl AsRef<str>) -> Result<String> {
    let key = key.as_ref();
    if key.contains('\0') {
        exn::bail!(ErrorKind::InvalidKey(key.to_string()));
    }
    let mut segments: Vec<&str> = Vec::new();
    for segment in key.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                if segments.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidKey(key.to_string()));
                }
            },
            normal => segments.push(normal),
        }
    }
    match segments.is_empty() {
        true => exn::bail!(ErrorKind::InvalidKey(key.to_string())),
        false => Ok(segments.join("/")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("avatars/u1-1.png", "avatars/u1-1.png")]
    #[case("a//b//c", "a/b/c")]
    #[case("a/./b/./c", "a/b/c")]
    #[case("a/b/..", "a")]
    #[case("avatars///", "avatars")]
    fn test_valid_keys(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(validate(key).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("//")]
    #[case("..")]
    #[case("a/../../b")]
    #[case("\0")]
    fn test_invalid_keys(#[case] key: &str) {
        assert!(matches!(&*validate(key).unwrap_err(), ErrorKind::InvalidKey(_)));
    }

    #[test]
    fn test_backslashes_are_not_separators() {
        assert_eq!(validate("a\\b").unwrap(), "a\\b");
    }
}
