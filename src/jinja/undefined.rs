//! Missing-value sentinels for unresolved name references.
//!
//! A reference to a name that is neither seeded nor defined earlier in the
//! context block does not fail the render. It resolves to a sentinel string
//! that propagates through string operations as a visibly-distinguishable
//! placeholder, so a consumer can detect an incomplete render without a
//! crash. Recipes are routinely rendered outside their full build context
//! (e.g. for metadata inspection), which is why this is not an error path.

/// The diagnostic placeholder for an unresolved name.
pub fn sentinel(name: &str) -> String {
    format!("{name}_undefined")
}

/// If `value` is a sentinel placeholder, returns the name it stands for.
///
/// Used by filters that want to mirror the placeholder convention instead
/// of mangling it (see [`crate::jinja::filters::version_to_buildstring`]).
pub fn strip_sentinel(value: &str) -> Option<&str> {
    let name = value.strip_suffix("_undefined")?;
    if !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Some(name)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_round_trip() {
        assert_eq!(sentinel("python"), "python_undefined");
        assert_eq!(strip_sentinel("python_undefined"), Some("python"));
    }

    #[test]
    fn test_strip_sentinel_rejects_ordinary_strings() {
        assert_eq!(strip_sentinel("not a sentinel"), None);
        assert_eq!(strip_sentinel("has spaces_undefined"), None);
        assert_eq!(strip_sentinel("_undefined"), None);
    }
}
