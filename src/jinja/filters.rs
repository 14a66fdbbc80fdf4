//! Custom expression filters.
//!
//! The recipe dialect ships a handful of filters beyond the engine
//! built-ins. Only the ones the compatibility layer needs are registered
//! here; everything else (`replace`, `length`, `join`, `default`, ...)
//! comes from the engine.

use minijinja::Value;

use super::undefined;

/// `version_to_buildstring`: collapse a version to its build-string form.
///
/// `"1.2.3"` becomes `"12"` (first two segments, dots dropped). A value
/// with fewer than two segments passes through unchanged. A missing
/// sentinel stays a sentinel: `python_undefined` becomes
/// `python_version_to_build_string`, mirroring how the placeholder
/// convention survives filter application.
pub fn version_to_buildstring(value: Value) -> String {
    if let Some(s) = value.as_str() {
        if let Some(name) = undefined::strip_sentinel(s) {
            return format!("{name}_version_to_build_string");
        }
        return to_build_string(s);
    }
    to_build_string(&value.to_string())
}

fn to_build_string(version: &str) -> String {
    let mut parts = version.split('.');
    match (parts.next(), parts.next()) {
        (Some(major), Some(minor)) => format!("{major}{minor}"),
        _ => version.to_string(),
    }
}

/// `split`: split a string on a separator.
///
/// Recipes always pass the separator explicitly (`version | split(".")`);
/// the single-space default mirrors the legacy engine.
pub fn split(value: String, sep: Option<String>) -> Value {
    let sep = sep.unwrap_or_else(|| " ".to_string());
    Value::from(
        value
            .split(sep.as_str())
            .map(Value::from)
            .collect::<Vec<Value>>(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_to_build_string() {
        assert_eq!(version_to_buildstring(Value::from("1.2.3")), "12");
        assert_eq!(version_to_buildstring(Value::from("1.2")), "12");
        assert_eq!(version_to_buildstring(Value::from("nothing")), "nothing");
    }

    #[test]
    fn test_version_to_build_string_of_missing() {
        let missing = Value::from(undefined::sentinel("python"));
        assert_eq!(
            version_to_buildstring(missing),
            "python_version_to_build_string"
        );
    }

    #[test]
    fn test_split() {
        let parts = split("0.2025.39".to_string(), Some(".".to_string()));
        assert_eq!(parts.len().unwrap_or_default(), 3);
    }
}
