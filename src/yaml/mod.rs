//! Scalar-typed YAML document model for recipe-compat
//!
//! This module provides the ordered tree representation used for every
//! document the crate touches: recipes, variant configs, and rendered
//! output. The model exists because the two recipe dialects disagree about
//! scalar typing, and a plain serde value tree erases exactly the
//! information the compatibility contract needs:
//!
//! - **Floats stay text.** A scalar written `0.02` or `3.10` in the source
//!   is kept as its original string form ([`ScalarValue::Float`]) so that
//!   re-serialization never reformats it and variant values like `"3.10"`
//!   never collapse to `3.1`.
//! - **Quoting is remembered.** Legacy variant configs stringify booleans,
//!   so a *plain* string `true`/`false` is re-emitted as a native boolean on
//!   dump, while an explicitly quoted `'true'` stays a string.
//! - **Order is preserved.** Mappings keep insertion order; re-serializing
//!   an unmodified document yields identical key order.
//!
//! Parsing is done with `marked-yaml`, which refuses to coerce quoted
//! scalars - that refusal is what lets the loader reconstruct the quoting
//! flag. Emission is a small custom pass in [`emit`] because the coercion
//! rules above are per-document codec behavior, not a serialization of Rust
//! types.

mod emit;

pub use emit::dump_str;

use crate::core::{RecipeError, Result};

/// The typed payload of a scalar node
///
/// The type tag is independent of the textual form the scalar had in the
/// source document. Note that floats carry their *source text*, not an
/// `f64`, to avoid precision loss and reformatting on round-trip.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// A plain string
    Str(String),
    /// A native boolean (`true`/`false` written unquoted)
    Bool(bool),
    /// A native integer
    Int(i64),
    /// A float, kept as its original textual form
    Float(String),
    /// An explicit or implicit null
    Null,
    /// An unresolved name reference, carrying the name that was missing
    ///
    /// Produced by expression evaluation, never by the parser. Stringifies
    /// to the diagnostic placeholder `<name>_undefined`.
    Missing(String),
}

impl ScalarValue {
    /// The string form used when a value is substituted into a larger string
    /// or surfaced in a legacy variant dictionary.
    ///
    /// Booleans intentionally render as lowercase `true`/`false` (the legacy
    /// variant-config convention), floats keep their source text, and
    /// missing sentinels render as their diagnostic placeholder.
    pub fn as_variant_string(&self) -> String {
        match self {
            ScalarValue::Str(s) => s.clone(),
            ScalarValue::Bool(b) => b.to_string(),
            ScalarValue::Int(i) => i.to_string(),
            ScalarValue::Float(text) => text.clone(),
            ScalarValue::Null => String::new(),
            ScalarValue::Missing(name) => crate::jinja::undefined::sentinel(name),
        }
    }

    /// Returns the string payload if this is a plain string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// One scalar node: a typed value plus its quoting flag
///
/// The quoting flag only matters for [`ScalarValue::Str`]: a quoted string
/// keeps its quotes on re-emission and is exempt from the boolean
/// re-coercion rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Scalar {
    /// The typed payload
    pub value: ScalarValue,
    /// Whether the scalar was explicitly quoted in the source
    pub quoted: bool,
}

impl Scalar {
    /// A plain (unquoted) scalar.
    pub fn new(value: ScalarValue) -> Self {
        Self {
            value,
            quoted: false,
        }
    }

    /// An explicitly quoted string scalar.
    pub fn quoted_str(value: impl Into<String>) -> Self {
        Self {
            value: ScalarValue::Str(value.into()),
            quoted: true,
        }
    }
}

/// An ordered mapping of string keys to nodes
///
/// Backed by an insertion-ordered list: recipe mappings are small and their
/// declaration order is semantically meaningful (context entries resolve
/// forward-only, outputs expand in order), so order preservation matters
/// more than lookup complexity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mapping {
    entries: Vec<(String, Node)>,
}

impl Mapping {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a value by key.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns whether the mapping contains `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Inserts a key, replacing an existing entry in place (preserving its
    /// position) or appending a new one.
    pub fn insert(&mut self, key: impl Into<String>, value: Node) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the mapping has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One node of a recipe document tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// An ordered key/value mapping
    Mapping(Mapping),
    /// A sequence of nodes
    Sequence(Vec<Node>),
    /// A typed scalar
    Scalar(Scalar),
}

impl Node {
    /// A plain string scalar node.
    pub fn string(value: impl Into<String>) -> Self {
        Node::Scalar(Scalar::new(ScalarValue::Str(value.into())))
    }

    /// A scalar node from a typed value.
    pub fn scalar(value: ScalarValue) -> Self {
        Node::Scalar(Scalar::new(value))
    }

    /// Returns the mapping if this node is one.
    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Node::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the sequence if this node is one.
    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Node::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the scalar if this node is one.
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Node::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the string payload of a plain string scalar node.
    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(|s| s.value.as_str())
    }

    /// Mapping lookup shorthand: `node.get("package")` on a mapping node.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_mapping().and_then(|m| m.get(key))
    }
}

/// Parses YAML source text into a [`Node`] tree.
///
/// Applies the compatibility typing rules described in the module docs:
/// unquoted `true`/`false` become [`ScalarValue::Bool`], unquoted integers
/// become [`ScalarValue::Int`], unquoted floats keep their source text as
/// [`ScalarValue::Float`], and quoted scalars always stay strings with the
/// quoting flag set.
///
/// # Errors
///
/// Returns [`RecipeError::YamlParse`] when the text is not valid YAML
/// (including duplicate mapping keys, which the parser rejects).
pub fn load_str(text: &str) -> Result<Node> {
    let options = marked_yaml::LoaderOptions::default().prevent_coercion(true);
    let parsed =
        marked_yaml::parse_yaml_with_options(0, text, options).map_err(|e| {
            RecipeError::YamlParse {
                reason: e.to_string(),
            }
        })?;
    Ok(convert_node(&parsed))
}

fn convert_node(node: &marked_yaml::Node) -> Node {
    match node {
        marked_yaml::Node::Mapping(mapping) => {
            let mut out = Mapping::new();
            for (key, value) in mapping.iter() {
                out.insert(key.as_str(), convert_node(value));
            }
            Node::Mapping(out)
        }
        marked_yaml::Node::Sequence(sequence) => {
            Node::Sequence(sequence.iter().map(convert_node).collect())
        }
        marked_yaml::Node::Scalar(scalar) => Node::Scalar(convert_scalar(scalar)),
    }
}

fn convert_scalar(scalar: &marked_yaml::types::MarkedScalarNode) -> Scalar {
    let text = scalar.as_str();

    // marked-yaml refuses to coerce quoted scalars, so a successful coercion
    // implies the scalar was plain.
    if let Some(b) = scalar.as_bool() {
        return Scalar::new(ScalarValue::Bool(b));
    }
    if let Some(i) = scalar.as_i64() {
        return Scalar::new(ScalarValue::Int(i));
    }
    if scalar.as_f64().is_some() && looks_like_float(text) {
        return Scalar::new(ScalarValue::Float(text.to_string()));
    }
    if matches!(text, "" | "~" | "null" | "Null" | "NULL") {
        return Scalar::new(ScalarValue::Null);
    }

    // Coercion was refused. If the text *would* coerce as a plain scalar,
    // it must have been quoted in the source.
    let quoted = text_parses_special(text);
    Scalar {
        value: ScalarValue::Str(text.to_string()),
        quoted,
    }
}

/// Whether `text` reads as a YAML float literal (not an int, not `inf`-like
/// words that legacy configs never use).
fn looks_like_float(text: &str) -> bool {
    text.parse::<i64>().is_err()
        && text.parse::<f64>().is_ok()
        && text.chars().all(|c| matches!(c, '0'..='9' | '.' | '+' | '-' | 'e' | 'E'))
}

/// Whether a string scalar would be (mis)read as a non-string if emitted
/// without quotes.
pub(crate) fn text_parses_special(text: &str) -> bool {
    matches!(
        text,
        "" | "~" | "null" | "Null" | "NULL" | "true" | "false" | "True" | "False"
    ) || text.parse::<i64>().is_ok()
        || (text.parse::<f64>().is_ok()
            && text.chars().all(|c| matches!(c, '0'..='9' | '.' | '+' | '-' | 'e' | 'E')))
}
