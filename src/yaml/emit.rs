//! YAML emission for the scalar-typed document model.
//!
//! This is the dump half of the document codec. It exists as a custom pass
//! (rather than a serde serializer) because the compatibility contract is a
//! property of the *codec configuration*, not of the Rust types:
//!
//! - plain string scalars equal to `true`/`false` are re-emitted as native
//!   booleans (legacy variant configs stringify everything; serializing
//!   turns them back),
//! - explicitly quoted strings keep their quotes,
//! - float scalars re-emit their original source text unchanged,
//! - strings that would be misread as another type get quoted.
//!
//! Layout follows the legacy tool's formatting: two-space mapping indent,
//! sequence dashes indented two from their parent, no line wrapping.

use super::{Mapping, Node, Scalar, ScalarValue, text_parses_special};

/// Serializes a [`Node`] tree to YAML text.
///
/// Re-serializing an unmodified tree produced by [`super::load_str`] yields
/// the same key order and the same float literals as the input.
pub fn dump_str(node: &Node) -> String {
    let mut out = String::new();
    match node {
        Node::Mapping(mapping) => emit_mapping(&mut out, mapping, 0),
        Node::Sequence(items) => emit_sequence(&mut out, items, 0),
        Node::Scalar(scalar) => {
            out.push_str(&scalar_repr(scalar));
            out.push('\n');
        }
    }
    out
}

fn emit_mapping(out: &mut String, mapping: &Mapping, indent: usize) {
    let pad = " ".repeat(indent);
    for (key, value) in mapping.iter() {
        match value {
            Node::Scalar(scalar) => {
                out.push_str(&pad);
                out.push_str(&key_repr(key));
                out.push_str(": ");
                out.push_str(&scalar_repr(scalar));
                out.push('\n');
            }
            Node::Mapping(inner) if inner.is_empty() => {
                out.push_str(&pad);
                out.push_str(&key_repr(key));
                out.push_str(": {}\n");
            }
            Node::Mapping(inner) => {
                out.push_str(&pad);
                out.push_str(&key_repr(key));
                out.push_str(":\n");
                emit_mapping(out, inner, indent + 2);
            }
            Node::Sequence(items) if items.is_empty() => {
                out.push_str(&pad);
                out.push_str(&key_repr(key));
                out.push_str(": []\n");
            }
            Node::Sequence(items) => {
                out.push_str(&pad);
                out.push_str(&key_repr(key));
                out.push_str(":\n");
                emit_sequence(out, items, indent + 2);
            }
        }
    }
}

fn emit_sequence(out: &mut String, items: &[Node], indent: usize) {
    let pad = " ".repeat(indent);
    for item in items {
        match item {
            Node::Scalar(scalar) => {
                out.push_str(&pad);
                out.push_str("- ");
                out.push_str(&scalar_repr(scalar));
                out.push('\n');
            }
            Node::Mapping(inner) if inner.is_empty() => {
                out.push_str(&pad);
                out.push_str("- {}\n");
            }
            Node::Sequence(inner) if inner.is_empty() => {
                out.push_str(&pad);
                out.push_str("- []\n");
            }
            // Block collections fold their first line onto the dash:
            //   - name: x
            //     version: y
            nested => {
                let mut block = String::new();
                match nested {
                    Node::Mapping(inner) => emit_mapping(&mut block, inner, indent + 2),
                    Node::Sequence(inner) => emit_sequence(&mut block, inner, indent + 2),
                    Node::Scalar(_) => unreachable!("scalars handled above"),
                }
                out.push_str(&pad);
                out.push_str("- ");
                out.push_str(&block[indent + 2..]);
            }
        }
    }
}

fn scalar_repr(scalar: &Scalar) -> String {
    match &scalar.value {
        ScalarValue::Bool(b) => b.to_string(),
        ScalarValue::Int(i) => i.to_string(),
        ScalarValue::Float(text) => text.clone(),
        ScalarValue::Null => "null".to_string(),
        ScalarValue::Missing(name) => string_repr(&crate::jinja::undefined::sentinel(name), false),
        ScalarValue::Str(s) => string_repr(s, scalar.quoted),
    }
}

fn string_repr(s: &str, quoted: bool) -> String {
    // Legacy compatibility: a *plain* "true"/"false" string goes back to a
    // native boolean. Quoted ones were quoted on purpose.
    if !quoted && (s == "true" || s == "false") {
        return s.to_string();
    }
    if s.contains('\n') {
        return double_quote(s);
    }
    if quoted || needs_quoting(s) {
        return single_quote(s);
    }
    s.to_string()
}

fn key_repr(key: &str) -> String {
    if needs_quoting(key) {
        single_quote(key)
    } else {
        key.to_string()
    }
}

/// Whether a string emitted bare would parse as something else or break the
/// document structure.
fn needs_quoting(s: &str) -> bool {
    if text_parses_special(s) {
        return true;
    }
    if s.starts_with(|c: char| {
        matches!(
            c,
            ' ' | '!' | '"' | '#' | '%' | '&' | '\'' | '*' | ',' | '-' | '>' | '?' | '@' | '['
                | ']' | '`' | '{' | '|' | '}' | '~'
        )
    }) {
        return true;
    }
    s.ends_with(' ') || s.contains(": ") || s.ends_with(':') || s.contains(" #")
}

fn single_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn double_quote(s: &str) -> String {
    format!(
        "\"{}\"",
        s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yaml::load_str;

    #[test]
    fn test_plain_true_string_emits_as_bool() {
        let mut mapping = Mapping::new();
        mapping.insert("value", Node::string("true"));
        assert_eq!(dump_str(&Node::Mapping(mapping)), "value: true\n");
    }

    #[test]
    fn test_quoted_true_string_stays_quoted() {
        let mut mapping = Mapping::new();
        mapping.insert("value", Node::Scalar(Scalar::quoted_str("true")));
        assert_eq!(dump_str(&Node::Mapping(mapping)), "value: 'true'\n");
    }

    #[test]
    fn test_numeric_strings_are_quoted() {
        let mut mapping = Mapping::new();
        mapping.insert(
            "int",
            Node::Sequence(vec![Node::string("4"), Node::string("5")]),
        );
        assert_eq!(
            dump_str(&Node::Mapping(mapping)),
            "int:\n  - '4'\n  - '5'\n"
        );
    }

    #[test]
    fn test_float_round_trip_is_textual() {
        for source in ["value: 0.02\n", "value: 1.10\n", "python: 3.10\n"] {
            let doc = load_str(source).unwrap();
            assert_eq!(dump_str(&doc), source, "float text must not reformat");
        }
    }

    #[test]
    fn test_unmodified_document_round_trips() {
        let source = "\
package:
  name: rich
  version: 13.4.2
build:
  number: 0
  noarch: python
requirements:
  host:
    - pip
    - python
";
        let doc = load_str(source).unwrap();
        assert_eq!(dump_str(&doc), source);
    }

    #[test]
    fn test_sequence_of_mappings_folds_first_line() {
        let source = "\
outputs:
  - package:
      name: libmamba
  - package:
      name: mamba
";
        let doc = load_str(source).unwrap();
        assert_eq!(dump_str(&doc), source);
    }

    #[test]
    fn test_nested_sequence_for_zip_keys() {
        let source = "\
zip_keys:
  - - python
    - is_abi3
";
        let doc = load_str(source).unwrap();
        assert_eq!(dump_str(&doc), source);
    }
}
