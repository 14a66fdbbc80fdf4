//! Source-archive resolution across variant sets.
//!
//! A recipe's `source:` subtree may be templated on variant values (e.g. a
//! per-runtime sdist name). This module re-renders the recipe once per
//! supplied variant set and collects every resolved source descriptor, so
//! tooling that mirrors or checks upstream archives sees the full set of
//! URLs a build matrix would fetch. URL templating itself happens in the
//! renderer; this module only walks the rendered trees.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::Result;
use crate::jinja::EnvSnapshot;
use crate::render::render_recipe_with_context;
use crate::render::variants::{VariantConfig, seed_value};
use crate::yaml::{Node, ScalarValue};

/// One resolved source descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipeSource {
    /// The resolved archive URL
    pub url: String,
    /// SHA-256 checksum, when the recipe declares one
    pub sha256: Option<String>,
    /// Legacy MD5 checksum, when the recipe declares one
    pub md5: Option<String>,
}

/// Renders `recipe` once per variant set and returns every resolved source.
///
/// Each variant set is reduced to one binding (first candidate per key)
/// before rendering. Sources are collected from the top-level `source:`
/// subtree and from each output's, in declaration order; a source entry
/// listing mirror URLs yields one descriptor per URL. Entries without a
/// `url` (e.g. git or local-path sources) are skipped.
///
/// # Errors
///
/// Any render failure for any of the variant sets; no partial list is
/// returned.
pub fn render_all_sources(
    recipe: &Node,
    variants: &[VariantConfig],
) -> Result<Vec<RecipeSource>> {
    let env_snapshot = EnvSnapshot::capture();
    let mut sources = Vec::new();

    for config in variants {
        let seeds: BTreeMap<String, ScalarValue> = config
            .keys()
            .filter_map(|key| {
                config
                    .get(key)
                    .and_then(|candidates| candidates.first())
                    .map(|first| (key.to_string(), seed_value(first)))
            })
            .collect();

        let rendered = render_recipe_with_context(recipe, &seeds, &env_snapshot)?;

        if let Some(source) = rendered.get("source") {
            collect_sources(source, &mut sources);
        }
        if let Some(outputs) = rendered.get("outputs").and_then(Node::as_sequence) {
            for output in outputs {
                if let Some(source) = output.get("source") {
                    collect_sources(source, &mut sources);
                }
            }
        }
    }
    Ok(sources)
}

fn collect_sources(node: &Node, into: &mut Vec<RecipeSource>) {
    match node {
        Node::Sequence(items) => {
            for item in items {
                collect_sources(item, into);
            }
        }
        Node::Mapping(mapping) => {
            let sha256 = mapping.get("sha256").and_then(scalar_string);
            let md5 = mapping.get("md5").and_then(scalar_string);
            match mapping.get("url") {
                Some(Node::Sequence(mirrors)) => {
                    for mirror in mirrors {
                        if let Some(url) = scalar_string(mirror) {
                            into.push(RecipeSource {
                                url,
                                sha256: sha256.clone(),
                                md5: md5.clone(),
                            });
                        }
                    }
                }
                Some(url_node) => {
                    if let Some(url) = scalar_string(url_node) {
                        into.push(RecipeSource {
                            url,
                            sha256,
                            md5,
                        });
                    }
                }
                None => {}
            }
        }
        Node::Scalar(_) => {}
    }
}

fn scalar_string(node: &Node) -> Option<String> {
    node.as_scalar().map(|s| s.value.as_variant_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yaml::load_str;
    use std::collections::HashSet;

    #[test]
    fn test_sources_expand_per_variant_set() {
        let recipe = load_str(
            r#"context:
  version: 1.35.1
  name: polars-runtime-${{ polars_runtime }}
source:
  - url: https://pypi.org/packages/source/p/polars/polars-${{ version }}.tar.gz
  - url: https://pypi.org/packages/source/p/${{ name }}/${{ name | replace("-", "_") }}-${{ version }}.tar.gz
"#,
        )
        .unwrap();

        let variants: Vec<VariantConfig> = ["32", "64", "compat"]
            .iter()
            .map(|runtime| {
                let mut config = VariantConfig::new();
                config.insert("polars_runtime", [*runtime]);
                config.insert("target_platform", ["linux-64"]);
                config
            })
            .collect();

        let sources = render_all_sources(&recipe, &variants).unwrap();
        let urls: HashSet<&str> = sources.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(
            urls,
            HashSet::from([
                "https://pypi.org/packages/source/p/polars/polars-1.35.1.tar.gz",
                "https://pypi.org/packages/source/p/polars-runtime-32/polars_runtime_32-1.35.1.tar.gz",
                "https://pypi.org/packages/source/p/polars-runtime-64/polars_runtime_64-1.35.1.tar.gz",
                "https://pypi.org/packages/source/p/polars-runtime-compat/polars_runtime_compat-1.35.1.tar.gz",
            ])
        );
    }

    #[test]
    fn test_mirror_lists_and_checksums() {
        let recipe = load_str(
            "\
source:
  url:
    - https://mirror-a.example/pkg-1.0.tar.gz
    - https://mirror-b.example/pkg-1.0.tar.gz
  sha256: abc123
",
        )
        .unwrap();
        let mut config = VariantConfig::new();
        config.insert("target_platform", ["linux-64"]);

        let sources = render_all_sources(&recipe, std::slice::from_ref(&config)).unwrap();
        assert_eq!(sources.len(), 2);
        assert!(sources.iter().all(|s| s.sha256.as_deref() == Some("abc123")));
    }

    #[test]
    fn test_non_url_sources_are_skipped() {
        let recipe = load_str("source:\n  git: https://github.com/example/demo.git\n").unwrap();
        let sources = render_all_sources(&recipe, &[VariantConfig::new()]).unwrap();
        assert!(sources.is_empty());
    }
}
