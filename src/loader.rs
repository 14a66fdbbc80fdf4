//! Loading recipes and variant-config files from disk.
//!
//! Thin read-then-parse helpers over the document codec. Variant-config
//! files deserve their own entry point because they may carry template
//! markers of their own (conda-forge CI configs template on platform
//! names), evaluated against a caller-supplied namespace rather than a
//! recipe context.

use std::collections::BTreeMap;
use std::path::Path;

use crate::core::{RecipeError, Result};
use crate::jinja::EnvSnapshot;
use crate::render::render_recipe_with_context;
use crate::render::variants::VariantConfig;
use crate::yaml::{self, Node, ScalarValue};

/// Parses YAML text into a document tree with the compatibility typing
/// rules applied.
pub fn load_yaml(text: &str) -> Result<Node> {
    yaml::load_str(text)
}

/// Loads and parses a variant-config file.
///
/// The file is loaded with the document codec, any `${{ ... }}` markers are
/// evaluated against `namespace` (platform booleans and the like), and the
/// result is normalized into a [`VariantConfig`]: bare scalars become
/// single-candidate lists and `zip_keys` groups are split off.
///
/// # Errors
///
/// I/O and parse failures, expression failures from markers in the file,
/// or [`RecipeError::YamlParse`] when the document is not a mapping.
pub fn parse_recipe_config_file(
    path: &Path,
    namespace: Option<&BTreeMap<String, ScalarValue>>,
) -> Result<VariantConfig> {
    let text = std::fs::read_to_string(path)?;
    let doc = yaml::load_str(&text)?;

    let empty = BTreeMap::new();
    let seeds = namespace.unwrap_or(&empty);
    let rendered = render_recipe_with_context(&doc, seeds, &EnvSnapshot::capture())?;

    let mapping = rendered
        .as_mapping()
        .ok_or_else(|| RecipeError::YamlParse {
            reason: format!("variant config {} must be a mapping", path.display()),
        })?;

    VariantConfig::from_mapping(mapping)
}
