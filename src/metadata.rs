//! Read-only metadata facade over one rendered recipe output.
//!
//! A [`Metadata`] wraps exactly one (output × variant-combination) result:
//! the fully rendered tree, the output subtree it describes, and the
//! variant binding that produced it. It owns its rendered output
//! exclusively, exposes no mutation, and is single-use per combination -
//! downstream consumers read identity fields and the used-variant view,
//! then drop it.
//!
//! # The two-representation rule
//!
//! Variant values that look like booleans (`"true"`/`"false"`) are treated
//! as booleans *during* rendering, but [`Metadata::get_used_variant`] and
//! [`Metadata::variant`] report them in their original string form - that
//! is what legacy consumers persist and compare against. The typed view is
//! available separately via [`Metadata::build_configuration`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::core::{RecipeError, Result};
use crate::jinja::EnvSnapshot;
use crate::render::render_recipe_with_context;
use crate::render::variants::{VariantExpansion, seed_value};
use crate::utils::find_recipe;
use crate::yaml::{self, Node, ScalarValue};

/// Read-only view over one rendered-and-resolved recipe output.
#[derive(Debug, Clone)]
pub struct Metadata {
    recipe: Node,
    output: Node,
    output_index: usize,
    binding: BTreeMap<String, String>,
    used_keys: BTreeSet<String>,
}

impl Metadata {
    /// Wraps one variant expansion of a rendered document.
    pub(crate) fn from_expansion(recipe: Node, expansion: VariantExpansion) -> Self {
        let output = match recipe.get("outputs").and_then(Node::as_sequence) {
            Some(outputs) => outputs
                .get(expansion.output_index)
                .cloned()
                .unwrap_or_else(|| recipe.clone()),
            None => recipe.clone(),
        };
        Self {
            recipe,
            output,
            output_index: expansion.output_index,
            binding: expansion.binding,
            used_keys: expansion.used_keys,
        }
    }

    /// Builds a facade for an *unrendered* feedstock checkout.
    ///
    /// The recipe is rendered with its own context only - no variant
    /// matrix, no branching - which is enough to answer identity questions
    /// (`name`, `version`, `dist`) for tooling that inspects a checkout
    /// before a real build. For a multi-output recipe the identity comes
    /// from the top-level `recipe:` block.
    ///
    /// # Errors
    ///
    /// Load and render failures; identity lookups on the result may still
    /// fail with [`RecipeError::MissingField`] if the recipe lacks them.
    pub fn from_recipe_dir(recipe_dir: impl AsRef<Path>) -> Result<Self> {
        let recipe_file = find_recipe(recipe_dir.as_ref())?;
        let doc = yaml::load_str(&std::fs::read_to_string(&recipe_file)?)?;
        let rendered =
            render_recipe_with_context(&doc, &BTreeMap::new(), &EnvSnapshot::capture())?;
        Ok(Self {
            output: rendered.clone(),
            recipe: rendered,
            output_index: 0,
            binding: BTreeMap::new(),
            used_keys: BTreeSet::new(),
        })
    }

    /// The package name of this output.
    ///
    /// Falls back to the top-level `recipe:` identity for a facade over a
    /// whole multi-output recipe.
    ///
    /// # Errors
    ///
    /// [`RecipeError::MissingField`] when neither location has a name after
    /// rendering.
    pub fn name(&self) -> Result<String> {
        self.identity_field("name")
    }

    /// The package version of this output.
    ///
    /// # Errors
    ///
    /// [`RecipeError::MissingField`] when absent after rendering.
    pub fn version(&self) -> Result<String> {
        self.identity_field("version")
    }

    fn identity_field(&self, field: &str) -> Result<String> {
        self.output
            .get("package")
            .and_then(|package| package.get(field))
            .or_else(|| {
                self.recipe
                    .get("recipe")
                    .and_then(|recipe| recipe.get(field))
            })
            .and_then(scalar_text)
            .ok_or_else(|| RecipeError::MissingField {
                field: format!("package.{field}"),
            })
    }

    /// The resolved build string, when the recipe declares one.
    pub fn build_string(&self) -> Option<String> {
        self.output
            .get("build")
            .and_then(|build| build.get("string"))
            .and_then(scalar_text)
    }

    /// The build number, defaulting to 0 when undeclared.
    pub fn build_number(&self) -> i64 {
        self.output
            .get("build")
            .and_then(|build| build.get("number"))
            .and_then(Node::as_scalar)
            .and_then(|scalar| match scalar.value {
                ScalarValue::Int(n) => Some(n),
                _ => None,
            })
            .unwrap_or(0)
    }

    /// The distribution identifier `name-version-build_string`.
    ///
    /// When no build string was resolvable (hash inputs live in the real
    /// build engine), a deterministic placeholder of the form
    /// `unrendered_<build_number>` stands in.
    ///
    /// # Errors
    ///
    /// [`RecipeError::MissingField`] when name or version is absent.
    pub fn dist(&self) -> Result<String> {
        let build_string = self
            .build_string()
            .unwrap_or_else(|| format!("unrendered_{}", self.build_number()));
        Ok(format!("{}-{}-{}", self.name()?, self.version()?, build_string))
    }

    /// The reduced variant dictionary restricted to this output's used
    /// keys, values in their original string form.
    pub fn get_used_variant(&self) -> BTreeMap<String, String> {
        self.binding
            .iter()
            .filter(|(key, _)| self.used_keys.contains(*key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// The bare set of variant keys this output uses.
    pub fn get_used_vars(&self) -> &BTreeSet<String> {
        &self.used_keys
    }

    /// The full reduced variant dictionary: used keys at their combination
    /// values, unused keys reduced to their first candidate.
    pub fn variant(&self) -> &BTreeMap<String, String> {
        &self.binding
    }

    /// The typed build-configuration view of the variant binding, with
    /// boolean-looking strings as native booleans.
    ///
    /// This is the in-render representation; the string view lives in
    /// [`Metadata::variant`] and [`Metadata::get_used_variant`].
    pub fn build_configuration(&self) -> serde_json::Value {
        let variant: serde_json::Map<String, serde_json::Value> = self
            .binding
            .iter()
            .map(|(key, value)| {
                let typed = match seed_value(value) {
                    ScalarValue::Bool(b) => serde_json::Value::Bool(b),
                    _ => serde_json::Value::String(value.clone()),
                };
                (key.clone(), typed)
            })
            .collect();
        serde_json::json!({ "variant": variant })
    }

    /// The fully rendered recipe document.
    pub fn rendered_recipe(&self) -> &Node {
        &self.recipe
    }

    /// The rendered subtree of the output this facade describes.
    pub fn output(&self) -> &Node {
        &self.output
    }

    /// Index of this output in the recipe's declaration order.
    pub fn output_index(&self) -> usize {
        self.output_index
    }
}

/// The textual form of an identity scalar; versions may load as floats
/// (`1.2`) or ints, so this goes through the variant string form rather
/// than requiring a string scalar.
fn scalar_text(node: &Node) -> Option<String> {
    node.as_scalar().map(|scalar| scalar.value.as_variant_string())
}
