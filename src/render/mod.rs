//! Recipe rendering: tree substitution and the public render entry point.
//!
//! Rendering is a pure function of (document, context, variant binding):
//! the input tree is never mutated, every pass builds a new tree, and two
//! renders of different documents can run on different threads with no
//! coordination. The only process-wide input - environment variables - is
//! captured into an explicit [`EnvSnapshot`] at the top of [`render`] and
//! threaded through, so the same recipe re-renders correctly after the
//! environment changes.
//!
//! # Control flow
//!
//! load document -> evaluate `context:` -> expand variants per output
//! ([`variants::expand`]) -> re-render once per (output × combination) with
//! that combination seeded -> wrap each result in a [`Metadata`] facade.

pub mod variants;

use std::collections::BTreeMap;
use std::path::Path;

use minijinja::Environment;

use crate::core::Result;
use crate::jinja::{self, EnvSnapshot, ResolvedContext, load_recipe_context};
use crate::metadata::Metadata;
use crate::utils::find_recipe;
use crate::yaml::{self, Mapping, Node, ScalarValue};
use variants::{VariantConfig, seed_value};

/// Renders a whole recipe document against its own `context:` block plus
/// seed bindings (typically one variant combination).
///
/// The returned tree has every `${{ ... }}` marker substituted and the
/// `context:` block replaced by its resolved values. Rendering an
/// already-fully-resolved document returns an equal tree.
///
/// # Errors
///
/// [`crate::RecipeError::ExpressionSyntax`] for a malformed or failing
/// expression, named after the field holding it.
pub fn render_recipe_with_context(
    doc: &Node,
    seeds: &BTreeMap<String, ScalarValue>,
    env_snapshot: &EnvSnapshot,
) -> Result<Node> {
    let context_block = doc.get("context").and_then(Node::as_mapping);
    let context = load_recipe_context(context_block, seeds, env_snapshot)?;
    let env = jinja::jinja_env();
    let namespace = context.to_namespace(env_snapshot);

    let Some(mapping) = doc.as_mapping() else {
        return render_node(&env, doc, &namespace, "recipe");
    };

    let mut rendered = Mapping::new();
    for (key, value) in mapping.iter() {
        if key == "context" {
            rendered.insert(key, resolved_context_node(value, &context));
            continue;
        }
        rendered.insert(key, render_node(&env, value, &namespace, key)?);
    }
    Ok(Node::Mapping(rendered))
}

/// Rebuilds the `context:` block with each entry at its resolved value,
/// preserving declaration order.
fn resolved_context_node(block: &Node, context: &ResolvedContext) -> Node {
    let Some(mapping) = block.as_mapping() else {
        return block.clone();
    };
    let mut rendered = Mapping::new();
    for (name, original) in mapping.iter() {
        match context.get(name) {
            Some(value) => rendered.insert(name, Node::scalar(value.clone())),
            None => rendered.insert(name, original.clone()),
        }
    }
    Node::Mapping(rendered)
}

fn render_node(
    env: &Environment<'static>,
    node: &Node,
    namespace: &jinja::Namespace,
    field: &str,
) -> Result<Node> {
    match node {
        Node::Mapping(mapping) => {
            let mut rendered = Mapping::new();
            for (key, value) in mapping.iter() {
                rendered.insert(key, render_node(env, value, namespace, key)?);
            }
            Ok(Node::Mapping(rendered))
        }
        Node::Sequence(items) => Ok(Node::Sequence(
            items
                .iter()
                .map(|item| render_node(env, item, namespace, field))
                .collect::<Result<Vec<_>>>()?,
        )),
        Node::Scalar(scalar) => Ok(Node::Scalar(jinja::render_scalar(
            env, scalar, namespace, field,
        )?)),
    }
}

/// Renders a recipe for the legacy engine.
///
/// Loads the recipe at `recipe_path` (a `recipe.yaml`, or a directory
/// containing one directly or under `recipe/`), expands it against
/// `variants`, and returns one entry per (output × variant combination) in
/// declaration order. `platform` and `arch` join into a
/// `<platform>-<arch>` value seeded as the `target_platform` and
/// `build_platform` keys unless the matrix already declares them.
///
/// The two booleans in each tuple are the legacy engine's download/reuse
/// flags; an in-memory render never needs either, but consumers index into
/// the tuple, so the arity is kept.
///
/// # Errors
///
/// [`crate::RecipeError::RecipeNotFound`] when no recipe file exists at the
/// path, plus every failure mode of loading, expansion, and rendering.
/// Failures are raised synchronously and never retried; a failed render
/// leaves unrelated renders unaffected.
pub fn render(
    recipe_path: &Path,
    variants: Option<&VariantConfig>,
    platform: &str,
    arch: &str,
) -> Result<Vec<(Metadata, bool, bool)>> {
    let recipe_file = find_recipe(recipe_path)?;
    tracing::debug!("rendering recipe at {}", recipe_file.display());
    let doc = yaml::load_str(&std::fs::read_to_string(&recipe_file)?)?;

    // One snapshot per render call: expressions observe the environment as
    // of now, not as of some earlier render.
    let env_snapshot = EnvSnapshot::capture();

    let mut config = variants.cloned().unwrap_or_default();
    let platform_value = format!("{platform}-{arch}");
    for key in ["target_platform", "build_platform"] {
        if !config.contains_key(key) {
            config.insert(key, [platform_value.clone()]);
        }
    }

    let expansions = variants::expand(&doc, &config)?;
    tracing::debug!("expanded {} variant combinations", expansions.len());

    let mut rendered = Vec::with_capacity(expansions.len());
    for expansion in expansions {
        let seeds: BTreeMap<String, ScalarValue> = expansion
            .binding
            .iter()
            .map(|(key, value)| (key.clone(), seed_value(value)))
            .collect();
        let tree = render_recipe_with_context(&doc, &seeds, &env_snapshot)?;
        rendered.push((Metadata::from_expansion(tree, expansion), false, false));
    }
    Ok(rendered)
}
