//! Variant matrix handling and per-output expansion.
//!
//! A variant config declares build axes (`python: ["3.12", "3.13"]`) plus
//! an optional `zip_keys` grouping of axes that must co-vary index-aligned.
//! Expansion determines, per recipe output, which keys that output actually
//! *uses* - referenced by a template expression inside its requirements,
//! build, or script subtrees, directly or through a context entry - and
//! branches only on those. Everything else is reduced to its first-listed
//! candidate but kept in the binding for downstream fidelity.
//!
//! The first-candidate reduction policy is deliberate and load-bearing:
//! downstream snapshot tooling asserts on it, so it must stay deterministic
//! and first-listed-wins.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use minijinja::Environment;

use crate::core::{RecipeError, Result};
use crate::jinja;
use crate::yaml::{Mapping, Node, ScalarValue};

/// The declared variant matrix: ordered candidate lists plus zip groups.
///
/// Candidate values are strings - the legacy variant-config format
/// stringifies everything, including booleans and version numbers. The
/// boolean-looking strings are re-typed at evaluation time only (see
/// [`seed_value`]).
#[derive(Debug, Clone, Default)]
pub struct VariantConfig {
    keys: Vec<(String, Vec<String>)>,
    zip_keys: Vec<Vec<String>>,
}

impl VariantConfig {
    /// An empty matrix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a key with its candidate list, replacing any previous
    /// declaration. An empty candidate list removes the key.
    pub fn insert<I, S>(&mut self, key: impl Into<String>, candidates: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();
        let candidates: Vec<String> = candidates.into_iter().map(Into::into).collect();
        self.keys.retain(|(k, _)| *k != key);
        if !candidates.is_empty() {
            self.keys.push((key, candidates));
        }
    }

    /// Declares a zip group of keys that advance together.
    pub fn add_zip_group<I, S>(&mut self, group: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.zip_keys.push(group.into_iter().map(Into::into).collect());
    }

    /// The candidate list for a key.
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.keys
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// Whether the matrix declares `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Keys in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|(k, _)| k.as_str())
    }

    /// The declared zip groups.
    pub fn zip_keys(&self) -> &[Vec<String>] {
        &self.zip_keys
    }

    /// Whether no keys are declared.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Builds a matrix from a loaded variant-config mapping.
    ///
    /// Bare scalars become single-candidate lists; the structural
    /// `zip_keys` entry is split off into groups; mapping-valued entries
    /// (legacy structural keys this layer does not consume) are skipped.
    pub fn from_mapping(mapping: &Mapping) -> Result<Self> {
        let mut config = Self::new();
        for (key, node) in mapping.iter() {
            if key == "zip_keys" {
                for group in parse_zip_groups(node) {
                    config.add_zip_group(group);
                }
                continue;
            }
            match node {
                Node::Scalar(scalar) => {
                    config.insert(key, [scalar.value.as_variant_string()]);
                }
                Node::Sequence(items) => {
                    let candidates: Vec<String> = items
                        .iter()
                        .filter_map(Node::as_scalar)
                        .map(|s| s.value.as_variant_string())
                        .collect();
                    config.insert(key, candidates);
                }
                Node::Mapping(_) => {
                    tracing::debug!("skipping structural variant entry '{}'", key);
                }
            }
        }
        Ok(config)
    }

    /// Verifies that every zip group's declared keys have equal-length
    /// candidate lists.
    ///
    /// # Errors
    ///
    /// [`RecipeError::VariantZipLength`] on the first mismatched group.
    /// Expansion is aborted entirely: no partial combination list is ever
    /// produced from a half-consistent matrix.
    fn validate_zip_lengths(&self) -> Result<()> {
        for group in &self.zip_keys {
            let lengths: Vec<(&str, usize)> = group
                .iter()
                .filter_map(|key| self.get(key).map(|c| (key.as_str(), c.len())))
                .collect();
            if let Some((_, first)) = lengths.first() {
                if lengths.iter().any(|(_, len)| len != first) {
                    return Err(RecipeError::VariantZipLength {
                        group: group.clone(),
                        details: lengths
                            .iter()
                            .map(|(key, len)| format!("{key}={len}"))
                            .collect::<Vec<_>>()
                            .join(", "),
                    });
                }
            }
        }
        Ok(())
    }
}

fn parse_zip_groups(node: &Node) -> Vec<Vec<String>> {
    let Some(items) = node.as_sequence() else {
        return Vec::new();
    };
    // Either a list of groups or one flat group of key names.
    if items.iter().all(|item| item.as_scalar().is_some()) {
        return vec![
            items
                .iter()
                .filter_map(Node::as_scalar)
                .map(|s| s.value.as_variant_string())
                .collect(),
        ];
    }
    items
        .iter()
        .filter_map(Node::as_sequence)
        .map(|group| {
            group
                .iter()
                .filter_map(Node::as_scalar)
                .map(|s| s.value.as_variant_string())
                .collect()
        })
        .collect()
}

/// Re-types a variant candidate string for expression evaluation.
///
/// Legacy variant configs carry booleans as the strings `"true"`/`"false"`;
/// those evaluate as native booleans so that `${{ not is_abi3 }}` and
/// friends behave. Every other candidate stays a string - `"3.12"` must
/// split and compare as text, never as a number. The original string form
/// is what variant dictionaries report back to consumers.
pub(crate) fn seed_value(candidate: &str) -> ScalarValue {
    match candidate {
        "true" => ScalarValue::Bool(true),
        "false" => ScalarValue::Bool(false),
        _ => ScalarValue::Str(candidate.to_string()),
    }
}

/// One expansion result: which output, under which variant binding, using
/// which keys.
#[derive(Debug, Clone)]
pub struct VariantExpansion {
    /// Index into the recipe's output list (0 for single-output recipes)
    pub output_index: usize,
    /// The full reduced variant dictionary: used keys at their combination
    /// values, unused keys at their first candidate
    pub binding: BTreeMap<String, String>,
    /// The keys this output actually uses
    pub used_keys: BTreeSet<String>,
}

/// Expands a recipe document against a variant matrix.
///
/// Emits one [`VariantExpansion`] per (output × combination-of-used-keys),
/// preserving declaration order of outputs and of candidate lists. See the
/// module docs for the used-key and reduction semantics.
///
/// # Errors
///
/// [`RecipeError::VariantZipLength`] for mismatched zip groups (the whole
/// expansion aborts), [`RecipeError::ExpressionSyntax`] when a template
/// marker in a scanned subtree fails to compile.
pub fn expand(doc: &Node, config: &VariantConfig) -> Result<Vec<VariantExpansion>> {
    config.validate_zip_lengths()?;

    let env = jinja::jinja_env();
    let context_refs = context_references(&env, doc)?;

    let outputs: Vec<&Node> = match doc.get("outputs").and_then(Node::as_sequence) {
        Some(items) => items.iter().collect(),
        None => vec![doc],
    };

    let mut expansions = Vec::new();
    for (output_index, output) in outputs.into_iter().enumerate() {
        let used = used_variant_keys(&env, output, &context_refs, config)?;
        tracing::debug!("output {} uses variant keys {:?}", output_index, used);

        let base: BTreeMap<String, String> = config
            .keys
            .iter()
            .filter_map(|(key, candidates)| {
                candidates.first().map(|first| (key.clone(), first.clone()))
            })
            .collect();

        for combo in combinations(config, &used) {
            let mut binding = base.clone();
            for (key, value) in combo {
                binding.insert(key, value);
            }
            expansions.push(VariantExpansion {
                output_index,
                binding,
                used_keys: used.clone(),
            });
        }
    }
    Ok(expansions)
}

/// The variant-key names referenced from one output's requirement, build,
/// and script subtrees - directly, or transitively through context entries
/// - plus zip partners of any reached key.
fn used_variant_keys(
    env: &Environment<'static>,
    output: &Node,
    context_refs: &HashMap<String, HashSet<String>>,
    config: &VariantConfig,
) -> Result<BTreeSet<String>> {
    let mut direct = HashSet::new();
    for section in ["requirements", "build", "script"] {
        if let Some(subtree) = output.get(section) {
            collect_references(env, subtree, section, &mut direct)?;
        }
    }

    // Close over context entries: an output that references a context name
    // whose expression references a variant key uses that key.
    let mut used = BTreeSet::new();
    let mut queue: Vec<String> = direct.into_iter().collect();
    let mut visited = HashSet::new();
    while let Some(name) = queue.pop() {
        if !visited.insert(name.clone()) {
            continue;
        }
        if config.contains_key(&name) {
            used.insert(name);
        } else if let Some(refs) = context_refs.get(&name) {
            queue.extend(refs.iter().cloned());
        }
    }

    // Zip partners of any reached key are pulled in so the group can
    // advance in lock-step.
    for group in config.zip_keys() {
        if group.iter().any(|key| used.contains(key)) {
            for key in group {
                if config.contains_key(key) {
                    used.insert(key.clone());
                }
            }
        }
    }
    Ok(used)
}

/// Per context entry, the root names its expressions reference.
fn context_references(
    env: &Environment<'static>,
    doc: &Node,
) -> Result<HashMap<String, HashSet<String>>> {
    let mut refs = HashMap::new();
    let Some(context) = doc.get("context").and_then(Node::as_mapping) else {
        return Ok(refs);
    };
    for (name, node) in context.iter() {
        let mut names = HashSet::new();
        collect_references(env, node, name, &mut names)?;
        refs.insert(name.to_string(), names);
    }
    Ok(refs)
}

/// Walks a subtree collecting the root names referenced by every template
/// marker in it.
fn collect_references(
    env: &Environment<'static>,
    node: &Node,
    field: &str,
    into: &mut HashSet<String>,
) -> Result<()> {
    match node {
        Node::Mapping(mapping) => {
            for (key, value) in mapping.iter() {
                collect_references(env, value, key, into)?;
            }
        }
        Node::Sequence(items) => {
            for item in items {
                collect_references(env, item, field, into)?;
            }
        }
        Node::Scalar(scalar) => {
            if let Some(text) = scalar.value.as_str() {
                if jinja::contains_template(text) {
                    into.extend(jinja::referenced_names(env, text, field)?);
                }
            }
        }
    }
    Ok(())
}

/// Cartesian product over the used axes, zipped groups advancing together.
///
/// Axes are visited in matrix declaration order with the leftmost axis
/// slowest, matching the legacy engine's combination order. With no used
/// keys this yields exactly one empty combination.
fn combinations(config: &VariantConfig, used: &BTreeSet<String>) -> Vec<Vec<(String, String)>> {
    enum Axis<'a> {
        Single(&'a str, &'a [String]),
        Zip(Vec<(&'a str, &'a [String])>),
    }

    impl Axis<'_> {
        fn len(&self) -> usize {
            match self {
                Axis::Single(_, candidates) => candidates.len(),
                Axis::Zip(members) => {
                    members.first().map(|(_, c)| c.len()).unwrap_or_default()
                }
            }
        }

        fn bind(&self, index: usize, into: &mut Vec<(String, String)>) {
            match self {
                Axis::Single(key, candidates) => {
                    if let Some(value) = candidates.get(index) {
                        into.push(((*key).to_string(), value.clone()));
                    }
                }
                Axis::Zip(members) => {
                    for (key, candidates) in members {
                        if let Some(value) = candidates.get(index) {
                            into.push(((*key).to_string(), value.clone()));
                        }
                    }
                }
            }
        }
    }

    let mut axes: Vec<Axis> = Vec::new();
    let mut grouped: HashSet<&str> = HashSet::new();
    for (key, candidates) in &config.keys {
        if !used.contains(key.as_str()) || grouped.contains(key.as_str()) {
            continue;
        }
        match config
            .zip_keys()
            .iter()
            .find(|group| group.iter().any(|k| k == key))
        {
            Some(group) => {
                let members: Vec<(&str, &[String])> = group
                    .iter()
                    .filter_map(|k| config.get(k).map(|c| (k.as_str(), c)))
                    .collect();
                for (member, _) in &members {
                    grouped.insert(*member);
                }
                axes.push(Axis::Zip(members));
            }
            None => axes.push(Axis::Single(key.as_str(), candidates.as_slice())),
        }
    }

    let mut combos: Vec<Vec<(String, String)>> = vec![Vec::new()];
    for axis in &axes {
        let mut next = Vec::with_capacity(combos.len() * axis.len());
        for combo in &combos {
            for index in 0..axis.len() {
                let mut extended = combo.clone();
                axis.bind(index, &mut extended);
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}
