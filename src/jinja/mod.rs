//! Expression evaluation and context resolution.
//!
//! This module wraps the template-expression engine with the configuration
//! the recipe dialect needs and provides the two evaluation entry points
//! the renderer is built on:
//!
//! - [`load_recipe_context`] resolves a recipe's `context:` block of named
//!   expressions into concrete typed values, left-to-right, with seed
//!   bindings (variant values) taking precedence.
//! - [`render_scalar`] substitutes `${{ expr }}` markers inside one scalar,
//!   preserving the native result type when the scalar is exactly one
//!   marker and string-interpolating otherwise.
//!
//! # Missing names
//!
//! A reference to an unknown name never fails the render. Before an
//! expression is evaluated, every undeclared name is bound to the
//! diagnostic placeholder from [`undefined`], so the placeholder
//! propagates through string operations and stays visible in the output.
//! Only a *malformed* expression is fatal ([`RecipeError::ExpressionSyntax`]).
//!
//! # Environment access
//!
//! Expressions may call `env.get("NAME")`, `env.get("NAME", "default")`,
//! and `env.exists("NAME")`. The engine never reads process state directly:
//! callers capture an [`EnvSnapshot`] once per render and pass it in, which
//! keeps renders deterministic and testable by injection.

pub mod filters;
pub mod undefined;

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, LazyLock};

use minijinja::value::Object;
use minijinja::{Environment, ErrorKind, State, UndefinedBehavior, Value};
use regex::Regex;

use crate::core::{RecipeError, Result};
use crate::yaml::{Mapping, Node, Scalar, ScalarValue};

/// Matches one `${{ ... }}` template marker, non-greedy.
static TEMPLATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{\{(.*?)\}\}").expect("template marker pattern is valid"));

/// Builds the expression engine with recipe-dialect configuration:
/// lenient undefined handling and the custom filters from [`filters`].
pub fn jinja_env() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Lenient);
    env.add_filter("version_to_buildstring", filters::version_to_buildstring);
    env.add_filter("split", filters::split);
    env
}

/// Whether a scalar contains at least one template marker.
pub fn contains_template(text: &str) -> bool {
    text.contains("${{")
}

/// A read-only snapshot of environment variables, captured once per render.
///
/// The same unrendered recipe may be re-rendered after the process
/// environment changes, so snapshots are taken at render time, never
/// cached across renders.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Captures the current process environment.
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// An empty snapshot (no variables visible to expressions).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds or replaces one variable; useful for injecting test environments.
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Looks up a variable in the snapshot.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    fn to_jinja(&self) -> Value {
        Value::from_object(EnvProxy {
            vars: self.vars.clone(),
        })
    }
}

/// Expression-side proxy for [`EnvSnapshot`], exposing `get`/`exists`.
#[derive(Debug)]
struct EnvProxy {
    vars: BTreeMap<String, String>,
}

impl Object for EnvProxy {
    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> std::result::Result<Value, minijinja::Error> {
        let name = |args: &[Value]| {
            args.first().and_then(|v| v.as_str()).map(str::to_string).ok_or_else(|| {
                minijinja::Error::new(
                    ErrorKind::InvalidOperation,
                    format!("env.{method} expects a variable name"),
                )
            })
        };
        match method {
            "get" => {
                let name = name(args)?;
                match self.vars.get(&name) {
                    Some(value) => Ok(Value::from(value.clone())),
                    None => Ok(args
                        .get(1)
                        .cloned()
                        .unwrap_or_else(|| Value::from(undefined::sentinel(&name)))),
                }
            }
            "exists" => {
                let name = name(args)?;
                Ok(Value::from(self.vars.contains_key(&name)))
            }
            _ => Err(minijinja::Error::new(
                ErrorKind::UnknownMethod,
                format!("env has no method '{method}'"),
            )),
        }
    }
}

/// The binding namespace one expression is evaluated against.
pub(crate) type Namespace = BTreeMap<String, Value>;

/// The result of evaluating one expression: the raw engine value plus the
/// set of names that were bound to missing sentinels for this evaluation.
pub(crate) struct Evaluated {
    value: Value,
    injected: HashSet<String>,
}

impl Evaluated {
    /// Converts the engine value into a typed scalar value.
    ///
    /// A string that is exactly one of the sentinels injected for *this*
    /// evaluation becomes [`ScalarValue::Missing`]; a sentinel that was
    /// concatenated into a larger string stays an ordinary (visibly
    /// diagnostic) string.
    pub(crate) fn into_scalar(self) -> ScalarValue {
        if self.value.is_undefined() || self.value.is_none() {
            return ScalarValue::Null;
        }
        match self.value.kind() {
            minijinja::value::ValueKind::Bool => ScalarValue::Bool(self.value.is_true()),
            minijinja::value::ValueKind::Number => {
                if let Ok(i) = i64::try_from(self.value.clone()) {
                    ScalarValue::Int(i)
                } else if let Ok(f) = f64::try_from(self.value.clone()) {
                    // {:?} keeps a trailing ".0" on whole floats, so the
                    // value stays float-typed on re-parse.
                    ScalarValue::Float(format!("{f:?}"))
                } else {
                    ScalarValue::Str(self.value.to_string())
                }
            }
            minijinja::value::ValueKind::String => {
                let s = self.value.as_str().unwrap_or_default().to_string();
                for name in &self.injected {
                    if s == undefined::sentinel(name) {
                        return ScalarValue::Missing(name.clone());
                    }
                }
                ScalarValue::Str(s)
            }
            _ => ScalarValue::Str(self.value.to_string()),
        }
    }
}

/// Compiles and evaluates one expression against `namespace`.
///
/// Undeclared names are bound to missing sentinels before evaluation (see
/// the module docs). `entry` names the context entry or document field the
/// expression came from and is surfaced in syntax errors.
///
/// # Errors
///
/// [`RecipeError::ExpressionSyntax`] when the expression fails to compile
/// or fails at evaluation time (e.g. a filter applied to the wrong type).
pub(crate) fn eval_expression(
    env: &Environment<'static>,
    source: &str,
    namespace: &Namespace,
    entry: &str,
) -> Result<Evaluated> {
    let source = source.trim();
    let expr = env
        .compile_expression(source)
        .map_err(|e| RecipeError::ExpressionSyntax {
            entry: entry.to_string(),
            reason: e.to_string(),
        })?;

    let mut ctx = namespace.clone();
    let mut injected = HashSet::new();
    for name in expr.undeclared_variables(false) {
        if !ctx.contains_key(&name) {
            tracing::debug!("binding missing name '{}' to sentinel in '{}'", name, entry);
            ctx.insert(name.clone(), Value::from(undefined::sentinel(&name)));
            injected.insert(name);
        }
    }

    let value = expr.eval(&ctx).map_err(|e| RecipeError::ExpressionSyntax {
        entry: entry.to_string(),
        reason: e.to_string(),
    })?;
    Ok(Evaluated { value, injected })
}

/// Renders one scalar, substituting every `${{ ... }}` marker.
///
/// When the whole scalar (after trimming, so literal-block newlines do not
/// interfere) is exactly one marker, the expression's native type is kept:
/// `${{ 1 + 1 }}` stays an integer. A string result from a *plain* scalar
/// is additionally re-typed the way the document codec would read it, so a
/// block-scalar expression evaluating to `2025` comes back as an integer,
/// while the explicitly quoted form stays a string.
///
/// Scalars with no marker are returned verbatim.
pub(crate) fn render_scalar(
    env: &Environment<'static>,
    scalar: &Scalar,
    namespace: &Namespace,
    field: &str,
) -> Result<Scalar> {
    let text = match &scalar.value {
        ScalarValue::Str(text) if contains_template(text) => text,
        _ => return Ok(scalar.clone()),
    };

    let trimmed = text.trim();
    if let Some(caps) = TEMPLATE_RE.captures(trimmed) {
        if let (Some(whole), Some(expr)) = (caps.get(0), caps.get(1)) {
            if whole.start() == 0 && whole.end() == trimmed.len() {
                let mut value = eval_expression(env, expr.as_str(), namespace, field)?.into_scalar();
                if !scalar.quoted {
                    value = retype_plain(value);
                }
                let quoted = scalar.quoted && matches!(value, ScalarValue::Str(_));
                return Ok(Scalar { value, quoted });
            }
        }
    }

    // Embedded markers: every substitution is coerced to its string form.
    let mut result = String::new();
    let mut last = 0;
    for caps in TEMPLATE_RE.captures_iter(text) {
        let (Some(whole), Some(expr)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        result.push_str(&text[last..whole.start()]);
        let value = eval_expression(env, expr.as_str(), namespace, field)?.into_scalar();
        result.push_str(&value.as_variant_string());
        last = whole.end();
    }
    result.push_str(&text[last..]);
    Ok(Scalar {
        value: ScalarValue::Str(result),
        quoted: scalar.quoted,
    })
}

/// The root names referenced by every template marker in `text`.
///
/// Used by the variant expander to decide which variant keys an output's
/// subtrees reach. The `env` proxy name is excluded - environment access is
/// not a variant axis.
pub(crate) fn referenced_names(
    env: &Environment<'static>,
    text: &str,
    field: &str,
) -> Result<HashSet<String>> {
    let mut names = HashSet::new();
    for caps in TEMPLATE_RE.captures_iter(text) {
        let Some(expr) = caps.get(1) else {
            continue;
        };
        let compiled = env.compile_expression(expr.as_str().trim()).map_err(|e| {
            RecipeError::ExpressionSyntax {
                entry: field.to_string(),
                reason: e.to_string(),
            }
        })?;
        names.extend(compiled.undeclared_variables(false));
    }
    names.remove("env");
    Ok(names)
}

/// Re-types a string result of a plain (unquoted) marker the way the
/// document codec types plain scalars.
fn retype_plain(value: ScalarValue) -> ScalarValue {
    let ScalarValue::Str(s) = value else {
        return value;
    };
    match s.as_str() {
        "true" => return ScalarValue::Bool(true),
        "false" => return ScalarValue::Bool(false),
        _ => {}
    }
    if let Ok(i) = s.parse::<i64>() {
        return ScalarValue::Int(i);
    }
    if s.parse::<f64>().is_ok()
        && s.chars().all(|c| matches!(c, '0'..='9' | '.' | '+' | '-' | 'e' | 'E'))
    {
        return ScalarValue::Float(s);
    }
    ScalarValue::Str(s)
}

/// A resolved `context:` block: an ordered mapping from name to typed value,
/// seeds included. Built once per (render × variant combination), consumed
/// immutably.
#[derive(Debug, Clone, Default)]
pub struct ResolvedContext {
    values: Vec<(String, ScalarValue)>,
}

impl ResolvedContext {
    /// Looks up a resolved value by name.
    pub fn get(&self, name: &str) -> Option<&ScalarValue> {
        self.values.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Iterates entries in resolution order (seeds first, then context
    /// entries in declaration order).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScalarValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of resolved entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the context is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The binding namespace for expression evaluation, with the `env`
    /// proxy installed.
    pub(crate) fn to_namespace(&self, env_snapshot: &EnvSnapshot) -> Namespace {
        let mut ns = Namespace::new();
        ns.insert("env".to_string(), env_snapshot.to_jinja());
        for (name, value) in &self.values {
            ns.insert(name.clone(), scalar_to_jinja(value));
        }
        ns
    }
}

/// Converts a typed scalar into an engine value.
///
/// Floats cross the boundary as their source *text*, not as `f64`: the
/// compatibility contract treats float literals as strings end-to-end so
/// that `3.10` can never collapse to `3.1` on its way through an
/// expression.
pub(crate) fn scalar_to_jinja(value: &ScalarValue) -> Value {
    match value {
        ScalarValue::Str(s) => Value::from(s.clone()),
        ScalarValue::Bool(b) => Value::from(*b),
        ScalarValue::Int(i) => Value::from(*i),
        ScalarValue::Float(text) => Value::from(text.clone()),
        ScalarValue::Null => Value::from(()),
        ScalarValue::Missing(name) => Value::from(undefined::sentinel(name)),
    }
}

/// Resolves a `context:` block against optional seed bindings.
///
/// Entries are evaluated left-to-right; names resolved earlier are visible
/// to later expressions (forward-only - an expression cannot reference a
/// name defined later in the block). Seed bindings take precedence over
/// context entries of the same name and are visible to all expressions; a
/// shadowed entry's own expression is not evaluated at all.
///
/// # Errors
///
/// [`RecipeError::ExpressionSyntax`] when an entry's expression is
/// malformed, naming the offending entry. Unresolved name *references* are
/// not errors; see the module docs.
pub fn load_recipe_context(
    context_block: Option<&Mapping>,
    seeds: &BTreeMap<String, ScalarValue>,
    env_snapshot: &EnvSnapshot,
) -> Result<ResolvedContext> {
    let env = jinja_env();
    let mut resolved = ResolvedContext::default();
    let mut ns = Namespace::new();
    ns.insert("env".to_string(), env_snapshot.to_jinja());

    for (name, value) in seeds {
        ns.insert(name.clone(), scalar_to_jinja(value));
        resolved.values.push((name.clone(), value.clone()));
    }

    let Some(block) = context_block else {
        return Ok(resolved);
    };

    for (name, node) in block.iter() {
        if seeds.contains_key(name) {
            tracing::debug!("context entry '{}' shadowed by seed binding", name);
            continue;
        }
        let value = match node {
            Node::Scalar(scalar) => render_scalar(&env, scalar, &ns, name)?.value,
            _ => {
                tracing::warn!("ignoring non-scalar context entry '{}'", name);
                continue;
            }
        };
        ns.insert(name.to_string(), scalar_to_jinja(&value));
        resolved.values.push((name.to_string(), value));
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yaml::load_str;

    fn context_block(source: &str) -> Mapping {
        let doc = load_str(source).unwrap();
        doc.get("context").unwrap().as_mapping().unwrap().clone()
    }

    #[test]
    fn test_arithmetic_keeps_integer_type() {
        let block = context_block("context:\n  a: ${{ 1 + 1 }}\n");
        let resolved =
            load_recipe_context(Some(&block), &BTreeMap::new(), &EnvSnapshot::empty()).unwrap();
        assert_eq!(resolved.get("a"), Some(&ScalarValue::Int(2)));
    }

    #[test]
    fn test_missing_name_resolves_to_sentinel() {
        let block = context_block("context:\n  a: ${{ missing_name }}\n");
        let resolved =
            load_recipe_context(Some(&block), &BTreeMap::new(), &EnvSnapshot::empty()).unwrap();
        assert_eq!(
            resolved.get("a"),
            Some(&ScalarValue::Missing("missing_name".to_string()))
        );
        assert_eq!(
            resolved.get("a").unwrap().as_variant_string(),
            "missing_name_undefined"
        );
    }

    #[test]
    fn test_forward_only_resolution() {
        let block = context_block(
            "context:\n  name: stackvana\n  full: ${{ name + '-core' }}\n  early: ${{ late }}\n  late: defined\n",
        );
        let resolved =
            load_recipe_context(Some(&block), &BTreeMap::new(), &EnvSnapshot::empty()).unwrap();
        assert_eq!(
            resolved.get("full"),
            Some(&ScalarValue::Str("stackvana-core".to_string()))
        );
        // `late` is defined after `early`, so `early` sees the sentinel.
        assert_eq!(
            resolved.get("early"),
            Some(&ScalarValue::Missing("late".to_string()))
        );
    }

    #[test]
    fn test_seed_takes_precedence_and_skips_entry() {
        let block = context_block("context:\n  python: '3.9'\n  tag: ${{ python }}\n");
        let mut seeds = BTreeMap::new();
        seeds.insert(
            "python".to_string(),
            ScalarValue::Str("3.12".to_string()),
        );
        let resolved = load_recipe_context(Some(&block), &seeds, &EnvSnapshot::empty()).unwrap();
        assert_eq!(
            resolved.get("python"),
            Some(&ScalarValue::Str("3.12".to_string()))
        );
        assert_eq!(
            resolved.get("tag").map(ScalarValue::as_variant_string),
            Some("3.12".to_string())
        );
    }

    #[test]
    fn test_block_scalar_keeps_evaluated_type() {
        // A literal-block scalar holding one marker must not force a string
        // result: the expression's value arrives as an integer.
        let block = context_block(
            "context:\n  version: 0.2025.39\n  minor: |\n    ${{ (version | split(\".\"))[1] }}\n",
        );
        let resolved =
            load_recipe_context(Some(&block), &BTreeMap::new(), &EnvSnapshot::empty()).unwrap();
        assert_eq!(resolved.get("minor"), Some(&ScalarValue::Int(2025)));
    }

    #[test]
    fn test_quoted_marker_stays_string() {
        let block = context_block(
            "context:\n  version: 0.2025.39\n  minor: '${{ (version | split(\".\"))[1] }}'\n",
        );
        let resolved =
            load_recipe_context(Some(&block), &BTreeMap::new(), &EnvSnapshot::empty()).unwrap();
        assert_eq!(
            resolved.get("minor"),
            Some(&ScalarValue::Str("2025".to_string()))
        );
    }

    #[test]
    fn test_malformed_expression_is_fatal() {
        let block = context_block("context:\n  bad: ${{ 1 + }}\n");
        let err = load_recipe_context(Some(&block), &BTreeMap::new(), &EnvSnapshot::empty())
            .unwrap_err();
        match err {
            RecipeError::ExpressionSyntax { entry, .. } => assert_eq!(entry, "bad"),
            other => panic!("expected ExpressionSyntax, got {other:?}"),
        }
    }

    #[test]
    fn test_env_snapshot_is_explicit() {
        let block = context_block("context:\n  passed: ${{ env.get(\"COMPAT_TEST_VAR\") }}\n");
        let snapshot = EnvSnapshot::empty().with_var("COMPAT_TEST_VAR", "hello");
        let resolved = load_recipe_context(Some(&block), &BTreeMap::new(), &snapshot).unwrap();
        assert_eq!(
            resolved.get("passed"),
            Some(&ScalarValue::Str("hello".to_string()))
        );

        // A different snapshot sees the new state; nothing is cached.
        let snapshot = EnvSnapshot::empty().with_var("COMPAT_TEST_VAR", "changed");
        let resolved = load_recipe_context(Some(&block), &BTreeMap::new(), &snapshot).unwrap();
        assert_eq!(
            resolved.get("passed"),
            Some(&ScalarValue::Str("changed".to_string()))
        );
    }

    #[test]
    fn test_env_get_default_and_exists() {
        let block = context_block(
            "context:\n  a: ${{ env.get(\"COMPAT_ABSENT\", \"fallback\") }}\n  b: ${{ env.exists(\"COMPAT_ABSENT\") }}\n",
        );
        let resolved =
            load_recipe_context(Some(&block), &BTreeMap::new(), &EnvSnapshot::empty()).unwrap();
        assert_eq!(
            resolved.get("a"),
            Some(&ScalarValue::Str("fallback".to_string()))
        );
        assert_eq!(resolved.get("b"), Some(&ScalarValue::Bool(false)));
    }

    #[test]
    fn test_stackvana_context_chain() {
        let block = context_block(
            r#"context:
  name: stackvana-core
  version: 0.2025.39
  raw_major_version: '${{ (version | split("."))[0] }}'
  raw_minor_version: '${{ (version | split("."))[1] }}'
  raw_patch_version: '${{ (version | split("."))[2] }}'
  patch_version: ${{ "_" + raw_patch_version if (raw_patch_version | length) == 2 else "_0" + raw_patch_version }}
  weekly_dm_tag: ${{ "w_" + raw_minor_version + patch_version }}
  non_weekly_dm_tag: ${{ "v" + (version | replace(".", "_")) }}
  dm_tag: ${{ weekly_dm_tag if raw_major_version == '0' else non_weekly_dm_tag }}
"#,
        );
        let resolved =
            load_recipe_context(Some(&block), &BTreeMap::new(), &EnvSnapshot::empty()).unwrap();
        let get = |name: &str| resolved.get(name).map(ScalarValue::as_variant_string);
        assert_eq!(get("raw_major_version").as_deref(), Some("0"));
        assert_eq!(get("patch_version").as_deref(), Some("_39"));
        assert_eq!(get("weekly_dm_tag").as_deref(), Some("w_2025_39"));
        assert_eq!(get("non_weekly_dm_tag").as_deref(), Some("v0_2025_39"));
        assert_eq!(get("dm_tag").as_deref(), Some("w_2025_39"));
    }
}
