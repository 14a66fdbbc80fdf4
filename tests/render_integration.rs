//! End-to-end rendering scenarios over on-disk recipe fixtures.
//!
//! These tests drive the public API the way feedstock tooling does: load a
//! recipe from disk, render it against a variant matrix, and inspect the
//! resulting metadata facades.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serial_test::serial;

use recipe_compat::loader::parse_recipe_config_file;
use recipe_compat::{Metadata, VariantConfig, render};

/// Best-effort log init so failing runs can be re-run with RUST_LOG=debug.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

/// A feedstock checkout: `<root>/recipe/recipe.yaml`.
fn feedstock_with(recipe_fixture: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("create feedstock dir");
    fs::create_dir(dir.path().join("recipe")).expect("create recipe dir");
    fs::copy(
        fixture(recipe_fixture),
        dir.path().join("recipe").join("recipe.yaml"),
    )
    .expect("copy recipe fixture");
    dir
}

fn set_env(key: &str, value: &str) {
    // SAFETY: env-mutating tests are serialized via #[serial].
    unsafe { std::env::set_var(key, value) }
}

fn remove_env(key: &str) {
    // SAFETY: see set_env.
    unsafe { std::env::remove_var(key) }
}

#[test]
fn test_render_recipe() -> Result<()> {
    init_logging();
    let recipe_dir = fixture("python_recipe");
    let variants = parse_recipe_config_file(&recipe_dir.join("variants.yaml"), None)?;

    let rendered = render(&recipe_dir, Some(&variants), "linux", "64")?;

    let all_used_variants: Vec<BTreeMap<String, String>> =
        rendered.iter().map(|(meta, _, _)| meta.get_used_variant()).collect();

    // python and openssl are referenced (2 x 2); libzlib is not and must
    // not multiply.
    assert_eq!(all_used_variants.len(), 4);
    let combos: Vec<(&str, &str)> = all_used_variants
        .iter()
        .map(|used| (used["python"].as_str(), used["openssl"].as_str()))
        .collect();
    assert_eq!(
        combos,
        vec![
            ("3.11", "1.1"),
            ("3.11", "3.0"),
            ("3.12", "1.1"),
            ("3.12", "3.0"),
        ]
    );

    for (meta, _, _) in &rendered {
        assert!(!meta.get_used_vars().contains("libzlib"));
        assert_eq!(meta.variant()["libzlib"], "1.2", "first candidate wins");
    }
    Ok(())
}

#[test]
#[serial]
fn test_environ_is_passed_to_render() {
    let flag = "RECIPE_COMPAT_TEST_FLAG";
    set_env(flag, "false");
    let rendered = render(&fixture("env_recipe"), None, "linux", "64").expect("render");
    assert_eq!(rendered.len(), 1);
    let context_value = |meta: &Metadata| {
        meta.rendered_recipe()
            .get("context")
            .and_then(|c| c.get("tests_enabled"))
            .and_then(|n| n.as_scalar())
            .map(|s| s.value.clone())
    };
    assert_eq!(
        context_value(&rendered[0].0),
        Some(recipe_compat::yaml::ScalarValue::Bool(false))
    );

    // Re-rendering observes the changed environment: snapshots are taken
    // per render call, never cached.
    set_env(flag, "true");
    let rendered = render(&fixture("env_recipe"), None, "linux", "64").expect("render");
    assert_eq!(
        context_value(&rendered[0].0),
        Some(recipe_compat::yaml::ScalarValue::Bool(true))
    );
    remove_env(flag);
}

#[test]
fn test_metadata_for_single_output() {
    let feedstock = feedstock_with("rich_recipe.yaml");

    let meta = Metadata::from_recipe_dir(feedstock.path()).expect("metadata");
    assert_eq!(meta.name().unwrap(), "rich");
    assert_eq!(meta.version().unwrap(), "13.4.2");
    assert_eq!(meta.dist().unwrap(), "rich-13.4.2-unrendered_0");
}

#[test]
fn test_metadata_for_multiple_output() {
    let feedstock = feedstock_with("multiple_outputs.yaml");

    let meta = Metadata::from_recipe_dir(feedstock.path()).expect("metadata");
    assert_eq!(meta.name().unwrap(), "mamba-split");
    assert_eq!(meta.version().unwrap(), "1.5.8");
}

#[test]
fn test_metadata_when_rendering_multiple_output() {
    let rendered =
        render(&fixture("multiple_outputs.yaml"), None, "linux", "64").expect("render");

    assert_eq!(rendered[0].0.name().unwrap(), "libmamba");
    assert_eq!(rendered[0].0.version().unwrap(), "1.5.8");
}

#[test]
fn test_used_variant() -> Result<()> {
    // A variant file may declare keys named after outputs of the package
    // itself (pin-style entries); only template references count as usage.
    let mut variants = VariantConfig::new();
    variants.insert("libmamba", ["1", "2"]);
    variants.insert("unused", ["scalar"]);
    variants.insert("python", ["3.12", "3.13"]);

    let rendered = render(&fixture("multiple_outputs.yaml"), Some(&variants), "linux", "64")?;

    // 3 outputs, 2 of which use python.
    assert_eq!(rendered.len(), 5);
    let (meta, _, _) = rendered.last().unwrap();
    assert!(!meta.get_used_vars().contains("libmamba"));
    assert!(!meta.get_used_variant().contains_key("libmamba"));
    assert!(meta.get_used_variant().contains_key("python"));

    // Unused keys stay in the variant dicts, reduced to the first scalar.
    for (meta, _, _) in &rendered {
        assert_eq!(meta.variant()["libmamba"], "1");
        assert!(meta.variant().contains_key("unused"));
    }
    Ok(())
}

#[test]
fn test_bool_roundtrip() -> Result<()> {
    // conda-build variants are always strings; 'true'/'false' act as bools
    // during render but come back as strings in the used-variant dict.
    let mut variants = VariantConfig::new();
    variants.insert("is_abi3", ["true", "false"]);
    variants.insert("python", ["3.12", "3.13"]);
    variants.add_zip_group(["python", "is_abi3"]);

    let rendered = render(&fixture("py_abi3_recipe.yaml"), Some(&variants), "linux", "64")?;

    assert_eq!(rendered.len(), 2);
    let (meta_abi3, _, _) = &rendered[0];
    let (meta_noabi3, _, _) = &rendered[1];

    assert_eq!(meta_abi3.get_used_variant()["is_abi3"], "true");
    assert_eq!(meta_noabi3.get_used_variant()["is_abi3"], "false");

    assert_eq!(
        meta_abi3.build_configuration()["variant"]["is_abi3"],
        serde_json::Value::Bool(true)
    );
    assert_eq!(
        meta_noabi3.build_configuration()["variant"]["is_abi3"],
        serde_json::Value::Bool(false)
    );

    let host_entries = |meta: &Metadata| -> Vec<String> {
        meta.output()
            .get("requirements")
            .and_then(|r| r.get("host"))
            .and_then(|h| h.as_sequence())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|n| n.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };
    assert!(host_entries(meta_abi3).iter().any(|e| e == "python-abi3"));
    assert!(!host_entries(meta_noabi3).iter().any(|e| e == "python-abi3"));

    assert_eq!(meta_abi3.build_string().as_deref(), Some("abi3_0"));
    assert_eq!(meta_noabi3.build_string().as_deref(), Some("py313_0"));
    Ok(())
}

#[test]
fn test_rendered_documents_are_stable_under_rerender() {
    // Rendering a fully-resolved document again must be a no-op.
    let rendered = render(&fixture("rich_recipe.yaml"), None, "linux", "64").expect("render");
    let (meta, _, _) = &rendered[0];

    let again = recipe_compat::render_recipe_with_context(
        meta.rendered_recipe(),
        &BTreeMap::new(),
        &recipe_compat::EnvSnapshot::empty(),
    )
    .expect("re-render");
    assert_eq!(&again, meta.rendered_recipe());
}
