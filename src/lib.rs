//! recipe-compat - rattler-build recipe compatibility layer
//!
//! A compatibility shim that lets conda-build style tooling consume recipes
//! and variant configuration written for rattler-build. It loads, renders,
//! and re-serializes `recipe.yaml` documents, mapping the new dialect's
//! template syntax, jinja-style context variables, and variant substitution
//! rules onto constructs legacy tooling understands.
//!
//! # Architecture Overview
//!
//! Processing is a pipeline of pure tree transforms:
//! - load the document with typing fidelity ([`yaml`])
//! - resolve the `context:` block of named expressions ([`jinja`])
//! - expand outputs across the combinations of the variant keys each output
//!   actually uses ([`render::variants`])
//! - re-render once per combination and wrap each result in a read-only
//!   facade ([`metadata`])
//!
//! ## Key Behaviors
//!
//! - **Used-variant reduction**: an output only branches on variant keys
//!   its requirements/build/script actually reference; unrelated axes are
//!   reduced to their first candidate but kept in the variant dict
//! - **Missing names never crash**: an unresolved reference renders as a
//!   `<name>_undefined` placeholder so partial recipes stay inspectable
//! - **Boolean compatibility**: `"true"`/`"false"` variant strings evaluate
//!   as booleans but are reported back in string form
//! - **Round-trip typing**: float scalars re-serialize with their original
//!   text; plain `"true"`/`"false"` strings re-serialize as booleans
//!
//! # Core Modules
//!
//! - [`yaml`] - scalar-typed document model and codec
//! - [`jinja`] - expression evaluation, context resolution, env snapshots
//! - [`render`] - tree rendering, variant expansion, the [`render::render`]
//!   entry point
//! - [`metadata`] - per-output read-only metadata facade
//! - [`sources`] - source-archive resolution across variant sets
//! - [`loader`] / [`utils`] - file loading and recipe detection
//! - [`core`] - the error taxonomy
//!
//! # Example
//!
//! ```rust,no_run
//! use recipe_compat::render::{render, variants::VariantConfig};
//!
//! # fn main() -> recipe_compat::Result<()> {
//! let mut variants = VariantConfig::new();
//! variants.insert("python", ["3.12", "3.13"]);
//!
//! let rendered = render(
//!     std::path::Path::new("./my-feedstock"),
//!     Some(&variants),
//!     "linux",
//!     "64",
//! )?;
//! for (meta, _, _) in &rendered {
//!     println!("{} uses {:?}", meta.dist()?, meta.get_used_vars());
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod jinja;
pub mod loader;
pub mod metadata;
pub mod render;
pub mod sources;
pub mod utils;
pub mod yaml;

pub use crate::core::{RecipeError, Result};
pub use crate::jinja::EnvSnapshot;
pub use crate::metadata::Metadata;
pub use crate::render::variants::{VariantConfig, VariantExpansion};
pub use crate::render::{render, render_recipe_with_context};
pub use crate::sources::{RecipeSource, render_all_sources};
