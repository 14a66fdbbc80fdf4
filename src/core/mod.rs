//! Core types for recipe-compat
//!
//! This module forms the foundation of the crate's type system. It currently
//! provides the error taxonomy shared by all processing stages; see
//! [`error`] for the full catalogue of failure modes and the rationale for
//! which conditions are errors and which resolve to sentinel values instead.

pub mod error;

pub use error::{RecipeError, Result};
