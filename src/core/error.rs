//! Error handling for recipe-compat
//!
//! This module provides the error types shared by every stage of recipe
//! processing: loading, context evaluation, rendering, variant expansion,
//! and metadata extraction.
//!
//! # Design
//!
//! The error system follows two principles:
//! 1. **Strongly-typed errors** for precise handling in code - each variant
//!    represents one specific failure mode with the fields needed to report it
//! 2. **Partial renders are not failures** - an unresolved name reference is
//!    deliberately *not* an error; it resolves to a missing-sentinel value so
//!    that incomplete recipes can still be rendered for inspection (see
//!    [`crate::jinja::undefined`])
//!
//! # Error Categories
//!
//! - **Expression evaluation**: [`RecipeError::ExpressionSyntax`]
//! - **Variant expansion**: [`RecipeError::VariantZipLength`]
//! - **Metadata extraction**: [`RecipeError::MissingField`]
//! - **Loading**: [`RecipeError::YamlParse`], [`RecipeError::RecipeNotFound`],
//!   [`RecipeError::Io`]
//!
//! All fatal errors are raised synchronously from the call that triggered
//! them and are never retried internally. A failed render leaves unrelated
//! renders unaffected.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for recipe-compat operations
///
/// Each variant represents a specific failure mode and carries the context
/// needed to surface a useful message to the caller.
#[derive(Error, Debug)]
pub enum RecipeError {
    /// A template expression could not be compiled or evaluated
    ///
    /// This covers both malformed expression syntax and evaluation failures
    /// such as calling a filter with arguments of the wrong type. It is fatal
    /// for the render that triggered it.
    ///
    /// # Fields
    /// - `entry`: the context entry or document field containing the expression
    /// - `reason`: the underlying engine diagnostic
    #[error("invalid expression in '{entry}': {reason}")]
    ExpressionSyntax {
        /// The context entry or document field containing the expression
        entry: String,
        /// The underlying engine diagnostic
        reason: String,
    },

    /// Zipped variant keys have candidate lists of different lengths
    ///
    /// Keys grouped under `zip_keys` must co-vary index-aligned, which is
    /// only possible when their candidate lists have equal length. This error
    /// aborts the whole expansion: no partial combination list is returned,
    /// since a half-expanded variant matrix is worse than no result.
    #[error("zipped variant keys {group:?} have mismatched lengths: {details}")]
    VariantZipLength {
        /// The zip group with the mismatch
        group: Vec<String>,
        /// Per-key candidate counts
        details: String,
    },

    /// A required identity field is absent after full rendering
    ///
    /// Raised only at the metadata-construction boundary, never during tree
    /// rendering, so a recipe can be partially rendered for inspection even
    /// if incomplete.
    #[error("recipe is missing required field '{field}'")]
    MissingField {
        /// The dotted path of the missing field (e.g. `package.name`)
        field: String,
    },

    /// The recipe or variant config file is not valid YAML
    #[error("invalid recipe YAML: {reason}")]
    YamlParse {
        /// The underlying parser diagnostic
        reason: String,
    },

    /// No recipe file was found at the given location
    ///
    /// A recipe path may point at a `recipe.yaml` directly, or at a feedstock
    /// directory containing `recipe.yaml` or `recipe/recipe.yaml`.
    #[error("no recipe found at {path}")]
    RecipeNotFound {
        /// The path that was searched
        path: PathBuf,
    },

    /// I/O error from [`std::io::Error`]
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, RecipeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RecipeError::ExpressionSyntax {
            entry: "version".to_string(),
            reason: "unexpected end of expression".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid expression in 'version': unexpected end of expression"
        );

        let err = RecipeError::MissingField {
            field: "package.name".to_string(),
        };
        assert!(err.to_string().contains("package.name"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RecipeError = io.into();
        assert!(matches!(err, RecipeError::Io(_)));
    }
}
