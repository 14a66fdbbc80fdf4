//! Filesystem helpers for recipe detection.

use std::path::{Path, PathBuf};

use crate::core::{RecipeError, Result};

/// Whether a directory contains a new-format recipe.
///
/// Legacy checkouts carry `meta.yaml`; the new dialect uses `recipe.yaml`.
/// Tooling uses this to decide which engine a feedstock targets.
pub fn has_recipe(recipe_dir: &Path) -> bool {
    recipe_dir.join("recipe.yaml").is_file()
}

/// Resolves a recipe argument to the actual `recipe.yaml` path.
///
/// Accepts the file itself, a directory containing `recipe.yaml`, or a
/// feedstock root with `recipe/recipe.yaml`.
///
/// # Errors
///
/// [`RecipeError::RecipeNotFound`] when none of the candidates exists.
pub fn find_recipe(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    for candidate in [path.join("recipe.yaml"), path.join("recipe").join("recipe.yaml")] {
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(RecipeError::RecipeNotFound {
        path: path.to_path_buf(),
    })
}
