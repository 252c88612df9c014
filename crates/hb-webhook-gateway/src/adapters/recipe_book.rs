//! In-memory recipe store.
//!
//! Loaded once from a JSON array of recipes. Used by the binary when no
//! external store is configured, and by tests.

use crate::domain::types::Recipe;
use crate::ports::outbound::{LookupError, RecipeLookup};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

/// First recipe with every requested ingredient and none of the excluded tags.
pub(crate) fn first_match<'a>(
    recipes: impl IntoIterator<Item = &'a Recipe>,
    include: &BTreeSet<String>,
    exclude: &BTreeSet<String>,
) -> Option<Recipe> {
    recipes
        .into_iter()
        .find(|r| r.contains_all(include) && !r.has_any_tag(exclude))
        .cloned()
}

/// Fixed list of recipes, searched in file order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecipeBook {
    recipes: Vec<Recipe>,
}

impl InMemoryRecipeBook {
    pub fn new(recipes: Vec<Recipe>) -> Self {
        Self { recipes }
    }

    pub fn from_json(json: &str) -> Result<Self, LookupError> {
        let recipes: Vec<Recipe> =
            serde_json::from_str(json).map_err(|e| LookupError(format!("invalid recipe file: {}", e)))?;
        Ok(Self::new(recipes))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LookupError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| LookupError(format!("cannot read {}: {}", path.display(), e)))?;
        let book = Self::from_json(&json)?;
        info!(path = %path.display(), recipes = book.len(), "Loaded recipe book");
        Ok(book)
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

#[async_trait]
impl RecipeLookup for InMemoryRecipeBook {
    async fn find(
        &self,
        include: &BTreeSet<String>,
        exclude: &BTreeSet<String>,
    ) -> Result<Option<Recipe>, LookupError> {
        Ok(first_match(&self.recipes, include, exclude))
    }
}
