//! Read-only reference nutrient store loaded from the food database JSON.
use std::path::Path;

use thiserror::Error;
use tracing::info;

pub mod models;

pub use models::{FoodId, FoodItem, TrackedNutrient};

/// Errors raised while loading the reference dataset.
#[derive(Error, Debug)]
pub enum DataLoadError {
    #[error("failed to read food database {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed food database {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Immutable collection of reference foods.
///
/// Never mutated after construction, so it can be shared behind `Arc`
/// between any number of concurrent readers.
#[derive(Debug, Default)]
pub struct NutrientStore {
    items: Vec<FoodItem>,
    lowercase_names: Vec<String>,
}

impl NutrientStore {
    /// Load a serialized array of food records from `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DataLoadError> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        info!("Loading food database: {shown}");

        let data = std::fs::read_to_string(path).map_err(|source| DataLoadError::Io {
            path: shown.clone(),
            source,
        })?;
        let items: Vec<FoodItem> =
            serde_json::from_str(&data).map_err(|source| DataLoadError::Json {
                path: shown.clone(),
                source,
            })?;

        info!("Loaded {} food items from {shown}", items.len());
        Ok(Self::from_items(items))
    }

    /// Build a store from already-deserialized records, keeping their order.
    pub fn from_items(items: Vec<FoodItem>) -> Self {
        let lowercase_names = items.iter().map(|i| i.name.to_lowercase()).collect();
        Self {
            items,
            lowercase_names,
        }
    }

    /// All items in load order.
    pub fn all_items(&self) -> &[FoodItem] {
        &self.items
    }

    /// Lowercased names, index-aligned with [`all_items`](Self::all_items).
    pub fn lowercase_names(&self) -> &[String] {
        &self.lowercase_names
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
