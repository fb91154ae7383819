//! Dataset boundary types.
//!
//! Storage and retrieval live outside this core; items are carried as
//! opaque JSON so the optimizer never depends on dataset-layer models.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An evaluation dataset: a name plus its items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub items: Vec<Value>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, items: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items to evaluate, honoring an optional subsample cap.
    pub fn sample_items(&self, n_samples: Option<usize>) -> &[Value] {
        match n_samples {
            Some(n) if n < self.items.len() => &self.items[..n],
            _ => &self.items,
        }
    }
}
