use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{OrderedPk, Row};

/// Table metadata needed to pick primary-key columns out of a row.
///
/// Column ids are the 0-based numbers carried in change vectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabDef {
    pub object_id: u32,
    #[serde(default)]
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub column_names: Vec<String>,
    #[serde(default)]
    pub pk_columns: Vec<u16>,
}

/// Source of table definitions keyed by object id.
pub trait SchemaLookup: Send + Sync {
    fn table_def(&self, object_id: u32) -> Option<Arc<TabDef>>;
}

/// Lookup that knows no tables; every row is keyless.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSchema;

impl SchemaLookup for NoSchema {
    fn table_def(&self, _object_id: u32) -> Option<Arc<TabDef>> {
        None
    }
}

/// In-memory table definitions.
#[derive(Debug, Default)]
pub struct SchemaCache {
    tables: RwLock<HashMap<u32, Arc<TabDef>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_defs(defs: impl IntoIterator<Item = TabDef>) -> Self {
        let cache = Self::new();
        for def in defs {
            cache.insert(def);
        }
        cache
    }

    /// Adds or replaces a definition.
    pub fn insert(&self, def: TabDef) {
        self.tables.write().insert(def.object_id, Arc::new(def));
    }

    pub fn remove(&self, object_id: u32) -> Option<Arc<TabDef>> {
        self.tables.write().remove(&object_id)
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}

impl SchemaLookup for SchemaCache {
    fn table_def(&self, object_id: u32) -> Option<Arc<TabDef>> {
        self.tables.read().get(&object_id).cloned()
    }
}

/// Collects the primary-key columns present in `row`.
///
/// Returns how many were found; 0 with an empty set when the table is
/// unknown or has no key.
pub fn find_pk(tab: Option<&TabDef>, row: &Row) -> (usize, OrderedPk) {
    let mut pk = OrderedPk::new();
    let Some(tab) = tab else {
        return (0, pk);
    };
    for column in row {
        if tab.pk_columns.contains(&column.column_id) {
            pk.insert(column.column_id, column.clone());
        }
    }
    (pk.len(), pk)
}
