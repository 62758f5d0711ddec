use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One column's decoded value.
///
/// `data` is copied out of the change vector, so it outlives the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnChange {
    pub column_id: u16,
    pub data: Vec<u8>,
}

impl ColumnChange {
    pub fn new(column_id: u16, data: impl Into<Vec<u8>>) -> Self {
        Self {
            column_id,
            data: data.into(),
        }
    }

    /// Byte count; 0 means NULL or empty.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_null(&self) -> bool {
        self.data.is_empty()
    }
}

/// Columns in on-wire order.
pub type Row = Vec<ColumnChange>;

/// Primary-key columns keyed (and therefore sorted) by column id.
pub type OrderedPk = BTreeMap<u16, ColumnChange>;
