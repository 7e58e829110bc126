pub mod schema;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::pages::{PageId, SlotId, INVALID_PAGE_ID};
use crate::types::Value;

/// Record id: the page and slot a row lives at.
pub type Rid = (PageId, SlotId);

pub const INVALID_RID: Rid = (INVALID_PAGE_ID, 0);

/// A row of values. Serialized with bincode when stored in a table
/// page, so no schema is needed to read one back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tuple {
    values: Vec<Value>,
}

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value_at(&self, idx: usize) -> Result<&Value> {
        self.values
            .get(idx)
            .ok_or(anyhow!("column {idx} out of bounds"))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&self.values)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            values: bincode::deserialize(bytes)?,
        })
    }

    /// Project the row onto an index's key columns.
    pub fn key_from_tuple(&self, key_attrs: &[usize]) -> Result<Tuple> {
        let values = key_attrs
            .iter()
            .map(|&attr| self.value_at(attr).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Tuple::new(values))
    }
}
