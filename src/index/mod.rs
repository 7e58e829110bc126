pub mod extendible_hash;

use anyhow::{bail, Result};

use crate::buffer_pool::ArcBufferPool;
use crate::errors::Error;
use crate::tuple::{Rid, Tuple};
use crate::types::Value;
use extendible_hash::{ExtendibleHashTable, HashFunction};

/// A secondary index over one integer column, backed by the extendible
/// hash table. Key tuples are the row projected onto `key_attrs` (see
/// [`Tuple::key_from_tuple`]); the stored key is the first projected
/// column's integer value.
pub struct Index {
    key_attrs: Vec<usize>,
    hash_table: ExtendibleHashTable<i64, Rid>,
}

impl Index {
    pub fn new(bpm: ArcBufferPool, key_attrs: Vec<usize>) -> Result<Self> {
        Ok(Self {
            key_attrs,
            hash_table: ExtendibleHashTable::new(bpm, HashFunction::default())?,
        })
    }

    pub fn key_attrs(&self) -> &[usize] {
        &self.key_attrs
    }

    fn key_of(key_tuple: &Tuple) -> Result<i64> {
        match key_tuple.value_at(0)? {
            Value::Int(key) => Ok(*key),
            other => bail!(Error::Internal(format!(
                "hash index keys must be integers, got {other}"
            ))),
        }
    }

    pub fn insert_entry(&self, key_tuple: &Tuple, rid: Rid) -> Result<bool> {
        self.hash_table.insert(&Self::key_of(key_tuple)?, &rid)
    }

    pub fn delete_entry(&self, key_tuple: &Tuple, rid: Rid) -> Result<bool> {
        self.hash_table.remove(&Self::key_of(key_tuple)?, &rid)
    }

    pub fn scan_key(&self, key_tuple: &Tuple) -> Result<Vec<Rid>> {
        self.hash_table.get_value(&Self::key_of(key_tuple)?)
    }
}
