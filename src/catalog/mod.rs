use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::RwLock;

use crate::buffer_pool::ArcBufferPool;
use crate::errors::Error;
use crate::index::Index;
use crate::table::TableHeap;
use crate::tuple::schema::Schema;

pub type TableOid = u32;
pub type IndexOid = u32;
pub type ArcCatalog = Arc<RwLock<Catalog>>;

pub struct TableInfo {
    pub name: String,
    pub oid: TableOid,
    pub schema: Schema,
    pub table: Arc<TableHeap>,
}

impl std::fmt::Debug for TableInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableInfo")
            .field("name", &self.name)
            .field("oid", &self.oid)
            .field("schema", &self.schema)
            .finish()
    }
}

pub struct IndexInfo {
    pub name: String,
    pub oid: IndexOid,
    pub table_name: String,
    pub key_schema: Schema,
    pub key_attrs: Vec<usize>,
    pub index: Arc<Index>,
}

/// Table and index registry. In-memory only: the engine core does not
/// persist its metadata.
pub struct Catalog {
    bpm: ArcBufferPool,
    tables: HashMap<TableOid, TableInfo>,
    table_names: HashMap<String, TableOid>,
    indexes: HashMap<IndexOid, IndexInfo>,
    table_indexes: HashMap<String, Vec<IndexOid>>,
    next_table_oid: TableOid,
    next_index_oid: IndexOid,
}

impl Catalog {
    pub fn new(bpm: ArcBufferPool) -> Self {
        Self {
            bpm,
            tables: HashMap::new(),
            table_names: HashMap::new(),
            indexes: HashMap::new(),
            table_indexes: HashMap::new(),
            next_table_oid: 0,
            next_index_oid: 0,
        }
    }

    pub fn create_table(&mut self, name: &str, schema: &Schema) -> Result<&TableInfo> {
        if self.table_names.contains_key(name) {
            bail!(Error::TableExists(name.to_string()));
        }

        let oid = self.next_table_oid;
        self.next_table_oid += 1;

        let info = TableInfo {
            name: name.to_string(),
            oid,
            schema: schema.clone(),
            table: Arc::new(TableHeap::new(self.bpm.clone())?),
        };
        self.table_names.insert(name.to_string(), oid);
        self.tables.insert(oid, info);
        Ok(&self.tables[&oid])
    }

    pub fn get_table(&self, oid: TableOid) -> Option<&TableInfo> {
        self.tables.get(&oid)
    }

    pub fn get_table_by_name(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(self.table_names.get(name)?)
    }

    /// Create an index over `key_attrs` and back-fill it from the
    /// table's current contents.
    pub fn create_index(
        &mut self,
        index_name: &str,
        table_name: &str,
        key_attrs: Vec<usize>,
    ) -> Result<&IndexInfo> {
        let (heap, key_schema) = {
            let Some(table_info) = self.get_table_by_name(table_name) else {
                bail!(Error::TableNotFound(table_name.to_string()));
            };
            (table_info.table.clone(), table_info.schema.project(&key_attrs))
        };

        let index = Index::new(self.bpm.clone(), key_attrs.clone())?;
        for (rid, tuple) in heap.iter()? {
            index.insert_entry(&tuple.key_from_tuple(&key_attrs)?, rid)?;
        }

        let oid = self.next_index_oid;
        self.next_index_oid += 1;

        let info = IndexInfo {
            name: index_name.to_string(),
            oid,
            table_name: table_name.to_string(),
            key_schema,
            key_attrs,
            index: Arc::new(index),
        };
        self.indexes.insert(oid, info);
        self.table_indexes
            .entry(table_name.to_string())
            .or_default()
            .push(oid);
        Ok(&self.indexes[&oid])
    }

    pub fn get_index(&self, oid: IndexOid) -> Option<&IndexInfo> {
        self.indexes.get(&oid)
    }

    pub fn get_table_indexes(&self, table_name: &str) -> Vec<&IndexInfo> {
        self.table_indexes
            .get(table_name)
            .map(|oids| oids.iter().map(|oid| &self.indexes[oid]).collect())
            .unwrap_or_default()
    }
}
