pub mod table_iterator;

use anyhow::{bail, Result};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::buffer_pool::ArcBufferPool;
use crate::catalog::TableOid;
use crate::concurrency::transaction::{TableWriteRecord, Transaction, WType};
use crate::errors::Error;
use crate::pages::table_page::{self, MAX_TUPLE_SIZE};
use crate::pages::PageId;
use crate::tuple::{Rid, Tuple};
use table_iterator::TableIterator;

/// A heap of tuples over a chain of slotted pages. Mutations performed
/// on behalf of a transaction are recorded on its table write set so an
/// abort can undo them.
pub struct TableHeap {
    bpm: ArcBufferPool,
    first_page_id: PageId,
    last_page_id: Mutex<PageId>,
}

impl TableHeap {
    pub fn new(bpm: ArcBufferPool) -> Result<Self> {
        let page = bpm.lock().new_page()?;
        let page_id = page.page_id();
        table_page::init(&mut page.data_mut());
        bpm.lock().unpin_page(page_id, true);

        Ok(Self {
            bpm,
            first_page_id: page_id,
            last_page_id: Mutex::new(page_id),
        })
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    pub fn insert_tuple(
        &self,
        tuple: &Tuple,
        table_oid: TableOid,
        txn: Option<&Arc<Transaction>>,
    ) -> Result<Rid> {
        let bytes = tuple.to_bytes()?;
        if bytes.len() > MAX_TUPLE_SIZE {
            bail!(Error::TupleTooBig(MAX_TUPLE_SIZE, bytes.len()));
        }

        let mut last_page_id = self.last_page_id.lock();
        loop {
            let page = self.bpm.lock().fetch_page(*last_page_id)?;
            let slot = table_page::insert_tuple(&mut page.data_mut(), &bytes);

            if let Some(slot) = slot {
                let rid = (*last_page_id, slot);
                self.bpm.lock().unpin_page(rid.0, true);
                if let Some(txn) = txn {
                    txn.append_table_write(TableWriteRecord {
                        rid,
                        table_oid,
                        wtype: WType::Insert,
                        tuple: tuple.clone(),
                    });
                }
                return Ok(rid);
            }

            // the last page is full; chain a fresh one and retry there
            let new_page = self.bpm.lock().new_page()?;
            let new_page_id = new_page.page_id();
            table_page::init(&mut new_page.data_mut());
            table_page::set_next_page_id(&mut page.data_mut(), new_page_id);

            let mut pool = self.bpm.lock();
            pool.unpin_page(*last_page_id, true);
            pool.unpin_page(new_page_id, true);
            drop(pool);
            *last_page_id = new_page_id;
        }
    }

    pub fn get_tuple(&self, rid: Rid) -> Result<Option<Tuple>> {
        let (page_id, slot) = rid;
        let page = self.bpm.lock().fetch_page(page_id)?;
        let entry = table_page::read_tuple(&page.data(), slot);
        self.bpm.lock().unpin_page(page_id, false);

        match entry {
            Some((false, bytes)) => Ok(Some(Tuple::from_bytes(&bytes)?)),
            _ => Ok(None),
        }
    }

    /// Tombstone a tuple. Returns `false` when the slot is missing or
    /// already deleted.
    pub fn mark_delete(
        &self,
        rid: Rid,
        table_oid: TableOid,
        txn: Option<&Arc<Transaction>>,
    ) -> Result<bool> {
        let (page_id, slot) = rid;
        let page = self.bpm.lock().fetch_page(page_id)?;

        let (deleted, old_tuple) = {
            let mut data = page.data_mut();
            let old = table_page::read_tuple(&data, slot);
            (table_page::mark_delete(&mut data, slot), old)
        };
        self.bpm.lock().unpin_page(page_id, deleted);

        if deleted {
            if let (Some(txn), Some((_, bytes))) = (txn, old_tuple) {
                txn.append_table_write(TableWriteRecord {
                    rid,
                    table_oid,
                    wtype: WType::Delete,
                    tuple: Tuple::from_bytes(&bytes)?,
                });
            }
        }
        Ok(deleted)
    }

    /// Undo a [`mark_delete`], used on transaction rollback.
    ///
    /// [`mark_delete`]: TableHeap::mark_delete
    pub fn rollback_delete(&self, rid: Rid) -> Result<bool> {
        let (page_id, slot) = rid;
        let page = self.bpm.lock().fetch_page(page_id)?;
        let restored = table_page::rollback_delete(&mut page.data_mut(), slot);
        self.bpm.lock().unpin_page(page_id, restored);
        Ok(restored)
    }

    pub fn update_tuple(
        &self,
        new_tuple: &Tuple,
        rid: Rid,
        table_oid: TableOid,
        txn: Option<&Arc<Transaction>>,
    ) -> Result<bool> {
        let (page_id, slot) = rid;
        let bytes = new_tuple.to_bytes()?;
        let page = self.bpm.lock().fetch_page(page_id)?;

        let (updated, old_tuple) = {
            let mut data = page.data_mut();
            let old = table_page::read_tuple(&data, slot);
            (table_page::update_tuple(&mut data, slot, &bytes), old)
        };
        self.bpm.lock().unpin_page(page_id, updated);

        if updated {
            if let (Some(txn), Some((_, old_bytes))) = (txn, old_tuple) {
                txn.append_table_write(TableWriteRecord {
                    rid,
                    table_oid,
                    wtype: WType::Update,
                    tuple: Tuple::from_bytes(&old_bytes)?,
                });
            }
        }
        Ok(updated)
    }

    pub fn iter(&self) -> Result<TableIterator> {
        TableIterator::new(self)
    }

    pub(crate) fn bpm(&self) -> &ArcBufferPool {
        &self.bpm
    }
}
