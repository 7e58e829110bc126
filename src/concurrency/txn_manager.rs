use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

use super::lock_manager::LockManager;
use super::transaction::{IsolationLevel, Transaction, TransactionState, TxnId, WType};
use crate::catalog::ArcCatalog;
use crate::printdbg;

pub type ArcTransactionManager = Arc<TransactionManager>;

/// Hands out transaction ids (monotone, so id order is age order) and
/// owns the commit/abort hooks. Aborting reverses the transaction's
/// table and index write sets newest-first, then releases its locks.
pub struct TransactionManager {
    next_txn_id: AtomicI32,
    lock_manager: Arc<LockManager>,
    catalog: ArcCatalog,
    txn_table: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionManager {
    pub fn new(lock_manager: Arc<LockManager>, catalog: ArcCatalog) -> Self {
        Self {
            next_txn_id: AtomicI32::new(0),
            lock_manager,
            catalog,
            txn_table: Mutex::new(HashMap::new()),
        }
    }

    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let id = self.next_txn_id.fetch_add(1, Ordering::Relaxed);
        let txn = Arc::new(Transaction::new(id, isolation_level));
        self.txn_table.lock().insert(id, txn.clone());
        printdbg!("Started txn {id}");
        txn
    }

    pub fn get_transaction(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.txn_table.lock().get(&txn_id).cloned()
    }

    pub fn commit(&self, txn: &Arc<Transaction>) -> Result<()> {
        txn.set_state(TransactionState::Committed);
        // committed work keeps its effects; only the locks go away
        txn.take_table_write_set();
        txn.take_index_write_set();
        self.release_locks(txn);
        printdbg!("Committed txn {}", txn.id());
        Ok(())
    }

    /// Abort hook: also invoked by executors when a lock request comes
    /// back denied.
    pub fn abort(&self, txn: &Arc<Transaction>) -> Result<()> {
        txn.set_state(TransactionState::Aborted);

        for record in txn.take_table_write_set().into_iter().rev() {
            let catalog = self.catalog.read();
            let Some(info) = catalog.get_table(record.table_oid) else {
                continue;
            };
            match record.wtype {
                WType::Insert => {
                    info.table.mark_delete(record.rid, record.table_oid, None)?;
                }
                WType::Delete => {
                    info.table.rollback_delete(record.rid)?;
                }
                WType::Update => {
                    info.table
                        .update_tuple(&record.tuple, record.rid, record.table_oid, None)?;
                }
            }
        }

        for record in txn.take_index_write_set().into_iter().rev() {
            let catalog = self.catalog.read();
            let Some(info) = catalog.get_index(record.index_oid) else {
                continue;
            };
            let key = record.tuple.key_from_tuple(info.index.key_attrs())?;
            match record.wtype {
                WType::Insert => {
                    info.index.delete_entry(&key, record.rid)?;
                }
                WType::Delete => {
                    info.index.insert_entry(&key, record.rid)?;
                }
                WType::Update => {}
            }
        }

        self.release_locks(txn);
        printdbg!("Aborted txn {}", txn.id());
        Ok(())
    }

    fn release_locks(&self, txn: &Arc<Transaction>) {
        for rid in txn.locked_rids() {
            let _ = self.lock_manager.unlock(txn, rid);
        }
    }
}
