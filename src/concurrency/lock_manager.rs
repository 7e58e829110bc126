use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::{Condvar, Mutex};

use super::transaction::{IsolationLevel, Transaction, TransactionState, TxnId, INVALID_TXN_ID};
use crate::errors::{AbortReason, Error};
use crate::printdbg;
use crate::tuple::Rid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

struct LockRequest {
    txn: Arc<Transaction>,
    mode: LockMode,
    granted: bool,
}

impl LockRequest {
    fn new(txn: Arc<Transaction>, mode: LockMode) -> Self {
        Self {
            txn,
            mode,
            granted: false,
        }
    }

    fn txn_id(&self) -> TxnId {
        self.txn.id()
    }

    fn is_aborted(&self) -> bool {
        self.txn.state() == TransactionState::Aborted
    }
}

struct LockRequestQueue {
    requests: VecDeque<LockRequest>,
    cv: Arc<Condvar>,
    upgrading: TxnId,
}

impl Default for LockRequestQueue {
    fn default() -> Self {
        Self {
            requests: VecDeque::new(),
            cv: Arc::new(Condvar::new()),
            upgrading: INVALID_TXN_ID,
        }
    }
}

/// Record-level two-phase locking with wound-wait deadlock prevention.
///
/// One mutex guards the whole lock table; every queue carries its own
/// condition variable (always paired with that one mutex). A requester
/// scans its queue on arrival and on every wake-up: conflicting younger
/// transactions get wounded (state forced to ABORTED, queue notified),
/// and the request is granted once no live older conflicting request
/// precedes it. Older transactions therefore never wait on younger
/// ones, which is what rules out deadlock cycles. A wounded waiter
/// notices its own state on wake-up and surfaces [`AbortReason::Deadlock`].
pub struct LockManager {
    latch: Mutex<HashMap<Rid, LockRequestQueue>>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            latch: Mutex::new(HashMap::new()),
        }
    }

    fn abort(txn: &Arc<Transaction>, reason: AbortReason) -> Error {
        txn.set_state(TransactionState::Aborted);
        Error::TransactionAborted(txn.id(), reason)
    }

    /// Wound every live younger transaction in the queue whose mode
    /// conflicts with `mode`, wherever it sits. Returns whether anything
    /// was wounded and whether an older live conflicting request
    /// precedes `my_id`.
    fn scan(queue: &mut LockRequestQueue, my_id: TxnId, mode: LockMode) -> (bool, bool) {
        let mut blocked = false;
        let mut wounded = false;
        let mut reached_self = false;

        for request in queue.requests.iter_mut() {
            if request.txn_id() == my_id {
                reached_self = true;
                continue;
            }
            let conflicts =
                mode == LockMode::Exclusive || request.mode == LockMode::Exclusive;
            if !conflicts {
                continue;
            }
            if request.txn_id() > my_id {
                if !request.is_aborted() {
                    printdbg!("txn {} wounds txn {}", my_id, request.txn_id());
                    request.txn.set_state(TransactionState::Aborted);
                    wounded = true;
                }
            } else if !reached_self && !request.is_aborted() {
                blocked = true;
            }
        }

        if !blocked {
            for request in queue.requests.iter_mut() {
                if request.txn_id() == my_id {
                    request.granted = true;
                    break;
                }
            }
        }
        (!blocked, wounded)
    }

    fn lock(&self, txn: &Arc<Transaction>, rid: Rid, mode: LockMode) -> Result<bool> {
        if txn.state() == TransactionState::Aborted {
            return Ok(false);
        }
        if mode == LockMode::Shared
            && txn.isolation_level() == IsolationLevel::ReadUncommitted
        {
            bail!(Self::abort(txn, AbortReason::LockSharedOnReadUncommitted));
        }
        if txn.state() == TransactionState::Shrinking {
            bail!(Self::abort(txn, AbortReason::LockOnShrinking));
        }
        let already_held = match mode {
            LockMode::Shared => txn.is_shared_locked(rid) || txn.is_exclusive_locked(rid),
            LockMode::Exclusive => txn.is_exclusive_locked(rid),
        };
        if already_held {
            return Ok(true);
        }
        txn.set_state(TransactionState::Growing);

        let mut table = self.latch.lock();
        let queue = table.entry(rid).or_default();
        queue.requests.push_back(LockRequest::new(txn.clone(), mode));
        match mode {
            LockMode::Shared => txn.add_shared_lock(rid),
            LockMode::Exclusive => txn.add_exclusive_lock(rid),
        }

        loop {
            let queue = table.get_mut(&rid).unwrap();
            let (granted, wounded) = Self::scan(queue, txn.id(), mode);
            if wounded {
                queue.cv.notify_all();
            }
            if granted {
                return Ok(true);
            }

            let cv = queue.cv.clone();
            cv.wait(&mut table);

            if txn.state() == TransactionState::Aborted {
                bail!(Error::TransactionAborted(txn.id(), AbortReason::Deadlock));
            }
        }
    }

    pub fn lock_shared(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<bool> {
        self.lock(txn, rid, LockMode::Shared)
    }

    pub fn lock_exclusive(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<bool> {
        self.lock(txn, rid, LockMode::Exclusive)
    }

    /// Convert an already granted SHARED request to EXCLUSIVE in place.
    /// Only one transaction may be upgrading a record at a time; a
    /// second one is aborted with an upgrade conflict.
    pub fn lock_upgrade(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<bool> {
        if txn.state() == TransactionState::Aborted {
            return Ok(false);
        }
        if txn.state() == TransactionState::Shrinking {
            bail!(Self::abort(txn, AbortReason::LockOnShrinking));
        }
        if txn.is_exclusive_locked(rid) {
            return Ok(true);
        }
        txn.set_state(TransactionState::Growing);

        let mut table = self.latch.lock();
        let queue = table.entry(rid).or_default();
        if queue.upgrading != INVALID_TXN_ID {
            bail!(Self::abort(txn, AbortReason::UpgradeConflict));
        }
        queue.upgrading = txn.id();

        loop {
            let queue = table.get_mut(&rid).unwrap();
            let (granted, wounded) = Self::scan_upgrade(queue, txn.id());
            if wounded {
                queue.cv.notify_all();
            }
            if granted {
                for request in queue.requests.iter_mut() {
                    if request.txn_id() == txn.id() {
                        request.mode = LockMode::Exclusive;
                        request.granted = true;
                        break;
                    }
                }
                queue.upgrading = INVALID_TXN_ID;
                txn.remove_shared_lock(rid);
                txn.add_exclusive_lock(rid);
                return Ok(true);
            }

            let cv = queue.cv.clone();
            cv.wait(&mut table);

            if txn.state() == TransactionState::Aborted {
                if let Some(queue) = table.get_mut(&rid) {
                    if queue.upgrading == txn.id() {
                        queue.upgrading = INVALID_TXN_ID;
                    }
                }
                bail!(Error::TransactionAborted(txn.id(), AbortReason::Deadlock));
            }
        }
    }

    /// Scan the granted prefix: wound younger holders, yield to live
    /// older ones.
    fn scan_upgrade(queue: &mut LockRequestQueue, my_id: TxnId) -> (bool, bool) {
        let mut granted = true;
        let mut wounded = false;
        for request in queue.requests.iter_mut() {
            if !request.granted {
                break;
            }
            if request.txn_id() == my_id {
                continue;
            }
            if request.txn_id() > my_id {
                if !request.is_aborted() {
                    printdbg!("txn {} wounds txn {} on upgrade", my_id, request.txn_id());
                    request.txn.set_state(TransactionState::Aborted);
                    wounded = true;
                }
            } else if !request.is_aborted() {
                granted = false;
            }
        }
        (granted, wounded)
    }

    /// Release a lock. Under REPEATABLE_READ the first release moves the
    /// transaction into its shrinking phase (strict 2PL boundary).
    pub fn unlock(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<bool> {
        if txn.state() == TransactionState::Growing
            && txn.isolation_level() == IsolationLevel::RepeatableRead
        {
            txn.set_state(TransactionState::Shrinking);
        }

        let mut table = self.latch.lock();
        if let Some(queue) = table.get_mut(&rid) {
            if let Some(pos) = queue
                .requests
                .iter()
                .position(|request| request.txn_id() == txn.id())
            {
                queue.requests.remove(pos);
            }
            queue.cv.notify_all();
        }
        drop(table);

        txn.remove_shared_lock(rid);
        txn.remove_exclusive_lock(rid);
        Ok(true)
    }

    #[cfg(test)]
    fn granted_modes(&self, rid: Rid) -> Vec<(TxnId, LockMode)> {
        let table = self.latch.lock();
        table
            .get(&rid)
            .map(|queue| {
                queue
                    .requests
                    .iter()
                    .filter(|r| r.granted && !r.is_aborted())
                    .map(|r| (r.txn_id(), r.mode))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    const RID: Rid = (1, 1);

    fn txn(id: TxnId, isolation: IsolationLevel) -> Arc<Transaction> {
        Arc::new(Transaction::new(id, isolation))
    }

    fn abort_reason(err: &anyhow::Error) -> Option<AbortReason> {
        err.downcast_ref::<Error>().and_then(|e| match e {
            Error::TransactionAborted(_, reason) => Some(*reason),
            _ => None,
        })
    }

    #[test]
    fn test_shared_locks_are_compatible() -> Result<()> {
        let lm = LockManager::new();
        let t1 = txn(0, IsolationLevel::RepeatableRead);
        let t2 = txn(1, IsolationLevel::RepeatableRead);

        assert!(lm.lock_shared(&t1, RID)?);
        assert!(lm.lock_shared(&t2, RID)?);
        assert_eq!(lm.granted_modes(RID).len(), 2);

        // re-requesting a held lock is idempotent
        assert!(lm.lock_shared(&t1, RID)?);
        assert_eq!(lm.granted_modes(RID).len(), 2);

        lm.unlock(&t1, RID)?;
        lm.unlock(&t2, RID)?;
        assert_eq!(t1.state(), TransactionState::Shrinking);
        Ok(())
    }

    #[test]
    fn test_shared_on_read_uncommitted_aborts() {
        let lm = LockManager::new();
        let t1 = txn(0, IsolationLevel::ReadUncommitted);

        let err = lm.lock_shared(&t1, RID).unwrap_err();
        assert_eq!(
            abort_reason(&err),
            Some(AbortReason::LockSharedOnReadUncommitted)
        );
        assert_eq!(t1.state(), TransactionState::Aborted);
    }

    #[test]
    fn test_older_wounds_younger_holder() -> Result<()> {
        let lm = LockManager::new();
        let t1 = txn(0, IsolationLevel::RepeatableRead);
        let t2 = txn(1, IsolationLevel::RepeatableRead);

        assert!(lm.lock_exclusive(&t2, RID)?);

        // the older shared request does not wait for the younger holder
        assert!(lm.lock_shared(&t1, RID)?);
        assert_eq!(t2.state(), TransactionState::Aborted);

        // the wounded transaction's next request reports the abort
        assert!(!lm.lock_exclusive(&t2, RID)?);
        Ok(())
    }

    #[test]
    fn test_younger_waits_then_is_wounded() -> Result<()> {
        let lm = Arc::new(LockManager::new());
        let t1 = txn(0, IsolationLevel::RepeatableRead);
        let t2 = txn(1, IsolationLevel::RepeatableRead);
        let t3 = txn(2, IsolationLevel::RepeatableRead);

        assert!(lm.lock_exclusive(&t1, RID)?);

        // T2 queues a shared request behind T1's exclusive hold
        let waiter_s = {
            let lm = lm.clone();
            let t2 = t2.clone();
            thread::spawn(move || lm.lock_shared(&t2, RID))
        };
        thread::sleep(Duration::from_millis(100));

        // T3 queues an exclusive request behind both
        let waiter_x = {
            let lm = lm.clone();
            let t3 = t3.clone();
            thread::spawn(move || lm.lock_exclusive(&t3, RID))
        };
        thread::sleep(Duration::from_millis(100));

        // T1 releases: T2 is granted and wounds the younger T3
        lm.unlock(&t1, RID)?;

        assert!(waiter_s.join().unwrap()?);
        let err = waiter_x.join().unwrap().unwrap_err();
        assert_eq!(abort_reason(&err), Some(AbortReason::Deadlock));
        assert_eq!(t3.state(), TransactionState::Aborted);
        assert_eq!(lm.granted_modes(RID), vec![(1, LockMode::Shared)]);
        Ok(())
    }

    #[test]
    fn test_exclusive_serializes_after_release() -> Result<()> {
        let lm = Arc::new(LockManager::new());
        let t1 = txn(0, IsolationLevel::RepeatableRead);
        let t2 = txn(1, IsolationLevel::RepeatableRead);

        // the younger writer waits for the older holder
        assert!(lm.lock_exclusive(&t1, RID)?);
        let waiter = {
            let lm = lm.clone();
            let t2 = t2.clone();
            thread::spawn(move || lm.lock_exclusive(&t2, RID))
        };
        thread::sleep(Duration::from_millis(100));
        assert!(!waiter.is_finished());

        lm.unlock(&t1, RID)?;
        assert!(waiter.join().unwrap()?);
        assert_eq!(lm.granted_modes(RID), vec![(1, LockMode::Exclusive)]);
        Ok(())
    }

    #[test]
    fn test_upgrade_and_strict_2pl_boundary() -> Result<()> {
        let lm = LockManager::new();
        let t1 = txn(0, IsolationLevel::RepeatableRead);

        assert!(lm.lock_shared(&t1, RID)?);
        assert!(lm.lock_upgrade(&t1, RID)?);
        assert!(t1.is_exclusive_locked(RID));
        assert!(!t1.is_shared_locked(RID));
        assert_eq!(lm.granted_modes(RID), vec![(0, LockMode::Exclusive)]);

        lm.unlock(&t1, RID)?;
        assert_eq!(t1.state(), TransactionState::Shrinking);

        let err = lm.lock_shared(&t1, RID).unwrap_err();
        assert_eq!(abort_reason(&err), Some(AbortReason::LockOnShrinking));
        assert_eq!(t1.state(), TransactionState::Aborted);
        Ok(())
    }

    #[test]
    fn test_second_upgrader_conflicts() -> Result<()> {
        let lm = Arc::new(LockManager::new());
        let t1 = txn(0, IsolationLevel::RepeatableRead);
        let t2 = txn(1, IsolationLevel::RepeatableRead);

        assert!(lm.lock_shared(&t1, RID)?);
        assert!(lm.lock_shared(&t2, RID)?);

        // the younger upgrader claims the slot and waits for T1
        let waiter = {
            let lm = lm.clone();
            let t2 = t2.clone();
            thread::spawn(move || lm.lock_upgrade(&t2, RID))
        };
        thread::sleep(Duration::from_millis(100));
        assert!(!waiter.is_finished());

        let err = lm.lock_upgrade(&t1, RID).unwrap_err();
        assert_eq!(abort_reason(&err), Some(AbortReason::UpgradeConflict));

        // T1's abort releases its shared lock; T2's upgrade completes
        lm.unlock(&t1, RID)?;
        assert!(waiter.join().unwrap()?);
        assert_eq!(lm.granted_modes(RID), vec![(1, LockMode::Exclusive)]);
        Ok(())
    }

    #[test]
    fn test_read_committed_unlock_keeps_growing() -> Result<()> {
        let lm = LockManager::new();
        let t1 = txn(0, IsolationLevel::ReadCommitted);

        assert!(lm.lock_shared(&t1, RID)?);
        lm.unlock(&t1, RID)?;
        assert_eq!(t1.state(), TransactionState::Growing);

        // still allowed to lock again
        assert!(lm.lock_shared(&t1, RID)?);
        lm.unlock(&t1, RID)?;
        Ok(())
    }
}
