use parking_lot::{RwLock, RwLockReadGuard, RwLockUpgradableReadGuard, RwLockWriteGuard};

pub type ReadGuard<'a> = RwLockReadGuard<'a, ()>;
pub type WriteGuard<'a> = RwLockWriteGuard<'a, ()>;
pub type UpgradableGuard<'a> = RwLockUpgradableReadGuard<'a, ()>;

/// A readers-writer latch with no data attached, used where the guarded
/// state spans several pages (e.g. the hash table directory plus its
/// buckets). An upgradable read can be promoted to a write without
/// releasing the latch in between.
#[derive(Debug, Default)]
pub struct Latch {
    lock: RwLock<()>,
}

impl Latch {
    pub fn new() -> Self {
        Self {
            lock: RwLock::new(()),
        }
    }

    pub fn rguard(&self) -> ReadGuard<'_> {
        self.lock.read()
    }

    pub fn wguard(&self) -> WriteGuard<'_> {
        self.lock.write()
    }

    pub fn uguard(&self) -> UpgradableGuard<'_> {
        self.lock.upgradable_read()
    }

    pub fn upgrade(guard: UpgradableGuard<'_>) -> WriteGuard<'_> {
        RwLockUpgradableReadGuard::upgrade(guard)
    }

    #[allow(unused)]
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}
