use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use anyhow::{ensure, Result};

use crate::buffer_pool::ArcBufferPool;
use crate::errors::Error;
use crate::latch::Latch;
use crate::pages::hash_bucket_page as bucket;
use crate::pages::hash_bucket_page::FixedCodec;
use crate::pages::hash_directory_page::{HashTableDirectoryPage, MAX_GLOBAL_DEPTH};
use crate::pages::{PageId, INVALID_PAGE_ID};
use crate::printdbg;

/// 32-bit hash oracle for directory addressing. Swappable so tests can
/// pick keys' hash classes directly.
pub struct HashFunction<K> {
    f: fn(&K) -> u32,
    _marker: PhantomData<K>,
}

impl<K: Hash> Default for HashFunction<K> {
    fn default() -> Self {
        Self::with(|key| {
            let mut hasher = DefaultHasher::new();
            key.hash(&mut hasher);
            hasher.finish() as u32
        })
    }
}

impl<K> HashFunction<K> {
    pub fn with(f: fn(&K) -> u32) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }

    pub fn hash_of(&self, key: &K) -> u32 {
        (self.f)(key)
    }
}

/// A disk-backed extendible hash table: one directory page addressing
/// `2^global_depth` bucket pages through the low bits of the key hash.
///
/// Readers hold the table latch shared plus a bucket read latch; splits
/// and merges promote an upgradable table latch to exclusive, trading
/// concurrency for a directory that cannot move underneath them. Bucket
/// latches are always dropped before the page is unpinned.
pub struct ExtendibleHashTable<K, V> {
    bpm: ArcBufferPool,
    directory_page_id: PageId,
    table_latch: Latch,
    hash_fn: HashFunction<K>,
    _marker: PhantomData<V>,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: FixedCodec + PartialEq + Copy,
    V: FixedCodec + PartialEq + Copy,
{
    pub fn new(bpm: ArcBufferPool, hash_fn: HashFunction<K>) -> Result<Self> {
        let (directory_page, bucket_page) = {
            let mut pool = bpm.lock();
            (pool.new_page()?, pool.new_page()?)
        };
        let directory_page_id = directory_page.page_id();
        let bucket_page_id = bucket_page.page_id();

        let mut directory = HashTableDirectoryPage::init(directory_page_id);
        directory.set_bucket_page_id(0, bucket_page_id);
        directory.encode(&mut directory_page.data_mut());

        let mut pool = bpm.lock();
        pool.unpin_page(directory_page_id, true);
        pool.unpin_page(bucket_page_id, true);
        drop(pool);

        Ok(Self {
            bpm,
            directory_page_id,
            table_latch: Latch::new(),
            hash_fn,
            _marker: PhantomData,
        })
    }

    fn hash(&self, key: &K) -> u32 {
        self.hash_fn.hash_of(key)
    }

    /// Fetch and decode the directory. The caller owns one pin on the
    /// directory page afterwards.
    fn fetch_directory(&self) -> Result<HashTableDirectoryPage> {
        let page = self.bpm.lock().fetch_page(self.directory_page_id)?;
        let directory = HashTableDirectoryPage::decode(&page.data());
        Ok(directory)
    }

    fn unpin_directory(&self, dirty: bool) {
        self.bpm.lock().unpin_page(self.directory_page_id, dirty);
    }

    fn bucket_page_of(&self, directory: &HashTableDirectoryPage, key: &K) -> PageId {
        let slot = (self.hash(key) & directory.global_depth_mask()) as usize;
        directory.bucket_page_id(slot)
    }

    pub fn get_value(&self, key: &K) -> Result<Vec<V>> {
        let bucket_page_id = {
            let _table = self.table_latch.rguard();
            let directory = self.fetch_directory()?;
            let bucket_page_id = self.bucket_page_of(&directory, key);
            self.unpin_directory(false);
            bucket_page_id
        };

        let bucket_page = self.bpm.lock().fetch_page(bucket_page_id)?;
        let result = {
            let data = bucket_page.data();
            bucket::get_value::<K, V>(&data, key)
        };
        self.bpm.lock().unpin_page(bucket_page_id, false);
        Ok(result)
    }

    pub fn insert(&self, key: &K, value: &V) -> Result<bool> {
        {
            let _table = self.table_latch.rguard();
            let directory = self.fetch_directory()?;
            let bucket_page_id = self.bucket_page_of(&directory, key);
            self.unpin_directory(false);

            let bucket_page = self.bpm.lock().fetch_page(bucket_page_id)?;
            let mut data = bucket_page.data_mut();
            if !bucket::is_full::<K, V>(&data) {
                let inserted = bucket::insert::<K, V>(&mut data, key, value);
                drop(data);
                self.bpm.lock().unpin_page(bucket_page_id, inserted);
                return Ok(inserted);
            }
            drop(data);
            self.bpm.lock().unpin_page(bucket_page_id, false);
        }

        self.split_insert(key, value)
    }

    /// Split the key's bucket until it has room, then insert. Runs under
    /// the exclusive table latch; every round either inserts in place
    /// (someone made room first) or raises one local depth.
    fn split_insert(&self, key: &K, value: &V) -> Result<bool> {
        loop {
            let table = self.table_latch.uguard();
            let mut directory = self.fetch_directory()?;
            let slot = (self.hash(key) & directory.global_depth_mask()) as usize;
            let bucket_page_id = directory.bucket_page_id(slot);
            let bucket_page = self.bpm.lock().fetch_page(bucket_page_id)?;

            {
                let mut data = bucket_page.data_mut();
                if !bucket::is_full::<K, V>(&data) {
                    let inserted = bucket::insert::<K, V>(&mut data, key, value);
                    drop(data);
                    self.bpm.lock().unpin_page(bucket_page_id, inserted);
                    self.unpin_directory(false);
                    return Ok(inserted);
                }
            }

            let _table = Latch::upgrade(table);

            ensure!(
                directory.local_depth(slot) < MAX_GLOBAL_DEPTH,
                Error::Internal("hash directory is out of depth bits".into())
            );

            if directory.local_depth(slot) == directory.global_depth() {
                directory.grow();
            }
            let new_local_depth = directory.local_depth(slot) + 1;
            let local_mask = (1u32 << new_local_depth) - 1;
            // the class that moves out to the fresh bucket
            let split_class = self.hash(key) & local_mask;

            let new_page = self.bpm.lock().new_page()?;
            let new_page_id = new_page.page_id();
            printdbg!(
                "Splitting bucket {bucket_page_id} into {new_page_id} at depth {new_local_depth}"
            );

            {
                let mut old_data = bucket_page.data_mut();
                let mut new_data = new_page.data_mut();
                new_data.write_bytes(0, old_data.as_bytes());

                for idx in 0..bucket::bucket_array_size::<K, V>() {
                    if !bucket::is_readable::<K, V>(&old_data, idx) {
                        continue;
                    }
                    let entry_key = bucket::key_at::<K, V>(&old_data, idx);
                    if self.hash(&entry_key) & local_mask == split_class {
                        bucket::set_unreadable::<K, V>(&mut old_data, idx);
                    } else {
                        bucket::set_unreadable::<K, V>(&mut new_data, idx);
                    }
                }
            }

            for idx in 0..directory.size() {
                if directory.bucket_page_id(idx) != bucket_page_id {
                    continue;
                }
                if idx as u32 & local_mask == split_class {
                    directory.set_bucket_page_id(idx, new_page_id);
                }
                directory.set_local_depth(idx, new_local_depth);
            }

            let directory_page = self.bpm.lock().fetch_page(self.directory_page_id)?;
            directory.encode(&mut directory_page.data_mut());

            let mut pool = self.bpm.lock();
            pool.unpin_page(self.directory_page_id, true);
            pool.unpin_page(self.directory_page_id, true);
            pool.unpin_page(new_page_id, true);
            pool.unpin_page(bucket_page_id, true);
        }
    }

    pub fn remove(&self, key: &K, value: &V) -> Result<bool> {
        let (removed, emptied) = {
            let _table = self.table_latch.rguard();
            let directory = self.fetch_directory()?;
            let bucket_page_id = self.bucket_page_of(&directory, key);
            self.unpin_directory(false);

            let bucket_page = self.bpm.lock().fetch_page(bucket_page_id)?;
            let (removed, emptied) = {
                let mut data = bucket_page.data_mut();
                let removed = bucket::remove::<K, V>(&mut data, key, value);
                (removed, bucket::is_empty::<K, V>(&data))
            };
            self.bpm.lock().unpin_page(bucket_page_id, removed);
            (removed, emptied)
        };

        if removed && emptied {
            self.merge(key)?;
        }
        Ok(removed)
    }

    /// Fold the key's emptied bucket into its split buddy, repeating
    /// while the fold leaves another empty bucket behind. Shrinks the
    /// directory afterwards for as long as every slot allows it.
    fn merge(&self, key: &K) -> Result<()> {
        loop {
            let _table = self.table_latch.wguard();
            let mut directory = self.fetch_directory()?;
            let slot = (self.hash(key) & directory.global_depth_mask()) as usize;
            let bucket_page_id = directory.bucket_page_id(slot);
            let local_depth = directory.local_depth(slot);

            let bucket_page = self.bpm.lock().fetch_page(bucket_page_id)?;
            let emptied = bucket::is_empty::<K, V>(&bucket_page.data());

            if !emptied || local_depth == 0 {
                self.bpm.lock().unpin_page(bucket_page_id, false);
                self.unpin_directory(false);
                return Ok(());
            }

            let local_mask = (1u32 << local_depth) - 1;
            let class = self.hash(key) & local_mask;
            let buddy_class = class ^ (1 << (local_depth - 1));

            // the buddy must sit at the same depth everywhere it appears
            let mut buddy_page_id = INVALID_PAGE_ID;
            let mut can_merge = true;
            for idx in 0..directory.size() {
                if idx as u32 & local_mask != buddy_class {
                    continue;
                }
                if directory.local_depth(idx) != local_depth {
                    can_merge = false;
                } else {
                    buddy_page_id = directory.bucket_page_id(idx);
                }
            }

            if !can_merge || buddy_page_id == INVALID_PAGE_ID || buddy_page_id == bucket_page_id {
                self.bpm.lock().unpin_page(bucket_page_id, false);
                self.unpin_directory(false);
                return Ok(());
            }

            printdbg!("Merging empty bucket {bucket_page_id} into buddy {buddy_page_id}");

            {
                let mut pool = self.bpm.lock();
                pool.unpin_page(bucket_page_id, false);
                pool.delete_page(bucket_page_id);
            }

            for idx in 0..directory.size() {
                let page_id = directory.bucket_page_id(idx);
                if page_id == bucket_page_id || page_id == buddy_page_id {
                    directory.decr_local_depth(idx);
                    if page_id == bucket_page_id {
                        directory.set_bucket_page_id(idx, buddy_page_id);
                    }
                }
            }

            while directory.can_shrink() {
                directory.decr_global_depth();
            }

            let directory_page = self.bpm.lock().fetch_page(self.directory_page_id)?;
            directory.encode(&mut directory_page.data_mut());
            let mut pool = self.bpm.lock();
            pool.unpin_page(self.directory_page_id, true);
            pool.unpin_page(self.directory_page_id, true);
            drop(pool);
            // the buddy may be empty as well; try folding it too
        }
    }

    pub fn global_depth(&self) -> Result<u32> {
        let _table = self.table_latch.rguard();
        let directory = self.fetch_directory()?;
        self.unpin_directory(false);
        Ok(directory.global_depth())
    }

    /// Check the depth arithmetic: every live entry hashes into the slot
    /// class it is reachable from, and slots share a bucket exactly when
    /// their low local-depth bits agree.
    pub fn verify_integrity(&self) -> Result<()> {
        let _table = self.table_latch.rguard();
        let directory = self.fetch_directory()?;
        self.unpin_directory(false);

        for idx in 0..directory.size() {
            let bucket_page_id = directory.bucket_page_id(idx);
            let local_mask = directory.local_depth_mask(idx);

            let bucket_page = self.bpm.lock().fetch_page(bucket_page_id)?;
            {
                let data = bucket_page.data();
                for entry in 0..bucket::bucket_array_size::<K, V>() {
                    if !bucket::is_readable::<K, V>(&data, entry) {
                        continue;
                    }
                    let entry_key = bucket::key_at::<K, V>(&data, entry);
                    ensure!(
                        self.hash(&entry_key) & local_mask == idx as u32 & local_mask,
                        Error::Internal(format!(
                            "entry in bucket {bucket_page_id} does not belong to slot {idx}"
                        ))
                    );
                }
            }
            self.bpm.lock().unpin_page(bucket_page_id, false);

            for other in 0..directory.size() {
                let shared = directory.bucket_page_id(other) == bucket_page_id;
                let depth = directory.local_depth(idx).min(directory.local_depth(other));
                let mask = (1u32 << depth) - 1;
                let same_class = idx as u32 & mask == other as u32 & mask;
                ensure!(
                    shared == same_class,
                    Error::Internal(format!("slots {idx} and {other} break depth sharing"))
                );
            }
        }
        Ok(())
    }
}
