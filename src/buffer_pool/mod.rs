mod replacer;

use crate::disk_manager::DiskManager;
#[cfg(debug_assertions)]
use crate::get_caller_name;
use crate::pages::{Page, PageId, INVALID_PAGE_ID};
use crate::printdbg;
use anyhow::{anyhow, Result};
use parking_lot::FairMutex;
use replacer::{Replacer, LRU};
use std::collections::{HashMap, LinkedList};
use std::sync::Arc;

pub type FrameId = usize;
pub type ArcBufferPool = Arc<FairMutex<BufferPoolManager>>;

/// The sole I/O gateway: a fixed arena of frames fronted by a page
/// table, a free list and an LRU replacer, all guarded by one fair
/// mutex. Callers pin pages through [`fetch_page`]/[`new_page`] and give
/// them back through [`unpin_page`]; a returned [`Page`] handle must not
/// be used past its unpin.
///
/// [`fetch_page`]: BufferPoolManager::fetch_page
/// [`new_page`]: BufferPoolManager::new_page
/// [`unpin_page`]: BufferPoolManager::unpin_page
pub struct BufferPoolManager {
    disk_manager: DiskManager,

    pool_size: usize,
    num_instances: u32,
    instance_index: u32,
    next_page_id: PageId,

    free_frames: LinkedList<FrameId>,
    page_table: HashMap<PageId, FrameId>,
    frames: Vec<Arc<Page>>,

    replacer: Box<dyn Replacer>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, path: &str) -> Result<Self> {
        Self::new_sharded(pool_size, 1, 0, path)
    }

    /// A pool shard: page ids handed out stride by `num_instances`
    /// starting at `instance_index`.
    pub fn new_sharded(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        path: &str,
    ) -> Result<Self> {
        assert!(num_instances > 0);
        assert!(instance_index < num_instances);

        let frames = (0..pool_size).map(|_| Arc::new(Page::new())).collect();

        Ok(Self {
            disk_manager: DiskManager::new(path)?,
            pool_size,
            num_instances,
            instance_index,
            next_page_id: instance_index as PageId,
            free_frames: LinkedList::from_iter(0..pool_size),
            page_table: HashMap::new(),
            frames,
            replacer: Box::new(LRU::new(pool_size)),
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    fn allocate_page(&mut self) -> PageId {
        let page_id = self.next_page_id;
        self.next_page_id += self.num_instances as PageId;
        debug_assert_eq!(
            page_id as u32 % self.num_instances,
            self.instance_index,
            "allocated ids must map back to this instance"
        );
        page_id
    }

    fn find_free_frame(&mut self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_frames.pop_front() {
            Ok(frame_id)
        } else if let Some(frame_id) = self.replacer.victim() {
            self.evict_frame(frame_id)?;
            Ok(frame_id)
        } else {
            Err(anyhow!("no free frames to evict"))
        }
    }

    /// Write back a victim's bytes if dirty and clear its mapping. The
    /// frame descriptor is left ready for reuse.
    fn evict_frame(&mut self, frame_id: FrameId) -> Result<()> {
        let page = &self.frames[frame_id];
        assert!(page.pin_count() == 0);

        let old_page_id = page.page_id();
        printdbg!(
            "Page {old_page_id} (frame: {frame_id}) chosen for eviction, is dirty: {}",
            page.is_dirty()
        );

        if page.is_dirty() {
            let data = page.data_mut();
            self.disk_manager.write_page(old_page_id, &data)?;
        }

        self.page_table.remove(&old_page_id);
        page.set_page_id(INVALID_PAGE_ID);
        page.set_dirty(false);
        Ok(())
    }

    /// Pin `page_id`, pulling it from disk if it is not resident. Fails
    /// when every frame is pinned.
    pub fn fetch_page(&mut self, page_id: PageId) -> Result<Arc<Page>> {
        if page_id == INVALID_PAGE_ID {
            return Err(anyhow!("asked to fetch a page with invalid ID"));
        }

        if let Some(&frame_id) = self.page_table.get(&page_id) {
            let page = self.frames[frame_id].clone();
            page.pin();
            self.replacer.pin(frame_id);

            printdbg!(
                "Fetched resident page {page_id} (frame: {frame_id}) with pin count {}",
                page.pin_count()
            );
            return Ok(page);
        }

        let frame_id = self.find_free_frame()?;
        let page = self.frames[frame_id].clone();

        {
            let mut data = page.data_mut();
            data.reset();
            if let Err(err) = self.disk_manager.read_page(page_id, &mut data) {
                self.free_frames.push_back(frame_id);
                return Err(err);
            }
        }

        page.set_page_id(page_id);
        page.set_dirty(false);
        page.set_pin_count(1);
        self.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        printdbg!("Fetched page {page_id} from disk into frame {frame_id}");
        Ok(page)
    }

    /// Allocate a fresh page id and pin a zeroed frame for it.
    pub fn new_page(&mut self) -> Result<Arc<Page>> {
        let frame_id = self.find_free_frame()?;
        let page_id = self.allocate_page();
        let page = self.frames[frame_id].clone();

        page.data_mut().reset();
        page.set_page_id(page_id);
        page.set_dirty(false);
        page.set_pin_count(1);
        self.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        printdbg!("Created page {page_id} in frame {frame_id}");
        Ok(page)
    }

    /// Drop one pin, OR-ing in the caller's dirty flag. The frame
    /// becomes evictable when the count reaches zero.
    pub fn unpin_page(&mut self, page_id: PageId, is_dirty: bool) -> bool {
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            return false;
        };

        let page = &self.frames[frame_id];
        if is_dirty {
            page.set_dirty(true);
        }
        if page.pin_count() <= 0 {
            return false;
        }

        if page.unpin() == 0 {
            self.replacer.unpin(frame_id);
        }

        printdbg!(
            "page {page_id} (frame: {frame_id}) unpinned, pin count: {}",
            self.frames[frame_id].pin_count()
        );
        true
    }

    /// Write the frame's bytes out under its write latch. The dirty flag
    /// is left as-is: eviction remains responsible for clearing it.
    pub fn flush_page(&mut self, page_id: PageId) -> bool {
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            return false;
        };

        let page = &self.frames[frame_id];
        let data = page.data_mut();
        self.disk_manager.write_page(page_id, &data).is_ok()
    }

    pub fn flush_all_pages(&mut self) {
        for page in self.frames.iter() {
            let page_id = page.page_id();
            if page_id == INVALID_PAGE_ID {
                continue;
            }
            let data = page.data_mut();
            let _ = self.disk_manager.write_page(page_id, &data);
        }
    }

    /// Remove a page from the pool and hand its id back to the disk
    /// manager. Refuses while the page is pinned.
    pub fn delete_page(&mut self, page_id: PageId) -> bool {
        self.disk_manager.deallocate_page(page_id);

        let Some(&frame_id) = self.page_table.get(&page_id) else {
            return true;
        };

        let page = &self.frames[frame_id];
        if page.pin_count() != 0 {
            return false;
        }

        if page.is_dirty() {
            let data = page.data_mut();
            let _ = self.disk_manager.write_page(page_id, &data);
        }

        self.page_table.remove(&page_id);
        self.replacer.pin(frame_id);
        page.set_page_id(INVALID_PAGE_ID);
        page.set_dirty(false);
        self.free_frames.push_back(frame_id);

        printdbg!("{} deleted page {page_id}", get_caller_name!());
        true
    }

    #[cfg(test)]
    pub fn inspect(&self) {
        println!("Free Frames: {:?}", self.free_frames);
        println!("Page Table: {:?}", self.page_table);
    }

    #[cfg(test)]
    pub fn get_pin_count(&self, page_id: &PageId) -> Option<i32> {
        let frame_id = *self.page_table.get(page_id)?;
        Some(self.frames[frame_id].pin_count())
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        // every mapping points at a frame holding that page, and the
        // replacer tracks exactly the unpinned resident frames
        for (&page_id, &frame_id) in self.page_table.iter() {
            assert_eq!(self.frames[frame_id].page_id(), page_id);
            assert!(!self.free_frames.contains(&frame_id));
        }
        let unpinned_resident = self
            .page_table
            .values()
            .filter(|&&f| self.frames[f].pin_count() == 0)
            .count();
        assert_eq!(self.replacer.size(), unpinned_resident);
        assert_eq!(
            self.free_frames.len() + self.page_table.len(),
            self.pool_size
        );
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::disk_manager::test_path;
    use crate::pages::PAGE_SIZE;
    use anyhow::Result;

    pub fn test_arc_bpm(size: usize) -> ArcBufferPool {
        Arc::new(FairMutex::new(
            BufferPoolManager::new(size, &test_path()).unwrap(),
        ))
    }

    #[test]
    fn test_new_page_then_fetch_same_frame() -> Result<()> {
        let mut bpm = BufferPoolManager::new(3, &test_path())?;

        let page = bpm.new_page()?;
        let page_id = page.page_id();
        page.data_mut().write_bytes(0, b"kept resident");

        // while pinned, a fetch hands back the very same frame
        let again = bpm.fetch_page(page_id)?;
        assert!(Arc::ptr_eq(&page, &again));
        assert_eq!(again.data().read_bytes(0, 13), b"kept resident");
        assert_eq!(bpm.get_pin_count(&page_id), Some(2));

        bpm.unpin_page(page_id, true);
        bpm.unpin_page(page_id, false);
        bpm.check_invariants();
        Ok(())
    }

    #[test]
    fn test_page_ids_stride_across_instances() -> Result<()> {
        let mut shard0 = BufferPoolManager::new_sharded(3, 2, 0, &test_path())?;
        let mut shard1 = BufferPoolManager::new_sharded(3, 2, 1, &test_path())?;

        assert_eq!(shard0.new_page()?.page_id(), 0);
        assert_eq!(shard0.new_page()?.page_id(), 2);
        assert_eq!(shard1.new_page()?.page_id(), 1);
        assert_eq!(shard1.new_page()?.page_id(), 3);
        Ok(())
    }

    #[test]
    fn test_eviction_prefers_free_frames_and_writes_back_dirty() -> Result<()> {
        let path = test_path();
        let mut bpm = BufferPoolManager::new(3, &path)?;

        // fill the pool with pages 0, 1, 2, all pinned
        let mut ids = vec![];
        for _ in 0..3 {
            ids.push(bpm.new_page()?.page_id());
        }
        assert_eq!(ids, vec![0, 1, 2]);

        // everything is pinned, the fourth page has no frame
        assert!(bpm.new_page().is_err());

        // release page 1 dirty; the next allocation evicts it
        let page1 = bpm.fetch_page(1)?;
        page1.data_mut().write_bytes(0, b"dirty one");
        bpm.unpin_page(1, true);
        bpm.unpin_page(1, true);

        let page3 = bpm.new_page()?;
        assert_eq!(page3.page_id(), 3);
        assert!(bpm.get_pin_count(&1).is_none());

        // the eviction wrote page 1's bytes through to disk
        let mut readback = crate::pages::PageData::new();
        bpm.disk_manager.read_page(1, &mut readback)?;
        assert_eq!(readback.read_bytes(0, 9), b"dirty one");

        bpm.unpin_page(0, false);
        bpm.unpin_page(2, false);
        bpm.unpin_page(3, false);
        bpm.check_invariants();
        Ok(())
    }

    #[test]
    fn test_unpin_or_dirty_flag() -> Result<()> {
        let mut bpm = BufferPoolManager::new(2, &test_path())?;

        let page = bpm.new_page()?;
        let page_id = page.page_id();
        bpm.fetch_page(page_id)?;

        // a clean unpin after a dirty one must not lose the dirty bit
        bpm.unpin_page(page_id, true);
        bpm.unpin_page(page_id, false);
        assert!(bpm.frames[bpm.page_table[&page_id]].is_dirty());

        // pin count is exhausted
        assert!(!bpm.unpin_page(page_id, false));
        bpm.check_invariants();
        Ok(())
    }

    #[test]
    fn test_delete_page() -> Result<()> {
        let mut bpm = BufferPoolManager::new(2, &test_path())?;

        let page = bpm.new_page()?;
        let page_id = page.page_id();

        // pinned pages cannot be deleted
        assert!(!bpm.delete_page(page_id));

        bpm.unpin_page(page_id, true);
        assert!(bpm.delete_page(page_id));
        assert!(bpm.get_pin_count(&page_id).is_none());

        // deleting a non-resident page is a no-op
        assert!(bpm.delete_page(page_id));
        bpm.check_invariants();
        Ok(())
    }

    #[test]
    fn test_flush_page_keeps_dirty_flag() -> Result<()> {
        let path = test_path();
        let mut bpm = BufferPoolManager::new(2, &path)?;

        let page = bpm.new_page()?;
        let page_id = page.page_id();
        page.data_mut().write_bytes(0, b"flushed");
        bpm.unpin_page(page_id, true);

        assert!(bpm.flush_page(page_id));
        // write-through is observable, but the frame still counts as dirty
        assert!(bpm.frames[bpm.page_table[&page_id]].is_dirty());

        let mut readback = crate::pages::PageData::new();
        bpm.disk_manager.read_page(page_id, &mut readback)?;
        assert_eq!(readback.read_bytes(0, 7), b"flushed");

        assert!(!bpm.flush_page(999));
        Ok(())
    }

    #[test]
    fn test_flush_all_pages() -> Result<()> {
        let path = test_path();
        let mut bpm = BufferPoolManager::new(4, &path)?;

        let mut ids = vec![];
        for i in 0..3i32 {
            let page = bpm.new_page()?;
            page.data_mut().write_bytes(0, &i.to_le_bytes());
            ids.push(page.page_id());
        }
        bpm.flush_all_pages();

        let mut readback = crate::pages::PageData::new();
        for (i, &page_id) in ids.iter().enumerate() {
            bpm.disk_manager.read_page(page_id, &mut readback)?;
            assert_eq!(readback.read_i32(0), i as i32);
        }

        for &page_id in ids.iter() {
            bpm.unpin_page(page_id, false);
        }
        bpm.check_invariants();
        Ok(())
    }

    #[test]
    fn test_lru_victim_order_on_refetch() -> Result<()> {
        let mut bpm = BufferPoolManager::new(2, &test_path())?;

        let a = bpm.new_page()?.page_id();
        let b = bpm.new_page()?.page_id();
        bpm.unpin_page(a, false);
        bpm.unpin_page(b, false);

        // refetching `a` removes it from the replacer; `b` is the victim
        bpm.fetch_page(a)?;
        let c = bpm.new_page()?.page_id();
        assert!(bpm.get_pin_count(&b).is_none());
        assert_eq!(bpm.get_pin_count(&a), Some(1));

        bpm.unpin_page(a, false);
        bpm.unpin_page(c, false);
        bpm.check_invariants();

        // zeroed content comes back for never-written pages
        let page_b = bpm.fetch_page(b)?;
        assert_eq!(page_b.data().read_bytes(0, PAGE_SIZE)[..8], [0u8; 8]);
        bpm.unpin_page(b, false);
        Ok(())
    }
}
