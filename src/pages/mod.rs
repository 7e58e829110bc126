pub mod hash_bucket_page;
pub mod hash_directory_page;
pub mod table_page;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

pub const PAGE_SIZE: usize = 4096; // 4 KBs

pub type PageId = i32;
pub type SlotId = u32;

pub const INVALID_PAGE_ID: PageId = -1;

/// The raw bytes of one disk page, with little-endian field accessors
/// used by the page codecs.
pub struct PageData {
    bytes: [u8; PAGE_SIZE],
}

impl PageData {
    pub fn new() -> Self {
        Self {
            bytes: [0u8; PAGE_SIZE],
        }
    }

    pub fn reset(&mut self) {
        self.bytes = [0u8; PAGE_SIZE];
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn read_bytes(&self, start: usize, end: usize) -> &[u8] {
        &self.bytes[start..end]
    }

    pub fn write_bytes(&mut self, start: usize, bytes: &[u8]) {
        self.bytes[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn read_u8(&self, offset: usize) -> u8 {
        self.bytes[offset]
    }

    pub fn write_u8(&mut self, offset: usize, value: u8) {
        self.bytes[offset] = value;
    }

    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes(self.bytes[offset..offset + 2].try_into().unwrap())
    }

    pub fn write_u16(&mut self, offset: usize, value: u16) {
        self.bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.bytes[offset..offset + 4].try_into().unwrap())
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn read_i32(&self, offset: usize) -> i32 {
        i32::from_le_bytes(self.bytes[offset..offset + 4].try_into().unwrap())
    }

    pub fn write_i32(&mut self, offset: usize, value: i32) {
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

impl Default for PageData {
    fn default() -> Self {
        PageData::new()
    }
}

impl std::fmt::Debug for PageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageData").finish_non_exhaustive()
    }
}

/// A frame descriptor: the identity and pin bookkeeping of a resident
/// page, plus the page latch guarding its bytes. The buffer pool owns a
/// fixed arena of these; a handle stays valid for as long as the page is
/// pinned.
///
/// The latch is independent of the buffer pool mutex. When both are
/// held, the pool mutex is the outer one; callers drop the latch before
/// going back into the pool.
#[derive(Debug)]
pub struct Page {
    page_id: AtomicI32,
    pin_count: AtomicI32,
    is_dirty: AtomicBool,
    data: RwLock<PageData>,
}

impl Page {
    pub fn new() -> Self {
        Page {
            page_id: AtomicI32::new(INVALID_PAGE_ID),
            pin_count: AtomicI32::new(0),
            is_dirty: AtomicBool::new(false),
            data: RwLock::new(PageData::new()),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id.load(Ordering::Relaxed)
    }

    pub(crate) fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id, Ordering::Relaxed);
    }

    pub fn pin_count(&self) -> i32 {
        self.pin_count.load(Ordering::Relaxed)
    }

    pub(crate) fn set_pin_count(&self, count: i32) {
        self.pin_count.store(count, Ordering::Relaxed);
    }

    pub(crate) fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the pin count after the decrement.
    pub(crate) fn unpin(&self) -> i32 {
        self.pin_count.fetch_sub(1, Ordering::Relaxed) - 1
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Relaxed)
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Relaxed);
    }

    /// Take the page read latch.
    pub fn data(&self) -> RwLockReadGuard<'_, PageData> {
        self.data.read()
    }

    /// Take the page write latch.
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, PageData> {
        self.data.write()
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::new()
    }
}
