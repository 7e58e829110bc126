use super::{PageData, PageId, SlotId, INVALID_PAGE_ID, PAGE_SIZE};

/// Slotted table page. Byte layout:
///
/// ```text
/// 0..4   next_page_id: i32
/// 4..6   num_slots:    u16
/// 6..8   data_start:   u16   lowest tuple byte, PAGE_SIZE when empty
/// 8..    slot array, 6 bytes each:
///          +0 offset: u16
///          +2 len:    u16
///          +4 flags:  u16   bit 0 = deleted
/// ```
///
/// Tuple bytes grow down from the end of the page, the slot array grows
/// up; the page is full when the two would meet.
pub const HEADER_SIZE: usize = 8;
pub const SLOT_SIZE: usize = 6;

const OFFSET_NEXT_PAGE: usize = 0;
const OFFSET_NUM_SLOTS: usize = 4;
const OFFSET_DATA_START: usize = 6;

const FLAG_DELETED: u16 = 1;

/// The largest tuple a fresh page can take.
pub const MAX_TUPLE_SIZE: usize = PAGE_SIZE - HEADER_SIZE - SLOT_SIZE;

pub fn init(data: &mut PageData) {
    data.reset();
    data.write_i32(OFFSET_NEXT_PAGE, INVALID_PAGE_ID);
    data.write_u16(OFFSET_NUM_SLOTS, 0);
    data.write_u16(OFFSET_DATA_START, PAGE_SIZE as u16);
}

pub fn next_page_id(data: &PageData) -> PageId {
    data.read_i32(OFFSET_NEXT_PAGE)
}

pub fn set_next_page_id(data: &mut PageData, page_id: PageId) {
    data.write_i32(OFFSET_NEXT_PAGE, page_id);
}

pub fn num_slots(data: &PageData) -> u32 {
    data.read_u16(OFFSET_NUM_SLOTS) as u32
}

fn slot_base(slot: SlotId) -> usize {
    HEADER_SIZE + slot as usize * SLOT_SIZE
}

fn data_start(data: &PageData) -> usize {
    let start = data.read_u16(OFFSET_DATA_START) as usize;
    if start == 0 {
        PAGE_SIZE
    } else {
        start
    }
}

pub fn free_space(data: &PageData) -> usize {
    data_start(data) - (HEADER_SIZE + num_slots(data) as usize * SLOT_SIZE)
}

/// Append a tuple, returning its slot. `None` when the page cannot take
/// another `len + SLOT_SIZE` bytes.
pub fn insert_tuple(data: &mut PageData, bytes: &[u8]) -> Option<SlotId> {
    if bytes.len() + SLOT_SIZE > free_space(data) {
        return None;
    }

    let slot = num_slots(data);
    let offset = data_start(data) - bytes.len();

    data.write_bytes(offset, bytes);

    let base = slot_base(slot);
    data.write_u16(base, offset as u16);
    data.write_u16(base + 2, bytes.len() as u16);
    data.write_u16(base + 4, 0);

    data.write_u16(OFFSET_NUM_SLOTS, (slot + 1) as u16);
    data.write_u16(OFFSET_DATA_START, offset as u16);

    Some(slot)
}

/// Read a slot back as `(deleted, bytes)`.
pub fn read_tuple(data: &PageData, slot: SlotId) -> Option<(bool, Vec<u8>)> {
    if slot >= num_slots(data) {
        return None;
    }
    let base = slot_base(slot);
    let offset = data.read_u16(base) as usize;
    let len = data.read_u16(base + 2) as usize;
    let deleted = data.read_u16(base + 4) & FLAG_DELETED != 0;
    Some((deleted, data.read_bytes(offset, offset + len).to_vec()))
}

pub fn mark_delete(data: &mut PageData, slot: SlotId) -> bool {
    if slot >= num_slots(data) {
        return false;
    }
    let base = slot_base(slot);
    let flags = data.read_u16(base + 4);
    if flags & FLAG_DELETED != 0 {
        return false;
    }
    data.write_u16(base + 4, flags | FLAG_DELETED);
    true
}

pub fn rollback_delete(data: &mut PageData, slot: SlotId) -> bool {
    if slot >= num_slots(data) {
        return false;
    }
    let base = slot_base(slot);
    let flags = data.read_u16(base + 4);
    if flags & FLAG_DELETED == 0 {
        return false;
    }
    data.write_u16(base + 4, flags & !FLAG_DELETED);
    true
}

/// Rewrite a live slot. Shrinking updates reuse the old bytes; growing
/// updates claim fresh space at the data end. Fails when neither fits.
pub fn update_tuple(data: &mut PageData, slot: SlotId, bytes: &[u8]) -> bool {
    if slot >= num_slots(data) {
        return false;
    }
    let base = slot_base(slot);
    if data.read_u16(base + 4) & FLAG_DELETED != 0 {
        return false;
    }

    let old_len = data.read_u16(base + 2) as usize;
    if bytes.len() <= old_len {
        let offset = data.read_u16(base) as usize;
        data.write_bytes(offset, bytes);
        data.write_u16(base + 2, bytes.len() as u16);
        return true;
    }

    if bytes.len() > free_space(data) {
        return false;
    }
    let offset = data_start(data) - bytes.len();
    data.write_bytes(offset, bytes);
    data.write_u16(base, offset as u16);
    data.write_u16(base + 2, bytes.len() as u16);
    data.write_u16(OFFSET_DATA_START, offset as u16);
    true
}
