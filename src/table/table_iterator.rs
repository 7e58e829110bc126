use std::sync::Arc;

use crate::buffer_pool::ArcBufferPool;
use crate::pages::{table_page, Page, PageId, SlotId, INVALID_PAGE_ID};
use crate::tuple::{Rid, Tuple};

use super::TableHeap;

/// Walks the heap page chain, pinning one page at a time and skipping
/// tombstoned slots.
pub struct TableIterator {
    bpm: ArcBufferPool,
    page: Option<Arc<Page>>,
    slot: SlotId,
    num_slots: u32,
    next_page_id: PageId,
}

impl TableIterator {
    pub(super) fn new(heap: &TableHeap) -> anyhow::Result<Self> {
        let bpm = heap.bpm().clone();
        let page = bpm.lock().fetch_page(heap.first_page_id())?;
        let (num_slots, next_page_id) = {
            let data = page.data();
            (table_page::num_slots(&data), table_page::next_page_id(&data))
        };

        Ok(TableIterator {
            bpm,
            page: Some(page),
            slot: 0,
            num_slots,
            next_page_id,
        })
    }

    fn release_page(&mut self) {
        if let Some(page) = self.page.take() {
            self.bpm.lock().unpin_page(page.page_id(), false);
        }
    }
}

impl Iterator for TableIterator {
    type Item = (Rid, Tuple);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.page.as_ref()?;

            if self.slot >= self.num_slots {
                let next_page_id = self.next_page_id;
                self.release_page();
                if next_page_id == INVALID_PAGE_ID {
                    return None;
                }

                let page = self.bpm.lock().fetch_page(next_page_id).ok()?;
                {
                    let data = page.data();
                    self.num_slots = table_page::num_slots(&data);
                    self.next_page_id = table_page::next_page_id(&data);
                }
                self.page = Some(page);
                self.slot = 0;
                continue;
            }

            let page = self.page.as_ref().unwrap();
            let entry = table_page::read_tuple(&page.data(), self.slot);
            let slot = self.slot;
            self.slot += 1;

            match entry {
                Some((false, bytes)) => {
                    let rid = (page.page_id(), slot);
                    let tuple = Tuple::from_bytes(&bytes).ok()?;
                    return Some((rid, tuple));
                }
                _ => continue,
            }
        }
    }
}

impl Drop for TableIterator {
    fn drop(&mut self) {
        self.release_page();
    }
}
