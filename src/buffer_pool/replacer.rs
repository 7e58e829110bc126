use core::fmt::Debug;

use priority_queue::PriorityQueue;

use super::FrameId;

/// Eviction policy over the unpinned frames. An entry is present iff
/// the frame is evictable.
pub(super) trait Replacer: Send + Sync + Debug {
    /// Pop the eviction candidate, or `None` when every frame is pinned.
    fn victim(&mut self) -> Option<FrameId>;
    /// Drop the frame from the pool of candidates; no-op when absent.
    fn pin(&mut self, frame_id: FrameId);
    /// Admit the frame as the most recently used candidate. Re-admitting
    /// an already present frame does not refresh its position.
    fn unpin(&mut self, frame_id: FrameId);
    fn size(&self) -> usize;
}

/// Strict LRU by unpin order, kept as a heap of negated admission
/// timestamps so the oldest admission pops first.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Debug)]
pub(super) struct LRU {
    timestamp: i64,
    heap: PriorityQueue<FrameId, i64>,
}

impl LRU {
    pub fn new(size: usize) -> Self {
        Self {
            timestamp: 0,
            heap: PriorityQueue::with_capacity(size),
        }
    }
}

impl Replacer for LRU {
    fn victim(&mut self) -> Option<FrameId> {
        self.heap.pop().map(|(frame_id, _)| frame_id)
    }

    fn pin(&mut self, frame_id: FrameId) {
        self.heap.remove(&frame_id);
    }

    fn unpin(&mut self, frame_id: FrameId) {
        if self.heap.get(&frame_id).is_none() {
            self.timestamp += 1;
            self.heap.push(frame_id, -self.timestamp);
        }
    }

    fn size(&self) -> usize {
        self.heap.len()
    }
}
