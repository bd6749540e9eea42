//! Bounded buffer of pending outbound frames
//!
//! The queue favors freshness over completeness: when the backlog reaches
//! `max_depth`, the oldest pending entries are dropped so a slow brick
//! receives recent commands instead of a stale burst. A head reinserted
//! after a partial transfer is in-flight and is never dropped.

use std::collections::VecDeque;

use bytes::Bytes;

/// Default maximum number of pending writes
pub const DEFAULT_MAX_PENDING_WRITES: usize = 2;

/// FIFO of framed commands awaiting transmission
#[derive(Debug)]
pub struct WriteQueue {
    entries: VecDeque<Bytes>,
    max_depth: usize,
    head_in_flight: bool,
}

impl WriteQueue {
    pub fn new(max_depth: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_depth.max(1)),
            max_depth: max_depth.max(1),
            head_in_flight: false,
        }
    }

    /// Append a frame, first evicting the oldest evictable entries until the
    /// queue is below capacity. Returns how many entries were dropped.
    ///
    /// The in-flight head is not evictable; when it is the only entry left,
    /// the depth cap yields rather than drop it.
    pub fn enqueue(&mut self, frame: Bytes) -> usize {
        let mut evicted = 0;
        while self.entries.len() >= self.max_depth {
            let oldest = if self.head_in_flight { 1 } else { 0 };
            if oldest >= self.entries.len() {
                break;
            }
            let _ = self.entries.remove(oldest);
            evicted += 1;
        }
        self.entries.push_back(frame);
        evicted
    }

    /// Remove and return the head frame.
    pub fn dequeue_front(&mut self) -> Option<Bytes> {
        self.head_in_flight = false;
        self.entries.pop_front()
    }

    /// Put a frame back at the head after a partial or aborted transfer.
    /// The reinserted head is protected from eviction until dequeued again.
    pub fn requeue_front(&mut self, frame: Bytes) {
        self.entries.push_front(frame);
        self.head_in_flight = true;
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for WriteQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING_WRITES)
    }
}
