//! C1: the bounded single-producer single-consumer queue between capture and
//! processor, plus the block clock it implies.
//!
//! Real-time audio prefers fresh data over a stalled queue: on `push` into a
//! full buffer the oldest block is dropped rather than rejecting the new
//! one. Drops are counted, never silent.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::block::AudioBlock;

/// Outcome of a non-blocking [`RingBuffer::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The block was enqueued without displacing anything.
    Ok,
    /// The buffer was at capacity; the oldest queued block was dropped to
    /// make room.
    Full,
}

/// Outcome of a timed [`RingBuffer::pop`].
#[derive(Debug)]
pub enum PopOutcome {
    /// A block was available, in enqueue order.
    Block(AudioBlock),
    /// No block arrived before the timeout — the processor should emit a
    /// silent fallback block to preserve output cadence.
    Starved,
}

/// Bounded FIFO of [`AudioBlock`]s with capacity `Q` (default 8).
///
/// Blocks are popped in strict enqueue order; there is no reordering.
#[derive(Debug)]
pub struct RingBuffer {
    capacity: usize,
    queue: Mutex<VecDeque<AudioBlock>>,
    not_empty: Condvar,
    drops: AtomicU64,
}

/// Default ring buffer capacity (§4.1).
pub const DEFAULT_CAPACITY: usize = 8;

/// Default pop timeout (§4.1).
pub const DEFAULT_POP_TIMEOUT: Duration = Duration::from_millis(50);

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be positive");
        Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            drops: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Non-blocking enqueue. On [`PushOutcome::Full`] the oldest block was
    /// dropped to make room for `block`.
    pub fn push(&self, block: AudioBlock) -> PushOutcome {
        let mut queue = self.queue.lock();
        let outcome = if queue.len() >= self.capacity {
            queue.pop_front();
            self.drops.fetch_add(1, Ordering::Relaxed);
            PushOutcome::Full
        } else {
            PushOutcome::Ok
        };
        queue.push_back(block);
        drop(queue);
        self.not_empty.notify_one();
        outcome
    }

    /// Blocks the calling thread up to `timeout` waiting for a block.
    /// Blocks are returned in enqueue order.
    pub fn pop(&self, timeout: Duration) -> PopOutcome {
        let mut queue = self.queue.lock();
        if queue.is_empty() {
            let result = self.not_empty.wait_for(&mut queue, timeout);
            if result.timed_out() && queue.is_empty() {
                return PopOutcome::Starved;
            }
        }
        match queue.pop_front() {
            Some(block) => PopOutcome::Block(block),
            None => PopOutcome::Starved,
        }
    }

    /// Total blocks dropped since construction.
    pub fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(seq: u64) -> AudioBlock {
        AudioBlock::new(vec![0.0; 4], seq, 0).unwrap()
    }

    #[test]
    fn pops_in_enqueue_order() {
        let rb = RingBuffer::new(DEFAULT_CAPACITY);
        for seq in 0..4 {
            assert_eq!(rb.push(block(seq)), PushOutcome::Ok);
        }
        for seq in 0..4 {
            match rb.pop(Duration::from_millis(1)) {
                PopOutcome::Block(b) => assert_eq!(b.seq(), seq),
                PopOutcome::Starved => panic!("expected a block"),
            }
        }
    }

    #[test]
    fn drops_oldest_block_under_backpressure() {
        // Scenario 3 of the testable properties: push 32 blocks into a
        // capacity-8 buffer without popping; first 8 survive, 24 drop.
        let rb = RingBuffer::new(8);
        for seq in 0..32 {
            rb.push(block(seq));
        }
        assert_eq!(rb.drops(), 24);
        assert_eq!(rb.len(), 8);
        let mut survivors = Vec::new();
        while let PopOutcome::Block(b) = rb.pop(Duration::from_millis(1)) {
            survivors.push(b.seq());
        }
        assert_eq!(survivors, (24..32).collect::<Vec<_>>());
    }

    #[test]
    fn pop_times_out_and_reports_starvation() {
        let rb = RingBuffer::new(DEFAULT_CAPACITY);
        match rb.pop(Duration::from_millis(10)) {
            PopOutcome::Starved => {}
            PopOutcome::Block(_) => panic!("expected starvation on empty buffer"),
        }
    }
}
