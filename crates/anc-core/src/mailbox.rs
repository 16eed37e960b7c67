//! The one-slot classifier mailbox and the atomically published
//! `last_detection` record (§5 "Shared resources").
//!
//! `T_process` submits the latest reference block to `T_classify` through
//! [`ClassifyMailbox`], which always holds at most the most recent
//! submission — an older, not-yet-served block is silently replaced,
//! since only the newest reference block's classification is useful.
//! `T_classify` publishes its result through [`DetectionPublisher`], which
//! `T_process` reads as a self-consistent snapshot without ever blocking
//! on `T_classify`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use anc_dsp::AudioBlock;

/// A classification request: the reference block plus the capture
/// timestamp to stamp onto the eventual detection/event record.
#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    pub block: AudioBlock,
    pub timestamp_us: u64,
}

/// Single-slot mailbox from `T_process` to `T_classify`. A `send` while
/// the slot is occupied overwrites it — the classifier is never on the
/// critical path (§2), so only the newest block matters.
#[derive(Debug, Default)]
pub struct ClassifyMailbox {
    slot: Mutex<Option<ClassifyRequest>>,
    not_empty: Condvar,
    closed: Mutex<bool>,
}

impl ClassifyMailbox {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            not_empty: Condvar::new(),
            closed: Mutex::new(false),
        }
    }

    /// Overwrites the slot with `request` and wakes `T_classify`.
    pub fn send(&self, request: ClassifyRequest) {
        let mut slot = self.slot.lock();
        *slot = Some(request);
        drop(slot);
        self.not_empty.notify_one();
    }

    /// Blocks up to `timeout` for a request, or until [`Self::close`] is
    /// called. Returns `None` on timeout or close.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ClassifyRequest> {
        let mut slot = self.slot.lock();
        if slot.is_none() && !*self.closed.lock() {
            let _ = self.not_empty.wait_for(&mut slot, timeout);
        }
        slot.take()
    }

    /// Signals `T_classify` to exit (§5 "Cancellation semantics": "`T_classify`
    /// exits on mailbox close").
    pub fn close(&self) {
        *self.closed.lock() = true;
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

/// Detection result (§3 "Detection result"), minus the probability
/// distribution — only what `T_process` needs to decide bypass.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSnapshot {
    pub label: String,
    pub confidence: f32,
    pub is_emergency: bool,
    pub block_seq: u64,
}

impl DetectionSnapshot {
    /// The fail-safe snapshot (§4.4 "Fail-safe rule", §7 "emergency
    /// bypass is the universal safe state ... whenever classification is
    /// unavailable"): used before `T_classify` has ever published, so a
    /// session never starts with a false sense of safety.
    pub fn fail_safe(block_seq: u64) -> Self {
        Self {
            label: "unavailable".to_string(),
            confidence: 1.0,
            is_emergency: true,
            block_seq,
        }
    }
}

/// Single-writer (`T_classify`), multi-reader (`T_process`) publication
/// point for the latest [`DetectionSnapshot`] (§5 "Shared resources").
#[derive(Debug)]
pub struct DetectionPublisher {
    inner: Mutex<Arc<DetectionSnapshot>>,
}

impl DetectionPublisher {
    pub fn new(initial: DetectionSnapshot) -> Self {
        Self {
            inner: Mutex::new(Arc::new(initial)),
        }
    }

    /// Publishes a new snapshot, replacing the previous one.
    pub fn publish(&self, snapshot: DetectionSnapshot) {
        *self.inner.lock() = Arc::new(snapshot);
    }

    /// Returns a self-consistent clone of the latest published snapshot.
    pub fn latest(&self) -> Arc<DetectionSnapshot> {
        self.inner.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(seq: u64) -> AudioBlock {
        AudioBlock::new(vec![0.0; 4], seq, 0).unwrap()
    }

    #[test]
    fn mailbox_overwrites_unconsumed_request() {
        let mailbox = ClassifyMailbox::new();
        mailbox.send(ClassifyRequest {
            block: block(1),
            timestamp_us: 0,
        });
        mailbox.send(ClassifyRequest {
            block: block(2),
            timestamp_us: 10,
        });
        let received = mailbox.recv_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(received.block.seq(), 2);
    }

    #[test]
    fn mailbox_recv_times_out_when_empty() {
        let mailbox = ClassifyMailbox::new();
        assert!(mailbox.recv_timeout(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn mailbox_close_wakes_blocked_receiver() {
        let mailbox = Arc::new(ClassifyMailbox::new());
        let waiter = {
            let mailbox = Arc::clone(&mailbox);
            std::thread::spawn(move || mailbox.recv_timeout(Duration::from_secs(5)))
        };
        std::thread::sleep(Duration::from_millis(10));
        mailbox.close();
        assert!(waiter.join().unwrap().is_none());
    }

    #[test]
    fn publisher_reads_are_self_consistent() {
        let publisher = DetectionPublisher::new(DetectionSnapshot::fail_safe(0));
        publisher.publish(DetectionSnapshot {
            label: "siren".to_string(),
            confidence: 0.9,
            is_emergency: true,
            block_seq: 7,
        });
        let snapshot = publisher.latest();
        assert_eq!(snapshot.block_seq, 7);
        assert!(snapshot.is_emergency);
    }
}
