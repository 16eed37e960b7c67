//! Session metrics (§3 "Session metrics", §6 "Metrics sink") and the
//! separate emergency-event notification channel.

use std::sync::Arc;

use parking_lot::Mutex;

use anc_filters::Algorithm;

/// `cancellation_db` is clamped to this range; an infinite-cancellation
/// (residual RMS of exactly zero) block reports exactly the upper bound
/// (§8 "Cancellation metric bounds").
pub const CANCELLATION_DB_MAX: f32 = 120.0;
const CANCELLATION_DB_MIN: f32 = 0.0;

/// Converts a linear RMS value to dBFS-style decibels relative to full
/// scale (`20*log10(rms)`), treating silence (`rms <= 0`) as `-inf`
/// clamped to a very low floor so downstream arithmetic stays finite.
pub fn rms_to_db(rms: f32) -> f32 {
    if rms <= 0.0 {
        return -160.0;
    }
    20.0 * rms.log10()
}

/// `20*log10(input_rms / residual_rms)`, clamped to `[0, 120]`. Residual
/// RMS of exactly zero reports exactly [`CANCELLATION_DB_MAX`] rather than
/// `+inf` (§8 "Cancellation metric bounds").
pub fn cancellation_db(input_rms: f32, residual_rms: f32) -> f32 {
    if residual_rms <= 0.0 {
        return CANCELLATION_DB_MAX;
    }
    if input_rms <= 0.0 {
        return CANCELLATION_DB_MIN;
    }
    (20.0 * (input_rms / residual_rms).log10()).clamp(CANCELLATION_DB_MIN, CANCELLATION_DB_MAX)
}

/// One-off events a block can raise alongside its regular metrics (§6
/// "Metrics sink" record events list).
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    EmergencyStart { label: String, confidence: f32, timestamp_us: u64 },
    EmergencyEnd { label: String, confidence: f32, timestamp_us: u64 },
    FilterReset { channel: usize },
    BlockDropped,
    Starvation,
}

/// The running per-block aggregate the pipeline publishes (§3 "Session
/// metrics"). Also the snapshot `get_status` returns so a caller without a
/// sink wired up can still observe the last block's numbers (§
/// "Supplemented Features").
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMetrics {
    pub block_seq: u64,
    pub input_rms_db: f32,
    pub output_rms_db: f32,
    pub cancellation_db: f32,
    pub latency_us: u64,
    pub algorithm: Algorithm,
    pub emergency_active: bool,
}

impl SessionMetrics {
    pub fn silent(algorithm: Algorithm) -> Self {
        Self {
            block_seq: 0,
            input_rms_db: rms_to_db(0.0),
            output_rms_db: rms_to_db(0.0),
            cancellation_db: CANCELLATION_DB_MIN,
            latency_us: 0,
            algorithm,
            emergency_active: false,
        }
    }
}

/// One record published to the [`MetricsSink`] per block, bundling the
/// running aggregate with any event this block raised.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub metrics: SessionMetrics,
    pub event: Option<PipelineEvent>,
}

/// `publish(metric_record)` non-blocking (§6). Implementors must not
/// block `T_metrics` for long; a slow external sink should buffer
/// internally.
pub trait MetricsSink: Send {
    fn publish(&mut self, record: MetricRecord);
}

/// Discards every record. The default sink when a host does not wire one
/// up (§ "Supplemented Features").
#[derive(Debug, Default)]
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {
    fn publish(&mut self, _record: MetricRecord) {}
}

/// Records every published record in order, for tests.
#[derive(Debug, Default)]
pub struct RecordingMetricsSink {
    pub records: Vec<MetricRecord>,
}

impl MetricsSink for RecordingMetricsSink {
    fn publish(&mut self, record: MetricRecord) {
        self.records.push(record);
    }
}

/// Records every published record behind a cloneable handle, so a test can
/// keep its own handle after the sink itself has been moved into
/// `Session::initialize` (§8 "End-to-end scenarios": asserting the
/// metrics/event stream a running session produced).
#[derive(Debug, Clone, Default)]
pub struct SharedMetricsSink {
    records: Arc<Mutex<Vec<MetricRecord>>>,
}

impl SharedMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of every record published so far, in publish order.
    pub fn records(&self) -> Vec<MetricRecord> {
        self.records.lock().clone()
    }
}

impl MetricsSink for SharedMetricsSink {
    fn publish(&mut self, record: MetricRecord) {
        self.records.lock().push(record);
    }
}

/// Payload delivered to the `on_event` callback (§6 "Emergency
/// notification"), invoked only from `T_metrics`, never `T_process`.
#[derive(Debug, Clone, PartialEq)]
pub struct EmergencyNotification {
    pub label: String,
    pub confidence: f32,
    pub block_seq: u64,
    pub timestamp_us: u64,
}

/// `on_event` callback (§6). Boxed so a session can own a type-erased
/// host-provided closure.
pub type EmergencyCallback = Box<dyn Fn(EmergencyNotification) + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_db_is_bounded() {
        assert_eq!(cancellation_db(1.0, 0.0), CANCELLATION_DB_MAX);
        assert!(cancellation_db(1.0, 1.0) >= CANCELLATION_DB_MIN);
        assert!(cancellation_db(0.001, 1.0) >= CANCELLATION_DB_MIN);
    }

    #[test]
    fn cancellation_db_reflects_improvement() {
        let small_residual = cancellation_db(1.0, 0.01);
        let large_residual = cancellation_db(1.0, 0.5);
        assert!(small_residual > large_residual);
    }

    #[test]
    fn null_sink_discards() {
        let mut sink = NullMetricsSink;
        sink.publish(MetricRecord {
            metrics: SessionMetrics::silent(Algorithm::Nlms),
            event: None,
        });
    }

    #[test]
    fn recording_sink_keeps_order() {
        let mut sink = RecordingMetricsSink::default();
        for seq in 0..3 {
            let mut metrics = SessionMetrics::silent(Algorithm::Nlms);
            metrics.block_seq = seq;
            sink.publish(MetricRecord { metrics, event: None });
        }
        assert_eq!(sink.records.len(), 3);
        assert_eq!(sink.records[2].metrics.block_seq, 2);
    }

    #[test]
    fn shared_sink_handle_observes_records_after_move() {
        let sink = SharedMetricsSink::new();
        let handle = sink.clone();
        let mut moved: Box<dyn MetricsSink> = Box::new(sink);
        moved.publish(MetricRecord {
            metrics: SessionMetrics::silent(Algorithm::Rls),
            event: None,
        });
        assert_eq!(handle.records().len(), 1);
    }
}
