//! Pipeline supervisor (C6, §4.6, §5, §6): owns the four-thread
//! structure plus the metrics publisher, the session state machine, and
//! the external control surface (`initialize`/`start`/`stop`/
//! `set_intensity`/`get_status`).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, info_span, trace, warn};

use anc_classify::{Classifier, EmergencyDetector, EmergencyTransition};
use anc_dsp::{AudioBlock, FeatureExtractor, PopOutcome, PushOutcome, RingBuffer};
use anc_filters::{Algorithm, FilterBank};

use crate::config::Config;
use crate::device::AudioDevice;
use crate::error::{Error, Result};
use crate::mailbox::{ClassifyMailbox, ClassifyRequest, DetectionPublisher, DetectionSnapshot};
use crate::metrics::{
    cancellation_db, rms_to_db, EmergencyCallback, EmergencyNotification, MetricRecord,
    MetricsSink, PipelineEvent, SessionMetrics,
};

/// A block sequence number used only internally to mark the end-of-stream
/// item `T_capture` pushes into C1 on a `stop` request (§5 "Cancellation
/// semantics"). `AudioBlock::new` already rejects non-finite samples, so a
/// real capture block can never legitimately carry this sequence number
/// given a session runs for far fewer than `u64::MAX` blocks.
const SENTINEL_SEQ: u64 = u64::MAX;

/// Session lifecycle states (§4.6 "States").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
    /// `stop` did not complete within its timeout budget; threads were
    /// detached (§5 "Cancellation semantics").
    Aborted,
}

/// Snapshot returned by [`Session::get_status`] (§6 "Control operations").
#[derive(Debug, Clone)]
pub struct Status {
    pub state: SessionState,
    pub algorithm: Algorithm,
    pub current_label: String,
    pub is_emergency_active: bool,
    pub blocks_processed: u64,
    pub drops: u64,
    pub starvations: u64,
    /// The latest published [`SessionMetrics`] record (§ "Supplemented
    /// Features": observable without a live `MetricsSink`).
    pub last_metrics: SessionMetrics,
}

fn classifier_labels() -> Vec<String> {
    anc_classify::DEFAULT_LABELS.iter().map(|s| s.to_string()).collect()
}

fn build_classifier(config: &Config) -> Result<Box<dyn Classifier>> {
    let classifier: Box<dyn Classifier> = match (&config.classifier_model_path, config.use_deep_classifier) {
        (None, false) => Box::new(anc_classify::default_shallow_classifier()),
        (None, true) => Box::new(anc_classify::default_deep_classifier()),
        (Some(path), false) => Box::new(anc_classify::ShallowClassifier::load(path, classifier_labels())?),
        (Some(path), true) => {
            let shallow = anc_classify::ShallowClassifier::load(path, classifier_labels())?;
            Box::new(anc_classify::DeepClassifier::load(path, shallow)?)
        }
    };
    Ok(classifier)
}

fn build_filter_bank(config: &Config) -> Result<FilterBank> {
    let algorithm: Algorithm = config.algorithm.into();
    let mut bank = FilterBank::new(algorithm, config.channels, config.filter_length)?;
    if let Some(gains) = &config.channel_gains {
        bank.set_gains(gains)?;
    }
    Ok(bank)
}

/// Join handles for the four session threads, held by [`Session`] between
/// `start` and `stop`.
struct SessionThreads {
    capture: JoinHandle<()>,
    process: JoinHandle<()>,
    classify: JoinHandle<()>,
    metrics: JoinHandle<()>,
}

/// The session handle (§6): the single owner of every buffer, thread, and
/// piece of cross-thread shared state for one ANC pipeline run. Multiple
/// independent sessions are supported by construction — there is no
/// global state (§9 "Global mutable state").
///
/// Neither `AudioDevice` nor `MetricsSink` nor `EmergencyCallback` require
/// `Debug` (a host's device/sink implementation has no obligation to
/// implement it), so the trait-object and thread-handle fields are
/// skipped rather than blocking a `Debug` impl on this otherwise
/// inspectable handle.
#[derive(derive_more::Debug)]
pub struct Session {
    config: Config,
    algorithm: Algorithm,
    #[debug(skip)]
    device: Arc<Mutex<Box<dyn AudioDevice>>>,
    #[debug(skip)]
    sink: Arc<Mutex<Box<dyn MetricsSink>>>,
    #[debug(skip)]
    on_event: Arc<Option<EmergencyCallback>>,

    state: Arc<Mutex<SessionState>>,
    stopping: Arc<AtomicBool>,
    intensity: Arc<Mutex<f32>>,
    blocks_processed: Arc<AtomicU64>,
    starvations: Arc<AtomicU64>,
    current_label: Arc<Mutex<String>>,
    last_metrics: Arc<Mutex<SessionMetrics>>,

    ring_buffer: Arc<RingBuffer>,
    classify_mailbox: Arc<ClassifyMailbox>,
    detection_publisher: Arc<DetectionPublisher>,

    /// A classifier supplied directly by the caller, bypassing
    /// `build_classifier`'s model-path lookup — used by tests and the
    /// `demos` scenario binary to drive the emergency path with a
    /// deterministic classifier instead of an untrained model (see
    /// [`Session::initialize_with_classifier`]). Taken by `start`, so it
    /// is only honored on the first `start` after `initialize`.
    #[debug(skip)]
    classifier_override: Option<Box<dyn Classifier>>,

    #[debug(skip)]
    threads: Option<SessionThreads>,
}

impl Session {
    /// Validates `config`, checks it against `device`'s declared rate and
    /// block size, and allocates the shared cross-thread buffers (§4.6,
    /// §6 "Validates and allocates all buffers"). Does not start any
    /// thread; call [`Session::start`] for that.
    pub fn initialize(
        mut config: Config,
        device: Box<dyn AudioDevice>,
        sink: Box<dyn MetricsSink>,
        on_event: Option<EmergencyCallback>,
    ) -> Result<Self> {
        config.validate()?;

        if device.sample_rate() != config.sample_rate {
            return Err(Error::DeviceRateMismatch {
                device: device.sample_rate(),
                session: config.sample_rate,
            });
        }
        if device.block_size() != config.block_size {
            return Err(Error::DeviceBlockSizeMismatch {
                device: device.block_size(),
                session: config.block_size,
            });
        }

        let algorithm: Algorithm = config.algorithm.into();
        let initial_intensity = config.initial_intensity;

        Ok(Self {
            algorithm,
            device: Arc::new(Mutex::new(device)),
            sink: Arc::new(Mutex::new(sink)),
            on_event: Arc::new(on_event),
            state: Arc::new(Mutex::new(SessionState::Idle)),
            stopping: Arc::new(AtomicBool::new(false)),
            intensity: Arc::new(Mutex::new(initial_intensity)),
            blocks_processed: Arc::new(AtomicU64::new(0)),
            starvations: Arc::new(AtomicU64::new(0)),
            current_label: Arc::new(Mutex::new("unavailable".to_string())),
            last_metrics: Arc::new(Mutex::new(SessionMetrics::silent(algorithm))),
            ring_buffer: Arc::new(RingBuffer::new(config.queue_capacity)),
            classify_mailbox: Arc::new(ClassifyMailbox::new()),
            detection_publisher: Arc::new(DetectionPublisher::new(DetectionSnapshot::fail_safe(0))),
            classifier_override: None,
            threads: None,
            config,
        })
    }

    /// As [`Session::initialize`], but `start` uses `classifier` directly
    /// instead of building one from `config.classifier_model_path`. For
    /// tests and demos that need the emergency path driven deterministically
    /// (§8 "Emergency override") rather than by an untrained model's
    /// effectively-random output on synthetic audio.
    pub fn initialize_with_classifier(
        config: Config,
        device: Box<dyn AudioDevice>,
        sink: Box<dyn MetricsSink>,
        on_event: Option<EmergencyCallback>,
        classifier: Box<dyn Classifier>,
    ) -> Result<Self> {
        let mut session = Self::initialize(config, device, sink, on_event)?;
        session.classifier_override = Some(classifier);
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// `set_intensity(gain ∈ [0,1])` (§6): scalar applied to anti-noise
    /// output. `0` disables ANC (output becomes the raw input), `1` is
    /// full cancellation effort.
    pub fn set_intensity(&self, gain: f32) {
        *self.intensity.lock() = gain.clamp(0.0, 1.0);
    }

    /// `get_status(handle)` (§6).
    pub fn get_status(&self) -> Status {
        let detection = self.detection_publisher.latest();
        Status {
            state: self.state(),
            algorithm: self.algorithm,
            current_label: self.current_label.lock().clone(),
            is_emergency_active: detection.is_emergency,
            blocks_processed: self.blocks_processed.load(Ordering::Relaxed),
            drops: self.ring_buffer.drops(),
            starvations: self.starvations.load(Ordering::Relaxed),
            last_metrics: self.last_metrics.lock().clone(),
        }
    }

    /// `start(handle)` (§6): spawns `T_capture`, `T_process`,
    /// `T_classify`, `T_metrics`; returns once the session is `Running`.
    /// Model loading happens here — on model-load error this returns
    /// without spawning any thread (§4.3 "On model-load error, pipeline
    /// start fails").
    pub fn start(&mut self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != SessionState::Idle && *state != SessionState::Aborted {
                return Err(Error::AlreadyRunning);
            }
            *state = SessionState::Starting;
        }

        let classifier = match self.classifier_override.take() {
            Some(classifier) => classifier,
            None => build_classifier(&self.config)?,
        };
        let filter_bank = build_filter_bank(&self.config)?;

        self.stopping.store(false, Ordering::SeqCst);
        self.blocks_processed.store(0, Ordering::Relaxed);
        self.starvations.store(0, Ordering::Relaxed);
        *self.current_label.lock() = "unavailable".to_string();
        self.detection_publisher.publish(DetectionSnapshot::fail_safe(0));

        let (metrics_tx, metrics_rx) = crossbeam_channel::unbounded::<MetricRecord>();
        let (event_tx, event_rx) = crossbeam_channel::unbounded::<EmergencyNotification>();

        let capture = self.spawn_capture(metrics_tx.clone());
        let process = self.spawn_process(filter_bank, metrics_tx.clone());
        let classify = self.spawn_classify(classifier, metrics_tx, event_tx);
        let metrics = self.spawn_metrics(metrics_rx, event_rx);

        self.threads = Some(SessionThreads {
            capture,
            process,
            classify,
            metrics,
        });

        *self.state.lock() = SessionState::Running;
        info!(algorithm = ?self.algorithm, channels = self.config.channels, "session started");
        Ok(())
    }

    /// `stop(handle)` (§6): cooperative shutdown. Returns once every
    /// thread has exited, or after the configured `stop_timeout_ms`
    /// budget — whichever comes first. On timeout the threads are
    /// detached (left to finish in the background) and the session is
    /// marked `Aborted` (§5 "Cancellation semantics").
    pub fn stop(&mut self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != SessionState::Running {
                return Err(Error::NotRunning);
            }
            *state = SessionState::Stopping;
        }

        self.stopping.store(true, Ordering::SeqCst);
        self.classify_mailbox.close();

        let Some(threads) = self.threads.take() else {
            *self.state.lock() = SessionState::Idle;
            return Ok(());
        };

        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        let joiner = thread::Builder::new()
            .name("anc-stop-joiner".to_string())
            .spawn(move || {
                let _ = threads.capture.join();
                let _ = threads.process.join();
                let _ = threads.classify.join();
                let _ = threads.metrics.join();
                let _ = done_tx.send(());
            })
            .expect("failed to spawn shutdown joiner thread");

        let timeout = Duration::from_millis(self.config.stop_timeout_ms);
        match done_rx.recv_timeout(timeout) {
            Ok(()) => {
                let _ = joiner.join();
                *self.state.lock() = SessionState::Idle;
                info!("session stopped");
                Ok(())
            }
            Err(_) => {
                *self.state.lock() = SessionState::Aborted;
                error!("stop did not complete within budget; threads detached");
                Err(Error::StopTimedOut)
            }
        }
    }

    fn spawn_capture(&self, metrics_tx: Sender<MetricRecord>) -> JoinHandle<()> {
        let device = Arc::clone(&self.device);
        let ring_buffer = Arc::clone(&self.ring_buffer);
        let stopping = Arc::clone(&self.stopping);
        let last_metrics = Arc::clone(&self.last_metrics);
        let block_size = self.config.block_size;

        thread::Builder::new()
            .name("anc-t-capture".to_string())
            .spawn(move || {
                let _span = info_span!("T_capture").entered();
                loop {
                    if stopping.load(Ordering::SeqCst) {
                        break;
                    }
                    match device.lock().read_block() {
                        Ok(block) => {
                            if ring_buffer.push(block) == PushOutcome::Full {
                                trace!("ring buffer full; oldest block dropped");
                                let _ = metrics_tx.send(MetricRecord {
                                    metrics: last_metrics.lock().clone(),
                                    event: Some(PipelineEvent::BlockDropped),
                                });
                            }
                        }
                        Err(err) => {
                            error!(error = %err, "fatal device read error; stopping session");
                            stopping.store(true, Ordering::SeqCst);
                            break;
                        }
                    }
                }
                let sentinel = AudioBlock::silence(block_size, SENTINEL_SEQ, 0);
                ring_buffer.push(sentinel);
                debug!("T_capture exiting");
            })
            .expect("failed to spawn T_capture")
    }

    fn spawn_process(&self, mut filter_bank: FilterBank, metrics_tx: Sender<MetricRecord>) -> JoinHandle<()> {
        let ring_buffer = Arc::clone(&self.ring_buffer);
        let device = Arc::clone(&self.device);
        let classify_mailbox = Arc::clone(&self.classify_mailbox);
        let detection_publisher = Arc::clone(&self.detection_publisher);
        let stopping = Arc::clone(&self.stopping);
        let intensity = Arc::clone(&self.intensity);
        let blocks_processed = Arc::clone(&self.blocks_processed);
        let starvations = Arc::clone(&self.starvations);
        let current_label = Arc::clone(&self.current_label);
        let last_metrics = Arc::clone(&self.last_metrics);
        let channels = self.config.channels;
        let block_size = self.config.block_size;
        let algorithm = self.algorithm;
        let pop_timeout = Duration::from_millis(self.config.pop_timeout_ms);

        thread::Builder::new()
            .name("anc-t-process".to_string())
            .spawn(move || {
                let _span = info_span!("T_process").entered();
                let started = Instant::now();
                let mut next_output_seq: u64 = 0;
                let mut seeded_seq = false;

                loop {
                    match ring_buffer.pop(pop_timeout) {
                        PopOutcome::Block(block) if block.seq() == SENTINEL_SEQ => {
                            let metrics = last_metrics.lock().clone();
                            let _ = metrics_tx.send(MetricRecord { metrics, event: None });
                            break;
                        }
                        PopOutcome::Block(block) => {
                            if !seeded_seq {
                                next_output_seq = block.seq();
                                seeded_seq = true;
                            }
                            let out_seq = next_output_seq;
                            next_output_seq += 1;

                            let block_start = Instant::now();
                            let timestamp_us = started.elapsed().as_micros() as u64;

                            classify_mailbox.send(ClassifyRequest {
                                block: block.clone(),
                                timestamp_us,
                            });

                            let detection = detection_publisher.latest();
                            *current_label.lock() = detection.label.clone();
                            let is_emergency = detection.is_emergency;

                            let input_rms = block.rms();
                            let mut reset_channels: Vec<usize> = Vec::new();

                            let (output_samples, residual_rms) = if is_emergency {
                                (block.samples().to_vec(), input_rms)
                            } else {
                                let refs: Vec<&[f32]> = std::iter::repeat(block.samples()).take(channels).collect();
                                match filter_bank.process_block(&refs, &refs) {
                                    Ok(reports) => {
                                        let gain = *intensity.lock();
                                        let channel_len =
                                            reports.first().map(|r| r.anti_noise.len()).unwrap_or(block.len());
                                        let mut mixed = vec![0.0f32; channel_len];
                                        let mut residual_sq_sum = 0.0f32;
                                        for (idx, report) in reports.iter().enumerate() {
                                            for (m, s) in mixed.iter_mut().zip(report.anti_noise.iter()) {
                                                *m += s * gain / channels as f32;
                                            }
                                            let channel_mean_sq = if report.error.is_empty() {
                                                0.0
                                            } else {
                                                report.error.iter().map(|e| e * e).sum::<f32>() / report.error.len() as f32
                                            };
                                            residual_sq_sum += channel_mean_sq;
                                            if report.reset {
                                                reset_channels.push(idx);
                                            }
                                        }
                                        let residual_rms = (residual_sq_sum / channels as f32).sqrt();
                                        (mixed, residual_rms)
                                    }
                                    Err(err) => {
                                        warn!(error = %err, "filter bank rejected block; bypassing");
                                        (block.samples().to_vec(), input_rms)
                                    }
                                }
                            };

                            let output_block = AudioBlock::new(output_samples, out_seq, block.captured_at_us())
                                .unwrap_or_else(|err| {
                                    error!(error = %err, "non-finite output sample; emitting silence");
                                    AudioBlock::silence(block_size, out_seq, block.captured_at_us())
                                });

                            let output_rms = output_block.rms();
                            let cancellation = if is_emergency {
                                0.0
                            } else {
                                cancellation_db(input_rms, residual_rms)
                            };

                            let latency_us = block_start.elapsed().as_micros() as u64;
                            let budget_us = (block_size as f64 / algorithm_rate_hint(algorithm) * 1e6) as u64;
                            if latency_us >= budget_us {
                                trace!(latency_us, budget_us, "block processing exceeded the real-time budget");
                            }

                            if let Err(err) = device.lock().write_block(&output_block) {
                                error!(error = %err, "fatal device write error; stopping session");
                                stopping.store(true, Ordering::SeqCst);
                            }

                            blocks_processed.fetch_add(1, Ordering::Relaxed);

                            let metrics = SessionMetrics {
                                block_seq: out_seq,
                                input_rms_db: rms_to_db(input_rms),
                                output_rms_db: rms_to_db(output_rms),
                                cancellation_db: cancellation,
                                latency_us,
                                algorithm,
                                emergency_active: is_emergency,
                            };
                            *last_metrics.lock() = metrics.clone();

                            for channel in &reset_channels {
                                let _ = metrics_tx.send(MetricRecord {
                                    metrics: metrics.clone(),
                                    event: Some(PipelineEvent::FilterReset { channel: *channel }),
                                });
                            }
                            let _ = metrics_tx.send(MetricRecord { metrics, event: None });
                        }
                        PopOutcome::Starved => {
                            starvations.fetch_add(1, Ordering::Relaxed);
                            let out_seq = next_output_seq;
                            next_output_seq += 1;
                            seeded_seq = true;
                            let silent = AudioBlock::silence(block_size, out_seq, 0);
                            if let Err(err) = device.lock().write_block(&silent) {
                                error!(error = %err, "fatal device write error during starvation; stopping session");
                                stopping.store(true, Ordering::SeqCst);
                            }
                            let metrics = SessionMetrics {
                                block_seq: out_seq,
                                ..SessionMetrics::silent(algorithm)
                            };
                            *last_metrics.lock() = metrics.clone();
                            let _ = metrics_tx.send(MetricRecord {
                                metrics,
                                event: Some(PipelineEvent::Starvation),
                            });
                            if stopping.load(Ordering::SeqCst) {
                                break;
                            }
                        }
                    }
                }
                debug!("T_process exiting");
            })
            .expect("failed to spawn T_process")
    }

    fn spawn_classify(
        &self,
        mut classifier: Box<dyn Classifier>,
        metrics_tx: Sender<MetricRecord>,
        event_tx: Sender<EmergencyNotification>,
    ) -> JoinHandle<()> {
        let classify_mailbox = Arc::clone(&self.classify_mailbox);
        let detection_publisher = Arc::clone(&self.detection_publisher);
        let last_metrics = Arc::clone(&self.last_metrics);
        let sample_rate = self.config.sample_rate as f32;
        let emergency_config = anc_classify::EmergencyConfig {
            emergency_set: self.config.emergency.emergency_set.iter().cloned().collect(),
            theta_on: self.config.emergency.theta_on,
            theta_off: self.config.emergency.theta_off,
            hold_ms: self.config.emergency.hold_ms,
        };

        thread::Builder::new()
            .name("anc-t-classify".to_string())
            .spawn(move || {
                let _span = info_span!("T_classify").entered();
                let mut extractor = FeatureExtractor::new(sample_rate);
                let mut detector = EmergencyDetector::new(emergency_config);
                loop {
                    let Some(request) = classify_mailbox.recv_timeout(Duration::from_millis(100)) else {
                        if classify_mailbox.is_closed() {
                            break;
                        }
                        continue;
                    };
                    let features = extractor.extract(request.block.samples());
                    let result = classifier.classify(&features);
                    let transition = detector.update(Some(&result), request.block.seq(), request.timestamp_us);
                    detection_publisher.publish(DetectionSnapshot {
                        label: result.label,
                        confidence: result.confidence,
                        is_emergency: detector.is_active(),
                        block_seq: request.block.seq(),
                    });
                    if let Some(event) = transition {
                        let pipeline_event = match event.transition {
                            EmergencyTransition::Started => PipelineEvent::EmergencyStart {
                                label: event.label.clone(),
                                confidence: event.confidence,
                                timestamp_us: event.timestamp_us,
                            },
                            EmergencyTransition::Ended => PipelineEvent::EmergencyEnd {
                                label: event.label.clone(),
                                confidence: event.confidence,
                                timestamp_us: event.timestamp_us,
                            },
                        };
                        let _ = metrics_tx.send(MetricRecord {
                            metrics: last_metrics.lock().clone(),
                            event: Some(pipeline_event),
                        });
                        let notification = EmergencyNotification {
                            label: event.label,
                            confidence: event.confidence,
                            block_seq: event.block_seq,
                            timestamp_us: event.timestamp_us,
                        };
                        let _ = event_tx.send(notification);
                    }
                }
                debug!("T_classify exiting");
            })
            .expect("failed to spawn T_classify")
    }

    fn spawn_metrics(&self, metrics_rx: Receiver<MetricRecord>, event_rx: Receiver<EmergencyNotification>) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        let on_event = Arc::clone(&self.on_event);

        thread::Builder::new()
            .name("anc-t-metrics".to_string())
            .spawn(move || {
                let _span = info_span!("T_metrics").entered();
                loop {
                    crossbeam_channel::select! {
                        recv(metrics_rx) -> msg => {
                            match msg {
                                Ok(record) => sink.lock().publish(record),
                                Err(_) => break,
                            }
                        }
                        recv(event_rx) -> msg => {
                            if let Ok(notification) = msg {
                                if let Some(cb) = on_event.as_ref() {
                                    cb(notification);
                                }
                            }
                        }
                    }
                }
                debug!("T_metrics exiting");
            })
            .expect("failed to spawn T_metrics")
    }
}

/// A coarse real-time deadline hint per algorithm, used only to decide
/// whether to emit a `trace`-level over-budget log (§4.5 "worst-case
/// per-block compute must fit comfortably inside one block period").
/// RLS and Hybrid carry more compute than NLMS, so they get a tighter
/// accounting multiplier rather than a separate measured deadline.
fn algorithm_rate_hint(algorithm: Algorithm) -> f64 {
    match algorithm {
        Algorithm::Nlms => 48_000.0,
        Algorithm::Rls => 48_000.0 * 0.5,
        Algorithm::Hybrid => 48_000.0 * 0.5,
    }
}
