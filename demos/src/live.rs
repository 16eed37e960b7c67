//! Run the ANC session against a real microphone/speaker pair.
//!
//! ```sh
//! cargo run -p anc-demos --bin anc-live -- --algorithm hybrid --duration 10
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;

use anc_core::{AlgorithmChoice, AudioDevice, Config, NullMetricsSink, Session};
use anc_dsp::AudioBlock;

#[derive(Parser, Debug)]
#[command(about = "Drive the ANC pipeline against a live microphone/speaker pair")]
struct Args {
    /// Adaptive algorithm.
    #[arg(long, value_enum, default_value = "hybrid")]
    algorithm: AlgorithmArg,

    /// Filter length (taps).
    #[arg(long, default_value_t = 512)]
    filter_length: usize,

    /// How long to run, in seconds.
    #[arg(long, default_value_t = 10)]
    duration: u64,

    /// Trained classifier model artifact. Omit to run the untrained
    /// deterministic classifier.
    #[arg(long)]
    classifier_model: Option<String>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum AlgorithmArg {
    Nlms,
    Rls,
    Hybrid,
}

impl From<AlgorithmArg> for AlgorithmChoice {
    fn from(value: AlgorithmArg) -> Self {
        match value {
            AlgorithmArg::Nlms => AlgorithmChoice::Nlms,
            AlgorithmArg::Rls => AlgorithmChoice::Rls,
            AlgorithmArg::Hybrid => AlgorithmChoice::Hybrid,
        }
    }
}

/// Bridges `anc_core::AudioDevice` to a pair of cpal streams via lock-free
/// ring buffers. Owns only the ring buffer halves (plain `Send` data); the
/// cpal `Stream` handles themselves stay on the thread that created them
/// and are kept alive in `main` for the session's lifetime.
struct CpalBridge {
    sample_rate: u32,
    block_size: usize,
    input: ringbuf::HeapCons<f32>,
    output: ringbuf::HeapProd<f32>,
    next_seq: u64,
}

impl AudioDevice for CpalBridge {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read_block(&mut self) -> anc_core::Result<AudioBlock> {
        let mut samples = vec![0.0f32; self.block_size];
        let mut filled = 0;
        while filled < self.block_size {
            let popped = self.input.pop_slice(&mut samples[filled..]);
            filled += popped;
            if filled < self.block_size {
                thread::sleep(Duration::from_micros(500));
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        AudioBlock::new(samples, seq, 0).map_err(anc_core::Error::from)
    }

    fn write_block(&mut self, block: &AudioBlock) -> anc_core::Result<()> {
        let mut written = 0;
        let samples = block.samples();
        while written < samples.len() {
            written += self.output.push_slice(&samples[written..]);
            if written < samples.len() {
                thread::sleep(Duration::from_micros(500));
            }
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc::set_handler({
        let running = Arc::clone(&running);
        move || running.store(false, Ordering::SeqCst)
    })?;

    let host = cpal::default_host();
    let input_device = host.default_input_device().context("no input device available")?;
    let output_device = host.default_output_device().context("no output device available")?;
    tracing::info!(input = %input_device.name()?, output = %output_device.name()?, "opened devices");

    let sample_rate = 48_000u32;
    let block_size = 1024usize;
    let cpal_config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let input_ring = HeapRb::<f32>::new(block_size * 8);
    let (mut input_prod, input_cons) = input_ring.split();
    let output_ring = HeapRb::<f32>::new(block_size * 8);
    let (output_prod, mut output_cons) = output_ring.split();

    let input_stream = input_device.build_input_stream(
        &cpal_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            input_prod.push_slice(data);
        },
        |err| tracing::error!(error = %err, "input stream error"),
        None,
    )?;
    let output_stream = output_device.build_output_stream(
        &cpal_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let popped = output_cons.pop_slice(data);
            for sample in &mut data[popped..] {
                *sample = 0.0;
            }
        },
        |err| tracing::error!(error = %err, "output stream error"),
        None,
    )?;

    input_stream.play()?;
    output_stream.play()?;

    let bridge = CpalBridge {
        sample_rate,
        block_size,
        input: input_cons,
        output: output_prod,
        next_seq: 0,
    };

    let config = Config {
        sample_rate,
        block_size,
        filter_length: args.filter_length,
        algorithm: args.algorithm.into(),
        classifier_model_path: args.classifier_model.map(Into::into),
        ..Default::default()
    };

    let mut session = Session::initialize(config, Box::new(bridge), Box::new(NullMetricsSink), None)?;
    session.start()?;
    tracing::info!("session running; press ctrl-c to stop early");

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    while running.load(Ordering::SeqCst) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(100));
        let status = session.get_status();
        tracing::debug!(
            label = %status.current_label,
            emergency = status.is_emergency_active,
            blocks = status.blocks_processed,
            drops = status.drops,
            starvations = status.starvations,
            "status"
        );
    }

    session.stop()?;
    Ok(())
}
