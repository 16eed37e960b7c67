//! Run one of the literal end-to-end scenarios against a scripted input
//! and report the resulting metrics, optionally writing the processed
//! output to a WAV file for manual inspection.
//!
//! ```sh
//! cargo run -p anc-demos --bin anc-scenario -- pure-tone --output tone.wav
//! cargo run -p anc-demos --bin anc-scenario -- emergency-override
//! cargo run -p anc-demos --bin anc-scenario -- cold-start
//! ```

use std::f32::consts::PI;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use anc_core::{
    scripted_classifier, AlgorithmChoice, ClassificationResult, Config, NullAudioDevice, NullMetricsSink,
    ScriptedAudioDevice, Session, Status,
};

#[derive(Parser, Debug)]
#[command(about = "Run a literal ANC end-to-end scenario against synthetic audio")]
struct Args {
    #[command(subcommand)]
    scenario: Scenario,

    /// Optional path to write the scenario's raw input as a mono 32-bit float WAV.
    #[arg(long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Scenario {
    /// 2.0s of a 440Hz tone at amplitude 0.5, RLS L=256 (§8 scenario 1).
    PureTone,
    /// 1.0s white noise, 1.0s alarm square wave, 1.0s white noise (§8 scenario 2).
    EmergencyOverride,
    /// 100 blocks of silence on a hybrid filter from a zero-initialized state (§8 scenario 6).
    ColdStart,
}

const SAMPLE_RATE: u32 = 48_000;
const BLOCK_SIZE: usize = 1024;

fn sine_wave(freq: f32, amplitude: f32, seconds: f32) -> Vec<f32> {
    let n = (SAMPLE_RATE as f32 * seconds) as usize;
    (0..n)
        .map(|i| amplitude * (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
        .collect()
}

fn square_wave(freq: f32, amplitude: f32, seconds: f32) -> Vec<f32> {
    let period = SAMPLE_RATE as f32 / freq;
    let n = (SAMPLE_RATE as f32 * seconds) as usize;
    (0..n)
        .map(|i| if (i as f32) % period < period / 2.0 { amplitude } else { -amplitude })
        .collect()
}

/// xorshift64 so the scenario is reproducible without an external rng crate.
fn white_noise(amplitude: f32, seconds: f32, seed: &mut u64) -> Vec<f32> {
    let n = (SAMPLE_RATE as f32 * seconds) as usize;
    (0..n)
        .map(|_| {
            *seed ^= *seed << 13;
            *seed ^= *seed >> 7;
            *seed ^= *seed << 17;
            let unit = (*seed >> 11) as f64 / (1u64 << 53) as f64;
            amplitude * (2.0 * unit as f32 - 1.0)
        })
        .collect()
}

fn chunk(samples: &[f32]) -> Vec<Vec<f32>> {
    samples.chunks(BLOCK_SIZE).map(|c| c.to_vec()).collect()
}

fn write_wav(path: &PathBuf, samples: &[f32]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Drives `session` against a `ScriptedAudioDevice`-backed run until every
/// scripted block has been processed, then stops it and returns the final
/// status snapshot.
fn drive_to_completion(session: &mut Session, total_blocks: usize) -> Result<Status> {
    while session.get_status().blocks_processed < total_blocks as u64 {
        std::thread::sleep(Duration::from_millis(5));
    }
    let status = session.get_status();
    session.stop()?;
    Ok(status)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    match args.scenario {
        Scenario::PureTone => {
            let tone = sine_wave(440.0, 0.5, 2.0);
            let blocks = chunk(&tone);
            let config = Config {
                sample_rate: SAMPLE_RATE,
                block_size: BLOCK_SIZE,
                filter_length: 256,
                algorithm: AlgorithmChoice::Rls,
                ..Default::default()
            };
            let device = ScriptedAudioDevice::new(config.sample_rate, config.block_size, blocks.clone());
            let mut session = Session::initialize(config, Box::new(device), Box::new(NullMetricsSink), None)?;
            session.start()?;
            let status = drive_to_completion(&mut session, blocks.len())?;
            println!(
                "pure-tone: blocks={} cancellation_db={:.1} algorithm={:?}",
                status.blocks_processed, status.last_metrics.cancellation_db, status.algorithm
            );
            if let Some(path) = &args.output {
                write_wav(path, &tone)?;
            }
        }
        Scenario::EmergencyOverride => {
            let mut seed = 0x1234_5678_9abc_def1u64;
            let part_quiet_before = white_noise(0.1, 1.0, &mut seed);
            let part_alarm = square_wave(3000.0, 0.6, 1.0);
            let part_quiet_after = white_noise(0.1, 1.0, &mut seed);
            // Blocks before/after which the scripted classifier should flip,
            // since real classification of this synthetic audio would be
            // unreliable (§8 scenario 2 needs a deterministic trigger).
            let alarm_starts_at = part_quiet_before.len().div_ceil(BLOCK_SIZE) as u64;
            let alarm_ends_at = alarm_starts_at + part_alarm.len().div_ceil(BLOCK_SIZE) as u64;

            let mut samples = part_quiet_before;
            samples.extend(part_alarm);
            samples.extend(part_quiet_after);
            let blocks = chunk(&samples);
            let config = Config {
                sample_rate: SAMPLE_RATE,
                block_size: BLOCK_SIZE,
                algorithm: AlgorithmChoice::Nlms,
                ..Default::default()
            };
            let device = ScriptedAudioDevice::new(config.sample_rate, config.block_size, blocks.clone());
            let (classifier, handle) = scripted_classifier(ClassificationResult {
                label: "speech".to_string(),
                confidence: 0.1,
                probs: vec![],
            });
            let mut session = Session::initialize_with_classifier(
                config,
                Box::new(device),
                Box::new(NullMetricsSink),
                None,
                Box::new(classifier),
            )?;
            session.start()?;

            let mut alarm_triggered = false;
            let mut alarm_cleared = false;
            while session.get_status().blocks_processed < blocks.len() as u64 {
                let processed = session.get_status().blocks_processed;
                if !alarm_triggered && processed >= alarm_starts_at {
                    handle.set(ClassificationResult {
                        label: "alarm".to_string(),
                        confidence: 0.95,
                        probs: vec![],
                    });
                    alarm_triggered = true;
                }
                if !alarm_cleared && processed >= alarm_ends_at {
                    handle.set(ClassificationResult {
                        label: "speech".to_string(),
                        confidence: 0.1,
                        probs: vec![],
                    });
                    alarm_cleared = true;
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            let status = session.get_status();
            session.stop()?;
            println!(
                "emergency-override: blocks={} is_emergency_active={} label={}",
                status.blocks_processed, status.is_emergency_active, status.current_label
            );
            if let Some(path) = &args.output {
                write_wav(path, &samples)?;
            }
        }
        Scenario::ColdStart => {
            let config = Config {
                sample_rate: SAMPLE_RATE,
                block_size: BLOCK_SIZE,
                filter_length: 512,
                algorithm: AlgorithmChoice::Hybrid,
                ..Default::default()
            };
            let device = NullAudioDevice::new(config.sample_rate, config.block_size);
            let mut session = Session::initialize(config, Box::new(device), Box::new(NullMetricsSink), None)?;
            session.start()?;
            let status = drive_to_completion(&mut session, 100)?;
            println!(
                "cold-start: blocks={} cancellation_db={:.2} drops={} starvations={}",
                status.blocks_processed, status.last_metrics.cancellation_db, status.drops, status.starvations
            );
        }
    }

    Ok(())
}
