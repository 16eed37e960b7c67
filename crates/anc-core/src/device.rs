//! The audio-device capability (§6 "Audio device interface (capability
//! consumed)"). The core never opens a device itself; the host injects an
//! implementation of [`AudioDevice`] at `initialize`.

use std::sync::Arc;

use parking_lot::Mutex;

use anc_dsp::AudioBlock;

use crate::error::Result;

/// A thin capability over a real or simulated audio device. Implementors
/// own whatever hardware/backend handle they need; the core only calls
/// `read_block`/`write_block` from `T_capture`/`T_process`.
pub trait AudioDevice: Send {
    /// The device's fixed sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// The device's fixed block size in samples.
    fn block_size(&self) -> usize;

    /// Blocks until one input block is available, or returns a fatal
    /// device error (§7 "Fatal").
    fn read_block(&mut self) -> Result<AudioBlock>;

    /// Writes one output block, or returns a fatal device error.
    fn write_block(&mut self, block: &AudioBlock) -> Result<()>;
}

/// A device that never fails: `read_block` yields silence at the
/// configured cadence, `write_block` discards its input. Lets a session
/// be constructed and exercised — in tests, or the `demos` CLI's dry-run
/// mode — without a real audio backend (§ "Supplemented Features").
#[derive(Debug)]
pub struct NullAudioDevice {
    sample_rate: u32,
    block_size: usize,
    next_seq: u64,
}

impl NullAudioDevice {
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size,
            next_seq: 0,
        }
    }
}

impl AudioDevice for NullAudioDevice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read_block(&mut self) -> Result<AudioBlock> {
        let seq = self.next_seq;
        self.next_seq += 1;
        Ok(AudioBlock::silence(self.block_size, seq, 0))
    }

    fn write_block(&mut self, _block: &AudioBlock) -> Result<()> {
        Ok(())
    }
}

/// Every block a [`ScriptedAudioDevice`] has been asked to write, behind a
/// cloneable handle — so a test can keep its own handle after the device
/// itself has been boxed and moved into `Session::initialize` (§8
/// "Emergency bypass bit-for-bit": comparing output blocks against the
/// scripted input after a session has run to completion).
#[derive(Debug, Clone, Default)]
pub struct RecordedOutputs {
    blocks: Arc<Mutex<Vec<AudioBlock>>>,
}

impl RecordedOutputs {
    /// Every recorded output block so far, in write order.
    pub fn blocks(&self) -> Vec<AudioBlock> {
        self.blocks.lock().clone()
    }
}

/// A device backed by a fixed, pre-recorded sequence of blocks — the
/// `demos` scenario renderer and the end-to-end tests use this to feed a
/// literal input (e.g. §8's synthetic alarm scenario) and capture the
/// resulting output blocks in order.
#[derive(Debug)]
pub struct ScriptedAudioDevice {
    sample_rate: u32,
    block_size: usize,
    input: std::collections::VecDeque<Vec<f32>>,
    next_seq: u64,
    output: RecordedOutputs,
}

impl ScriptedAudioDevice {
    pub fn new(sample_rate: u32, block_size: usize, input_blocks: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            block_size,
            input: input_blocks.into(),
            next_seq: 0,
            output: RecordedOutputs::default(),
        }
    }

    /// `true` once every scripted input block has been read.
    pub fn exhausted(&self) -> bool {
        self.input.is_empty()
    }

    /// A cloneable handle onto this device's recorded output blocks,
    /// readable after the device has been boxed and moved into a
    /// [`crate::session::Session`].
    pub fn outputs(&self) -> RecordedOutputs {
        self.output.clone()
    }
}

impl AudioDevice for ScriptedAudioDevice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read_block(&mut self) -> Result<AudioBlock> {
        let samples = self.input.pop_front().unwrap_or_else(|| vec![0.0; self.block_size]);
        let seq = self.next_seq;
        self.next_seq += 1;
        Ok(AudioBlock::new(samples, seq, 0)?)
    }

    fn write_block(&mut self, block: &AudioBlock) -> Result<()> {
        self.output.blocks.lock().push(block.clone());
        Ok(())
    }
}
