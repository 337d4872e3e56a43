//! Guarded audio buffers for `process` calls.
//!
//! Every channel carries [`GUARD_SAMPLES`] guard samples on both sides of its
//! data region. Output guards hold a NaN canary and output data is pre-filled
//! with a second NaN poison pattern before each call; input guards and the
//! unused tail of the input region hold a large finite poison. After the call
//! the guards, the untouched tail and the written region are checked.

use std::f64::consts::TAU;
use std::time::{Duration, Instant};

use vst3_host::{
    AudioBus, BusDirection, Component, ComponentInstance, MediaType, ParamQueue, ProcessData,
    ProcessMode,
};

use crate::error::Failure;

pub const GUARD_SAMPLES: usize = 64;
const OUTPUT_CANARY: u32 = 0x7FC0_DEAD;
const OUTPUT_POISON: u32 = 0x7FC0_BEEF;
pub const INPUT_POISON: f32 = 1e20;
/// Output magnitudes at or above this can only come from reading input poison.
const POISON_READ_THRESHOLD: f32 = 1e19;

/// Converts a linear magnitude to dB relative to `reference`.
pub fn to_db(value: f64, reference: f64) -> f64 {
    if value <= 0.0 || reference <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * (value / reference).log10()
    }
}

pub fn peak(samples: &[f32]) -> f64 {
    samples.iter().fold(0.0_f64, |peak, sample| peak.max(f64::from(sample.abs())))
}

/// Input signals fed to the plug-in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stimulus {
    /// Zeros with the input silence flags clear.
    Zero,
    /// Zeros announced through the input silence flags.
    Silence,
    /// A single full-scale sample at stream position zero.
    Impulse,
    /// A full-scale sine.
    Sine { frequency: f64 },
}

impl Stimulus {
    pub const ALL: [Stimulus; 4] = [
        Stimulus::Zero,
        Stimulus::Silence,
        Stimulus::Impulse,
        Stimulus::Sine { frequency: 997.0 },
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Zero => "zero",
            Self::Silence => "silence",
            Self::Impulse => "impulse",
            Self::Sine { .. } => "sine",
        }
    }

    /// Sample at absolute stream position `index`.
    pub fn sample(&self, index: u64, sample_rate: f64) -> f32 {
        match self {
            Self::Zero | Self::Silence => 0.0,
            Self::Impulse => {
                if index == 0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Sine { frequency } => (TAU * frequency * index as f64 / sample_rate).sin() as f32,
        }
    }
}

struct GuardedChannel {
    data: Vec<f32>,
    capacity: usize,
}

impl GuardedChannel {
    fn new(capacity: usize, guard: f32, fill: f32) -> Self {
        let mut data = vec![guard; capacity + 2 * GUARD_SAMPLES];
        data[GUARD_SAMPLES..GUARD_SAMPLES + capacity].fill(fill);
        Self { data, capacity }
    }

    fn body(&self) -> &[f32] {
        &self.data[GUARD_SAMPLES..GUARD_SAMPLES + self.capacity]
    }

    fn body_mut(&mut self) -> &mut [f32] {
        &mut self.data[GUARD_SAMPLES..GUARD_SAMPLES + self.capacity]
    }

    fn guards(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        let head = self.data[..GUARD_SAMPLES].iter().enumerate();
        let tail = self.data[GUARD_SAMPLES + self.capacity..]
            .iter()
            .enumerate()
            .map(|(index, sample)| (index + GUARD_SAMPLES, sample));
        head.chain(tail).map(|(index, sample)| (index, *sample))
    }
}

fn truncated(bus: &mut [GuardedChannel], frames: usize) -> Vec<&mut [f32]> {
    bus.iter_mut()
        .map(|channel| &mut channel.body_mut()[..frames])
        .collect()
}

/// What the plug-in reported back from one `process` call.
#[derive(Debug, Clone)]
pub struct BlockRun {
    pub output_silence: Vec<u64>,
    pub output_changes: Vec<ParamQueue>,
    pub elapsed: Duration,
}

/// Guarded buffers for every audio bus of a component.
pub struct TestBuffers {
    inputs: Vec<Vec<GuardedChannel>>,
    outputs: Vec<Vec<GuardedChannel>>,
    input_silent: bool,
    max_block: usize,
}

impl TestBuffers {
    /// `inputs` and `outputs` hold the channel count of each bus.
    pub fn new(inputs: &[usize], outputs: &[usize], max_block: usize) -> Self {
        let input_poison = || GuardedChannel::new(max_block, INPUT_POISON, INPUT_POISON);
        let output_poison = || {
            GuardedChannel::new(
                max_block,
                f32::from_bits(OUTPUT_CANARY),
                f32::from_bits(OUTPUT_POISON),
            )
        };
        Self {
            inputs: inputs
                .iter()
                .map(|channels| (0..*channels).map(|_| input_poison()).collect())
                .collect(),
            outputs: outputs
                .iter()
                .map(|channels| (0..*channels).map(|_| output_poison()).collect())
                .collect(),
            input_silent: false,
            max_block,
        }
    }

    /// Buffers matching the audio buses the component reports.
    pub fn for_component(component: &dyn Component, max_block: usize) -> Self {
        let layout = |direction| -> Vec<usize> {
            (0..component.bus_count(MediaType::Audio, direction))
                .map(|index| {
                    component
                        .bus_info(MediaType::Audio, direction, index)
                        .map(|info| info.channel_count.max(0) as usize)
                        .unwrap_or(0)
                })
                .collect()
        };
        Self::new(&layout(BusDirection::Input), &layout(BusDirection::Output), max_block)
    }

    pub fn max_block(&self) -> usize {
        self.max_block
    }

    pub fn input_channels(&self) -> usize {
        self.inputs.iter().map(Vec::len).sum()
    }

    pub fn output_channels(&self) -> usize {
        self.outputs.iter().map(Vec::len).sum()
    }

    /// Channel counts of the first input and output bus.
    pub fn main_layout(&self) -> (usize, usize) {
        (
            self.inputs.first().map_or(0, Vec::len),
            self.outputs.first().map_or(0, Vec::len),
        )
    }

    /// Fills the first `frames` input samples from `signal(channel, frame)`.
    /// Channels are numbered across all input buses.
    pub fn fill_inputs(&mut self, frames: usize, mut signal: impl FnMut(usize, usize) -> f32) {
        self.input_silent = false;
        for (channel, guarded) in self.inputs.iter_mut().flatten().enumerate() {
            let body = guarded.body_mut();
            for (frame, sample) in body[..frames].iter_mut().enumerate() {
                *sample = signal(channel, frame);
            }
            body[frames..].fill(INPUT_POISON);
        }
    }

    /// Fills the inputs from a stimulus starting at stream position `start`.
    pub fn fill_stimulus(
        &mut self,
        stimulus: Stimulus,
        start: u64,
        frames: usize,
        sample_rate: f64,
    ) {
        self.fill_inputs(frames, |_, frame| stimulus.sample(start + frame as u64, sample_rate));
        self.input_silent = stimulus == Stimulus::Silence;
    }

    pub fn input(&self, bus: usize, channel: usize) -> &[f32] {
        self.inputs[bus][channel].body()
    }

    pub fn output(&self, bus: usize, channel: usize) -> &[f32] {
        self.outputs[bus][channel].body()
    }

    /// Every output channel, numbered across buses.
    pub fn outputs(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.outputs.iter().flatten().map(GuardedChannel::body)
    }

    /// Peak magnitude over the first `frames` samples of every output channel.
    pub fn output_peak(&self, frames: usize) -> f64 {
        let frames = frames.min(self.max_block);
        self.outputs().map(|channel| peak(&channel[..frames])).fold(0.0, f64::max)
    }

    fn reset_outputs(&mut self) {
        for guarded in self.outputs.iter_mut().flatten() {
            guarded.body_mut().fill(f32::from_bits(OUTPUT_POISON));
        }
    }

    /// A `ProcessData` over freshly poisoned outputs, for calls that bypass
    /// the lifecycle machine.
    pub fn process_data(&mut self, frames: usize, mode: ProcessMode) -> ProcessData<'_> {
        let frames = frames.min(self.max_block);
        self.reset_outputs();
        let input_flags = if self.input_silent { u64::MAX } else { 0 };
        let inputs = self
            .inputs
            .iter_mut()
            .map(|bus| {
                let mut bus = AudioBus::new(truncated(bus, frames));
                bus.silence_flags = input_flags;
                bus
            })
            .collect();
        let outputs = self
            .outputs
            .iter_mut()
            .map(|bus| AudioBus::new(truncated(bus, frames)))
            .collect();
        ProcessData {
            mode,
            num_samples: frames,
            inputs,
            outputs,
            input_changes: Vec::new(),
            output_changes: Vec::new(),
        }
    }

    /// Runs one checked `process` call through the lifecycle machine.
    pub fn run(
        &mut self,
        instance: &mut ComponentInstance,
        frames: usize,
        mode: ProcessMode,
        changes: Vec<ParamQueue>,
    ) -> Result<BlockRun, Failure> {
        let frames = frames.min(self.max_block);
        let mut data = self.process_data(frames, mode);
        data.input_changes = changes;
        let started = Instant::now();
        let result = instance.process(&mut data);
        let elapsed = started.elapsed();
        let output_silence = data.outputs.iter().map(|bus| bus.silence_flags).collect::<Vec<_>>();
        let output_changes = std::mem::take(&mut data.output_changes);
        drop(data);
        result?;
        self.check(frames, &output_silence)?;
        Ok(BlockRun {
            output_silence,
            output_changes,
            elapsed,
        })
    }

    /// Verifies guards, coverage and numerics after a call of `frames` samples.
    pub fn check(&self, frames: usize, output_silence: &[u64]) -> Result<(), Failure> {
        for (bus, channels) in self.inputs.iter().enumerate() {
            for (channel, guarded) in channels.iter().enumerate() {
                let touched = guarded.guards().find(|(_, sample)| *sample != INPUT_POISON);
                if let Some((index, _)) = touched {
                    return Err(Failure::contract(format!(
                        "input bus {bus} channel {channel}: \
                         out-of-bounds write at guard sample {index}"
                    )));
                }
                let tail = &guarded.body()[frames..];
                if let Some(frame) = tail.iter().position(|sample| *sample != INPUT_POISON) {
                    return Err(Failure::contract(format!(
                        "input bus {bus} channel {channel}: wrote past numSamples at frame {}",
                        frames + frame
                    )));
                }
            }
        }
        for (bus, channels) in self.outputs.iter().enumerate() {
            let flags = output_silence.get(bus).copied().unwrap_or(0);
            for (channel, guarded) in channels.iter().enumerate() {
                let touched = guarded
                    .guards()
                    .find(|(_, sample)| sample.to_bits() != OUTPUT_CANARY);
                if let Some((index, _)) = touched {
                    return Err(Failure::contract(format!(
                        "output bus {bus} channel {channel}: \
                         out-of-bounds write at guard sample {index}"
                    )));
                }
                let body = guarded.body();
                let tail = &body[frames..];
                let past = tail.iter().position(|sample| sample.to_bits() != OUTPUT_POISON);
                if let Some(frame) = past {
                    return Err(Failure::contract(format!(
                        "output bus {bus} channel {channel}: wrote past numSamples at frame {}",
                        frames + frame
                    )));
                }
                let flagged_silent = channel < 64 && flags & (1 << channel) != 0;
                for (frame, sample) in body[..frames].iter().enumerate() {
                    if sample.to_bits() == OUTPUT_POISON {
                        if flagged_silent {
                            continue;
                        }
                        return Err(Failure::contract(format!(
                            "output bus {bus} channel {channel}: frame {frame} not written"
                        )));
                    }
                    if sample.is_nan() {
                        return Err(Failure::numeric(format!(
                            "NaN in output bus {bus} channel {channel} at frame {frame}"
                        )));
                    }
                    if sample.is_infinite() {
                        return Err(Failure::numeric(format!(
                            "Inf in output bus {bus} channel {channel} at frame {frame}"
                        )));
                    }
                    if sample.abs() >= POISON_READ_THRESHOLD {
                        return Err(Failure::contract(format!(
                            "output bus {bus} channel {channel}: value {sample:e} at frame {frame} \
                             comes from reading outside the input region"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
