use vst3_host::ffi::INFINITE_TAIL;
use vst3_host::ProcessMode;

use super::pure_effects;
use crate::buffers::{peak, to_db, Stimulus, TestBuffers};
use crate::context::{CaseContext, CaseResult, SETUP_BLOCK, SETUP_RATE};
use crate::error::Failure;
use crate::registry::{Stage, Suite, TestCase};

/// Residual allowed once the announced tail has elapsed, relative to the stimulus peak.
const RESIDUAL_DB: f64 = -120.0;
const STIMULUS_BLOCKS: usize = 4;
/// Tails longer than this are not waited out.
const MAX_TAIL_SECONDS: f64 = 60.0;

pub fn cases() -> Vec<TestCase> {
    vec![TestCase::new("tail.obeys-tail", Suite::Tail, Stage::Setup, pure_effects, obeys_tail)]
}

fn obeys_tail(ctx: &mut CaseContext) -> CaseResult {
    let instance = ctx.instance()?;
    instance.activate()?;
    let tail = instance.query().tail_samples();
    let latency = instance.query().latency_samples() as usize;
    if tail == INFINITE_TAIL {
        return ctx.skip("class reports an infinite tail");
    }
    if f64::from(tail) > MAX_TAIL_SECONDS * SETUP_RATE {
        return ctx.skip(format!("tail of {tail} samples is too long to wait out"));
    }
    let mut buffers = TestBuffers::for_component(instance.query(), SETUP_BLOCK);
    if buffers.main_layout().0 == 0 || buffers.output_channels() == 0 {
        return ctx.skip("class needs audio inputs and outputs");
    }
    instance.start_processing()?;

    let stimulus = Stimulus::Sine { frequency: 997.0 };
    let mut stimulus_peak = 0.0_f64;
    let mut position = 0_u64;
    for _ in 0..STIMULUS_BLOCKS {
        buffers.fill_stimulus(stimulus, position, SETUP_BLOCK, SETUP_RATE);
        stimulus_peak = stimulus_peak.max(peak(&buffers.input(0, 0)[..SETUP_BLOCK]));
        buffers.run(instance, SETUP_BLOCK, ProcessMode::Realtime, Vec::new())?;
        position += SETUP_BLOCK as u64;
    }

    let wait = (tail as usize).max(SETUP_BLOCK) + latency;
    let mut waited = 0;
    while waited < wait {
        buffers.fill_stimulus(Stimulus::Zero, 0, SETUP_BLOCK, SETUP_RATE);
        buffers.run(instance, SETUP_BLOCK, ProcessMode::Realtime, Vec::new())?;
        waited += SETUP_BLOCK;
    }

    buffers.fill_stimulus(Stimulus::Zero, 0, SETUP_BLOCK, SETUP_RATE);
    buffers.run(instance, SETUP_BLOCK, ProcessMode::Realtime, Vec::new())?;
    let residual = buffers.output_peak(SETUP_BLOCK);
    let level = to_db(residual, stimulus_peak);
    if level >= RESIDUAL_DB {
        return Err(Failure::numeric(format!(
            "output is still at {level:.1} dB after {wait} silent samples \
             (tail {tail}, latency {latency})"
        )));
    }
    Ok(())
}
