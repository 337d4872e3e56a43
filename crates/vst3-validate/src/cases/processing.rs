use rand::seq::SliceRandom;
use rand::Rng;
use vst3_host::{ComponentInstance, ParamPoint, ParamQueue, ProcessMode, ProcessSetup, SampleSize};

use super::must_succeed;
use super::parameters::parameter_infos;
use crate::buffers::{Stimulus, TestBuffers};
use crate::context::{CaseContext, CaseResult, SETUP_BLOCK, SETUP_RATE};
use crate::error::Failure;
use crate::registry::{all_classes, Stage, Suite, TestCase};

pub const SAMPLE_RATES: [u32; 5] = [44_100, 48_000, 88_200, 96_000, 192_000];
pub const BLOCK_SIZES: [usize; 4] = [1, 64, 512, 4096];
const MODES: [ProcessMode; 2] = [ProcessMode::Realtime, ProcessMode::Offline];
/// Blocks processed per stimulus.
const BLOCKS_PER_STIMULUS: usize = 8;
const VARIABLE_BLOCKS: usize = 32;
const AUTOMATION_BLOCKS: usize = 16;

pub fn cases() -> Vec<TestCase> {
    let mut cases = vec![TestCase::new(
        "processing.sample-size",
        Suite::Processing,
        Stage::Setup,
        all_classes,
        sample_size,
    )];
    for rate in SAMPLE_RATES {
        for block in BLOCK_SIZES {
            cases.push(TestCase::new(
                format!("processing.{rate}.{block}"),
                Suite::Processing,
                Stage::Setup,
                all_classes,
                move |ctx: &mut CaseContext| rate_and_block(ctx, f64::from(rate), block),
            ));
        }
    }
    cases.push(TestCase::new(
        "processing.variable-block-size",
        Suite::Processing,
        Stage::Setup,
        all_classes,
        variable_block_size,
    ));
    cases.push(TestCase::new(
        "processing.silence-flags",
        Suite::Processing,
        Stage::Setup,
        all_classes,
        silence_flags,
    ));
    cases.push(TestCase::new(
        "processing.parameter-changes",
        Suite::Processing,
        Stage::Setup,
        all_classes,
        parameter_changes,
    ));
    cases
}

/// Processes `blocks` blocks of `stimulus` from stream position zero between
/// `setProcessing(true)` and `setProcessing(false)`. The instance must be active.
pub(crate) fn run_stimulus(
    ctx: &mut CaseContext,
    buffers: &mut TestBuffers,
    stimulus: Stimulus,
    sample_rate: f64,
    block: usize,
    blocks: usize,
    mode: ProcessMode,
) -> CaseResult {
    let mut slowest = None;
    {
        let instance = ctx.instance()?;
        instance.start_processing()?;
        for index in 0..blocks {
            buffers.fill_stimulus(stimulus, (index * block) as u64, block, sample_rate);
            let run = buffers.run(instance, block, mode, Vec::new()).map_err(|failure| {
                failure.context(format!(
                    "{} stimulus, {} mode, block {index}",
                    stimulus.name(),
                    mode.as_str()
                ))
            })?;
            slowest = slowest.max(Some(run.elapsed));
        }
        instance.stop_processing()?;
    }
    if let Some(elapsed) = slowest {
        ctx.record_process_time(elapsed);
    }
    Ok(())
}

fn sample_size(ctx: &mut CaseContext) -> CaseResult {
    let instance = ctx.instance()?;
    must_succeed(
        instance.query().can_process_sample_size(SampleSize::F32),
        "canProcessSampleSize(32-bit)",
    )?;
    let double = instance.query().can_process_sample_size(SampleSize::F64).is_ok();
    ctx.note(if double {
        "64-bit processing is supported"
    } else {
        "64-bit processing is not supported"
    });
    Ok(())
}

fn rate_and_block(ctx: &mut CaseContext, sample_rate: f64, block: usize) -> CaseResult {
    for mode in MODES {
        let mut buffers = {
            let instance = ctx.instance()?;
            instance.setup_processing(&ProcessSetup::new(sample_rate, block, mode))?;
            instance.activate()?;
            TestBuffers::for_component(instance.query(), block)
        };
        for stimulus in Stimulus::ALL {
            run_stimulus(
                ctx,
                &mut buffers,
                stimulus,
                sample_rate,
                block,
                BLOCKS_PER_STIMULUS,
                mode,
            )?;
        }
        ctx.instance()?.deactivate()?;
    }
    Ok(())
}

/// Activates the instance at the `Setup` stage configuration.
pub(crate) fn activate_default(instance: &mut ComponentInstance) -> Result<TestBuffers, Failure> {
    instance.activate()?;
    instance.start_processing()?;
    Ok(TestBuffers::for_component(instance.query(), SETUP_BLOCK))
}

fn variable_block_size(ctx: &mut CaseContext) -> CaseResult {
    let sizes: Vec<usize> = (0..VARIABLE_BLOCKS)
        .map(|_| ctx.rng().gen_range(1..=SETUP_BLOCK))
        .collect();
    let stimulus = Stimulus::Sine { frequency: 441.0 };
    let mut slowest = None;
    {
        let instance = ctx.instance()?;
        let mut buffers = activate_default(instance)?;
        let mut position = 0_u64;
        for size in &sizes {
            buffers.fill_stimulus(stimulus, position, *size, SETUP_RATE);
            let run = buffers
                .run(instance, *size, ProcessMode::Realtime, Vec::new())
                .map_err(|failure| failure.context(format!("block of {size} samples")))?;
            slowest = slowest.max(Some(run.elapsed));
            position += *size as u64;
        }
    }
    if let Some(elapsed) = slowest {
        ctx.record_process_time(elapsed);
    }
    Ok(())
}

fn silence_flags(ctx: &mut CaseContext) -> CaseResult {
    let mut advice = None;
    let mut silent_answers = 0;
    {
        let instance = ctx.instance()?;
        let mut buffers = activate_default(instance)?;
        let (_, outputs) = buffers.main_layout();
        for (index, stimulus) in [Stimulus::Sine { frequency: 997.0 }, Stimulus::Silence]
            .into_iter()
            .enumerate()
        {
            buffers.fill_stimulus(stimulus, (index * SETUP_BLOCK) as u64, SETUP_BLOCK, SETUP_RATE);
            let run = buffers.run(instance, SETUP_BLOCK, ProcessMode::Realtime, Vec::new())?;
            let flags = run.output_silence.first().copied().unwrap_or(0);
            for channel in 0..outputs.min(64) {
                if flags & (1 << channel) == 0 {
                    continue;
                }
                if stimulus == Stimulus::Silence {
                    silent_answers += 1;
                }
                let loud = buffers.output(0, channel)[..SETUP_BLOCK]
                    .iter()
                    .any(|sample| *sample != 0.0);
                if loud && advice.is_none() {
                    advice = Some(format!(
                        "output channel {channel} is flagged silent \
                         but carries signal ({} stimulus)",
                        stimulus.name()
                    ));
                }
            }
        }
    }
    if let Some(advice) = advice {
        ctx.warn(advice);
    }
    if silent_answers > 0 {
        ctx.note(format!("{silent_answers} output channels flagged silent for silent input"));
    }
    Ok(())
}

fn parameter_changes(ctx: &mut CaseContext) -> CaseResult {
    let Some(controller) = ctx.controller()? else {
        return ctx.skip("class has no edit controller");
    };
    let automatable: Vec<_> = parameter_infos(controller.as_ref())?
        .into_iter()
        .filter(|info| info.can_automate() && !info.is_read_only() && !info.is_bypass())
        .map(|info| info.id)
        .collect();
    if automatable.is_empty() {
        return ctx.skip("class has no automatable parameters");
    }

    let mut blocks = Vec::with_capacity(AUTOMATION_BLOCKS);
    for _ in 0..AUTOMATION_BLOCKS {
        let rng = ctx.rng();
        let touched = rng.gen_range(1..=automatable.len());
        let queues: Vec<ParamQueue> = automatable
            .choose_multiple(rng, touched)
            .map(|id| {
                let points = rng.gen_range(1..=3);
                let mut offsets: Vec<i32> = (0..points)
                    .map(|_| rng.gen_range(0..SETUP_BLOCK as i32))
                    .collect();
                offsets.sort_unstable();
                offsets.dedup();
                ParamQueue {
                    id: *id,
                    points: offsets
                        .into_iter()
                        .map(|offset| ParamPoint {
                            offset,
                            value: rng.gen_range(0.0..=1.0),
                        })
                        .collect(),
                }
            })
            .collect();
        blocks.push(queues);
    }

    let stimulus = Stimulus::Sine { frequency: 997.0 };
    let mut slowest = None;
    {
        let instance = ctx.instance()?;
        let mut buffers = activate_default(instance)?;
        for (index, queues) in blocks.into_iter().enumerate() {
            buffers.fill_stimulus(stimulus, (index * SETUP_BLOCK) as u64, SETUP_BLOCK, SETUP_RATE);
            let run = buffers
                .run(instance, SETUP_BLOCK, ProcessMode::Realtime, queues)
                .map_err(|failure| failure.context(format!("automated block {index}")))?;
            slowest = slowest.max(Some(run.elapsed));
            for queue in &run.output_changes {
                let stray = queue
                    .points
                    .iter()
                    .find(|point| !(0.0..=1.0).contains(&point.value));
                if let Some(point) = stray {
                    return Err(Failure::contract(format!(
                        "output parameter change for {} carries value {}",
                        queue.id, point.value
                    )));
                }
            }
        }
    }
    if let Some(elapsed) = slowest {
        ctx.record_process_time(elapsed);
    }
    Ok(())
}
