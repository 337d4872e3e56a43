use vst3_host::{ParamPoint, ParamQueue, ProcessMode};

use super::audio_effects;
use super::parameters::parameter_infos;
use super::processing::activate_default;
use crate::buffers::{to_db, Stimulus};
use crate::context::{CaseContext, CaseResult, SETUP_BLOCK, SETUP_RATE};
use crate::error::Failure;
use crate::registry::{Stage, Suite, TestCase};

/// Allowed deviation from the delayed input, relative to the input peak.
const PASSTHROUGH_DB: f64 = -120.0;
const BYPASS_BLOCKS: usize = 8;

pub fn cases() -> Vec<TestCase> {
    vec![TestCase::new(
        "bypass.passthrough",
        Suite::Bypass,
        Stage::Setup,
        audio_effects,
        passthrough,
    )]
}

/// With bypass engaged the main output must be the main input delayed by the
/// reported latency. The first block may ramp.
fn passthrough(ctx: &mut CaseContext) -> CaseResult {
    let Some(controller) = ctx.controller()? else {
        ctx.warn("no bypass parameter");
        return Ok(());
    };
    let Some(bypass) = parameter_infos(controller.as_ref())?
        .into_iter()
        .find(|info| info.is_bypass())
    else {
        ctx.warn("no bypass parameter");
        return Ok(());
    };

    let stimulus = Stimulus::Sine { frequency: 997.0 };
    let mut worst = 0.0_f64;
    let mut worst_at = None;
    let mut reference = 0.0_f64;
    let mut slowest = None;
    {
        let instance = ctx.instance()?;
        let mut buffers = activate_default(instance)?;
        let (inputs, outputs) = buffers.main_layout();
        if inputs == 0 || inputs != outputs {
            return ctx.skip(format!("main buses have {inputs} inputs and {outputs} outputs"));
        }
        let latency = u64::from(instance.query().latency_samples());
        let code = controller.set_param_normalized(bypass.id, 1.0);
        if !code.is_ok() {
            return Err(Failure::contract(format!(
                "setParamNormalized on bypass parameter {} returned {code}",
                bypass.id
            )));
        }

        for block in 0..BYPASS_BLOCKS {
            let start = (block * SETUP_BLOCK) as u64;
            buffers.fill_stimulus(stimulus, start, SETUP_BLOCK, SETUP_RATE);
            let changes = vec![ParamQueue {
                id: bypass.id,
                points: vec![ParamPoint { offset: 0, value: 1.0 }],
            }];
            let run = buffers
                .run(instance, SETUP_BLOCK, ProcessMode::Realtime, changes)
                .map_err(|failure| failure.context(format!("bypassed block {block}")))?;
            slowest = slowest.max(Some(run.elapsed));
            if block == 0 {
                continue;
            }
            for channel in 0..outputs {
                let output = &buffers.output(0, channel)[..SETUP_BLOCK];
                for (frame, sample) in output.iter().enumerate() {
                    let position = start + frame as u64;
                    let expected = position
                        .checked_sub(latency)
                        .map_or(0.0, |source| stimulus.sample(source, SETUP_RATE));
                    reference = reference.max(f64::from(expected.abs()));
                    let deviation = f64::from((sample - expected).abs());
                    if deviation > worst {
                        worst = deviation;
                        worst_at = Some((channel, position));
                    }
                }
            }
        }
    }
    if let Some(elapsed) = slowest {
        ctx.record_process_time(elapsed);
    }

    let level = to_db(worst, reference);
    match worst_at {
        Some((channel, position)) if level >= PASSTHROUGH_DB => Err(Failure::numeric(format!(
            "bypassed output deviates from the input by {level:.1} dB \
             (channel {channel}, sample {position})"
        ))),
        _ => Ok(()),
    }
}
