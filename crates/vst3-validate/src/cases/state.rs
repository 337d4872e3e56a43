use rand::Rng;
use vst3_host::{ComponentInstance, ProcessMode, ProcessSetup, ResultCode};

use super::must_succeed;
use crate::buffers::{peak, to_db, TestBuffers};
use crate::context::{CaseContext, CaseResult, SETUP_BLOCK, SETUP_RATE};
use crate::error::{ensure, Failure};
use crate::registry::{all_classes, Stage, Suite, TestCase};

/// Allowed difference between an instance and its restored copy, relative to the output peak.
const EQUIVALENCE_DB: f64 = -100.0;
const RENDER_BLOCKS: usize = 8;
const GARBAGE_BYTES: usize = 64;

pub fn cases() -> Vec<TestCase> {
    vec![
        TestCase::new(
            "state.round-trip",
            Suite::State,
            Stage::Initialized,
            all_classes,
            round_trip,
        ),
        TestCase::new(
            "state.controller-round-trip",
            Suite::State,
            Stage::Initialized,
            all_classes,
            controller_round_trip,
        ),
        TestCase::new(
            "state.invalid-stream",
            Suite::State,
            Stage::Initialized,
            all_classes,
            invalid_stream,
        ),
    ]
}

fn first_difference(left: &[u8], right: &[u8]) -> usize {
    left.iter()
        .zip(right)
        .position(|(a, b)| a != b)
        .unwrap_or_else(|| left.len().min(right.len()))
}

/// Brings an initialized instance to processing and renders `signal` on
/// every input channel. Returns one buffer per output channel.
fn render(instance: &mut ComponentInstance, signal: &[f32]) -> Result<Vec<Vec<f32>>, Failure> {
    instance.keep_bus_arrangements()?;
    instance.setup_processing(&ProcessSetup::new(SETUP_RATE, SETUP_BLOCK, ProcessMode::Realtime))?;
    instance.activate()?;
    instance.start_processing()?;
    let mut buffers = TestBuffers::for_component(instance.query(), SETUP_BLOCK);
    let mut rendered = vec![Vec::with_capacity(signal.len()); buffers.output_channels()];
    for block in signal.chunks(SETUP_BLOCK) {
        buffers.fill_inputs(block.len(), |_, frame| block[frame]);
        buffers.run(instance, block.len(), ProcessMode::Realtime, Vec::new())?;
        for (channel, output) in rendered.iter_mut().zip(buffers.outputs()) {
            channel.extend_from_slice(&output[..block.len()]);
        }
    }
    Ok(rendered)
}

fn round_trip(ctx: &mut CaseContext) -> CaseResult {
    let saved = ctx
        .instance()?
        .get_state()
        .map_err(|code| Failure::contract(format!("getState returned {code}")))?;
    let mut copy = ctx.create_staged(Stage::Initialized)?;
    must_succeed(copy.set_state(&saved), "setState on a fresh instance")?;
    if let Some(controller) = copy.controller() {
        let code = controller.set_component_state(&saved);
        if !code.is_ok() {
            ctx.warn(format!("controller setComponentState returned {code}"));
        }
    }
    let reloaded = copy
        .get_state()
        .map_err(|code| Failure::contract(format!("getState after setState returned {code}")))?;
    ensure(saved == reloaded, || {
        format!(
            "state is not byte-exact: saved {} bytes, re-saved {} bytes, \
             first difference at byte {}",
            saved.len(),
            reloaded.len(),
            first_difference(&saved, &reloaded)
        )
    })?;

    let signal: Vec<f32> = (0..RENDER_BLOCKS * SETUP_BLOCK)
        .map(|_| ctx.rng().gen_range(-0.5..0.5))
        .collect();
    let original = render(ctx.instance()?, &signal)
        .map_err(|failure| failure.context("original instance"))?;
    let restored =
        render(&mut copy, &signal).map_err(|failure| failure.context("restored instance"))?;
    copy.release();

    let reference = original
        .iter()
        .chain(&restored)
        .map(|channel| peak(channel))
        .fold(0.0, f64::max);
    let mut difference = 0.0_f64;
    for (left, right) in original.iter().zip(&restored) {
        for (a, b) in left.iter().zip(right) {
            difference = difference.max(f64::from((a - b).abs()));
        }
    }
    let level = to_db(difference, reference);
    if level >= EQUIVALENCE_DB {
        return Err(Failure::numeric(format!(
            "restored instance differs from the original by {level:.1} dB"
        )));
    }
    Ok(())
}

fn controller_round_trip(ctx: &mut CaseContext) -> CaseResult {
    let Some(controller) = ctx.controller()? else {
        return ctx.skip("class has no edit controller");
    };
    let saved = match controller.get_state() {
        Ok(saved) => saved,
        Err(ResultCode::NOT_IMPLEMENTED) => {
            ctx.note("controller keeps no state of its own");
            return Ok(());
        }
        Err(code) => {
            ctx.warn(format!("controller getState returned {code}"));
            return Ok(());
        }
    };
    let code = controller.set_state(&saved);
    if !code.is_ok() {
        ctx.warn(format!("controller setState of its own state returned {code}"));
        return Ok(());
    }
    match controller.get_state() {
        Ok(again) if again == saved => {}
        Ok(again) => ctx.warn(format!(
            "controller state changed after a reload: first difference at byte {}",
            first_difference(&saved, &again)
        )),
        Err(code) => ctx.warn(format!("controller getState after setState returned {code}")),
    }
    Ok(())
}

fn invalid_stream(ctx: &mut CaseContext) -> CaseResult {
    let garbage: Vec<u8> = (0..GARBAGE_BYTES).map(|_| ctx.rng().gen()).collect();
    let mut notes = Vec::new();
    {
        let instance = ctx.instance()?;
        for (label, stream) in [("empty", &[][..]), ("garbage", &garbage[..])] {
            if instance.set_state(stream).is_ok() {
                notes.push(format!("component accepted the {label} stream"));
            }
            if let Some(controller) = instance.controller() {
                controller.set_component_state(stream);
                if controller.set_state(stream).is_ok() {
                    notes.push(format!("controller accepted the {label} stream"));
                }
            }
        }
        // Only survival is required after rejected streams.
        if let Err(code) = instance.get_state() {
            notes.push(format!("getState after invalid streams returned {code}"));
        }
        let signal: Vec<f32> = (0..2 * SETUP_BLOCK)
            .map(|frame| if frame == 0 { 1.0 } else { 0.0 })
            .collect();
        render(instance, &signal)
            .map_err(|failure| failure.context("after invalid state streams"))?;
    }
    for note in notes {
        ctx.note(note);
    }
    Ok(())
}
