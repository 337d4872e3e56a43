use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;
use vst3_host::ProcessMode;

use super::parameters::parameter_infos;
use super::processing::activate_default;
use crate::buffers::Stimulus;
use crate::context::{CaseContext, CaseResult, SETUP_BLOCK, SETUP_RATE};
use crate::error::{Failure, FailureKind};
use crate::registry::{all_classes, Stage, Suite, TestCase};

/// Blocks processed even when the writer finishes first.
const MIN_BLOCKS: usize = 4;

pub fn cases() -> Vec<TestCase> {
    vec![TestCase::new(
        "threading.controller-processor-split",
        Suite::Threading,
        Stage::Setup,
        all_classes,
        controller_processor_split,
    )]
}

/// Hammers the controller from a helper thread while the case thread
/// keeps processing.
fn controller_processor_split(ctx: &mut CaseContext) -> CaseResult {
    let Some(controller) = ctx.controller()? else {
        return ctx.skip("class has no edit controller");
    };
    let writable: Vec<_> = parameter_infos(controller.as_ref())?
        .into_iter()
        .filter(|info| !info.is_read_only())
        .map(|info| info.id)
        .collect();
    if writable.is_empty() {
        return ctx.skip("class has no writable parameters");
    }
    let writes = ctx.config().stress_writes;
    let writer_seed: u64 = ctx.rng().gen();

    let done = Arc::new(AtomicBool::new(false));
    let writer = {
        let controller = Arc::clone(&controller);
        let writable = writable.clone();
        let done = Arc::clone(&done);
        thread::Builder::new()
            .name("controller writer".into())
            .spawn(move || {
                let mut rng = StdRng::seed_from_u64(writer_seed);
                let mut refused = 0usize;
                for _ in 0..writes {
                    let id = writable[rng.gen_range(0..writable.len())];
                    if !controller.set_param_normalized(id, rng.gen_range(0.0..=1.0)).is_ok() {
                        refused += 1;
                    }
                }
                done.store(true, Ordering::Release);
                refused
            })
            .map_err(|err| {
                Failure::new(FailureKind::Crash, format!("cannot spawn writer thread: {err}"))
            })?
    };

    let stimulus = Stimulus::Sine { frequency: 997.0 };
    let mut blocks = 0usize;
    let mut slowest = None;
    let processed = (|| {
        let instance = ctx.instance()?;
        let mut buffers = activate_default(instance)?;
        while blocks < MIN_BLOCKS || !done.load(Ordering::Acquire) {
            buffers.fill_stimulus(stimulus, (blocks * SETUP_BLOCK) as u64, SETUP_BLOCK, SETUP_RATE);
            let run = buffers
                .run(instance, SETUP_BLOCK, ProcessMode::Realtime, Vec::new())
                .map_err(|failure| {
                    failure.context(format!("block {blocks} during controller writes"))
                })?;
            slowest = slowest.max(Some(run.elapsed));
            blocks += 1;
        }
        Ok::<(), Failure>(())
    })();

    // The writer holds a controller reference until joined.
    let refused = writer
        .join()
        .map_err(|_| Failure::new(FailureKind::Crash, "controller writer thread panicked"))?;
    processed?;

    for id in &writable {
        let value = controller.param_normalized(*id);
        if !(0.0..=1.0).contains(&value) {
            return Err(Failure::contract(format!(
                "parameter {id} reads {value} after concurrent writes"
            )));
        }
    }
    if let Some(elapsed) = slowest {
        ctx.record_process_time(elapsed);
    }
    if refused > 0 {
        ctx.note(format!("{refused} of {writes} controller writes were refused"));
    }
    debug!(writes, blocks, "controller writes finished");
    Ok(())
}
