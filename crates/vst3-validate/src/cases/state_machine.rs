use vst3_host::{BusDirection, ComponentInstance, MediaType, ProcessMode, ProcessSetup, ResultCode};

use crate::buffers::{Stimulus, TestBuffers};
use crate::context::{CaseContext, CaseResult, SETUP_BLOCK, SETUP_RATE};
use crate::error::Failure;
use crate::registry::{all_classes, Stage, Suite, TestCase};

const CYCLES: usize = 3;
const CHECK_BLOCK: usize = 64;

pub fn cases() -> Vec<TestCase> {
    vec![
        TestCase::new(
            "state-machine.initialize-terminate",
            Suite::StateMachine,
            Stage::Created,
            all_classes,
            initialize_terminate,
        ),
        TestCase::new(
            "state-machine.valid-transitions",
            Suite::StateMachine,
            Stage::Created,
            all_classes,
            valid_transitions,
        ),
        TestCase::new(
            "state-machine.invalid-transitions",
            Suite::StateMachine,
            Stage::Created,
            all_classes,
            invalid_transitions,
        ),
        TestCase::new(
            "state-machine.repeated-transitions",
            Suite::StateMachine,
            Stage::Created,
            all_classes,
            repeated_transitions,
        ),
    ]
}

fn setup() -> ProcessSetup {
    ProcessSetup::new(SETUP_RATE, SETUP_BLOCK, ProcessMode::Realtime)
}

fn initialize_terminate(ctx: &mut CaseContext) -> CaseResult {
    let instance = ctx.instance()?;
    instance.initialize()?;
    instance.terminate()?;
    Ok(())
}

fn valid_transitions(ctx: &mut CaseContext) -> CaseResult {
    let instance = ctx.instance()?;
    instance.initialize()?;
    instance.keep_bus_arrangements()?;
    instance.setup_processing(&setup())?;
    let mut buffers = TestBuffers::for_component(instance.query(), CHECK_BLOCK);
    for cycle in 0..CYCLES {
        instance.activate()?;
        instance.start_processing()?;
        buffers.fill_stimulus(Stimulus::Zero, 0, CHECK_BLOCK, SETUP_RATE);
        buffers
            .run(instance, CHECK_BLOCK, ProcessMode::Realtime, Vec::new())
            .map_err(|failure| failure.context(format!("activation cycle {}", cycle + 1)))?;
        instance.stop_processing()?;
        instance.deactivate()?;
    }
    instance.terminate()?;
    Ok(())
}

/// A call the plug-in must refuse. `kNotImplemented` counts as a refusal.
fn refused(code: ResultCode) -> bool {
    !code.is_ok()
}

fn invalid_transitions(ctx: &mut CaseContext) -> CaseResult {
    let instance = ctx.instance()?;

    let code = instance.raw().set_active(true);
    if !refused(code) {
        instance.raw().set_active(false);
        return Err(Failure::lifecycle("setActive(true) before initialize was accepted"));
    }
    let code = instance.raw().set_processing(true);
    if !refused(code) {
        instance.raw().set_processing(false);
        return Err(Failure::lifecycle("setProcessing(true) before initialize was accepted"));
    }
    let mut buffers = TestBuffers::new(&[2], &[2], CHECK_BLOCK);
    buffers.fill_stimulus(Stimulus::Zero, 0, CHECK_BLOCK, SETUP_RATE);
    let mut data = buffers.process_data(CHECK_BLOCK, ProcessMode::Realtime);
    let code = instance.raw().process(&mut data);
    drop(data);
    if !refused(code) {
        return Err(Failure::lifecycle("process before initialize was accepted"));
    }

    instance.initialize()?;
    instance.keep_bus_arrangements()?;
    instance.setup_processing(&setup())?;
    let code = instance.raw().set_processing(true);
    if !refused(code) {
        instance.raw().set_processing(false);
        ctx.warn("setProcessing(true) before setActive(true) was accepted");
    }
    Ok(())
}

/// Repeats every transition once more behind the machine's back; the
/// component must keep answering afterwards.
fn repeated_transitions(ctx: &mut CaseContext) -> CaseResult {
    let mut answers = Vec::new();
    {
        let instance = ctx.instance()?;
        instance.initialize()?;
        let host = instance.host().clone();
        answers.push(("initialize", instance.raw().initialize(&host)));
        instance.keep_bus_arrangements()?;
        instance.setup_processing(&setup())?;
        instance.activate()?;
        answers.push(("setActive(true)", instance.raw().set_active(true)));
        instance.deactivate()?;
        answers.push(("setActive(false)", instance.raw().set_active(false)));
        instance.terminate()?;
        answers.push(("terminate", instance.raw().terminate()));
        responsive(instance)?;
    }
    for (call, code) in answers {
        if code.is_ok() {
            ctx.note(format!("repeated {call} returned kResultOk"));
        }
    }
    Ok(())
}

fn responsive(instance: &ComponentInstance) -> CaseResult {
    let count = instance.query().bus_count(MediaType::Audio, BusDirection::Output);
    if count < 0 {
        return Err(Failure::contract(format!(
            "component reports {count} output buses after repeated transitions"
        )));
    }
    Ok(())
}
