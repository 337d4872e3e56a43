mod support;

use std::time::Duration;

use pretty_assertions::assert_eq;
use vst3_validate::{
    CancelFlag, Driver, Event, ExitStatus, FailureKind, MemorySink, Outcome, RunOptions, RunOutcome,
    Suite, ValidatorConfig,
};

use support::{class_id, gain_class, Faults, MockLoader};

const PLUGIN: &str = "/plugins/MockGain.vst3";

fn config() -> ValidatorConfig {
    ValidatorConfig::default().with_seed(0xC0FFEE).with_stress_writes(200)
}

fn well_behaved() -> MockLoader {
    MockLoader::new().with_module(PLUGIN, vec![gain_class(1, "Mock Gain", Faults::default())])
}

fn run(driver: &Driver<MockLoader>, options: &RunOptions) -> (RunOutcome, Vec<Event>) {
    let mut sink = MemorySink::new();
    let outcome = driver.run(options, &mut sink, &CancelFlag::new());
    (outcome, sink.into_events())
}

fn case_outcome<'a>(events: &'a [Event], case: &str) -> Vec<&'a Outcome> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::CaseEnded { name, outcome, .. } if name == case => Some(outcome),
            _ => None,
        })
        .collect()
}

fn ended_cases(events: &[Event]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::CaseEnded { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect()
}

#[test]
fn missing_module_is_a_loader_error() {
    let driver = Driver::new(MockLoader::new(), config());
    let (outcome, events) = run(&driver, &RunOptions::new("/plugins/missing.vst3"));

    assert_eq!(outcome.status, ExitStatus::LoaderError);
    assert_eq!(outcome.status.code(), 3);
    match events.last() {
        Some(Event::RunEnded { summary, exit_code, .. }) => {
            assert_eq!(summary, "loader-error: file-not-found");
            assert_eq!(*exit_code, 3);
        }
        other => panic!("unexpected last event {other:?}"),
    }
    assert_eq!(driver.loader().counters.entries(), 0);
}

#[test]
fn listing_emits_classes_and_no_cases() {
    let driver = Driver::new(well_behaved(), config());
    let options = RunOptions {
        list: true,
        ..RunOptions::new(PLUGIN)
    };
    let (outcome, events) = run(&driver, &options);

    assert_eq!(outcome.status, ExitStatus::Success);
    let listed: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            Event::ClassListed { class } => Some(class),
            _ => None,
        })
        .collect();
    assert_eq!(listed.len(), 1);
    assert!(!listed[0].name.is_empty() && !listed[0].vendor.is_empty());
    assert!(!events.iter().any(|event| matches!(event, Event::CaseStarted { .. })));
    assert_eq!(driver.loader().counters.exits(), 1);
}

#[test]
fn well_behaved_plugin_passes_every_case() {
    let driver = Driver::new(well_behaved(), config());
    let (outcome, events) = run(&driver, &RunOptions::new(PLUGIN));

    let failures: Vec<_> = events
        .iter()
        .filter(|event| matches!(event, Event::CaseEnded { outcome, .. } if outcome.is_failure()))
        .collect();
    assert!(failures.is_empty(), "{failures:#?}");
    assert_eq!(outcome.status, ExitStatus::Success);
    assert_eq!(outcome.summary, "passed");
    assert_eq!(case_outcome(&events, "processing.48000.512"), vec![&Outcome::Passed]);
    assert_eq!(case_outcome(&events, "state.round-trip"), vec![&Outcome::Passed]);
    assert_eq!(case_outcome(&events, "bypass.passthrough"), vec![&Outcome::Passed]);
    assert_eq!(
        outcome.report.classes[0].cases.len(),
        driver.registry().cases().len()
    );
}

#[test]
fn nan_output_fails_the_numeric_case_and_the_run_continues() {
    let faults = Faults {
        nan_at_96k: true,
        ..Faults::default()
    };
    let loader = MockLoader::new().with_module(PLUGIN, vec![gain_class(1, "Mock NaN", faults)]);
    let driver = Driver::new(loader, config());
    let options = RunOptions {
        suites: vec![Suite::Processing],
        ..RunOptions::new(PLUGIN)
    };
    let (outcome, events) = run(&driver, &options);

    assert_eq!(outcome.status, ExitStatus::TestFailures);
    assert_eq!(outcome.status.code(), 5);
    match case_outcome(&events, "processing.96000.512").as_slice() {
        [Outcome::Failed { kind, message }] => {
            assert_eq!(*kind, FailureKind::Numeric);
            assert!(message.contains("NaN"), "{message}");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(case_outcome(&events, "processing.48000.512"), vec![&Outcome::Passed]);
    assert!(ended_cases(&events).contains(&"processing.parameter-changes"));
}

#[test]
fn hanging_process_times_out_and_later_classes_still_run() {
    let hang = Faults {
        hang_in_process: true,
        ..Faults::default()
    };
    let loader = MockLoader::new().with_module(
        PLUGIN,
        vec![gain_class(1, "Mock Hang", hang), gain_class(2, "Mock Gain", Faults::default())],
    );
    let driver = Driver::new(loader, config().with_case_timeout(Duration::from_millis(300)));
    let options = RunOptions {
        suites: vec![Suite::StateMachine],
        ..RunOptions::new(PLUGIN)
    };
    let (outcome, events) = run(&driver, &options);

    assert_eq!(outcome.status, ExitStatus::TestFailures);
    let hung = &outcome.report.classes[0];
    match hung.outcome("state-machine.valid-transitions") {
        Some(Outcome::Failed { kind, .. }) => assert_eq!(*kind, FailureKind::Timeout),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(
        case_outcome(&events, "state-machine.valid-transitions")[0].label(),
        "failed:timeout"
    );
    assert!(outcome.report.classes[1].passed());
    assert_eq!(outcome.report.classes.len(), 2);
    assert_eq!(driver.loader().counters.exits(), 1);

    let abandoned: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            Event::Warning { message } => Some(message.as_str()),
            _ => None,
        })
        .collect();
    assert!(abandoned
        .iter()
        .any(|message| message.contains("state-machine.valid-transitions")));
    assert!(abandoned
        .iter()
        .all(|message| message.contains("Mock Hang") && message.contains("detached worker")));
}

#[test]
fn stop_on_failure_ends_after_the_offending_case() {
    let faults = Faults {
        active_before_init: true,
        ..Faults::default()
    };
    let loader = MockLoader::new().with_module(PLUGIN, vec![gain_class(1, "Mock Eager", faults)]);
    let driver = Driver::new(loader, config());
    let options = RunOptions {
        suites: vec![Suite::StateMachine],
        stop_on_failure: true,
        ..RunOptions::new(PLUGIN)
    };
    let (outcome, events) = run(&driver, &options);

    assert_eq!(outcome.status.code(), 5);
    assert_eq!(
        ended_cases(&events),
        vec![
            "state-machine.initialize-terminate",
            "state-machine.valid-transitions",
            "state-machine.invalid-transitions",
        ]
    );
    match case_outcome(&events, "state-machine.invalid-transitions").as_slice() {
        [Outcome::Failed { kind, .. }] => assert_eq!(*kind, FailureKind::Lifecycle),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn class_filter_without_match_exits_four() {
    let driver = Driver::new(well_behaved(), config());
    let options = RunOptions {
        class_filter: Some(class_id(9)),
        ..RunOptions::new(PLUGIN)
    };
    let (outcome, _) = run(&driver, &options);

    assert_eq!(outcome.status, ExitStatus::NoMatchingClasses);
    assert_eq!(outcome.summary, "no-matching-classes");
    assert_eq!(driver.loader().counters.exits(), 1);
}

#[test]
fn cancellation_before_the_first_case_interrupts_the_run() {
    let driver = Driver::new(well_behaved(), config());
    let cancel = CancelFlag::new();
    cancel.cancel();
    let mut sink = MemorySink::new();
    let outcome = driver.run(&RunOptions::new(PLUGIN), &mut sink, &cancel);

    assert_eq!(outcome.status.code(), 6);
    assert_eq!(outcome.summary, "interrupted");
    assert!(outcome.report.interrupted);
    assert!(ended_cases(sink.events()).is_empty());
}

#[test]
fn quiet_runs_carry_no_info_events() {
    let driver = Driver::new(well_behaved(), config());
    let options = RunOptions {
        suites: vec![Suite::Identity, Suite::StateMachine],
        quiet: true,
        ..RunOptions::new(PLUGIN)
    };
    let (outcome, events) = run(&driver, &options);

    assert_eq!(outcome.status, ExitStatus::Success);
    assert!(!events.iter().any(|event| matches!(event, Event::Info { .. })));
}

fn run_suite(name: &str, faults: Faults, suite: Suite) -> (RunOutcome, Vec<Event>) {
    let loader = MockLoader::new().with_module(PLUGIN, vec![gain_class(1, name, faults)]);
    let driver = Driver::new(loader, config());
    let options = RunOptions {
        suites: vec![suite],
        ..RunOptions::new(PLUGIN)
    };
    run(&driver, &options)
}

fn failure<'a>(events: &'a [Event], case: &str) -> (FailureKind, &'a str) {
    match case_outcome(events, case).as_slice() {
        [Outcome::Failed { kind, message }] => (*kind, message.as_str()),
        other => panic!("{case}: unexpected outcome {other:?}"),
    }
}

#[cfg(unix)]
#[test]
fn crash_in_process_fails_only_that_case() {
    let segv = Faults {
        segv_in_process: true,
        ..Faults::default()
    };
    let loader = MockLoader::new().with_module(
        PLUGIN,
        vec![
            gain_class(1, "Mock Segv", segv),
            gain_class(2, "Mock Gain", Faults::default()),
        ],
    );
    let driver = Driver::new(loader, config());
    let options = RunOptions {
        suites: vec![Suite::StateMachine],
        ..RunOptions::new(PLUGIN)
    };
    let (outcome, events) = run(&driver, &options);

    let (kind, message) = failure(&events, "state-machine.valid-transitions");
    assert_eq!(kind, FailureKind::Crash);
    assert!(message.contains("SIGSEGV"), "{message}");
    // An unbalanced ledger would end the run as an internal error instead.
    assert_eq!(outcome.status, ExitStatus::TestFailures);
    assert_eq!(outcome.summary, "test-failures: 1 failed");
    assert_eq!(outcome.report.classes.len(), 2);
    assert!(outcome.report.classes[1].passed());
    assert_eq!(driver.loader().counters.exits(), 1);
}

#[test]
fn lossy_state_fails_the_round_trip() {
    let faults = Faults {
        lossy_state: true,
        ..Faults::default()
    };
    let (outcome, events) = run_suite("Mock Lossy", faults, Suite::State);

    assert_eq!(outcome.status, ExitStatus::TestFailures);
    let (kind, message) = failure(&events, "state.round-trip");
    assert_eq!(kind, FailureKind::Contract);
    assert!(message.contains("not byte-exact"), "{message}");
}

#[test]
fn state_lost_after_a_rejected_stream_is_noted() {
    let faults = Faults {
        state_lost_after_rejection: true,
        ..Faults::default()
    };
    let (outcome, events) = run_suite("Mock Forgetful", faults, Suite::State);

    assert_eq!(outcome.status, ExitStatus::Success);
    assert_eq!(case_outcome(&events, "state.invalid-stream"), vec![&Outcome::Passed]);
    assert!(events.iter().any(|event| matches!(
        event,
        Event::Info { message } if message.starts_with("getState after invalid streams returned")
    )));
}

#[test]
fn endless_tail_fails_the_tail_case() {
    let faults = Faults {
        endless_tail: true,
        ..Faults::default()
    };
    let (outcome, events) = run_suite("Mock Ringing", faults, Suite::Tail);

    assert_eq!(outcome.status, ExitStatus::TestFailures);
    let (kind, message) = failure(&events, "tail.obeys-tail");
    assert_eq!(kind, FailureKind::Numeric);
    assert!(message.contains("still at"), "{message}");
}

#[test]
fn leaky_bypass_fails_the_passthrough_case() {
    let faults = Faults {
        leaky_bypass: true,
        ..Faults::default()
    };
    let (outcome, events) = run_suite("Mock Leaky", faults, Suite::Bypass);

    assert_eq!(outcome.status, ExitStatus::TestFailures);
    let (kind, message) = failure(&events, "bypass.passthrough");
    assert_eq!(kind, FailureKind::Numeric);
    assert!(message.contains("deviates from the input"), "{message}");
}

#[test]
fn unwritten_output_frames_fail_processing() {
    let faults = Faults {
        skip_last_frame: true,
        ..Faults::default()
    };
    let (outcome, events) = run_suite("Mock Short", faults, Suite::Processing);

    assert_eq!(outcome.status, ExitStatus::TestFailures);
    let (kind, message) = failure(&events, "processing.48000.512");
    assert_eq!(kind, FailureKind::Contract);
    assert!(message.contains("frame 511 not written"), "{message}");
}
