use assert_cmd::Command;
use pretty_assertions::assert_eq;
use serde_json::Value;

#[test]
fn missing_module_exits_three_with_a_json_summary() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.vst3");
    let output = Command::cargo_bin("validator")
        .unwrap()
        .arg("-j")
        .arg(&missing)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(3));
    let stdout = String::from_utf8(output.stdout).unwrap();
    let events: Vec<Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events.first().unwrap()["event"], "runStarted");
    let last = events.last().unwrap();
    assert_eq!(last["event"], "runEnded");
    assert_eq!(last["summary"], "loader-error: file-not-found");
    assert_eq!(last["exit_code"], 3);
}

#[test]
fn missing_path_argument_is_a_usage_error() {
    Command::cargo_bin("validator").unwrap().assert().code(2);
}

#[test]
fn unknown_suite_is_a_usage_error() {
    Command::cargo_bin("validator")
        .unwrap()
        .args(["-s", "speed", "Gain.vst3"])
        .assert()
        .code(2);
}

#[test]
fn malformed_seed_is_a_usage_error() {
    Command::cargo_bin("validator")
        .unwrap()
        .env("VST3_VALIDATOR_SEED", "not-a-number")
        .arg("Gain.vst3")
        .assert()
        .code(2);
}

#[test]
fn human_output_names_the_loader_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::cargo_bin("validator")
        .unwrap()
        .arg(dir.path().join("missing.vst3"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(3));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("result: loader-error: file-not-found (exit 3)"), "{stdout}");
}
