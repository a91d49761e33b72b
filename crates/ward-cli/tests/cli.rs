use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

fn ward(dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("ward"));
    cmd.current_dir(dir.path())
        .env_remove("WARD_CONFIG")
        .env_remove("RUST_LOG")
        .arg("--store")
        .arg(dir.path().join("kb.json"));
    cmd
}

fn json_stdout(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn help_mentions_every_command() {
    let temp = TempDir::new().unwrap();
    ward(&temp).arg("--help").assert().success().stdout(
        predicate::str::contains("stats")
            .and(predicate::str::contains("diagnose"))
            .and(predicate::str::contains("case"))
            .and(predicate::str::contains("list"))
            .and(predicate::str::contains("learn"))
            .and(predicate::str::contains("export"))
            .and(predicate::str::contains("history"))
            .and(predicate::str::contains("pressure")),
    );
}

#[test]
fn diagnose_test_matches_and_is_remembered() {
    let temp = TempDir::new().unwrap();

    let diagnosis = json_stdout(ward(&temp).args(["diagnose", "--test", "--json"]));
    assert_eq!(diagnosis["matched_case_id"], "OOM_001");
    assert_eq!(diagnosis["shape"], "rapid_increase");
    temp.child("kb.json").assert(predicate::path::is_file());

    let history = json_stdout(ward(&temp).args(["history", "--json"]));
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["diagnosis_id"], diagnosis["diagnosis_id"]);

    let stats = json_stdout(ward(&temp).args(["stats", "--json"]));
    assert_eq!(stats["diagnosis_count"], 1);
    assert_eq!(stats["top_matched"][0]["case_id"], "OOM_001");
}

#[test]
fn diagnose_requires_exactly_one_input() {
    let temp = TempDir::new().unwrap();
    ward(&temp).arg("diagnose").assert().failure().code(2);

    temp.child("s.json").write_str("[1, 2, 3]").unwrap();
    ward(&temp)
        .args(["diagnose", "--test", "--file", "s.json"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn unmatched_signature_prints_generic_advice_and_succeeds() {
    let temp = TempDir::new().unwrap();
    temp.child("flat.json").write_str("[40, 40, 40, 40]").unwrap();

    ward(&temp)
        .args(["diagnose", "--file", "flat.json"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("no confident match")
                .and(predicate::str::contains("generic advice")),
        );

    let miss = json_stdout(ward(&temp).args(["diagnose", "--file", "flat.json", "--json"]));
    assert_eq!(miss["matched"], false);
    assert_eq!(miss["shape"], "stable");
}

#[test]
fn dashboard_exports_are_accepted() {
    let temp = TempDir::new().unwrap();
    temp.child("dash.json")
        .write_str(
            r#"{"readings": [[1, 60], [2, 62], [3, 64], [4, 66], [5, 68]], "context": {"device": "gpu"}}"#,
        )
        .unwrap();

    let diagnosis = json_stdout(ward(&temp).args(["diagnose", "--file", "dash.json", "--json"]));
    assert_eq!(diagnosis["matched_case_id"], "LEAK_002");
}

#[test]
fn malformed_signature_is_a_hard_error() {
    let temp = TempDir::new().unwrap();
    temp.child("bad.json").write_str("\"nope\"").unwrap();
    ward(&temp)
        .args(["diagnose", "--file", "bad.json"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid signature"));
}

#[test]
fn learned_cases_persist_across_invocations() {
    let temp = TempDir::new().unwrap();
    temp.child("case.json")
        .write_str(
            r#"{
  "case_type": "GPU",
  "symptoms": "VRAM climbs during batch encodes",
  "pattern": {"shape": "steady_increase", "context": {"device": "gpu"}},
  "root_cause": "Encoder sessions are never closed",
  "solution": "Close encoder sessions after each batch",
  "severity": "high",
  "impact": ["Batch encodes fail after a few hours"]
}"#,
        )
        .unwrap();

    ward(&temp)
        .args(["learn", "--file", "case.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("learned case: GPU_001"));

    let case = json_stdout(ward(&temp).args(["case", "GPU_001", "--json"]));
    assert_eq!(case["root_cause"], "Encoder sessions are never closed");
    assert_eq!(case["source"], "learned");

    let listed = json_stdout(ward(&temp).args(["list", "--type", "gpu", "--json"]));
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[test]
fn incomplete_cases_are_rejected_without_failing() {
    let temp = TempDir::new().unwrap();
    temp.child("case.json")
        .write_str(r#"{"pattern": "spike", "solution": "x", "severity": "low"}"#)
        .unwrap();

    ward(&temp)
        .args(["learn", "--file", "case.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "case rejected: missing required field `root_cause`",
        ));
    temp.child("kb.json").assert(predicate::path::missing());
}

#[test]
fn unknown_case_is_reported() {
    let temp = TempDir::new().unwrap();
    ward(&temp)
        .args(["case", "NOPE_001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("case not found: NOPE_001"));
}

#[test]
fn list_shows_builtin_cases() {
    let temp = TempDir::new().unwrap();
    ward(&temp)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("OOM_001").and(predicate::str::contains("CONF_002")));
}

#[test]
fn export_writes_the_default_file() {
    let temp = TempDir::new().unwrap();
    ward(&temp).arg("export").assert().success();

    let text = std::fs::read_to_string(temp.path().join("ward_cases_export.json")).unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(snapshot["cases"].as_array().unwrap().len(), 10);
    assert_eq!(snapshot["version"], 1);
}

#[test]
fn config_file_is_discovered_and_validated() {
    let temp = TempDir::new().unwrap();
    temp.child("ward.toml")
        .write_str("[knowledge]\nconfidence_floor = 0.99\n")
        .unwrap();

    // 0.925 no longer clears the floor.
    let miss = json_stdout(ward(&temp).args(["diagnose", "--test", "--json"]));
    assert_eq!(miss["matched"], false);
    assert_eq!(miss["best_candidate"]["case_id"], "OOM_001");

    temp.child("bad.toml")
        .write_str("[monitor]\nwarning_pct = 99\ncritical_pct = 90\n")
        .unwrap();
    ward(&temp)
        .args(["--config", "bad.toml", "stats"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid config"));
}

#[test]
fn pressure_reports_a_level() {
    let temp = TempDir::new().unwrap();
    let report = json_stdout(ward(&temp).args(["pressure", "--json"]));
    assert!(report["level"].is_string());
    assert!(report["plan"].is_array());
}
