// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;

const ROWS: &str = r#"{"Cadors Number": "2024O0101", "Occurrence Date": "2024-05-01", "Occurrence Type": "Bird strike", "Narrative": "Bird strike on approach, windshield cracked."}
{"Cadors Number": "2024O0102", "Occurrence Date": "2024-05-02", "Occurrence Type": "Engine", "Narrative": "Engine fire warning on climb, engine shut down."}
{"CADORS  number": "2024O0101", "Narrative": "Bird strike on approach, windshield cracked."}
{"Narrative": "Row without a reference number."}
"#;

const CSV_ROWS: &str = "\u{feff}Cadors Number,Occurrence Date,Occurrence Type,Narrative\r\n\
2024O0201,2024-06-01,Bird strike,\"Bird strike on approach, windshield cracked.\r\nCrew landed normally.\"\r\n\
2024O0202,2024-06-02,Engine,\"Engine fire warning on climb, engine shut down.\"\r\n\
2024O0201,2024-06-01,Bird strike,Duplicate of the first row\r\n\
,2024-06-03,Other,Row without a reference number.\r\n";

fn setup() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(".priorcaserc.toml"),
        r#"
[embeddings]
provider = "hashing"
dimension = 512
"#,
    )
    .unwrap();
    fs::write(dir.path().join("rows.jsonl"), ROWS).unwrap();
    fs::write(dir.path().join("cadors.csv"), CSV_ROWS).unwrap();
    dir
}

fn run_json(root: &Path, args: &[&str]) -> Value {
    let mut cmd = cargo_bin_cmd!("priorcase");
    let output = cmd
        .current_dir(root)
        .args(["--format", "json"])
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn import_reports_counts() {
    let dir = setup();

    let mut cmd = cargo_bin_cmd!("priorcase");
    cmd.current_dir(dir.path())
        .env("NO_COLOR", "1")
        .args(["import", "rows.jsonl"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "total=4 inserted=2 skipped=1 duplicates=1",
        ));

    // A second run only finds duplicates.
    let again = run_json(dir.path(), &["import", "rows.jsonl"]);
    assert_eq!(again["inserted"], 0);
    assert_eq!(again["duplicates"], 3);
}

#[test]
fn import_without_embed_leaves_vectors_missing_until_backfill() {
    let dir = setup();
    run_json(dir.path(), &["import", "rows.jsonl"]);

    let before = run_json(dir.path(), &["embeddings", "summary", "--scope", "imported"]);
    assert_eq!(before["total"], 2);
    assert_eq!(before["with_vector"], 0);
    assert_eq!(before["missing"], 2);

    let backfill = run_json(dir.path(), &["embeddings", "backfill", "--batch-size", "1"]);
    assert_eq!(backfill["embedded"], 2);
    assert_eq!(backfill["failed"], 0);
    assert_eq!(backfill["summary"]["missing"], 0);
    assert_eq!(backfill["summary"]["dimension"], 512);
}

#[test]
fn backfill_limit_stops_early() {
    let dir = setup();
    run_json(dir.path(), &["import", "rows.jsonl"]);

    let backfill = run_json(dir.path(), &["embeddings", "backfill", "--limit", "1"]);
    assert_eq!(backfill["embedded"], 1);
    assert_eq!(backfill["summary"]["missing"], 1);
}

#[test]
fn imported_reports_are_searchable_by_scope() {
    let dir = setup();
    let stats = run_json(dir.path(), &["import", "rows.jsonl", "--embed"]);
    assert_eq!(stats["inserted"], 2);
    assert_eq!(stats["embed_failures"], 0);

    fs::write(
        dir.path().join("new.md"),
        "### Incident Summary\nBird strike on approach, windshield cracked.\n",
    )
    .unwrap();

    let scoped = run_json(
        dir.path(),
        &["similar", "new.md", "--scope", "imported", "--floor", "0.3"],
    );
    let results = scoped["results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0]["origin"], "imported");
    assert!(results[0]["excerpt"]
        .as_str()
        .unwrap()
        .contains("Bird strike on approach"));

    let internal = run_json(
        dir.path(),
        &["similar", "new.md", "--scope", "internal", "--floor=-1"],
    );
    assert!(internal["results"].as_array().unwrap().is_empty());
}

#[test]
fn csv_export_is_imported_and_searchable() {
    let dir = setup();

    let mut cmd = cargo_bin_cmd!("priorcase");
    cmd.current_dir(dir.path())
        .env("NO_COLOR", "1")
        .args(["import", "cadors.csv", "--embed"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "total=4 inserted=2 skipped=1 duplicates=1",
        ));

    fs::write(
        dir.path().join("new.md"),
        "### Incident Summary\nBird strike on approach, windshield cracked.\n",
    )
    .unwrap();
    let found = run_json(
        dir.path(),
        &["similar", "new.md", "--scope", "imported", "--floor", "0.3"],
    );
    let results = found["results"].as_array().unwrap();
    assert!(!results.is_empty());
    let excerpt = results[0]["excerpt"].as_str().unwrap();
    assert!(excerpt.contains("Bird strike on approach"));
    assert!(excerpt.contains("Crew landed normally."));
}

#[test]
fn csv_layout_can_be_forced() {
    let dir = setup();
    fs::copy(dir.path().join("cadors.csv"), dir.path().join("cadors.txt")).unwrap();

    let stats = run_json(
        dir.path(),
        &["import", "cadors.txt", "--input-format", "csv"],
    );
    assert_eq!(stats["inserted"], 2);

    let summary = run_json(dir.path(), &["embeddings", "summary"]);
    assert_eq!(summary["missing"], 2);
    assert_eq!(summary["malformed"], 0);
}

#[test]
fn missing_import_file_fails() {
    let dir = setup();
    let mut cmd = cargo_bin_cmd!("priorcase");
    cmd.current_dir(dir.path())
        .args(["import", "nope.jsonl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.jsonl"));
}
