use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

/// Project(1) ─ Sample(2) child, Project ─ Site(3) child (multiple),
/// Site ─ Sample link. Sample 20 is linked from site 31 only.
const PROJECT_FIXTURE: &str = r#"{
    "datatypes": [
        { "id": 1, "name": "Project" },
        { "id": 2, "name": "Sample" },
        { "id": 3, "name": "Site" }
    ],
    "edges": [
        { "ancestor": 1, "descendant": 2 },
        { "ancestor": 1, "descendant": 3, "multiple_allowed": true },
        { "ancestor": 3, "descendant": 2, "is_link": true }
    ],
    "records": [
        {
            "id": 10,
            "datatype": 1,
            "fields": { "11": { "type": "short_text", "value": "PRJ" } },
            "children": {
                "2": [
                    { "id": 20, "datatype": 2, "fields": { "21": { "type": "short_text", "value": "S-20" } } },
                    { "id": 25, "datatype": 2 }
                ],
                "3": [
                    { "id": 30, "datatype": 3, "fields": { "31": { "type": "short_text", "value": "North" } } },
                    { "id": 31, "datatype": 3, "fields": { "31": { "type": "short_text", "value": "South" } } }
                ]
            }
        }
    ],
    "links": [[31, 20]]
}"#;

/// Sample(1) ─ Spectrum(2) child, Spectrum ─ Reference(3) link,
/// Sample ─ Reference link.
const MERGE_FIXTURE: &str = r#"{
    "edges": [
        { "ancestor": 1, "descendant": 2, "multiple_allowed": true },
        { "ancestor": 2, "descendant": 3, "is_link": true, "multiple_allowed": true },
        { "ancestor": 1, "descendant": 3, "is_link": true, "multiple_allowed": true }
    ],
    "records": [
        {
            "id": 1,
            "datatype": 1,
            "children": {
                "2": [{ "id": 2, "datatype": 2, "children": { "3": [{ "id": 5, "datatype": 3, "name": "alpha" }] } }],
                "3": [{ "id": 4, "datatype": 3, "name": "beta" }]
            }
        }
    ]
}"#;

fn odr_prefix_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_odr-prefix"))
}

fn write_fixture(text: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("fixture.json");
    fs::write(&path, text).expect("write fixture");
    (dir, path)
}

fn run(fixture: &Path, args: &[&str]) -> Output {
    Command::new(odr_prefix_bin())
        .arg("--fixture")
        .arg(fixture)
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("run odr-prefix")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "odr-prefix failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn resolve_walks_through_the_linking_site() {
    let (_dir, fixture) = write_fixture(PROJECT_FIXTURE);
    let output = run(&fixture, &["resolve", "--prefix", "1_3_2", "--record", "20"]);
    assert_eq!(stdout_json(&output), serde_json::json!([10, 31, 20]));
}

#[test]
fn resolve_without_a_linking_site_exits_with_an_error() {
    let (_dir, fixture) = write_fixture(PROJECT_FIXTURE);
    let output = run(&fixture, &["resolve", "--prefix", "1_3_2", "--record", "25"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error:"), "stderr: {stderr}");
    assert!(stderr.contains("datarecord 25"), "stderr: {stderr}");
}

#[test]
fn values_come_from_records_on_the_chain() {
    let (_dir, fixture) = write_fixture(PROJECT_FIXTURE);
    let output = run(
        &fixture,
        &[
            "values", "--prefix", "1_3_2", "--record", "20", "--fields", "11,31,21",
        ],
    );
    let values = stdout_json(&output);

    assert_eq!(values["11"]["value"], "PRJ");
    assert_eq!(values["31"]["value"], "South");
    assert_eq!(values["21"]["value"], "S-20");
}

#[test]
fn malformed_prefix_is_reported() {
    let (_dir, fixture) = write_fixture(PROJECT_FIXTURE);
    let output = run(&fixture, &["values", "--prefix", "1__2", "--record", "20", "--fields", "11"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid prefix `1__2`"));
}

#[test]
fn merge_orders_records_by_the_requested_key() {
    let (_dir, fixture) = write_fixture(MERGE_FIXTURE);
    let merged_ids = |order: &str| -> Vec<u64> {
        let output = run(
            &fixture,
            &["merge", "--record", "1", "--config", "1_2_3,1_3:1_3", "--order", order],
        );
        stdout_json(&output)["children"]["3"]
            .as_array()
            .expect("references at the destination")
            .iter()
            .filter_map(|r| r["id"].as_u64())
            .collect()
    };

    assert_eq!(merged_ids("id"), vec![4, 5]);
    // alpha before beta
    assert_eq!(merged_ids("name"), vec![5, 4]);
}
