//! CLI tests for `cadence validate` and `cadence simulate`.
//!
//! Spawns the binary against a temporary config and resource directory and
//! checks exit codes and the simulation report.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use cadence::exit_codes;
use cadence::io::config::write_config;
use cadence::io::resources::{Manifest, ManifestItem};
use cadence::test_support::{fast_config, write_manifests};
use serde_json::Value;

fn setup(root: &Path, manifests: &[Manifest]) {
    let resources = root.join("resources");
    fs::create_dir_all(&resources).expect("create resources");
    write_manifests(&resources, manifests).expect("write manifests");
    write_config(&root.join("cadence.toml"), &fast_config(&resources)).expect("write config");
}

fn cadence(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cadence"))
        .current_dir(root)
        .args(args)
        .output()
        .expect("run cadence")
}

fn sword_and_shield() -> Manifest {
    Manifest {
        name: "melee".to_string(),
        items: ["Sword", "Shield"]
            .into_iter()
            .map(|name| ManifestItem {
                name: name.to_string(),
                quantity: 1,
                stackable: false,
            })
            .collect(),
    }
}

#[test]
fn validate_accepts_a_complete_setup() {
    let temp = tempfile::tempdir().expect("tempdir");
    setup(temp.path(), &[sword_and_shield()]);

    let output = cadence(temp.path(), &["validate", "--manifest", "melee"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&output.stdout).contains("ok: 1 manifest(s)"));
}

#[test]
fn validate_rejects_missing_resources() {
    let temp = tempfile::tempdir().expect("tempdir");
    let resources = temp.path().join("resources");
    fs::create_dir_all(&resources).expect("create resources");
    write_config(&temp.path().join("cadence.toml"), &fast_config(&resources))
        .expect("write config");

    let output = cadence(temp.path(), &["validate"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing required resource"));
}

#[test]
fn simulate_deposits_junk_and_withdraws_missing_items() {
    let temp = tempfile::tempdir().expect("tempdir");
    setup(temp.path(), &[sword_and_shield()]);

    let output = cadence(
        temp.path(),
        &[
            "simulate",
            "--manifest",
            "melee",
            "--inventory",
            "Shield=1",
            "--inventory",
            "Junk=5",
            "--max-ticks",
            "5000",
        ],
    );
    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: Value = serde_json::from_slice(&output.stdout).expect("report json");
    assert_eq!(report["status"], "satisfied");
    assert_eq!(report["inventory"]["Sword"], 1);
    assert_eq!(report["inventory"]["Shield"], 1);
    assert!(report["inventory"].get("Junk").is_none());
}

#[test]
fn simulate_reports_incomplete_when_ticks_run_out() {
    let temp = tempfile::tempdir().expect("tempdir");
    setup(temp.path(), &[sword_and_shield()]);

    let output = cadence(
        temp.path(),
        &[
            "simulate",
            "--manifest",
            "melee",
            "--inventory",
            "Junk=5",
            "--max-ticks",
            "1",
        ],
    );
    assert_eq!(output.status.code(), Some(exit_codes::INCOMPLETE));
    let report: Value = serde_json::from_slice(&output.stdout).expect("report json");
    assert_eq!(report["status"], "incomplete");
}

#[test]
fn simulate_unknown_manifest_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    setup(temp.path(), &[sword_and_shield()]);

    let output = cadence(temp.path(), &["simulate", "--manifest", "ranged"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("manifest 'ranged' not found"));
}
