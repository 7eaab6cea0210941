// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::path::Path;
use std::process::Command;

fn shmsens() -> Command {
    Command::new(env!("CARGO_BIN_EXE_shmsens"))
}

fn write_system(dir: &Path) -> std::path::PathBuf {
    let yaml = format!(
        r#"
name: "cli-bench"
clock_hz: 10
devices:
  - id: "mmsens0"
    type: "mmsens"
    base_address: 0x40000000
    irq: 3
    sample_hz: 5
    source: {{ kind: shm, name: "mmsens", dir: "{dir}" }}
  - id: "i2csens0"
    type: "i2csens"
    i2c_address: 0x50
    source: {{ kind: constant, value: 0x1234 }}
"#,
        dir = dir.display()
    );
    let path = dir.join("system.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

#[test]
fn test_run_reports_interrupts_and_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let system = write_system(dir.path());
    let snap = dir.path().join("snap.json");

    let output = shmsens()
        .args(["run", "--system"])
        .arg(&system)
        .args(["--cycles", "4", "--write", "0x40000000=0x3", "--json", "--snapshot"])
        .arg(&snap)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "finished");
    assert_eq!(report["cycles"], 4);
    assert_eq!(report["irq_raises"]["mmsens0"], 1);
    assert_eq!(report["irq_levels"]["mmsens0"], true);

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&snap).unwrap()).unwrap();
    assert_eq!(saved["cycles"], 4);
    assert!(saved["peripherals"]["mmsens0"].is_object());
    assert!(saved["i2c_devices"]["i2csens0"].is_object());
}

#[test]
fn test_poke_then_peek_segment() {
    let dir = tempfile::tempdir().unwrap();
    let system = write_system(dir.path());

    // Building the system creates the segment.
    let status = shmsens()
        .args(["run", "--cycles", "0", "--system"])
        .arg(&system)
        .status()
        .unwrap();
    assert!(status.success());

    let dir_arg = dir.path().to_str().unwrap();
    let status = shmsens()
        .args(["poke", "--segment", "mmsens", "--dir", dir_arg, "--value", "0xC3"])
        .status()
        .unwrap();
    assert!(status.success());

    let output = shmsens()
        .args(["peek", "--segment", "mmsens", "--dir", dir_arg])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "0x000000c3");
}

#[test]
fn test_i2c_read_through_bus() {
    let dir = tempfile::tempdir().unwrap();
    let system = write_system(dir.path());

    let output = shmsens()
        .args(["i2c-read", "--address", "0x50", "--register", "1", "--len", "2", "--enable", "--system"])
        .arg(&system)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "0x34 0xff");

    let output = shmsens()
        .args(["i2c-read", "--address", "0x51", "--register", "0", "--system"])
        .arg(&system)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_invalid_manifest_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.yaml");
    std::fs::write(
        &path,
        "name: bad\ndevices:\n  - id: a\n    type: mmsens\n",
    )
    .unwrap();

    let status = shmsens()
        .args(["run", "--cycles", "1", "--system"])
        .arg(&path)
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(2));
}

#[test]
fn test_run_restores_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let system = write_system(dir.path());
    let snap = dir.path().join("snap.json");

    let status = shmsens()
        .args(["run", "--cycles", "4", "--write", "0x40000000=0x3", "--system"])
        .arg(&system)
        .arg("--snapshot")
        .arg(&snap)
        .status()
        .unwrap();
    assert!(status.success());

    let output = shmsens()
        .args(["run", "--cycles", "0", "--json", "--system"])
        .arg(&system)
        .arg("--restore")
        .arg(&snap)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["cycles"], 4);
    assert_eq!(report["irq_levels"]["mmsens0"], true);
    assert!(report["irq_raises"].as_object().unwrap().is_empty());
}

#[test]
fn test_run_with_corrupted_snapshot_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let system = write_system(dir.path());
    let snap = dir.path().join("broken.json");
    std::fs::write(&snap, "{ \"peripherals\": [1, 2").unwrap();

    let status = shmsens()
        .args(["run", "--cycles", "1", "--system"])
        .arg(&system)
        .arg("--restore")
        .arg(&snap)
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(2));
}

#[test]
fn test_segment_value_belongs_to_poke_only() {
    let dir = tempfile::tempdir().unwrap();
    let dir_arg = dir.path().to_str().unwrap();

    let output = shmsens()
        .args(["peek", "--segment", "mmsens", "--dir", dir_arg, "--value", "5"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let output = shmsens()
        .args(["poke", "--segment", "mmsens", "--dir", dir_arg])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--value"));
}

#[test]
fn test_window_wrapping_address_space_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("high.yaml");
    std::fs::write(
        &path,
        "name: high\ndevices:\n  - id: a\n    type: mmsens\n    base_address: 0xFFFFFFFFFFFFFFF8\n    source: { kind: unavailable }\n",
    )
    .unwrap();

    let status = shmsens()
        .args(["run", "--cycles", "1", "--system"])
        .arg(&path)
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(2));
}
