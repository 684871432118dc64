//! Integration tests for the serlink binary.

use std::process::Command;

/// Helper to get the path to the `serlink` binary built by cargo.
fn serlink_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_serlink"))
}

const BENCH: &str = r#"
name = "dual-camera-bench"

[[links]]
remote_power_up = 0x40
remote_alias = 0x1a

[[links]]
remote_power_up = 0x40
remote_alias = 0x1b

[[channels]]
pipe = 0
phy = 0
src_vc = 0
dst_vc = 0
format = "raw10"

[[channels]]
pipe = 1
phy = 1
src_vc = 0
dst_vc = 1
format = "embedded"
"#;

fn write_bench(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("bench.toml");
    std::fs::write(&path, contents).expect("failed to write topology");
    path
}

#[test]
fn cli_formats_lists_the_table() {
    let output = serlink_bin()
        .arg("formats")
        .output()
        .expect("failed to run serlink formats");

    assert!(output.status.success(), "serlink formats failed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Supported Pixel Formats"));
    for name in ["embedded", "yuyv8", "rgb888", "raw10", "raw16"] {
        assert!(stdout.contains(name), "format listing should contain '{name}'");
    }
    // Bus data-type code of raw10.
    assert!(stdout.contains("0x2b"));
}

#[test]
fn cli_formats_dbl_filter_drops_undoubled_formats() {
    let output = serlink_bin()
        .args(["formats", "--dbl"])
        .output()
        .expect("failed to run serlink formats --dbl");

    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("raw10"));
    assert!(!stdout.contains("rgb888"));
}

#[test]
fn cli_validate_accepts_a_clean_topology() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_bench(&dir, BENCH);

    let output = serlink_bin()
        .arg("validate")
        .arg(&path)
        .output()
        .expect("failed to run serlink validate");

    assert!(output.status.success(), "validate should accept the bench");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ok"));
    assert!(stdout.contains("2 links"));
    assert!(stdout.contains("2 channels"));
}

#[test]
fn cli_validate_rejects_duplicate_channels() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_bench(
        &dir,
        r#"
        name = "bad"

        [[channels]]
        pipe = 0
        src_vc = 0

        [[channels]]
        pipe = 0
        src_vc = 0
        "#,
    );

    let output = serlink_bin()
        .arg("validate")
        .arg(&path)
        .output()
        .expect("failed to run serlink validate");

    assert!(!output.status.success(), "duplicate channels must fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("src_vc"), "error should name the collision");
}

#[test]
fn cli_bringup_prints_chip_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_bench(&dir, BENCH);

    let output = serlink_bin()
        .arg("bringup")
        .arg(&path)
        .output()
        .expect("failed to run serlink bringup");

    assert!(output.status.success(), "bring-up should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("link 0:"));
    assert!(stdout.contains("pipe 0:"));
    assert!(stdout.contains("channel 0:"));
    assert!(stdout.contains("bring-up complete"));
}

#[test]
fn cli_attach_binds_remote_devices() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_bench(&dir, BENCH);

    let output = serlink_bin()
        .arg("attach")
        .arg(&path)
        .output()
        .expect("failed to run serlink attach");

    assert!(output.status.success(), "attach should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("link 0: bound 0x1a -> 0x40"));
    assert!(stdout.contains("link 1: bound 0x1b -> 0x40"));
    assert!(stdout.contains("2 device(s) attached"));
}
