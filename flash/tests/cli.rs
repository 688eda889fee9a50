use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn tsuki_flash() -> Command {
    let mut command = Command::cargo_bin("tsuki-flash").unwrap();
    command.env_remove("TSUKI_LOG").env_remove("TSUKI_SDK_ROOT");
    command
}

/// Aísla el sondeo del SDK en un directorio temporal.
fn isolated(home: &TempDir) -> Command {
    let mut command = tsuki_flash();
    command.env("HOME", home.path()).env_remove("XDG_DATA_HOME");
    command
}

#[test]
fn lists_boards() {
    tsuki_flash()
        .arg("boards")
        .assert()
        .success()
        .stdout(predicate::str::contains("uno"))
        .stdout(predicate::str::contains("Arduino Mega 2560"))
        .stdout(predicate::str::contains("esp8266"));
}

#[test]
fn sdk_info_lists_every_probe_on_failure() {
    let home = TempDir::new().unwrap();
    let root = home.path().join("sdk");

    isolated(&home)
        .env("TSUKI_SDK_ROOT", &root)
        .args(&["sdk-info", "uno"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no Arduino SDK for `avr` found, probed:"))
        .stderr(predicate::str::contains(root.display().to_string()))
        .stderr(predicate::str::contains(".arduino15"));
}

#[test]
fn sdk_info_shows_the_resolved_paths() {
    let home = TempDir::new().unwrap();
    let hardware = home.path().join("sdk/packages/arduino/hardware/avr/1.8.6");
    fs::create_dir_all(hardware.join("cores/arduino")).unwrap();
    fs::create_dir_all(hardware.join("variants/standard")).unwrap();

    isolated(&home)
        .env("TSUKI_SDK_ROOT", home.path().join("sdk"))
        .args(&["sdk-info", "nano"])
        .assert()
        .success()
        .stdout(predicate::str::contains("version    1.8.6"))
        .stdout(predicate::str::contains("variants/standard"))
        .stdout(predicate::str::contains("toolchain  (from PATH)"));
}

#[test]
fn arm_boards_do_not_compile_yet() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("sketch.cpp"), "void setup() {}\nvoid loop() {}\n").unwrap();

    tsuki_flash()
        .arg("compile")
        .args(&["--board", "due", "--sketch"])
        .arg(temp.path())
        .arg("--build-dir")
        .arg(temp.path().join("build"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("compiling for Arduino Due (sam) is not supported yet"));
}

#[test]
fn unknown_boards_are_rejected() {
    tsuki_flash()
        .args(&["sdk-info", "tiny"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown board `tiny`"));
}

#[test]
fn upload_without_firmware_fails() {
    let temp = TempDir::new().unwrap();

    tsuki_flash()
        .args(&["upload", "--board", "uno", "--port", "/dev/null", "--build-dir"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no firmware for `*` in"));
}

#[test]
fn detect_always_succeeds() {
    tsuki_flash().arg("detect").assert().success();
}

#[test]
fn requires_a_subcommand() {
    tsuki_flash().assert().failure();
}
