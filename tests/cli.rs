//! Pruebas de la CLI `tsuki` sobre el binario compilado.

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::process::Command;

const BLINK: &str = r#"package main

import "arduino"

func setup() {
	arduino.PinMode(13, arduino.OUTPUT)
}

func loop() {
	arduino.DigitalWrite(13, arduino.HIGH)
	arduino.Delay(500)
	arduino.DigitalWrite(13, arduino.LOW)
	arduino.Delay(500)
}
"#;

const BROKEN: &str = "package main\n\nimport \"arduino\"\n\nfunc main() {\n\tarduino.Blink(13)\n\tvar label = \"oops\n}\n";

const WS2812: &str = r#"
[package]
name = "ws2812"
version = "1.0.0"
cpp_header = "Adafruit_NeoPixel.h"
arduino_lib = "Adafruit NeoPixel"

[[function]]
go = "New"
cpp = "Adafruit_NeoPixel({0}, {1}, NEO_GRB + NEO_KHZ800)"

[[function]]
go = "Show"
cpp = "{0}.show()"
"#;

fn tsuki() -> Command {
    let mut cmd = Command::cargo_bin("tsuki").unwrap();
    cmd.env_remove("TSUKI_LIBS_DIR")
        .env_remove("TSUKI_LOG")
        .env("XDG_DATA_HOME", std::env::temp_dir().join("tsuki-cli-tests-no-data"));
    cmd
}

#[test]
fn writes_the_output_file() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("main.go");
    input.write_str(BLINK).unwrap();
    let output = temp.child("build/main.cpp");

    tsuki()
        .arg(input.path())
        .arg(output.path())
        .assert()
        .success()
        .stderr(predicate::str::starts_with("ok  "));

    output.assert(predicate::str::contains("    digitalWrite(13, HIGH);\n"));
    output.assert(predicate::str::contains("#include <Arduino.h>"));
}

#[test]
fn prints_to_stdout_without_an_output_path() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("main.go");
    input.write_str(BLINK).unwrap();

    tsuki()
        .arg(input.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("    delay(500);\n"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn quiet_suppresses_the_success_line() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("main.go");
    input.write_str(BLINK).unwrap();

    tsuki()
        .arg(input.path())
        .arg(temp.child("main.cpp").path())
        .arg("--quiet")
        .assert()
        .success()
        .stderr(predicate::str::is_empty());
}

#[test]
fn check_reports_every_error_and_writes_nothing() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("main.go");
    input.write_str(BROKEN).unwrap();
    let output = temp.child("main.cpp");

    tsuki()
        .arg(input.path())
        .arg(output.path())
        .arg("--check")
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("error: unterminated string literal"))
        .stderr(predicate::str::contains("error: unknown call `arduino.Blink`"))
        .stderr(predicate::str::contains("Transpile failed with 2 errors"));

    output.assert(predicate::path::missing());
}

#[test]
fn errors_without_check_write_nothing_either() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("main.go");
    input.write_str(BROKEN).unwrap();
    let output = temp.child("main.cpp");

    tsuki().arg(input.path()).arg(output.path()).assert().failure();
    output.assert(predicate::path::missing());
}

#[test]
fn rejects_unknown_boards() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("main.go");
    input.write_str(BLINK).unwrap();

    tsuki()
        .arg(input.path())
        .args(&["--board", "tiny"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown board `tiny`"));
}

#[test]
fn lists_boards() {
    tsuki()
        .arg("boards")
        .assert()
        .success()
        .stdout(predicate::str::contains("uno"))
        .stdout(predicate::str::contains("arduino:avr:uno"))
        .stdout(predicate::str::contains("esp32"));
}

#[test]
fn loads_package_maps_from_the_libs_dir() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("libs/ws2812/1.0.0/tsukilib.toml").write_str(WS2812).unwrap();

    let input = temp.child("main.go");
    input
        .write_str("package main\n\nimport \"ws2812\"\n\nvar strip = ws2812.New(8, 6)\n\nfunc loop() {\n\tstrip.Show()\n}\n")
        .unwrap();

    tsuki()
        .arg(input.path())
        .arg("--libs-dir")
        .arg(temp.child("libs").path())
        .args(&["--packages", "ws2812"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#include <Adafruit_NeoPixel.h>"))
        .stdout(predicate::str::contains("    strip.show();\n"));
}

#[test]
fn every_installed_package_loads_without_a_list() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("libs/ws2812/1.0.0/tsukilib.toml").write_str(WS2812).unwrap();

    let input = temp.child("main.go");
    input
        .write_str("package main\n\nimport \"ws2812\"\n\nvar strip = ws2812.New(8, 6)\n\nfunc loop() {\n\tstrip.Show()\n}\n")
        .unwrap();

    tsuki()
        .arg(input.path())
        .env("TSUKI_LIBS_DIR", temp.child("libs").path())
        .assert()
        .success()
        .stdout(predicate::str::contains("#include <Adafruit_NeoPixel.h>"))
        .stdout(predicate::str::contains("    strip.show();\n"));
}

#[test]
fn missing_package_maps_are_configuration_errors() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("libs").create_dir_all().unwrap();

    let input = temp.child("main.go");
    input.write_str(BLINK).unwrap();

    tsuki()
        .arg(input.path())
        .arg("--libs-dir")
        .arg(temp.child("libs").path())
        .args(&["--packages", "ws2812, dht"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("missing package maps"))
        .stderr(predicate::str::contains("ws2812, dht"));
}

#[test]
fn shows_version() {
    tsuki()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
