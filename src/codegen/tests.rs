use std::path::Path;

use pretty_assertions::assert_eq;

use super::*;
use crate::{error::Classify, lex::tokenize, parse::parse, source::Source};

const WS2812: &str = r#"
[package]
name = "ws2812"
cpp_header = "Adafruit_NeoPixel.h"
arduino_lib = "Adafruit NeoPixel"

[[function]]
go = "New"
cpp = "Adafruit_NeoPixel({0}, {1}, NEO_GRB + NEO_KHZ800)"

[[function]]
go = "Show"
cpp = "{0}.show()"

[[function]]
go = "Fill"
cpp = "{0}.fill({1}, {2})"

[[constant]]
go = "GRB"
cpp = "NEO_GRB"
"#;

fn ws2812() -> PackageSet {
    let map = PackageMap::from_toml(WS2812, Path::new("ws2812/tsukilib.toml")).unwrap();
    let (packages, collisions) = PackageSet::new(vec![map]);
    assert!(collisions.is_empty());

    packages
}

fn run(text: &str, board: &str, packages: &PackageSet, source_map: bool) -> (String, Vec<CodegenError>) {
    let source = Source::new("main.go", text);
    let tokens = tokenize(&source);
    let ast = match parse(&source, &tokens) {
        Ok(ast) => ast,
        Err(errors) => panic!("unexpected parse errors: {:?}", errors),
    };

    let options = Options {
        board: Board::find(board).unwrap(),
        packages,
        source_map,
    };

    let (output, errors) = generate(&ast, &options);
    (output, errors.into_iter().map(Located::into_inner).collect())
}

/// Genera para una Uno y exige que no haya diagnósticos.
fn cpp(text: &str) -> String {
    cpp_for(text, "uno")
}

fn cpp_for(text: &str, board: &str) -> String {
    let (output, errors) = run(text, board, &PackageSet::default(), false);
    assert!(errors.is_empty(), "unexpected diagnostics: {:?}", errors);

    output
}

fn errors(text: &str) -> Vec<CodegenError> {
    let (_, errors) = run(text, "uno", &PackageSet::default(), false);
    errors
}

#[test]
fn blink_lowers_to_arduino_calls() {
    let output = cpp(r#"package main

import "arduino"

func setup() {
	arduino.PinMode(13, arduino.OUTPUT)
}

func loop() {
	arduino.DigitalWrite(13, arduino.HIGH)
	arduino.Delay(500)
}
"#);

    let expected = format!(
        "// Generated by tsuki {} from main.go for Arduino Uno (arduino:avr:uno)
// Do not edit by hand.

#include <Arduino.h>

void setup();
void loop();

void setup() {{
    pinMode(13, OUTPUT);
}}

void loop() {{
    digitalWrite(13, HIGH);
    delay(500);
}}
",
        env!("CARGO_PKG_VERSION")
    );

    assert_eq!(output, expected);
}

#[test]
fn mapped_package_methods_use_their_templates() {
    let packages = ws2812();
    let (output, errors) = run(
        r#"package main

import "ws2812"

var strip = ws2812.New(8, 6)

func loop() {
	strip.Show()
}
"#,
        "uno",
        &packages,
        false,
    );

    assert!(errors.is_empty(), "{:?}", errors);
    assert!(output.contains("// Requires: Adafruit NeoPixel\n"));
    assert!(output.contains("#include <Adafruit_NeoPixel.h>\n"));
    assert!(output.contains("auto strip = Adafruit_NeoPixel(8, 6, NEO_GRB + NEO_KHZ800);\n"));
    assert!(output.contains("    strip.show();\n"));
}

#[test]
fn template_arity_mismatch_is_an_invariant_error() {
    let packages = ws2812();
    let (_, errors) = run(
        r#"package main

import "ws2812"

var strip = ws2812.New(8, 6)

func loop() {
	strip.Fill(1)
}
"#,
        "uno",
        &packages,
        false,
    );

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].class(), Class::Invariant);
    assert!(matches!(
        &errors[0],
        CodegenError::Placeholders { expected: 3, found: 2, variadic: false, .. }
    ));
}

#[test]
fn multiple_results_become_aggregates() {
    let output = cpp(r#"package main

func divmod(a, b int) (int, int) {
	return a / b, a % b
}

func main() {
	q, r := divmod(7, 2)
	println(q, r)
}
"#);

    assert!(output.contains("struct divmod_result {\n    int ret0;\n    int ret1;\n};\n"));
    assert!(output.contains("divmod_result divmod(int a, int b);\n"));
    assert!(output.contains("    return divmod_result{a / b, a % b};\n"));
    assert!(output.contains(
        "void setup() {
    divmod_result _tsuki_tmp0 = divmod(7, 2);
    int q = _tsuki_tmp0.ret0;
    int r = _tsuki_tmp0.ret1;
    (Serial.print(q), Serial.print(\" \"), Serial.println(r));
}
"
    ));

    // Los nombres con doble guion bajo son del compilador de C++
    assert!(!output.contains("__"));
}

#[test]
fn named_results_start_at_zero() {
    let output = cpp(r#"package main

func split(total int) (half int, rest int) {
	half = total / 2
	rest = total - half
	return
}
"#);

    assert!(output.contains("struct split_result {\n    int half;\n    int rest;\n};\n"));
    assert!(output.contains("    int half{};\n    int rest{};\n"));
    assert!(output.contains("    return split_result{half, rest};\n"));
}

#[test]
fn main_becomes_setup_and_loop_is_added() {
    let output = cpp("package main\n\nfunc main() {\n\tprintln(\"hi\")\n}\n");

    assert!(output.contains("void setup();\nvoid loop();\n"));
    assert!(output.contains("void setup() {\n    Serial.println(\"hi\");\n}\n"));
    assert!(output.ends_with("\nvoid loop() {}\n"));
    assert!(!output.contains("main("));
}

#[test]
fn empty_file_still_defines_entry_points() {
    let output = cpp("package main\n");
    assert!(output.contains("void setup() {}\n"));
    assert!(output.contains("void loop() {}\n"));
}

#[test]
fn unknown_calls_are_reported_with_suggestions() {
    let errors = errors(
        r#"package main

import "arduino"

func loop() {
	arduino.Blink(13)
	arduino.DigitalWrit(13, arduino.HIGH)
}
"#,
    );

    assert_eq!(errors.len(), 2);
    assert!(matches!(
        &errors[0],
        CodegenError::UnresolvedCall { call, .. } if call == "arduino.Blink"
    ));

    match &errors[1] {
        CodegenError::UnresolvedCall { call, suggestion } => {
            assert_eq!(call, "arduino.DigitalWrit");
            assert_eq!(suggestion.as_deref(), Some("arduino.digitalWrite"));
        }

        other => panic!("unexpected error: {:?}", other),
    }

    assert_eq!(errors[0].class(), Class::Resolution);
}

#[test]
fn undefined_names_suggest_visible_ones() {
    let errors = errors("package main\n\nvar ledPin = 13\n\nfunc loop() {\n\tprintln(ledPn)\n}\n");

    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].to_string(),
        "undefined: `ledPn`; did you mean `ledPin`?"
    );
}

#[test]
fn unknown_packages_are_resolution_errors() {
    let errors = errors("package main\n\nimport \"wifi\"\n\nfunc loop() {}\n");

    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], CodegenError::UnknownPackage(path) if path == "wifi"));
    assert_eq!(errors[0].class(), Class::Resolution);
}

#[test]
fn goroutines_are_kept_as_comments() {
    let (output, errors) = run(
        "package main\n\nfunc blink() {}\n\nfunc loop() {\n\tgo blink()\n}\n",
        "uno",
        &PackageSet::default(),
        false,
    );

    assert!(output.contains("    // TSUKI-UNSUPPORTED: go blink()\n"));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].severity(), Severity::Warning);
    assert_eq!(errors[0].class(), Class::Unsupported);
}

#[test]
fn integer_switches_stay_native() {
    let output = cpp(r#"package main

const Fast = 2

func speed(mode int) int {
	switch mode {
	case 1, Fast:
		return 10
	case 3:
		fallthrough
	default:
		return 0
	}
	return -1
}
"#);

    assert!(output.contains("const int Fast = 2;\n"));
    assert!(output.contains("    switch (mode) {\n    case 1: case Fast: {\n        return 10;\n        break;\n    }\n"));
    assert!(output.contains("    case 3: {\n    }\n    default: {\n        return 0;\n        break;\n    }\n    }\n"));
}

#[test]
fn string_switches_become_if_chains() {
    let output = cpp(r#"package main

func code(name string) int {
	switch name {
	case "red":
		return 1
	case "green", "blue":
		return 2
	}
	return 0
}
"#);

    assert!(output.contains(
        r#"    {
        String _tsuki_tag0 = name;
        if (_tsuki_tag0 == "red") {
            return 1;
        } else if (_tsuki_tag0 == "green" || _tsuki_tag0 == "blue") {
            return 2;
        }
    }
    return 0;
"#
    ));

    assert!(!output.contains("_tsuki_end"));
}

#[test]
fn break_leaves_an_if_chain_switch() {
    let output = cpp(r#"package main

func main() {
	for i := 0; i < 10; i++ {
		switch {
		case i > 5:
			break
		default:
			println(i)
		}
	}
}
"#);

    assert!(output.contains("    for (int i = 0; i < 10; i++) {\n"));
    assert!(output.contains("        if (i > 5) {\n            goto _tsuki_end0;\n        } else {\n"));
    assert!(output.contains("        _tsuki_end0: ;\n"));
}

#[test]
fn fallthrough_needs_a_native_switch() {
    let errors = errors(
        r#"package main

func pick(name string) {
	switch name {
	case "a":
		fallthrough
	case "b":
		println(name)
	}
}
"#,
    );

    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], CodegenError::Fallthrough));
}

#[test]
fn ranges_over_arrays_strings_and_integers() {
    let output = cpp(r#"package main

import "arduino"

var pins = [3]int{2, 3, 4}

func show(msg string) {
	for i, c := range msg {
		print(i, c)
	}
}

func main() {
	for _, pin := range pins {
		arduino.PinMode(pin, arduino.OUTPUT)
	}

	for i := range 4 {
		println(i)
	}
}
"#);

    assert!(output.contains("int pins[3] = {2, 3, 4};\n"));
    assert!(output.contains("    for (unsigned int i = 0; i < msg.length(); i++) {\n        int32_t c = msg[i];\n"));
    assert!(output.contains(
        "    for (int _tsuki_i0 = 0; _tsuki_i0 < (int)(sizeof(pins) / sizeof(pins[0])); _tsuki_i0++) {
        int pin = pins[_tsuki_i0];
        pinMode(pin, OUTPUT);
    }
"
    ));

    assert!(output.contains("    for (int i = 0, _tsuki_n1 = 4; i < _tsuki_n1; i++) {\n"));
}

#[test]
fn slice_parameters_have_no_length() {
    let errors = errors("package main\n\nfunc sum(values []int) {\n\tfor _, v := range values {\n\t\tprintln(v)\n\t}\n}\n");

    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], CodegenError::SliceLength(text) if text == "values"));
}

#[test]
fn misspelled_builtins_are_suggested() {
    let errors = errors("package main\n\nfunc loop() {\n\tpanik(\"stop\")\n}\n");

    match errors.as_slice() {
        [CodegenError::UnresolvedCall { call, suggestion }] => {
            assert_eq!(call, "panik");
            assert_eq!(suggestion.as_deref(), Some("panic"));
        }

        other => panic!("unexpected errors: {:?}", other),
    }
}

#[test]
fn untyped_constants_widen_on_small_boards() {
    let source = "package main\n\nconst Big = 40000\nconst Small = 100\n";

    let uno = cpp_for(source, "uno");
    assert!(uno.contains("const long Big = 40000L;\n"));
    assert!(uno.contains("const int Small = 100;\n"));

    let esp32 = cpp_for(source, "esp32");
    assert!(esp32.contains("const int Big = 40000;\n"));
}

#[test]
fn untyped_constant_expressions_are_folded() {
    let source = "package main\n\nconst Big = 1 << 20\nconst Huge = Big * Big * 4096\nconst Mask = 0xff &^ 0x0f\n";

    let uno = cpp_for(source, "uno");
    assert!(uno.contains("const long Big = 1048576L;\n"));
    assert!(uno.contains("const long long Huge = 4503599627370496LL;\n"));
    assert!(uno.contains("const int Mask = 240;\n"));

    let esp32 = cpp_for(source, "esp32");
    assert!(esp32.contains("const int Big = 1048576;\n"));
}

#[test]
fn peripheral_packages_and_allocation_builtins() {
    let output = cpp(r#"package main

import (
	"Serial"
	"fmt"
	"lcd"
	"math"
)

type Point struct {
	X int
}

var screen lcd.LiquidCrystal = lcd.New(12, 11, 5, 4, 3, 2)

func setup() {
	Serial.Begin(9600)
	screen.Begin(16, 2)
	screen.SetCursor(0, 1)
	fmt.Fprintf(nil, "t=%d", 3)
	err := fmt.Errorf("bad %d", 1)
	scale := math.Pow10(3)
	p := new(Point)
	delete(p)
	println(err, scale)
}
"#);

    assert!(output.contains("#include <LiquidCrystal.h>\n#include <math.h>\n"));
    assert!(output.contains("LiquidCrystal screen = LiquidCrystal(12, 11, 5, 4, 3, 2);\n"));
    assert!(output.contains("    Serial.begin(9600);\n"));
    assert!(output.contains("    screen.begin(16, 2);\n"));
    assert!(output.contains("    screen.setCursor(0, 1);\n"));
    assert!(output.contains("(void)(nullptr); char _tsuki_buf[128]; snprintf(_tsuki_buf, sizeof(_tsuki_buf), \"t=%d\", 3);"));
    assert!(output.contains("snprintf(_tsuki_buf, sizeof(_tsuki_buf), \"bad %d\", 1); return String(_tsuki_buf); })()"));
    assert!(output.contains("pow(10.0, 3)"));
    assert!(output.contains("p = (new Point());\n"));
    assert!(output.contains("    delete p;\n"));
}

#[test]
fn iota_counts_within_a_group() {
    let output = cpp("package main\n\nconst (\n\tIdle = iota\n\tRunning\n\tDone\n)\n");
    assert!(output.contains("const int Idle = 0;\nconst int Running = 1;\nconst int Done = 2;\n"));
}

#[test]
fn keyed_struct_literals_follow_declaration_order() {
    let output = cpp(r#"package main

type Point struct {
	X int
	Y int
	Z int
}

var origin = Point{Z: 3, X: 1}
"#);

    assert!(output.contains("struct Point;\n"));
    assert!(output.contains("struct Point {\n    int X;\n    int Y;\n    int Z;\n};\n"));
    assert!(output.contains("Point origin = Point{1, {}, 3};\n"));
}

#[test]
fn unknown_struct_fields_are_rejected() {
    let errors = errors("package main\n\ntype Point struct {\n\tX int\n}\n\nvar p = Point{W: 1}\n");

    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        CodegenError::UnknownField { structure, field } if structure == "Point" && field == "W"
    ));
}

#[test]
fn methods_are_defined_out_of_line() {
    let output = cpp(r#"package main

type Counter struct {
	n int
}

func (c *Counter) Add(v int) {
	c.n += v
}

var counter Counter

func loop() {
	counter.Add(2)
}
"#);

    assert!(output.contains("struct Counter {\n    int n;\n\n    void Add(int v);\n};\n"));
    assert!(output.contains("void Counter::Add(int v) {\n    Counter& c = *this;\n    c.n += v;\n}\n"));
    assert!(output.contains("Counter counter{};\n"));
    assert!(output.contains("    counter.Add(2);\n"));
}

#[test]
fn operators_keep_go_precedence() {
    let output = cpp(r#"package main

func check(a int, b int) bool {
	return a&1 == b
}

func mask(a int, b int) int {
	a &^= 4
	return a &^ b
}

func label(s string) string {
	return "n=" + s
}
"#);

    assert!(output.contains("    return (a & 1) == b;\n"));
    assert!(output.contains("    a &= ~(4);\n    return a & ~(b);\n"));
    assert!(output.contains("    return String(\"n=\") + s;\n"));
}

#[test]
fn parallel_assignment_uses_temporaries() {
    let output = cpp("package main\n\nfunc swap(a int, b int) {\n\ta, b = b, a\n}\n");

    assert!(output.contains(
        "    auto _tsuki_tmp0 = b;\n    auto _tsuki_tmp1 = a;\n    a = _tsuki_tmp0;\n    b = _tsuki_tmp1;\n"
    ));
}

#[test]
fn source_map_marks_statements() {
    let (output, errors) = run(
        "package main\n\nimport \"arduino\"\n\nfunc loop() {\n\tarduino.Delay(10)\n}\n",
        "uno",
        &PackageSet::default(),
        true,
    );

    assert!(errors.is_empty());
    assert!(output.contains("#line 5 \"main.go\"\nvoid loop() {\n"));
    assert!(output.contains("#line 6 \"main.go\"\n    delay(10);\n"));
}

#[test]
fn output_is_deterministic() {
    let source = r#"package main

import (
	"math"
	"wire"
)

type Pair struct {
	A int
	B int
}

const Limit = 3

var pairs = [2]Pair{{1, 2}, {3, 4}}

func main() {
	wire.Begin()
	println(math.Sqrt(2.0), Limit, pairs[0].A)
}
"#;

    let first = cpp(source);
    assert!(first.contains("#include <Wire.h>\n#include <math.h>\n"));
    assert!(first.contains("Pair pairs[2] = {Pair{1, 2}, Pair{3, 4}};\n"));

    for _ in 0..4 {
        assert_eq!(cpp(source), first);
    }
}
