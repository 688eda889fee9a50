//! Tabla fija de intrínsecos.
//!
//! Los paquetes `arduino`, `fmt`, `time`, `math`, `strconv`, `serial`,
//! `wire`, `spi`, `servo` y `lcd`, junto con las funciones predeclaradas
//! de Go, se traducen directamente a la API de Arduino. Los paquetes de
//! periféricos también se importan con el nombre de su clase (`Serial`,
//! `Wire`, `SPI`, `Servo`, `LiquidCrystal`). A diferencia de los mapas
//! de paquetes, esta tabla no es extensible.

use lazy_static::lazy_static;
use rustc_hash::FxHashMap;

use crate::pkgmap::Template;

/// Forma de traducir una llamada intrínseca.
#[derive(Debug)]
pub enum Lowering {
    Template(Template),

    /// Una llamada a `each` por argumento, encadenadas con el operador
    /// coma. La última usa `last`, y entre argumentos se imprime
    /// `separator` si existe.
    Chain {
        each: &'static str,
        last: &'static str,
        separator: Option<&'static str>,
    },
}

#[derive(Debug, Default)]
pub struct Package {
    pub header: Option<&'static str>,
    pub functions: FxHashMap<&'static str, Lowering>,
    pub constants: FxHashMap<&'static str, &'static str>,
    pub types: FxHashMap<&'static str, &'static str>,
}

impl Package {
    fn new(header: Option<&'static str>) -> Self {
        Package {
            header,
            ..Default::default()
        }
    }

    fn func(mut self, go: &'static str, cpp: &'static str) -> Self {
        self.functions.insert(go, Lowering::Template(Template::parse(cpp)));
        self
    }

    fn chain(mut self, go: &'static str, last: &'static str, separator: Option<&'static str>) -> Self {
        let lowering = Lowering::Chain {
            each: "Serial.print",
            last,
            separator,
        };

        self.functions.insert(go, lowering);
        self
    }

    fn constant(mut self, go: &'static str, cpp: &'static str) -> Self {
        self.constants.insert(go, cpp);
        self
    }

    fn typ(mut self, go: &'static str, cpp: &'static str) -> Self {
        self.types.insert(go, cpp);
        self
    }

    /// Busca una función, aceptando la forma PascalCase de un nombre
    /// camelCase (`DigitalWrite` por `digitalWrite`).
    pub fn function(&self, name: &str) -> Option<&Lowering> {
        self.functions.get(name).or_else(|| {
            let mut chars = name.chars();
            let first = chars.next()?;

            let camel: String = first.to_lowercase().chain(chars).collect();
            self.functions.get(camel.as_str())
        })
    }

    pub fn constant_of(&self, name: &str) -> Option<&'static str> {
        self.constants.get(name).copied()
    }
}

lazy_static! {
    static ref BUILTINS: FxHashMap<&'static str, Lowering> = {
        let builtins = Package::new(None)
            .chain("print", "Serial.print", None)
            .chain("println", "Serial.println", Some("\" \""))
            .func("len", "(sizeof({0}) / sizeof({0}[0]))")
            .func("cap", "(sizeof({0}) / sizeof({0}[0]))")
            .func("panic", "do { Serial.println({0}); for (;;) {} } while (0)")
            .func("copy", "memcpy({0}, {1}, sizeof({0}))")
            .func("min", "min({0}, {1})")
            .func("max", "max({0}, {1})")
            .func("new", "(new {0}())")
            .func("delete", "delete {0}");

        builtins.functions
    };

    static ref PACKAGES: FxHashMap<&'static str, Package> = {
        let mut packages = FxHashMap::default();

        packages.insert("arduino", arduino());
        packages.insert("fmt", fmt());
        packages.insert("time", time());
        packages.insert("math", math());
        packages.insert("strconv", strconv());
        packages.insert("serial", serial());
        packages.insert("wire", wire());
        packages.insert("spi", spi());
        packages.insert("servo", servo());
        packages.insert("lcd", lcd());

        packages.insert("Serial", serial());
        packages.insert("Wire", wire());
        packages.insert("SPI", spi());
        packages.insert("Servo", servo());
        packages.insert("LiquidCrystal", lcd());

        packages
    };
}

/// Paquete intrínseco por nombre de importación.
pub fn package(name: &str) -> Option<&'static Package> {
    PACKAGES.get(name)
}

/// Función predeclarada, como `len` o `println`.
pub fn builtin(name: &str) -> Option<&'static Lowering> {
    BUILTINS.get(name)
}

/// Todos los paquetes intrínsecos, en orden alfabético.
pub fn packages() -> Vec<(&'static str, &'static Package)> {
    let mut all: Vec<_> = PACKAGES.iter().map(|(name, package)| (*name, package)).collect();
    all.sort_by_key(|(name, _)| *name);
    all
}

/// Nombres de todas las funciones predeclaradas.
pub fn builtins() -> impl Iterator<Item = &'static str> {
    BUILTINS.keys().copied()
}

fn arduino() -> Package {
    Package::new(None)
        .func("pinMode", "pinMode({0}, {1})")
        .func("digitalWrite", "digitalWrite({0}, {1})")
        .func("digitalRead", "digitalRead({0})")
        .func("analogRead", "analogRead({0})")
        .func("analogWrite", "analogWrite({0}, {1})")
        .func("analogReference", "analogReference({0})")
        .func("delay", "delay({0})")
        .func("delayMicroseconds", "delayMicroseconds({0})")
        .func("millis", "millis()")
        .func("micros", "micros()")
        .func("map", "map({0}, {1}, {2}, {3}, {4})")
        .func("constrain", "constrain({0}, {1}, {2})")
        .func("abs", "abs({0})")
        .func("min", "min({0}, {1})")
        .func("max", "max({0}, {1})")
        .func("sqrt", "sqrt({0})")
        .func("pow", "pow({0}, {1})")
        .func("random", "random({args})")
        .func("randomSeed", "randomSeed({0})")
        .func("tone", "tone({args})")
        .func("noTone", "noTone({0})")
        .func("pulseIn", "pulseIn({args})")
        .func("pulseInLong", "pulseInLong({args})")
        .func("shiftOut", "shiftOut({0}, {1}, {2}, {3})")
        .func("shiftIn", "shiftIn({0}, {1}, {2})")
        .func("attachInterrupt", "attachInterrupt({0}, {1}, {2})")
        .func("detachInterrupt", "detachInterrupt({0})")
        .func("digitalPinToInterrupt", "digitalPinToInterrupt({0})")
        .func("interrupts", "interrupts()")
        .func("noInterrupts", "noInterrupts()")
        .func("serialBegin", "Serial.begin({0})")
        .func("serialEnd", "Serial.end()")
        .func("serialPrint", "Serial.print({0})")
        .func("serialPrintln", "Serial.println({0})")
        .func("serialAvailable", "Serial.available()")
        .func("serialRead", "Serial.read()")
        .func("serialReadString", "Serial.readString()")
        .func("serialFlush", "Serial.flush()")
        .constant("HIGH", "HIGH")
        .constant("LOW", "LOW")
        .constant("INPUT", "INPUT")
        .constant("OUTPUT", "OUTPUT")
        .constant("INPUT_PULLUP", "INPUT_PULLUP")
        .constant("LED_BUILTIN", "LED_BUILTIN")
        .constant("LSBFIRST", "LSBFIRST")
        .constant("MSBFIRST", "MSBFIRST")
        .constant("CHANGE", "CHANGE")
        .constant("RISING", "RISING")
        .constant("FALLING", "FALLING")
        .constant("A0", "A0")
        .constant("A1", "A1")
        .constant("A2", "A2")
        .constant("A3", "A3")
        .constant("A4", "A4")
        .constant("A5", "A5")
}

fn fmt() -> Package {
    // snprintf en AVR no soporta %f salvo que se enlace printf_flt
    Package::new(None)
        .chain("Print", "Serial.print", None)
        .chain("Println", "Serial.println", Some("\" \""))
        .func(
            "Printf",
            "do { char _tsuki_buf[128]; snprintf(_tsuki_buf, sizeof(_tsuki_buf), {args}); Serial.print(_tsuki_buf); } while (0)",
        )
        .func(
            "Sprintf",
            "([&]() { char _tsuki_buf[128]; snprintf(_tsuki_buf, sizeof(_tsuki_buf), {args}); return String(_tsuki_buf); })()",
        )
        // El destino no existe en la tarjeta: todo va al puerto serie
        .func(
            "Fprintf",
            "do { (void)({0}); char _tsuki_buf[128]; snprintf(_tsuki_buf, sizeof(_tsuki_buf), {args}); Serial.print(_tsuki_buf); } while (0)",
        )
        .func(
            "Errorf",
            "([&]() { char _tsuki_buf[128]; snprintf(_tsuki_buf, sizeof(_tsuki_buf), {args}); return String(_tsuki_buf); })()",
        )
}

fn time() -> Package {
    Package::new(None)
        .func("Sleep", "delay(({0}) / 1000000UL)")
        .func("Now", "millis()")
        .func("Since", "(millis() - {0})")
        .constant("Nanosecond", "1ULL")
        .constant("Microsecond", "1000ULL")
        .constant("Millisecond", "1000000ULL")
        .constant("Second", "1000000000ULL")
        .typ("Duration", "unsigned long long")
}

fn math() -> Package {
    const UNARY: &[(&str, &str)] = &[
        ("Abs", "fabs({0})"),
        ("Sqrt", "sqrt({0})"),
        ("Cbrt", "cbrt({0})"),
        ("Sin", "sin({0})"),
        ("Cos", "cos({0})"),
        ("Tan", "tan({0})"),
        ("Asin", "asin({0})"),
        ("Acos", "acos({0})"),
        ("Atan", "atan({0})"),
        ("Sinh", "sinh({0})"),
        ("Cosh", "cosh({0})"),
        ("Tanh", "tanh({0})"),
        ("Exp", "exp({0})"),
        ("Exp2", "exp2({0})"),
        ("Pow10", "pow(10.0, {0})"),
        ("Log", "log({0})"),
        ("Log2", "log2({0})"),
        ("Log10", "log10({0})"),
        ("Floor", "floor({0})"),
        ("Ceil", "ceil({0})"),
        ("Round", "round({0})"),
        ("Trunc", "trunc({0})"),
        ("IsNaN", "isnan({0})"),
    ];

    const BINARY: &[(&str, &str)] = &[
        ("Pow", "pow({0}, {1})"),
        ("Atan2", "atan2({0}, {1})"),
        ("Mod", "fmod({0}, {1})"),
        ("Remainder", "remainder({0}, {1})"),
        ("Hypot", "hypot({0}, {1})"),
        ("Min", "fmin({0}, {1})"),
        ("Max", "fmax({0}, {1})"),
        ("IsInf", "(isinf({0}) && ({1} == 0 || ({1} > 0) == ({0} > 0)))"),
    ];

    let mut package = Package::new(Some("math.h"))
        .func("Inf", "(({0}) >= 0 ? INFINITY : -INFINITY)")
        .func("NaN", "NAN")
        .constant("Pi", "M_PI")
        .constant("E", "M_E")
        .constant("Phi", "1.6180339887498948482")
        .constant("Sqrt2", "M_SQRT2")
        .constant("Ln2", "M_LN2")
        .constant("Log2E", "M_LOG2E")
        .constant("Log10E", "M_LOG10E")
        .constant("MaxFloat64", "DBL_MAX")
        .constant("SmallestNonzeroFloat64", "__DBL_DENORM_MIN__");

    for &(go, cpp) in UNARY.iter().chain(BINARY) {
        package = package.func(go, cpp);
    }

    package
}

fn strconv() -> Package {
    Package::new(None)
        .func("Itoa", "String({0})")
        .func("Atoi", "({0}).toInt()")
        .func("FormatInt", "String({0}, {1})")
        .func("FormatFloat", "String({0})")
        .func("FormatBool", "String(({0}) ? \"true\" : \"false\")")
        .func("ParseInt", "({0}).toInt()")
        .func("ParseFloat", "({0}).toFloat()")
        .func("ParseBool", "(({0}) == \"true\")")
}

fn serial() -> Package {
    Package::new(None)
        .func("Begin", "Serial.begin({0})")
        .func("End", "Serial.end()")
        .func("Print", "Serial.print({0})")
        .func("Println", "Serial.println({0})")
        .func("Write", "Serial.write({0})")
        .func("Read", "Serial.read()")
        .func("Peek", "Serial.peek()")
        .func("Available", "Serial.available()")
        .func("Flush", "Serial.flush()")
        .func("ParseInt", "Serial.parseInt()")
        .func("ParseFloat", "Serial.parseFloat()")
        .func("ReadString", "Serial.readString()")
        .func("Find", "Serial.find({0})")
}

fn wire() -> Package {
    Package::new(Some("Wire.h"))
        .func("Begin", "Wire.begin()")
        .func("BeginTransmission", "Wire.beginTransmission({0})")
        .func("EndTransmission", "Wire.endTransmission()")
        .func("RequestFrom", "Wire.requestFrom({0}, {1})")
        .func("Write", "Wire.write({0})")
        .func("Read", "Wire.read()")
        .func("Available", "Wire.available()")
        .func("SetClock", "Wire.setClock({0})")
        .func("OnReceive", "Wire.onReceive({0})")
        .func("OnRequest", "Wire.onRequest({0})")
}

fn spi() -> Package {
    Package::new(Some("SPI.h"))
        .func("Begin", "SPI.begin()")
        .func("End", "SPI.end()")
        .func("Transfer", "SPI.transfer({0})")
        .func("Transfer16", "SPI.transfer16({0})")
        .func("BeginTransaction", "SPI.beginTransaction({0})")
        .func("EndTransaction", "SPI.endTransaction()")
        .func("SetBitOrder", "SPI.setBitOrder({0})")
        .func("SetDataMode", "SPI.setDataMode({0})")
        .func("SetClockDivider", "SPI.setClockDivider({0})")
}

/// Paquete con receptor: `{0}` es la instancia de `servo.Servo`.
fn servo() -> Package {
    Package::new(Some("Servo.h"))
        .func("Attach", "{0}.attach({1})")
        .func("Write", "{0}.write({1})")
        .func("WriteMicroseconds", "{0}.writeMicroseconds({1})")
        .func("Read", "{0}.read()")
        .func("Attached", "{0}.attached()")
        .func("Detach", "{0}.detach()")
        .typ("Servo", "Servo")
}

/// Pantallas HD44780. `New` recibe los pines como el constructor de
/// `LiquidCrystal`; el resto son métodos sobre la instancia.
fn lcd() -> Package {
    Package::new(Some("LiquidCrystal.h"))
        .func("New", "LiquidCrystal({args})")
        .func("Begin", "{0}.begin({1}, {2})")
        .func("Clear", "{0}.clear()")
        .func("Home", "{0}.home()")
        .func("Print", "{0}.print({1})")
        .func("SetCursor", "{0}.setCursor({1}, {2})")
        .func("Blink", "{0}.blink()")
        .func("NoBlink", "{0}.noBlink()")
        .func("Cursor", "{0}.cursor()")
        .func("NoCursor", "{0}.noCursor()")
        .func("Display", "{0}.display()")
        .func("NoDisplay", "{0}.noDisplay()")
        .func("ScrollDisplayLeft", "{0}.scrollDisplayLeft()")
        .func("ScrollDisplayRight", "{0}.scrollDisplayRight()")
        .typ("LiquidCrystal", "LiquidCrystal")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn templates_are_contiguous() {
        for (name, package) in packages() {
            for (function, lowering) in &package.functions {
                if let Lowering::Template(template) = lowering {
                    assert_eq!(template.gap(), None, "{}.{}", name, function);
                }
            }
        }
    }

    #[test]
    fn pascal_case_falls_back_to_camel_case() {
        let arduino = package("arduino").unwrap();
        assert!(arduino.function("DigitalWrite").is_some());
        assert!(arduino.function("digitalWrite").is_some());
        assert!(arduino.function("Blink").is_none());
    }

    #[test]
    fn time_constants_are_nanoseconds() {
        let time = package("time").unwrap();
        assert_eq!(time.constant_of("Millisecond"), Some("1000000ULL"));
    }

    #[test]
    fn builtins_cover_go_predeclared_functions() {
        let mut names: Vec<_> = builtins().collect();
        names.sort_unstable();

        assert_eq!(
            names,
            vec!["cap", "copy", "delete", "len", "max", "min", "new", "panic", "print", "println"]
        );
    }

    #[test]
    fn headers_are_declared_per_package() {
        let headers: Vec<_> = packages()
            .into_iter()
            .filter_map(|(name, package)| package.header.map(|header| (name, header)))
            .collect();

        assert_eq!(
            headers,
            vec![
                ("LiquidCrystal", "LiquidCrystal.h"),
                ("SPI", "SPI.h"),
                ("Servo", "Servo.h"),
                ("Wire", "Wire.h"),
                ("lcd", "LiquidCrystal.h"),
                ("math", "math.h"),
                ("servo", "Servo.h"),
                ("spi", "SPI.h"),
                ("wire", "Wire.h"),
            ]
        );
    }

    #[test]
    fn class_names_alias_their_packages() {
        let aliases = [
            ("Serial", "serial"),
            ("Wire", "wire"),
            ("SPI", "spi"),
            ("Servo", "servo"),
            ("LiquidCrystal", "lcd"),
        ];

        for (alias, name) in aliases {
            let (alias, original) = (package(alias).unwrap(), package(name).unwrap());
            assert_eq!(alias.header, original.header);

            let mut left: Vec<_> = alias.functions.keys().collect();
            let mut right: Vec<_> = original.functions.keys().collect();
            left.sort_unstable();
            right.sort_unstable();
            assert_eq!(left, right);
        }
    }

    #[test]
    fn fmt_and_math_cover_the_common_extras() {
        let fmt = package("fmt").unwrap();
        assert!(fmt.function("Fprintf").is_some());
        assert!(fmt.function("Errorf").is_some());

        let math = package("math").unwrap();
        assert!(math.function("Pow10").is_some());
        assert_eq!(math.constant_of("SmallestNonzeroFloat64"), Some("__DBL_DENORM_MIN__"));
    }
}
