//! Compilación incremental de un sketch.
//!
//! # Flujo
//! 1. El core de Arduino se compila una sola vez por combinación de
//!    versión de SDK, MCU y opciones, y se archiva en `core/core.a`.
//! 2. Las unidades del sketch y de las bibliotecas incluidas se compilan
//!    en paralelo. Las que ya están en el caché se omiten.
//! 3. Al terminar todas, se escribe el manifiesto del caché y recién
//!    entonces se enlaza (ver [`crate::link`]).
//!
//! La traducción de cada unidad pasa por un [`Backend`], de modo que el
//! flujo se puede ejercitar sin una toolchain real.

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use rayon::prelude::*;
use tracing::{debug, info};
use tsuki::board::{Board, Toolchain};
use walkdir::WalkDir;

use crate::{
    cache::{hash_flags, object_path, Fingerprint, Manifest},
    error::FlashError,
    link::{self, Firmware, LinkOptions},
    sdk::{self, SdkPaths},
    tool,
};

/// Versión de Arduino anunciada en `-DARDUINO`, la que la mayoría de
/// bibliotecas espera.
const ARDUINO_VERSION: u32 = 10819;

/// Profundidad máxima al buscar fuentes en un directorio.
const SOURCE_DEPTH: usize = 3;

/// Parámetros de una compilación.
#[derive(Clone, Debug)]
pub struct Request {
    /// Directorio con las unidades `.cpp`, `.c` e `.ino` del sketch.
    pub sketch_dir: PathBuf,

    /// Directorio de objetos, caché y firmware.
    pub build_dir: PathBuf,

    /// Nombre base de los artefactos, `<name>.elf`, `<name>.hex`.
    pub name: String,

    /// Estándar de C++, por ejemplo `c++11`.
    pub cpp_std: String,

    /// Bibliotecas adicionales. Se agregan a `-I` y sus fuentes también
    /// se compilan.
    pub includes: Vec<PathBuf>,
}

/// Resultado de una compilación completa.
#[derive(Debug)]
pub struct Build {
    pub units: Units,
    pub firmware: Firmware,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Language {
    C,
    Cpp,
    Asm,
}

impl Language {
    /// Lenguaje de una fuente según su extensión. Los `.ino` son C++.
    pub fn of(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "c" => Some(Language::C),
            "cpp" | "cc" | "cxx" | "ino" => Some(Language::Cpp),
            "S" => Some(Language::Asm),
            _ => None,
        }
    }
}

/// Opciones de compilación de una tarjeta.
#[derive(Clone, Debug, Default)]
pub struct Flags {
    /// Comunes al core y al sketch.
    pub base: Vec<String>,

    /// `-I` de bibliotecas, solo para el sketch.
    pub includes: Vec<String>,

    pub c: Vec<String>,
    pub cpp: Vec<String>,
    pub asm: Vec<String>,

    /// Versión del SDK y, si se conoce, la del compilador. No llegan a la
    /// línea de comandos pero forman parte de la huella.
    pub toolchain: Vec<String>,
}

impl Flags {
    pub fn new(board: &Board, sdk: &SdkPaths, request: &Request) -> Self {
        let mut base = Vec::new();
        if let Toolchain::Avr { mcu, .. } = board.toolchain {
            base.push(format!("-mmcu={}", mcu));
        }

        base.push(format!("-DF_CPU={}L", board.f_cpu()));
        base.push(format!("-DARDUINO={}", ARDUINO_VERSION));
        base.extend(board.defines.iter().map(|define| format!("-D{}", define)));
        base.extend(
            ["-Os", "-w", "-ffunction-sections", "-fdata-sections"]
                .iter()
                .map(|flag| flag.to_string()),
        );

        let arch: &[&str] = match board.toolchain {
            Toolchain::Avr { .. } => &["-flto"],
            Toolchain::Esp32 { variant: "esp32c3" } => &[],
            Toolchain::Esp32 { .. } => &["-mlongcalls", "-mtext-section-literals"],
            Toolchain::Esp8266 => &["-mlongcalls", "-mtext-section-literals", "-falign-functions=4"],
            _ => &[],
        };

        base.extend(arch.iter().map(|flag| flag.to_string()));
        base.push(format!("-I{}", sdk.core_dir.display()));
        base.push(format!("-I{}", sdk.variant_dir.display()));

        let mut includes: Vec<_> = request
            .includes
            .iter()
            .map(|dir| format!("-I{}", dir.display()))
            .collect();

        if let Some(libraries) = &sdk.libraries_dir {
            includes.push(format!("-I{}", libraries.display()));
        }

        let standard = request
            .cpp_std
            .trim_start_matches("gnu++")
            .trim_start_matches("c++");

        let owned = |flags: &[&str]| flags.iter().map(|flag| flag.to_string()).collect::<Vec<_>>();
        let mut cpp = owned(&["-x", "c++"]);
        cpp.push(format!("-std=gnu++{}", standard));
        cpp.extend(owned(&[
            "-fpermissive",
            "-fno-exceptions",
            "-fno-threadsafe-statics",
            "-Wno-error=narrowing",
        ]));

        Flags {
            base,
            includes,
            c: owned(&["-x", "c", "-std=gnu11"]),
            cpp,
            asm: owned(&["-x", "assembler-with-cpp"]),
            toolchain: vec![sdk.version.clone()],
        }
    }

    /// Línea de opciones para un lenguaje.
    pub fn for_language(&self, language: Language, includes: bool) -> Vec<String> {
        let specific = match language {
            Language::C => &self.c,
            Language::Cpp => &self.cpp,
            Language::Asm => &self.asm,
        };

        let mut flags = self.base.clone();
        if includes {
            flags.extend(self.includes.iter().cloned());
        }

        flags.extend(specific.iter().cloned());
        flags
    }

    /// Huella de todas las opciones, incluidas las bibliotecas, y de la
    /// toolchain que las recibe.
    pub fn fingerprint(&self) -> String {
        let mut all = self.all(true);
        all.extend(&self.toolchain);
        hash_flags(&all)
    }

    fn all(&self, includes: bool) -> Vec<&String> {
        let mut all: Vec<_> = self.base.iter().chain(&self.c).chain(&self.cpp).chain(&self.asm).collect();
        if includes {
            all.extend(&self.includes);
        }

        all
    }
}

/// Una unidad de traducción lista para compilar.
#[derive(Debug)]
pub struct Unit<'a> {
    pub source: &'a Path,
    pub object: &'a Path,
    pub language: Language,
    pub flags: &'a [String],
}

/// Traductor de unidades a objetos.
pub trait Backend: Sync {
    /// Compila una unidad. No debe dejar un objeto si falla.
    fn compile(&self, unit: &Unit<'_>) -> Result<(), FlashError>;

    /// Archiva objetos en una biblioteca estática.
    fn archive(&self, archive: &Path, objects: &[PathBuf]) -> Result<(), FlashError>;
}

/// Backend real sobre una toolchain GCC cruzada.
#[derive(Debug)]
pub struct Gcc {
    cc: PathBuf,
    cxx: PathBuf,
    ar: PathBuf,
}

impl Gcc {
    pub fn new(sdk: &SdkPaths, prefix: &str) -> Self {
        let tool = |name: &str| sdk.tool(&format!("{}{}", prefix, name));

        Gcc {
            cc: tool("gcc"),
            cxx: tool("g++"),
            ar: tool("ar"),
        }
    }

    /// Primera línea de `g++ --version`, si el compilador responde.
    pub fn version(&self) -> Option<String> {
        let output = tool::run(Command::new(&self.cxx).arg("--version")).ok()?;
        if !output.status.success() {
            return None;
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(String::from)
    }
}

impl Backend for Gcc {
    fn compile(&self, unit: &Unit<'_>) -> Result<(), FlashError> {
        let compiler = match unit.language {
            Language::Cpp => &self.cxx,
            Language::C | Language::Asm => &self.cc,
        };

        let output = tool::run(
            Command::new(compiler)
                .args(unit.flags)
                .arg("-c")
                .arg(unit.source)
                .arg("-o")
                .arg(unit.object),
        )?;

        if output.status.success() {
            Ok(())
        } else {
            let _ = fs::remove_file(unit.object);
            Err(FlashError::Compile {
                output: format!("In {}:\n{}", unit.source.display(), tool::combined(&output)),
            })
        }
    }

    fn archive(&self, archive: &Path, objects: &[PathBuf]) -> Result<(), FlashError> {
        let output = tool::run(Command::new(&self.ar).arg("rcs").arg(archive).args(objects))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(FlashError::Compile {
                output: tool::combined(&output),
            })
        }
    }
}

/// Prefijo de la toolchain GCC de una tarjeta.
///
/// Las familias ARM todavía no tienen flujo propio.
pub fn prefix(board: &Board) -> Result<&'static str, FlashError> {
    match board.toolchain {
        Toolchain::Avr { .. } => Ok("avr-"),
        Toolchain::Esp32 { variant: "esp32c3" } => Ok("riscv32-esp-elf-"),
        Toolchain::Esp32 { variant: "esp32s2" } => Ok("xtensa-esp32s2-elf-"),
        Toolchain::Esp32 { .. } => Ok("xtensa-esp32-elf-"),
        Toolchain::Esp8266 => Ok("xtensa-lx106-elf-"),
        Toolchain::Sam { .. } | Toolchain::Rp2040 => Err(FlashError::Unsupported {
            what: format!("compiling for {} ({})", board.name, board.arch()),
        }),
    }
}

/// Compila y enlaza un sketch.
pub fn compile(request: &Request, board: &Board, options: LinkOptions) -> Result<Build, FlashError> {
    let prefix = prefix(board)?;
    let sdk = sdk::resolve(board)?;

    fs::create_dir_all(&request.build_dir).map_err(FlashError::io(&request.build_dir))?;

    let sources = sources(request)?;
    let mut flags = Flags::new(board, &sdk, request);
    let backend = Gcc::new(&sdk, prefix);
    flags.toolchain.extend(backend.version());

    let core_dir = request.build_dir.join("core");
    let core = build_core(&backend, &flags, &sdk, &core_dir, &core_key(board, &sdk, &flags))?;
    let units = compile_units(&backend, &flags, &sources, &request.build_dir.join("sketch"))?;

    let firmware = link::link(board, &sdk, prefix, &units.objects, &core, request, options)?;
    Ok(Build { units, firmware })
}

/// Fuentes del sketch y de las bibliotecas incluidas, en orden estable.
pub fn sources(request: &Request) -> Result<Vec<PathBuf>, FlashError> {
    let sketch = collect(&request.sketch_dir, SOURCE_DEPTH, false);
    if sketch.is_empty() {
        return Err(FlashError::NoSources(request.sketch_dir.clone()));
    }

    let mut sources = sketch;
    for include in &request.includes {
        sources.extend(collect(include, SOURCE_DEPTH, false));
    }

    sources.dedup();
    Ok(sources)
}

/// Unidades compiladas del sketch.
#[derive(Debug, Default)]
pub struct Units {
    pub objects: Vec<PathBuf>,
    pub compiled: usize,
    pub cached: usize,
}

enum Outcome {
    Cached(PathBuf),
    Fresh(PathBuf, Fingerprint),
}

/// Compila en paralelo las unidades que no estén al día en el caché.
///
/// El manifiesto se actualiza una sola vez, después de que terminan
/// todas las compilaciones. Una unidad que falla no invalida las que sí
/// compilaron en la misma pasada.
pub fn compile_units<B: Backend>(
    backend: &B,
    flags: &Flags,
    sources: &[PathBuf],
    dir: &Path,
) -> Result<Units, FlashError> {
    fs::create_dir_all(dir).map_err(FlashError::io(dir))?;

    let manifest = Manifest::load(dir);
    let fingerprint = flags.fingerprint();

    let outcomes: Vec<Result<Outcome, FlashError>> = sources
        .par_iter()
        .map(|source| {
            let current = Fingerprint::of(source, &fingerprint)?;
            if let Some(object) = manifest.lookup(source, &current) {
                debug!(source = %source.display(), "cached");
                return Ok(Outcome::Cached(object.to_owned()));
            }

            let language = Language::of(source).unwrap_or(Language::Cpp);
            let object = object_path(dir, source);
            let flags = flags.for_language(language, true);

            backend.compile(&Unit {
                source,
                object: &object,
                language,
                flags: &flags,
            })?;

            info!(source = %source.display(), "compiled");
            Ok(Outcome::Fresh(object, current))
        })
        .collect();

    let mut manifest = manifest;
    let mut units = Units::default();
    let mut failures = Vec::new();

    for (source, outcome) in sources.iter().zip(outcomes) {
        match outcome {
            Ok(Outcome::Cached(object)) => {
                units.cached += 1;
                units.objects.push(object);
            }

            Ok(Outcome::Fresh(object, fingerprint)) => {
                manifest.record(source, fingerprint, object.clone());
                units.compiled += 1;
                units.objects.push(object);
            }

            Err(error) => failures.push(error),
        }
    }

    manifest.save(dir)?;
    info!(compiled = units.compiled, cached = units.cached, "sketch units done");

    let mut outputs = Vec::new();
    for failure in failures {
        match failure {
            FlashError::Compile { output } => outputs.push(output),
            other => return Err(other),
        }
    }

    if outputs.is_empty() {
        Ok(units)
    } else {
        Err(FlashError::Compile {
            output: outputs.join("\n\n"),
        })
    }
}

/// Llave del archivo del core: versión del SDK, MCU y opciones.
pub fn core_key(board: &Board, sdk: &SdkPaths, flags: &Flags) -> String {
    let mcu = match board.toolchain {
        Toolchain::Avr { mcu, .. } | Toolchain::Sam { mcu, .. } => mcu,
        Toolchain::Esp32 { variant } => variant,
        Toolchain::Esp8266 => "esp8266",
        Toolchain::Rp2040 => "rp2040",
    };

    let mut parts = vec![sdk.version.clone(), mcu.to_owned()];
    parts.extend(flags.all(false).into_iter().cloned());
    parts.extend(flags.toolchain.iter().cloned());

    hash_flags(&parts)
}

/// Compila y archiva el core si su llave cambió.
///
/// El archivo queda en `<dir>/core.a` junto a un centinela `.core-key`
/// con la llave con la que se construyó.
pub fn build_core<B: Backend>(
    backend: &B,
    flags: &Flags,
    sdk: &SdkPaths,
    dir: &Path,
    key: &str,
) -> Result<PathBuf, FlashError> {
    let archive = dir.join("core.a");
    let sentinel = dir.join(".core-key");

    let current = fs::read_to_string(&sentinel).ok();
    if archive.is_file() && current.as_deref().map(str::trim) == Some(key) {
        debug!(archive = %archive.display(), "core archive up to date");
        return Ok(archive);
    }

    fs::create_dir_all(dir).map_err(FlashError::io(dir))?;

    // Un core a medio reconstruir nunca debe parecer vigente
    let _ = fs::remove_file(&sentinel);
    let _ = fs::remove_file(&archive);

    let mut sources = collect(&sdk.core_dir, SOURCE_DEPTH, true);
    sources.extend(collect(&sdk.variant_dir, 1, true));

    info!(units = sources.len(), version = %sdk.version, "building core");
    let objects = sources
        .par_iter()
        .map(|source| {
            let language = Language::of(source).unwrap_or(Language::Cpp);
            let object = object_path(dir, source);
            let flags = flags.for_language(language, false);

            backend.compile(&Unit {
                source,
                object: &object,
                language,
                flags: &flags,
            })?;

            Ok(object)
        })
        .collect::<Result<Vec<_>, FlashError>>()?;

    backend.archive(&archive, &objects)?;
    fs::write(&sentinel, key).map_err(FlashError::io(&sentinel))?;

    Ok(archive)
}

/// Fuentes compilables bajo un directorio, ordenadas.
fn collect(dir: &Path, depth: usize, assembly: bool) -> Vec<PathBuf> {
    let mut sources: Vec<_> = WalkDir::new(dir)
        .max_depth(depth)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| match Language::of(path) {
            Some(Language::Asm) => assembly,
            Some(_) => true,
            None => false,
        })
        .collect();

    sources.sort();
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };
    use tempfile::TempDir;

    /// Backend que copia la fuente al objeto y falla ante `#error`.
    #[derive(Default)]
    struct Fake {
        compiles: AtomicUsize,
        archives: AtomicUsize,
        flags: Mutex<Vec<Vec<String>>>,
    }

    impl Fake {
        fn compiles(&self) -> usize {
            self.compiles.load(Ordering::SeqCst)
        }
    }

    impl Backend for Fake {
        fn compile(&self, unit: &Unit<'_>) -> Result<(), FlashError> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            self.flags.lock().unwrap().push(unit.flags.to_vec());

            let text = fs::read_to_string(unit.source).unwrap();
            if text.contains("#error") {
                return Err(FlashError::Compile {
                    output: format!("In {}:\nerror directive", unit.source.display()),
                });
            }

            fs::write(unit.object, text).unwrap();
            Ok(())
        }

        fn archive(&self, archive: &Path, objects: &[PathBuf]) -> Result<(), FlashError> {
            self.archives.fetch_add(1, Ordering::SeqCst);
            fs::write(archive, format!("{}", objects.len())).unwrap();
            Ok(())
        }
    }

    fn sdk(root: &Path) -> SdkPaths {
        SdkPaths {
            root: root.to_owned(),
            core_dir: root.join("cores/arduino"),
            variant_dir: root.join("variants/standard"),
            toolchain_bin: None,
            libraries_dir: None,
            tools_dir: None,
            version: String::from("1.8.6"),
        }
    }

    fn request(root: &Path) -> Request {
        Request {
            sketch_dir: root.join("sketch"),
            build_dir: root.join("build"),
            name: String::from("blink"),
            cpp_std: String::from("c++11"),
            includes: vec![],
        }
    }

    fn write(path: &Path, text: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn uno_flags(root: &Path) -> Flags {
        Flags::new(Board::find("uno").unwrap(), &sdk(root), &request(root))
    }

    #[test]
    fn avr_flags_follow_the_board() {
        let temp = TempDir::new().unwrap();
        let flags = uno_flags(temp.path()).for_language(Language::Cpp, true);

        for expected in [
            "-mmcu=atmega328p",
            "-DF_CPU=16000000L",
            "-DARDUINO=10819",
            "-DARDUINO_AVR_UNO",
            "-DARDUINO_ARCH_AVR",
            "-flto",
            "-std=gnu++11",
            "-fno-exceptions",
        ] {
            assert!(flags.iter().any(|flag| flag == expected), "missing {}", expected);
        }
    }

    #[test]
    fn esp_flags_depend_on_the_core() {
        let temp = TempDir::new().unwrap();
        let flags_for = |id: &str| {
            Flags::new(Board::find(id).unwrap(), &sdk(temp.path()), &request(temp.path()))
                .for_language(Language::C, true)
        };

        let esp8266 = flags_for("esp8266");
        assert!(esp8266.contains(&String::from("-mlongcalls")));
        assert!(esp8266.contains(&String::from("-falign-functions=4")));
        assert!(esp8266.contains(&String::from("-std=gnu11")));

        let esp32c3 = flags_for("esp32c3");
        assert!(!esp32c3.contains(&String::from("-mlongcalls")));
        assert!(!esp32c3.iter().any(|flag| flag.starts_with("-mmcu")));
    }

    #[test]
    fn arm_boards_are_not_supported_yet() {
        let error = prefix(Board::find("due").unwrap()).unwrap_err();
        assert_eq!(error.to_string(), "compiling for Arduino Due (sam) is not supported yet");
        assert!(prefix(Board::find("pico").unwrap()).is_err());
        assert_eq!(prefix(Board::find("nano").unwrap()).unwrap(), "avr-");
    }

    #[test]
    fn collects_sketch_and_library_sources() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(&root.join("sketch/blink.cpp"), "");
        write(&root.join("sketch/legacy.ino"), "");
        write(&root.join("sketch/blink.h"), "");
        write(&root.join("libs/dht/dht.c"), "");
        write(&root.join("libs/dht/dht.h"), "");

        let mut request = request(root);
        request.includes.push(root.join("libs"));

        let names: Vec<_> = sources(&request)
            .unwrap()
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["blink.cpp", "legacy.ino", "dht.c"]);
    }

    #[test]
    fn empty_sketches_are_rejected() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("sketch")).unwrap();

        let error = sources(&request(temp.path())).unwrap_err();
        assert!(matches!(error, FlashError::NoSources(_)));
    }

    #[test]
    fn unchanged_sketches_compile_nothing_the_second_time() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(&root.join("sketch/a.cpp"), "int a;");
        write(&root.join("sketch/b.cpp"), "int b;");
        write(&root.join("sketch/c.c"), "int c;");

        let backend = Fake::default();
        let flags = uno_flags(root);
        let sources = sources(&request(root)).unwrap();
        let dir = root.join("build/sketch");

        let first = compile_units(&backend, &flags, &sources, &dir).unwrap();
        assert_eq!((first.compiled, first.cached), (3, 0));

        let second = compile_units(&backend, &flags, &sources, &dir).unwrap();
        assert_eq!((second.compiled, second.cached), (0, 3));
        assert_eq!(backend.compiles(), 3);
        assert_eq!(first.objects, second.objects);
    }

    #[test]
    fn edits_recompile_only_the_edited_unit() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(&root.join("sketch/a.cpp"), "int a;");
        write(&root.join("sketch/b.cpp"), "int b;");

        let backend = Fake::default();
        let flags = uno_flags(root);
        let sources = sources(&request(root)).unwrap();
        let dir = root.join("build/sketch");

        compile_units(&backend, &flags, &sources, &dir).unwrap();
        write(&root.join("sketch/b.cpp"), "int b = 2;");

        let units = compile_units(&backend, &flags, &sources, &dir).unwrap();
        assert_eq!((units.compiled, units.cached), (1, 1));
    }

    #[test]
    fn toolchain_upgrades_invalidate_the_cache() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(&root.join("sketch/a.cpp"), "int a;");
        write(&root.join("sketch/b.cpp"), "int b;");

        let backend = Fake::default();
        let sources = sources(&request(root)).unwrap();
        let dir = root.join("build/sketch");

        let mut flags = uno_flags(root);
        flags.toolchain.push(String::from("avr-gcc (GCC) 7.3.0"));
        compile_units(&backend, &flags, &sources, &dir).unwrap();

        flags.toolchain = vec![String::from("1.8.7"), String::from("avr-gcc (GCC) 7.3.0")];
        let units = compile_units(&backend, &flags, &sources, &dir).unwrap();
        assert_eq!((units.compiled, units.cached), (2, 0));

        flags.toolchain[1] = String::from("avr-gcc (GCC) 12.2.0");
        let units = compile_units(&backend, &flags, &sources, &dir).unwrap();
        assert_eq!((units.compiled, units.cached), (2, 0));

        let units = compile_units(&backend, &flags, &sources, &dir).unwrap();
        assert_eq!((units.compiled, units.cached), (0, 2));
        assert_eq!(backend.compiles(), 6);
    }

    #[test]
    fn the_core_key_tracks_the_compiler() {
        let temp = TempDir::new().unwrap();
        let sdk = sdk(temp.path());
        let uno = Board::find("uno").unwrap();

        let mut flags = uno_flags(temp.path());
        let before = core_key(uno, &sdk, &flags);
        flags.toolchain.push(String::from("avr-gcc (GCC) 7.3.0"));

        assert_ne!(core_key(uno, &sdk, &flags), before);
    }

    #[test]
    fn failures_keep_the_units_that_did_compile() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(&root.join("sketch/good.cpp"), "int good;");
        write(&root.join("sketch/bad.cpp"), "#error nope");

        let backend = Fake::default();
        let flags = uno_flags(root);
        let sources = sources(&request(root)).unwrap();
        let dir = root.join("build/sketch");

        let error = compile_units(&backend, &flags, &sources, &dir).unwrap_err();
        assert!(error.to_string().contains("bad.cpp"));
        assert_eq!(Manifest::load(&dir).len(), 1);

        write(&root.join("sketch/bad.cpp"), "int fixed;");
        let units = compile_units(&backend, &flags, &sources, &dir).unwrap();
        assert_eq!((units.compiled, units.cached), (1, 1));
    }

    #[test]
    fn the_core_is_archived_once_per_key() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(&root.join("cores/arduino/wiring.c"), "int w;");
        write(&root.join("cores/arduino/main.cpp"), "int m;");
        write(&root.join("cores/arduino/wiring_pulse.S"), "nop");
        write(&root.join("cores/arduino/Arduino.h"), "");

        let backend = Fake::default();
        let sdk = sdk(root);
        let flags = uno_flags(root);
        let key = core_key(Board::find("uno").unwrap(), &sdk, &flags);
        let dir = root.join("build/core");

        let archive = build_core(&backend, &flags, &sdk, &dir, &key).unwrap();
        assert_eq!(archive, dir.join("core.a"));
        assert_eq!(fs::read_to_string(dir.join(".core-key")).unwrap(), key);
        assert_eq!(backend.compiles(), 3);

        build_core(&backend, &flags, &sdk, &dir, &key).unwrap();
        assert_eq!(backend.compiles(), 3);
        assert_eq!(backend.archives.load(Ordering::SeqCst), 1);

        build_core(&backend, &flags, &sdk, &dir, "another-sdk").unwrap();
        assert_eq!(backend.compiles(), 6);
    }

    #[test]
    fn library_includes_do_not_reach_the_core() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(&root.join("cores/arduino/main.cpp"), "int m;");

        let mut request = request(root);
        request.includes.push(root.join("libs"));

        let sdk = sdk(root);
        let flags = Flags::new(Board::find("uno").unwrap(), &sdk, &request);
        let backend = Fake::default();

        build_core(&backend, &flags, &sdk, &root.join("build/core"), "key").unwrap();

        let include = format!("-I{}", root.join("libs").display());
        let seen = backend.flags.lock().unwrap();
        assert!(seen.iter().all(|flags| !flags.contains(&include)));
        assert_eq!(
            core_key(Board::find("uno").unwrap(), &sdk, &flags),
            core_key(Board::find("uno").unwrap(), &sdk, &uno_flags(root))
        );
    }
}
