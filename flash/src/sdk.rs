//! Localización del SDK de Arduino.
//!
//! Se prueba una lista fija de raíces, en orden. La primera raíz con una
//! estructura válida para la arquitectura de la tarjeta gana. Si ninguna
//! sirve, el error enumera todas las rutas probadas; este módulo nunca
//! instala nada.

use std::{
    env,
    fs,
    path::{Path, PathBuf},
};

use tracing::debug;
use tsuki::{
    board::{Board, Toolchain},
    pkgmap::compare_versions,
};

use crate::error::FlashError;

/// Variable de entorno que fuerza una raíz de SDK.
pub const SDK_ROOT_VAR: &str = "TSUKI_SDK_ROOT";

/// Rutas de un SDK resuelto para una tarjeta.
#[derive(Clone, Debug)]
pub struct SdkPaths {
    /// Raíz en la que se encontró el SDK.
    pub root: PathBuf,

    /// Directorio con `Arduino.h` y las fuentes del core.
    pub core_dir: PathBuf,

    /// Directorio con `pins_arduino.h`.
    pub variant_dir: PathBuf,

    /// Binarios del compilador. Si no existe, se usa `PATH`.
    pub toolchain_bin: Option<PathBuf>,

    /// Bibliotecas instaladas junto al SDK.
    pub libraries_dir: Option<PathBuf>,

    /// Herramientas auxiliares (`avrdude`, `esptool_py`), por versión.
    pub tools_dir: Option<PathBuf>,

    pub version: String,
}

impl SdkPaths {
    /// Ruta a un ejecutable de la toolchain, o su nombre desnudo si no
    /// está en el SDK.
    pub fn tool(&self, name: &str) -> PathBuf {
        match &self.toolchain_bin {
            Some(bin) if bin.join(name).is_file() => bin.join(name),
            _ => PathBuf::from(name),
        }
    }

    /// Versión más alta instalada de una herramienta auxiliar.
    pub fn aux_tool(&self, name: &str) -> Option<PathBuf> {
        let dir = self.tools_dir.as_ref()?.join(name);
        highest_version(&dir).map(|version| dir.join(version))
    }
}

/// Ejecutable de esptool: el del SDK si existe, si no el de `PATH`.
pub fn esptool(sdk: Option<&SdkPaths>) -> PathBuf {
    let bundled = sdk.and_then(|sdk| sdk.aux_tool("esptool_py")).and_then(|dir| {
        ["esptool", "esptool.py", "esptool.exe"]
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    });

    bundled.unwrap_or_else(|| PathBuf::from("esptool.py"))
}

/// Estructura de directorios esperada en una raíz candidata.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Layout {
    /// Caché de paquetes de arduino-cli o IDE 2.x.
    Packages,

    /// IDE 1.x, `hardware/arduino/<arch>`.
    Legacy,

    /// Override explícito: un caché de paquetes o un directorio de
    /// hardware con `cores/` y `variants/` directamente.
    Override,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub root: PathBuf,
    pub layout: Layout,
}

/// Raíces a probar, en orden de prioridad.
pub fn candidates() -> Vec<Candidate> {
    let mut list = Vec::new();
    let mut push = |root: PathBuf, layout| list.push(Candidate { root, layout });

    if let Some(root) = env::var_os(SDK_ROOT_VAR).filter(|root| !root.is_empty()) {
        push(PathBuf::from(root), Layout::Override);
    }

    if let Some(home) = dirs::home_dir() {
        push(home.join(".arduino15"), Layout::Packages);
        push(home.join("snap/arduino/current/.arduino15"), Layout::Packages);
    }

    if let Some(xdg) = env::var_os("XDG_DATA_HOME").filter(|xdg| !xdg.is_empty()) {
        push(PathBuf::from(xdg).join("arduino15"), Layout::Packages);
    }

    if cfg!(target_os = "macos") {
        if let Some(home) = dirs::home_dir() {
            push(home.join("Library/Arduino15"), Layout::Packages);
        }
    }

    if cfg!(windows) {
        if let Some(local) = env::var_os("LOCALAPPDATA") {
            push(PathBuf::from(local).join("Arduino15"), Layout::Packages);
        }
    }

    for system in ["/usr/share/arduino", "/usr/local/share/arduino", "/opt/arduino"] {
        push(PathBuf::from(system), Layout::Legacy);
    }

    list
}

/// Resuelve el SDK de una tarjeta con las raíces por defecto.
pub fn resolve(board: &Board) -> Result<SdkPaths, FlashError> {
    resolve_in(board, &candidates())
}

/// Resuelve el SDK de una tarjeta entre las raíces dadas.
pub fn resolve_in(board: &Board, candidates: &[Candidate]) -> Result<SdkPaths, FlashError> {
    for candidate in candidates {
        let found = match candidate.layout {
            Layout::Packages => scan_packages(&candidate.root, board),
            Layout::Legacy => scan_legacy(&candidate.root, board),
            Layout::Override if candidate.root.join("packages").is_dir() => {
                scan_packages(&candidate.root, board)
            }
            Layout::Override => scan_hardware(&candidate.root, board),
        };

        match found {
            Some(paths) => {
                debug!(root = %paths.root.display(), version = %paths.version, "SDK found");
                return Ok(paths);
            }

            None => debug!(root = %candidate.root.display(), "no SDK here"),
        }
    }

    Err(FlashError::SdkNotFound {
        arch: board.arch().to_owned(),
        probed: candidates.iter().map(|candidate| candidate.root.clone()).collect(),
    })
}

/// Nombre del subdirectorio de `cores/`.
fn core_name(board: &Board) -> &'static str {
    match board.toolchain {
        Toolchain::Avr { .. } | Toolchain::Sam { .. } => "arduino",
        Toolchain::Rp2040 => "rp2040",
        Toolchain::Esp32 { .. } => "esp32",
        Toolchain::Esp8266 => "esp8266",
    }
}

/// Paquete de `tools/` con el compilador, como `(vendedor, nombre)`.
fn compiler_package(board: &Board) -> (&'static str, &'static str) {
    match board.toolchain {
        Toolchain::Avr { .. } => ("arduino", "avr-gcc"),
        Toolchain::Sam { .. } => ("arduino", "arm-none-eabi-gcc"),
        Toolchain::Rp2040 => ("rp2040", "pqt-gcc"),
        Toolchain::Esp32 { variant: "esp32c3" } => ("esp32", "riscv32-esp-elf-gcc"),
        Toolchain::Esp32 { variant } => match variant {
            "esp32s2" => ("esp32", "xtensa-esp32s2-elf-gcc"),
            _ => ("esp32", "xtensa-esp32-elf-gcc"),
        },
        Toolchain::Esp8266 => ("esp8266", "xtensa-lx106-elf-gcc"),
    }
}

/// `packages/<vendor>/hardware/<arch>/<version>/`
fn scan_packages(root: &Path, board: &Board) -> Option<SdkPaths> {
    let vendor = root.join("packages").join(board.vendor());
    let hardware = vendor.join("hardware").join(board.arch());
    let version = highest_version(&hardware)?;
    let sdk = hardware.join(&version);

    let core_dir = sdk.join("cores").join(core_name(board));
    if !core_dir.is_dir() {
        return None;
    }

    let (tool_vendor, tool) = compiler_package(board);
    let tools = root.join("packages").join(tool_vendor).join("tools");
    let toolchain_bin = highest_version(&tools.join(tool))
        .map(|tool_version| tools.join(tool).join(tool_version).join("bin"))
        .filter(|bin| bin.is_dir());

    Some(SdkPaths {
        root: root.to_owned(),
        variant_dir: variant_dir(&sdk, board),
        core_dir,
        toolchain_bin,
        libraries_dir: existing(root.join("libraries")),
        tools_dir: existing(vendor.join("tools")),
        version,
    })
}

/// `hardware/arduino/<arch>/`, solo AVR.
fn scan_legacy(root: &Path, board: &Board) -> Option<SdkPaths> {
    if !matches!(board.toolchain, Toolchain::Avr { .. }) {
        return None;
    }

    let mut paths = scan_hardware(&root.join("hardware").join("arduino").join("avr"), board)?;
    let tools = root.join("hardware").join("tools");

    paths.root = root.to_owned();
    paths.toolchain_bin = existing(tools.join("avr").join("bin"));
    paths.libraries_dir = existing(root.join("libraries"));
    paths.tools_dir = existing(tools);
    paths.version = fs::read_to_string(root.join("lib").join("version.txt"))
        .map(|version| version.trim().to_owned())
        .unwrap_or_else(|_| String::from("1.x"));

    Some(paths)
}

/// Un directorio de hardware con `cores/` y `variants/` a la vista.
fn scan_hardware(dir: &Path, board: &Board) -> Option<SdkPaths> {
    let core_dir = dir.join("cores").join(core_name(board));
    if !core_dir.is_dir() {
        return None;
    }

    let version = fs::read_to_string(dir.join("version.txt"))
        .map(|version| version.trim().to_owned())
        .unwrap_or_else(|_| String::from("custom"));

    Some(SdkPaths {
        root: dir.to_owned(),
        variant_dir: variant_dir(dir, board),
        core_dir,
        toolchain_bin: existing(dir.join("bin")),
        libraries_dir: existing(dir.join("libraries")),
        tools_dir: existing(dir.join("tools")),
        version,
    })
}

/// Las variantes ausentes caen a `standard`.
fn variant_dir(sdk: &Path, board: &Board) -> PathBuf {
    let variants = sdk.join("variants");
    let wanted = variants.join(board.variant);

    if wanted.is_dir() {
        wanted
    } else {
        variants.join("standard")
    }
}

fn existing(dir: PathBuf) -> Option<PathBuf> {
    Some(dir).filter(|dir| dir.is_dir())
}

/// Nombre del subdirectorio con la versión más alta.
fn highest_version(dir: &Path) -> Option<String> {
    fs::read_dir(dir)
        .ok()?
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .max_by(|a, b| compare_versions(a, b))
}
