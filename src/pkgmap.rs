//! Mapas de paquetes externos.
//!
//! Cada biblioteca externa se describe con un `tsukilib.toml`, el cual
//! asocia funciones, constantes y tipos de Go con plantillas de C++:
//!
//! ```toml
//! [package]
//! name = "ws2812"
//! version = "1.0.0"
//! cpp_header = "Adafruit_NeoPixel.h"
//! arduino_lib = "Adafruit NeoPixel"
//! aliases = ["neopixel"]
//!
//! [[function]]
//! go = "Show"
//! cpp = "{0}.show()"
//!
//! [[constant]]
//! go = "GRB"
//! cpp = "NEO_GRB"
//!
//! [[type]]
//! go = "Strip"
//! cpp = "Adafruit_NeoPixel"
//! ```
//!
//! Los mapas se buscan en `<libs>/<nombre>/<versión>/tsukilib.toml`,
//! eligiendo la versión más alta, o directamente en
//! `<libs>/<nombre>/tsukilib.toml`.

use std::{
    cmp::Ordering,
    collections::BTreeSet,
    fs, io,
    path::{Path, PathBuf},
};

use rustc_hash::FxHashMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::{
    error::{Class, Classify},
    intrinsics,
};

/// Nombre del archivo descriptor dentro del directorio de un paquete.
pub const MANIFEST: &str = "tsukilib.toml";

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed package map {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("package map {}: template for `{name}` skips placeholder {{{missing}}}", .path.display())]
    PlaceholderGap {
        path: PathBuf,
        name: String,
        missing: usize,
    },

    #[error("package map {}: `{name}` is mapped more than once", .path.display())]
    Duplicate { path: PathBuf, name: String },

    #[error("missing package maps under {}: {}", .libs_dir.display(), .names.join(", "))]
    Missing { libs_dir: PathBuf, names: Vec<String> },

    #[error("import name `{name}` is claimed by both `{first}` and `{second}`")]
    Collision {
        name: String,
        first: String,
        second: String,
    },
}

impl Classify for LoadError {
    fn class(&self) -> Class {
        Class::Config
    }
}

/// Trozo de una plantilla.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Slot(usize),

    /// Todos los argumentos a partir del primer espacio no posicional.
    Rest,
}

/// Plantilla de C++ con marcadores `{N}`, `{self}` y `{args}`.
///
/// `{self}` equivale a `{0}`, el receptor de un método. Cualquier otro
/// texto entre llaves se conserva literalmente.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    pieces: Vec<Piece>,
    slots: usize,
    rest: bool,
}

/// La cantidad de argumentos no coincide con los marcadores.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Arity {
    pub expected: usize,
    pub variadic: bool,
    pub found: usize,
}

impl Template {
    pub fn parse(text: &str) -> Self {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut slots = 0;
        let mut rest = false;
        let mut remaining = text;

        while let Some(open) = remaining.find('{') {
            literal.push_str(&remaining[..open]);
            let after = &remaining[open + 1..];

            let marker = after.find('}').and_then(|close| {
                let inner = &after[..close];
                let piece = match inner {
                    "self" => Piece::Slot(0),
                    "args" => Piece::Rest,
                    _ if !inner.is_empty() && inner.bytes().all(|byte| byte.is_ascii_digit()) => {
                        Piece::Slot(inner.parse().ok()?)
                    }

                    _ => return None,
                };

                Some((piece, close))
            });

            match marker {
                Some((piece, close)) => {
                    if !literal.is_empty() {
                        pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                    }

                    match piece {
                        Piece::Slot(index) => slots = slots.max(index + 1),
                        Piece::Rest => rest = true,
                        Piece::Literal(_) => (),
                    }

                    pieces.push(piece);
                    remaining = &after[close + 1..];
                }

                None => {
                    literal.push('{');
                    remaining = after;
                }
            }
        }

        literal.push_str(remaining);
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }

        Template {
            pieces,
            slots,
            rest,
        }
    }

    /// Cantidad de argumentos posicionales, incluyendo al receptor.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Indica si la plantilla absorbe argumentos extra con `{args}`.
    pub fn is_variadic(&self) -> bool {
        self.rest
    }

    /// Primer índice posicional que no aparece, si los marcadores no son
    /// contiguos desde cero.
    pub fn gap(&self) -> Option<usize> {
        let used: BTreeSet<_> = self
            .pieces
            .iter()
            .filter_map(|piece| match piece {
                Piece::Slot(index) => Some(*index),
                _ => None,
            })
            .collect();

        (0..self.slots).find(|index| !used.contains(index))
    }

    /// Sustituye los argumentos ya generados.
    pub fn render(&self, args: &[String]) -> Result<String, Arity> {
        let fits = if self.rest {
            args.len() >= self.slots
        } else {
            args.len() == self.slots
        };

        if !fits {
            return Err(Arity {
                expected: self.slots,
                variadic: self.rest,
                found: args.len(),
            });
        }

        let mut output = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => output.push_str(text),
                Piece::Slot(index) => output.push_str(&args[*index]),
                Piece::Rest => output.push_str(&args[self.slots..].join(", ")),
            }
        }

        Ok(output)
    }
}

#[derive(Deserialize)]
struct Manifest {
    package: ManifestPackage,

    #[serde(default, rename = "function")]
    functions: Vec<Mapping>,

    #[serde(default, rename = "constant")]
    constants: Vec<Mapping>,

    #[serde(default, rename = "type")]
    types: Vec<Mapping>,

    #[serde(default)]
    aliases: Vec<String>,
}

#[derive(Deserialize)]
struct ManifestPackage {
    name: String,

    #[serde(default)]
    version: Option<String>,

    #[serde(default)]
    description: Option<String>,

    #[serde(default, alias = "header")]
    cpp_header: Option<String>,

    #[serde(default, alias = "native_library")]
    arduino_lib: Option<String>,

    #[serde(default)]
    aliases: Vec<String>,
}

#[derive(Deserialize)]
struct Mapping {
    go: String,
    cpp: String,
}

/// Descriptor cargado de un paquete externo.
#[derive(Debug)]
pub struct PackageMap {
    name: String,
    version: Option<String>,
    description: Option<String>,
    header: Option<String>,
    native_library: Option<String>,
    aliases: Vec<String>,
    functions: FxHashMap<String, Template>,
    constants: FxHashMap<String, String>,
    types: FxHashMap<String, String>,
    path: PathBuf,
}

impl PackageMap {
    /// Carga un descriptor desde un archivo.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_owned(),
            source,
        })?;

        Self::from_toml(&text, path)
    }

    /// Interpreta un descriptor. La ruta solo se usa en mensajes de error.
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, LoadError> {
        let manifest: Manifest = toml::from_str(text).map_err(|source| LoadError::Malformed {
            path: path.to_owned(),
            source,
        })?;

        let duplicate = |name: &str| LoadError::Duplicate {
            path: path.to_owned(),
            name: name.to_owned(),
        };

        let mut functions = FxHashMap::default();
        for Mapping { go, cpp } in manifest.functions {
            let template = Template::parse(&cpp);
            if let Some(missing) = template.gap() {
                return Err(LoadError::PlaceholderGap {
                    path: path.to_owned(),
                    name: go,
                    missing,
                });
            }

            if functions.contains_key(&go) {
                return Err(duplicate(&go));
            }

            functions.insert(go, template);
        }

        let mut constants = FxHashMap::default();
        for Mapping { go, cpp } in manifest.constants {
            if functions.contains_key(&go) || constants.insert(go.clone(), cpp).is_some() {
                return Err(duplicate(&go));
            }
        }

        let mut types = FxHashMap::default();
        for Mapping { go, cpp } in manifest.types {
            if types.insert(go.clone(), cpp).is_some() {
                return Err(duplicate(&go));
            }
        }

        let ManifestPackage {
            name,
            version,
            description,
            cpp_header,
            arduino_lib,
            aliases,
        } = manifest.package;

        let mut aliases: Vec<_> = aliases.into_iter().chain(manifest.aliases).collect();
        aliases.sort();
        aliases.dedup();

        Ok(PackageMap {
            name,
            version,
            description,
            header: cpp_header,
            native_library: arduino_lib,
            aliases,
            functions,
            constants,
            types,
            path: path.to_owned(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Encabezado de C++ que se debe incluir.
    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    /// Biblioteca nativa de Arduino que provee la implementación.
    pub fn native_library(&self) -> Option<&str> {
        self.native_library.as_deref()
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn function(&self, name: &str) -> Option<&Template> {
        self.functions.get(name)
    }

    pub fn constant(&self, name: &str) -> Option<&str> {
        self.constants.get(name).map(String::as_str)
    }

    pub fn typ(&self, name: &str) -> Option<&str> {
        self.types.get(name).map(String::as_str)
    }

    /// Nombres de funciones y constantes, para sugerencias.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.functions
            .keys()
            .chain(self.constants.keys())
            .map(String::as_str)
    }

    fn import_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Conjunto de mapas activos en una ejecución, indexados por nombre de
/// importación.
#[derive(Debug, Default)]
pub struct PackageSet {
    packages: Vec<PackageMap>,
    by_name: FxHashMap<String, usize>,
}

impl PackageSet {
    /// Indexa los mapas por nombre y alias.
    ///
    /// Un nombre reclamado por dos mapas, o por un mapa y un paquete
    /// intrínseco, es un error de configuración. El primer mapa conserva
    /// el nombre para que la generación pueda continuar y reportar más
    /// errores.
    pub fn new(packages: Vec<PackageMap>) -> (Self, Vec<LoadError>) {
        let mut by_name = FxHashMap::default();
        let mut collisions = Vec::new();

        for (index, package) in packages.iter().enumerate() {
            for name in package.import_names() {
                if intrinsics::package(name).is_some() {
                    collisions.push(LoadError::Collision {
                        name: name.to_owned(),
                        first: String::from("built-in"),
                        second: package.name.clone(),
                    });

                    continue;
                }

                match by_name.get(name) {
                    Some(&other) if other != index => {
                        let other: &PackageMap = &packages[other];
                        collisions.push(LoadError::Collision {
                            name: name.to_owned(),
                            first: other.name.clone(),
                            second: package.name.clone(),
                        });
                    }

                    Some(_) => (),
                    None => {
                        by_name.insert(name.to_owned(), index);
                    }
                }
            }
        }

        (PackageSet { packages, by_name }, collisions)
    }

    /// Busca un mapa por nombre de paquete o alias.
    pub fn get(&self, name: &str) -> Option<&PackageMap> {
        self.by_name.get(name).map(|&index| &self.packages[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageMap> {
        self.packages.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Carga los mapas declarados desde un directorio de bibliotecas.
///
/// Todos los paquetes faltantes se reportan en un único error.
pub fn load_packages(libs_dir: &Path, names: &[String]) -> Result<Vec<PackageMap>, LoadError> {
    let mut found = Vec::new();
    let mut missing = Vec::new();

    for name in names {
        match locate(libs_dir, name)? {
            Some(package) => found.push(package),
            None => missing.push(name.clone()),
        }
    }

    if !missing.is_empty() {
        return Err(LoadError::Missing {
            libs_dir: libs_dir.to_owned(),
            names: missing,
        });
    }

    Ok(found)
}

/// Carga todos los paquetes instalados, en orden de directorio.
///
/// Un directorio de bibliotecas inexistente equivale a uno vacío.
pub fn load_installed(libs_dir: &Path) -> Result<Vec<PackageMap>, LoadError> {
    let mut dirs: Vec<_> = match fs::read_dir(libs_dir) {
        Ok(entries) => entries.flatten().map(|entry| entry.path()).filter(|path| path.is_dir()).collect(),
        Err(_) => return Ok(Vec::new()),
    };

    dirs.sort();

    let mut packages = Vec::new();
    for dir in dirs {
        if let Some(path) = manifest_in(&dir) {
            debug!("installed package at {}", path.display());
            packages.push(PackageMap::load(&path)?);
        }
    }

    Ok(packages)
}

/// Encuentra y carga un paquete, primero por nombre y luego por alias.
fn locate(libs_dir: &Path, name: &str) -> Result<Option<PackageMap>, LoadError> {
    if let Some(path) = manifest_in(&libs_dir.join(name)) {
        debug!("package `{}` found at {}", name, path.display());
        return PackageMap::load(&path).map(Some);
    }

    let mut candidates: Vec<_> = match fs::read_dir(libs_dir) {
        Ok(entries) => entries.flatten().map(|entry| entry.path()).collect(),
        Err(_) => return Ok(None),
    };

    candidates.sort();
    for candidate in candidates {
        if let Some(path) = manifest_in(&candidate) {
            let package = PackageMap::load(&path)?;
            if package.aliases.iter().any(|alias| alias == name) {
                debug!("package `{}` found as an alias of `{}`", name, package.name);
                return Ok(Some(package));
            }
        }
    }

    Ok(None)
}

/// Descriptor de la versión más alta en un directorio de paquete.
fn manifest_in(package_dir: &Path) -> Option<PathBuf> {
    let flat = package_dir.join(MANIFEST);
    let versions = fs::read_dir(package_dir).ok()?;

    let newest = versions
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.join(MANIFEST).is_file())
        .max_by(|a, b| compare_versions(&file_name(a), &file_name(b)));

    match newest {
        Some(version) => Some(version.join(MANIFEST)),
        None if flat.is_file() => Some(flat),
        None => None,
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Compara versiones punteadas numéricamente, `1.10.0` > `1.9.2`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let key = |version: &str| -> Vec<u64> {
        version
            .trim_start_matches('v')
            .split('.')
            .map(|part| {
                let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().unwrap_or(0)
            })
            .collect()
    };

    key(a).cmp(&key(b)).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const WS2812: &str = r#"
[package]
name = "ws2812"
version = "1.0.0"
description = "WS2812 NeoPixel driver"
cpp_header = "Adafruit_NeoPixel.h"
arduino_lib = "Adafruit NeoPixel"
aliases = ["neopixel"]

[[function]]
go = "New"
cpp = "Adafruit_NeoPixel({0}, {1}, NEO_GRB + NEO_KHZ800)"

[[function]]
go = "Show"
cpp = "{0}.show()"

[[constant]]
go = "GRB"
cpp = "NEO_GRB"

[[type]]
go = "Strip"
cpp = "Adafruit_NeoPixel"
"#;

    fn install(libs: &Path, name: &str, version: Option<&str>, text: &str) {
        let mut dir = libs.join(name);
        if let Some(version) = version {
            dir.push(version);
        }

        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MANIFEST), text).unwrap();
    }

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn templates_substitute_positions() {
        let template = Template::parse("{0}.setPixelColor({1}, {self})");
        assert_eq!(template.slots(), 2);
        assert_eq!(
            template.render(&strings(&["strip", "3"])),
            Ok(String::from("strip.setPixelColor(3, strip)"))
        );
    }

    #[test]
    fn templates_reject_argument_mismatch() {
        let template = Template::parse("f({0}, {1}, {2})");
        assert_eq!(
            template.render(&strings(&["a", "b"])),
            Err(Arity {
                expected: 3,
                variadic: false,
                found: 2
            })
        );
    }

    #[test]
    fn rest_placeholder_absorbs_extra_arguments() {
        let template = Template::parse("snprintf(buf, sizeof(buf), {args})");
        assert_eq!(template.slots(), 0);
        assert_eq!(
            template.render(&strings(&["\"%d\"", "x"])),
            Ok(String::from("snprintf(buf, sizeof(buf), \"%d\", x)"))
        );
    }

    #[test]
    fn unknown_braces_are_literal() {
        let template = Template::parse("do { f({0}); } while (0)");
        assert_eq!(template.slots(), 1);
        assert_eq!(
            template.render(&strings(&["x"])),
            Ok(String::from("do { f(x); } while (0)"))
        );
    }

    #[test]
    fn loads_manifest_tables() {
        let package = PackageMap::from_toml(WS2812, Path::new("ws2812.toml")).unwrap();

        assert_eq!(package.name(), "ws2812");
        assert_eq!(package.header(), Some("Adafruit_NeoPixel.h"));
        assert_eq!(package.native_library(), Some("Adafruit NeoPixel"));
        assert_eq!(package.aliases(), &[String::from("neopixel")]);
        assert_eq!(package.constant("GRB"), Some("NEO_GRB"));
        assert_eq!(package.typ("Strip"), Some("Adafruit_NeoPixel"));
        assert_eq!(package.function("Show").map(Template::slots), Some(1));
    }

    #[test]
    fn gapped_placeholders_fail_to_load() {
        let text = "[package]\nname = \"x\"\n[[function]]\ngo = \"F\"\ncpp = \"f({0}, {2})\"\n";
        let error = PackageMap::from_toml(text, Path::new("x.toml")).unwrap_err();

        assert!(matches!(error, LoadError::PlaceholderGap { missing: 1, .. }));
    }

    #[test]
    fn every_installed_package_loads_without_names() {
        let libs = TempDir::new().unwrap();
        install(libs.path(), "ws2812", Some("1.0.0"), WS2812);
        install(libs.path(), "dht", None, "[package]\nname = \"dht\"\n");
        fs::create_dir_all(libs.path().join("notes")).unwrap();

        let names: Vec<_> = load_installed(libs.path())
            .unwrap()
            .iter()
            .map(|package| package.name().to_owned())
            .collect();

        assert_eq!(names, strings(&["dht", "ws2812"]));
        assert!(load_installed(&libs.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn highest_version_wins() {
        let libs = TempDir::new().unwrap();
        install(libs.path(), "ws2812", Some("1.9.2"), "[package]\nname = \"ws2812\"\nversion = \"1.9.2\"\n");
        install(libs.path(), "ws2812", Some("1.10.0"), WS2812.replace("1.0.0", "1.10.0").as_str());

        let packages = load_packages(libs.path(), &strings(&["ws2812"])).unwrap();
        assert_eq!(packages[0].version(), Some("1.10.0"));
    }

    #[test]
    fn flat_layout_and_aliases() {
        let libs = TempDir::new().unwrap();
        install(libs.path(), "ws2812", None, WS2812);

        let packages = load_packages(libs.path(), &strings(&["neopixel"])).unwrap();
        assert_eq!(packages[0].name(), "ws2812");
    }

    #[test]
    fn missing_packages_are_reported_together() {
        let libs = TempDir::new().unwrap();
        install(libs.path(), "ws2812", Some("1.0.0"), WS2812);

        let error = load_packages(libs.path(), &strings(&["dht", "ws2812", "bme280"])).unwrap_err();
        match error {
            LoadError::Missing { names, .. } => assert_eq!(names, strings(&["dht", "bme280"])),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn collisions_are_configuration_errors() {
        let first = PackageMap::from_toml(WS2812, Path::new("a.toml")).unwrap();
        let second = PackageMap::from_toml(
            "[package]\nname = \"neopixel\"\n",
            Path::new("b.toml"),
        )
        .unwrap();
        let builtin = PackageMap::from_toml("[package]\nname = \"time\"\n", Path::new("c.toml")).unwrap();

        let (set, collisions) = PackageSet::new(vec![first, second, builtin]);
        assert_eq!(collisions.len(), 2);
        assert!(collisions.iter().all(|error| error.class() == Class::Config));
        assert_eq!(set.get("neopixel").map(PackageMap::name), Some("ws2812"));
        assert!(set.get("time").is_none());
    }

    #[test]
    fn version_ordering_is_numeric() {
        assert_eq!(compare_versions("1.10.0", "1.9.2"), Ordering::Greater);
        assert_eq!(compare_versions("v2.0", "1.99"), Ordering::Greater);
        assert_eq!(compare_versions("1.0.0", "1.0.0"), Ordering::Equal);
    }
}
