//! Caché incremental de objetos.
//!
//! Cada unidad de traducción se identifica por su ruta canónica y se
//! asocia a una huella: el hash de su contenido junto con el hash de las
//! opciones de compilación. Una unidad cuya huella coincide con la
//! registrada, y cuyo objeto aún existe, no se vuelve a compilar.
//!
//! El manifiesto vive en `<dir>/.tsuki-cache.json` y se reescribe
//! completo, de forma atómica, una vez que todas las compilaciones
//! terminan.

use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::FlashError;

pub const MANIFEST: &str = ".tsuki-cache.json";

/// Huella de una unidad de traducción.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub content: String,
    pub flags: String,
}

impl Fingerprint {
    pub fn of(source: &Path, flags: &str) -> Result<Self, FlashError> {
        let content = fs::read(source).map_err(FlashError::io(source))?;

        Ok(Fingerprint {
            content: blake3::hash(&content).to_hex().to_string(),
            flags: flags.to_owned(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(flatten)]
    pub fingerprint: Fingerprint,
    pub object: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Manifest {
    entries: BTreeMap<String, Entry>,
}

impl Manifest {
    /// Carga el manifiesto de un directorio.
    ///
    /// Un manifiesto ausente equivale a uno vacío. Uno ilegible también,
    /// pero se advierte: todo se recompilará.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(MANIFEST);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(_) => return Manifest::default(),
        };

        match serde_json::from_str(&text) {
            Ok(manifest) => manifest,
            Err(error) => {
                warn!(path = %path.display(), %error, "discarding unreadable build cache");
                Manifest::default()
            }
        }
    }

    /// Escribe el manifiesto a un temporal y lo renombra sobre el anterior.
    pub fn save(&self, dir: &Path) -> Result<(), FlashError> {
        let path = dir.join(MANIFEST);
        let json = serde_json::to_string_pretty(self).map_err(|error| FlashError::Io {
            path: path.clone(),
            source: error.into(),
        })?;

        let mut file = NamedTempFile::new_in(dir).map_err(FlashError::io(dir))?;
        file.write_all(json.as_bytes()).map_err(FlashError::io(&path))?;
        file.persist(&path).map_err(|error| FlashError::Io {
            path: path.clone(),
            source: error.error,
        })?;

        Ok(())
    }

    /// Objeto vigente para una unidad, si lo hay.
    pub fn lookup(&self, source: &Path, fingerprint: &Fingerprint) -> Option<&Path> {
        self.entries
            .get(&key(source))
            .filter(|entry| entry.fingerprint == *fingerprint && entry.object.is_file())
            .map(|entry| entry.object.as_path())
    }

    pub fn record(&mut self, source: &Path, fingerprint: Fingerprint, object: PathBuf) {
        self.entries.insert(key(source), Entry { fingerprint, object });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Hash de una lista de opciones de compilación.
pub fn hash_flags<S: AsRef<str>>(flags: &[S]) -> String {
    let mut hasher = blake3::Hasher::new();
    for flag in flags {
        hasher.update(flag.as_ref().as_bytes());
        hasher.update(&[0]);
    }

    hasher.finalize().to_hex().to_string()
}

/// Ruta del objeto de una unidad.
///
/// El prefijo sale de la ruta completa de la fuente, así que dos
/// `main.cpp` en directorios distintos no colisionan.
pub fn object_path(dir: &Path, source: &Path) -> PathBuf {
    let name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("unit"));

    let hash = blake3::hash(key(source).as_bytes()).to_hex();
    dir.join(format!("{}_{}.o", &hash.as_str()[..8], name))
}

fn key(source: &Path) -> String {
    fs::canonicalize(source)
        .unwrap_or_else(|_| source.to_owned())
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn entries_survive_a_round_trip_through_disk() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("main.cpp");
        let object = object_path(temp.path(), &source);
        fs::write(&source, "void setup() {}\n").unwrap();
        fs::write(&object, "").unwrap();

        let fingerprint = Fingerprint::of(&source, &hash_flags(&["-Os"])).unwrap();
        let mut manifest = Manifest::default();
        manifest.record(&source, fingerprint.clone(), object.clone());
        manifest.save(temp.path()).unwrap();

        let loaded = Manifest::load(temp.path());
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.lookup(&source, &fingerprint), Some(object.as_path()));
    }

    #[test]
    fn edits_and_flag_changes_invalidate() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("main.cpp");
        let object = temp.path().join("main.o");
        fs::write(&source, "int x = 1;\n").unwrap();
        fs::write(&object, "").unwrap();

        let flags = hash_flags(&["-Os"]);
        let mut manifest = Manifest::default();
        manifest.record(&source, Fingerprint::of(&source, &flags).unwrap(), object.clone());

        let other_flags = Fingerprint::of(&source, &hash_flags(&["-O2"])).unwrap();
        assert_eq!(manifest.lookup(&source, &other_flags), None);

        fs::write(&source, "int x = 2;\n").unwrap();
        let edited = Fingerprint::of(&source, &flags).unwrap();
        assert_eq!(manifest.lookup(&source, &edited), None);
    }

    #[test]
    fn missing_objects_are_stale() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("main.cpp");
        fs::write(&source, "int x;\n").unwrap();

        let fingerprint = Fingerprint::of(&source, "flags").unwrap();
        let mut manifest = Manifest::default();
        manifest.record(&source, fingerprint.clone(), temp.path().join("gone.o"));

        assert_eq!(manifest.lookup(&source, &fingerprint), None);
    }

    #[test]
    fn corrupt_manifests_are_discarded() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(MANIFEST), "{ not json").unwrap();

        assert!(Manifest::load(temp.path()).is_empty());
    }

    #[test]
    fn objects_of_same_named_sources_do_not_collide() {
        let dir = Path::new("/build");
        let a = object_path(dir, Path::new("/sketch/a/main.cpp"));
        let b = object_path(dir, Path::new("/sketch/b/main.cpp"));

        assert_ne!(a, b);
        assert!(a.to_string_lossy().ends_with("_main.cpp.o"));
    }
}
