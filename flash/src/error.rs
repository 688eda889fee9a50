//! Errores del motor de compilación y flasheo.

use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use thiserror::Error;
use tsuki::{
    board::BoardError,
    error::{Class, Classify},
};

/// Un error de compilación, enlazado o carga de firmware.
///
/// Ninguna variante deja un artefacto parcial: los errores de toolchain
/// no producen firmware y los de dispositivo no escriben nada a medias.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum FlashError {
    #[error(transparent)]
    Board(#[from] BoardError),

    #[error("no Arduino SDK for `{arch}` found, probed:{}", paths(.probed))]
    SdkNotFound { arch: String, probed: Vec<PathBuf> },

    #[error("{what} is not supported yet")]
    Unsupported { what: String },

    #[error("no .cpp, .c or .ino sources in {}", .0.display())]
    NoSources(PathBuf),

    #[error("cannot run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("compilation failed:\n{output}")]
    Compile { output: String },

    #[error("link failed:\n{output}")]
    Link { output: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no firmware for `{name}` in {}", .dir.display())]
    NoFirmware { dir: PathBuf, name: String },

    #[error("no known board detected, ports found:{}", bullets(.ports))]
    NoDevice { ports: Vec<String> },

    #[error("upload to {port} failed:\n{output}")]
    Upload { port: String, output: String },

    #[error("upload to {port} timed out after {} s", .after.as_secs())]
    Timeout { port: String, after: Duration },
}

impl FlashError {
    /// Adjunta una ruta a un error de E/S.
    pub fn io(path: &Path) -> impl FnOnce(io::Error) -> FlashError + '_ {
        move |source| FlashError::Io {
            path: path.to_owned(),
            source,
        }
    }
}

impl Classify for FlashError {
    fn class(&self) -> Class {
        use FlashError::*;

        match self {
            Board(_) => Class::Config,
            NoFirmware { .. } | NoDevice { .. } | Upload { .. } | Timeout { .. } => Class::Device,
            _ => Class::Toolchain,
        }
    }
}

fn bullets(items: &[String]) -> String {
    if items.is_empty() {
        return String::from(" (none)");
    }

    items.iter().map(|item| format!("\n  - {}", item)).collect()
}

fn paths(paths: &[PathBuf]) -> String {
    let items: Vec<_> = paths.iter().map(|path| path.display().to_string()).collect();
    bullets(&items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sdk_errors_list_every_probe() {
        let error = FlashError::SdkNotFound {
            arch: "avr".into(),
            probed: vec![PathBuf::from("/a"), PathBuf::from("/b")],
        };

        assert_eq!(error.to_string(), "no Arduino SDK for `avr` found, probed:\n  - /a\n  - /b");
        assert_eq!(error.class(), Class::Toolchain);
    }

    #[test]
    fn device_errors_are_classified() {
        let error = FlashError::NoDevice { ports: vec![] };

        assert_eq!(error.to_string(), "no known board detected, ports found: (none)");
        assert_eq!(error.class(), Class::Device);
    }
}
