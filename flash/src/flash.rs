//! Carga del firmware a una tarjeta conectada.
//!
//! Cada familia tiene su programador: avrdude para AVR y esptool para
//! ESP32 y ESP8266. El programador corre una sola vez y con un límite de
//! tiempo fijo; si se agota, la carga falla y no se reintenta.

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
    time::Duration,
};

use tracing::{debug, info};
use tsuki::board::{Board, Toolchain};

use crate::{
    detect,
    error::FlashError,
    sdk::{self, SdkPaths},
    tool,
};

/// Tiempo máximo de una operación sobre el puerto serie.
pub const SERIAL_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuraciones de avrdude del sistema, por si el SDK no trae una.
const SYSTEM_AVRDUDE_CONF: &[&str] = &["/etc/avrdude.conf", "/usr/share/avrdude/avrdude.conf"];

/// Parámetros de una carga.
#[derive(Clone, Debug, Default)]
pub struct Request {
    pub build_dir: PathBuf,

    /// Nombre base del firmware. Sin él se toma el primero que aparezca.
    pub name: Option<String>,

    /// Puerto explícito. Sin él se detecta.
    pub port: Option<String>,

    /// Reemplaza la velocidad por defecto de la tarjeta.
    pub baud: Option<u32>,

    pub verbose: bool,
}

/// Resultado de una carga exitosa.
#[derive(Debug)]
pub struct Uploaded {
    pub firmware: PathBuf,
    pub port: String,
}

/// Programador de una tarjeta y sus parámetros.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Programmer {
    Avrdude {
        mcu: &'static str,
        protocol: &'static str,
        baud: u32,
    },

    Esptool {
        chip: &'static str,
        baud: u32,

        /// Dirección de flash de la imagen de la aplicación.
        offset: &'static str,
    },
}

impl Programmer {
    pub fn for_board(board: &Board, baud: Option<u32>) -> Result<Self, FlashError> {
        match board.toolchain {
            Toolchain::Avr {
                mcu,
                programmer,
                baud: default,
                ..
            } => Ok(Programmer::Avrdude {
                mcu,
                protocol: programmer,
                baud: baud.unwrap_or(default),
            }),

            Toolchain::Esp32 { variant } => Ok(Programmer::Esptool {
                chip: variant,
                baud: baud.unwrap_or(921_600),
                offset: "0x10000",
            }),

            Toolchain::Esp8266 => Ok(Programmer::Esptool {
                chip: "esp8266",
                baud: baud.unwrap_or(115_200),
                offset: "0x0",
            }),

            Toolchain::Sam { .. } | Toolchain::Rp2040 => Err(FlashError::Unsupported {
                what: format!("uploading to {} ({})", board.name, board.arch()),
            }),
        }
    }

    /// Extensiones de firmware aceptadas, en orden de preferencia.
    fn suffixes(&self) -> &'static [&'static str] {
        match self {
            Programmer::Avrdude { .. } => &[".with_bootloader.hex", ".hex", ".bin"],
            Programmer::Esptool { .. } => &[".bin", ".hex"],
        }
    }

    /// Línea de comandos completa del programador.
    pub fn command(&self, sdk: Option<&SdkPaths>, firmware: &Path, port: &str, verbose: bool) -> Command {
        match *self {
            Programmer::Avrdude { mcu, protocol, baud } => {
                let (avrdude, conf) = avrdude(sdk);
                let mut command = Command::new(avrdude);

                if let Some(conf) = conf {
                    command.arg("-C").arg(conf);
                }

                command
                    .args(&["-p", mcu, "-c", protocol, "-P", port])
                    .arg("-b")
                    .arg(baud.to_string())
                    .arg("-D")
                    .arg("-U")
                    .arg(format!("flash:w:{}:i", firmware.display()));

                if verbose {
                    command.arg("-v");
                } else {
                    command.args(&["-q", "-q"]);
                }

                command
            }

            Programmer::Esptool { chip, baud, offset } => {
                let mut command = Command::new(sdk::esptool(sdk));
                command
                    .args(&["--chip", chip, "--port", port, "--baud"])
                    .arg(baud.to_string())
                    .args(&["--before", "default_reset", "--after", "hard_reset"])
                    .args(&["write_flash", "-z", "--flash_mode", "dio"])
                    .args(&["--flash_freq", "80m", "--flash_size", "detect", offset])
                    .arg(firmware);

                command
            }
        }
    }
}

/// Ejecutable de avrdude y su configuración.
///
/// Se prefiere el avrdude del SDK, que trae su propio `avrdude.conf`.
fn avrdude(sdk: Option<&SdkPaths>) -> (PathBuf, Option<PathBuf>) {
    let bundled = sdk.and_then(|sdk| sdk.aux_tool("avrdude")).and_then(|dir| {
        let binary = dir.join("bin").join("avrdude");
        binary.is_file().then(|| (binary, dir.join("etc").join("avrdude.conf")))
    });

    let (binary, conf) = match bundled {
        Some((binary, conf)) => (binary, Some(conf)),
        None => (sdk.map_or_else(|| PathBuf::from("avrdude"), |sdk| sdk.tool("avrdude")), None),
    };

    let conf = conf
        .into_iter()
        .chain(
            binary
                .parent()
                .filter(|bin| !bin.as_os_str().is_empty())
                .map(|bin| bin.join("avrdude.conf")),
        )
        .chain(SYSTEM_AVRDUDE_CONF.iter().map(PathBuf::from))
        .find(|conf| conf.is_file());

    (binary, conf)
}

/// Busca el firmware de la tarjeta en el directorio de compilación.
///
/// Con nombre se prueban `<name><sufijo>` en orden. Sin él se toma, por
/// sufijo, el primer archivo en orden alfabético.
pub fn find_firmware(build_dir: &Path, name: Option<&str>, board: &Board) -> Result<PathBuf, FlashError> {
    let programmer = Programmer::for_board(board, None)?;
    let suffixes = programmer.suffixes();

    let found = match name {
        Some(name) => suffixes
            .iter()
            .map(|suffix| build_dir.join(format!("{}{}", name, suffix)))
            .find(|path| path.is_file()),

        None => {
            let mut files: Vec<_> = fs::read_dir(build_dir)
                .into_iter()
                .flatten()
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.is_file())
                .collect();

            files.sort();
            suffixes.iter().find_map(|suffix| {
                files
                    .iter()
                    .find(|path| path.to_string_lossy().ends_with(suffix))
                    .cloned()
            })
        }
    };

    found.ok_or_else(|| FlashError::NoFirmware {
        dir: build_dir.to_owned(),
        name: name.unwrap_or("*").to_owned(),
    })
}

/// Carga el firmware de un directorio de compilación a la tarjeta.
pub fn upload(request: &Request, board: &Board) -> Result<Uploaded, FlashError> {
    let programmer = Programmer::for_board(board, request.baud)?;
    let firmware = find_firmware(&request.build_dir, request.name.as_deref(), board)?;

    let port = match &request.port {
        Some(port) => port.clone(),
        None => detect::port_for(board)?,
    };

    // El programador puede venir de PATH aunque no haya SDK
    let sdk = sdk::resolve(board).ok();
    if sdk.is_none() {
        debug!(board = board.id, "no SDK, using programmer from PATH");
    }

    info!(firmware = %firmware.display(), %port, "uploading");
    let mut command = programmer.command(sdk.as_ref(), &firmware, &port, request.verbose);

    match tool::run_with_timeout(&mut command, SERIAL_TIMEOUT)? {
        None => Err(FlashError::Timeout {
            port,
            after: SERIAL_TIMEOUT,
        }),

        Some(output) if output.status.success() => Ok(Uploaded { firmware, port }),

        Some(output) => Err(FlashError::Upload {
            port,
            output: tool::error_lines(&tool::combined(&output)),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn board(id: &str) -> &'static Board {
        Board::find(id).unwrap()
    }

    fn args(command: &Command) -> Vec<String> {
        command.get_args().map(|arg| arg.to_string_lossy().into_owned()).collect()
    }

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            fs::write(dir.join(name), "").unwrap();
        }
    }

    #[test]
    fn programmers_follow_the_board() {
        assert_eq!(
            Programmer::for_board(board("uno"), None).unwrap(),
            Programmer::Avrdude {
                mcu: "atmega328p",
                protocol: "arduino",
                baud: 115200,
            }
        );

        assert_eq!(
            Programmer::for_board(board("esp32"), None).unwrap(),
            Programmer::Esptool {
                chip: "esp32",
                baud: 921_600,
                offset: "0x10000",
            }
        );

        assert_eq!(
            Programmer::for_board(board("d1_mini"), Some(460_800)).unwrap(),
            Programmer::Esptool {
                chip: "esp8266",
                baud: 460_800,
                offset: "0x0",
            }
        );
    }

    #[test]
    fn arm_boards_cannot_be_uploaded_yet() {
        let error = Programmer::for_board(board("pico"), None).unwrap_err();
        assert_eq!(error.to_string(), "uploading to Raspberry Pi Pico (rp2040) is not supported yet");
    }

    #[test]
    fn avrdude_writes_intel_hex() {
        let programmer = Programmer::for_board(board("uno"), Some(57600)).unwrap();
        let command = programmer.command(None, Path::new("/build/blink.hex"), "/dev/ttyACM0", false);

        let args = args(&command);
        let start = args.iter().position(|arg| arg == "-p").unwrap();
        assert_eq!(
            args[start..],
            [
                "-p",
                "atmega328p",
                "-c",
                "arduino",
                "-P",
                "/dev/ttyACM0",
                "-b",
                "57600",
                "-D",
                "-U",
                "flash:w:/build/blink.hex:i",
                "-q",
                "-q",
            ]
        );
    }

    #[test]
    fn esptool_writes_the_application_image() {
        let programmer = Programmer::for_board(board("esp32"), None).unwrap();
        let command = programmer.command(None, Path::new("/build/app.bin"), "/dev/ttyUSB0", true);

        assert_eq!(command.get_program(), "esptool.py");
        assert_eq!(
            args(&command),
            [
                "--chip",
                "esp32",
                "--port",
                "/dev/ttyUSB0",
                "--baud",
                "921600",
                "--before",
                "default_reset",
                "--after",
                "hard_reset",
                "write_flash",
                "-z",
                "--flash_mode",
                "dio",
                "--flash_freq",
                "80m",
                "--flash_size",
                "detect",
                "0x10000",
                "/build/app.bin",
            ]
        );
    }

    #[test]
    fn avrdude_comes_from_the_sdk_when_bundled() {
        let temp = TempDir::new().unwrap();
        let tool = temp.path().join("packages/arduino/tools/avrdude/6.3.0-arduino17");
        fs::create_dir_all(tool.join("bin")).unwrap();
        fs::create_dir_all(tool.join("etc")).unwrap();
        touch(&tool.join("bin"), &["avrdude"]);
        touch(&tool.join("etc"), &["avrdude.conf"]);

        let sdk = SdkPaths {
            root: temp.path().to_owned(),
            core_dir: temp.path().join("cores/arduino"),
            variant_dir: temp.path().join("variants/standard"),
            toolchain_bin: None,
            libraries_dir: None,
            tools_dir: Some(temp.path().join("packages/arduino/tools")),
            version: String::from("1.8.6"),
        };

        let (binary, conf) = avrdude(Some(&sdk));
        assert_eq!(binary, tool.join("bin/avrdude"));
        assert_eq!(conf, Some(tool.join("etc/avrdude.conf")));
    }

    #[test]
    fn firmware_lookup_follows_preference_order() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), &["blink.bin", "blink.hex"]);

        let found = find_firmware(temp.path(), Some("blink"), board("uno")).unwrap();
        assert_eq!(found, temp.path().join("blink.hex"));

        touch(temp.path(), &["blink.with_bootloader.hex"]);
        let found = find_firmware(temp.path(), Some("blink"), board("uno")).unwrap();
        assert_eq!(found, temp.path().join("blink.with_bootloader.hex"));

        let found = find_firmware(temp.path(), Some("blink"), board("esp8266")).unwrap();
        assert_eq!(found, temp.path().join("blink.bin"));
    }

    #[test]
    fn firmware_lookup_without_a_name_scans_by_suffix() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), &["b.hex", "a.elf", "c.bin"]);

        assert_eq!(find_firmware(temp.path(), None, board("uno")).unwrap(), temp.path().join("b.hex"));
        assert_eq!(find_firmware(temp.path(), None, board("esp32")).unwrap(), temp.path().join("c.bin"));
    }

    #[test]
    fn missing_firmware_is_a_device_error() {
        let temp = TempDir::new().unwrap();
        let error = find_firmware(temp.path(), Some("blink"), board("uno")).unwrap_err();

        assert!(matches!(error, FlashError::NoFirmware { ref name, .. } if name == "blink"));
        assert!(error.to_string().starts_with("no firmware for `blink` in "));
    }

    #[cfg(unix)]
    #[test]
    fn uploads_fail_without_a_responding_programmer() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), &["blink.hex"]);

        let request = Request {
            build_dir: temp.path().to_owned(),
            name: Some(String::from("blink")),
            port: Some(String::from("/dev/tsuki-no-such-port")),
            ..Request::default()
        };

        let result = upload(&request, board("uno"));
        match result {
            Err(FlashError::Spawn { .. }) | Err(FlashError::Upload { .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
