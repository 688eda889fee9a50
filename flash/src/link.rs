//! Construcción del firmware.
//!
//! Una vez compiladas todas las unidades, los objetos se enlazan contra
//! el archivo del core para producir un ELF. Del ELF se extrae luego la
//! imagen que entiende el programador de la tarjeta: Intel HEX para AVR
//! y una imagen de esptool para ESP.

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use bitflags::bitflags;
use tracing::{info, warn};
use tsuki::board::{Board, Toolchain};

use crate::{
    compile::Request,
    error::FlashError,
    sdk::{self, SdkPaths},
    tool,
};

bitflags! {
    /// Opciones a aplicar durante el enlazado.
    pub struct LinkOptions: u32 {
        /// Descartar secciones sin referencias.
        const GC_SECTIONS = 0x01;

        /// Remover símbolos de depuración del ELF.
        ///
        /// No afecta la imagen que se flashea, solo el tamaño del ELF
        /// que queda en el directorio de compilación.
        const STRIP = 0x02;

        /// Reportar el uso de flash y RAM luego de enlazar.
        const SIZE_REPORT = 0x04;
    }
}

impl Default for LinkOptions {
    fn default() -> Self {
        LinkOptions::GC_SECTIONS | LinkOptions::SIZE_REPORT
    }
}

/// Artefactos de un enlazado exitoso.
#[derive(Debug)]
pub struct Firmware {
    pub elf: PathBuf,

    /// Imagen para el programador, `.hex` o `.bin`.
    pub image: PathBuf,

    /// Salida de `size`, si se pidió y estuvo disponible.
    pub size: Option<String>,
}

/// Formato de la imagen final.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Image {
    /// `objcopy -O ihex`.
    Hex,

    /// `esptool elf2image` para el chip indicado.
    Bin { chip: &'static str },
}

/// Información acerca del enlazado requerido para cada familia.
#[derive(Debug)]
struct Parameters {
    /// Argumentos adicionales al comando de enlazado que se necesitan
    /// para esta familia.
    extra_args: Vec<String>,

    image: Image,

    /// Argumentos de `size` antes del ELF.
    size_args: Vec<String>,
}

/// Enumera los detalles del comando de enlazado por familia.
fn parameters(board: &Board, sdk: &SdkPaths) -> Result<Parameters, FlashError> {
    match board.toolchain {
        Toolchain::Avr { mcu, .. } => Ok(Parameters {
            // LTO requiere el plugin del enlazador para ver los objetos
            // del core con el mismo IR que los del sketch
            extra_args: vec![
                String::from("-w"),
                String::from("-Os"),
                String::from("-g"),
                String::from("-flto"),
                String::from("-fuse-linker-plugin"),
                format!("-mmcu={}", mcu),
            ],
            image: Image::Hex,
            size_args: vec![String::from("--format=avr"), format!("--mcu={}", mcu)],
        }),

        Toolchain::Esp32 { variant } => Ok(Parameters {
            extra_args: esp_args(sdk, &["tools", "sdk", variant, "ld"], "esp32.ld"),
            image: Image::Bin { chip: variant },
            size_args: vec![],
        }),

        Toolchain::Esp8266 => Ok(Parameters {
            extra_args: esp_args(sdk, &["tools", "sdk", "ld"], "eagle.app.v6.common.ld"),
            image: Image::Bin { chip: "esp8266" },
            size_args: vec![],
        }),

        Toolchain::Sam { .. } | Toolchain::Rp2040 => Err(FlashError::Unsupported {
            what: format!("linking for {} ({})", board.name, board.arch()),
        }),
    }
}

/// El script de enlazado de ESP vive junto al core, bajo `tools/sdk`.
fn esp_args(sdk: &SdkPaths, ld_dir: &[&str], script: &str) -> Vec<String> {
    let mut args = vec![String::from("-Os")];

    let hardware = sdk.core_dir.parent().and_then(Path::parent);
    if let Some(hardware) = hardware {
        let dir = ld_dir.iter().fold(hardware.to_owned(), |dir, part| dir.join(part));
        if dir.is_dir() {
            args.push(format!("-L{}", dir.display()));
        }
    }

    args.push(format!("-Wl,-T{}", script));
    args
}

/// Enlaza los objetos del sketch con el core y extrae la imagen.
///
/// Si cualquier paso falla no queda ni ELF ni imagen a medias.
pub fn link(
    board: &Board,
    sdk: &SdkPaths,
    prefix: &str,
    objects: &[PathBuf],
    core: &Path,
    request: &Request,
    options: LinkOptions,
) -> Result<Firmware, FlashError> {
    let params = parameters(board, sdk)?;
    let elf = request.build_dir.join(format!("{}.elf", request.name));

    let mut command = Command::new(sdk.tool(&format!("{}gcc", prefix)));
    command.args(&params.extra_args);

    if options.contains(LinkOptions::GC_SECTIONS) {
        command.arg("-Wl,--gc-sections");
    }

    if options.contains(LinkOptions::STRIP) {
        command.arg("-s");
    }

    command
        .args(objects)
        .arg(core)
        .arg("-L")
        .arg(&request.build_dir)
        .arg("-lm")
        .arg("-o")
        .arg(&elf);

    let output = tool::run(&mut command)?;
    if !output.status.success() {
        let _ = fs::remove_file(&elf);
        return Err(FlashError::Link {
            output: tool::combined(&output),
        });
    }

    let image = match params.image {
        Image::Hex => {
            let hex = request.build_dir.join(format!("{}.hex", request.name));
            let mut objcopy = Command::new(sdk.tool(&format!("{}objcopy", prefix)));
            objcopy.args(&["-O", "ihex", "-R", ".eeprom"]).arg(&elf).arg(&hex);

            extract(&mut objcopy, &hex, &elf)?
        }

        Image::Bin { chip } => {
            let bin = request.build_dir.join(format!("{}.bin", request.name));
            let mut esptool = Command::new(sdk::esptool(Some(sdk)));
            esptool
                .args(&["--chip", chip, "elf2image", "--output"])
                .arg(&bin)
                .arg(&elf);

            extract(&mut esptool, &bin, &elf)?
        }
    };

    let size = if options.contains(LinkOptions::SIZE_REPORT) {
        size_report(sdk, prefix, &params, &elf)
    } else {
        None
    };

    info!(image = %image.display(), "firmware ready");
    Ok(Firmware { elf, image, size })
}

/// Extrae la imagen del ELF. Si falla, se borran ambos.
fn extract(command: &mut Command, image: &Path, elf: &Path) -> Result<PathBuf, FlashError> {
    let result = tool::run(command).and_then(|output| {
        if output.status.success() && image.is_file() {
            Ok(image.to_owned())
        } else {
            Err(FlashError::Link {
                output: tool::combined(&output),
            })
        }
    });

    if result.is_err() {
        let _ = fs::remove_file(image);
        let _ = fs::remove_file(elf);
    }

    result
}

/// Uso de memoria según `size`. Un fallo aquí no invalida el firmware.
fn size_report(sdk: &SdkPaths, prefix: &str, params: &Parameters, elf: &Path) -> Option<String> {
    let size = sdk.tool(&format!("{}size", prefix));

    let formatted = tool::run(Command::new(&size).args(&params.size_args).arg(elf));
    let output = match formatted {
        Ok(output) if output.status.success() => output,

        // Versiones de binutils sin --format=avr
        _ => match tool::run(Command::new(&size).arg(elf)) {
            Ok(output) if output.status.success() => output,
            _ => {
                warn!(elf = %elf.display(), "no size report available");
                return None;
            }
        },
    };

    Some(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sdk(root: &Path, bin: Option<PathBuf>) -> SdkPaths {
        SdkPaths {
            root: root.to_owned(),
            core_dir: root.join("hardware/1.0.0/cores/arduino"),
            variant_dir: root.join("hardware/1.0.0/variants/standard"),
            toolchain_bin: bin,
            libraries_dir: None,
            tools_dir: None,
            version: String::from("1.0.0"),
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

    #[test]
    fn default_options_collect_garbage_and_report_size() {
        let options = LinkOptions::default();

        assert!(options.contains(LinkOptions::GC_SECTIONS | LinkOptions::SIZE_REPORT));
        assert!(!options.contains(LinkOptions::STRIP));
    }

    #[test]
    fn avr_links_to_intel_hex() {
        let temp = TempDir::new().unwrap();
        let params = parameters(Board::find("mega").unwrap(), &sdk(temp.path(), None)).unwrap();

        assert_eq!(params.image, Image::Hex);
        assert!(params.extra_args.contains(&String::from("-mmcu=atmega2560")));
        assert_eq!(params.size_args, vec!["--format=avr", "--mcu=atmega2560"]);
    }

    #[test]
    fn esp_links_with_the_sdk_script() {
        let temp = TempDir::new().unwrap();
        let sdk = sdk(temp.path(), None);
        let ld = temp.path().join("hardware/1.0.0/tools/sdk/ld");
        fs::create_dir_all(&ld).unwrap();

        let params = parameters(Board::find("d1_mini").unwrap(), &sdk).unwrap();
        assert_eq!(params.image, Image::Bin { chip: "esp8266" });
        assert!(params.extra_args.contains(&format!("-L{}", ld.display())));
        assert!(params.extra_args.contains(&String::from("-Wl,-Teagle.app.v6.common.ld")));

        let params = parameters(Board::find("esp32s2").unwrap(), &sdk).unwrap();
        assert_eq!(params.image, Image::Bin { chip: "esp32s2" });
    }

    #[test]
    fn missing_linkers_leave_no_firmware() {
        let temp = TempDir::new().unwrap();
        let request = request(temp.path());
        fs::create_dir_all(&request.build_dir).unwrap();

        let error = link(
            Board::find("uno").unwrap(),
            &sdk(temp.path(), None),
            "tsuki-test-none-",
            &[],
            &temp.path().join("core.a"),
            &request,
            LinkOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(error, FlashError::Spawn { .. }));
        assert!(!request.build_dir.join("blink.elf").exists());
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use pretty_assertions::assert_eq;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, name: &str, body: &str) {
            let path = dir.join(name);
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }

        /// Toolchain falsa: el "gcc" escribe el ELF, el "objcopy" copia.
        fn toolchain(dir: &Path, gcc_fails: bool) {
            fs::create_dir_all(dir).unwrap();

            let gcc = if gcc_fails {
                r#"echo "undefined reference to \`setup'" >&2; exit 1"#
            } else {
                "while [ \"$1\" != \"-o\" ]; do shift; done; echo elf > \"$2\""
            };

            script(dir, "avr-gcc", gcc);
            script(dir, "avr-objcopy", "for last; do :; done; echo hex > \"$last\"");
            script(dir, "avr-size", "echo 'Program:     924 bytes (2.8% Full)'");
        }

        #[test]
        fn avr_pipeline_produces_hex_and_size() {
            let temp = TempDir::new().unwrap();
            let bin = temp.path().join("bin");
            toolchain(&bin, false);

            let request = request(temp.path());
            fs::create_dir_all(&request.build_dir).unwrap();

            let firmware = link(
                Board::find("uno").unwrap(),
                &sdk(temp.path(), Some(bin)),
                "avr-",
                &[temp.path().join("main.o")],
                &temp.path().join("core.a"),
                &request,
                LinkOptions::default(),
            )
            .unwrap();

            assert_eq!(firmware.image, request.build_dir.join("blink.hex"));
            assert_eq!(fs::read_to_string(&firmware.image).unwrap(), "hex\n");
            assert_eq!(firmware.size.as_deref(), Some("Program:     924 bytes (2.8% Full)"));
        }

        #[test]
        fn link_failures_carry_the_linker_output() {
            let temp = TempDir::new().unwrap();
            let bin = temp.path().join("bin");
            toolchain(&bin, true);

            let request = request(temp.path());
            fs::create_dir_all(&request.build_dir).unwrap();

            let error = link(
                Board::find("uno").unwrap(),
                &sdk(temp.path(), Some(bin)),
                "avr-",
                &[],
                &temp.path().join("core.a"),
                &request,
                LinkOptions::empty(),
            )
            .unwrap_err();

            assert_eq!(error.to_string(), "link failed:\nundefined reference to `setup'");
            assert!(!request.build_dir.join("blink.hex").exists());
        }
    }
}
