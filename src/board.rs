//! Tabla de tarjetas soportadas.
//!
//! Una tarjeta determina la familia de microcontrolador, la toolchain que
//! la compila y el programador que la flashea. El transpilador solo
//! consulta el ancho de `int`; el resto de la tabla lo usa `tsuki-flash`.

use std::fmt::{self, Display};

use thiserror::Error;
use unicase::UniCase;

/// Familia de compilador y programador.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Toolchain {
    /// avr-gcc y avrdude.
    Avr {
        mcu: &'static str,
        f_cpu: u32,
        programmer: &'static str,
        baud: u32,
    },

    /// Atmel SAM, arm-none-eabi-gcc y bossac.
    Sam { mcu: &'static str, f_cpu: u32 },

    /// Raspberry Pi RP2040.
    Rp2040,

    /// xtensa-esp32-elf-gcc y esptool.
    Esp32 { variant: &'static str },

    /// xtensa-lx106-elf-gcc y esptool.
    Esp8266,
}

/// Una entrada de la tabla de tarjetas.
#[derive(Debug)]
pub struct Board {
    pub id: &'static str,
    pub name: &'static str,
    pub fqbn: &'static str,

    /// Subdirectorio de `variants/` con el `pins_arduino.h` de la tarjeta.
    pub variant: &'static str,

    pub flash_kb: u32,
    pub ram_kb: u32,
    pub toolchain: Toolchain,

    /// Macros `-D` propias de la tarjeta.
    pub defines: &'static [&'static str],
}

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("unknown board `{id}` (valid boards: {valid})")]
    Unknown { id: String, valid: String },
}

impl Board {
    /// Lista completa de tarjetas, en orden estable.
    pub fn catalog() -> &'static [Board] {
        BOARDS
    }

    /// Busca una tarjeta por identificador, sin distinguir mayúsculas.
    pub fn find(id: &str) -> Result<&'static Board, BoardError> {
        let wanted = UniCase::new(id);
        BOARDS
            .iter()
            .find(|board| UniCase::new(board.id) == wanted)
            .ok_or_else(|| BoardError::Unknown {
                id: id.to_owned(),
                valid: BOARDS.iter().map(|board| board.id).collect::<Vec<_>>().join(", "),
            })
    }

    /// Subarquitectura dentro del SDK de Arduino.
    pub fn arch(&self) -> &'static str {
        match self.toolchain {
            Toolchain::Avr { .. } => "avr",
            Toolchain::Sam { .. } => "sam",
            Toolchain::Rp2040 => "rp2040",
            Toolchain::Esp32 { .. } => "esp32",
            Toolchain::Esp8266 => "esp8266",
        }
    }

    /// Frecuencia de CPU en Hz.
    pub fn f_cpu(&self) -> u32 {
        match self.toolchain {
            Toolchain::Avr { f_cpu, .. } | Toolchain::Sam { f_cpu, .. } => f_cpu,
            Toolchain::Rp2040 => 133_000_000,
            Toolchain::Esp32 { .. } => 240_000_000,
            Toolchain::Esp8266 => 80_000_000,
        }
    }

    /// Ancho en bits del tipo `int` de C++ en esta tarjeta.
    pub fn int_bits(&self) -> u32 {
        match self.toolchain {
            Toolchain::Avr { .. } => 16,
            _ => 32,
        }
    }

    /// Vendedor del paquete de hardware en el SDK.
    pub fn vendor(&self) -> &'static str {
        self.fqbn.split(':').next().unwrap_or("arduino")
    }
}

impl Display for Board {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{} ({})", self.name, self.fqbn)
    }
}

static BOARDS: &[Board] = &[
    Board {
        id: "uno",
        name: "Arduino Uno",
        fqbn: "arduino:avr:uno",
        variant: "standard",
        flash_kb: 32,
        ram_kb: 2,
        toolchain: Toolchain::Avr {
            mcu: "atmega328p",
            f_cpu: 16_000_000,
            programmer: "arduino",
            baud: 115200,
        },
        defines: &["ARDUINO_AVR_UNO", "ARDUINO_ARCH_AVR"],
    },
    Board {
        id: "nano",
        name: "Arduino Nano",
        fqbn: "arduino:avr:nano",
        variant: "eightanaloginputs",
        flash_kb: 32,
        ram_kb: 2,
        toolchain: Toolchain::Avr {
            mcu: "atmega328p",
            f_cpu: 16_000_000,
            programmer: "arduino",
            baud: 115200,
        },
        defines: &["ARDUINO_AVR_NANO", "ARDUINO_ARCH_AVR"],
    },
    Board {
        id: "nano_old",
        name: "Arduino Nano (old bootloader)",
        fqbn: "arduino:avr:nano:cpu=atmega328old",
        variant: "eightanaloginputs",
        flash_kb: 32,
        ram_kb: 2,
        toolchain: Toolchain::Avr {
            mcu: "atmega328p",
            f_cpu: 16_000_000,
            programmer: "arduino",
            baud: 57600,
        },
        defines: &["ARDUINO_AVR_NANO", "ARDUINO_ARCH_AVR"],
    },
    Board {
        id: "mega",
        name: "Arduino Mega 2560",
        fqbn: "arduino:avr:mega",
        variant: "mega",
        flash_kb: 256,
        ram_kb: 8,
        toolchain: Toolchain::Avr {
            mcu: "atmega2560",
            f_cpu: 16_000_000,
            programmer: "wiring",
            baud: 115200,
        },
        defines: &["ARDUINO_AVR_MEGA2560", "ARDUINO_ARCH_AVR"],
    },
    Board {
        id: "leonardo",
        name: "Arduino Leonardo",
        fqbn: "arduino:avr:leonardo",
        variant: "leonardo",
        flash_kb: 32,
        ram_kb: 2,
        toolchain: Toolchain::Avr {
            mcu: "atmega32u4",
            f_cpu: 16_000_000,
            programmer: "avr109",
            baud: 57600,
        },
        defines: &["ARDUINO_AVR_LEONARDO", "ARDUINO_ARCH_AVR", "USB_VID=0x2341", "USB_PID=0x0036"],
    },
    Board {
        id: "micro",
        name: "Arduino Micro",
        fqbn: "arduino:avr:micro",
        variant: "micro",
        flash_kb: 32,
        ram_kb: 2,
        toolchain: Toolchain::Avr {
            mcu: "atmega32u4",
            f_cpu: 16_000_000,
            programmer: "avr109",
            baud: 57600,
        },
        defines: &["ARDUINO_AVR_MICRO", "ARDUINO_ARCH_AVR", "USB_VID=0x2341", "USB_PID=0x0037"],
    },
    Board {
        id: "pro_mini_5v",
        name: "Arduino Pro Mini 5V",
        fqbn: "arduino:avr:pro:cpu=16MHzatmega328",
        variant: "eightanaloginputs",
        flash_kb: 32,
        ram_kb: 2,
        toolchain: Toolchain::Avr {
            mcu: "atmega328p",
            f_cpu: 16_000_000,
            programmer: "arduino",
            baud: 57600,
        },
        defines: &["ARDUINO_AVR_PRO", "ARDUINO_ARCH_AVR"],
    },
    Board {
        id: "pro_mini_3v3",
        name: "Arduino Pro Mini 3.3V",
        fqbn: "arduino:avr:pro:cpu=8MHzatmega328",
        variant: "eightanaloginputs",
        flash_kb: 32,
        ram_kb: 2,
        toolchain: Toolchain::Avr {
            mcu: "atmega328p",
            f_cpu: 8_000_000,
            programmer: "arduino",
            baud: 57600,
        },
        defines: &["ARDUINO_AVR_PRO", "ARDUINO_ARCH_AVR"],
    },
    Board {
        id: "due",
        name: "Arduino Due",
        fqbn: "arduino:sam:arduino_due_x",
        variant: "arduino_due_x",
        flash_kb: 512,
        ram_kb: 96,
        toolchain: Toolchain::Sam {
            mcu: "cortex-m3",
            f_cpu: 84_000_000,
        },
        defines: &["ARDUINO_SAM_DUE", "ARDUINO_ARCH_SAM", "__SAM3X8E__"],
    },
    Board {
        id: "pico",
        name: "Raspberry Pi Pico",
        fqbn: "rp2040:rp2040:rpipico",
        variant: "rpipico",
        flash_kb: 2048,
        ram_kb: 264,
        toolchain: Toolchain::Rp2040,
        defines: &["ARDUINO_RASPBERRY_PI_PICO", "ARDUINO_ARCH_RP2040"],
    },
    Board {
        id: "esp32",
        name: "ESP32 Dev Module",
        fqbn: "esp32:esp32:esp32",
        variant: "esp32",
        flash_kb: 4096,
        ram_kb: 520,
        toolchain: Toolchain::Esp32 { variant: "esp32" },
        defines: &["ARDUINO_ESP32_DEV", "ARDUINO_ARCH_ESP32", "ESP32"],
    },
    Board {
        id: "esp32s2",
        name: "ESP32-S2 Dev Module",
        fqbn: "esp32:esp32:esp32s2",
        variant: "esp32s2",
        flash_kb: 4096,
        ram_kb: 320,
        toolchain: Toolchain::Esp32 { variant: "esp32s2" },
        defines: &["ARDUINO_ESP32S2_DEV", "ARDUINO_ARCH_ESP32", "CONFIG_IDF_TARGET_ESP32S2"],
    },
    Board {
        id: "esp32c3",
        name: "ESP32-C3 Dev Module",
        fqbn: "esp32:esp32:esp32c3",
        variant: "esp32c3",
        flash_kb: 4096,
        ram_kb: 400,
        toolchain: Toolchain::Esp32 { variant: "esp32c3" },
        defines: &["ARDUINO_ESP32C3_DEV", "ARDUINO_ARCH_ESP32", "CONFIG_IDF_TARGET_ESP32C3"],
    },
    Board {
        id: "esp8266",
        name: "ESP8266 Generic",
        fqbn: "esp8266:esp8266:generic",
        variant: "esp8266",
        flash_kb: 1024,
        ram_kb: 80,
        toolchain: Toolchain::Esp8266,
        defines: &["ARDUINO_ESP8266_GENERIC", "ARDUINO_ARCH_ESP8266", "ESP8266"],
    },
    Board {
        id: "d1_mini",
        name: "Wemos D1 Mini",
        fqbn: "esp8266:esp8266:d1_mini",
        variant: "d1_mini",
        flash_kb: 4096,
        ram_kb: 80,
        toolchain: Toolchain::Esp8266,
        defines: &["ARDUINO_ESP8266_WEMOS_D1MINI", "ARDUINO_ARCH_ESP8266", "ESP8266"],
    },
    Board {
        id: "nodemcu",
        name: "NodeMCU 1.0 (ESP-12E)",
        fqbn: "esp8266:esp8266:nodemcuv2",
        variant: "nodemcu",
        flash_kb: 4096,
        ram_kb: 80,
        toolchain: Toolchain::Esp8266,
        defines: &["ARDUINO_ESP8266_NODEMCU_ESP12E", "ARDUINO_ARCH_ESP8266", "ESP8266"],
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lookup_ignores_case() {
        let board = Board::find("UNO").expect("uno is in the table");
        assert_eq!(board.id, "uno");
        assert_eq!(board.int_bits(), 16);
        assert_eq!(board.arch(), "avr");
        assert_eq!(Board::find("esp32").map(Board::int_bits), Ok(32));
    }

    #[test]
    fn unknown_board_names_valid_ids() {
        let error = Board::find("arduino-zero").unwrap_err();
        let message = error.to_string();

        assert!(message.starts_with("unknown board `arduino-zero`"));
        assert!(message.contains("uno, nano, nano_old"));
        assert!(message.contains("nodemcu"));
    }

    #[test]
    fn ids_are_unique() {
        let mut ids: Vec<_> = Board::catalog().iter().map(|board| board.id).collect();
        ids.sort_unstable();
        ids.dedup();

        assert_eq!(ids.len(), Board::catalog().len());
    }

    #[test]
    fn vendors_come_from_fqbn() {
        assert_eq!(Board::find("d1_mini").map(Board::vendor), Ok("esp8266"));
        assert_eq!(Board::find("pico").map(Board::vendor), Ok("rp2040"));
    }
}
