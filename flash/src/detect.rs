//! Detección de puertos serie y de las tarjetas conectadas a ellos.
//!
//! En Linux se recorre `/sys/class/tty`: cada `ttyUSB*` o `ttyACM*` apunta
//! a un nodo de `/sys/devices`, y algún ancestro de ese nodo es el
//! dispositivo USB con `idVendor` e `idProduct`. En macOS se listan los
//! `/dev/cu.*` con aspecto de adaptador serie y sus identificadores salen
//! de `ioreg`. En Windows los puertos `COM*` vienen de `wmic` o, si no
//! está, del registro, este último sin identificadores.

use std::{
    collections::HashMap,
    fmt::{self, Display},
    fs,
    path::Path,
    process::Command,
};

use tracing::debug;
use tsuki::board::Board;

use crate::{error::FlashError, tool};

/// Niveles a subir desde el nodo de la tty en busca del dispositivo USB.
const SYSFS_DEPTH: usize = 6;

/// Par vendedor:producto de un dispositivo USB.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct UsbId {
    pub vid: u16,
    pub pid: u16,
}

impl Display for UsbId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{:04x}:{:04x}", self.vid, self.pid)
    }
}

/// Un dispositivo reconocido y la tarjeta que suele venir con él.
#[derive(Debug, PartialEq, Eq)]
pub struct Device {
    pub id: UsbId,
    pub board: &'static str,
    pub name: &'static str,
}

macro_rules! known {
    ($($vid:literal : $pid:literal => $board:literal, $name:literal;)*) => {
        &[$(Device {
            id: UsbId { vid: $vid, pid: $pid },
            board: $board,
            name: $name,
        }),*]
    };
}

/// Los adaptadores genéricos (CH340, FTDI, CP210x) se asocian a la
/// tarjeta más común que los trae.
static KNOWN: &[Device] = known! {
    0x2341:0x0043 => "uno", "Arduino Uno R3";
    0x2341:0x0001 => "uno", "Arduino Uno";
    0x2341:0x0010 => "mega", "Arduino Mega 2560";
    0x2341:0x0042 => "mega", "Arduino Mega 2560 R3";
    0x2341:0x0036 => "leonardo", "Arduino Leonardo (bootloader)";
    0x2341:0x8036 => "leonardo", "Arduino Leonardo";
    0x2341:0x0037 => "micro", "Arduino Micro (bootloader)";
    0x2341:0x8037 => "micro", "Arduino Micro";
    0x2341:0x003d => "due", "Arduino Due (programming port)";
    0x2341:0x003e => "due", "Arduino Due (native port)";
    0x2a03:0x0043 => "uno", "Arduino Uno (arduino.org)";
    0x2a03:0x0010 => "mega", "Arduino Mega (arduino.org)";
    0x1a86:0x7523 => "nano", "CH340 serial adapter";
    0x1a86:0x7522 => "nano", "CH340C serial adapter";
    0x1a86:0x55d4 => "esp32", "CH9102 serial adapter";
    0x0403:0x6001 => "nano", "FTDI FT232R";
    0x0403:0x6015 => "nano", "FTDI FT-X";
    0x10c4:0xea60 => "esp32", "CP2102 serial adapter";
    0x10c4:0xea70 => "esp32", "CP2105 serial adapter";
    0x2e8a:0x000a => "pico", "Raspberry Pi Pico";
    0x2e8a:0x0005 => "pico", "Raspberry Pi Pico (MicroPython)";
    0x2e8a:0x000f => "pico", "Raspberry Pi Pico W";
};

/// Busca un identificador USB en la tabla de dispositivos conocidos.
pub fn identify(id: UsbId) -> Option<&'static Device> {
    KNOWN.iter().find(|device| device.id == id)
}

/// Un puerto serie visible en el sistema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Port {
    pub path: String,
    pub id: Option<UsbId>,
}

impl Port {
    pub fn device(&self) -> Option<&'static Device> {
        self.id.and_then(identify)
    }
}

impl Display for Port {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(fmt, "{} ({})", self.path, id),
            None => write!(fmt, "{} (unknown)", self.path),
        }
    }
}

/// Puertos serie del sistema, ordenados por ruta.
pub fn scan() -> Vec<Port> {
    if cfg!(target_os = "linux") {
        scan_sysfs(Path::new("/sys/class/tty"), Path::new("/dev"))
    } else if cfg!(target_os = "macos") {
        let mut ports = scan_dev(Path::new("/dev"));
        let ids = output_of(Command::new("ioreg").args(&["-r", "-c", "IOUSBHostDevice", "-l"]))
            .map(|text| parse_ioreg(&text))
            .unwrap_or_default();

        for port in &mut ports {
            port.id = ids.get(&port.path).copied();
        }

        ports
    } else if cfg!(windows) {
        scan_windows()
    } else {
        Vec::new()
    }
}

/// Salida estándar de una herramienta del sistema, si existe y termina bien.
fn output_of(command: &mut Command) -> Option<String> {
    let output = tool::run(command).ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Recorre un árbol con la forma de `/sys/class/tty`.
pub fn scan_sysfs(class_dir: &Path, dev_dir: &Path) -> Vec<Port> {
    let entries = match fs::read_dir(class_dir) {
        Ok(entries) => entries,
        Err(error) => {
            debug!(dir = %class_dir.display(), %error, "cannot list ttys");
            return Vec::new();
        }
    };

    let mut ports: Vec<_> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with("ttyUSB") && !name.starts_with("ttyACM") {
                return None;
            }

            let path = dev_dir.join(&name);
            if !path.exists() {
                return None;
            }

            Some(Port {
                path: path.to_string_lossy().into_owned(),
                id: usb_id(&entry.path().join("device")),
            })
        })
        .collect();

    ports.sort_by(|a, b| a.path.cmp(&b.path));
    ports
}

fn usb_id(device: &Path) -> Option<UsbId> {
    let mut dir = fs::canonicalize(device).ok()?;

    for _ in 0..=SYSFS_DEPTH {
        if let (Some(vid), Some(pid)) = (read_hex(&dir.join("idVendor")), read_hex(&dir.join("idProduct"))) {
            return Some(UsbId { vid, pid });
        }

        if !dir.pop() {
            break;
        }
    }

    None
}

fn read_hex(path: &Path) -> Option<u16> {
    let text = fs::read_to_string(path).ok()?;
    u16::from_str_radix(text.trim(), 16).ok()
}

/// Lista los `cu.*` de un directorio con la forma de `/dev` en macOS.
pub fn scan_dev(dev_dir: &Path) -> Vec<Port> {
    let mut ports: Vec<_> = fs::read_dir(dev_dir)
        .into_iter()
        .flatten()
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let serial = name.starts_with("cu.")
                && ["usb", "serial", "SLAB"].iter().any(|hint| name.contains(hint));

            serial.then(|| Port {
                path: entry.path().to_string_lossy().into_owned(),
                id: None,
            })
        })
        .collect();

    ports.sort_by(|a, b| a.path.cmp(&b.path));
    ports
}

/// Asocia rutas de `/dev` con el dispositivo USB que las expone, a partir
/// de la salida de `ioreg -r -c IOUSBHostDevice -l`.
///
/// Cada dispositivo es un bloque entre llaves; sus hijos, marcados con
/// `|`, incluyen `IOCalloutDevice` y `IODialinDevice`.
pub fn parse_ioreg(text: &str) -> HashMap<String, UsbId> {
    let mut ids = HashMap::new();
    let (mut vid, mut pid) = (None, None);
    let mut paths = Vec::new();

    for line in text.lines() {
        let line = line.trim_matches(|c: char| c == '|' || c.is_whitespace());
        let value = || line.splitn(2, '=').nth(1).map(str::trim);

        if line.starts_with("\"idVendor\"") {
            vid = value().and_then(ioreg_number);
        } else if line.starts_with("\"idProduct\"") {
            pid = value().and_then(ioreg_number);
        } else if line.starts_with("\"IOCalloutDevice\"") || line.starts_with("\"IODialinDevice\"") {
            let path = value().map(|value| value.trim_matches('"'));
            paths.extend(path.filter(|path| path.starts_with("/dev/")).map(String::from));
        } else if line == "}" {
            if let (Some(vid), Some(pid)) = (vid, pid) {
                for path in paths.drain(..) {
                    ids.insert(path, UsbId { vid, pid });
                }
            }

            vid = None;
            pid = None;
            paths.clear();
        }
    }

    ids
}

/// `6790` o `0x1a86`.
fn ioreg_number(text: &str) -> Option<u16> {
    let text = text.split_whitespace().next()?;
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

fn scan_windows() -> Vec<Port> {
    let wmic = output_of(Command::new("wmic").args(&[
        "path",
        "Win32_SerialPort",
        "get",
        "DeviceID,PNPDeviceID",
        "/FORMAT:CSV",
    ]));

    let ports = wmic.as_deref().map(parse_wmic).unwrap_or_default();
    if !ports.is_empty() {
        return ports;
    }

    output_of(Command::new("reg").args(&["query", r"HKLM\HARDWARE\DEVICEMAP\SERIALCOMM"]))
        .map(|text| parse_serialcomm(&text))
        .unwrap_or_default()
}

/// Lee el CSV de `wmic path Win32_SerialPort get DeviceID,PNPDeviceID`:
/// `Node,DeviceID,PNPDeviceID`, con identificadores como
/// `USB\VID_1A86&PID_7523\5&2A4B...`.
pub fn parse_wmic(text: &str) -> Vec<Port> {
    let mut ports: Vec<_> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("Node"))
        .filter_map(|line| {
            let mut columns = line.split(',').skip(1).map(str::trim);
            let device = columns.next()?;
            let pnp = columns.next().unwrap_or("");

            device.starts_with("COM").then(|| Port {
                path: device.to_owned(),
                id: pnp_id(pnp),
            })
        })
        .collect();

    ports.sort_by(|a, b| a.path.cmp(&b.path));
    ports
}

fn pnp_id(pnp: &str) -> Option<UsbId> {
    let upper = pnp.to_ascii_uppercase();
    let field = |key: &str| {
        let start = upper.find(key)? + key.len();
        upper.get(start..start + 4).and_then(|hex| u16::from_str_radix(hex, 16).ok())
    };

    Some(UsbId {
        vid: field("VID_")?,
        pid: field("PID_")?,
    })
}

/// Lee `reg query HKLM\HARDWARE\DEVICEMAP\SERIALCOMM`, donde cada valor
/// tiene la forma `\Device\Serial0    REG_SZ    COM1`.
pub fn parse_serialcomm(text: &str) -> Vec<Port> {
    let mut ports: Vec<_> = text
        .lines()
        .filter_map(|line| {
            let columns: Vec<_> = line.split_whitespace().collect();
            match columns.as_slice() {
                [_, "REG_SZ", port, ..] if port.starts_with("COM") => Some(Port {
                    path: (*port).to_owned(),
                    id: None,
                }),

                _ => None,
            }
        })
        .collect();

    ports.sort_by(|a, b| a.path.cmp(&b.path));
    ports
}

/// Elige el puerto de una tarjeta.
///
/// Primero uno cuyo dispositivo conocido sea de la misma arquitectura,
/// luego cualquier dispositivo conocido.
pub fn choose<'a>(board: &Board, ports: &'a [Port]) -> Option<&'a Port> {
    let same_arch = |port: &&Port| {
        port.device()
            .and_then(|device| Board::find(device.board).ok())
            .map_or(false, |known| known.arch() == board.arch())
    };

    ports
        .iter()
        .find(same_arch)
        .or_else(|| ports.iter().find(|port| port.device().is_some()))
}

/// Detecta el puerto de una tarjeta o explica qué puertos hay.
pub fn port_for(board: &Board) -> Result<String, FlashError> {
    let ports = scan();
    debug!(count = ports.len(), "serial ports found");

    match choose(board, &ports) {
        Some(port) => Ok(port.path.clone()),
        None => Err(FlashError::NoDevice {
            ports: ports.iter().map(Port::to_string).collect(),
        }),
    }
}
