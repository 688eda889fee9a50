//! Motor de compilación y carga de sketches de tsuki.
//!
//! Compila el C++ que emite el transpilador, junto con el core de
//! Arduino, directamente con la toolchain del SDK instalado y carga el
//! firmware con el programador de la tarjeta. La tabla de tarjetas es la
//! misma que usa el transpilador.
//!
//! # Módulos
//! - [`sdk`]: localiza el SDK de Arduino de una tarjeta.
//! - [`compile`] y [`link`]: producen el firmware, con caché incremental
//!   ([`cache`]) y compilación en paralelo.
//! - [`flash`] y [`detect`]: encuentran el puerto y cargan el firmware.

pub mod cache;
pub mod compile;
pub mod detect;
pub mod error;
pub mod flash;
pub mod link;
pub mod sdk;
pub mod tool;

pub use error::FlashError;
