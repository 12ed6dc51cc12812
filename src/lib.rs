//! Bring-up diagnostics for a Winbond W25X20L SPI NOR flash.
//!
//! [`FlashSpi`] drives the chip over an [`embedded_hal::spi::SpiBus`] with a
//! separate chip-select pin: identity query, status polling with a bounded
//! wait, a checked write-enable gate, chip erase, sequential read and
//! single-page program. On top of it, [`FlashSpi::scan_for_erased_region`]
//! finds where unused flash begins and [`FlashSpi::write_data`] appends
//! records there without ever crossing a page boundary.
//!
//! [`bringup::BringUp`] ties the driver to a serial console and implements
//! the board's three modes: dump, erase and record.
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod bringup;
pub mod bus;
pub mod comms;
pub mod config;
pub mod console;
pub mod cursor;
pub mod dump;
pub mod error;
pub mod identification;
pub mod traits;

#[cfg(test)]
mod sim;

pub use bringup::{BringUp, Mode, Step};
pub use comms::{FlashSpi, Status};
pub use config::{FlashConfig, Geometry, Timing};
pub use console::Console;
pub use cursor::WriteCursor;
pub use error::{Error, SessionError};
pub use identification::ChipIdentity;
pub use traits::HardwareFlashDevice;
