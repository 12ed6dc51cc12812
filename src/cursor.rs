use crate::comms::{command_header, FlashSpi, Opcode};
use crate::error::Error;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

/// Value a NOR cell reads as after erase.
pub const ERASED_SENTINEL: u8 = 0xFF;
/// Consecutive erased bytes that mark the start of unused flash.
pub const ERASED_RUN_THRESHOLD: u32 = 16;
/// Cursor alignment inside the erased run.
pub const CURSOR_ALIGNMENT: u32 = 16;

/// Where the next record goes, and whether writing is allowed at all.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WriteCursor {
    pub next_write_address: u32,
    pub write_permitted: bool,
}

impl WriteCursor {
    pub(crate) fn grant(&mut self, address: u32) {
        self.next_write_address = address;
        self.write_permitted = true;
    }

    pub(crate) fn revoke(&mut self) {
        self.write_permitted = false;
    }

    pub(crate) fn advance(&mut self, len: usize) {
        self.next_write_address += len as u32;
    }
}

/// Tracks the current run of erased bytes in a linear stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErasedRunScanner {
    run: u32,
}

impl ErasedRunScanner {
    pub const fn new() -> Self {
        Self { run: 0 }
    }

    /// Feed the byte read at `addr`. Returns the aligned cursor address once
    /// the run reaches [`ERASED_RUN_THRESHOLD`].
    pub fn feed(&mut self, addr: u32, byte: u8) -> Option<u32> {
        if byte != ERASED_SENTINEL {
            self.run = 0;
            return None;
        }
        self.run += 1;
        if self.run == ERASED_RUN_THRESHOLD {
            Some(addr & !(CURSOR_ALIGNMENT - 1))
        } else {
            None
        }
    }
}

impl<SPI, CS, D> FlashSpi<SPI, CS, D>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
    /// Streams the array from the start with a single Read Data (03h)
    /// instruction, stopping at the first run of erased bytes.
    ///
    /// On success the cursor is moved to the aligned start of the run and
    /// writing is permitted. If the whole device is read without finding one,
    /// `None` is returned and writing stays disabled.
    pub fn scan_for_erased_region(&mut self) -> Result<Option<u32>, Error<SPI, CS>> {
        let geometry = self.config.geometry;
        self.wait_done()?;

        let header = command_header(Opcode::Read, geometry.start_addr);
        let found = self.bus.transaction(|bus| {
            bus.write(&header)?;
            let mut scanner = ErasedRunScanner::new();
            for addr in geometry.start_addr..=geometry.end_addr {
                let byte = bus.transfer(0x00)?;
                if let Some(start) = scanner.feed(addr, byte) {
                    return Ok(Some(start));
                }
            }
            Ok(None)
        })?;

        match found {
            Some(start) => {
                info!("Start of unused flash at {:#x}", start);
                self.cursor.grant(start);
            }
            None => {
                warn!("No erased region found, writes disabled");
                self.cursor.revoke();
            }
        }
        Ok(found)
    }

    /// Appends `data` at the cursor with a single Page Program instruction
    /// and advances the cursor past it. Returns the new cursor address.
    ///
    /// The write is refused without any bus traffic if it would run past the
    /// end of the device ([`Error::CapacityExhausted`], fatal), straddle a
    /// page ([`Error::PageBoundary`], the caller may retry with other data),
    /// or if writing is not permitted ([`Error::WriteNotPermitted`]). A
    /// rejected write enable leaves the cursor where it was and revokes
    /// permission.
    pub fn write_data(&mut self, data: &[u8]) -> Result<u32, Error<SPI, CS>> {
        let geometry = self.config.geometry;
        let address = self.cursor.next_write_address;

        if !geometry.fits_in_capacity(address, data.len()) {
            error!(
                "Not enough flash left: {} bytes at {:#x}",
                data.len(),
                address
            );
            return Err(Error::CapacityExhausted {
                address,
                len: data.len(),
            });
        }
        if !geometry.fits_in_page(address, data.len()) {
            warn!(
                "Write of {} bytes at {:#x} crosses a page boundary",
                data.len(),
                address
            );
            return Err(Error::PageBoundary {
                address,
                len: data.len(),
            });
        }
        if !self.cursor.write_permitted {
            return Err(Error::WriteNotPermitted);
        }
        if data.is_empty() {
            return Ok(address);
        }

        self.write_enable()?;
        self.program_page_unchecked(address, data)?;
        self.cursor.advance(data.len());
        trace!("Cursor advanced to {:#x}", self.cursor.next_write_address);
        Ok(self.cursor.next_write_address)
    }
}
