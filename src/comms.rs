// Refer to the W25X20CL/W25X20L datasheet for instruction timing diagrams.
use crate::bus::FlashBus;
use crate::config::FlashConfig;
use crate::cursor::WriteCursor;
use crate::error::Error;
use crate::identification::ChipIdentity;
use crate::traits::HardwareFlashDevice;
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

pub struct FlashSpi<SPI, CS, D> {
    pub(crate) bus: FlashBus<SPI, CS>,
    pub(crate) delay: D,
    pub(crate) config: FlashConfig,
    pub(crate) cursor: WriteCursor,
}

impl<SPI, CS, D> Debug for FlashSpi<SPI, CS, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FlashSpi")
            .field("config", &self.config)
            .field("cursor", &self.cursor)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Opcode {
    /// Read the 8-bit manufacturer and device IDs.
    ReadMfDId = 0x90,
    /// Set the write enable latch.
    WriteEnable = 0x06,
    /// Read the 8-bit status register.
    ReadStatus = 0x05,
    Read = 0x03,
    PageProg = 0x02,
    ChipErase = 0xC7,
}

bitflags::bitflags! {
    /// Status register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        /// Erase or write in progress.
        const BUSY = 1 << 0;
        /// Status of the **W**rite **E**nable **L**atch.
        const WEL = 1 << 1;
        /// The 2 block protection bits.
        const PROT = 0b0000_1100;
        /// Top/bottom protection select.
        const TB = 1 << 5;
        /// **S**tatus **R**egister **P**rotect bit.
        const SRP = 1 << 7;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Status {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Status({=u8:#04x})", self.bits())
    }
}

/// Instruction byte followed by a 24-bit big-endian address.
pub(crate) fn command_header(opcode: Opcode, addr: u32) -> [u8; 4] {
    let [_, high, mid, low] = addr.to_be_bytes();
    [opcode as u8, high, mid, low]
}

impl<SPI, CS, D> FlashSpi<SPI, CS, D>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
    /// Wraps the bus without talking to the device.
    pub fn new(spi: SPI, cs: CS, delay: D, config: FlashConfig) -> Self {
        Self {
            bus: FlashBus::new(spi, cs),
            delay,
            config,
            cursor: WriteCursor::default(),
        }
    }

    /// Wraps the bus and waits for any operation left over from before a
    /// reset to finish. That may be a whole chip erase, so the wait is
    /// bounded by [`Timing::startup_poll_limit`](crate::config::Timing::startup_poll_limit).
    pub fn init(spi: SPI, cs: CS, delay: D, config: FlashConfig) -> Result<Self, Error<SPI, CS>> {
        let mut this = Self::new(spi, cs, delay, config);
        this.bus.deselect()?;
        this.wait_startup()?;
        let status = this.read_status()?;
        debug!("Initial status: {:?}", status);
        Ok(this)
    }

    pub fn config(&self) -> &FlashConfig {
        &self.config
    }

    pub fn cursor(&self) -> &WriteCursor {
        &self.cursor
    }

    pub fn release(self) -> (SPI, CS, D) {
        let (spi, cs) = self.bus.release();
        (spi, cs, self.delay)
    }

    pub fn is_busy(&mut self) -> Result<bool, Error<SPI, CS>> {
        let status = self.read_status()?;
        Ok(status.contains(Status::BUSY))
    }

    pub fn is_wel(&mut self) -> Result<bool, Error<SPI, CS>> {
        let status = self.read_status()?;
        Ok(status.contains(Status::WEL))
    }

    /// Writes a command to the SPI bus
    fn command(&mut self, bytes: &[u8]) -> Result<(), Error<SPI, CS>> {
        self.bus.transaction(|bus| bus.write(bytes))
    }

    /// Writes a command to the SPI bus, then clocks the response into `response`
    fn command_with_response(
        &mut self,
        instruction: &[u8],
        response: &mut [u8],
    ) -> Result<(), Error<SPI, CS>> {
        self.bus.transaction(|bus| {
            bus.write(instruction)?;
            bus.read(response)
        })
    }

    /// Reads the status register. This is the only instruction the device
    /// accepts while BUSY is set.
    pub fn read_status(&mut self) -> Result<Status, Error<SPI, CS>> {
        let mut response = [0u8; 1];
        self.command_with_response(&[Opcode::ReadStatus as u8], &mut response)?;
        Ok(Status::from_bits_retain(response[0]))
    }

    /// Read Manufacturer / Device ID (90h)
    /// The instruction code is followed by a 24-bit address of 000000h; the
    /// device then shifts out the manufacturer ID followed by the device ID.
    ///
    /// This is the first query after boot, so it allows for an erase that
    /// was still running when the board was reset.
    pub fn read_identification(&mut self) -> Result<ChipIdentity, Error<SPI, CS>> {
        self.wait_startup()?;
        let mut response = [0u8; 2];
        self.command_with_response(&[Opcode::ReadMfDId as u8, 0, 0, 0], &mut response)?;
        let identity = ChipIdentity::new(response[0], response[1]);
        if !identity.is_expected() {
            warn!(
                "Unexpected flash identity: mfr {:#x}, device {:#x}",
                identity.manufacturer_id,
                identity.device_id
            );
        }
        Ok(identity)
    }

    /// Block until the status of the device is not busy, polling at the
    /// configured interval. Gives up with [`Error::Unresponsive`] once the
    /// poll limit is reached.
    pub fn wait_done(&mut self) -> Result<(), Error<SPI, CS>> {
        self.wait_ready_within(self.config.timing.ready_poll_limit)
    }

    fn wait_startup(&mut self) -> Result<(), Error<SPI, CS>> {
        self.wait_ready_within(self.config.timing.startup_poll_limit())
    }

    fn wait_ready_within(&mut self, limit: u32) -> Result<(), Error<SPI, CS>> {
        let timing = self.config.timing;
        let mut polls = 0;
        while self.is_busy()? {
            if polls >= limit {
                error!("Flash still busy after {} polls", polls);
                return Err(Error::Unresponsive { polls });
            }
            polls += 1;
            self.delay.delay_us(timing.ready_poll_interval_us);
        }
        Ok(())
    }

    /// The Write Enable instruction sets the Write Enable Latch (WEL) bit
    /// in the Status Register to a 1. The WEL bit must be set prior to every
    /// Page Program, Sector Erase, Block Erase, Chip Erase and Write Status
    /// Register instruction, and the device clears it again once that
    /// instruction completes.
    ///
    /// The latch is read back after the instruction. If it is not set, the
    /// write cursor loses its permission and [`Error::WriteEnableRejected`]
    /// is returned. A latch that is already set stays set.
    pub fn write_enable(&mut self) -> Result<(), Error<SPI, CS>> {
        self.wait_done()?;
        self.command(&[Opcode::WriteEnable as u8])?;
        if !self.is_wel()? {
            error!("Write enable failed");
            self.cursor.revoke();
            return Err(Error::WriteEnableRejected);
        }
        Ok(())
    }

    /// Chip Erase (C7h), reporting each status poll to `on_poll` while the
    /// erase runs.
    ///
    /// The erase instruction is only issued once the write enable latch has
    /// been observed; a rejected write enable aborts before touching the
    /// array.
    pub fn chip_erase_with_progress(
        &mut self,
        mut on_poll: impl FnMut(u32),
    ) -> Result<(), Error<SPI, CS>> {
        self.write_enable()?;
        self.wait_done()?;
        self.command(&[Opcode::ChipErase as u8])?;

        let timing = self.config.timing;
        let mut polls = 0;
        while self.is_busy()? {
            if polls >= timing.erase_poll_limit {
                error!("Chip erase did not finish after {} polls", polls);
                return Err(Error::Unresponsive { polls });
            }
            self.delay.delay_ms(timing.erase_poll_interval_ms);
            polls += 1;
            on_poll(polls);
        }
        info!("Chip erase complete after {} polls", polls);
        Ok(())
    }

    /// Issues the Page Program instruction for `data` at `addr` and waits
    /// out the program time. The caller has already checked the page
    /// boundary and set the write enable latch.
    pub(crate) fn program_page_unchecked(
        &mut self,
        addr: u32,
        data: &[u8],
    ) -> Result<(), Error<SPI, CS>> {
        self.wait_done()?;
        let header = command_header(Opcode::PageProg, addr);
        self.bus.transaction(|bus| {
            bus.write(&header)?;
            bus.write(data)
        })?;
        self.delay.delay_ms(self.config.timing.program_settle_ms);
        Ok(())
    }
}

impl<SPI, CS, D> HardwareFlashDevice for FlashSpi<SPI, CS, D>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
    type Error = Error<SPI, CS>;

    fn start_addr(&self) -> u32 {
        self.config.geometry.start_addr
    }

    fn page_bytes(&self) -> u32 {
        self.config.geometry.page_bytes
    }

    fn page_count(&self) -> u32 {
        self.config.geometry.page_count()
    }

    /// Read Data (03h)
    /// Reads flash contents into `buf`, starting at `addr`. The device
    /// auto-increments its internal address for every byte clocked out while
    /// /CS stays low.
    ///
    /// Only 24 bits of `addr` are transferred to the device.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error<SPI, CS>> {
        if buf.is_empty() {
            return Ok(());
        }
        self.wait_done()?;
        let header = command_header(Opcode::Read, addr);
        self.bus.transaction(|bus| {
            bus.write(&header)?;
            bus.read(buf)
        })
    }

    /// Page Program (02h)
    /// The Page Program instruction allows from one byte to 256 bytes (a page)
    /// of data to be programmed at previously erased (FFh) memory locations.
    /// Writes that would wrap around the end of the page are rejected here
    /// rather than left to the device, which would silently wrap to the start
    /// of the same page.
    fn page_program(&mut self, addr: u32, data: &[u8]) -> Result<(), Error<SPI, CS>> {
        let geometry = self.config.geometry;
        if !geometry.fits_in_capacity(addr, data.len()) {
            return Err(Error::CapacityExhausted {
                address: addr,
                len: data.len(),
            });
        }
        if !geometry.fits_in_page(addr, data.len()) {
            return Err(Error::PageBoundary {
                address: addr,
                len: data.len(),
            });
        }
        self.write_enable()?;
        self.program_page_unchecked(addr, data)
    }

    /// Chip Erase (C7h)
    /// Sets all memory within the device to the erased state of all 1s (FFh).
    fn chip_erase(&mut self) -> Result<(), Error<SPI, CS>> {
        self.chip_erase_with_progress(|_| {})
    }
}
