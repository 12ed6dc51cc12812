use crate::comms::FlashSpi;
use crate::console::Console;
use crate::dump::dump_all;
use crate::error::{Error, SessionError};
use crate::identification::ChipIdentity;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiBus;
use embedded_io::Write;

/// Record written by record mode; the first byte counts up on every attempt.
pub const TEST_RECORD: [u8; 4] = [1, 2, 3, 99];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    Dump,
    Erase,
    Record,
}

impl Mode {
    /// Dump wins if both inputs are asserted.
    pub fn select(dump_asserted: bool, erase_asserted: bool) -> Self {
        if dump_asserted {
            Mode::Dump
        } else if erase_asserted {
            Mode::Erase
        } else {
            Mode::Record
        }
    }

    /// Samples both inputs once. An input is asserted when it reads low.
    pub fn from_pins<P: InputPin>(dump: &mut P, erase: &mut P) -> Result<Self, P::Error> {
        Ok(Self::select(dump.is_low()?, erase.is_low()?))
    }
}

/// What the board should do after a session call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    /// Keep calling [`BringUp::record_step`].
    Continue,
    /// Nothing more to do until the board is reset.
    Halt,
}

pub type SessionResult<T, SPI, CS, W> =
    Result<T, SessionError<Error<SPI, CS>, <W as embedded_io::ErrorType>::Error>>;

pub struct BringUp<SPI, CS, D, W> {
    flash: FlashSpi<SPI, CS, D>,
    console: Console<W>,
    record: [u8; 4],
}

impl<SPI, CS, D, W> BringUp<SPI, CS, D, W>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
    W: Write,
{
    pub fn new(flash: FlashSpi<SPI, CS, D>, console: Console<W>) -> Self {
        Self {
            flash,
            console,
            record: TEST_RECORD,
        }
    }

    pub fn flash(&mut self) -> &mut FlashSpi<SPI, CS, D> {
        &mut self.flash
    }

    pub fn into_parts(self) -> (FlashSpi<SPI, CS, D>, Console<W>) {
        (self.flash, self.console)
    }

    fn say(&mut self, s: &str) -> SessionResult<(), SPI, CS, W> {
        self.console.print(s).map_err(SessionError::Transport)
    }

    /// Boot banner. The board has configured the UART and SPI peripherals by
    /// the time the session exists.
    pub fn announce(&mut self) -> SessionResult<(), SPI, CS, W> {
        self.say("\n\nBooting...\n")?;
        self.say("UART Initialized.\n")?;
        self.say("SPI Initialized.\n")
    }

    /// Reads and reports the chip identity. A mismatch is only a warning so
    /// the bus keeps getting exercised with whatever is fitted.
    pub fn check_identity(&mut self) -> SessionResult<ChipIdentity, SPI, CS, W> {
        let identity = self
            .flash
            .read_identification()
            .map_err(SessionError::Flash)?;
        if identity.is_expected() {
            self.say("Detected W25X20L Flash Chip.\n")?;
        } else if identity.looks_absent() {
            warn!(
                "Identity reads {:#x}/{:#x}, MISO is not driven",
                identity.manufacturer_id,
                identity.device_id
            );
            self.say("ERROR: no flash chip detected\n")?;
        } else {
            report_unexpected_identity(&mut self.console, identity)
                .map_err(SessionError::Transport)?;
        }
        Ok(identity)
    }

    /// Enters `mode` after boot. Dump and erase run to completion and halt;
    /// record mode locates the write cursor and continues.
    pub fn start(&mut self, mode: Mode) -> SessionResult<Step, SPI, CS, W> {
        info!("Starting in {:?} mode", mode);
        match mode {
            Mode::Dump => {
                self.run_dump()?;
                self.say("\n\nFlash dump complete! Reboot required.\n")?;
                Ok(Step::Halt)
            }
            Mode::Erase => {
                self.run_erase()?;
                self.say("Reboot required.\n")?;
                Ok(Step::Halt)
            }
            Mode::Record => {
                self.prepare_record()?;
                Ok(Step::Continue)
            }
        }
    }

    /// Dumps the whole device to the console; returns the printed checksum.
    pub fn run_dump(&mut self) -> SessionResult<u8, SPI, CS, W> {
        self.say("Dump input is LOW. Dumping Flash\n")?;
        dump_all(&mut self.flash, &mut self.console)
    }

    /// Erases the whole device, printing a progress line per status poll.
    pub fn run_erase(&mut self) -> SessionResult<(), SPI, CS, W> {
        self.say("Erase input is LOW. Erasing Flash.\n")?;

        let console = &mut self.console;
        let mut transport_error = None;
        let erased = self.flash.chip_erase_with_progress(|_| {
            if transport_error.is_none() {
                transport_error = console.print("Erasing...\n").err();
            }
        });
        if let Some(e) = transport_error {
            return Err(SessionError::Transport(e));
        }

        match erased {
            Ok(()) => self.say("W25X20L Erase Complete.\n"),
            Err(Error::WriteEnableRejected) => {
                self.say("ERROR: Write enable failed. Erase aborted.\n")?;
                Err(SessionError::Flash(Error::WriteEnableRejected))
            }
            Err(e) => Err(SessionError::Flash(e)),
        }
    }

    /// Locates the first unused region and reports where records will go.
    pub fn prepare_record(&mut self) -> SessionResult<Option<u32>, SPI, CS, W> {
        let found = self
            .flash
            .scan_for_erased_region()
            .map_err(SessionError::Flash)?;
        match found {
            Some(start) => {
                report_start(&mut self.console, start).map_err(SessionError::Transport)?;
            }
            None => self.say("Could not find start of memory.\n")?,
        }
        Ok(found)
    }

    /// One pass of the record loop, given the dump input sampled for this
    /// pass. While that input is grounded nothing is written and the counter
    /// stays put; otherwise the test record is appended once and its counter
    /// byte bumped.
    ///
    /// Page-boundary violations and refused writes are reported and skipped;
    /// running out of space or a hung device ends the session.
    pub fn record_step(&mut self, dump_asserted: bool) -> SessionResult<Step, SPI, CS, W> {
        if dump_asserted {
            return Ok(Step::Continue);
        }
        let record = self.record;
        self.record[0] = self.record[0].wrapping_add(1);

        match self.flash.write_data(&record) {
            Ok(_) => Ok(Step::Continue),
            Err(Error::WriteNotPermitted) => Ok(Step::Continue),
            Err(Error::PageBoundary { .. }) => {
                self.say("Aborting W25X20L write... the requested write crosses page boundaries. Not supported.\n")?;
                Ok(Step::Continue)
            }
            Err(Error::WriteEnableRejected) => {
                self.say("ERROR: Write enable failed.\n")?;
                Ok(Step::Continue)
            }
            Err(Error::CapacityExhausted { .. }) => {
                self.say("Aborting W25X20L write... not enough memory left\n")?;
                Ok(Step::Halt)
            }
            Err(Error::Unresponsive { .. }) => {
                self.say("ERROR: Flash not responding.\n")?;
                Ok(Step::Halt)
            }
            Err(e) => Err(SessionError::Flash(e)),
        }
    }
}

fn report_unexpected_identity<W: Write>(
    console: &mut Console<W>,
    identity: ChipIdentity,
) -> Result<(), W::Error> {
    console.print("WARNING: detected illegal flash chip\n")?;
    console.print("mfr_id is 0x")?;
    console.hex_byte(identity.manufacturer_id)?;
    console.newline()?;
    console.print("device_id is 0x")?;
    console.hex_byte(identity.device_id)?;
    console.newline()
}

fn report_start<W: Write>(console: &mut Console<W>, start: u32) -> Result<(), W::Error> {
    console.print("Start of memory is at 0x")?;
    console.hex_address(start)?;
    console.newline()
}
