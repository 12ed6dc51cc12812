use crate::error::Error;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

/// Byte-level access to the flash over an SPI bus with a manually driven,
/// active-low chip-select line.
///
/// A logical command is bracketed by [`select`](Self::select) and
/// [`deselect`](Self::deselect). Deasserting chip-select in the middle of a
/// command aborts it on the device side.
pub struct FlashBus<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS> FlashBus<SPI, CS>
where
    SPI: SpiBus,
    CS: OutputPin,
{
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self { spi, cs }
    }

    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    /// Assert chip-select.
    pub fn select(&mut self) -> Result<(), Error<SPI, CS>> {
        self.cs.set_low().map_err(Error::Pin)
    }

    /// Wait for the bus to go idle, then deassert chip-select.
    pub fn deselect(&mut self) -> Result<(), Error<SPI, CS>> {
        self.spi.flush().map_err(Error::Spi)?;
        self.cs.set_high().map_err(Error::Pin)
    }

    /// Exchange one byte full-duplex.
    pub fn transfer(&mut self, byte: u8) -> Result<u8, Error<SPI, CS>> {
        let mut buf = [byte];
        self.spi.transfer_in_place(&mut buf).map_err(Error::Spi)?;
        Ok(buf[0])
    }

    /// Clock out `bytes`, discarding whatever the device sends back.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), Error<SPI, CS>> {
        self.spi.write(bytes).map_err(Error::Spi)
    }

    /// Fill `buf` with bytes clocked in from the device.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<(), Error<SPI, CS>> {
        self.spi.read(buf).map_err(Error::Spi)
    }

    /// Run `f` with chip-select asserted. Chip-select is released again even
    /// if `f` fails; the first error wins.
    pub fn transaction<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, Error<SPI, CS>>,
    ) -> Result<R, Error<SPI, CS>> {
        self.select()?;
        let result = f(self);
        let released = self.deselect();
        let value = result?;
        released?;
        Ok(value)
    }
}
