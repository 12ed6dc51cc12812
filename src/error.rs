use core::fmt::{self, Debug};
use embedded_hal::digital;
use embedded_hal::spi;

/// The error type used by this library.
///
/// This can encapsulate an SPI or chip-select GPIO error, and adds its own
/// protocol errors on top of that.
pub enum Error<SPI: spi::ErrorType, CS: digital::ErrorType> {
    /// An SPI transfer failed.
    Spi(SPI::Error),
    /// Driving the chip-select line failed.
    Pin(CS::Error),
    /// BUSY never cleared within the configured number of status polls.
    Unresponsive { polls: u32 },
    /// The write enable latch was not observed after a write enable command.
    WriteEnableRejected,
    /// The write cursor does not permit programming (no erased region found,
    /// or a previous write enable was rejected).
    WriteNotPermitted,
    /// The requested write runs past the end of the device.
    CapacityExhausted { address: u32, len: usize },
    /// The requested write straddles two pages.
    PageBoundary { address: u32, len: usize },
}

impl<SPI: spi::ErrorType, CS: digital::ErrorType> Error<SPI, CS> {
    /// Errors after which the bring-up tool cannot continue without a reset.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::CapacityExhausted { .. } | Error::Unresponsive { .. }
        )
    }
}

#[cfg(feature = "defmt")]
impl<SPI: spi::ErrorType, CS: digital::ErrorType> defmt::Format for Error<SPI, CS> {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Error::Spi(_spi) => defmt::write!(fmt, "Error::Spi"),
            Error::Pin(_pin) => defmt::write!(fmt, "Error::Pin"),
            Error::Unresponsive { polls } => {
                defmt::write!(fmt, "Error::Unresponsive {{ polls: {} }}", polls)
            }
            Error::WriteEnableRejected => defmt::write!(fmt, "Error::WriteEnableRejected"),
            Error::WriteNotPermitted => defmt::write!(fmt, "Error::WriteNotPermitted"),
            Error::CapacityExhausted { address, len } => defmt::write!(
                fmt,
                "Error::CapacityExhausted {{ address: {:#x}, len: {} }}",
                address,
                len
            ),
            Error::PageBoundary { address, len } => defmt::write!(
                fmt,
                "Error::PageBoundary {{ address: {:#x}, len: {} }}",
                address,
                len
            ),
        }
    }
}

impl<SPI: spi::ErrorType, CS: digital::ErrorType> Debug for Error<SPI, CS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Spi(spi) => write!(f, "Error::Spi({:?})", spi),
            Error::Pin(pin) => write!(f, "Error::Pin({:?})", pin),
            Error::Unresponsive { polls } => {
                write!(f, "Error::Unresponsive {{ polls: {} }}", polls)
            }
            Error::WriteEnableRejected => write!(f, "Error::WriteEnableRejected"),
            Error::WriteNotPermitted => write!(f, "Error::WriteNotPermitted"),
            Error::CapacityExhausted { address, len } => write!(
                f,
                "Error::CapacityExhausted {{ address: {:#08x}, len: {} }}",
                address, len
            ),
            Error::PageBoundary { address, len } => write!(
                f,
                "Error::PageBoundary {{ address: {:#08x}, len: {} }}",
                address, len
            ),
        }
    }
}

impl<SPI: spi::ErrorType, CS: digital::ErrorType> PartialEq for Error<SPI, CS>
where
    SPI::Error: PartialEq,
    CS::Error: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::Spi(a), Error::Spi(b)) => a == b,
            (Error::Pin(a), Error::Pin(b)) => a == b,
            (Error::Unresponsive { polls: a }, Error::Unresponsive { polls: b }) => a == b,
            (Error::WriteEnableRejected, Error::WriteEnableRejected) => true,
            (Error::WriteNotPermitted, Error::WriteNotPermitted) => true,
            (
                Error::CapacityExhausted { address: a, len: l },
                Error::CapacityExhausted { address: b, len: m },
            ) => a == b && l == m,
            (
                Error::PageBoundary { address: a, len: l },
                Error::PageBoundary { address: b, len: m },
            ) => a == b && l == m,
            _ => false,
        }
    }
}

/// Failure of a bring-up session: either the flash or the diagnostic
/// transport gave up.
#[derive(Debug, PartialEq)]
pub enum SessionError<F, T> {
    Flash(F),
    Transport(T),
}

#[cfg(feature = "defmt")]
impl<F, T> defmt::Format for SessionError<F, T> {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            SessionError::Flash(_) => defmt::write!(fmt, "SessionError::Flash"),
            SessionError::Transport(_) => defmt::write!(fmt, "SessionError::Transport"),
        }
    }
}
