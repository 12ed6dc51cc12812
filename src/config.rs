/// Linear address space of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Geometry {
    /// First addressable byte.
    pub start_addr: u32,
    /// Last addressable byte (inclusive).
    pub end_addr: u32,
    /// Bytes per program page.
    pub page_bytes: u32,
}

impl Geometry {
    pub const W25X20L: Self = Self {
        start_addr: 0x00_0000,
        end_addr: 0x03_FFFF,
        page_bytes: 256,
    };

    /// Number of addressable bytes.
    pub const fn capacity(&self) -> u32 {
        self.end_addr - self.start_addr + 1
    }

    pub const fn page_count(&self) -> u32 {
        self.capacity() / self.page_bytes
    }

    pub const fn page_offset(&self, addr: u32) -> u32 {
        addr % self.page_bytes
    }

    /// True if `len` bytes starting at `addr` stay inside one page.
    pub const fn fits_in_page(&self, addr: u32, len: usize) -> bool {
        self.page_offset(addr) as u64 + len as u64 <= self.page_bytes as u64
    }

    /// True if `len` bytes starting at `addr` stay inside the address space.
    pub const fn fits_in_capacity(&self, addr: u32, len: usize) -> bool {
        addr as u64 + len as u64 <= self.end_addr as u64 + 1
    }
}

/// Device timing. These are datasheet parameters, not algorithmic constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timing {
    /// Delay between status polls while waiting for BUSY to clear.
    pub ready_poll_interval_us: u32,
    /// Status polls before the device is declared unresponsive.
    pub ready_poll_limit: u32,
    /// Wait after a page program command (tPP).
    pub program_settle_ms: u32,
    /// Delay between status polls during a chip erase.
    pub erase_poll_interval_ms: u32,
    /// Erase polls before the device is declared unresponsive.
    pub erase_poll_limit: u32,
}

impl Timing {
    pub const W25X20L: Self = Self {
        ready_poll_interval_us: 1,
        // ~100 ms at the 1 us poll interval, well above tPP and tW
        ready_poll_limit: 100_000,
        program_settle_ms: 10,
        erase_poll_interval_ms: 100,
        // tCE max is 2.5 s; allow 4x
        erase_poll_limit: 100,
    };

    /// Ready polls that cover a whole chip erase. A device reset in the
    /// middle of an erase keeps BUSY set for that long after power-up.
    pub const fn startup_poll_limit(&self) -> u32 {
        let budget_us = self.erase_poll_limit as u64 * self.erase_poll_interval_ms as u64 * 1000;
        let interval_us = if self.ready_poll_interval_us == 0 {
            1
        } else {
            self.ready_poll_interval_us as u64
        };
        let polls = budget_us / interval_us;
        if polls > u32::MAX as u64 {
            u32::MAX
        } else {
            polls as u32
        }
    }
}

/// Full driver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashConfig {
    pub geometry: Geometry,
    pub timing: Timing,
}

impl FlashConfig {
    pub const W25X20L: Self = Self {
        geometry: Geometry::W25X20L,
        timing: Timing::W25X20L,
    };
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self::W25X20L
    }
}
