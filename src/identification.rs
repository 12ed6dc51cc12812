/// Manufacturer and device ID as returned by the Read Manufacturer / Device
/// ID instruction (90h).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipIdentity {
    pub manufacturer_id: u8,
    pub device_id: u8,
}

impl ChipIdentity {
    /// Winbond W25X20L.
    pub const W25X20L: Self = Self {
        manufacturer_id: 0xEF,
        device_id: 0x11,
    };

    pub const fn new(manufacturer_id: u8, device_id: u8) -> Self {
        Self {
            manufacturer_id,
            device_id,
        }
    }

    pub fn is_expected(&self) -> bool {
        *self == Self::W25X20L
    }

    /// An absent chip leaves MISO floating high or pulled low, which reads
    /// back as all ones or all zeros.
    pub fn looks_absent(&self) -> bool {
        matches!(
            (self.manufacturer_id, self.device_id),
            (0xFF, 0xFF) | (0x00, 0x00)
        )
    }
}
