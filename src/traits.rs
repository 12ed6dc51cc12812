pub trait HardwareFlashDevice {
    type Error;

    /// Address of the first byte of the device.
    fn start_addr(&self) -> u32;

    /// Size of one program page in bytes.
    fn page_bytes(&self) -> u32;

    /// Number of pages in the device.
    fn page_count(&self) -> u32;

    /// Reads flash contents into `buf`, starting at `addr`.
    fn read(&mut self, addr: u32, data: &mut [u8]) -> Result<(), Self::Error>;

    /// The Page Program instruction allows from one byte to a page of data
    /// to be programmed at previously erased (FFh) memory locations. The data
    /// must not cross a page boundary.
    fn page_program(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error>;

    /// The Chip Erase instruction sets all memory within the device to the
    /// erased state of all 1s (FFh).
    fn chip_erase(&mut self) -> Result<(), Self::Error>;
}
