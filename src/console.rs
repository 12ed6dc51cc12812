use embedded_io::Write;

/// Two uppercase ASCII hex digits for `byte`.
pub const fn hex_digits(byte: u8) -> [u8; 2] {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    [DIGITS[(byte >> 4) as usize], DIGITS[(byte & 0x0F) as usize]]
}

/// Line-oriented text sink. Every call blocks until the transport has
/// accepted all bytes.
pub struct Console<W> {
    out: W,
}

impl<W: Write> Console<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn print(&mut self, s: &str) -> Result<(), W::Error> {
        self.out.write_all(s.as_bytes())
    }

    pub fn newline(&mut self) -> Result<(), W::Error> {
        self.out.write_all(b"\n")
    }

    pub fn hex_byte(&mut self, byte: u8) -> Result<(), W::Error> {
        self.out.write_all(&hex_digits(byte))
    }

    pub fn hex_bytes(&mut self, bytes: &[u8]) -> Result<(), W::Error> {
        bytes.iter().try_for_each(|&b| self.hex_byte(b))
    }

    /// A 24-bit flash address as six hex digits, most significant first.
    pub fn hex_address(&mut self, addr: u32) -> Result<(), W::Error> {
        let [_, high, mid, low] = addr.to_be_bytes();
        self.hex_bytes(&[high, mid, low])
    }

    pub fn flush(&mut self) -> Result<(), W::Error> {
        self.out.flush()
    }
}
