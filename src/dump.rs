use crate::console::Console;
use crate::error::SessionError;
use crate::traits::HardwareFlashDevice;
use embedded_io::Write;

pub const ROW_BYTES: u32 = 16;
const CHUNK_BYTES: usize = 256;

/// Value that brings the 8-bit sum of the transcript to zero.
pub fn twos_complement_checksum(sum: u8) -> u8 {
    sum.wrapping_neg()
}

/// Dumps every page of `flash` to `console`, one Read Data instruction per
/// page, in rows of 16 bytes prefixed with their absolute address:
///
/// ```text
/// 0x000000: 0102036302020363FFFFFFFFFFFFFFFF
/// ```
///
/// The transcript ends with the 8-bit two's complement of the sum of every
/// byte. Returns that checksum.
pub fn dump_all<F, W>(
    flash: &mut F,
    console: &mut Console<W>,
) -> Result<u8, SessionError<F::Error, W::Error>>
where
    F: HardwareFlashDevice,
    W: Write,
{
    let start = flash.start_addr();
    let page_bytes = flash.page_bytes();
    let mut sum = 0u8;
    let mut buf = [0u8; CHUNK_BYTES];

    for page in 0..flash.page_count() {
        let base = start + page * page_bytes;
        let mut offset = 0;
        while offset < page_bytes {
            let len = (page_bytes - offset).min(CHUNK_BYTES as u32);
            let chunk = &mut buf[..len as usize];
            flash
                .read(base + offset, chunk)
                .map_err(SessionError::Flash)?;

            for (i, &byte) in chunk.iter().enumerate() {
                let addr = base + offset + i as u32;
                if addr % ROW_BYTES == 0 {
                    console.newline().map_err(SessionError::Transport)?;
                    console.print("0x").map_err(SessionError::Transport)?;
                    console.hex_address(addr).map_err(SessionError::Transport)?;
                    console.print(": ").map_err(SessionError::Transport)?;
                }
                sum = sum.wrapping_add(byte);
                console.hex_byte(byte).map_err(SessionError::Transport)?;
            }
            offset += len;
        }
    }

    let checksum = twos_complement_checksum(sum);
    console
        .print("\n\n8-Bit Two's Compliment Checksum: 0x")
        .map_err(SessionError::Transport)?;
    console.hex_byte(checksum).map_err(SessionError::Transport)?;
    console.newline().map_err(SessionError::Transport)?;
    debug!("Dumped {} pages, checksum {:#x}", flash.page_count(), checksum);
    Ok(checksum)
}
