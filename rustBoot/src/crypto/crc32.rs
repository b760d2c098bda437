use crate::config::FlashDeviceId;
use crate::flash::{Flash, FlashInterface};
use crate::Result;
use crc::{Crc, CRC_32_ISO_HDLC};

/// CRC-32/ISO-HDLC (poly 0xEDB88320 reflected, init 0xFFFFFFFF, xorout
/// 0xFFFFFFFF) — the parameterization the worked example in the concrete
/// test scenarios resolves to.
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// CRC-32 over `len` bytes of `device` starting at `off`, using the same
/// down-align-then-drop-overhang rule as [`super::sha256_flash`].
pub fn crc32_flash<I: FlashInterface>(
    flash: &Flash<I>,
    device: FlashDeviceId,
    off: usize,
    len: usize,
) -> Result<u32> {
    let buf_size = flash.config().hash_flash_buffer_bytes;
    let start = flash.align_down(device, off);
    let mut jump = off - start;
    let mut remaining = len + jump;
    let mut cursor = start;

    let mut digest = CRC32.digest();
    let mut buf = [0u8; 256];
    debug_assert!(buf_size <= buf.len());

    while remaining > 0 {
        let chunk_len = core::cmp::min(buf_size, remaining);
        flash.read(device, cursor, &mut buf[..chunk_len])?;
        digest.update(&buf[jump..chunk_len]);
        cursor += chunk_len;
        remaining -= chunk_len;
        jump = 0;
    }

    Ok(digest.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BootConfig;
    use crate::ramflash::RamFlash;

    #[test]
    fn matches_the_worked_example() {
        let mut pattern = [0u8; 32];
        for (i, b) in pattern.iter_mut().enumerate() {
            *b = 0xFF - (i % 16) as u8;
        }
        let ram = RamFlash::new(4096, 16);
        ram.poke(0, 0, &pattern);
        let cfg = BootConfig {
            sector_size: 4096,
            align_buf_size: 16,
            move_block_size: 512,
            hash_flash_buffer_bytes: 256,
            sram_base: 0,
            sram_size: 0,
        };
        let flash = Flash::new(&ram, &cfg);
        let crc = crc32_flash(&flash, 0, 0, 32).unwrap();
        assert_eq!(crc, 0x4D299FC3);
    }
}
