use crate::config::FlashDeviceId;
use crate::flash::{Flash, FlashInterface};
use crate::Result;
use sha2::{Digest, Sha256};

/// SHA-256 over `len` bytes of `device` starting at `off`.
///
/// Works on arbitrary, possibly unaligned offsets: the first read is
/// down-aligned to the device's write-block size and the overhang bytes are
/// dropped from the first chunk fed into the hash, so the digest covers
/// exactly `[off, off+len)` regardless of the device's read granularity.
pub fn sha256_flash<I: FlashInterface>(
    flash: &Flash<I>,
    device: FlashDeviceId,
    off: usize,
    len: usize,
) -> Result<[u8; 32]> {
    let buf_size = flash.config().hash_flash_buffer_bytes;
    let start = flash.align_down(device, off);
    let mut jump = off - start;
    let mut remaining = len + jump;
    let mut cursor = start;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 256];
    debug_assert!(buf_size <= buf.len());

    while remaining > 0 {
        let chunk_len = core::cmp::min(buf_size, remaining);
        flash.read(device, cursor, &mut buf[..chunk_len])?;
        hasher.update(&buf[jump..chunk_len]);
        cursor += chunk_len;
        remaining -= chunk_len;
        jump = 0;
    }

    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BootConfig;
    use crate::ramflash::RamFlash;

    #[test]
    fn matches_direct_digest_across_unaligned_offsets() {
        let ram = RamFlash::new(4096, 16);
        let data: [u8; 100] = core::array::from_fn(|i| i as u8);
        ram.poke(0, 37, &data);
        let cfg = BootConfig {
            sector_size: 4096,
            align_buf_size: 16,
            move_block_size: 512,
            hash_flash_buffer_bytes: 32,
            sram_base: 0,
            sram_size: 0,
        };
        let flash = Flash::new(&ram, &cfg);
        let got = sha256_flash(&flash, 0, 37, 100).unwrap();

        let mut hasher = Sha256::new();
        hasher.update(&data);
        let want = hasher.finalize();
        assert_eq!(&got[..], &want[..]);
    }
}
