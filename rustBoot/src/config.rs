//! Compile-time configuration: the slot-map geometry, buffer sizes and key
//! material a board crate supplies to the core engine.
//!
//! The distilled design leaves these as build-system string injection
//! (`slot_map[]`, linked-in key arrays). Here they are ordinary `const`
//! data a board crate assembles and hands to [`crate::boot::boot`] — no
//! `static mut`, no name-based device lookup after start-up.

/// Opaque handle identifying one flash device, resolved once by the board
/// crate and never re-resolved mid-swap (see design note in the swap engine).
pub type FlashDeviceId = u8;

/// A single flash region: offset and size on a named device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub device: FlashDeviceId,
    pub offset: usize,
    pub size: usize,
}

/// The three flash regions that make up one slot area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotArea {
    pub slt0: Region,
    pub slt1: Region,
    pub swpstat: Region,
}

impl SlotArea {
    /// `slt0`'s last erase block, reserved for the parameter record + command log.
    pub fn slt0end(&self, sector_size: usize) -> Region {
        Region {
            device: self.slt0.device,
            offset: self.slt0.offset + self.slt0.size - sector_size,
            size: sector_size,
        }
    }

    /// `slt1`'s last erase block, reserved for the application↔bootloader command log.
    pub fn slt1end(&self, sector_size: usize) -> Region {
        Region {
            device: self.slt1.device,
            offset: self.slt1.offset + self.slt1.size - sector_size,
            size: sector_size,
        }
    }

    /// Maximum image payload size this area can hold in a given slot.
    pub fn max_image_size(&self, slot: Slot, sector_size: usize) -> usize {
        let size = match slot {
            Slot::Slot0 => self.slt0.size,
            Slot::Slot1 => self.slt1.size,
        };
        size.saturating_sub(sector_size)
    }
}

/// Which of the two slots in an area is being referred to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Slot0,
    Slot1,
}

/// Fixed size/alignment parameters, shared by every area.
#[derive(Debug, Clone, Copy)]
pub struct BootConfig {
    /// Flash erase-block size; all regions must be aligned to this.
    pub sector_size: usize,
    /// AES-CTR / command record alignment unit.
    pub align_buf_size: usize,
    /// Chunk size used while moving/decrypting a sector.
    pub move_block_size: usize,
    /// Buffer size used while streaming SHA-256/CRC-32 over flash.
    pub hash_flash_buffer_bytes: usize,
    /// SRAM base address, for `in_ram()`.
    pub sram_base: usize,
    /// SRAM size in bytes.
    pub sram_size: usize,
}

impl BootConfig {
    pub const fn in_ram(&self, addr: usize) -> bool {
        addr >= self.sram_base && addr < self.sram_base + self.sram_size
    }
}

/// Default alignment/chunk constants named directly after the spec's
/// external-interface section; a board may override `sector_size` and the
/// SRAM window but is expected to keep these three as-is since they define
/// the on-flash compatibility surface.
pub const ALIGN_BUF_SIZE: usize = 16;
pub const MOVE_BLOCK_SIZE: usize = 512;
pub const HASH_FLASH_BUFFER_BYTES: usize = 256;

/// Process-wide read-only key material, injected into the crypto façade at
/// construction rather than read from file-scope mutable statics.
pub struct KeyMaterial<'a> {
    /// The fixed ECDH private key used to derive content keys for upgrades.
    pub boot_priv_key: &'a [u8; 32],
    /// The concatenated table of root ECDSA public keys (64 B each, uncompressed X||Y).
    pub root_pub_keys: &'a [[u8; 64]],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slt0end_is_last_sector() {
        let area = SlotArea {
            slt0: Region { device: 0, offset: 0x10000, size: 0x8000 },
            slt1: Region { device: 0, offset: 0x20000, size: 0x8000 },
            swpstat: Region { device: 0, offset: 0x30000, size: 0x1000 },
        };
        let slt0end = area.slt0end(0x1000);
        assert_eq!(slt0end.offset, 0x10000 + 0x8000 - 0x1000);
        assert_eq!(slt0end.size, 0x1000);
    }

    #[test]
    fn max_image_size_reserves_trailing_sector() {
        let area = SlotArea {
            slt0: Region { device: 0, offset: 0, size: 0x8000 },
            slt1: Region { device: 0, offset: 0x8000, size: 0x8000 },
            swpstat: Region { device: 0, offset: 0x10000, size: 0x1000 },
        };
        assert_eq!(area.max_image_size(Slot::Slot0, 0x1000), 0x8000 - 0x1000);
    }
}
