//! Flash Abstraction: write-block alignment, safe read/erase/write and the
//! address-in-region predicates the rest of the crate builds on.
//!
//! Grounded in the narrow `FlashInterface` boundary the platform HAL exposes
//! upstream, reworked here to take `&[u8]`/`&mut [u8]` slices instead of raw
//! pointers (see the buffer/offset/length design note) and to return
//! [`crate::error::BootError`] instead of panicking or returning nothing.

use crate::config::{BootConfig, FlashDeviceId, Region, Slot, SlotArea};
use crate::error::{BootError, FlashError};
use crate::Result;

/// The platform-supplied flash driver contract. One implementation per
/// board; the bootloader core never talks to hardware except through this
/// trait.
pub trait FlashInterface {
    /// The write-block size (smallest addressable program granularity) of `device`.
    fn write_block_size(&self, device: FlashDeviceId) -> usize;
    /// Enables or disables the hardware write-protect line.
    fn set_write_protect(&self, device: FlashDeviceId, protect: bool);
    /// Erases `len` bytes starting at `off`. `off`/`len` are erase-block aligned.
    fn erase(&self, device: FlashDeviceId, off: usize, len: usize) -> core::result::Result<(), FlashError>;
    /// Reads `buf.len()` bytes starting at `off` into `buf`.
    fn read(&self, device: FlashDeviceId, off: usize, buf: &mut [u8]) -> core::result::Result<(), FlashError>;
    /// Programs `buf` starting at `off`. `buf.len()` need not be write-block aligned.
    fn write(&self, device: FlashDeviceId, off: usize, buf: &[u8]) -> core::result::Result<(), FlashError>;
}

/// A thin, safe wrapper around a [`FlashInterface`] plus the [`BootConfig`]
/// alignment rules. All higher-level components (§4.B-G) go through this.
pub struct Flash<'a, I: FlashInterface> {
    iface: &'a I,
    cfg: &'a BootConfig,
}

impl<'a, I: FlashInterface> Flash<'a, I> {
    /// Constructs the abstraction, rejecting any device whose write-block
    /// size is below the minimum the journal format requires.
    pub fn new(iface: &'a I, cfg: &'a BootConfig) -> Self {
        Flash { iface, cfg }
    }

    pub fn align_up(&self, device: FlashDeviceId, len: usize) -> usize {
        let wbs = self.iface.write_block_size(device);
        (len + wbs - 1) / wbs * wbs
    }

    pub fn align_down(&self, device: FlashDeviceId, off: usize) -> usize {
        let wbs = self.iface.write_block_size(device);
        (off / wbs) * wbs
    }

    fn check_write_block_size(&self, device: FlashDeviceId) -> Result<usize> {
        let wbs = self.iface.write_block_size(device);
        if wbs < 16 {
            return Err(BootError::Flash(FlashError::WriteBlockTooSmall));
        }
        Ok(wbs)
    }

    /// Erases `len` bytes at `off`; caller supplies an erase-block-aligned range.
    pub fn erase(&self, device: FlashDeviceId, off: usize, len: usize) -> Result<()> {
        self.check_write_block_size(device)?;
        self.iface.set_write_protect(device, false);
        let res = self.iface.erase(device, off, len);
        self.iface.set_write_protect(device, true);
        res.map_err(BootError::Flash)
    }

    /// Reads `buf.len()` bytes starting at `off`.
    pub fn read(&self, device: FlashDeviceId, off: usize, buf: &mut [u8]) -> Result<()> {
        self.iface.read(device, off, buf).map_err(BootError::Flash)
    }

    /// Writes `buf` at `off`, padding the trailing partial write-block with `0xFF`.
    pub fn write(&self, device: FlashDeviceId, off: usize, buf: &[u8]) -> Result<()> {
        let wbs = self.check_write_block_size(device)?;
        self.iface.set_write_protect(device, false);
        let res = (|| -> core::result::Result<(), FlashError> {
            let aligned_len = (buf.len() + wbs - 1) / wbs * wbs;
            if aligned_len == buf.len() {
                return self.iface.write(device, off, buf);
            }
            // pad to a full write block with 0xFF without requiring an
            // allocator: stack buffer sized to one write block.
            let mut padded = [0xFFu8; 4096];
            if aligned_len > padded.len() {
                return Err(FlashError::OutOfRange);
            }
            padded[..buf.len()].copy_from_slice(buf);
            self.iface.write(device, off, &padded[..aligned_len])
        })();
        self.iface.set_write_protect(device, true);
        res.map_err(BootError::Flash)
    }

    /// True iff `addr` lies inside the configured SRAM window.
    pub fn in_ram(&self, addr: usize) -> bool {
        self.cfg.in_ram(addr)
    }

    /// True iff `addr` lies inside slot 0 or slot 1 of `area`.
    pub fn in_slt_area(&self, area: &SlotArea, slt: Slot, addr: usize) -> bool {
        let region: Region = match slt {
            Slot::Slot0 => area.slt0,
            Slot::Slot1 => area.slt1,
        };
        addr >= region.offset && addr < region.offset + region.size
    }

    pub fn config(&self) -> &BootConfig {
        self.cfg
    }
}
