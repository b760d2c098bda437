//! An in-memory [`FlashInterface`] double used by unit and scenario tests.
//! Stands in for the NVMC/QSPI drivers that are out of scope for this crate.

use crate::config::FlashDeviceId;
use crate::error::FlashError;
use crate::flash::FlashInterface;
use core::cell::RefCell;
use std::vec;
use std::vec::Vec;

/// A single erased-pattern-initialized byte array, addressed like real flash:
/// `erase` resets a range to `0xFF`, `write` can only clear bits (AND-write),
/// matching NOR semantics closely enough to exercise the journal/swap logic.
pub struct RamFlash {
    devices: RefCell<Vec<Vec<u8>>>,
    write_block_size: usize,
}

impl RamFlash {
    /// Creates a single device of `size` bytes, all `0xFF`.
    pub fn new(size: usize, write_block_size: usize) -> Self {
        RamFlash {
            devices: RefCell::new(vec![vec![0xFFu8; size]]),
            write_block_size,
        }
    }

    /// Adds another device of `size` bytes, returning its id.
    pub fn add_device(&self, size: usize) -> FlashDeviceId {
        let mut devices = self.devices.borrow_mut();
        devices.push(vec![0xFFu8; size]);
        (devices.len() - 1) as FlashDeviceId
    }

    /// Test helper: directly inspect the backing bytes of `device`.
    pub fn snapshot(&self, device: FlashDeviceId) -> Vec<u8> {
        self.devices.borrow()[device as usize].clone()
    }

    /// Test helper: directly seed bytes of `device` at `off`, bypassing the
    /// erase-then-AND-write discipline (used to set up pre-states).
    pub fn poke(&self, device: FlashDeviceId, off: usize, data: &[u8]) {
        let mut devices = self.devices.borrow_mut();
        devices[device as usize][off..off + data.len()].copy_from_slice(data);
    }
}

impl FlashInterface for RamFlash {
    fn write_block_size(&self, _device: FlashDeviceId) -> usize {
        self.write_block_size
    }

    fn set_write_protect(&self, _device: FlashDeviceId, _protect: bool) {}

    fn erase(&self, device: FlashDeviceId, off: usize, len: usize) -> core::result::Result<(), FlashError> {
        let mut devices = self.devices.borrow_mut();
        let dev = devices.get_mut(device as usize).ok_or(FlashError::OutOfRange)?;
        if off + len > dev.len() {
            return Err(FlashError::OutOfRange);
        }
        for b in &mut dev[off..off + len] {
            *b = 0xFF;
        }
        Ok(())
    }

    fn read(&self, device: FlashDeviceId, off: usize, buf: &mut [u8]) -> core::result::Result<(), FlashError> {
        let devices = self.devices.borrow();
        let dev = devices.get(device as usize).ok_or(FlashError::OutOfRange)?;
        if off + buf.len() > dev.len() {
            return Err(FlashError::OutOfRange);
        }
        buf.copy_from_slice(&dev[off..off + buf.len()]);
        Ok(())
    }

    fn write(&self, device: FlashDeviceId, off: usize, buf: &[u8]) -> core::result::Result<(), FlashError> {
        let mut devices = self.devices.borrow_mut();
        let dev = devices.get_mut(device as usize).ok_or(FlashError::OutOfRange)?;
        if off + buf.len() > dev.len() {
            return Err(FlashError::OutOfRange);
        }
        for (existing, incoming) in dev[off..off + buf.len()].iter_mut().zip(buf) {
            *existing &= *incoming;
        }
        Ok(())
    }
}
