//! Slot-Area Journal: typed readers/writers over the three append logs
//! (`swpstat`, `slt0end`, `slt1end`) and the parameter record stored at the
//! head of `slt0end`.
//!
//! Each log is a region of 4-byte, CRC-8-sealed command records, one per
//! write block, scanned from the start until the first unwritten (all-0xFF)
//! slot. With erase-once NOR flash and no FTL, this append-then-scan shape
//! is what makes the swap engine resumable after power loss.

use core::convert::TryInto;

use crate::config::{FlashDeviceId, Region, SlotArea};
use crate::crypto::{seal, verify_crc8};
use crate::error::BootError;
use crate::flash::{Flash, FlashInterface};
use crate::Result;

pub const SWP_PERM: u8 = 0x01;
pub const SWP_REQUEST: u8 = 0x10;
pub const BT0_REQUEST: u8 = 0x20;
pub const ERROR: u8 = 0x80;

pub const SWP_START: u8 = 0x10;
pub const MOVE_UP: u8 = 0x12;
pub const SWP_P1: u8 = 0x14;
pub const SWP_P2: u8 = 0x16;
pub const SWP_P3: u8 = 0x18;
pub const SWP_P4: u8 = 0x19;
pub const SWP_END: u8 = 0x1F;
pub const INPLACE: u8 = 0x20;

const PHASE_MASK: u8 = 0x1F;
const RECORD_SIZE: usize = 4;

/// One 4-byte command record: `cmd1` (flags), `cmd2` (phase | INPLACE),
/// `cmd3` (sector index), and the CRC-8 seal over the first three bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub cmd1: u8,
    pub cmd2: u8,
    pub cmd3: u8,
}

impl Command {
    pub fn new(cmd1: u8, phase: u8, cmd3: u8) -> Self {
        Command { cmd1, cmd2: phase & PHASE_MASK, cmd3 }
    }

    pub fn phase(&self) -> u8 {
        self.cmd2 & PHASE_MASK
    }

    pub fn inplace(&self) -> bool {
        self.cmd2 & INPLACE != 0
    }

    pub fn with_inplace(mut self, inplace: bool) -> Self {
        if inplace {
            self.cmd2 |= INPLACE;
        } else {
            self.cmd2 &= !INPLACE;
        }
        self
    }

    pub fn is_swap_phase(&self) -> bool {
        let p = self.phase();
        p >= SWP_START && p < SWP_END
    }

    fn payload(&self) -> [u8; 3] {
        [self.cmd1, self.cmd2, self.cmd3]
    }

    fn to_bytes(self) -> [u8; RECORD_SIZE] {
        let payload = self.payload();
        [self.cmd1, self.cmd2, self.cmd3, seal(&payload)]
    }

    /// Decodes a record, returning `None` for the all-0xFF empty sentinel
    /// and for any record whose CRC-8 doesn't match its payload.
    fn from_bytes(raw: [u8; RECORD_SIZE]) -> Option<Self> {
        if raw == [0xFF; RECORD_SIZE] {
            return None;
        }
        let cmd = Command { cmd1: raw[0], cmd2: raw[1], cmd3: raw[2] };
        if verify_crc8(&cmd.payload(), raw[3]) {
            Some(cmd)
        } else {
            None
        }
    }
}

/// Fixed per-area metadata snapshot written once a swap completes and
/// consulted by the boot dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterRecord {
    pub pri_ld_address: u32,
    pub sec_ld_address: u32,
    pub slt0_crc32: u32,
    pub slt1_crc32: u32,
    pub slt0_ver: u32,
    pub slt1_ver: u32,
}

const PARAMETER_RECORD_SIZE: usize = 4 * 6;
const NO_RECORD_SENTINEL: u32 = 0xFFFF_FFFF;

impl ParameterRecord {
    fn to_bytes(self) -> [u8; PARAMETER_RECORD_SIZE] {
        let mut buf = [0u8; PARAMETER_RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.pri_ld_address.to_le_bytes());
        buf[4..8].copy_from_slice(&self.sec_ld_address.to_le_bytes());
        buf[8..12].copy_from_slice(&self.slt0_crc32.to_le_bytes());
        buf[12..16].copy_from_slice(&self.slt1_crc32.to_le_bytes());
        buf[16..20].copy_from_slice(&self.slt0_ver.to_le_bytes());
        buf[20..24].copy_from_slice(&self.slt1_ver.to_le_bytes());
        buf
    }

    fn from_bytes(buf: &[u8; PARAMETER_RECORD_SIZE]) -> Self {
        ParameterRecord {
            pri_ld_address: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            sec_ld_address: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            slt0_crc32: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            slt1_crc32: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            slt0_ver: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            slt1_ver: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
        }
    }
}

/// The three append logs plus the parameter record, all reached through one
/// flash handle.
pub struct Journal<'a, I: FlashInterface> {
    flash: &'a Flash<'a, I>,
}

impl<'a, I: FlashInterface> Journal<'a, I> {
    pub fn new(flash: &'a Flash<'a, I>) -> Self {
        Journal { flash }
    }

    fn record_slot(&self, device: FlashDeviceId, len: usize) -> usize {
        self.flash.align_up(device, len)
    }

    /// Scans `region` from its start, returning the last CRC-valid record
    /// before the first empty sentinel (or before the region's end, if no
    /// sentinel is ever hit).
    fn read_log(&self, region: Region) -> Result<Option<Command>> {
        let slot = self.record_slot(region.device, RECORD_SIZE);
        let mut last_valid = None;
        let mut offset = region.offset;
        while offset + slot <= region.offset + region.size {
            let mut raw = [0u8; RECORD_SIZE];
            self.flash.read(region.device, offset, &mut raw)?;
            if raw == [0xFF; RECORD_SIZE] {
                return Ok(last_valid);
            }
            if let Some(cmd) = Command::from_bytes(raw) {
                last_valid = Some(cmd);
            }
            offset += slot;
        }
        Ok(last_valid)
    }

    /// Appends `cmd` (sealing its CRC-8) to the first empty slot in
    /// `region`, failing with [`BootError::NoSpace`] if none remain.
    fn write_log(&self, region: Region, cmd: Command) -> Result<()> {
        let slot = self.record_slot(region.device, RECORD_SIZE);
        let mut offset = region.offset;
        while offset + slot <= region.offset + region.size {
            let mut raw = [0u8; RECORD_SIZE];
            self.flash.read(region.device, offset, &mut raw)?;
            if raw == [0xFF; RECORD_SIZE] {
                self.flash.write(region.device, offset, &cmd.to_bytes())?;
                return Ok(());
            }
            offset += slot;
        }
        Err(BootError::NoSpace)
    }

    pub fn read_swpstat(&self, area: &SlotArea) -> Result<Option<Command>> {
        self.read_log(area.swpstat)
    }

    pub fn write_swpstat(&self, area: &SlotArea, cmd: Command) -> Result<()> {
        self.write_log(area.swpstat, cmd)
    }

    pub fn erase_swpstat(&self, area: &SlotArea) -> Result<()> {
        self.flash.erase(area.swpstat.device, area.swpstat.offset, area.swpstat.size)
    }

    fn slt0end_param_size(&self, area: &SlotArea) -> usize {
        self.flash.align_up(area.slt0.device, PARAMETER_RECORD_SIZE)
    }

    fn slt0end_log_region(&self, area: &SlotArea, sector_size: usize) -> Region {
        let full = area.slt0end(sector_size);
        let reserved = self.slt0end_param_size(area);
        Region { device: full.device, offset: full.offset + reserved, size: full.size - reserved }
    }

    pub fn read_slt0end(&self, area: &SlotArea, sector_size: usize) -> Result<Option<Command>> {
        self.read_log(self.slt0end_log_region(area, sector_size))
    }

    pub fn write_slt0end(&self, area: &SlotArea, sector_size: usize, cmd: Command) -> Result<()> {
        self.write_log(self.slt0end_log_region(area, sector_size), cmd)
    }

    pub fn erase_slt0end(&self, area: &SlotArea, sector_size: usize) -> Result<()> {
        let r = area.slt0end(sector_size);
        self.flash.erase(r.device, r.offset, r.size)
    }

    pub fn read_slt1end(&self, area: &SlotArea, sector_size: usize) -> Result<Option<Command>> {
        self.read_log(area.slt1end(sector_size))
    }

    pub fn write_slt1end(&self, area: &SlotArea, sector_size: usize, cmd: Command) -> Result<()> {
        self.write_log(area.slt1end(sector_size), cmd)
    }

    pub fn erase_slt1end(&self, area: &SlotArea, sector_size: usize) -> Result<()> {
        let r = area.slt1end(sector_size);
        self.flash.erase(r.device, r.offset, r.size)
    }

    /// Reads the fixed parameter record at the start of `slt0end`; `None`
    /// means `pri_ld_address == 0xFFFFFFFF` ("no record").
    pub fn parameter_read(&self, area: &SlotArea, sector_size: usize) -> Result<Option<ParameterRecord>> {
        let r = area.slt0end(sector_size);
        let mut buf = [0u8; PARAMETER_RECORD_SIZE];
        self.flash.read(r.device, r.offset, &mut buf)?;
        let prm = ParameterRecord::from_bytes(&buf);
        if prm.pri_ld_address == NO_RECORD_SENTINEL {
            Ok(None)
        } else {
            Ok(Some(prm))
        }
    }

    /// Writes the parameter record. The caller is responsible for having
    /// erased `slt0end` beforehand if it was already in use.
    pub fn parameter_write(&self, area: &SlotArea, sector_size: usize, prm: ParameterRecord) -> Result<()> {
        let r = area.slt0end(sector_size);
        self.flash.write(r.device, r.offset, &prm.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BootConfig;
    use crate::ramflash::RamFlash;

    fn cfg() -> BootConfig {
        BootConfig {
            sector_size: 0x1000,
            align_buf_size: 16,
            move_block_size: 512,
            hash_flash_buffer_bytes: 256,
            sram_base: 0,
            sram_size: 0,
        }
    }

    fn area() -> SlotArea {
        SlotArea {
            slt0: Region { device: 0, offset: 0, size: 0x8000 },
            slt1: Region { device: 0, offset: 0x8000, size: 0x8000 },
            swpstat: Region { device: 0, offset: 0x10000, size: 0x1000 },
        }
    }

    #[test]
    fn swpstat_read_returns_last_valid_record() {
        let ram = RamFlash::new(0x20000, 16);
        let cfg = cfg();
        let flash = Flash::new(&ram, &cfg);
        let journal = Journal::new(&flash);
        let a = area();

        assert_eq!(journal.read_swpstat(&a).unwrap(), None);
        journal.write_swpstat(&a, Command::new(0, SWP_START, 0)).unwrap();
        journal.write_swpstat(&a, Command::new(0, MOVE_UP, 3)).unwrap();
        let last = journal.read_swpstat(&a).unwrap().unwrap();
        assert_eq!(last.phase(), MOVE_UP);
        assert_eq!(last.cmd3, 3);
    }

    #[test]
    fn swpstat_fills_up_and_reports_no_space() {
        let ram = RamFlash::new(0x20000, 16);
        let cfg = cfg();
        let flash = Flash::new(&ram, &cfg);
        let journal = Journal::new(&flash);
        let a = area();

        let slots = a.swpstat.size / flash.align_up(0, RECORD_SIZE);
        for i in 0..slots {
            journal.write_swpstat(&a, Command::new(0, SWP_START, i as u8)).unwrap();
        }
        let err = journal.write_swpstat(&a, Command::new(0, SWP_START, 0)).unwrap_err();
        assert_eq!(err, BootError::NoSpace);

        let last = journal.read_swpstat(&a).unwrap().unwrap();
        assert_eq!(last.cmd3, (slots - 1) as u8);
    }

    #[test]
    fn parameter_record_round_trips_and_reports_no_record() {
        let ram = RamFlash::new(0x20000, 16);
        let cfg = cfg();
        let flash = Flash::new(&ram, &cfg);
        let journal = Journal::new(&flash);
        let a = area();

        assert_eq!(journal.parameter_read(&a, 0x1000).unwrap(), None);

        let prm = ParameterRecord {
            pri_ld_address: 0x1234,
            sec_ld_address: 0x5678,
            slt0_crc32: 0xAABBCCDD,
            slt1_crc32: 0x11223344,
            slt0_ver: 0x01020300,
            slt1_ver: 0x01020400,
        };
        journal.parameter_write(&a, 0x1000, prm).unwrap();
        assert_eq!(journal.parameter_read(&a, 0x1000).unwrap(), Some(prm));
    }

    #[test]
    fn slt0end_log_starts_after_the_parameter_record() {
        let ram = RamFlash::new(0x20000, 16);
        let cfg = cfg();
        let flash = Flash::new(&ram, &cfg);
        let journal = Journal::new(&flash);
        let a = area();

        let prm = ParameterRecord {
            pri_ld_address: 1,
            sec_ld_address: 2,
            slt0_crc32: 3,
            slt1_crc32: 4,
            slt0_ver: 5,
            slt1_ver: 6,
        };
        journal.parameter_write(&a, 0x1000, prm).unwrap();
        journal.write_slt0end(&a, 0x1000, Command::new(SWP_PERM, SWP_END, 0)).unwrap();

        assert_eq!(journal.parameter_read(&a, 0x1000).unwrap(), Some(prm));
        let cmd = journal.read_slt0end(&a, 0x1000).unwrap().unwrap();
        assert_eq!(cmd.cmd1, SWP_PERM);
    }
}
