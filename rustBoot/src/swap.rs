//! Swap Engine: drives the phase machine that moves, and optionally
//! decrypts, an upgrade image between slot 1 and slot 0 (or in place within
//! slot 1), committing one journal record per phase transition so the
//! whole operation resumes correctly after power loss at any point.
//!
//! # Sector bookkeeping
//!
//! The on-flash phase machine has exactly one byte (`cmd3`) of persisted
//! per-sector state. To keep every phase resumable without recomputing
//! anything from data that a later phase may have already overwritten,
//! this implementation always counts sectors **down to zero**:
//! `MOVE_UP` starts at the source image's top occupied sector (computed
//! once, while slot 0's header is still intact) and `SWP_P1`/`SWP_P2`
//! start at the upgrade's top occupied sector (computed once, while slot
//! 1's header is still intact). From then on the persisted `cmd3` alone
//! tells a resumed engine both where it is and when it's done — no field
//! ever needs to be re-derived from flash state a later step may have
//! already destroyed. See `DESIGN.md` for the corresponding simplification
//! against the distilled source's ascending counters.

use crate::config::{FlashDeviceId, Slot, SlotArea};
use crate::crypto::{aes_ctr, advance_counter, CryptoFacade};
use crate::error::BootError;
use crate::flash::{Flash, FlashInterface};
use crate::image::{calc_crc32, get_info_nsc, img_check, Destination, ImageDescriptor};
use crate::journal::{
    Command, Journal, ParameterRecord, BT0_REQUEST, ERROR, MOVE_UP, SWP_END, SWP_P1, SWP_P2,
    SWP_P3, SWP_P4, SWP_PERM, SWP_REQUEST, SWP_START,
};
use crate::Result;

fn occupied_sectors(size: usize, sector_size: usize) -> usize {
    if size == 0 {
        0
    } else {
        (size + sector_size - 1) / sector_size
    }
}

/// Moves (and, for the encrypted range, decrypts) `len` bytes from
/// `(fr_device, fr_off)` to `(to_device, to_off)`, or into `to_ram` if
/// given, in chunks of `move_block_size`.
///
/// `fr_eoff` is the offset within the source at which ciphertext begins;
/// bytes before it are copied verbatim. If the move starts at or past
/// `fr_eoff`, the CTR counter is pre-advanced so each block decrypts with
/// its true key-stream block.
#[allow(clippy::too_many_arguments)]
pub fn img_move<I: FlashInterface>(
    flash: &Flash<I>,
    fr_device: FlashDeviceId,
    fr_off: usize,
    fr_eoff: usize,
    to_device: FlashDeviceId,
    to_off: usize,
    len: usize,
    key: Option<[u8; 16]>,
    mut to_ram: Option<&mut [u8]>,
    move_block_size: usize,
) -> Result<()> {
    let ulen = if fr_eoff > fr_off {
        (fr_eoff - fr_off).min(len)
    } else {
        0
    };

    let mut ctr = [0u8; 16];
    if key.is_some() && fr_off >= fr_eoff {
        let pre_blocks = (fr_off - fr_eoff + 15) / 16;
        advance_counter(&mut ctr, pre_blocks);
    }

    let chunk_cap = move_block_size.min(512);
    let mut processed = 0usize;
    while processed < len {
        let chunk_len = chunk_cap.min(len - processed);
        let mut buf = [0u8; 512];
        flash.read(fr_device, fr_off + processed, &mut buf[..chunk_len])?;

        if let Some(k) = key {
            let enc_start_in_chunk = ulen.saturating_sub(processed).min(chunk_len);
            if enc_start_in_chunk < chunk_len {
                aes_ctr(&mut buf[enc_start_in_chunk..chunk_len], &mut ctr, &k);
            }
        }

        match to_ram.as_deref_mut() {
            Some(ram) => ram[processed..processed + chunk_len].copy_from_slice(&buf[..chunk_len]),
            None => flash.write(to_device, to_off + processed, &buf[..chunk_len])?,
        }
        processed += chunk_len;
    }
    Ok(())
}

/// Drives the swap engine for one slot area: resumes an in-flight swap,
/// schedules a new one from an application request, confirms a pending
/// image, or triggers a restore of an unconfirmed test image.
pub struct SwapEngine<'a, I: FlashInterface> {
    flash: &'a Flash<'a, I>,
    crypto: &'a CryptoFacade<'a, I>,
    journal: &'a Journal<'a, I>,
    sector_size: usize,
    move_block_size: usize,
}

impl<'a, I: FlashInterface> SwapEngine<'a, I> {
    pub fn new(
        flash: &'a Flash<'a, I>,
        crypto: &'a CryptoFacade<'a, I>,
        journal: &'a Journal<'a, I>,
        sector_size: usize,
        move_block_size: usize,
    ) -> Self {
        SwapEngine { flash, crypto, journal, sector_size, move_block_size }
    }

    /// `img_swap(area)`: the entry algorithm of §4.F.
    pub fn img_swap(&self, area: &SlotArea) -> Result<()> {
        if let Some(cmd) = self.journal.read_swpstat(area)? {
            if cmd.is_swap_phase() {
                return self.run_phase_machine(area, cmd);
            }
        }

        let slt1 = self.journal.read_slt1end(area, self.sector_size)?;

        if let Some(s1) = slt1.filter(|c| c.cmd1 & SWP_REQUEST != 0) {
            let _ = s1;
            let prm = self.journal.parameter_read(area, self.sector_size)?;
            if let Ok((_descriptor, destination)) =
                img_check(self.flash, self.crypto, area, self.sector_size, prm)
            {
                let inplace = destination == Destination::Slot1;
                self.journal.erase_swpstat(area)?;
                let cmd1 = if inplace { SWP_PERM } else { 0 };
                let start_cmd = Command::new(cmd1, SWP_START, 0).with_inplace(inplace);
                self.journal.write_swpstat(area, start_cmd)?;
                return self.run_phase_machine(area, start_cmd);
            }
            // img_check failure: no swap scheduled this cycle.
            return Ok(());
        }

        if let Some(s1) = slt1.filter(|c| c.cmd1 & SWP_PERM != 0) {
            let _ = s1;
            let slt0 = self.journal.read_slt0end(area, self.sector_size)?;
            let needs_confirm = slt0.map(|c| c.cmd1 & SWP_PERM == 0).unwrap_or(true);
            if needs_confirm {
                let (cmd1, cmd2, cmd3) =
                    slt0.map(|c| (c.cmd1, c.cmd2, c.cmd3)).unwrap_or((0, SWP_END, 0));
                self.journal.write_slt0end(
                    area,
                    self.sector_size,
                    Command { cmd1: cmd1 | SWP_PERM, cmd2, cmd3 },
                )?;
            }
            return Ok(());
        }

        // Neither SWP_REQUEST nor SWP_PERM set on slt1end (or no record at
        // all): an unconfirmed test image in slot 0 triggers a restore.
        if let Some(s0) = self.journal.read_slt0end(area, self.sector_size)? {
            if s0.cmd1 & SWP_PERM == 0 {
                self.journal.erase_swpstat(area)?;
                let cmd = Command::new(SWP_PERM, SWP_START, 0);
                self.journal.write_swpstat(area, cmd)?;
                return self.run_phase_machine(area, cmd);
            }
        }
        Ok(())
    }

    fn run_phase_machine(&self, area: &SlotArea, mut cmd: Command) -> Result<()> {
        loop {
            cmd = match cmd.phase() {
                SWP_START => self.step_start(area, cmd)?,
                MOVE_UP => self.step_move_up(area, cmd)?,
                SWP_P1 => self.step_p1(area, cmd)?,
                SWP_P2 => self.step_p2(area, cmd)?,
                SWP_P3 => self.step_p3(area, cmd)?,
                SWP_P4 => self.step_p4(area, cmd)?,
                SWP_END => return Ok(()),
                _ => return Err(BootError::InvalidState),
            };
            self.journal.write_swpstat(area, cmd)?;
            if cmd.cmd1 & ERROR != 0 || cmd.phase() == SWP_END {
                return Ok(());
            }
        }
    }

    fn top_sector_index(&self, descriptor: &ImageDescriptor, region_offset: usize) -> usize {
        let occupied = occupied_sectors(descriptor.end - region_offset, self.sector_size);
        occupied.saturating_sub(1)
    }

    fn step_start(&self, area: &SlotArea, cmd: Command) -> Result<Command> {
        let inplace = cmd.inplace();
        if inplace {
            let info = get_info_nsc(self.flash, self.crypto, area, Slot::Slot1, 0, false)?;
            if info.enc_start == info.end {
                return Ok(Command::new(cmd.cmd1, SWP_P3, 0).with_inplace(true));
            }
            return Ok(Command::new(cmd.cmd1, SWP_P2, 0).with_inplace(true));
        }

        match get_info_nsc(self.flash, self.crypto, area, Slot::Slot0, 0, false) {
            Ok(slot0_info) if slot0_info.end != slot0_info.start => {
                let top = self.top_sector_index(&slot0_info, area.slt0.offset);
                Ok(Command::new(cmd.cmd1, MOVE_UP, top as u8).with_inplace(false))
            }
            _ => {
                let new_info = get_info_nsc(self.flash, self.crypto, area, Slot::Slot1, 0, false)?;
                let top = self.top_sector_index(&new_info, area.slt1.offset);
                Ok(Command::new(cmd.cmd1, SWP_P1, top as u8).with_inplace(false))
            }
        }
    }

    fn step_move_up(&self, area: &SlotArea, cmd: Command) -> Result<Command> {
        let i = cmd.cmd3 as usize;
        let sector_size = self.sector_size;
        let device = area.slt0.device;
        let fr_off = area.slt0.offset + i * sector_size;
        let to_off = area.slt0.offset + (i + 1) * sector_size;

        let info = get_info_nsc(self.flash, self.crypto, area, Slot::Slot0, 0, false).ok();
        let (key, fr_eoff) = match &info {
            Some(d) => (d.enc_key, d.enc_start),
            None => (None, fr_off),
        };

        self.flash.erase(device, to_off, sector_size)?;
        img_move(
            self.flash,
            device,
            fr_off,
            fr_eoff,
            device,
            to_off,
            sector_size,
            key,
            None,
            self.move_block_size,
        )?;

        if i == 0 {
            let new_info = get_info_nsc(self.flash, self.crypto, area, Slot::Slot1, 0, false)?;
            let top = self.top_sector_index(&new_info, area.slt1.offset);
            Ok(Command::new(cmd.cmd1, SWP_P1, top as u8).with_inplace(false))
        } else {
            Ok(Command::new(cmd.cmd1, MOVE_UP, (i - 1) as u8).with_inplace(false))
        }
    }

    fn step_p1(&self, area: &SlotArea, cmd: Command) -> Result<Command> {
        let i = cmd.cmd3 as usize;
        let sector_size = self.sector_size;

        let slt1_info = match get_info_nsc(self.flash, self.crypto, area, Slot::Slot1, 0, false) {
            Ok(d) => d,
            Err(_) => return Ok(Command::new(ERROR, SWP_P1, cmd.cmd3)),
        };

        let slot0_off = area.slt0.offset + i * sector_size;
        let slot1_off = area.slt1.offset + i * sector_size;

        self.flash.erase(area.slt0.device, slot0_off, sector_size)?;
        img_move(
            self.flash,
            area.slt1.device,
            slot1_off,
            slt1_info.enc_start,
            area.slt0.device,
            slot0_off,
            sector_size,
            slt1_info.enc_key,
            None,
            self.move_block_size,
        )?;

        Ok(Command::new(cmd.cmd1, SWP_P2, cmd.cmd3).with_inplace(false))
    }

    fn step_p2(&self, area: &SlotArea, cmd: Command) -> Result<Command> {
        if cmd.inplace() {
            return self.step_p2_inplace(area, cmd);
        }

        let i = cmd.cmd3 as usize;
        let sector_size = self.sector_size;
        let slot0_next_off = area.slt0.offset + (i + 1) * sector_size;
        let slt1_off = area.slt1.offset + i * sector_size;

        self.flash.erase(area.slt1.device, slt1_off, sector_size)?;
        img_move(
            self.flash,
            area.slt0.device,
            slot0_next_off,
            slot0_next_off,
            area.slt1.device,
            slt1_off,
            sector_size,
            None,
            None,
            self.move_block_size,
        )?;

        if i == 0 {
            Ok(Command::new(cmd.cmd1, SWP_P3, 0).with_inplace(false))
        } else {
            Ok(Command::new(cmd.cmd1, SWP_P1, (i - 1) as u8).with_inplace(false))
        }
    }

    /// In-place decrypt: `cmd3` is the *next* body sector to process,
    /// ascending from 0, so a sector is only ever touched once its bytes
    /// are still pristine ciphertext.
    fn step_p2_inplace(&self, area: &SlotArea, cmd: Command) -> Result<Command> {
        let info = match get_info_nsc(self.flash, self.crypto, area, Slot::Slot1, 0, false) {
            Ok(d) => d,
            Err(_) => return Ok(Command::new(ERROR, SWP_P2, cmd.cmd3).with_inplace(true)),
        };

        let sector_size = self.sector_size;
        let i = cmd.cmd3 as usize;
        let sector_off = area.slt1.offset + i * sector_size;
        let sector_end = (sector_off + sector_size).min(info.end);
        if sector_off >= info.end {
            return Ok(Command::new(cmd.cmd1, SWP_P3, 0).with_inplace(true));
        }
        let len = sector_end - sector_off;

        // The destination is the same sector the ciphertext already occupies.
        // NOR erase/write can only clear bits, so writing plaintext straight
        // over un-erased ciphertext would AND the two together instead of
        // replacing them: decrypt into a RAM buffer first, then erase before
        // writing the buffered plaintext back.
        if sector_size > 4096 {
            return Err(BootError::Flash(crate::error::FlashError::OutOfRange));
        }
        let mut buf = [0u8; 4096];
        img_move(
            self.flash,
            area.slt1.device,
            sector_off,
            info.enc_start,
            area.slt1.device,
            sector_off,
            len,
            info.enc_key,
            Some(&mut buf[..len]),
            self.move_block_size,
        )?;
        self.flash.erase(area.slt1.device, sector_off, sector_size)?;
        self.flash.write(area.slt1.device, sector_off, &buf[..len])?;

        let next_off = area.slt1.offset + (i + 1) * sector_size;
        if next_off >= info.end {
            Ok(Command::new(cmd.cmd1, SWP_P3, 0).with_inplace(true))
        } else {
            Ok(Command::new(cmd.cmd1, SWP_P2, (i + 1) as u8).with_inplace(true))
        }
    }

    fn step_p3(&self, area: &SlotArea, cmd: Command) -> Result<Command> {
        let inplace = cmd.inplace();

        // Read the outgoing parameter record before erasing slt0end, since
        // that erase wipes it along with slt0's command log.
        let prior = self.journal.parameter_read(area, self.sector_size)?;
        self.journal.erase_slt0end(area, self.sector_size)?;

        let dest_slot = if inplace { Slot::Slot1 } else { Slot::Slot0 };
        let new_descriptor = get_info_nsc(self.flash, self.crypto, area, dest_slot, 0, false);

        let mut cmd1 = cmd.cmd1;
        let prm = match new_descriptor {
            Ok(descriptor) => {
                let crc = calc_crc32(self.crypto, &descriptor)?;
                let version = crate::image::img_version_u32(descriptor.version);
                if inplace {
                    ParameterRecord {
                        pri_ld_address: descriptor.load_address as u32,
                        sec_ld_address: prior.map(|p| p.pri_ld_address).unwrap_or(0xFFFF_FFFF),
                        slt0_crc32: prior.map(|p| p.slt0_crc32).unwrap_or(0xFFFF_FFFF),
                        slt1_crc32: crc,
                        slt0_ver: prior.map(|p| p.slt0_ver).unwrap_or(0),
                        slt1_ver: version,
                    }
                } else {
                    ParameterRecord {
                        pri_ld_address: descriptor.load_address as u32,
                        sec_ld_address: prior.map(|p| p.pri_ld_address).unwrap_or(0xFFFF_FFFF),
                        slt0_crc32: crc,
                        slt1_crc32: 0xFFFF_FFFF,
                        slt0_ver: version,
                        slt1_ver: 0,
                    }
                }
            }
            Err(_) => {
                cmd1 |= SWP_PERM;
                ParameterRecord {
                    pri_ld_address: prior.map(|p| p.pri_ld_address).unwrap_or(0xFFFF_FFFF),
                    sec_ld_address: prior.map(|p| p.sec_ld_address).unwrap_or(0xFFFF_FFFF),
                    slt0_crc32: prior.map(|p| p.slt0_crc32).unwrap_or(0xFFFF_FFFF),
                    slt1_crc32: 0xFFFF_FFFF,
                    slt0_ver: prior.map(|p| p.slt0_ver).unwrap_or(0),
                    slt1_ver: 0,
                }
            }
        };

        self.journal.parameter_write(area, self.sector_size, prm)?;
        Ok(Command::new(cmd1, SWP_P4, 0).with_inplace(inplace))
    }

    fn step_p4(&self, area: &SlotArea, cmd: Command) -> Result<Command> {
        self.journal.erase_slt1end(area, self.sector_size)?;
        Ok(Command::new(cmd.cmd1, SWP_END, 0).with_inplace(cmd.inplace()))
    }
}

/// Applies `slt1end`'s `BT0_REQUEST` override to a parameter record, per
/// §4.G step 2.
pub fn apply_bt0_override(mut prm: ParameterRecord, slt1_cmd: Option<Command>) -> ParameterRecord {
    if slt1_cmd.map(|c| c.cmd1 & BT0_REQUEST != 0).unwrap_or(false) {
        prm.pri_ld_address = prm.sec_ld_address;
    }
    prm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occupied_sectors_rounds_up() {
        assert_eq!(occupied_sectors(0, 4096), 0);
        assert_eq!(occupied_sectors(1, 4096), 1);
        assert_eq!(occupied_sectors(4096, 4096), 1);
        assert_eq!(occupied_sectors(4097, 4096), 2);
    }

    #[test]
    fn bt0_override_swaps_primary_for_secondary() {
        let prm = ParameterRecord {
            pri_ld_address: 1,
            sec_ld_address: 2,
            slt0_crc32: 0,
            slt1_crc32: 0,
            slt0_ver: 0,
            slt1_ver: 0,
        };
        let overridden = apply_bt0_override(prm, Some(Command::new(BT0_REQUEST, SWP_END, 0)));
        assert_eq!(overridden.pri_ld_address, 2);

        let untouched = apply_bt0_override(prm, Some(Command::new(0, SWP_END, 0)));
        assert_eq!(untouched.pri_ld_address, 1);
    }
}
