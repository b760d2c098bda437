//! Boot Dispatcher: resumes any in-flight swap in every configured area,
//! resolves the boot area's parameter record into a load address, CRC-gates
//! it against the recorded digest with a primary→secondary fallback, and
//! hands off to the resolved image.
//!
//! The final jump (disable interrupts, load the stack pointer, branch to
//! the reset vector) is architecture-specific and lives entirely outside
//! this crate, behind [`Handoff`] — a board crate supplies it the same way
//! it supplies [`FlashInterface`].

use crate::config::{Slot, SlotArea};
use crate::crypto::CryptoFacade;
use crate::error::BootError;
use crate::flash::{Flash, FlashInterface};
use crate::image::get_info_nsc;
use crate::journal::{Journal, ParameterRecord, BT0_REQUEST};
use crate::swap::{apply_bt0_override, SwapEngine};
use crate::Result;

/// Architecture-specific final handoff: load the stack pointer and branch
/// to the reset vector at `load_address`, or halt if nothing bootable was
/// found. Never returns.
pub trait Handoff {
    fn jump(&self, load_address: usize) -> !;
    fn halt(&self) -> !;
}

/// A resolved, CRC-gated boot target: where to jump, and — for a RAM
/// target — the flash-resident image to copy there first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootTarget {
    pub load_address: usize,
    pub needs_ram_copy: bool,
}

/// Runs `img_swap` over every configured area (highest index first), then
/// resolves and CRC-gates the boot area's (area 0's) load address. Does
/// not perform the RAM copy or jump — see [`boot`] for the full sequence.
pub fn resolve<I: FlashInterface>(
    flash: &Flash<I>,
    crypto: &CryptoFacade<I>,
    journal: &Journal<I>,
    areas: &[SlotArea],
    sector_size: usize,
    move_block_size: usize,
) -> Result<BootTarget> {
    if areas.is_empty() {
        return Err(BootError::Fatal);
    }

    let engine = SwapEngine::new(flash, crypto, journal, sector_size, move_block_size);
    for area in areas.iter().rev() {
        engine.img_swap(area)?;
    }

    let boot_area = &areas[0];
    let prm = journal
        .parameter_read(boot_area, sector_size)?
        .ok_or(BootError::Fatal)?;
    let slt1_cmd = journal.read_slt1end(boot_area, sector_size)?;
    let prm = apply_bt0_override(prm, slt1_cmd);

    gate(flash, crypto, boot_area, prm)
}

fn gate<I: FlashInterface>(
    flash: &Flash<I>,
    crypto: &CryptoFacade<I>,
    area: &SlotArea,
    prm: ParameterRecord,
) -> Result<BootTarget> {
    let pri = prm.pri_ld_address as usize;

    if flash.in_slt_area(area, Slot::Slot1, pri) {
        let descriptor = get_info_nsc(flash, crypto, area, Slot::Slot1, 0, false)?;
        let crc = crate::image::calc_crc32(crypto, &descriptor)?;
        if crc == prm.slt1_crc32 {
            return Ok(BootTarget { load_address: pri, needs_ram_copy: false });
        }
        return fall_back_to_secondary(flash, crypto, area, prm, pri);
    }

    if flash.in_slt_area(area, Slot::Slot0, pri) || flash.in_ram(pri) {
        let descriptor = get_info_nsc(flash, crypto, area, Slot::Slot0, 0, false)?;
        let crc = crate::image::calc_crc32(crypto, &descriptor)?;
        if crc != prm.slt0_crc32 {
            return Err(BootError::CrcMismatch);
        }
        return Ok(BootTarget { load_address: pri, needs_ram_copy: flash.in_ram(pri) });
    }

    Err(BootError::Fatal)
}

fn fall_back_to_secondary<I: FlashInterface>(
    flash: &Flash<I>,
    crypto: &CryptoFacade<I>,
    area: &SlotArea,
    prm: ParameterRecord,
    failed_pri: usize,
) -> Result<BootTarget> {
    let sec = prm.sec_ld_address as usize;
    if sec == failed_pri {
        return Err(BootError::CrcMismatch);
    }

    if flash.in_slt_area(area, Slot::Slot0, sec) || flash.in_ram(sec) {
        let descriptor = get_info_nsc(flash, crypto, area, Slot::Slot0, 0, false)?;
        let crc = crate::image::calc_crc32(crypto, &descriptor)?;
        if crc != prm.slt0_crc32 {
            return Err(BootError::CrcMismatch);
        }
        return Ok(BootTarget { load_address: sec, needs_ram_copy: flash.in_ram(sec) });
    }
    Err(BootError::CrcMismatch)
}

/// Copies the image resolved by [`resolve`] into RAM at `target.load_address`,
/// decrypting any encrypted tail in the process.
pub fn copy_to_ram<I: FlashInterface>(
    flash: &Flash<I>,
    crypto: &CryptoFacade<I>,
    area: &SlotArea,
    target: BootTarget,
    ram: &mut [u8],
    move_block_size: usize,
) -> Result<()> {
    debug_assert!(target.needs_ram_copy);
    let descriptor = get_info_nsc(flash, crypto, area, Slot::Slot0, 0, false)?;
    if ram.len() < descriptor.size() {
        return Err(BootError::Fatal);
    }
    crate::swap::img_move(
        flash,
        descriptor.flash_device,
        descriptor.start,
        descriptor.enc_start,
        descriptor.flash_device,
        descriptor.start,
        descriptor.size(),
        descriptor.enc_key,
        Some(&mut ram[..descriptor.size()]),
        move_block_size,
    )
}

/// The full boot sequence: resume swaps, resolve and CRC-gate the boot
/// target, copy it to RAM if needed, and jump. Never returns.
pub fn boot<H: Handoff, I: FlashInterface>(
    flash: &Flash<I>,
    crypto: &CryptoFacade<I>,
    journal: &Journal<I>,
    areas: &[SlotArea],
    sector_size: usize,
    move_block_size: usize,
    ram: &mut [u8],
    handoff: &H,
) -> ! {
    let outcome = resolve(flash, crypto, journal, areas, sector_size, move_block_size).and_then(
        |target| {
            if target.needs_ram_copy {
                copy_to_ram(flash, crypto, &areas[0], target, ram, move_block_size)?;
            }
            Ok(target)
        },
    );

    match outcome {
        Ok(target) => {
            #[cfg(feature = "log")]
            log::info!("jumping to 0x{:x}", target.load_address);
            handoff.jump(target.load_address)
        }
        Err(_e) => {
            #[cfg(feature = "log")]
            log::error!("boot dispatch failed: {}", _e);
            handoff.halt()
        }
    }
}
