//! Image Info Builder: resolves a TLV area into a fully-checked in-RAM
//! descriptor of where an image's body, encrypted tail, and load address
//! are, with optional body-hash verification.

use core::convert::TryInto;

use crate::config::{FlashDeviceId, Slot, SlotArea};
use crate::crypto::CryptoFacade;
use crate::error::BootError;
use crate::flash::{Flash, FlashInterface};
use crate::tlv::{open_tlv_area, step_tlv};
use crate::Result;

pub const IMAGE_TYPE: u8 = 0x10;
pub const IMAGE_INFO: u8 = 0x20;
pub const IMAGE_HASH: u8 = 0x30;
pub const IMAGE_EPUBKEY: u8 = 0x40;

const IMAGE_INFO_LEN: usize = 4 + 4 + 4 + 1 + 1 + 2 + 4; // start,size,load_address,major,minor,revision,build
const IMAGE_HASH_LEN: usize = 32;
const IMAGE_EPUBKEY_LEN: usize = 64;
const BODY_BUF_SIZE: usize = 1024 - crate::tlv::HEADER_SIZE;

/// Packed `major.minor.revision(.build)` image version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub revision: u16,
    pub build: u32,
}

/// Packs `major<<24 | minor<<16 | revision` for monotonicity comparisons;
/// `build` is deliberately excluded.
pub fn img_version_u32(v: Version) -> u32 {
    (v.major as u32) << 24 | (v.minor as u32) << 16 | v.revision as u32
}

/// A fully-resolved, RAM-only view of one image: where its body starts and
/// ends, where the ciphertext (if any) starts, and its load address/type.
#[derive(Debug, Clone)]
pub struct ImageDescriptor {
    pub flash_device: FlashDeviceId,
    pub hdr_start: usize,
    pub start: usize,
    pub enc_start: usize,
    pub end: usize,
    pub load_address: usize,
    pub version: Version,
    pub img_type: u8,
    pub enc_key: Option<[u8; 16]>,
    pub is_valid: bool,
}

impl ImageDescriptor {
    pub fn size(&self) -> usize {
        self.end - self.start
    }
}

fn find_entry(body: &[u8], body_size: usize, tag: u8) -> Option<crate::tlv::TlvEntry> {
    let mut offset = 0usize;
    while let Some(entry) = step_tlv(&body[..body_size], &mut offset) {
        if entry.tag == tag {
            return Some(entry);
        }
    }
    None
}

fn bound_checked_value<'b>(
    entry: crate::tlv::TlvEntry,
    body_size: usize,
    body: &'b [u8],
    want_len: usize,
) -> Result<&'b [u8]> {
    if entry.value_offset + entry.value_len > body_size {
        return Err(BootError::TlvLengthMismatch);
    }
    if entry.value_len != want_len {
        return Err(BootError::TlvLengthMismatch);
    }
    Ok(entry.value(body))
}

fn parse_image_info(value: &[u8]) -> (usize, usize, usize, Version) {
    let start = u32::from_le_bytes(value[0..4].try_into().unwrap()) as usize;
    let size = u32::from_le_bytes(value[4..8].try_into().unwrap()) as usize;
    let load_address = u32::from_le_bytes(value[8..12].try_into().unwrap()) as usize;
    let version = Version {
        major: value[12],
        minor: value[13],
        revision: u16::from_le_bytes(value[14..16].try_into().unwrap()),
        build: u32::from_le_bytes(value[16..20].try_into().unwrap()),
    };
    (start, size, load_address, version)
}

/// Resolves the image at `slot_base(slt) + extra_offset` into a descriptor.
///
/// `validate_sig` gates signature verification in [`open_tlv_area`];
/// `validate_body` additionally requires the body bytes to hash to the
/// `IMAGE_HASH` TLV value.
pub fn get_info<I: FlashInterface>(
    flash: &Flash<I>,
    crypto: &CryptoFacade<I>,
    area: &SlotArea,
    slt: Slot,
    extra_offset: usize,
    validate_sig: bool,
    validate_body: bool,
) -> Result<ImageDescriptor> {
    let region = match slt {
        Slot::Slot0 => area.slt0,
        Slot::Slot1 => area.slt1,
    };
    let device = region.device;
    let hdr_start = region.offset + extra_offset;

    let mut body = [0u8; BODY_BUF_SIZE];
    let body_size = open_tlv_area(flash, crypto, device, hdr_start, &mut body, validate_sig)?;

    let img_type_entry =
        find_entry(&body, body_size, IMAGE_TYPE).ok_or(BootError::TlvNotFound(IMAGE_TYPE))?;
    let img_type = bound_checked_value(img_type_entry, body_size, &body, 1)?[0];

    let info_entry =
        find_entry(&body, body_size, IMAGE_INFO).ok_or(BootError::TlvNotFound(IMAGE_INFO))?;
    let info_value = bound_checked_value(info_entry, body_size, &body, IMAGE_INFO_LEN)?;
    let (info_start, info_size, load_address, version) = parse_image_info(info_value);

    let hash_entry =
        find_entry(&body, body_size, IMAGE_HASH).ok_or(BootError::TlvNotFound(IMAGE_HASH))?;
    let hash_value = bound_checked_value(hash_entry, body_size, &body, IMAGE_HASH_LEN)?;
    let mut image_hash = [0u8; 32];
    image_hash.copy_from_slice(hash_value);

    let start = hdr_start + info_start;
    let end = start + info_size;

    if validate_body {
        let computed = crypto.sha256(device, start, info_size)?;
        if computed != image_hash {
            return Err(BootError::BadHash);
        }
    }

    let (enc_start, enc_key) = match find_entry(&body, body_size, IMAGE_EPUBKEY) {
        Some(entry) => {
            let value = bound_checked_value(entry, body_size, &body, IMAGE_EPUBKEY_LEN)?;
            let mut ephemeral_pub = [0u8; 64];
            ephemeral_pub.copy_from_slice(value);
            let key = crypto.derive_content_key(&ephemeral_pub)?;
            (start, Some(key))
        }
        None => (end, None),
    };

    Ok(ImageDescriptor {
        flash_device: device,
        hdr_start,
        start,
        enc_start,
        end,
        load_address,
        version,
        img_type,
        enc_key,
        is_valid: true,
    })
}

/// `get_info` with signature verification disabled.
pub fn get_info_nsc<I: FlashInterface>(
    flash: &Flash<I>,
    crypto: &CryptoFacade<I>,
    area: &SlotArea,
    slt: Slot,
    extra_offset: usize,
    validate_body: bool,
) -> Result<ImageDescriptor> {
    get_info(flash, crypto, area, slt, extra_offset, false, validate_body)
}

/// `get_info` with signature verification enabled.
pub fn get_info_wsc<I: FlashInterface>(
    flash: &Flash<I>,
    crypto: &CryptoFacade<I>,
    area: &SlotArea,
    slt: Slot,
    extra_offset: usize,
    validate_body: bool,
) -> Result<ImageDescriptor> {
    get_info(flash, crypto, area, slt, extra_offset, true, validate_body)
}

/// CRC-32 of `[start, end)` on the descriptor's flash device.
pub fn calc_crc32<I: FlashInterface>(
    crypto: &CryptoFacade<I>,
    descriptor: &ImageDescriptor,
) -> Result<u32> {
    crypto.crc32(
        descriptor.flash_device,
        descriptor.start,
        descriptor.size(),
    )
}

/// Outcome of [`img_check`]: which slot an accepted upgrade should land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Slot0,
    Slot1,
}

/// Validates the image currently in slot 1 with full signature and
/// body-hash checks, chooses a destination slot, enforces the size bound
/// and (if a prior parameter record exists) rejects downgrades against the
/// chosen destination's recorded version.
pub fn img_check<I: FlashInterface>(
    flash: &Flash<I>,
    crypto: &CryptoFacade<I>,
    area: &SlotArea,
    sector_size: usize,
    prm: Option<crate::journal::ParameterRecord>,
) -> Result<(ImageDescriptor, Destination)> {
    let descriptor = get_info_wsc(flash, crypto, area, Slot::Slot1, 0, true)?;

    let destination = if flash.in_slt_area(area, Slot::Slot1, descriptor.load_address) {
        Destination::Slot1
    } else {
        Destination::Slot0
    };

    let previous_version = prm.map(|p| match destination {
        Destination::Slot0 => p.slt0_ver,
        Destination::Slot1 => p.slt1_ver,
    });

    let dest_slot = match destination {
        Destination::Slot0 => Slot::Slot0,
        Destination::Slot1 => Slot::Slot1,
    };
    // `max_image_size` already reserves the trailing *end sector, so
    // `size > max_size` is exactly `image_size + SECTOR_SIZE > slot_size`.
    let max_size = area.max_image_size(dest_slot, sector_size);
    if descriptor.size() > max_size {
        return Err(BootError::NoSpace);
    }

    if let Some(prev) = previous_version {
        if img_version_u32(descriptor.version) < prev {
            return Err(BootError::Downgrade);
        }
    }

    Ok((descriptor, destination))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BootConfig, KeyMaterial, Region};
    use crate::ramflash::RamFlash;

    fn cfg() -> BootConfig {
        BootConfig {
            sector_size: 0x1000,
            align_buf_size: 16,
            move_block_size: 512,
            hash_flash_buffer_bytes: 256,
            sram_base: 0x2000_0000,
            sram_size: 0x1_0000,
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
    fn img_version_u32_ignores_build() {
        let v1 = Version { major: 1, minor: 2, revision: 3, build: 100 };
        let v2 = Version { major: 1, minor: 2, revision: 3, build: 999 };
        assert_eq!(img_version_u32(v1), img_version_u32(v2));
        let v3 = Version { major: 1, minor: 2, revision: 4, build: 0 };
        assert!(img_version_u32(v3) > img_version_u32(v1));
    }

    #[test]
    fn missing_image_type_tlv_is_reported() {
        let ram = RamFlash::new(0x20000, 16);
        let cfg = cfg();
        let flash = Flash::new(&ram, &cfg);
        let keys = KeyMaterial { boot_priv_key: &[0u8; 32], root_pub_keys: &[] };
        let crypto = CryptoFacade::new(&flash, &keys);

        // Header with magic + a total_size that declares an empty body.
        let mut hdr = [0xFFu8; crate::tlv::HEADER_SIZE];
        hdr[0..4].copy_from_slice(&crate::tlv::MAGIC);
        hdr[4..6].copy_from_slice(&256u16.to_le_bytes());
        ram.poke(0, 0x8000, &hdr);

        let err = get_info_nsc(&flash, &crypto, &area(), Slot::Slot1, 0, false).unwrap_err();
        assert_eq!(err, BootError::TlvNotFound(IMAGE_TYPE));
    }
}
