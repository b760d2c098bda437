//! TLV Reader: validates a TLV area header, verifies its signature over the
//! body, copies the body into a caller-owned buffer, and walks the body's
//! type/length/value entries.
//!
//! References into the copied body are expressed as `(offset, length)`
//! pairs into that buffer rather than raw pointers, so their lifetime is
//! tied to the buffer the caller owns.

use crate::config::FlashDeviceId;
use crate::crypto::CryptoFacade;
use crate::error::BootError;
use crate::flash::{Flash, FlashInterface};
use crate::Result;
use nom::bytes::complete::tag;
use nom::number::complete::{le_u16, u8 as le_u8};
use nom::IResult;

pub const MAGIC: [u8; 4] = *b"TLVA";
pub const HEADER_SIZE: usize = 4 + 2 + 1 + 1 + 64;
const MIN_TOTAL_SIZE: u16 = 256;
const MAX_TOTAL_SIZE: u16 = 1024;

/// The fixed-size header at offset 0 of a slot: magic, declared size,
/// image/signature type tags, and the ECDSA-P256 (r‖s) signature over the
/// TLV body that follows it.
#[derive(Debug, Clone)]
pub struct AreaHeader {
    pub total_size: u16,
    pub area_type: u8,
    pub sig_type: u8,
    pub signature: [u8; 64],
}

fn parse_header(input: &[u8]) -> IResult<&[u8], AreaHeader> {
    let (input, _magic) = tag(&MAGIC[..])(input)?;
    let (input, total_size) = le_u16(input)?;
    let (input, area_type) = le_u8(input)?;
    let (input, sig_type) = le_u8(input)?;
    let (input, sig_slice) = nom::bytes::complete::take(64usize)(input)?;
    let mut signature = [0u8; 64];
    signature.copy_from_slice(sig_slice);
    Ok((
        input,
        AreaHeader {
            total_size,
            area_type,
            sig_type,
            signature,
        },
    ))
}

/// One TLV entry: `tag` plus the `(offset, length)` of its value inside the
/// body buffer it was walked from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlvEntry {
    pub tag: u8,
    pub value_offset: usize,
    pub value_len: usize,
}

impl TlvEntry {
    pub fn value<'b>(&self, body: &'b [u8]) -> &'b [u8] {
        &body[self.value_offset..self.value_offset + self.value_len]
    }
}

/// Reads one `type | length | value` entry at `*offset` in `buf`, advances
/// `*offset` past it, and returns it. Does not check `length` against
/// `buf`'s bound beyond what's needed to read the two header bytes safely —
/// callers that trust `entry.value` must bound-check themselves (see
/// `crate::image::get_info`).
pub fn step_tlv(buf: &[u8], offset: &mut usize) -> Option<TlvEntry> {
    if *offset + 2 > buf.len() {
        return None;
    }
    let tag = buf[*offset];
    let length = buf[*offset + 1] as usize;
    let entry = TlvEntry {
        tag,
        value_offset: *offset + 2,
        value_len: length,
    };
    *offset += length + 2;
    Some(entry)
}

/// Validates the header at `(device, offset)`, optionally verifies its
/// signature over the body, copies the body into `out_buf`, and returns the
/// body size.
pub fn open_tlv_area<I: FlashInterface>(
    flash: &Flash<I>,
    crypto: &CryptoFacade<I>,
    device: FlashDeviceId,
    offset: usize,
    out_buf: &mut [u8],
    validate: bool,
) -> Result<usize> {
    let mut hdr_buf = [0u8; HEADER_SIZE];
    flash.read(device, offset, &mut hdr_buf)?;
    let (_, header) = parse_header(&hdr_buf).map_err(|_| BootError::BadMagic)?;

    if header.total_size < MIN_TOTAL_SIZE || header.total_size > MAX_TOTAL_SIZE {
        return Err(BootError::BadHeaderSize);
    }
    let body_size = header.total_size as usize - HEADER_SIZE;
    if out_buf.len() < body_size {
        return Err(BootError::BadHeaderSize);
    }

    let body_off = offset + HEADER_SIZE;
    if validate {
        crypto.verify_authenticity(device, body_off, body_size, &header.signature)?;
    }
    flash.read(device, body_off, &mut out_buf[..body_size])?;
    Ok(body_size)
}
