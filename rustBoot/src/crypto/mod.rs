//! Crypto Façade: SHA-256/CRC-32 over flash ranges, CRC-8 command sealing,
//! AES-128-CTR streaming, and the two asymmetric operations (ECDSA verify,
//! ECDH content-key derivation) gated on a fixed, injected key table.
//!
//! The concrete primitives (block cipher, hash, curve arithmetic) are
//! external collaborators supplied by RustCrypto-family crates; this module
//! owns only the bit-exact protocol glue around them — counter bookkeeping,
//! buffered flash streaming with alignment, and the root-key search.

mod aes_ctr;
mod cmd_crc8;
mod crc32;
mod ecdh;
mod ecdsa;
mod sha256;

pub use aes_ctr::{advance_counter, aes_ctr};
pub use cmd_crc8::{seal, verify as verify_crc8};
pub use crc32::crc32_flash;
pub use ecdh::derive_content_key;
pub use ecdsa::{ecdsa_verify, ecdsa_verify_flash_range};
pub use sha256::sha256_flash;

use crate::config::{FlashDeviceId, KeyMaterial};
use crate::flash::{Flash, FlashInterface};
use crate::Result;

/// Bundles the flash abstraction with the fixed key table so every crypto
/// operation that needs flash access or key material goes through one
/// narrow object, instead of threading both through every call site.
pub struct CryptoFacade<'a, I: FlashInterface> {
    pub flash: &'a Flash<'a, I>,
    pub keys: &'a KeyMaterial<'a>,
}

impl<'a, I: FlashInterface> CryptoFacade<'a, I> {
    pub fn new(flash: &'a Flash<'a, I>, keys: &'a KeyMaterial<'a>) -> Self {
        CryptoFacade { flash, keys }
    }

    pub fn sha256(&self, device: FlashDeviceId, off: usize, len: usize) -> Result<[u8; 32]> {
        sha256_flash(self.flash, device, off, len)
    }

    pub fn crc32(&self, device: FlashDeviceId, off: usize, len: usize) -> Result<u32> {
        crc32_flash(self.flash, device, off, len)
    }

    pub fn verify_authenticity(
        &self,
        device: FlashDeviceId,
        off: usize,
        len: usize,
        signature: &[u8],
    ) -> Result<()> {
        ecdsa_verify_flash_range(self.flash, device, off, len, signature, self.keys.root_pub_keys)
    }

    pub fn derive_content_key(&self, ephemeral_pub: &[u8; 64]) -> Result<[u8; 16]> {
        derive_content_key(self.keys.boot_priv_key, ephemeral_pub)
    }
}
