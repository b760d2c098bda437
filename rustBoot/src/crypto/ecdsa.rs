use crate::config::FlashDeviceId;
use crate::error::{BootError, CryptoError};
use crate::flash::{Flash, FlashInterface};
use crate::Result;
use core::convert::TryFrom;
use p256::ecdsa::signature::DigestVerifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::elliptic_curve::generic_array::{typenum::U64, GenericArray};
use p256::EncodedPoint;
use sha2::{Digest, Sha256};

/// Decodes one 64-byte (uncompressed, untagged X‖Y) root key out of the
/// table, rejecting points that don't lie on the curve.
fn decode_root_key(raw: &[u8; 64]) -> Result<VerifyingKey> {
    let untagged: &GenericArray<u8, U64> = GenericArray::from_slice(&raw[..]);
    let point: EncodedPoint = EncodedPoint::from_untagged_bytes(untagged);
    VerifyingKey::from_encoded_point(&point)
        .map_err(|_| BootError::Crypto(CryptoError::InvalidPublicKey))
}

/// Verifies `signature` (64-byte r‖s) against `digest` using each key in
/// `root_pub_keys` in turn, succeeding on the first match.
///
/// `digest` is an unfinalized [`Sha256`] hasher that has already been fed
/// exactly the signed body bytes — passing a live hasher rather than a
/// finished 32-byte value lets the underlying ECDSA verifier finalize it
/// itself, which is the shape the `DigestVerifier` trait it's built on
/// expects.
pub fn ecdsa_verify(
    digest: Sha256,
    signature: &[u8],
    root_pub_keys: &[[u8; 64]],
) -> Result<()> {
    let sig = Signature::try_from(signature)
        .map_err(|_| BootError::Crypto(CryptoError::MalformedSignature))?;

    for raw_key in root_pub_keys {
        if let Ok(vk) = decode_root_key(raw_key) {
            if vk.verify_digest(digest.clone(), &sig).is_ok() {
                return Ok(());
            }
        }
    }
    Err(BootError::Crypto(CryptoError::NoMatchingRootKey))
}

/// Streams `len` bytes of `device` at `off` into a fresh SHA-256 hasher and
/// verifies `signature` against it — the one call sites in [`crate::tlv`]
/// actually use, since the signed body lives in flash rather than RAM.
pub fn ecdsa_verify_flash_range<I: FlashInterface>(
    flash: &Flash<I>,
    device: FlashDeviceId,
    off: usize,
    len: usize,
    signature: &[u8],
    root_pub_keys: &[[u8; 64]],
) -> Result<()> {
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

    ecdsa_verify(hasher, signature, root_pub_keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::{signature::DigestSigner, SigningKey};

    #[test]
    fn verifies_against_matching_root_key_only() {
        let sk = SigningKey::from_bytes(&[0x11u8; 32]).unwrap();
        let vk = VerifyingKey::from(&sk);
        let encoded = vk.to_encoded_point(false);
        let mut raw = [0u8; 64];
        raw.copy_from_slice(&encoded.as_bytes()[1..]);

        let mut hasher = Sha256::new();
        hasher.update(b"image body bytes");
        let sig: Signature = sk.sign_digest(hasher.clone());
        let sig_bytes = sig.as_ref();

        let good_table = [raw];
        assert!(ecdsa_verify(hasher.clone(), sig_bytes, &good_table).is_ok());

        let other_sk = SigningKey::from_bytes(&[0x22u8; 32]).unwrap();
        let other_vk = VerifyingKey::from(&other_sk);
        let other_encoded = other_vk.to_encoded_point(false);
        let mut other_raw = [0u8; 64];
        other_raw.copy_from_slice(&other_encoded.as_bytes()[1..]);
        let bad_table = [other_raw];
        assert!(ecdsa_verify(hasher, sig_bytes, &bad_table).is_err());
    }
}
