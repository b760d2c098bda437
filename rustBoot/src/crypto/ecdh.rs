use crate::error::{BootError, CryptoError};
use crate::Result;
use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::generic_array::{typenum::U64, GenericArray};
use p256::{EncodedPoint, PublicKey, SecretKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// Derives the 16-byte AES-128 content key for an upgrade image from the
/// attacker-visible ephemeral public key carried in its TLV header.
///
/// `ephemeral_pub` is the raw 64-byte (uncompressed, untagged X‖Y) point.
/// The shared secret is run through SHA-256 with a 4-byte zero counter
/// appended (KDF1) and the key is the first 16 bytes of that digest. The
/// shared secret and intermediate digest are zeroized before returning.
pub fn derive_content_key(boot_priv_key: &[u8; 32], ephemeral_pub: &[u8; 64]) -> Result<[u8; 16]> {
    let secret = SecretKey::from_slice(boot_priv_key)
        .map_err(|_| BootError::Crypto(CryptoError::InvalidPublicKey))?;

    let untagged: &GenericArray<u8, U64> = GenericArray::from_slice(&ephemeral_pub[..]);
    let point: EncodedPoint = EncodedPoint::from_untagged_bytes(untagged);
    let public = PublicKey::from_sec1_bytes(point.as_bytes())
        .map_err(|_| BootError::Crypto(CryptoError::InvalidPublicKey))?;

    let shared = diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());

    let mut hasher = Sha256::new();
    hasher.update(shared.raw_secret_bytes());
    hasher.update([0u8, 0, 0, 0]);
    let mut digest = hasher.finalize();

    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[..16]);

    digest.zeroize();

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::elliptic_curve::sec1::ToEncodedPoint;

    fn raw_point(pk: &PublicKey) -> [u8; 64] {
        let encoded = pk.to_encoded_point(false);
        let mut raw = [0u8; 64];
        raw.copy_from_slice(&encoded.as_bytes()[1..]);
        raw
    }

    #[test]
    fn matches_from_either_side_and_is_deterministic() {
        let boot_priv = SecretKey::from_slice(&[0x09u8; 32]).unwrap();
        let mut boot_priv_bytes = [0x09u8; 32];

        let ephemeral = SecretKey::from_slice(&[0x03u8; 32]).unwrap();
        let ephemeral_pub = raw_point(&ephemeral.public_key());

        let key_a = derive_content_key(&boot_priv_bytes, &ephemeral_pub).unwrap();
        let key_b = derive_content_key(&boot_priv_bytes, &ephemeral_pub).unwrap();
        assert_eq!(key_a, key_b);

        let boot_pub_raw = raw_point(&boot_priv.public_key());
        let derived_on_ephemeral_side = {
            let untagged: &GenericArray<u8, <NistP256 as p256::elliptic_curve::Curve>::FieldBytesSize> =
                GenericArray::from_slice(&boot_pub_raw[..]);
            let point = EncodedPoint::from_untagged_bytes(untagged);
            let boot_pub = PublicKey::from_sec1_bytes(point.as_bytes()).unwrap();
            let mut shared = diffie_hellman(ephemeral.to_nonzero_scalar(), boot_pub.as_affine());
            let mut hasher = Sha256::new();
            hasher.update(shared.as_bytes());
            hasher.update([0u8, 0, 0, 0]);
            let digest = hasher.finalize();
            let mut key = [0u8; 16];
            key.copy_from_slice(&digest[..16]);
            shared.zeroize();
            key
        };
        assert_eq!(key_a, derived_on_ephemeral_side);

        boot_priv_bytes.zeroize();
    }
}
