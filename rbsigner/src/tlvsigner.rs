//! Builds and signs a TLV area: packs `IMAGE_TYPE`/`IMAGE_INFO`/`IMAGE_HASH`
//! (and, for an encrypted upgrade, `IMAGE_EPUBKEY`) into the fixed-size TLV
//! body, hashes and signs it, and prepends the header the bootloader's
//! `rustBoot::tlv::open_tlv_area` expects.

use crate::curve::{RbSignerError, Result, SigningKeyType};
use p256::ecdh::diffie_hellman;
use p256::ecdsa::signature::{digest::Digest, DigestSigner};
use p256::elliptic_curve::generic_array::GenericArray;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{EncodedPoint, NistP256, PublicKey, SecretKey};
use rustBoot::crypto::aes_ctr;
use rustBoot::tlv::{HEADER_SIZE, MAGIC};
use sha2::Sha256;
use zeroize::Zeroize;

const TOTAL_SIZE: u16 = 256;
const BODY_SIZE: usize = TOTAL_SIZE as usize - HEADER_SIZE;

const IMAGE_TYPE: u8 = 0x10;
const IMAGE_INFO: u8 = 0x20;
const IMAGE_HASH: u8 = 0x30;
const IMAGE_EPUBKEY: u8 = 0x40;

const IMAGE_INFO_LEN: usize = 4 + 4 + 4 + 1 + 1 + 2 + 4;

/// `major.minor.revision.build`, matching `rustBoot::image::Version`.
#[derive(Debug, Clone, Copy)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub revision: u16,
    pub build: u32,
}

fn put_entry(body: &mut [u8], offset: &mut usize, tag: u8, value: &[u8]) {
    body[*offset] = tag;
    body[*offset + 1] = value.len() as u8;
    body[*offset + 2..*offset + 2 + value.len()].copy_from_slice(value);
    *offset += 2 + value.len();
}

/// Generates an ephemeral P-256 keypair, derives the AES-128 content key by
/// Diffie-Hellman against `recipient_pub` (the bootloader's fixed ECDH
/// public key, raw 64-byte uncompressed X‖Y), and encrypts `payload` in
/// place with AES-CTR starting at a zero counter — the same derivation
/// `rustBoot::crypto::derive_content_key` performs on the bootloader side,
/// run from the sender's end of the key exchange.
fn encrypt_for_recipient(payload: &mut [u8], recipient_pub: &[u8; 64]) -> Result<[u8; 64]> {
    let untagged: &GenericArray<u8, <NistP256 as p256::elliptic_curve::Curve>::FieldBytesSize> =
        GenericArray::from_slice(&recipient_pub[..]);
    let point = EncodedPoint::from_untagged_bytes(untagged);
    let recipient = PublicKey::from_sec1_bytes(point.as_bytes())
        .map_err(|_| RbSignerError::InvalidPublicKey)?;

    let ephemeral = SecretKey::random(&mut rand_core::OsRng);
    let mut shared = diffie_hellman(ephemeral.to_nonzero_scalar(), recipient.as_affine());

    let mut hasher = Sha256::new();
    hasher.update(shared.as_bytes());
    hasher.update([0u8, 0, 0, 0]);
    let mut digest = hasher.finalize();
    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[..16]);
    shared.zeroize();
    digest.zeroize();

    let mut ctr = [0u8; 16];
    aes_ctr(payload, &mut ctr, &key);
    key.zeroize();

    let encoded = ephemeral.public_key().to_encoded_point(false);
    let mut ephemeral_pub = [0u8; 64];
    ephemeral_pub.copy_from_slice(&encoded.as_bytes()[1..]);
    Ok(ephemeral_pub)
}

/// Builds a signed TLV image from a raw payload blob.
///
/// `load_address` is where the bootloader will place/run the payload;
/// `recipient_pub`, if given, is the bootloader's ECDH public key and
/// triggers in-place AES-CTR encryption of `payload` before it's appended
/// to the returned blob.
pub fn sign_tlv_image(
    mut payload: Vec<u8>,
    load_address: u32,
    version: Version,
    sk_type: SigningKeyType,
    recipient_pub: Option<&[u8; 64]>,
) -> Result<Vec<u8>> {
    let ephemeral_pub = match recipient_pub {
        Some(rp) => Some(encrypt_for_recipient(&mut payload, rp)?),
        None => None,
    };

    // `IMAGE_HASH` covers exactly the bytes that will sit on flash at
    // `[start, end)` — ciphertext when encrypting, plaintext otherwise —
    // matching what `rustBoot::image::get_info`'s `validate_body` path reads.
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&Sha256::digest(&payload));

    let mut body = [0xFFu8; BODY_SIZE];
    let mut offset = 0usize;
    put_entry(&mut body, &mut offset, IMAGE_TYPE, &[0x01]);

    let mut info = [0u8; IMAGE_INFO_LEN];
    info[0..4].copy_from_slice(&(TOTAL_SIZE as u32).to_le_bytes());
    info[4..8].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    info[8..12].copy_from_slice(&load_address.to_le_bytes());
    info[12] = version.major;
    info[13] = version.minor;
    info[14..16].copy_from_slice(&version.revision.to_le_bytes());
    info[16..20].copy_from_slice(&version.build.to_le_bytes());
    put_entry(&mut body, &mut offset, IMAGE_INFO, &info);

    put_entry(&mut body, &mut offset, IMAGE_HASH, &hash);

    if let Some(pubkey) = ephemeral_pub {
        put_entry(&mut body, &mut offset, IMAGE_EPUBKEY, &pubkey);
    }

    match sk_type {
        #[cfg(feature = "nistp256")]
        SigningKeyType::NistP256(sk) => {
            let mut hasher = Sha256::new();
            hasher.update(&body[..]);
            let signature = sk
                .try_sign_digest(hasher)
                .map_err(RbSignerError::SignatureError)?;

            let mut out = Vec::with_capacity(HEADER_SIZE + BODY_SIZE + payload.len());
            out.extend_from_slice(&MAGIC);
            out.extend_from_slice(&TOTAL_SIZE.to_le_bytes());
            out.push(0x01); // area_type: application image
            out.push(0x01); // sig_type: ECDSA-P256
            out.extend_from_slice(signature.as_ref());
            out.extend_from_slice(&body);
            out.extend_from_slice(&payload);
            Ok(out)
        }
        #[cfg(feature = "ed25519")]
        SigningKeyType::Ed25519 => todo!(),
        _ => Err(RbSignerError::InvalidKeyType),
    }
}
