use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, NewBlockCipher};
use aes::Aes128;

/// AES-128-CTR, XORing `buf` in place with the keystream produced from
/// `key` starting at the 128-bit big-endian counter `ctr`.
///
/// `ctr` is treated as incrementing per 16-byte block from the high-byte
/// side: byte index 15 is the least-significant position and is
/// incremented first, with carry propagating toward byte 0. On return,
/// `ctr` holds the counter state *after* the last consumed block — callers
/// that process a source in several calls (e.g. a plaintext prefix
/// followed by a ciphertext tail) rely on this to resume correctly.
pub fn aes_ctr(buf: &mut [u8], ctr: &mut [u8; 16], key: &[u8; 16]) {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut offset = 0;
    while offset < buf.len() {
        let block_len = core::cmp::min(16, buf.len() - offset);
        let mut keystream = GenericArray::clone_from_slice(&ctr[..]);
        cipher.encrypt_block(&mut keystream);
        for i in 0..block_len {
            buf[offset + i] ^= keystream[i];
        }
        offset += block_len;
        increment_counter(ctr);
    }
}

/// Advances `ctr` by `blocks` block-increments without consuming any
/// keystream. Used when a sector move starts partway into a ciphertext and
/// the counter must be pre-advanced to the true key-stream block.
pub fn advance_counter(ctr: &mut [u8; 16], blocks: usize) {
    for _ in 0..blocks {
        increment_counter(ctr);
    }
}

fn increment_counter(ctr: &mut [u8; 16]) {
    for byte in ctr.iter_mut().rev() {
        let (res, carry) = byte.overflowing_add(1);
        *byte = res;
        if !carry {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_reversible() {
        let key = [0x42u8; 16];
        let mut ctr = [0u8; 16];
        let plaintext: [u8; 40] = core::array::from_fn(|i| i as u8);
        let mut buf = plaintext;
        aes_ctr(&mut buf, &mut ctr, &key);
        assert_ne!(buf, plaintext);

        let mut ctr2 = [0u8; 16];
        aes_ctr(&mut buf, &mut ctr2, &key);
        assert_eq!(buf, plaintext);
    }

    #[test]
    fn increment_carries_from_byte_15_toward_0() {
        let mut ctr = [0u8; 16];
        ctr[15] = 0xFF;
        increment_counter(&mut ctr);
        assert_eq!(ctr[15], 0x00);
        assert_eq!(ctr[14], 0x01);

        let mut all_ff = [0xFFu8; 16];
        increment_counter(&mut all_ff);
        assert_eq!(all_ff, [0u8; 16]);
    }

    #[test]
    fn advance_then_continue_matches_running_from_zero() {
        let key = [7u8; 16];
        let data: [u8; 64] = core::array::from_fn(|i| i as u8);

        // Encrypt the whole buffer in one call.
        let mut whole = data;
        let mut ctr_whole = [0u8; 16];
        aes_ctr(&mut whole, &mut ctr_whole, &key);

        // Encrypt the tail after pre-advancing the counter by two blocks.
        let mut tail = data[32..].to_vec();
        let mut ctr_tail = [0u8; 16];
        advance_counter(&mut ctr_tail, 2);
        aes_ctr(&mut tail, &mut ctr_tail, &key);

        assert_eq!(&tail[..], &whole[32..]);
    }
}
