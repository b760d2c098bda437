use crc::{Algorithm, Crc};

/// CRC-8/CCITT, seed 0xFF, non-reflected, no final xor — the algorithm the
/// command-record seal is defined against.
const CRC8_CCITT_SEED_FF: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x07,
    init: 0xFF,
    refin: false,
    refout: false,
    xorout: 0x00,
    check: 0xFB,
    residue: 0x00,
};

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC8_CCITT_SEED_FF);

/// Computes the CRC-8 over a command record's three payload bytes
/// (`cmd1, cmd2, cmd3`).
///
/// The distilled source exposes one dual-purpose routine that always
/// overwrites `cmd.crc8` and reports whether the old value matched. That
/// hazard is split here into [`seal`] (compute) and [`verify`] (compare
/// without mutating) per the crate's design notes.
fn compute(payload: &[u8; 3]) -> u8 {
    CRC8.checksum(payload)
}

/// Stamps and returns the CRC-8 for `payload`. Call before writing a new
/// command record.
pub fn seal(payload: &[u8; 3]) -> u8 {
    compute(payload)
}

/// Returns `true` iff `crc8` is the correct seal for `payload`.
pub fn verify(payload: &[u8; 3], crc8: u8) -> bool {
    compute(payload) == crc8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let payload = [0x11u8, 0x14, 0x03];
        let crc = seal(&payload);
        assert!(verify(&payload, crc));
    }

    #[test]
    fn any_bit_flip_fails_verify() {
        let payload = [0x11u8, 0x14, 0x03];
        let crc = seal(&payload);
        for byte_idx in 0..3 {
            for bit in 0..8u8 {
                let mut flipped = payload;
                flipped[byte_idx] ^= 1 << bit;
                assert!(!verify(&flipped, crc), "byte {} bit {}", byte_idx, bit);
            }
        }
    }
}
