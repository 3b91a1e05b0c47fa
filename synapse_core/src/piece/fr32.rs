//! FR32 padding.
//!
//! Every 127 bytes of payload are read as a little-endian bit stream of 1016
//! bits and split into four runs of 254 bits. Each run is written out
//! followed by two zero bits, so the 128 output bytes form four 32-byte
//! leaves that are all below the BLS12-381 scalar field modulus.

/// Payload bytes consumed per padding step.
pub const QUAD_SIZE: usize = 127;

/// Bytes produced per padding step (four leaves).
pub const PADDED_QUAD_SIZE: usize = 128;

const TOP_TWO_BITS_CLEAR: u8 = 0b0011_1111;

/// Expands 127 payload bytes into 128 padded bytes.
pub fn pad_quad(input: &[u8; QUAD_SIZE], out: &mut [u8; PADDED_QUAD_SIZE]) {
    out[..32].copy_from_slice(&input[..32]);
    out[31] &= TOP_TWO_BITS_CLEAR;

    for i in 32..64 {
        out[i] = (input[i] << 2) | (input[i - 1] >> 6);
    }
    out[63] &= TOP_TWO_BITS_CLEAR;

    for i in 64..96 {
        out[i] = (input[i] << 4) | (input[i - 1] >> 4);
    }
    out[95] &= TOP_TWO_BITS_CLEAR;

    for i in 96..127 {
        out[i] = (input[i] << 6) | (input[i - 1] >> 2);
    }
    out[127] = input[126] >> 2;
}

/// Inverse of [`pad_quad`]. The two padding bits of each leaf are ignored.
pub fn unpad_quad(padded: &[u8; PADDED_QUAD_SIZE], out: &mut [u8; QUAD_SIZE]) {
    out[..31].copy_from_slice(&padded[..31]);
    out[31] = (padded[31] & TOP_TWO_BITS_CLEAR) | (padded[32] << 6);

    for i in 32..63 {
        out[i] = (padded[i] >> 2) | (padded[i + 1] << 6);
    }
    out[63] = ((padded[63] & TOP_TWO_BITS_CLEAR) >> 2) | (padded[64] << 4);

    for i in 64..95 {
        out[i] = (padded[i] >> 4) | (padded[i + 1] << 4);
    }
    out[95] = ((padded[95] & TOP_TWO_BITS_CLEAR) >> 4) | (padded[96] << 2);

    for i in 96..127 {
        out[i] = (padded[i] >> 6) | (padded[i + 1] << 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::*;

    #[test]
    fn test_pad_all_ones() {
        let input = [0xffu8; QUAD_SIZE];
        let mut out = [0u8; PADDED_QUAD_SIZE];
        pad_quad(&input, &mut out);

        for leaf in out.chunks(32) {
            assert!(leaf[..31].iter().all(|b| *b == 0xff));
            assert_eq!(leaf[31], 0x3f);
        }
    }

    #[test]
    fn test_pad_zero_is_zero() {
        let input = [0u8; QUAD_SIZE];
        let mut out = [0xffu8; PADDED_QUAD_SIZE];
        pad_quad(&input, &mut out);
        assert!(out.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_pad_moves_boundary_bits() {
        // bits 254 and 255 of the input become bits 0 and 1 of the second leaf
        let mut input = [0u8; QUAD_SIZE];
        input[31] = 0b1100_0000;
        let mut out = [0u8; PADDED_QUAD_SIZE];
        pad_quad(&input, &mut out);
        assert_eq!(out[31], 0);
        assert_eq!(out[32], 0b0000_0011);
    }

    proptest! {
        #[test]
        fn unpad_restores_payload(bytes in vec(any::<u8>(), QUAD_SIZE)) {
            let input: [u8; QUAD_SIZE] = bytes.try_into().unwrap();
            let mut padded = [0u8; PADDED_QUAD_SIZE];
            pad_quad(&input, &mut padded);

            // every leaf stays below the field modulus
            for leaf in padded.chunks(32) {
                prop_assert_eq!(leaf[31] & 0xc0, 0);
            }
            let mut restored = [0u8; QUAD_SIZE];
            unpad_quad(&padded, &mut restored);
            prop_assert_eq!(restored, input);
        }
    }
}
