//! CRC-64 integrity codes.
//!
//! Jones polynomial, reflected, zero initial value and no final xor (the
//! variant Redis uses). Not a MAC: it catches corruption, not tampering.

/// Reflected form of the Jones polynomial `0xad93d23594c935a9`.
const POLY: u64 = 0x95ac_9329_ac4b_c9b5;

static TABLE: [u64; 256] = build_table();

const fn build_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u64;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC-64 of `data`.
pub fn crc64(data: &[u8]) -> u64 {
    crc64_with(0, data)
}

/// Continue a running CRC-64 from `seed` over `data`.
///
/// `crc64_with(crc64(a), b) == crc64(a ++ b)`.
pub fn crc64_with(seed: u64, data: &[u8]) -> u64 {
    data.iter().fold(seed, |crc, &byte| {
        TABLE[((crc ^ u64::from(byte)) & 0xff) as usize] ^ (crc >> 8)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(crc64(b"123456789"), 0xe9c6d914c4b8d9ca);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(crc64(b""), 0);
        assert_eq!(crc64_with(0x1234, b""), 0x1234);
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let data = b"the quick brown fox jumps over the lazy dog";
        for split in 0..data.len() {
            let (a, b) = data.split_at(split);
            assert_eq!(crc64_with(crc64(a), b), crc64(data));
        }
    }

    #[test]
    fn test_single_bit_flip_detected() {
        let mut data = b"123456789".to_vec();
        data[4] ^= 0x01;
        assert_ne!(crc64(&data), 0xe9c6d914c4b8d9ca);
    }
}
