//! Unsigned LEB128 ("varuint") codec.
//!
//! Seven bits per byte, least significant group first; the high bit of a
//! byte is set when more bytes follow.

use integer_encoding::VarInt;

use crate::error::WireError;

/// Longest encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Encode `value` into a fresh buffer.
pub fn encode(value: u64) -> Vec<u8> {
    value.encode_var_vec()
}

/// Append the encoding of `value` to `buf`.
pub fn encode_into(value: u64, buf: &mut Vec<u8>) {
    let mut scratch = [0u8; MAX_VARINT_LEN];
    let len = value.encode_var(&mut scratch);
    buf.extend_from_slice(&scratch[..len]);
}

/// Number of bytes `encode(value)` produces.
pub fn encoded_len(value: u64) -> usize {
    value.required_space()
}

/// Decode a varuint from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed. Encodings longer
/// than ten bytes, or whose tenth byte carries more than the top bit of a
/// `u64`, are rejected rather than wrapped.
pub fn decode(bytes: &[u8]) -> Result<(u64, usize), WireError> {
    let window = &bytes[..bytes.len().min(MAX_VARINT_LEN)];
    let Some(last) = window.iter().position(|byte| byte & 0x80 == 0) else {
        return Err(if window.len() == MAX_VARINT_LEN {
            WireError::VarintOverflow
        } else {
            WireError::VarintTruncated
        });
    };
    if last == MAX_VARINT_LEN - 1 && window[last] > 0x01 {
        return Err(WireError::VarintOverflow);
    }

    match u64::decode_var(&window[..=last]) {
        Some((value, read)) if read == last + 1 => Ok((value, read)),
        _ => Err(WireError::VarintOverflow),
    }
}
