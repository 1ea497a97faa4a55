//! Deterministic CBOR for signed and checksummed structures.
//!
//! RFC 8949 core deterministic encoding:
//! - map keys sorted by their encoded bytes
//! - integers in their shortest form
//! - definite lengths only
//!
//! The handshake body and the message header are both encoded here, so a
//! checksum or signature computed on one peer is reproducible on the other.
//! Decoding is left to `ciborium`; [`decode`] then checks that the input
//! was already canonical.

use ciborium::value::{Integer, Value};

use crate::error::WireError;

/// Encode a value canonically.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Encode a map with small integer keys.
pub fn encode_map(entries: Vec<(u64, Value)>) -> Vec<u8> {
    encode(&int_map(entries))
}

/// Build a map value keyed by integers.
pub fn int_map(entries: Vec<(u64, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (Value::Integer(k.into()), v))
            .collect(),
    )
}

/// Decode exactly one canonically encoded value.
///
/// Trailing bytes and non-canonical encodings (unsorted keys, padded
/// integers, indefinite lengths) are rejected.
pub fn decode(bytes: &[u8]) -> Result<Value, WireError> {
    let mut reader = bytes;
    let value: Value = ciborium::from_reader(&mut reader)
        .map_err(|e| WireError::Malformed(e.to_string()))?;

    if !reader.is_empty() {
        return Err(WireError::Malformed(format!(
            "{} trailing bytes",
            reader.len()
        )));
    }
    if encode(&value) != bytes {
        return Err(WireError::Malformed("not canonically encoded".into()));
    }
    Ok(value)
}

/// Read-only view over a decoded integer-keyed map.
pub struct MapView<'a> {
    entries: &'a [(Value, Value)],
}

impl<'a> MapView<'a> {
    pub fn new(value: &'a Value) -> Result<Self, WireError> {
        match value {
            Value::Map(entries) => Ok(Self { entries }),
            _ => Err(WireError::Malformed("expected map".into())),
        }
    }

    pub fn get(&self, key: u64) -> Option<&'a Value> {
        self.entries
            .iter()
            .find(|(k, _)| as_u64(k) == Some(key))
            .map(|(_, v)| v)
    }

    pub fn u64(&self, key: u64, field: &str) -> Result<u64, WireError> {
        self.get(key)
            .and_then(as_u64)
            .ok_or_else(|| missing(field))
    }

    pub fn u32(&self, key: u64, field: &str) -> Result<u32, WireError> {
        u32::try_from(self.u64(key, field)?).map_err(|_| missing(field))
    }

    pub fn bytes(&self, key: u64, field: &str) -> Result<&'a [u8], WireError> {
        match self.get(key) {
            Some(Value::Bytes(b)) => Ok(b),
            _ => Err(missing(field)),
        }
    }

    pub fn fixed<const N: usize>(&self, key: u64, field: &str) -> Result<[u8; N], WireError> {
        self.bytes(key, field)?
            .try_into()
            .map_err(|_| WireError::Malformed(format!("{field}: expected {N} bytes")))
    }
}

fn missing(field: &str) -> WireError {
    WireError::Malformed(format!("missing or invalid {field}"))
}

/// Non-negative integer value, if it fits in a `u64`.
pub fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Integer(i) => u64::try_from(*i).ok(),
        _ => None,
    }
}

fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => {
            encode_uint(buf, 2, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Text(s) => {
            encode_uint(buf, 3, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(items) => {
            encode_uint(buf, 4, items.len() as u64);
            for item in items {
                encode_value_to(buf, item);
            }
        }
        Value::Map(entries) => encode_map_entries(buf, entries),
        Value::Tag(tag, inner) => {
            encode_uint(buf, 6, *tag);
            encode_value_to(buf, inner);
        }
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Float(f) => {
            buf.push(0xfb);
            buf.extend_from_slice(&f.to_be_bytes());
        }
        // Null, plus any value kind ciborium adds later.
        _ => buf.push(0xf6),
    }
}

fn encode_integer(buf: &mut Vec<u8>, i: Integer) {
    let n = i128::from(i);
    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // -1 is stored as 0, -2 as 1, ...
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Write a major type header with its argument in the shortest form.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | n as u8);
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_map_entries(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| (encode(k), v))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key, value) in pairs {
        buf.extend_from_slice(&key);
        encode_value_to(buf, value);
    }
}
