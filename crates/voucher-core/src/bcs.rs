//! minimal bcs codec for move call arguments and return values
//!
//! only the shapes the pool contract uses: uleb128 length-prefixed
//! `vector<vector<u8>>` and `vector<bool>`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BcsError {
    #[error("unexpected end of input at byte {0}")]
    UnexpectedEof(usize),

    #[error("uleb128 length overflows at byte {0}")]
    LengthOverflow(usize),

    #[error("invalid bool byte {value:#04x} at {offset}")]
    InvalidBool { value: u8, offset: usize },

    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
}

pub fn encode_uleb128(mut value: usize, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub fn decode_uleb128(bytes: &[u8], pos: &mut usize) -> Result<usize, BcsError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = *bytes.get(*pos).ok_or(BcsError::UnexpectedEof(*pos))?;
        if shift >= 32 {
            return Err(BcsError::LengthOverflow(*pos));
        }
        value |= ((byte & 0x7f) as u64) << shift;
        *pos += 1;
        if byte & 0x80 == 0 {
            return usize::try_from(value).map_err(|_| BcsError::LengthOverflow(*pos));
        }
        shift += 7;
    }
}

/// `vector<vector<u8>>`
pub fn encode_byte_vectors(items: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + items.iter().map(|i| i.len() + 1).sum::<usize>());
    encode_uleb128(items.len(), &mut out);
    for item in items {
        encode_uleb128(item.len(), &mut out);
        out.extend_from_slice(item);
    }
    out
}

/// `vector<bool>`, every byte must be consumed
pub fn decode_bool_vector(bytes: &[u8]) -> Result<Vec<bool>, BcsError> {
    let mut pos = 0;
    let len = decode_uleb128(bytes, &mut pos)?;
    let body = bytes
        .get(pos..pos.saturating_add(len))
        .ok_or(BcsError::UnexpectedEof(bytes.len()))?;
    let flags = body
        .iter()
        .enumerate()
        .map(|(i, b)| match b {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(BcsError::InvalidBool {
                value: *other,
                offset: pos + i,
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let consumed = pos + len;
    if consumed != bytes.len() {
        return Err(BcsError::TrailingBytes(bytes.len() - consumed));
    }
    Ok(flags)
}

/// `vector<vector<u8>>`, every byte must be consumed
pub fn decode_byte_vectors(bytes: &[u8]) -> Result<Vec<Vec<u8>>, BcsError> {
    let mut pos = 0;
    let count = decode_uleb128(bytes, &mut pos)?;
    let mut items = Vec::with_capacity(count.min(bytes.len()));
    for _ in 0..count {
        let len = decode_uleb128(bytes, &mut pos)?;
        let item = bytes
            .get(pos..pos.saturating_add(len))
            .ok_or(BcsError::UnexpectedEof(bytes.len()))?;
        items.push(item.to_vec());
        pos += len;
    }
    if pos != bytes.len() {
        return Err(BcsError::TrailingBytes(bytes.len() - pos));
    }
    Ok(items)
}
