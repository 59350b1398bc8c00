//! field element encoding and wire value parsing

use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{Result, VoucherError};

/// bn254 scalar field order, big-endian
pub const BN254_SCALAR_MODULUS_BE: [u8; 32] = [
    0x30, 0x64, 0x4e, 0x72, 0xe1, 0x31, 0xa0, 0x29, 0xb8, 0x50, 0x45, 0xb6, 0x81, 0x81, 0x58, 0x5d,
    0x28, 0x33, 0xe8, 0x48, 0x79, 0xb9, 0x70, 0x91, 0x43, 0xe1, 0xf5, 0x93, 0xf0, 0x00, 0x00, 0x01,
];

pub fn bn254_modulus() -> BigUint {
    BigUint::from_bytes_be(&BN254_SCALAR_MODULUS_BE)
}

/// 256-bit value as carried by commitments, roots and nullifiers
///
/// stored big-endian. the hex form is always `0x` plus 64 lowercase digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FieldElement([u8; 32]);

impl FieldElement {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    pub fn from_biguint(value: &BigUint) -> Result<Self> {
        let be = value.to_bytes_be();
        if be.len() > 32 {
            return Err(VoucherError::InvalidHex(format!(
                "value exceeds 256 bits ({} bytes)",
                be.len()
            )));
        }
        let mut bytes = [0u8; 32];
        bytes[32 - be.len()..].copy_from_slice(&be);
        Ok(Self(bytes))
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }

    /// little-endian byte accumulation, `value = sum(b[i] << 8i)`
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_biguint(&BigUint::from_bytes_le(bytes))
    }

    /// `len` little-endian bytes, fails when the value does not fit
    pub fn to_le_bytes(&self, len: usize) -> Result<Vec<u8>> {
        let mut le = self.to_biguint().to_bytes_le();
        if le.len() > len {
            return Err(VoucherError::InvalidHex(format!(
                "value does not fit in {} bytes",
                len
            )));
        }
        le.resize(len, 0);
        Ok(le)
    }

    /// parse hex with or without a `0x` prefix, odd digit counts allowed
    pub fn from_hex(s: &str) -> Result<Self> {
        let digits = strip_hex_prefix(s.trim());
        if digits.is_empty() {
            return Err(VoucherError::InvalidHex(format!("empty hex string {:?}", s)));
        }
        let value = BigUint::parse_bytes(digits.as_bytes(), 16)
            .ok_or_else(|| VoucherError::InvalidHex(s.to_string()))?;
        Self::from_biguint(&value)
    }

    pub fn from_decimal(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(VoucherError::InvalidDecimal(s.to_string()));
        }
        let value = BigUint::parse_bytes(trimmed.as_bytes(), 10)
            .ok_or_else(|| VoucherError::InvalidDecimal(s.to_string()))?;
        Self::from_biguint(&value).map_err(|_| VoucherError::InvalidDecimal(s.to_string()))
    }

    /// `0x`-prefixed strings are hex, anything else decimal
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
            Self::from_hex(trimmed)
        } else {
            Self::from_decimal(trimmed)
        }
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn to_decimal(&self) -> String {
        self.to_biguint().to_str_radix(10)
    }

    /// reduce modulo the bn254 scalar order
    pub fn reduce(&self) -> Self {
        let reduced = self.to_biguint() % bn254_modulus();
        let be = reduced.to_bytes_be();
        let mut bytes = [0u8; 32];
        bytes[32 - be.len()..].copy_from_slice(&be);
        Self(bytes)
    }

    pub fn is_in_field(&self) -> bool {
        self.0 < BN254_SCALAR_MODULUS_BE
    }

    pub fn short_hex(&self) -> String {
        pool_merkle::short_hex(&self.0)
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldElement({})", self.to_hex())
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for FieldElement {
    type Err = VoucherError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<[u8; 32]> for FieldElement {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<FieldElement> for [u8; 32] {
    fn from(fe: FieldElement) -> Self {
        fe.0
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

pub fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// arbitrary-length hex to a decimal string, `"0x10"` gives `"16"`
pub fn hex_to_decimal(s: &str) -> Result<String> {
    let digits = strip_hex_prefix(s.trim());
    if digits.is_empty() {
        return Err(VoucherError::InvalidHex(format!("empty hex string {:?}", s)));
    }
    BigUint::parse_bytes(digits.as_bytes(), 16)
        .map(|v| v.to_str_radix(10))
        .ok_or_else(|| VoucherError::InvalidHex(s.to_string()))
}

/// hex to bytes, left-padding odd digit counts with a zero nibble
pub fn hex_to_bytes(s: &str) -> Result<Vec<u8>> {
    let digits = strip_hex_prefix(s.trim());
    let padded;
    let digits = if digits.len() % 2 == 1 {
        padded = format!("0{}", digits);
        padded.as_str()
    } else {
        digits
    };
    hex::decode(digits).map_err(|e| VoucherError::InvalidHex(format!("{}: {}", s, e)))
}

/// deposit event commitment, either a hex string or little-endian byte array
pub fn parse_commitment(raw: &Value) -> Result<FieldElement> {
    match raw {
        Value::Array(items) => {
            let bytes = items
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    v.as_u64()
                        .filter(|b| *b <= u8::MAX as u64)
                        .map(|b| b as u8)
                        .ok_or_else(|| {
                            VoucherError::CommitmentParse(format!("byte {} is not a u8: {}", i, v))
                        })
                })
                .collect::<Result<Vec<u8>>>()?;
            FieldElement::from_le_bytes(&bytes)
                .map_err(|e| VoucherError::CommitmentParse(e.to_string()))
        }
        Value::String(s) if !s.trim().is_empty() => {
            FieldElement::from_hex(s).map_err(|e| VoucherError::CommitmentParse(e.to_string()))
        }
        other => Err(VoucherError::CommitmentParse(format!(
            "unsupported commitment shape: {}",
            other
        ))),
    }
}

/// on-chain numeric field, json number or numeric string
pub fn json_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// on-chain u256, decimal or `0x` string, number, or little-endian byte array
pub fn parse_chain_field(value: &Value) -> Result<FieldElement> {
    match value {
        Value::String(s) => FieldElement::parse(s),
        Value::Number(n) => n
            .as_u64()
            .map(FieldElement::from_u64)
            .ok_or_else(|| VoucherError::InvalidDecimal(n.to_string())),
        Value::Array(_) => parse_commitment(value),
        other => Err(VoucherError::InvalidDecimal(other.to_string())),
    }
}

/// proof service hex output to bytes
///
/// optional `0x` prefix, odd lengths are left-padded with a zero nibble, any
/// non-hex character is rejected.
pub fn parse_proof(s: &str) -> Result<Vec<u8>> {
    let digits = strip_hex_prefix(s.trim());
    if digits.is_empty() {
        return Err(VoucherError::InvalidProofEncoding("empty proof".into()));
    }
    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(VoucherError::InvalidProofEncoding(format!(
            "non-hex character {:?}",
            bad
        )));
    }
    hex_to_bytes(digits).map_err(|e| VoucherError::InvalidProofEncoding(e.to_string()))
}
