//! voucher records and shareable voucher codes

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codec::FieldElement;
use crate::error::{Result, VoucherError};

/// bytes of nullifier and of secret inside a voucher code
pub const NOTE_PART_BYTES: usize = 31;

/// hex digits of the `0x` preimage in a voucher code
pub const PREIMAGE_HEX_LEN: usize = NOTE_PART_BYTES * 2 * 2;

const CODE_PREFIX: &str = "S";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    #[default]
    #[serde(rename = "oct")]
    Oct,
    #[serde(rename = "oct-testnet")]
    OctTestnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Oct => "oct",
            Network::OctTestnet => "oct-testnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = VoucherError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "oct" => Ok(Network::Oct),
            "oct-testnet" => Ok(Network::OctTestnet),
            other => Err(VoucherError::Config(format!("unknown network {:?}", other))),
        }
    }
}

/// locally held note for one pool deposit
///
/// hash-valued fields stay in their stored hex form. they are parsed only when
/// a proof or spent check needs them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Voucher {
    pub id: String,
    pub account_address: String,
    pub network: Network,
    pub currency: String,
    /// display amount
    pub amount: String,
    /// base units
    pub denomination: u64,
    pub commitment: String,
    pub nullifier: String,
    pub secret: String,
    pub nullifier_hash: String,
    /// leaf index recorded at deposit time, may be stale
    pub leaf_index: u64,
    pub timestamp: u64,
    pub voucher_code: String,
    pub redeemed: bool,
    pub tx_digest: Option<String>,
    pub redeem_tx_digest: Option<String>,
    pub redeem_time: Option<u64>,
}

impl Voucher {
    pub fn commitment_element(&self) -> Result<FieldElement> {
        parse_field("commitment", &self.commitment)
    }

    pub fn nullifier_element(&self) -> Result<FieldElement> {
        parse_field("nullifier", &self.nullifier)
    }

    pub fn secret_element(&self) -> Result<FieldElement> {
        parse_field("secret", &self.secret)
    }

    pub fn nullifier_hash_element(&self) -> Result<FieldElement> {
        parse_field("nullifier hash", &self.nullifier_hash)
    }
}

/// voucher fields are hex with or without prefix
fn parse_field(name: &'static str, value: &str) -> Result<FieldElement> {
    if value.trim().is_empty() {
        return Err(VoucherError::MissingVoucherField(name));
    }
    FieldElement::from_hex(value)
}

/// commitment and nullifier hash derivation, supplied by the caller
///
/// must match the hash the pool contract and circuit use.
pub trait NoteHasher: Send + Sync {
    fn commitment(&self, nullifier: &FieldElement, secret: &FieldElement) -> Result<FieldElement>;

    fn nullifier_hash(&self, nullifier: &FieldElement) -> Result<FieldElement>;
}

/// shareable voucher code, `S-{amount}-{leaf_index}-0x{nullifier_le}{secret_le}`
/// plain ascii digits only, no sign or whitespace
fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoucherCode {
    pub amount: u64,
    pub leaf_index: u64,
    pub nullifier: FieldElement,
    pub secret: FieldElement,
}

impl VoucherCode {
    pub fn parse(code: &str) -> Result<Self> {
        let invalid = |reason: &str| VoucherError::InvalidVoucherCode(reason.to_string());

        let mut parts = code.splitn(4, '-');
        let (prefix, amount, leaf_index, preimage) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(p), Some(a), Some(l), Some(h)) => (p, a, l, h),
                _ => return Err(invalid("expected four '-' separated parts")),
            };

        if prefix != CODE_PREFIX {
            return Err(invalid("unknown prefix"));
        }
        let amount = parse_digits(amount).ok_or_else(|| invalid("amount is not an integer"))?;
        if amount == 0 {
            return Err(invalid("amount must be positive"));
        }
        let leaf_index =
            parse_digits(leaf_index).ok_or_else(|| invalid("leaf index is not an integer"))?;

        let digits = preimage
            .strip_prefix("0x")
            .ok_or_else(|| invalid("preimage must start with 0x"))?;
        if digits.len() != PREIMAGE_HEX_LEN {
            return Err(invalid("preimage has the wrong length"));
        }
        let bytes = hex::decode(digits).map_err(|_| invalid("preimage is not hex"))?;
        let (nullifier, secret) = bytes.split_at(NOTE_PART_BYTES);

        Ok(Self {
            amount,
            leaf_index,
            nullifier: FieldElement::from_le_bytes(nullifier)?,
            secret: FieldElement::from_le_bytes(secret)?,
        })
    }

    /// fails when nullifier or secret exceed 31 bytes
    pub fn encode(&self) -> Result<String> {
        let mut preimage = self.nullifier.to_le_bytes(NOTE_PART_BYTES)?;
        preimage.extend(self.secret.to_le_bytes(NOTE_PART_BYTES)?);
        Ok(format!(
            "{}-{}-{}-0x{}",
            CODE_PREFIX,
            self.amount,
            self.leaf_index,
            hex::encode(preimage)
        ))
    }

    /// full voucher record, deriving commitment and nullifier hash
    pub fn to_voucher(&self, hasher: &dyn NoteHasher, network: Network, currency: &str) -> Result<Voucher> {
        let commitment = hasher.commitment(&self.nullifier, &self.secret)?;
        let nullifier_hash = hasher.nullifier_hash(&self.nullifier)?;
        Ok(Voucher {
            network,
            currency: currency.to_string(),
            amount: self.amount.to_string(),
            denomination: self.amount,
            commitment: commitment.to_hex(),
            nullifier: self.nullifier.to_hex(),
            secret: self.secret.to_hex(),
            nullifier_hash: nullifier_hash.to_hex(),
            leaf_index: self.leaf_index,
            voucher_code: self.encode()?,
            ..Voucher::default()
        })
    }
}

impl FromStr for VoucherCode {
    type Err = VoucherError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// parameters of a voucher redemption
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemParams {
    pub voucher_code: String,
    pub recipient: String,
    #[serde(default)]
    pub relayer: Option<String>,
    /// relayer fee committed in the proof, zero when unset
    #[serde(default)]
    pub fee: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct XorHasher;

    impl NoteHasher for XorHasher {
        fn commitment(&self, n: &FieldElement, s: &FieldElement) -> Result<FieldElement> {
            let mut out = [0u8; 32];
            for (i, o) in out.iter_mut().enumerate() {
                *o = n.as_bytes()[i] ^ s.as_bytes()[i];
            }
            Ok(FieldElement::from_bytes(out))
        }

        fn nullifier_hash(&self, n: &FieldElement) -> Result<FieldElement> {
            Ok(*n)
        }
    }

    fn sample() -> VoucherCode {
        VoucherCode {
            amount: 1_000_000,
            leaf_index: 12,
            nullifier: FieldElement::from_u64(0x0102),
            secret: FieldElement::from_u64(0xffee),
        }
    }

    #[test]
    fn test_code_layout() {
        let code = sample().encode().unwrap();
        assert!(code.starts_with("S-1000000-12-0x0201"));
        assert_eq!(code.len(), "S-1000000-12-0x".len() + PREIMAGE_HEX_LEN);
        assert_eq!(VoucherCode::parse(&code).unwrap(), sample());
    }

    #[test]
    fn test_code_rejects_malformed() {
        let good = sample().encode().unwrap();
        let cases = [
            good.replacen("S-", "X-", 1),
            good.replacen("-1000000-", "-0-", 1),
            good.replacen("-12-", "-twelve-", 1),
            good.replacen("-0x", "-", 1),
            format!("{}00", good),
            "S-1-2".to_string(),
            good.replacen("-1000000-", "-+1000000-", 1),
            good.replacen("-12-", "-+12-", 1),
            good.replacen("-12-", "- 12-", 1),
            format!(" {}", good),
            format!("{}\n", good),
        ];
        for case in cases {
            assert!(
                matches!(VoucherCode::parse(&case), Err(VoucherError::InvalidVoucherCode(_))),
                "accepted {}",
                case
            );
        }
    }

    #[test]
    fn test_encode_rejects_oversized_parts() {
        let mut code = sample();
        code.secret = FieldElement::from_bytes([0x10; 32]);
        assert!(code.encode().is_err());
    }

    #[test]
    fn test_to_voucher_derives_hashes() {
        let v = sample().to_voucher(&XorHasher, Network::OctTestnet, "USDH").unwrap();
        assert_eq!(v.commitment_element().unwrap(), FieldElement::from_u64(0x0102 ^ 0xffee));
        assert_eq!(v.nullifier_hash_element().unwrap(), FieldElement::from_u64(0x0102));
        assert_eq!(v.denomination, 1_000_000);
        assert_eq!(v.network, Network::OctTestnet);
    }

    #[test]
    fn test_missing_field() {
        let v = Voucher::default();
        assert!(matches!(v.commitment_element(), Err(VoucherError::MissingVoucherField("commitment"))));
    }

    #[test]
    fn test_voucher_json_is_camel_case() {
        let v = Voucher {
            leaf_index: 3,
            nullifier_hash: "0xab".into(),
            ..Voucher::default()
        };
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["leafIndex"], 3);
        assert_eq!(json["nullifierHash"], "0xab");
        assert_eq!(json["network"], "oct");
    }
}
