//! batch spent-status lookup through a simulated contract call

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use tracing::{debug, warn};

use crate::bcs;
use crate::chain::{CallArg, ChainClient, MoveCall, ReturnValue};
use crate::error::{Result, VoucherError};
use crate::voucher::{NoteHasher, Voucher};
use crate::POOL_MODULE;

pub const IS_SPENT_FUNCTION: &str = "is_spent_array";

/// type tag under which some nodes return the bool vector
pub const NESTED_BYTES_TAG: &str = "vector<vector<u8>>";

/// raw bytes of a return value, given as base64, a byte array or `{bytes}`
pub fn normalize_return_bytes(data: &Value) -> Result<Vec<u8>> {
    match data {
        Value::String(s) => STANDARD
            .decode(s)
            .map_err(|e| VoucherError::UnexpectedReturn(format!("bad base64: {}", e))),
        Value::Array(items) => items
            .iter()
            .map(|b| {
                b.as_u64()
                    .filter(|b| *b <= u8::MAX as u64)
                    .map(|b| b as u8)
                    .ok_or_else(|| VoucherError::UnexpectedReturn(format!("not a byte: {}", b)))
            })
            .collect(),
        Value::Object(obj) => match obj.get("bytes") {
            Some(inner @ (Value::Array(_) | Value::String(_))) => normalize_return_bytes(inner),
            _ => Err(VoucherError::UnexpectedReturn("object without bytes".into())),
        },
        other => Err(VoucherError::UnexpectedReturn(format!(
            "unsupported return shape: {}",
            other
        ))),
    }
}

/// `vector<bool>`, falling back to `vector<vector<u8>>` where each inner
/// vector's first byte is the flag (nonzero is spent)
pub fn decode_bool_vector(value: &ReturnValue) -> Result<Vec<bool>> {
    let bytes = normalize_return_bytes(&value.data)?;
    match bcs::decode_bool_vector(&bytes) {
        Ok(flags) => Ok(flags),
        Err(direct) if value.type_tag == NESTED_BYTES_TAG => {
            debug!("bool vector decode failed ({}), trying nested bytes", direct);
            let nested = bcs::decode_byte_vectors(&bytes)
                .map_err(|e| VoucherError::UnexpectedReturn(format!("nested decode: {}", e)))?;
            Ok(nested
                .iter()
                .map(|inner| inner.first().is_some_and(|b| *b != 0))
                .collect())
        }
        Err(direct) => Err(VoucherError::UnexpectedReturn(format!(
            "unexpected return type {}: {}",
            value.type_tag, direct
        ))),
    }
}

pub struct SpentStatusChecker {
    chain: Arc<dyn ChainClient>,
    hasher: Arc<dyn NoteHasher>,
    package_id: String,
    config_id: String,
    coin_type: String,
}

impl SpentStatusChecker {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        hasher: Arc<dyn NoteHasher>,
        package_id: impl Into<String>,
        config_id: impl Into<String>,
        coin_type: impl Into<String>,
    ) -> Self {
        Self {
            chain,
            hasher,
            package_id: package_id.into(),
            config_id: config_id.into(),
            coin_type: coin_type.into(),
        }
    }

    fn nullifier_hash_bytes(&self, voucher: &Voucher) -> Result<Vec<u8>> {
        let nullifier = voucher.nullifier_element()?;
        Ok(self.hasher.nullifier_hash(&nullifier)?.to_bytes().to_vec())
    }

    pub fn build_call(&self, nullifier_hashes: Vec<Vec<u8>>) -> MoveCall {
        MoveCall {
            package: self.package_id.clone(),
            module: POOL_MODULE.into(),
            function: IS_SPENT_FUNCTION.into(),
            type_arguments: vec![self.coin_type.clone()],
            arguments: vec![
                CallArg::Object(self.config_id.clone()),
                CallArg::Pure(bcs::encode_byte_vectors(&nullifier_hashes)),
            ],
        }
    }

    /// one flag per voucher, in input order. an empty input makes no call.
    pub async fn check(&self, vouchers: &[Voucher], sender: &str) -> Result<Vec<bool>> {
        if vouchers.is_empty() {
            return Ok(Vec::new());
        }

        let hashes = vouchers
            .iter()
            .map(|v| self.nullifier_hash_bytes(v))
            .collect::<Result<Vec<_>>>()?;
        let call = self.build_call(hashes);

        let result = self.chain.simulate_call(sender, &call).await?;
        if let Some(err) = &result.error {
            warn!("spent check simulation reported: {}", err);
        }
        let value = result
            .first_return_value()
            .ok_or_else(|| VoucherError::UnexpectedReturn(format!("{} returned nothing", call.target())))?;

        let flags = decode_bool_vector(value)?;
        if flags.len() != vouchers.len() {
            return Err(VoucherError::UnexpectedReturn(format!(
                "{} flags for {} vouchers",
                flags.len(),
                vouchers.len()
            )));
        }
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ret(data: Value, tag: &str) -> ReturnValue {
        ReturnValue {
            data,
            type_tag: tag.into(),
        }
    }

    #[test]
    fn test_return_bytes_shapes() {
        assert_eq!(normalize_return_bytes(&json!("AwEAAQ==")).unwrap(), vec![3, 1, 0, 1]);
        assert_eq!(normalize_return_bytes(&json!([3, 1, 0, 1])).unwrap(), vec![3, 1, 0, 1]);
        assert_eq!(normalize_return_bytes(&json!({"bytes": [1, 1]})).unwrap(), vec![1, 1]);
        assert!(normalize_return_bytes(&json!(null)).is_err());
        assert!(normalize_return_bytes(&json!({"other": 1})).is_err());
    }

    #[test]
    fn test_direct_bool_vector() {
        let flags = decode_bool_vector(&ret(json!([3, 1, 0, 1]), "vector<bool>")).unwrap();
        assert_eq!(flags, vec![true, false, true]);
    }

    #[test]
    fn test_nested_fallback_matches_direct() {
        let nested = decode_bool_vector(&ret(json!([3, 1, 1, 1, 0, 1, 1]), NESTED_BYTES_TAG)).unwrap();
        let direct = decode_bool_vector(&ret(json!([3, 1, 0, 1]), "vector<bool>")).unwrap();
        assert_eq!(nested, vec![true, false, true]);
        assert_eq!(nested, direct);
    }

    #[test]
    fn test_nested_fallback_treats_nonzero_as_spent() {
        let flags = decode_bool_vector(&ret(json!([2, 1, 2, 1, 0]), NESTED_BYTES_TAG)).unwrap();
        assert_eq!(flags, vec![true, false]);
    }

    #[test]
    fn test_unknown_tag_does_not_fall_back() {
        let err = decode_bool_vector(&ret(json!([3, 1, 1, 1, 0, 1, 1]), "vector<u64>")).unwrap_err();
        assert!(matches!(err, VoucherError::UnexpectedReturn(_)));
    }
}
