//! transaction execution results
//!
//! nodes wrap execution results differently (`data`, `result`, bare). these
//! helpers normalize them, surface failed effects as typed errors and pull
//! out emitted events. failure text coming from the chain is classified here
//! and nowhere else.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::chain::ChainClient;
use crate::codec::json_u64;
use crate::error::{Result, VoucherError, VoucherErrorCode};

const GAS_PAYMENT_KEYWORDS: &[&str] = &["no valid gas coins", "missing gas payment", "no gas coins found"];

const GAS_KEYWORDS: &[&str] = &[
    "insufficientgas",
    "insufficient gas",
    "gasbudgettoolow",
    "gas budget too low",
    "gas price too low",
    "gas price is too low",
    "not enough gas",
    "gas balance too low",
    "gasbalancetoolow",
    "balance of gas object",
    "gas exceeded maximum",
    "needed_gas_amount",
];

const GAS_OBJECT_KEYWORDS: &[&str] = &["invalidgasobject", "invalid gas object"];

const BALANCE_KEYWORDS: &[&str] = &[
    "insufficientcoinbalance",
    "insufficient coin balance",
    "insufficient balance",
    "not enough balance",
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// map chain failure text to an error code, `None` when nothing matches
pub fn classify_failure(text: &str) -> Option<VoucherErrorCode> {
    let lower = text.to_lowercase();

    if contains_any(&lower, GAS_PAYMENT_KEYWORDS) || contains_any(&lower, GAS_KEYWORDS) {
        return Some(VoucherErrorCode::GasInsufficient);
    }
    if contains_any(&lower, GAS_OBJECT_KEYWORDS) {
        return Some(VoucherErrorCode::GasObjectInvalid);
    }
    if lower.contains("gas") && lower.contains("exceed") {
        return Some(VoucherErrorCode::GasExceedsMaximum);
    }
    if contains_any(&lower, BALANCE_KEYWORDS) || (lower.contains("insufficient") && !lower.contains("gas")) {
        return Some(VoucherErrorCode::CoinBalanceInsufficient);
    }
    if lower.contains("already") && lower.contains("redeem") {
        return Some(VoucherErrorCode::VoucherAlreadyRedeemed);
    }
    None
}

/// error code for a failed flow step, `fallback` when the error is generic
pub fn resolve_error_code(err: &VoucherError, fallback: VoucherErrorCode) -> VoucherErrorCode {
    let detected = match err {
        VoucherError::Execution { code, .. } => Some(*code),
        VoucherError::Chain(chain) => classify_failure(&chain.to_string()),
        _ => None,
    };
    match detected.unwrap_or_else(|| err.code()) {
        VoucherErrorCode::UnknownError => fallback,
        code => code,
    }
}

fn failure_status(effects: Option<&Value>) -> Option<String> {
    let status = effects?.get("status")?;
    let failed = match status {
        Value::String(s) => s == "failure",
        Value::Object(obj) => obj.get("status").and_then(Value::as_str) == Some("failure"),
        _ => false,
    };
    if !failed {
        return None;
    }
    let message = status
        .get("error")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("transaction execution failed");
    Some(message.to_string())
}

/// unwrap, check status and backfill `digest`
pub fn normalize_execution_result(result: Value) -> Result<Value> {
    let mut resolved: Map<String, Value> = match result {
        Value::Object(obj) => obj,
        _ => return Err(VoucherError::EmptyExecutionResult),
    };
    for wrapper in ["data", "result"] {
        let inner = match resolved.get(wrapper) {
            Some(Value::Object(inner)) => inner.clone(),
            _ => continue,
        };
        resolved = inner;
    }

    let effects = resolved.get("effects");
    if let Some(message) = failure_status(effects) {
        let code = classify_failure(&message).unwrap_or(VoucherErrorCode::TransactionValidationFailed);
        return Err(VoucherError::Execution { code, message });
    }

    let has_digest = resolved
        .get("digest")
        .and_then(Value::as_str)
        .map(|d| !d.is_empty())
        .unwrap_or(false);
    if !has_digest {
        let digest = resolved
            .get("transactionDigest")
            .or_else(|| effects.and_then(|e| e.get("transactionDigest")))
            .or_else(|| effects.and_then(|e| e.get("transactionEffectsDigest")))
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        if let Some(digest) = digest {
            resolved.insert("digest".into(), Value::String(digest));
        }
    }

    Ok(Value::Object(resolved))
}

/// `events`, else `effects.events`, else nothing
pub fn extract_events(result: &Value) -> Vec<Value> {
    result
        .get("events")
        .and_then(Value::as_array)
        .or_else(|| result.get("effects")?.get("events")?.as_array())
        .cloned()
        .unwrap_or_default()
}

/// events from the result, falling back to the indexed transaction by
/// digest. lookup failures degrade to an empty list.
pub async fn resolve_events_with_fallback(chain: &dyn ChainClient, result: &Value) -> Vec<Value> {
    let events = extract_events(result);
    if !events.is_empty() {
        return events;
    }
    let Some(digest) = result.get("digest").and_then(Value::as_str) else {
        return Vec::new();
    };

    debug!("no events in execution result, waiting for {}", digest);
    match chain.wait_for_transaction(digest).await {
        Ok(tx) => tx
            .get("events")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        Err(e) => {
            warn!("failed to fetch events for {}: {}", digest, e);
            Vec::new()
        }
    }
}

/// gas needed according to dry-run effects, plus a 20% buffer
pub fn estimate_gas(effects: &Value) -> Result<u64> {
    if let Some(message) = failure_status(Some(effects)) {
        let code = classify_failure(&message).unwrap_or(VoucherErrorCode::TransactionValidationFailed);
        return Err(VoucherError::Execution { code, message });
    }
    let gas_used = effects
        .get("gasUsed")
        .ok_or_else(|| VoucherError::UnexpectedReturn("dry run has no gasUsed".into()))?;
    let cost = |key: &str| {
        gas_used
            .get(key)
            .and_then(json_u64)
            .ok_or_else(|| VoucherError::UnexpectedReturn(format!("gasUsed.{} missing", key)))
    };
    let needed = cost("computationCost")?
        .saturating_add(cost("storageCost")?)
        .saturating_sub(cost("storageRebate")?);
    Ok(needed.saturating_add(needed / 5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_failure_keywords() {
        assert_eq!(classify_failure("InsufficientGas"), Some(VoucherErrorCode::GasInsufficient));
        assert_eq!(classify_failure("No valid gas coins found"), Some(VoucherErrorCode::GasInsufficient));
        assert_eq!(classify_failure("InvalidGasObject 0x1"), Some(VoucherErrorCode::GasObjectInvalid));
        assert_eq!(classify_failure("gas limit exceeds cap"), Some(VoucherErrorCode::GasExceedsMaximum));
        assert_eq!(
            classify_failure("InsufficientCoinBalance"),
            Some(VoucherErrorCode::CoinBalanceInsufficient)
        );
        assert_eq!(
            classify_failure("voucher already redeemed"),
            Some(VoucherErrorCode::VoucherAlreadyRedeemed)
        );
        assert_eq!(classify_failure("MoveAbort 7"), None);
    }

    #[test]
    fn test_normalize_unwraps_and_backfills_digest() {
        let out = normalize_execution_result(json!({
            "data": {"effects": {"status": {"status": "success"}, "transactionDigest": "D1"}}
        }))
        .unwrap();
        assert_eq!(out["digest"], "D1");

        let out = normalize_execution_result(json!({"result": {"transactionDigest": "D2"}})).unwrap();
        assert_eq!(out["digest"], "D2");

        let out = normalize_execution_result(json!({"digest": "D3", "transactionDigest": "X"})).unwrap();
        assert_eq!(out["digest"], "D3");
    }

    #[test]
    fn test_normalize_failure_status() {
        let err = normalize_execution_result(json!({
            "effects": {"status": {"status": "failure", "error": "InsufficientGas"}}
        }))
        .unwrap_err();
        assert_eq!(err.code(), VoucherErrorCode::GasInsufficient);

        let err = normalize_execution_result(json!({"effects": {"status": "failure"}})).unwrap_err();
        assert!(matches!(
            err,
            VoucherError::Execution { code: VoucherErrorCode::TransactionValidationFailed, .. }
        ));
    }

    #[test]
    fn test_normalize_rejects_empty() {
        assert!(matches!(
            normalize_execution_result(Value::Null),
            Err(VoucherError::EmptyExecutionResult)
        ));
    }

    #[test]
    fn test_extract_events() {
        assert_eq!(extract_events(&json!({"events": [1, 2]})).len(), 2);
        assert_eq!(extract_events(&json!({"effects": {"events": [1]}})).len(), 1);
        assert!(extract_events(&json!({})).is_empty());
    }

    #[test]
    fn test_estimate_gas_adds_buffer() {
        let effects = json!({
            "status": {"status": "success"},
            "gasUsed": {"computationCost": "1000", "storageCost": "600", "storageRebate": "100"}
        });
        assert_eq!(estimate_gas(&effects).unwrap(), 1800);
    }

    #[test]
    fn test_resolve_error_code_fallback() {
        let generic = VoucherError::UnexpectedReturn("x".into());
        assert_eq!(
            resolve_error_code(&generic, VoucherErrorCode::TransactionBuildFailed),
            VoucherErrorCode::TransactionBuildFailed
        );
        let chain = VoucherError::Chain(crate::chain::ChainError::TransactionFailed(
            "InvalidGasObject".into(),
        ));
        assert_eq!(
            resolve_error_code(&chain, VoucherErrorCode::RpcError),
            VoucherErrorCode::GasObjectInvalid
        );
    }
}
