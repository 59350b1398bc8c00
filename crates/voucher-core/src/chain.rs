//! chain rpc abstraction
//!
//! the pool only needs a handful of read paths plus transaction submission.
//! concrete rpc clients live outside this crate and implement [`ChainClient`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::VoucherErrorCode;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

impl ChainError {
    pub fn code(&self) -> VoucherErrorCode {
        match self {
            Self::ConnectionFailed(_) | Self::Timeout(_) => VoucherErrorCode::NetworkError,
            _ => VoucherErrorCode::RpcError,
        }
    }
}

/// opaque event pagination cursor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCursor {
    pub tx_digest: String,
    pub event_seq: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// events of one move type, one page at a time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventQuery {
    pub event_type: String,
    pub cursor: Option<EventCursor>,
    pub limit: usize,
    pub order: SortOrder,
}

impl EventQuery {
    pub fn new(event_type: impl Into<String>, limit: usize) -> Self {
        Self {
            event_type: event_type.into(),
            cursor: None,
            limit,
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(mut self) -> Self {
        self.order = SortOrder::Descending;
        self
    }

    pub fn after(mut self, cursor: Option<EventCursor>) -> Self {
        self.cursor = cursor;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    pub parsed_json: Value,
    #[serde(default)]
    pub timestamp_ms: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    pub data: Vec<ChainEvent>,
    pub next_cursor: Option<EventCursor>,
    pub has_next_page: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallArg {
    /// shared or owned object by id
    Object(String),
    /// bcs-encoded pure value
    Pure(Vec<u8>),
}

/// read-only move call used for simulations
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveCall {
    pub package: String,
    pub module: String,
    pub function: String,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<CallArg>,
}

impl MoveCall {
    pub fn target(&self) -> String {
        format!("{}::{}::{}", self.package, self.module, self.function)
    }
}

/// one return value of a simulated call, `data` is kept raw because nodes
/// disagree on its encoding (base64 string, byte array, `{bytes}` object)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReturnValue {
    pub data: Value,
    pub type_tag: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    #[serde(default)]
    pub return_values: Vec<ReturnValue>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    #[serde(default)]
    pub results: Vec<CommandResult>,
    #[serde(default)]
    pub error: Option<String>,
}

impl SimulationResult {
    pub fn first_return_value(&self) -> Option<&ReturnValue> {
        self.results.first().and_then(|r| r.return_values.first())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    pub tx_bytes: Vec<u8>,
    pub signatures: Vec<String>,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// one page of events matching the query
    async fn query_events(&self, query: &EventQuery) -> Result<EventPage, ChainError>;

    /// `content` of an object, `None` when the node returns no content
    async fn get_object(&self, object_id: &str) -> Result<Option<Value>, ChainError>;

    /// dry-run a move call without committing
    async fn simulate_call(&self, sender: &str, call: &MoveCall) -> Result<SimulationResult, ChainError>;

    /// submit a signed transaction, returns the raw execution result
    async fn execute_transaction(&self, tx: &SignedTransaction) -> Result<Value, ChainError>;

    /// block until a digest is indexed, returns the raw transaction block
    async fn wait_for_transaction(&self, digest: &str) -> Result<Value, ChainError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_page_from_rpc_json() {
        let page: EventPage = serde_json::from_value(json!({
            "data": [{
                "type": "0x2::privacy_pool::DepositEvent",
                "parsedJson": {"commitment": "0x01", "leaf_index": "0"}
            }],
            "nextCursor": {"txDigest": "abc", "eventSeq": "0"},
            "hasNextPage": true
        }))
        .unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].parsed_json["leaf_index"], "0");
        assert_eq!(page.next_cursor.unwrap().tx_digest, "abc");
        assert!(page.has_next_page);
    }

    #[test]
    fn test_move_call_target() {
        let call = MoveCall {
            package: "0xabc".into(),
            module: "privacy_pool".into(),
            function: "is_spent_array".into(),
            type_arguments: vec![],
            arguments: vec![],
        };
        assert_eq!(call.target(), "0xabc::privacy_pool::is_spent_array");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ChainError::Timeout("x".into()).code(), VoucherErrorCode::NetworkError);
        assert_eq!(ChainError::QueryFailed("x".into()).code(), VoucherErrorCode::RpcError);
    }
}
