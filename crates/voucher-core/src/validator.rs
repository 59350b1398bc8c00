//! local tree vs on-chain pool consistency
//!
//! the on-chain pool object carries `next_index` (number of commitments) and a
//! root history ring. a local tree is only usable when its leaf count equals
//! `next_index` and its root equals the ring entry at `current_root_index`.

use serde_json::Value;
use tracing::{debug, error, info};

use crate::chain::ChainClient;
use crate::codec::{json_u64, parse_chain_field, FieldElement};
use crate::error::{Result, VoucherError};
use crate::merkle::MerkleTreeEngine;
use crate::retry::{retry_with_state, RetryConfig};
use crate::sync::EventSynchronizer;

/// field of the pool object holding the tree state
pub const TREE_FIELD: &str = "marklet_tree_with_history";

/// on-chain tree state at one point in time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub next_index: u64,
    pub current_root_index: u64,
    pub roots: Vec<Value>,
}

impl PoolSnapshot {
    /// parse the `content` of the pool config object
    pub fn from_object(content: &Value) -> Result<Self> {
        let tree = content
            .get("fields")
            .and_then(|f| f.get(TREE_FIELD))
            .and_then(|t| t.get("fields"))
            .ok_or_else(|| VoucherError::PoolSnapshot(format!("pool object has no {}", TREE_FIELD)))?;

        let next_index = tree
            .get("next_index")
            .and_then(json_u64)
            .ok_or_else(|| VoucherError::PoolSnapshot("missing next_index".into()))?;
        let current_root_index = tree
            .get("current_root_index")
            .and_then(json_u64)
            .ok_or_else(|| VoucherError::PoolSnapshot("missing current_root_index".into()))?;
        let roots = tree
            .get("roots")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| VoucherError::PoolSnapshot("missing roots".into()))?;

        Ok(Self {
            next_index,
            current_root_index,
            roots,
        })
    }

    /// the root at `current_root_index`
    pub fn current_root(&self) -> Result<FieldElement> {
        let raw = usize::try_from(self.current_root_index)
            .ok()
            .and_then(|i| self.roots.get(i))
            .ok_or_else(|| {
                VoucherError::PoolSnapshot(format!(
                    "current_root_index {} outside root history of {}",
                    self.current_root_index,
                    self.roots.len()
                ))
            })?;
        parse_chain_field(raw)
            .map_err(|e| VoucherError::PoolSnapshot(format!("unreadable on-chain root: {}", e)))
    }
}

pub async fn read_pool_snapshot(chain: &dyn ChainClient, config_id: &str) -> Result<PoolSnapshot> {
    let content = chain
        .get_object(config_id)
        .await?
        .ok_or_else(|| VoucherError::PoolSnapshot(format!("pool object {} has no content", config_id)))?;
    PoolSnapshot::from_object(&content)
}

/// sync-then-compare, retried with backoff
#[derive(Clone, Debug)]
pub struct ConsistencyValidator {
    config_id: String,
    retry: RetryConfig,
}

impl ConsistencyValidator {
    pub fn new(config_id: impl Into<String>, retry: RetryConfig) -> Self {
        Self {
            config_id: config_id.into(),
            retry,
        }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// a root the local tree and the chain agree on
    ///
    /// count mismatches are retried since the event index lags the object
    /// state. a root mismatch at equal counts is returned at once.
    pub async fn validated_root<T: MerkleTreeEngine>(
        &self,
        sync: &mut EventSynchronizer<T>,
    ) -> Result<FieldElement> {
        retry_with_state(&self.retry, sync, |sync| {
            let config_id = self.config_id.clone();
            Box::pin(async move { validate_once(sync, &config_id).await })
        })
        .await
    }
}

/// one forced sync followed by count and root checks
pub async fn validate_once<T: MerkleTreeEngine>(
    sync: &mut EventSynchronizer<T>,
    config_id: &str,
) -> Result<FieldElement> {
    sync.sync(true).await?;

    let snapshot = read_pool_snapshot(sync.chain().as_ref(), config_id).await?;
    let local_count = sync.tree().leaf_count() as u64;

    if local_count != snapshot.next_index {
        return Err(VoucherError::CountMismatch {
            local: local_count,
            on_chain: snapshot.next_index,
        });
    }

    let on_chain = snapshot.current_root()?;
    let local = sync.tree().root();
    debug!(
        "comparing roots at {} leaves: local {}, on-chain {}",
        local_count,
        local.short_hex(),
        on_chain.short_hex()
    );

    if local != on_chain {
        error!(
            "root mismatch with {} leaves on both sides: local {} on-chain {}",
            local_count, local, on_chain
        );
        return Err(VoucherError::RootMismatch {
            local: local.to_hex(),
            on_chain: on_chain.to_hex(),
        });
    }

    info!("local tree consistent with chain at {} leaves", local_count);
    Ok(on_chain)
}
