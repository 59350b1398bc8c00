//! deposit event synchronization
//!
//! the local tree is always rebuilt wholesale from the complete, ascending
//! list of deposit events. events are checked for a contiguous
//! `0, 1, 2, ...` leaf sequence before the tree is touched, so a failed
//! sync never leaves a half-built tree behind.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::chain::{ChainClient, ChainEvent, EventQuery};
use crate::codec::{json_u64, parse_commitment, FieldElement};
use crate::config::VoucherConfig;
use crate::error::{Result, VoucherError};
use crate::merkle::MerkleTreeEngine;

/// one `DepositEvent` as emitted by the pool
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepositEvent {
    pub commitment: FieldElement,
    pub leaf_index: u64,
    pub amount: u64,
    pub timestamp: u64,
}

impl DepositEvent {
    pub fn from_event(event: &ChainEvent) -> Result<Self> {
        let json = &event.parsed_json;
        let commitment = json
            .get("commitment")
            .ok_or_else(|| VoucherError::CommitmentParse("event has no commitment".into()))
            .and_then(parse_commitment)?;
        let leaf_index = json
            .get("leaf_index")
            .and_then(json_u64)
            .ok_or_else(|| VoucherError::MalformedEvent(format!("missing leaf_index: {}", json)))?;

        Ok(Self {
            commitment,
            leaf_index,
            amount: field_u64(json, "amount"),
            timestamp: event_timestamp(event),
        })
    }
}

/// one `WithdrawalEvent` as emitted by the pool
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawalEvent {
    pub nullifier_hash: String,
    pub recipient: String,
    pub amount: u64,
    pub timestamp: u64,
}

impl WithdrawalEvent {
    pub fn from_event(event: &ChainEvent) -> Self {
        let json = &event.parsed_json;
        Self {
            nullifier_hash: nullifier_hash_hex(json.get("nullifier_hash")),
            recipient: json
                .get("recipient")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            amount: field_u64(json, "amount"),
            timestamp: event_timestamp(event),
        }
    }
}

/// payload timestamp, falling back to the checkpoint time
fn event_timestamp(event: &ChainEvent) -> u64 {
    event
        .parsed_json
        .get("timestamp")
        .and_then(json_u64)
        .or(event.timestamp_ms)
        .unwrap_or_default()
}

fn field_u64(json: &Value, key: &str) -> u64 {
    json.get(key).and_then(json_u64).unwrap_or_default()
}

/// nullifier hashes arrive as hex strings or byte arrays
fn nullifier_hash_hex(raw: Option<&Value>) -> String {
    match raw {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => {
            let bytes: Vec<u8> = items
                .iter()
                .filter_map(|b| b.as_u64().map(|b| b as u8))
                .collect();
            format!("0x{}", hex::encode(bytes))
        }
        _ => String::new(),
    }
}

/// check that `events` is exactly leaf indices `0..n` in order
pub fn check_sequence(events: &[DepositEvent]) -> Result<()> {
    for (expected, event) in events.iter().enumerate() {
        if event.leaf_index != expected as u64 {
            return Err(VoucherError::SequenceAnomaly {
                expected: expected as u64,
                found: event.leaf_index,
            });
        }
    }
    Ok(())
}

/// keeps a local tree equal to the on-chain deposit history
pub struct EventSynchronizer<T: MerkleTreeEngine> {
    chain: Arc<dyn ChainClient>,
    tree: T,
    deposit_event_type: String,
    withdrawal_event_type: String,
    page_limit: usize,
    throttle: Duration,
    last_sync: Option<Instant>,
}

impl<T: MerkleTreeEngine> EventSynchronizer<T> {
    pub fn new(chain: Arc<dyn ChainClient>, tree: T, config: &VoucherConfig) -> Self {
        Self {
            chain,
            tree,
            deposit_event_type: config.deposit_event_type(),
            withdrawal_event_type: config.withdrawal_event_type(),
            page_limit: config.event_page_limit.max(1),
            throttle: Duration::from_millis(config.sync_throttle_ms),
            last_sync: None,
        }
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }

    pub fn chain(&self) -> &Arc<dyn ChainClient> {
        &self.chain
    }

    pub fn last_synced_at(&self) -> Option<Instant> {
        self.last_sync
    }

    fn is_fresh(&self) -> bool {
        self.last_sync
            .map(|at| at.elapsed() < self.throttle)
            .unwrap_or(false)
    }

    /// rebuild the tree from chain events
    ///
    /// skipped when the last successful sync is younger than the throttle
    /// window, unless `force` is set. a forced sync follows every page, an
    /// unforced one reads only the first.
    pub async fn sync(&mut self, force: bool) -> Result<()> {
        if !force && self.is_fresh() {
            debug!("skipping sync, last sync within {:?}", self.throttle);
            return Ok(());
        }

        let mut events = if force {
            self.query_all_deposit_events().await?
        } else {
            self.query_first_deposit_page().await?
        };
        events.sort_by_key(|e| e.leaf_index);
        check_sequence(&events)?;

        self.rebuild(&events)?;
        self.last_sync = Some(Instant::now());

        info!(
            "merkle tree synced: {} leaves, root {}",
            self.tree.leaf_count(),
            self.tree.root().short_hex()
        );
        Ok(())
    }

    fn rebuild(&mut self, events: &[DepositEvent]) -> Result<()> {
        self.tree.clear();
        for event in events {
            if let Err(e) = self.tree.insert(event.commitment) {
                self.tree.clear();
                self.last_sync = None;
                return Err(e);
            }
        }
        Ok(())
    }

    /// a single page of deposit events, newest first
    pub async fn query_deposit_events(&self, limit: usize) -> Result<Vec<DepositEvent>> {
        let query = EventQuery::new(&self.deposit_event_type, limit).descending();
        let page = self.chain.query_events(&query).await?;
        page.data.iter().map(DepositEvent::from_event).collect()
    }

    /// oldest deposit events, one page capped at the page limit
    async fn query_first_deposit_page(&self) -> Result<Vec<DepositEvent>> {
        let query = EventQuery::new(&self.deposit_event_type, self.page_limit);
        let page = self.chain.query_events(&query).await?;
        if page.has_next_page {
            debug!("deposit history exceeds {} events, tree holds the first page only", self.page_limit);
        }
        page.data.iter().map(DepositEvent::from_event).collect()
    }

    /// every deposit event, ascending, following cursors until exhausted
    pub async fn query_all_deposit_events(&self) -> Result<Vec<DepositEvent>> {
        let mut events = Vec::new();
        let mut cursor = None;
        let mut pages = 0usize;

        loop {
            let query = EventQuery::new(&self.deposit_event_type, self.page_limit).after(cursor);
            let page = self.chain.query_events(&query).await?;
            pages += 1;

            for event in &page.data {
                events.push(DepositEvent::from_event(event)?);
            }

            match page.next_cursor {
                Some(next) if page.has_next_page => cursor = Some(next),
                None if page.has_next_page => {
                    warn!("event page {} claims more data but has no cursor", pages);
                    break;
                }
                _ => break,
            }
        }

        debug!("fetched {} deposit events in {} pages", events.len(), pages);
        Ok(events)
    }

    /// a single page of withdrawal events, newest first
    pub async fn query_withdrawal_events(&self, limit: usize) -> Result<Vec<WithdrawalEvent>> {
        let query = EventQuery::new(&self.withdrawal_event_type, limit).descending();
        let page = self.chain.query_events(&query).await?;
        Ok(page.data.iter().map(WithdrawalEvent::from_event).collect())
    }
}
