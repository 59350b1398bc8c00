//! in-memory chain and proof service shared by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use voucher_core::chain::{
    ChainClient, ChainError, ChainEvent, CommandResult, EventCursor, EventPage, EventQuery, MoveCall,
    ReturnValue, SignedTransaction, SimulationResult, SortOrder,
};
use voucher_core::{
    FieldElement, MerkleTreeEngine, NoteHasher, PoolTree, ProofRequest, ProofResponse, ProofService,
    Result, VoucherCode, VoucherConfig,
};

pub const PACKAGE: &str = "0xpkg";
pub const POOL: &str = "0xpool";
pub const HEIGHT: usize = 8;
pub const DENOMINATION: u64 = 1_000_000_000;

/// log output for failing tests, filtered by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config() -> VoucherConfig {
    let mut config = VoucherConfig::oct_testnet().with_pool(PACKAGE, POOL);
    config.merkle_tree_height = HEIGHT;
    config.event_page_limit = 2;
    config
}

fn truncated(digest: [u8; 32]) -> FieldElement {
    let mut bytes = digest;
    bytes[0] &= 0x1f;
    FieldElement::from_bytes(bytes)
}

/// sha256 stand-in for the circuit's note hash
pub struct Sha256NoteHasher;

impl NoteHasher for Sha256NoteHasher {
    fn commitment(&self, nullifier: &FieldElement, secret: &FieldElement) -> Result<FieldElement> {
        let mut h = Sha256::new();
        h.update(nullifier.as_bytes());
        h.update(secret.as_bytes());
        Ok(truncated(h.finalize().into()))
    }

    fn nullifier_hash(&self, nullifier: &FieldElement) -> Result<FieldElement> {
        Ok(truncated(Sha256::digest(nullifier.as_bytes()).into()))
    }
}

pub fn voucher_code(seed: u64, leaf_index: u64) -> String {
    VoucherCode {
        amount: DENOMINATION,
        leaf_index,
        nullifier: FieldElement::from_u64(1_000 + seed),
        secret: FieldElement::from_u64(2_000 + seed),
    }
    .encode()
    .unwrap()
}

pub fn commitment_for(seed: u64) -> FieldElement {
    Sha256NoteHasher
        .commitment(&FieldElement::from_u64(1_000 + seed), &FieldElement::from_u64(2_000 + seed))
        .unwrap()
}

pub fn root_of(commitments: &[FieldElement]) -> FieldElement {
    let mut tree = PoolTree::new(HEIGHT).unwrap();
    for c in commitments {
        MerkleTreeEngine::insert(&mut tree, *c).unwrap();
    }
    MerkleTreeEngine::root(&tree)
}

#[derive(Default)]
struct State {
    deposits: Vec<Value>,
    withdrawals: Vec<Value>,
    /// overrides the reported leaf count
    next_index: Option<u64>,
    /// overrides the reported root
    root: Option<FieldElement>,
    spent: Option<ReturnValue>,
}

/// chain whose pool object always reflects the deposits it holds
#[derive(Default)]
pub struct FakeChain {
    state: Mutex<State>,
    pub query_calls: AtomicUsize,
    pub object_calls: AtomicUsize,
    pub simulate_calls: AtomicUsize,
}

impl FakeChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// chain holding deposits for the given seeds at consecutive indices
    pub fn with_deposits(seeds: &[u64]) -> Arc<Self> {
        let chain = Self::new();
        for (i, seed) in seeds.iter().enumerate() {
            chain.push_deposit(commitment_for(*seed), i as u64);
        }
        chain
    }

    pub fn push_deposit(&self, commitment: FieldElement, leaf_index: u64) {
        self.state.lock().unwrap().deposits.push(json!({
            "commitment": commitment.to_hex(),
            "leaf_index": leaf_index.to_string(),
            "amount": DENOMINATION.to_string(),
            "timestamp": (1_700_000_000_000u64 + leaf_index).to_string(),
        }));
    }

    pub fn push_withdrawal(&self, nullifier_hash: FieldElement) {
        self.state.lock().unwrap().withdrawals.push(json!({
            "nullifier_hash": nullifier_hash.to_hex(),
            "recipient": "0xabc",
            "amount": DENOMINATION.to_string(),
        }));
    }

    pub fn report_next_index(&self, next_index: u64) {
        self.state.lock().unwrap().next_index = Some(next_index);
    }

    pub fn clear_next_index(&self) {
        self.state.lock().unwrap().next_index = None;
    }

    pub fn report_root(&self, root: FieldElement) {
        self.state.lock().unwrap().root = Some(root);
    }

    pub fn set_spent_return(&self, data: Value, type_tag: &str) {
        self.state.lock().unwrap().spent = Some(ReturnValue {
            data,
            type_tag: type_tag.into(),
        });
    }

    fn pool_object(&self) -> Value {
        let state = self.state.lock().unwrap();
        let commitments: Vec<FieldElement> = state
            .deposits
            .iter()
            .map(|d| FieldElement::from_hex(d["commitment"].as_str().unwrap()).unwrap())
            .collect();
        let next_index = state.next_index.unwrap_or(commitments.len() as u64);
        let root = state.root.unwrap_or_else(|| root_of(&commitments));

        let mut roots = vec![json!("0"); 30];
        roots[3] = json!(root.to_decimal());

        json!({
            "dataType": "moveObject",
            "fields": {
                "note_denomination": DENOMINATION.to_string(),
                "deposit_fixed_fee": "1000",
                "deposit_fee_bps": "10",
                "withdraw_fixed_fee": "2000",
                "withdraw_fee_bps": "5",
                "marklet_tree_with_history": {
                    "type": "MerkleTreeWithHistory",
                    "fields": {
                        "next_index": next_index.to_string(),
                        "current_root_index": 3,
                        "roots": roots,
                    }
                }
            }
        })
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn query_events(&self, query: &EventQuery) -> std::result::Result<EventPage, ChainError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let mut source = {
            let state = self.state.lock().unwrap();
            if query.event_type.ends_with("::DepositEvent") {
                state.deposits.clone()
            } else if query.event_type.ends_with("::WithdrawalEvent") {
                state.withdrawals.clone()
            } else {
                return Err(ChainError::QueryFailed(format!("unknown event {}", query.event_type)));
            }
        };
        if query.order == SortOrder::Descending {
            source.reverse();
        }

        let start = match &query.cursor {
            Some(c) => c.event_seq.parse::<usize>().unwrap(),
            None => 0,
        };
        let end = (start + query.limit).min(source.len());
        let data = source[start.min(end)..end]
            .iter()
            .map(|json| ChainEvent {
                event_type: query.event_type.clone(),
                parsed_json: json.clone(),
                timestamp_ms: None,
            })
            .collect();
        let has_next_page = end < source.len();

        Ok(EventPage {
            data,
            next_cursor: has_next_page.then(|| EventCursor {
                tx_digest: "digest".into(),
                event_seq: end.to_string(),
            }),
            has_next_page,
        })
    }

    async fn get_object(&self, object_id: &str) -> std::result::Result<Option<Value>, ChainError> {
        self.object_calls.fetch_add(1, Ordering::SeqCst);
        if object_id != POOL {
            return Err(ChainError::ObjectNotFound(object_id.into()));
        }
        Ok(Some(self.pool_object()))
    }

    async fn simulate_call(&self, _sender: &str, _call: &MoveCall) -> std::result::Result<SimulationResult, ChainError> {
        self.simulate_calls.fetch_add(1, Ordering::SeqCst);
        let spent = self.state.lock().unwrap().spent.clone();
        Ok(SimulationResult {
            results: vec![CommandResult {
                return_values: spent.into_iter().collect(),
            }],
            error: None,
        })
    }

    async fn execute_transaction(&self, _tx: &SignedTransaction) -> std::result::Result<Value, ChainError> {
        Ok(json!({"digest": "0xexec", "effects": {"status": {"status": "success"}}}))
    }

    async fn wait_for_transaction(&self, digest: &str) -> std::result::Result<Value, ChainError> {
        Ok(json!({"digest": digest, "events": []}))
    }
}

/// proof service answering with a fixed-length proof and recording requests
pub struct FakeProver {
    pub proof_len: usize,
    pub requests: Mutex<Vec<ProofRequest>>,
}

impl FakeProver {
    pub fn new(proof_len: usize) -> Arc<Self> {
        Arc::new(Self {
            proof_len,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn last_request(&self) -> Option<ProofRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ProofService for FakeProver {
    async fn generate_proof(&self, request: &ProofRequest) -> Result<ProofResponse> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(ProofResponse {
            proof: format!("0x{}", "ab".repeat(self.proof_len)),
            public_inputs: Some(json!([request.root, request.nullifier_hash])),
        })
    }
}
