//! voucher-core - client core for merkle-tree privacy pools
//!
//! keeps a local replica of the pool's commitment tree in sync with chain
//! events, checks it against the on-chain root before use, and drives the
//! remote proof service to produce withdrawal proofs.
//!
//! chain access, proof generation and note hashing are injected through
//! [`ChainClient`], [`ProofService`] and [`NoteHasher`].

pub mod bcs;
pub mod cache;
pub mod chain;
pub mod client;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod merkle;
pub mod proof;
pub mod retry;
pub mod spent;
pub mod sync;
pub mod validator;
pub mod voucher;

pub use cache::{calculate_pool_fee, PoolConfig, PoolConfigCache, TtlCache};
pub use chain::{ChainClient, ChainError, ChainEvent, EventCursor, EventPage, EventQuery, MoveCall, ReturnValue, SimulationResult};
pub use client::{PreparedRedemption, VoucherClient, VoucherStats};
pub use codec::{hex_to_decimal, parse_commitment, parse_proof, FieldElement};
pub use config::{RetrySettings, VoucherConfig};
pub use context::{PoolContext, SigningContext, SponsoredExecutionParams, TransactionSigner, ZkLoginAssembler, ZkLoginContext};
pub use error::{ErrorClass, FatalKind, ProofFailureKind, Result, VoucherError, VoucherErrorCode};
pub use merkle::{MerkleTreeEngine, PoolTree};
pub use proof::{HttpProofService, ProofOrchestrator, ProofRequest, ProofResponse, ProofService, PublicInputs, WithdrawalProof};
pub use retry::{retry_with_backoff, retry_with_state, RetryConfig};
pub use spent::SpentStatusChecker;
pub use sync::{DepositEvent, EventSynchronizer, WithdrawalEvent};
pub use validator::{ConsistencyValidator, PoolSnapshot};
pub use voucher::{Network, NoteHasher, RedeemParams, Voucher, VoucherCode};

pub use pool_merkle::MerkleProof;

/// commitment tree height of the pool
pub const TREE_HEIGHT: usize = pool_merkle::DEFAULT_HEIGHT;

/// move module of the pool contract
pub const POOL_MODULE: &str = "privacy_pool";

/// non-forced syncs within this window are skipped
pub const SYNC_THROTTLE_MS: u64 = 5_000;

/// pool config cache lifetime
pub const POOL_CONFIG_TTL_MS: u64 = 30_000;

/// events per page when paginating
pub const DEFAULT_EVENT_PAGE_LIMIT: usize = 1_000;

/// groth16 bn254 compressed and uncompressed
pub const STANDARD_PROOF_LENGTHS: [usize; 2] = [128, 256];

/// anything shorter is rejected
pub const MIN_PROOF_LENGTH: usize = 100;

/// 5 OCT baseline for sponsored transactions
pub const MIN_SPONSORED_GAS: u64 = 5_000_000_000;

pub const DEFAULT_RESERVE_DURATION_SECS: u64 = 60;

pub const DEFAULT_PROOF_SERVICE_URL: &str = "https://wallet-api.deltax.online";

pub const DEFAULT_PROOF_TIMEOUT_SECS: u64 = 60;
