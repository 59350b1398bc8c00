//! error types for the voucher core
//!
//! every failure is a tagged variant created where it happens. retry decisions
//! and downstream error codes are derived from the variant, never from the
//! rendered message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::ChainError;

/// why a fatal error must not be retried
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FatalKind {
    /// local and on-chain data disagree in a way retrying cannot fix
    Corruption,
    /// the commitment is not in the pool
    NotFound,
    /// the proof service returned unusable proof bytes
    InvalidProof,
    /// caller supplied malformed input
    InvalidInput,
    /// the chain answered with a shape the client does not understand
    Protocol,
    /// the chain rejected a transaction
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Retryable,
    Fatal(FatalKind),
}

/// failure categories of the proof service
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProofFailureKind {
    Timeout,
    Network,
    Server,
    Unknown,
}

/// uniform error codes handed to deposit/withdraw flows
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoucherErrorCode {
    GasInsufficient,
    GasObjectInvalid,
    GasExceedsMaximum,
    CoinBalanceInsufficient,
    TransactionValidationFailed,
    TransactionBuildFailed,
    NetworkError,
    RpcError,
    SignerNotAvailable,
    WalletNotConnected,
    VoucherAlreadyRedeemed,
    VoucherNotFound,
    InvalidVoucherCode,
    MerkleProofFailed,
    MerkleTreeSyncFailed,
    ZkProofGenerationFailed,
    ZkProofVerificationFailed,
    UnknownError,
}

impl VoucherErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GasInsufficient => "GAS_INSUFFICIENT",
            Self::GasObjectInvalid => "GAS_OBJECT_INVALID",
            Self::GasExceedsMaximum => "GAS_EXCEEDS_MAXIMUM",
            Self::CoinBalanceInsufficient => "COIN_BALANCE_INSUFFICIENT",
            Self::TransactionValidationFailed => "TRANSACTION_VALIDATION_FAILED",
            Self::TransactionBuildFailed => "TRANSACTION_BUILD_FAILED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::RpcError => "RPC_ERROR",
            Self::SignerNotAvailable => "SIGNER_NOT_AVAILABLE",
            Self::WalletNotConnected => "WALLET_NOT_CONNECTED",
            Self::VoucherAlreadyRedeemed => "VOUCHER_ALREADY_REDEEMED",
            Self::VoucherNotFound => "VOUCHER_NOT_FOUND",
            Self::InvalidVoucherCode => "INVALID_VOUCHER_CODE",
            Self::MerkleProofFailed => "MERKLE_PROOF_FAILED",
            Self::MerkleTreeSyncFailed => "MERKLE_TREE_SYNC_FAILED",
            Self::ZkProofGenerationFailed => "ZK_PROOF_GENERATION_FAILED",
            Self::ZkProofVerificationFailed => "ZK_PROOF_VERIFICATION_FAILED",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl std::fmt::Display for VoucherErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum VoucherError {
    #[error("merkle tree out of sync: local commitment count {local} does not match on-chain count {on_chain}")]
    CountMismatch { local: u64, on_chain: u64 },

    #[error("merkle root mismatch: local {local}, on-chain {on_chain}")]
    RootMismatch { local: String, on_chain: String },

    #[error("commitment sequence anomaly: expected leaf index {expected}, found {found} (incomplete event pagination?)")]
    SequenceAnomaly { expected: u64, found: u64 },

    #[error("commitment parse error: {0}")]
    CommitmentParse(String),

    #[error("hash algorithm inconsistent with chain: {0}")]
    HashInconsistency(String),

    #[error("malformed deposit event: {0}")]
    MalformedEvent(String),

    #[error("voucher not found: commitment {commitment} is not in the tree (claimed index {claimed_index}, {leaf_count} leaves); never created, already spent, or not yet confirmed")]
    CommitmentNotFound {
        commitment: String,
        claimed_index: u64,
        leaf_count: usize,
    },

    #[error("merkle proof for leaf {leaf_index} failed local verification")]
    MerkleProofInvalid { leaf_index: usize },

    #[error("merkle tree error: {0}")]
    Tree(#[from] pool_merkle::TreeError),

    #[error("proof too short: {len} bytes")]
    ProofTooShort { len: usize },

    #[error("invalid proof encoding: {0}")]
    InvalidProofEncoding(String),

    #[error("{}", proof_failure_message(*kind, message))]
    ProofService { kind: ProofFailureKind, message: String },

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("cannot read on-chain pool state: {0}")]
    PoolSnapshot(String),

    #[error("unexpected return value: {0}")]
    UnexpectedReturn(String),

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid decimal: {0}")]
    InvalidDecimal(String),

    #[error("invalid voucher code: {0}")]
    InvalidVoucherCode(String),

    #[error("voucher is missing {0}")]
    MissingVoucherField(&'static str),

    #[error("invalid pool config: {0}")]
    InvalidPoolConfig(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("signer unavailable: {0}")]
    Signer(String),

    #[error("transaction failed ({code}): {message}")]
    Execution { code: VoucherErrorCode, message: String },

    #[error("empty transaction result")]
    EmptyExecutionResult,

    #[error("serialization error: {0}")]
    Serialization(String),
}

fn proof_failure_message(kind: ProofFailureKind, message: &str) -> String {
    match kind {
        ProofFailureKind::Timeout => {
            "proof generation timed out: the proof service took too long to respond".into()
        }
        ProofFailureKind::Network => {
            "network error: cannot reach the proof service, check the connection".into()
        }
        ProofFailureKind::Server => {
            "server error: the proof service is temporarily unavailable".into()
        }
        ProofFailureKind::Unknown => format!("proof generation failed: {}", message),
    }
}

impl VoucherError {
    pub fn proof_service(kind: ProofFailureKind, message: impl Into<String>) -> Self {
        Self::ProofService {
            kind,
            message: message.into(),
        }
    }

    /// retryable / fatal partition used by the backoff controller
    pub fn class(&self) -> ErrorClass {
        use FatalKind::*;
        match self {
            Self::CountMismatch { .. }
            | Self::PoolSnapshot(_)
            | Self::Chain(_)
            | Self::ProofService { .. } => ErrorClass::Retryable,

            Self::RootMismatch { .. }
            | Self::SequenceAnomaly { .. }
            | Self::CommitmentParse(_)
            | Self::HashInconsistency(_)
            | Self::MerkleProofInvalid { .. } => ErrorClass::Fatal(Corruption),

            Self::Tree(pool_merkle::TreeError::LeafIndexOutOfBounds { .. }) => {
                ErrorClass::Fatal(NotFound)
            }
            Self::Tree(pool_merkle::TreeError::InvalidHeight(_)) => ErrorClass::Fatal(InvalidInput),
            Self::Tree(_) => ErrorClass::Fatal(Corruption),

            Self::CommitmentNotFound { .. } => ErrorClass::Fatal(NotFound),

            Self::ProofTooShort { .. } | Self::InvalidProofEncoding(_) => {
                ErrorClass::Fatal(InvalidProof)
            }

            Self::MalformedEvent(_)
            | Self::UnexpectedReturn(_)
            | Self::EmptyExecutionResult
            | Self::Serialization(_) => ErrorClass::Fatal(Protocol),

            Self::InvalidHex(_)
            | Self::InvalidDecimal(_)
            | Self::InvalidVoucherCode(_)
            | Self::MissingVoucherField(_)
            | Self::InvalidPoolConfig(_)
            | Self::Config(_)
            | Self::Signer(_) => ErrorClass::Fatal(InvalidInput),

            Self::Execution { .. } => ErrorClass::Fatal(Rejected),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    /// downstream error code for this failure
    pub fn code(&self) -> VoucherErrorCode {
        use VoucherErrorCode as C;
        match self {
            Self::CountMismatch { .. } | Self::SequenceAnomaly { .. } | Self::PoolSnapshot(_) => {
                C::MerkleTreeSyncFailed
            }
            Self::RootMismatch { .. }
            | Self::CommitmentParse(_)
            | Self::HashInconsistency(_)
            | Self::MalformedEvent(_)
            | Self::MerkleProofInvalid { .. }
            | Self::Tree(_) => C::MerkleProofFailed,
            Self::CommitmentNotFound { .. } => C::VoucherNotFound,
            Self::ProofTooShort { .. } | Self::InvalidProofEncoding(_) => C::ZkProofVerificationFailed,
            Self::ProofService { kind, .. } => match kind {
                ProofFailureKind::Timeout | ProofFailureKind::Network => C::NetworkError,
                ProofFailureKind::Server | ProofFailureKind::Unknown => C::ZkProofGenerationFailed,
            },
            Self::Chain(e) => e.code(),
            Self::InvalidHex(_)
            | Self::InvalidDecimal(_)
            | Self::InvalidVoucherCode(_)
            | Self::MissingVoucherField(_) => C::InvalidVoucherCode,
            Self::Signer(_) => C::SignerNotAvailable,
            Self::Execution { code, .. } => *code,
            Self::EmptyExecutionResult => C::TransactionValidationFailed,
            Self::UnexpectedReturn(_)
            | Self::InvalidPoolConfig(_)
            | Self::Config(_)
            | Self::Serialization(_) => C::UnknownError,
        }
    }
}

impl From<serde_json::Error> for VoucherError {
    fn from(e: serde_json::Error) -> Self {
        VoucherError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VoucherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_mismatch_is_retryable() {
        let err = VoucherError::CountMismatch { local: 3, on_chain: 4 };
        assert!(err.is_retryable());
        assert_eq!(err.code(), VoucherErrorCode::MerkleTreeSyncFailed);
    }

    #[test]
    fn test_root_mismatch_is_corruption() {
        let err = VoucherError::RootMismatch {
            local: "0x01".into(),
            on_chain: "0x02".into(),
        };
        assert_eq!(err.class(), ErrorClass::Fatal(FatalKind::Corruption));
    }

    #[test]
    fn test_not_found_is_distinct_from_corruption() {
        let err = VoucherError::CommitmentNotFound {
            commitment: "0xab".into(),
            claimed_index: 7,
            leaf_count: 3,
        };
        assert_eq!(err.class(), ErrorClass::Fatal(FatalKind::NotFound));
        assert_eq!(err.code(), VoucherErrorCode::VoucherNotFound);
    }

    #[test]
    fn test_network_failures_are_retryable() {
        assert!(VoucherError::Chain(ChainError::Timeout("events".into())).is_retryable());
        assert!(VoucherError::proof_service(ProofFailureKind::Network, "refused").is_retryable());
    }

    #[test]
    fn test_proof_service_messages_are_categorised() {
        let timeout = VoucherError::proof_service(ProofFailureKind::Timeout, "raw");
        let server = VoucherError::proof_service(ProofFailureKind::Server, "raw");
        let unknown = VoucherError::proof_service(ProofFailureKind::Unknown, "boom");
        assert!(timeout.to_string().contains("timed out"));
        assert!(server.to_string().contains("server error"));
        assert_eq!(unknown.to_string(), "proof generation failed: boom");
        assert_eq!(timeout.code(), VoucherErrorCode::NetworkError);
        assert_eq!(server.code(), VoucherErrorCode::ZkProofGenerationFailed);
    }

    #[test]
    fn test_error_code_serializes_screaming() {
        let json = serde_json::to_string(&VoucherErrorCode::GasObjectInvalid).unwrap();
        assert_eq!(json, "\"GAS_OBJECT_INVALID\"");
        assert_eq!(VoucherErrorCode::GasObjectInvalid.to_string(), "GAS_OBJECT_INVALID");
    }
}
