//! withdrawal proof orchestration
//!
//! validated root -> leaf resolution -> local merkle proof -> proof service
//! request -> proof bytes. the request carries every field element as a
//! decimal string and every path element reduced into the bn254 scalar field.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pool_merkle::MerkleProof;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::codec::{hex_to_decimal, parse_proof, FieldElement};
use crate::error::{ProofFailureKind, Result, VoucherError};
use crate::merkle::MerkleTreeEngine;
use crate::sync::EventSynchronizer;
use crate::validator::ConsistencyValidator;
use crate::voucher::Voucher;
use crate::{MIN_PROOF_LENGTH, STANDARD_PROOF_LENGTHS};

/// proof service endpoint path
pub const PROOF_ENDPOINT: &str = "/circom/proof/generate";

/// body of a proof request, field order as the service expects it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRequest {
    pub refund: u64,
    pub nullifier: String,
    pub root: String,
    pub nullifier_hash: String,
    pub secret: String,
    pub path_indices: Vec<u8>,
    pub recipient: String,
    pub path_elements: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProofResponse {
    /// hex-encoded proof
    pub proof: String,
    #[serde(default)]
    pub public_inputs: Option<Value>,
}

#[async_trait]
pub trait ProofService: Send + Sync {
    async fn generate_proof(&self, request: &ProofRequest) -> Result<ProofResponse>;
}

/// proof service over http
#[derive(Clone, Debug)]
pub struct HttpProofService {
    url: String,
    client: Client,
}

impl HttpProofService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoucherError::Config(format!("http client: {}", e)))?;
        Ok(Self {
            url: format!("{}{}", base_url.trim_end_matches('/'), PROOF_ENDPOINT),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn transport_error(e: reqwest::Error) -> VoucherError {
    let kind = if e.is_timeout() {
        ProofFailureKind::Timeout
    } else if e.is_connect() || e.is_request() {
        ProofFailureKind::Network
    } else {
        ProofFailureKind::Unknown
    };
    VoucherError::proof_service(kind, e.to_string())
}

#[async_trait]
impl ProofService for HttpProofService {
    async fn generate_proof(&self, request: &ProofRequest) -> Result<ProofResponse> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(VoucherError::proof_service(
                ProofFailureKind::Server,
                format!("status {}", status),
            ));
        }
        if !status.is_success() {
            return Err(VoucherError::proof_service(
                ProofFailureKind::Unknown,
                format!("status {}", status),
            ));
        }

        response.json().await.map_err(|e| {
            if e.is_timeout() {
                transport_error(e)
            } else {
                VoucherError::proof_service(ProofFailureKind::Unknown, format!("bad response: {}", e))
            }
        })
    }
}

/// public inputs of the withdrawal circuit, decimal strings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicInputs {
    pub root: String,
    pub nullifier_hash: String,
    pub recipient: String,
    pub relayer: String,
    pub fee: u64,
    pub refund: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WithdrawalProof {
    pub proof: Vec<u8>,
    pub public_inputs: PublicInputs,
    /// public inputs echoed by the proof service, if any
    pub service_public_inputs: Option<Value>,
    pub merkle_proof: MerkleProof,
    pub proof_length: usize,
    pub is_standard_length: bool,
}

/// index of the voucher's commitment in the tree
///
/// trusts the recorded index only when the leaf there matches, otherwise
/// searches the tree. vouchers recorded before a reorg or from a stale
/// index end up here.
pub fn resolve_leaf_index<T: MerkleTreeEngine>(
    tree: &T,
    commitment: &FieldElement,
    claimed_index: u64,
) -> Result<usize> {
    if let Ok(index) = usize::try_from(claimed_index) {
        if tree.leaf(index).as_ref() == Some(commitment) {
            return Ok(index);
        }
    }

    match tree.leaf_index(commitment) {
        Some(actual) => {
            warn!(
                "commitment {} recorded at leaf {} but found at {}, relocating",
                commitment.short_hex(),
                claimed_index,
                actual
            );
            Ok(actual)
        }
        None => Err(VoucherError::CommitmentNotFound {
            commitment: commitment.to_hex(),
            claimed_index,
            leaf_count: tree.leaf_count(),
        }),
    }
}

/// proof bytes must be at least [`MIN_PROOF_LENGTH`], returns whether the
/// length is one of the standard encodings
pub fn check_proof_length(len: usize) -> Result<bool> {
    if len < MIN_PROOF_LENGTH {
        return Err(VoucherError::ProofTooShort { len });
    }
    let standard = STANDARD_PROOF_LENGTHS.contains(&len);
    if !standard {
        warn!(
            "unusual proof length {} bytes, expected one of {:?}",
            len, STANDARD_PROOF_LENGTHS
        );
    }
    Ok(standard)
}

/// build the service request and the matching public inputs
pub fn build_proof_request(
    voucher: &Voucher,
    root: &FieldElement,
    merkle_proof: &MerkleProof,
    recipient: &str,
    relayer: &str,
    fee: u64,
) -> Result<(ProofRequest, PublicInputs)> {
    let nullifier_hash = voucher.nullifier_hash_element()?.to_decimal();
    let recipient = hex_to_decimal(recipient)?;
    let relayer = hex_to_decimal(relayer)?;
    let refund = voucher.denomination;

    let request = ProofRequest {
        refund,
        nullifier: voucher.nullifier_element()?.to_decimal(),
        root: root.to_decimal(),
        nullifier_hash: nullifier_hash.clone(),
        secret: voucher.secret_element()?.to_decimal(),
        path_indices: merkle_proof.path_indices.clone(),
        recipient: recipient.clone(),
        path_elements: merkle_proof
            .path_elements
            .iter()
            .map(|e| FieldElement::from_bytes(*e).reduce().to_decimal())
            .collect(),
    };

    let public_inputs = PublicInputs {
        root: root.to_decimal(),
        nullifier_hash,
        recipient,
        relayer,
        fee,
        refund,
    };

    Ok((request, public_inputs))
}

/// keeps sync, validation and the proof service together
pub struct ProofOrchestrator {
    service: Arc<dyn ProofService>,
    validator: ConsistencyValidator,
}

impl ProofOrchestrator {
    pub fn new(service: Arc<dyn ProofService>, validator: ConsistencyValidator) -> Self {
        Self { service, validator }
    }

    pub fn validator(&self) -> &ConsistencyValidator {
        &self.validator
    }

    pub async fn generate_withdrawal_proof<T: MerkleTreeEngine>(
        &self,
        sync: &mut EventSynchronizer<T>,
        voucher: &Voucher,
        recipient: &str,
        relayer: &str,
        fee: u64,
    ) -> Result<WithdrawalProof> {
        let root = self.validator.validated_root(sync).await?;
        let tree = sync.tree();

        let commitment = voucher.commitment_element()?;
        let leaf_index = resolve_leaf_index(tree, &commitment, voucher.leaf_index)?;

        let merkle_proof = tree.generate_proof(leaf_index)?;
        if !tree.verify_proof(&merkle_proof) {
            error!(
                "local proof for leaf {} does not verify: computed {} tree root {}",
                leaf_index,
                tree.compute_root_from_proof(&merkle_proof),
                tree.root()
            );
            return Err(VoucherError::MerkleProofInvalid { leaf_index });
        }

        let (request, public_inputs) =
            build_proof_request(voucher, &root, &merkle_proof, recipient, relayer, fee)?;
        debug!(
            "requesting proof for leaf {} at root {}",
            leaf_index,
            root.short_hex()
        );

        let response = self.service.generate_proof(&request).await.map_err(|e| match e {
            e @ VoucherError::ProofService { .. } => e,
            other => VoucherError::proof_service(ProofFailureKind::Unknown, other.to_string()),
        })?;

        let proof = parse_proof(&response.proof)?;
        let proof_length = proof.len();
        let is_standard_length = check_proof_length(proof_length)?;
        info!("withdrawal proof ready: {} bytes for leaf {}", proof_length, leaf_index);

        Ok(WithdrawalProof {
            proof,
            public_inputs,
            service_public_inputs: response.public_inputs,
            merkle_proof,
            proof_length,
            is_standard_length,
        })
    }
}
