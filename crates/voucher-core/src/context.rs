//! context handed to deposit and withdraw flows
//!
//! the flows themselves (transaction building, sponsored execution) live
//! outside this crate. they reach the pool through [`PoolContext`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::PoolConfig;
use crate::chain::SignedTransaction;
use crate::error::{Result, VoucherError, VoucherErrorCode};
use crate::proof::WithdrawalProof;
use crate::voucher::{Network, Voucher};

/// key that signs transaction bytes
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn address(&self) -> Result<String>;

    /// base64 signature over the transaction bytes
    async fn sign_transaction(&self, tx_bytes: &[u8]) -> Result<String>;
}

/// zklogin proof material for the current session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkLoginContext {
    pub partial_signature: Value,
    pub address_seed: String,
    pub max_epoch: u64,
    pub user_address: String,
}

/// combines the ephemeral signature with the zklogin proof
pub trait ZkLoginAssembler: Send + Sync {
    fn assemble(&self, zk_login: &ZkLoginContext, user_signature: &str) -> Result<String>;
}

#[derive(Clone)]
pub enum SigningContext {
    Standard {
        signer: Arc<dyn TransactionSigner>,
    },
    ZkLogin {
        /// ephemeral key
        signer: Arc<dyn TransactionSigner>,
        zk_login: ZkLoginContext,
    },
}

impl fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard { .. } => f.write_str("SigningContext::Standard"),
            Self::ZkLogin { zk_login, .. } => f
                .debug_struct("SigningContext::ZkLogin")
                .field("user_address", &zk_login.user_address)
                .field("max_epoch", &zk_login.max_epoch)
                .finish(),
        }
    }
}

impl SigningContext {
    pub fn signer(&self) -> &Arc<dyn TransactionSigner> {
        match self {
            Self::Standard { signer } | Self::ZkLogin { signer, .. } => signer,
        }
    }

    /// transaction sender, the zklogin address for zklogin sessions
    pub async fn sender_address(&self) -> Result<String> {
        match self {
            Self::ZkLogin { zk_login, .. } if !zk_login.user_address.is_empty() => {
                Ok(zk_login.user_address.clone())
            }
            _ => self.signer().address().await,
        }
    }

    /// sign with the context's key, assembling a zklogin signature if needed
    pub async fn sign(
        &self,
        tx_bytes: &[u8],
        assembler: Option<&dyn ZkLoginAssembler>,
    ) -> Result<SignedTransaction> {
        let user_signature = self.signer().sign_transaction(tx_bytes).await?;
        let signature = match self {
            Self::Standard { .. } => user_signature,
            Self::ZkLogin { zk_login, .. } => assembler
                .ok_or_else(|| VoucherError::Signer("no zklogin assembler configured".into()))?
                .assemble(zk_login, &user_signature)?,
        };
        Ok(SignedTransaction {
            tx_bytes: tx_bytes.to_vec(),
            signatures: vec![signature],
        })
    }
}

/// signed bytes ready for a gas station
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedBytes {
    pub bytes: String,
    pub signature: String,
}

impl From<&SignedTransaction> for SignedBytes {
    fn from(tx: &SignedTransaction) -> Self {
        Self {
            bytes: STANDARD.encode(&tx.tx_bytes),
            signature: tx.signatures.first().cloned().unwrap_or_default(),
        }
    }
}

/// gas parameters for sponsored execution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsoredExecutionParams {
    pub gas_budget: u64,
    pub reserve_duration_secs: u64,
    pub gas_pool_enabled: bool,
}

impl SponsoredExecutionParams {
    /// sponsor only when the pool is enabled and a budget is set
    pub fn should_sponsor(&self) -> bool {
        self.gas_pool_enabled && self.gas_budget > 0
    }
}

/// what the deposit/withdraw flows need from the client
#[async_trait]
pub trait PoolContext: Send {
    fn network(&self) -> Network;

    fn package_id(&self) -> &str;

    fn config_id(&self) -> &str;

    fn coin_type(&self) -> &str;

    fn sponsored_execution(&self) -> SponsoredExecutionParams;

    async fn sender_address(&self, signing: &SigningContext) -> Result<String>;

    async fn sign_transaction_bytes(&self, tx_bytes: &[u8], signing: &SigningContext) -> Result<SignedTransaction>;

    /// sign and submit, paying gas from the sender
    async fn execute_with_user_gas(&self, tx_bytes: &[u8], signing: &SigningContext) -> Result<Value>;

    fn normalize_execution_result(&self, result: Value) -> Result<Value>;

    async fn resolve_events_with_fallback(&self, execution: &Value) -> Vec<Value>;

    fn resolve_error_code(&self, err: &VoucherError, fallback: VoucherErrorCode) -> VoucherErrorCode;

    async fn load_pool_config(&mut self) -> Result<PoolConfig>;

    async fn generate_withdrawal_proof(
        &mut self,
        voucher: &Voucher,
        recipient: &str,
        relayer: &str,
        fee: u64,
    ) -> Result<WithdrawalProof>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedSigner;

    #[async_trait]
    impl TransactionSigner for FixedSigner {
        async fn address(&self) -> Result<String> {
            Ok("0xephemeral".into())
        }

        async fn sign_transaction(&self, tx_bytes: &[u8]) -> Result<String> {
            Ok(format!("sig:{}", tx_bytes.len()))
        }
    }

    struct Concat;

    impl ZkLoginAssembler for Concat {
        fn assemble(&self, zk: &ZkLoginContext, user_signature: &str) -> Result<String> {
            Ok(format!("zk[{}|{}|{}]", zk.address_seed, zk.max_epoch, user_signature))
        }
    }

    fn zk_context() -> SigningContext {
        SigningContext::ZkLogin {
            signer: Arc::new(FixedSigner),
            zk_login: ZkLoginContext {
                partial_signature: json!({}),
                address_seed: "seed".into(),
                max_epoch: 12,
                user_address: "0xuser".into(),
            },
        }
    }

    #[tokio::test]
    async fn test_standard_signing() {
        let ctx = SigningContext::Standard { signer: Arc::new(FixedSigner) };
        let signed = ctx.sign(&[1, 2, 3], None).await.unwrap();
        assert_eq!(signed.signatures, vec!["sig:3".to_string()]);
        assert_eq!(ctx.sender_address().await.unwrap(), "0xephemeral");
    }

    #[tokio::test]
    async fn test_zklogin_signing_uses_assembler() {
        let ctx = zk_context();
        let signed = ctx.sign(&[9], Some(&Concat)).await.unwrap();
        assert_eq!(signed.signatures, vec!["zk[seed|12|sig:1]".to_string()]);
        assert_eq!(ctx.sender_address().await.unwrap(), "0xuser");
        assert_eq!(SignedBytes::from(&signed).bytes, "CQ==");
    }

    #[tokio::test]
    async fn test_zklogin_without_assembler_fails() {
        let err = zk_context().sign(&[9], None).await.unwrap_err();
        assert!(matches!(err, VoucherError::Signer(_)));
        assert_eq!(err.code(), VoucherErrorCode::SignerNotAvailable);
    }

    #[test]
    fn test_sponsor_decision() {
        let params = SponsoredExecutionParams {
            gas_budget: 5_000_000_000,
            reserve_duration_secs: 60,
            gas_pool_enabled: false,
        };
        assert!(!params.should_sponsor());
        assert!(SponsoredExecutionParams { gas_pool_enabled: true, ..params }.should_sponsor());
    }
}
