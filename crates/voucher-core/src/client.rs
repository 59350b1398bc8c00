//! voucher client
//!
//! owns the local tree and wires synchronizer, validator, proof orchestrator,
//! spent checker and pool config cache together.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::cache::{PoolConfig, PoolConfigCache};
use crate::chain::{ChainClient, SignedTransaction};
use crate::codec::FieldElement;
use crate::config::VoucherConfig;
use crate::context::{PoolContext, SigningContext, SponsoredExecutionParams, ZkLoginAssembler};
use crate::error::{Result, VoucherError, VoucherErrorCode};
use crate::execution;
use crate::merkle::{MerkleTreeEngine, PoolTree};
use crate::proof::{HttpProofService, ProofOrchestrator, ProofService, WithdrawalProof};
use crate::spent::SpentStatusChecker;
use crate::sync::{DepositEvent, EventSynchronizer, WithdrawalEvent};
use crate::validator::ConsistencyValidator;
use crate::voucher::{Network, NoteHasher, RedeemParams, Voucher, VoucherCode};
use crate::DEFAULT_EVENT_PAGE_LIMIT;

/// pool activity summary, values in base units
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherStats {
    pub total_created: usize,
    pub total_redeemed: usize,
    pub total_value: u64,
    pub issued: usize,
    pub issued_value: u64,
}

/// everything a withdraw transaction needs
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedRedemption {
    pub voucher: Voucher,
    pub proof: WithdrawalProof,
    pub pool_config: PoolConfig,
    pub withdraw_fee: u64,
}

/// base units to a display amount, `1500000000` with 9 decimals is `1.5`
pub fn format_amount(units: u64, decimals: u8) -> String {
    let decimals = decimals.min(38);
    let scale = 10u128.pow(decimals as u32);
    let whole = units as u128 / scale;
    let frac = units as u128 % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let digits = format!("{:0width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

pub struct VoucherClient<T: MerkleTreeEngine = PoolTree> {
    config: VoucherConfig,
    chain: Arc<dyn ChainClient>,
    note_hasher: Arc<dyn NoteHasher>,
    zk_login: Option<Arc<dyn ZkLoginAssembler>>,
    sync: EventSynchronizer<T>,
    prover: ProofOrchestrator,
    spent: SpentStatusChecker,
    pool_config: PoolConfigCache,
}

impl VoucherClient<PoolTree> {
    /// client over the default tree sized from config
    pub fn new(
        config: VoucherConfig,
        chain: Arc<dyn ChainClient>,
        proof_service: Arc<dyn ProofService>,
        note_hasher: Arc<dyn NoteHasher>,
    ) -> Result<Self> {
        let tree = PoolTree::with_root_history(config.merkle_tree_height, config.root_history_size)?;
        Self::with_tree(config, chain, tree, proof_service, note_hasher)
    }

    /// client using the http proof service named in config
    pub fn with_http_prover(
        config: VoucherConfig,
        chain: Arc<dyn ChainClient>,
        note_hasher: Arc<dyn NoteHasher>,
    ) -> Result<Self> {
        let service = HttpProofService::new(&config.proof_service_url, config.proof_timeout())?;
        Self::new(config, chain, Arc::new(service), note_hasher)
    }
}

impl<T: MerkleTreeEngine> VoucherClient<T> {
    pub fn with_tree(
        config: VoucherConfig,
        chain: Arc<dyn ChainClient>,
        tree: T,
        proof_service: Arc<dyn ProofService>,
        note_hasher: Arc<dyn NoteHasher>,
    ) -> Result<Self> {
        config.validate()?;

        let validator = ConsistencyValidator::new(config.config_id.clone(), config.retry_config());
        let spent = SpentStatusChecker::new(
            chain.clone(),
            note_hasher.clone(),
            config.package_id.clone(),
            config.config_id.clone(),
            config.coin_type.clone(),
        );
        let pool_config = PoolConfigCache::new(chain.clone(), config.config_id.clone(), config.pool_config_ttl());
        let sync = EventSynchronizer::new(chain.clone(), tree, &config);

        info!(
            "voucher client for {} pool {} (tree height {})",
            config.network, config.config_id, config.merkle_tree_height
        );

        Ok(Self {
            prover: ProofOrchestrator::new(proof_service, validator),
            config,
            chain,
            note_hasher,
            zk_login: None,
            sync,
            spent,
            pool_config,
        })
    }

    pub fn with_zk_login_assembler(mut self, assembler: Arc<dyn ZkLoginAssembler>) -> Self {
        self.zk_login = Some(assembler);
        self
    }

    pub fn config(&self) -> &VoucherConfig {
        &self.config
    }

    pub fn tree(&self) -> &T {
        self.sync.tree()
    }

    pub fn current_root(&self) -> FieldElement {
        self.sync.tree().root()
    }

    pub async fn sync_merkle_tree(&mut self, force: bool) -> Result<()> {
        self.sync.sync(force).await
    }

    /// root the local tree and chain agree on, after retries
    pub async fn validated_root(&mut self) -> Result<FieldElement> {
        self.prover.validator().validated_root(&mut self.sync).await
    }

    pub async fn generate_withdrawal_proof(
        &mut self,
        voucher: &Voucher,
        recipient: &str,
        relayer: &str,
        fee: u64,
    ) -> Result<WithdrawalProof> {
        self.prover
            .generate_withdrawal_proof(&mut self.sync, voucher, recipient, relayer, fee)
            .await
    }

    pub async fn check_vouchers_spent_status(&self, vouchers: &[Voucher], sender: &str) -> Result<Vec<bool>> {
        self.spent.check(vouchers, sender).await
    }

    pub async fn load_pool_config(&mut self) -> Result<PoolConfig> {
        self.pool_config.load().await
    }

    pub async fn query_create_events(&self, limit: usize) -> Result<Vec<DepositEvent>> {
        self.sync.query_deposit_events(limit).await
    }

    pub async fn query_all_create_events(&self) -> Result<Vec<DepositEvent>> {
        self.sync.query_all_deposit_events().await
    }

    pub async fn query_redeem_events(&self, limit: usize) -> Result<Vec<WithdrawalEvent>> {
        self.sync.query_withdrawal_events(limit).await
    }

    pub async fn stats(&self) -> Result<VoucherStats> {
        let (created, redeemed) = tokio::try_join!(
            self.query_create_events(DEFAULT_EVENT_PAGE_LIMIT),
            self.query_redeem_events(DEFAULT_EVENT_PAGE_LIMIT),
        )?;

        let total_value = created.iter().fold(0u64, |acc, e| acc.saturating_add(e.amount));
        let redeemed_value = redeemed.iter().fold(0u64, |acc, e| acc.saturating_add(e.amount));

        Ok(VoucherStats {
            total_created: created.len(),
            total_redeemed: redeemed.len(),
            total_value,
            issued: created.len().saturating_sub(redeemed.len()),
            issued_value: total_value.saturating_sub(redeemed_value),
        })
    }

    /// voucher record for a code, hashes derived with the note hasher
    pub fn voucher_from_code(&self, code: &str) -> Result<Voucher> {
        let parsed = VoucherCode::parse(code)?;
        let mut voucher = parsed.to_voucher(self.note_hasher.as_ref(), self.config.network, &self.config.currency)?;
        voucher.id = code.to_string();
        voucher.amount = format!(
            "{} {}",
            format_amount(parsed.amount, self.config.decimals),
            self.config.currency
        );
        voucher.voucher_code = code.to_string();
        Ok(voucher)
    }

    /// redeemed according to the recent withdrawal events
    pub async fn is_voucher_redeemed(&self, code: &str) -> Result<bool> {
        let target = self.voucher_from_code(code)?.nullifier_hash_element()?;
        let redeemed = self.query_redeem_events(DEFAULT_EVENT_PAGE_LIMIT).await?;
        Ok(redeemed
            .iter()
            .filter_map(|e| FieldElement::from_hex(&e.nullifier_hash).ok())
            .any(|h| h == target))
    }

    /// redeemed according to the pool's nullifier set
    pub async fn is_voucher_redeemed_on_chain(&self, code: &str, sender: &str) -> Result<bool> {
        let voucher = self.voucher_from_code(code)?;
        let flags = self.spent.check(std::slice::from_ref(&voucher), sender).await?;
        Ok(flags.first().copied().unwrap_or(false))
    }

    /// parse a voucher code and produce the withdrawal proof for it
    pub async fn prepare_redemption(&mut self, params: &RedeemParams) -> Result<PreparedRedemption> {
        let code = VoucherCode::parse(&params.voucher_code)?;
        let pool_config = self.load_pool_config().await?;

        if code.amount != pool_config.note_denomination {
            warn!(
                "voucher amount {} differs from pool denomination {}, using the pool value",
                code.amount, pool_config.note_denomination
            );
        }
        let withdraw_fee = pool_config.withdraw_fee()?;

        let mut voucher = self.voucher_from_code(&params.voucher_code)?;
        voucher.denomination = pool_config.note_denomination;
        voucher.amount = format!(
            "{} {}",
            format_amount(pool_config.note_denomination, self.config.decimals),
            self.config.currency
        );

        let relayer = params.relayer.as_deref().unwrap_or("0x0");
        let fee = params.fee.unwrap_or(0);
        let proof = self
            .generate_withdrawal_proof(&voucher, &params.recipient, relayer, fee)
            .await?;

        Ok(PreparedRedemption {
            voucher,
            proof,
            pool_config,
            withdraw_fee,
        })
    }
}

#[async_trait::async_trait]
impl<T: MerkleTreeEngine> PoolContext for VoucherClient<T> {
    fn network(&self) -> Network {
        self.config.network
    }

    fn package_id(&self) -> &str {
        &self.config.package_id
    }

    fn config_id(&self) -> &str {
        &self.config.config_id
    }

    fn coin_type(&self) -> &str {
        &self.config.coin_type
    }

    fn sponsored_execution(&self) -> SponsoredExecutionParams {
        SponsoredExecutionParams {
            gas_budget: self.config.effective_gas_budget(),
            reserve_duration_secs: self.config.reserve_duration_secs,
            gas_pool_enabled: self.config.use_gas_pool,
        }
    }

    async fn sender_address(&self, signing: &SigningContext) -> Result<String> {
        signing.sender_address().await
    }

    async fn sign_transaction_bytes(&self, tx_bytes: &[u8], signing: &SigningContext) -> Result<SignedTransaction> {
        signing.sign(tx_bytes, self.zk_login.as_deref()).await
    }

    async fn execute_with_user_gas(&self, tx_bytes: &[u8], signing: &SigningContext) -> Result<Value> {
        let signed = self.sign_transaction_bytes(tx_bytes, signing).await?;
        let result = self.chain.execute_transaction(&signed).await?;
        execution::normalize_execution_result(result)
    }

    fn normalize_execution_result(&self, result: Value) -> Result<Value> {
        execution::normalize_execution_result(result)
    }

    async fn resolve_events_with_fallback(&self, execution: &Value) -> Vec<Value> {
        execution::resolve_events_with_fallback(self.chain.as_ref(), execution).await
    }

    fn resolve_error_code(&self, err: &VoucherError, fallback: VoucherErrorCode) -> VoucherErrorCode {
        execution::resolve_error_code(err, fallback)
    }

    async fn load_pool_config(&mut self) -> Result<PoolConfig> {
        VoucherClient::load_pool_config(self).await
    }

    async fn generate_withdrawal_proof(
        &mut self,
        voucher: &Voucher,
        recipient: &str,
        relayer: &str,
        fee: u64,
    ) -> Result<WithdrawalProof> {
        VoucherClient::generate_withdrawal_proof(self, voucher, recipient, relayer, fee).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(1_500_000_000, 9), "1.5");
        assert_eq!(format_amount(1_000_000_000, 9), "1");
        assert_eq!(format_amount(1, 9), "0.000000001");
        assert_eq!(format_amount(42, 0), "42");
    }
}
