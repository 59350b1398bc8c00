//! voucher client configuration and network presets

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoucherError};
use crate::retry::{self, RetryConfig};
use crate::voucher::Network;
use crate::{
    DEFAULT_EVENT_PAGE_LIMIT, DEFAULT_PROOF_SERVICE_URL, DEFAULT_PROOF_TIMEOUT_SECS,
    DEFAULT_RESERVE_DURATION_SECS, MIN_SPONSORED_GAS, POOL_CONFIG_TTL_MS, POOL_MODULE,
    SYNC_THROTTLE_MS, TREE_HEIGHT,
};

/// retry policy as written in config files
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: retry::DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: retry::DEFAULT_BASE_DELAY.as_millis() as u64,
            max_delay_ms: retry::DEFAULT_MAX_DELAY.as_millis() as u64,
            backoff_multiplier: retry::DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(s: &RetrySettings) -> Self {
        RetryConfig {
            max_attempts: s.max_attempts,
            base_delay: Duration::from_millis(s.base_delay_ms),
            max_delay: Duration::from_millis(s.max_delay_ms),
            backoff_multiplier: s.backoff_multiplier,
            on_retry: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoucherConfig {
    pub network: Network,
    /// chain rpc endpoint, used by the caller's chain client
    pub rpc_endpoint: String,
    /// pool package id
    pub package_id: String,
    /// pool config object id
    pub config_id: String,
    /// pool coin type argument
    pub coin_type: String,
    pub currency: String,
    pub decimals: u8,
    pub merkle_tree_height: usize,
    pub root_history_size: usize,
    pub proof_service_url: String,
    pub proof_timeout_secs: u64,
    pub event_page_limit: usize,
    pub sync_throttle_ms: u64,
    pub pool_config_ttl_ms: u64,
    /// requested gas budget, floored at [`MIN_SPONSORED_GAS`]
    pub gas_budget: u64,
    pub reserve_duration_secs: u64,
    pub use_gas_pool: bool,
    pub retry: RetrySettings,
}

impl Default for VoucherConfig {
    fn default() -> Self {
        Self::oct()
    }
}

impl VoucherConfig {
    /// onechain mainnet
    pub fn oct() -> Self {
        Self {
            network: Network::Oct,
            rpc_endpoint: "https://rpc-mainnet.onelabs.cc:443".into(),
            package_id: String::new(),
            config_id: String::new(),
            coin_type: "0x3d1ecd3dc3c8ecf8cb17978b6b5fe0b06704d4ed87cc37176a01510c45e21c92::usdh::USDH"
                .into(),
            currency: "USDH".into(),
            decimals: 9,
            merkle_tree_height: TREE_HEIGHT,
            root_history_size: pool_merkle::ROOT_HISTORY_SIZE,
            proof_service_url: DEFAULT_PROOF_SERVICE_URL.into(),
            proof_timeout_secs: DEFAULT_PROOF_TIMEOUT_SECS,
            event_page_limit: DEFAULT_EVENT_PAGE_LIMIT,
            sync_throttle_ms: SYNC_THROTTLE_MS,
            pool_config_ttl_ms: POOL_CONFIG_TTL_MS,
            gas_budget: MIN_SPONSORED_GAS,
            reserve_duration_secs: DEFAULT_RESERVE_DURATION_SECS,
            use_gas_pool: false,
            retry: RetrySettings::default(),
        }
    }

    /// onechain testnet
    pub fn oct_testnet() -> Self {
        Self {
            network: Network::OctTestnet,
            rpc_endpoint: "https://rpc-testnet.onelabs.cc:443".into(),
            coin_type: "0x72eba41c73c4c2ce2bcfc6ec1dc0896ba1b5c17bfe7ae7c6c779943f84912b41::usdh::USDH"
                .into(),
            ..Self::oct()
        }
    }

    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Oct => Self::oct(),
            Network::OctTestnet => Self::oct_testnet(),
        }
    }

    pub fn with_pool(mut self, package_id: impl Into<String>, config_id: impl Into<String>) -> Self {
        self.package_id = package_id.into();
        self.config_id = config_id.into();
        self
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| VoucherError::Config(format!("invalid toml: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| VoucherError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| VoucherError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.package_id.trim().is_empty() {
            return Err(VoucherError::Config("package_id is required".into()));
        }
        if self.config_id.trim().is_empty() {
            return Err(VoucherError::Config("config_id is required".into()));
        }
        if self.coin_type.trim().is_empty() {
            return Err(VoucherError::Config("coin_type is required".into()));
        }
        if self.merkle_tree_height == 0 || self.merkle_tree_height > pool_merkle::MAX_HEIGHT {
            return Err(VoucherError::Config(format!(
                "merkle_tree_height must be within 1..={}",
                pool_merkle::MAX_HEIGHT
            )));
        }
        if self.root_history_size == 0 {
            return Err(VoucherError::Config("root_history_size must be non-zero".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(VoucherError::Config("retry.max_attempts must be non-zero".into()));
        }
        if !(self.retry.backoff_multiplier.is_finite() && self.retry.backoff_multiplier >= 1.0) {
            return Err(VoucherError::Config("retry.backoff_multiplier must be >= 1".into()));
        }
        if self.event_page_limit == 0 {
            return Err(VoucherError::Config("event_page_limit must be non-zero".into()));
        }
        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::from(&self.retry)
    }

    pub fn deposit_event_type(&self) -> String {
        format!("{}::{}::DepositEvent", self.package_id, POOL_MODULE)
    }

    pub fn withdrawal_event_type(&self) -> String {
        format!("{}::{}::WithdrawalEvent", self.package_id, POOL_MODULE)
    }

    pub fn effective_gas_budget(&self) -> u64 {
        self.gas_budget.max(MIN_SPONSORED_GAS)
    }

    pub fn proof_timeout(&self) -> Duration {
        Duration::from_secs(self.proof_timeout_secs)
    }

    pub fn pool_config_ttl(&self) -> Duration {
        Duration::from_millis(self.pool_config_ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_differ_by_network() {
        let main = VoucherConfig::oct();
        let test = VoucherConfig::oct_testnet();
        assert_eq!(main.network, Network::Oct);
        assert_eq!(test.network, Network::OctTestnet);
        assert_ne!(main.coin_type, test.coin_type);
        assert!(test.rpc_endpoint.contains("testnet"));
        assert_eq!(test.merkle_tree_height, 20);
    }

    #[test]
    fn test_validate_requires_pool_ids() {
        assert!(VoucherConfig::oct().validate().is_err());
        assert!(VoucherConfig::oct().with_pool("0xabc", "0xdef").validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = VoucherConfig::from_toml_str(
            r#"
            network = "oct-testnet"
            package_id = "0xabc"
            config_id = "0xdef"
            merkle_tree_height = 16

            [retry]
            max_attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.network, Network::OctTestnet);
        assert_eq!(config.merkle_tree_height, 16);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 2000);
        assert_eq!(config.event_page_limit, 1000);
        assert_eq!(config.deposit_event_type(), "0xabc::privacy_pool::DepositEvent");
    }

    #[test]
    fn test_toml_round_trip() {
        let config = VoucherConfig::oct_testnet().with_pool("0x1", "0x2");
        let text = config.to_toml_string().unwrap();
        assert_eq!(VoucherConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml_values() {
        assert!(VoucherConfig::from_toml_str("package_id = 5").is_err());
        assert!(VoucherConfig::from_toml_str(
            "package_id = \"0x1\"\nconfig_id = \"0x2\"\nmerkle_tree_height = 0"
        )
        .is_err());
    }

    #[test]
    fn test_gas_budget_floor() {
        let mut config = VoucherConfig::oct();
        config.gas_budget = 1_000;
        assert_eq!(config.effective_gas_budget(), MIN_SPONSORED_GAS);
        config.gas_budget = MIN_SPONSORED_GAS * 2;
        assert_eq!(config.effective_gas_budget(), MIN_SPONSORED_GAS * 2);
    }

    #[test]
    fn test_retry_settings_convert() {
        let retry = VoucherConfig::oct().retry_config();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.base_delay, Duration::from_millis(2000));
        assert_eq!(retry.max_delay, Duration::from_millis(15000));
    }
}
