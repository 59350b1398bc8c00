//! pool configuration with a short-lived cache

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::chain::ChainClient;
use crate::codec::json_u64;
use crate::error::{Result, VoucherError};

pub const BPS_DENOMINATOR: u64 = 10_000;

/// single value cache with a time-to-live
#[derive(Clone, Debug)]
pub struct TtlCache<T> {
    ttl: Duration,
    entry: Option<(T, Instant)>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    /// cached value if younger than the ttl
    pub fn get(&self) -> Option<T> {
        self.entry
            .as_ref()
            .filter(|(_, at)| at.elapsed() < self.ttl)
            .map(|(value, _)| value.clone())
    }

    pub fn insert(&mut self, value: T) {
        self.entry = Some((value, Instant::now()));
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// fresh cached value, otherwise fetch and store. failed fetches are not
    /// cached.
    pub async fn get_or_try_fetch<F, Fut>(&mut self, fetch: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get() {
            return Ok(value);
        }
        let value = fetch().await?;
        self.insert(value.clone());
        Ok(value)
    }
}

/// fee and denomination parameters of the pool, in base units
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub note_denomination: u64,
    pub deposit_fixed_fee: u64,
    pub deposit_fee_bps: u64,
    pub withdraw_fixed_fee: u64,
    pub withdraw_fee_bps: u64,
}

/// `fixed + denomination * bps / 10000`, saturating
pub fn calculate_pool_fee(denomination: u64, fixed_fee: u64, fee_bps: u64) -> u64 {
    let variable = denomination as u128 * fee_bps as u128 / BPS_DENOMINATOR as u128;
    u64::try_from(fixed_fee as u128 + variable).unwrap_or(u64::MAX)
}

impl PoolConfig {
    /// parse the `content` of the pool config object
    pub fn from_object(content: &Value) -> Result<Self> {
        let fields = content
            .get("fields")
            .ok_or_else(|| VoucherError::InvalidPoolConfig("pool object has no fields".into()))?;
        let read = |key: &str| {
            fields
                .get(key)
                .and_then(json_u64)
                .ok_or_else(|| VoucherError::InvalidPoolConfig(format!("missing {}", key)))
        };
        Ok(Self {
            note_denomination: read("note_denomination")?,
            deposit_fixed_fee: read("deposit_fixed_fee")?,
            deposit_fee_bps: read("deposit_fee_bps")?,
            withdraw_fixed_fee: read("withdraw_fixed_fee")?,
            withdraw_fee_bps: read("withdraw_fee_bps")?,
        })
    }

    pub fn deposit_fee(&self) -> u64 {
        calculate_pool_fee(self.note_denomination, self.deposit_fixed_fee, self.deposit_fee_bps)
    }

    /// withdraw fee, which must be positive for a redemption to be valid
    pub fn withdraw_fee(&self) -> Result<u64> {
        match calculate_pool_fee(self.note_denomination, self.withdraw_fixed_fee, self.withdraw_fee_bps) {
            0 => Err(VoucherError::InvalidPoolConfig(
                "withdraw fee must be greater than zero".into(),
            )),
            fee => Ok(fee),
        }
    }
}

/// pool config read through a ttl cache
pub struct PoolConfigCache {
    chain: Arc<dyn ChainClient>,
    config_id: String,
    cache: TtlCache<PoolConfig>,
}

impl PoolConfigCache {
    pub fn new(chain: Arc<dyn ChainClient>, config_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            chain,
            config_id: config_id.into(),
            cache: TtlCache::new(ttl),
        }
    }

    pub async fn load(&mut self) -> Result<PoolConfig> {
        let chain = self.chain.clone();
        let config_id = self.config_id.clone();
        self.cache
            .get_or_try_fetch(|| async move {
                debug!("fetching pool config {}", config_id);
                let content = chain.get_object(&config_id).await?.ok_or_else(|| {
                    VoucherError::InvalidPoolConfig(format!("pool object {} has no content", config_id))
                })?;
                PoolConfig::from_object(&content)
            })
            .await
    }

    pub fn invalidate(&mut self) {
        self.cache.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_calculate_pool_fee() {
        assert_eq!(calculate_pool_fee(1_000_000_000, 1_000, 30), 3_001_000);
        assert_eq!(calculate_pool_fee(100, 0, 0), 0);
        assert_eq!(calculate_pool_fee(u64::MAX, u64::MAX, 10_000), u64::MAX);
    }

    #[test]
    fn test_pool_config_from_object() {
        let cfg = PoolConfig::from_object(&json!({
            "fields": {
                "note_denomination": "1000000000",
                "deposit_fixed_fee": "0",
                "deposit_fee_bps": 10,
                "withdraw_fixed_fee": "500",
                "withdraw_fee_bps": "0"
            }
        }))
        .unwrap();
        assert_eq!(cfg.deposit_fee(), 1_000_000);
        assert_eq!(cfg.withdraw_fee().unwrap(), 500);
    }

    #[test]
    fn test_zero_withdraw_fee_rejected() {
        let cfg = PoolConfig {
            note_denomination: 1_000,
            ..PoolConfig::default()
        };
        assert!(matches!(cfg.withdraw_fee(), Err(VoucherError::InvalidPoolConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_cache_expires() {
        let mut cache = TtlCache::new(Duration::from_secs(30));
        assert_eq!(cache.get(), None);
        cache.insert(7u32);
        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(cache.get(), Some(7));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_not_cached() {
        let mut cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(30));
        let err = cache
            .get_or_try_fetch(|| async { Err(VoucherError::InvalidPoolConfig("down".into())) })
            .await;
        assert!(err.is_err());
        let value = cache.get_or_try_fetch(|| async { Ok(9) }).await.unwrap();
        assert_eq!(value, 9);
        let value = cache.get_or_try_fetch(|| async { Ok(10) }).await.unwrap();
        assert_eq!(value, 9);
    }
}
