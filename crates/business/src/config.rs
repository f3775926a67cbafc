//! Programme configuration
//!
//! Every field has a default, so an empty JSON object is a valid config.

use crate::error::{BusinessError, BusinessResult};
use loyalty_core::PointsPolicy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default validity of a points batch in calendar months.
pub const DEFAULT_VALIDITY_MONTHS: u32 = 6;

/// Default look-ahead of the "expiring soon" warning.
pub const DEFAULT_EXPIRING_SOON_DAYS: i64 = 7;

/// Default number of concurrent sends per notification chunk.
pub const DEFAULT_NOTIFICATION_CHUNK_SIZE: usize = 50;

/// Default lifetime of cached programme statistics.
pub const DEFAULT_STATS_CACHE_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoyaltyConfig {
    /// Points per unit of purchase. Default: 0.10
    pub earn_rate: Decimal,

    pub validity_months: u32,

    /// Phase B of the sweep warns about batches expiring within this window.
    pub expiring_soon_days: i64,

    pub notification_chunk_size: usize,

    pub stats_cache_ttl_secs: u64,

    /// Recipient of the daily report summary, if any
    pub admin_phone: Option<String>,
}

impl Default for LoyaltyConfig {
    fn default() -> Self {
        Self {
            earn_rate: Decimal::new(10, 2),
            validity_months: DEFAULT_VALIDITY_MONTHS,
            expiring_soon_days: DEFAULT_EXPIRING_SOON_DAYS,
            notification_chunk_size: DEFAULT_NOTIFICATION_CHUNK_SIZE,
            stats_cache_ttl_secs: DEFAULT_STATS_CACHE_TTL_SECS,
            admin_phone: None,
        }
    }
}

impl LoyaltyConfig {
    /// Load from a JSON file and validate.
    pub fn from_file(path: impl AsRef<Path>) -> BusinessResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| BusinessError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> BusinessResult<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| BusinessError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BusinessResult<()> {
        if self.earn_rate <= Decimal::ZERO {
            return Err(BusinessError::Config(format!(
                "earn_rate must be positive: {}",
                self.earn_rate
            )));
        }
        if self.validity_months == 0 {
            return Err(BusinessError::Config("validity_months must be at least 1".into()));
        }
        if self.expiring_soon_days <= 0 {
            return Err(BusinessError::Config(
                "expiring_soon_days must be positive".into(),
            ));
        }
        if self.notification_chunk_size == 0 {
            return Err(BusinessError::Config(
                "notification_chunk_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn policy(&self) -> PointsPolicy {
        PointsPolicy::new(self.earn_rate, self.validity_months)
    }
}
