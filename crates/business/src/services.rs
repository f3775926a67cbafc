//! Shared service context and operation results
//!
//! Every service borrows one [`ServiceContext`], which owns the pool, the
//! programme configuration, the clock and the post-commit collaborators.

use crate::cache::{InMemoryStatsCache, StatsCache};
use crate::config::LoyaltyConfig;
use crate::dispatch::{CacheInvalidationSubscriber, EventDispatcher, NotificationSubscriber};
use crate::error::{BusinessError, BusinessResult};
use crate::locks::CustomerLocks;
use crate::notify::{Notifier, SimulatedNotifier};
use chrono::{DateTime, Utc};
use loyalty_core::{Clock, LedgerEvent, PointsPolicy, SystemClock};
use loyalty_persistence::{CustomerRepo, CustomerRow, Database};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use std::time::Duration;

/// Context for business operations
pub struct ServiceContext {
    pool: SqlitePool,
    config: LoyaltyConfig,
    policy: PointsPolicy,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    stats_cache: Arc<dyn StatsCache>,
    dispatcher: EventDispatcher,
    locks: CustomerLocks,
}

impl ServiceContext {
    /// Production wiring: system clock, simulated notifier, in-memory stats cache
    pub fn new(db: &Database, config: LoyaltyConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let notifier = Arc::new(SimulatedNotifier::new(db.pool().clone(), Arc::clone(&clock)));
        let cache = Arc::new(InMemoryStatsCache::new(Duration::from_secs(
            config.stats_cache_ttl_secs,
        )));
        Self::from_parts(db.pool().clone(), config, clock, notifier, cache)
    }

    /// Create from explicit collaborators
    pub fn from_parts(
        pool: SqlitePool,
        config: LoyaltyConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        stats_cache: Arc<dyn StatsCache>,
    ) -> Self {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(Arc::new(NotificationSubscriber::new(Arc::clone(&notifier))));
        dispatcher.register(Arc::new(CacheInvalidationSubscriber::new(Arc::clone(
            &stats_cache,
        ))));

        Self {
            pool,
            policy: config.policy(),
            config,
            clock,
            notifier,
            stats_cache,
            dispatcher,
            locks: CustomerLocks::new(),
        }
    }

    /// Get database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &LoyaltyConfig {
        &self.config
    }

    pub fn policy(&self) -> &PointsPolicy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub fn stats_cache(&self) -> &dyn StatsCache {
        self.stats_cache.as_ref()
    }

    pub fn locks(&self) -> &CustomerLocks {
        &self.locks
    }

    /// Publish a committed event to the collaborators
    pub fn publish(&self, event: LedgerEvent) {
        self.dispatcher.publish(event);
    }

    /// Wait for outstanding post-commit deliveries
    pub async fn flush(&self) {
        self.dispatcher.flush().await;
    }
}

/// Load a customer inside a unit of work, mapping absence to a validation error
pub(crate) async fn load_customer(
    conn: &mut SqliteConnection,
    customer_id: &str,
) -> BusinessResult<CustomerRow> {
    CustomerRepo::find_by_id(conn, customer_id)
        .await?
        .ok_or_else(|| BusinessError::CustomerNotFound(customer_id.to_string()))
}

/// Result of a successful accrual
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EarnResult {
    pub customer_id: String,
    pub points_earned: i64,
    pub new_balance: i64,
    pub expires_at: DateTime<Utc>,
    pub batch_id: i64,
    /// Points retired by the reconciliation that ran first
    pub expired_points: i64,
}

/// Result of a successful redemption
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedeemResult {
    pub customer_id: String,
    pub points_redeemed: i64,
    pub new_balance: i64,
    pub batches_consumed: usize,
    pub expired_points: i64,
}
