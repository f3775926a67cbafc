//! Periodic all-customer sweep
//!
//! Phase A retires every overdue batch, one transaction per customer.
//! Phase B warns customers whose points expire within the configured
//! window; it never touches balances.

use crate::error::BusinessResult;
use crate::expiry::ExpiryReconciler;
use crate::services::ServiceContext;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use loyalty_core::MessageType;
use loyalty_persistence::{BatchRepo, ExpiredGroupRow, ExpiringGroupRow};
use serde::Serialize;

/// Description written on EXPIRY entries created by the sweep
pub const SWEEP_EXPIRY_DESCRIPTION: &str = "Points expired (scheduled sweep)";

/// Outcome of one sweep run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_batch_count: usize,
    pub expired_points: i64,
    pub customers_affected: usize,
    /// Customer groups whose cleanup transaction failed
    pub cleanup_failures: usize,
    pub expiring_soon_customers: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
}

pub struct SweepJob<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> SweepJob<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Run both phases once.
    ///
    /// Running it again straight away finds nothing left to expire.
    pub async fn sweep(&self) -> BusinessResult<SweepReport> {
        let now = self.ctx.now();
        let mut report = SweepReport::default();

        tracing::info!(%now, "Sweep started");

        let groups = BatchRepo::expired_groups(self.ctx.pool(), now).await?;
        for group in &groups {
            self.expire_group(group, now, &mut report).await;
        }

        let until = now + Duration::days(self.ctx.config().expiring_soon_days);
        let expiring = BatchRepo::expiring_groups(self.ctx.pool(), now, until).await?;
        report.expiring_soon_customers = expiring.len();
        if !expiring.is_empty() {
            let points: i64 = expiring.iter().map(|g| g.points).sum();
            tracing::info!(customers = expiring.len(), points, "Points expiring soon");
        }
        for group in expiring.chunks(self.ctx.config().notification_chunk_size.max(1)) {
            let results = join_all(group.iter().map(|g| self.send_warning(g))).await;
            for sent in results {
                if sent {
                    report.notifications_sent += 1;
                } else {
                    report.notifications_failed += 1;
                }
            }
        }

        tracing::info!(
            expired_batches = report.expired_batch_count,
            expired_points = report.expired_points,
            customers_affected = report.customers_affected,
            cleanup_failures = report.cleanup_failures,
            expiring_soon = report.expiring_soon_customers,
            notifications_sent = report.notifications_sent,
            notifications_failed = report.notifications_failed,
            "Sweep finished"
        );

        Ok(report)
    }

    /// Phase A for one customer. A failure rolls back this group only.
    async fn expire_group(
        &self,
        group: &ExpiredGroupRow,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) {
        let customer_id = group.customer_id.as_str();
        let _guard = self.ctx.locks().acquire(customer_id).await;

        let result = async {
            let mut tx = self.ctx.pool().begin().await?;
            let outcome =
                ExpiryReconciler::reconcile_in(&mut tx, customer_id, now, SWEEP_EXPIRY_DESCRIPTION)
                    .await?;
            tx.commit().await?;
            BusinessResult::Ok(outcome)
        }
        .await;

        match result {
            Ok(outcome) => {
                if let Some(event) = outcome.event(customer_id) {
                    report.expired_batch_count += outcome.batch_count;
                    report.expired_points += outcome.expired_points;
                    report.customers_affected += 1;
                    self.ctx.publish(event);
                }
            }
            Err(e) => {
                report.cleanup_failures += 1;
                if e.is_fatal() {
                    tracing::error!(
                        customer_id,
                        batches = group.batch_count,
                        points = group.points,
                        reason = e.reason_code(),
                        error = %e,
                        "Sweep cleanup failed"
                    );
                } else {
                    tracing::warn!(customer_id, error = %e, "Sweep cleanup skipped");
                }
            }
        }
    }

    /// Phase B message for one customer; `false` when delivery failed
    async fn send_warning(&self, group: &ExpiringGroupRow) -> bool {
        let body = format!(
            "Hi {}, {} of your points expire on {}. Redeem them before they are gone.",
            group.name,
            group.points,
            group.earliest_expiry.format("%Y-%m-%d")
        );

        match self
            .ctx
            .notifier()
            .notify(&group.customer_id, &group.phone_number, MessageType::Expiry, &body)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    customer_id = %group.customer_id,
                    error = %e,
                    "Expiry warning not delivered"
                );
                false
            }
        }
    }
}
