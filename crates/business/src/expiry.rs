//! Expiry reconciliation
//!
//! Retires a customer's overdue batches: deletes them, takes their
//! remaining points off the balance and appends one EXPIRY entry. Every
//! mutating ledger operation runs [`ExpiryReconciler::reconcile_in`] as the
//! first step of its own transaction.

use crate::error::{BusinessError, BusinessResult};
use crate::services::{load_customer, ServiceContext};
use chrono::{DateTime, Utc};
use loyalty_core::{EntryKind, LedgerEvent};
use loyalty_persistence::{BatchRepo, CustomerRepo, LedgerRepo, NewLedgerEntry};
use serde::Serialize;
use sqlx::SqliteConnection;

/// Description written on lazily reconciled EXPIRY entries
pub const LAZY_EXPIRY_DESCRIPTION: &str = "Points expired";

/// What a reconciliation pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExpiryOutcome {
    pub expired_points: i64,
    pub batch_count: usize,
    /// Balance after the pass (unchanged when nothing expired)
    pub balance: i64,
}

impl ExpiryOutcome {
    pub fn is_noop(&self) -> bool {
        self.batch_count == 0
    }

    /// Event for the collaborators, if anything expired
    pub fn event(&self, customer_id: &str) -> Option<LedgerEvent> {
        (!self.is_noop()).then(|| LedgerEvent::PointsExpired {
            customer_id: customer_id.to_string(),
            points: self.expired_points,
            batches: self.batch_count,
            new_balance: self.balance,
        })
    }
}

/// Per-customer expiry
pub struct ExpiryReconciler<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> ExpiryReconciler<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Reconcile one customer as a standalone unit of work.
    ///
    /// Returns the number of points expired (0 when nothing was due).
    pub async fn reconcile(&self, customer_id: &str) -> BusinessResult<i64> {
        let _guard = self.ctx.locks().acquire(customer_id).await;
        let now = self.ctx.now();

        let mut tx = self.ctx.pool().begin().await?;
        load_customer(&mut tx, customer_id).await?;
        let outcome = Self::reconcile_in(&mut tx, customer_id, now, LAZY_EXPIRY_DESCRIPTION).await?;
        tx.commit().await?;

        if let Some(event) = outcome.event(customer_id) {
            self.ctx.publish(event);
        }
        Ok(outcome.expired_points)
    }

    /// Reconcile inside the caller's transaction.
    ///
    /// The caller has already established that the customer exists and
    /// holds its lock. Nothing is written when no batch is overdue, so a
    /// second call at the same `now` is a no-op.
    pub async fn reconcile_in(
        conn: &mut SqliteConnection,
        customer_id: &str,
        now: DateTime<Utc>,
        description: &str,
    ) -> BusinessResult<ExpiryOutcome> {
        let expired = BatchRepo::expired_for_customer(&mut *conn, customer_id, now).await?;

        if expired.is_empty() {
            let customer = load_customer(conn, customer_id).await?;
            return Ok(ExpiryOutcome {
                balance: customer.balance,
                ..ExpiryOutcome::default()
            });
        }

        let points: i64 = expired.iter().map(|b| b.remaining_points).sum();
        let ids: Vec<i64> = expired.iter().map(|b| b.batch_id).collect();

        let deleted = BatchRepo::delete_many(&mut *conn, &ids).await?;
        if deleted != ids.len() as u64 {
            return Err(BusinessError::consistency(
                customer_id,
                format!("expected to delete {} batches, deleted {}", ids.len(), deleted),
            ));
        }

        let balance = CustomerRepo::debit_guarded(&mut *conn, customer_id, points)
            .await?
            .ok_or_else(|| {
                tracing::error!(
                    customer_id,
                    expired_points = points,
                    "Consistency violation: balance lower than expiring batches"
                );
                BusinessError::consistency(
                    customer_id,
                    format!("balance lower than {} expiring points", points),
                )
            })?;

        LedgerRepo::append(
            &mut *conn,
            &NewLedgerEntry {
                customer_id,
                kind: EntryKind::Expiry,
                points: -points,
                balance_after: balance,
                purchase_amount: None,
                description,
                created_at: now,
            },
        )
        .await?;

        tracing::info!(
            customer_id,
            points,
            batches = ids.len(),
            balance,
            "Expired points"
        );

        Ok(ExpiryOutcome {
            expired_points: points,
            batch_count: ids.len(),
            balance,
        })
    }
}
