//! Redemption - FIFO-by-expiry consumption of points batches

use crate::error::{BusinessError, BusinessResult};
use crate::expiry::{ExpiryReconciler, LAZY_EXPIRY_DESCRIPTION};
use crate::services::{load_customer, RedeemResult, ServiceContext};
use loyalty_core::{plan_redemption, EntryKind, LedgerEvent, PointsBatch};
use loyalty_persistence::{BatchRepo, CustomerRepo, LedgerRepo, NewLedgerEntry};

pub struct RedemptionEngine<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> RedemptionEngine<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Spend `points`, soonest-to-expire batches first.
    ///
    /// Order inside the transaction: reconcile expiry, check balance,
    /// drain batches, debit balance, append the REDEEM entry. Any rejection
    /// rolls the whole unit back, reconciliation included.
    pub async fn redeem(
        &self,
        customer_id: &str,
        points: i64,
        description: &str,
    ) -> BusinessResult<RedeemResult> {
        if points <= 0 {
            return Err(BusinessError::InvalidAmount(format!(
                "Redemption amount must be positive: {}",
                points
            )));
        }

        let _guard = self.ctx.locks().acquire(customer_id).await;
        let now = self.ctx.now();

        let mut tx = self.ctx.pool().begin().await?;
        let customer = load_customer(&mut tx, customer_id).await?;

        let expiry =
            ExpiryReconciler::reconcile_in(&mut tx, customer_id, now, LAZY_EXPIRY_DESCRIPTION)
                .await?;

        if expiry.balance < points {
            tracing::info!(
                customer_id,
                requested = points,
                balance = expiry.balance,
                "Redemption rejected: insufficient balance"
            );
            return Err(BusinessError::insufficient_balance(points, expiry.balance));
        }

        let batches: Vec<PointsBatch> = BatchRepo::live_for_customer(&mut *tx, customer_id, now)
            .await?
            .into_iter()
            .map(PointsBatch::from)
            .collect();

        let plan = plan_redemption(&batches, points).map_err(|e| {
            if e.is_consistency_violation() {
                tracing::error!(
                    customer_id,
                    requested = points,
                    balance = expiry.balance,
                    error = %e,
                    "Consistency violation: live batches do not cover the balance"
                );
                BusinessError::consistency(customer_id, e.to_string())
            } else {
                e.into()
            }
        })?;

        let mut drained = Vec::new();
        for draw in &plan.draws {
            if draw.exhausts_batch() {
                drained.push(draw.batch_id);
            } else {
                BatchRepo::set_remaining(&mut *tx, draw.batch_id, draw.remaining_after).await?;
            }
        }
        BatchRepo::delete_many(&mut *tx, &drained).await?;

        // Guarded in SQL as well, in case another process moved the balance
        let new_balance = CustomerRepo::debit_guarded(&mut *tx, customer_id, points)
            .await?
            .ok_or_else(|| {
                tracing::warn!(customer_id, requested = points, "Balance changed during redemption");
                BusinessError::insufficient_balance(points, expiry.balance)
            })?;

        LedgerRepo::append(
            &mut *tx,
            &NewLedgerEntry {
                customer_id,
                kind: EntryKind::Redeem,
                points: -points,
                balance_after: new_balance,
                purchase_amount: None,
                description,
                created_at: now,
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            customer_id,
            points,
            balance = new_balance,
            batches = plan.batches_consumed(),
            "Points redeemed"
        );

        if let Some(event) = expiry.event(customer_id) {
            self.ctx.publish(event);
        }
        self.ctx.publish(LedgerEvent::PointsRedeemed {
            customer_id: customer_id.to_string(),
            phone_number: customer.phone_number,
            points,
            new_balance,
            batches_consumed: plan.batches_consumed(),
        });

        Ok(RedeemResult {
            customer_id: customer_id.to_string(),
            points_redeemed: points,
            new_balance,
            batches_consumed: plan.batches_consumed(),
            expired_points: expiry.expired_points,
        })
    }
}
