//! Accrual - purchase to points batch

use crate::error::BusinessResult;
use crate::expiry::{ExpiryReconciler, LAZY_EXPIRY_DESCRIPTION};
use crate::services::{load_customer, EarnResult, ServiceContext};
use loyalty_core::{EntryKind, LedgerEvent};
use loyalty_persistence::{BatchRepo, CustomerRepo, LedgerRepo, NewLedgerEntry};
use rust_decimal::Decimal;

pub struct AccrualEngine<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> AccrualEngine<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Convert a purchase into points.
    ///
    /// One transaction: reconcile expiry, create the batch, credit the
    /// balance, append the EARN entry.
    pub async fn earn(
        &self,
        customer_id: &str,
        purchase_amount: Decimal,
        description: &str,
    ) -> BusinessResult<EarnResult> {
        let points = self.ctx.policy().points_for_purchase(purchase_amount)?;

        let _guard = self.ctx.locks().acquire(customer_id).await;
        let now = self.ctx.now();
        let expires_at = self.ctx.policy().expiry_for(now);

        let mut tx = self.ctx.pool().begin().await?;
        let customer = load_customer(&mut tx, customer_id).await?;

        let expiry =
            ExpiryReconciler::reconcile_in(&mut tx, customer_id, now, LAZY_EXPIRY_DESCRIPTION)
                .await?;

        let batch_id = BatchRepo::insert(&mut *tx, customer_id, points, now, expires_at).await?;
        let new_balance = CustomerRepo::credit(&mut *tx, customer_id, points).await?;

        LedgerRepo::append(
            &mut *tx,
            &NewLedgerEntry {
                customer_id,
                kind: EntryKind::Earn,
                points,
                balance_after: new_balance,
                purchase_amount: Some(purchase_amount),
                description,
                created_at: now,
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            customer_id,
            %purchase_amount,
            points,
            balance = new_balance,
            batch_id,
            "Points earned"
        );

        if let Some(event) = expiry.event(customer_id) {
            self.ctx.publish(event);
        }
        self.ctx.publish(LedgerEvent::PointsEarned {
            customer_id: customer_id.to_string(),
            phone_number: customer.phone_number,
            purchase_amount,
            points,
            new_balance,
            expires_at,
        });

        Ok(EarnResult {
            customer_id: customer_id.to_string(),
            points_earned: points,
            new_balance,
            expires_at,
            batch_id,
            expired_points: expiry.expired_points,
        })
    }
}
