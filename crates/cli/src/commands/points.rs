//! Points operations: earn, redeem, verify

use anyhow::{bail, Result};
use loyalty_business::{AccrualEngine, LedgerService, RedemptionEngine, ServiceContext};
use rust_decimal::Decimal;

use super::engine_error;

/// Earn points for a purchase
pub async fn earn(
    ctx: &ServiceContext,
    customer_id: &str,
    purchase_amount: Decimal,
    description: &str,
) -> Result<()> {
    let result = AccrualEngine::new(ctx)
        .earn(customer_id, purchase_amount, description)
        .await
        .map_err(engine_error)?;

    println!("✅ Points earned!");
    println!("   Customer:  {}", result.customer_id);
    println!("   Purchase:  {}", purchase_amount);
    println!("   Earned:    +{} points", result.points_earned);
    println!("   Balance:   {} points", result.new_balance);
    println!("   Expires:   {}", result.expires_at.format("%Y-%m-%d"));
    if result.expired_points > 0 {
        println!("   Expired:   {} points (before this purchase)", result.expired_points);
    }
    Ok(())
}

/// Redeem points
pub async fn redeem(ctx: &ServiceContext, customer_id: &str, points: i64, description: &str) -> Result<()> {
    let result = RedemptionEngine::new(ctx)
        .redeem(customer_id, points, description)
        .await
        .map_err(engine_error)?;

    println!("✅ Points redeemed!");
    println!("   Customer:  {}", result.customer_id);
    println!("   Redeemed:  -{} points", result.points_redeemed);
    println!("   Balance:   {} points", result.new_balance);
    println!("   Batches:   {}", result.batches_consumed);
    Ok(())
}

/// Check both ledger invariants for one customer
pub async fn verify(ctx: &ServiceContext, customer_id: &str) -> Result<()> {
    let report = LedgerService::new(ctx)
        .verify(customer_id)
        .await
        .map_err(engine_error)?;

    println!("🔍 Ledger check for {}", report.customer_id);
    println!("   Balance:          {}", report.balance);
    println!("   Σ ledger entries: {} {}", report.ledger_sum, mark(report.audit_ok()));
    println!("   Σ live batches:   {}", report.live_batch_sum);
    println!(
        "   Pending expiry:   {} {}",
        report.pending_expiry,
        mark(report.batches_ok())
    );

    if !report.is_consistent() {
        bail!("Ledger invariant broken for customer {}", customer_id);
    }
    Ok(())
}

fn mark(ok: bool) -> &'static str {
    if ok {
        "✅"
    } else {
        "❌"
    }
}
