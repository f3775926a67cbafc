//! Sweep and reporting commands

use anyhow::Result;
use chrono::NaiveDate;
use loyalty_business::{ReportService, ServiceContext, SweepJob};

use super::engine_error;

/// Run the expiry sweep once
pub async fn sweep(ctx: &ServiceContext, json: bool) -> Result<()> {
    let report = SweepJob::new(ctx).sweep().await.map_err(engine_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("🧹 Sweep complete");
    println!("   Expired batches:    {}", report.expired_batch_count);
    println!("   Expired points:     {}", report.expired_points);
    println!("   Customers affected: {}", report.customers_affected);
    if report.cleanup_failures > 0 {
        println!("   ⚠️  Cleanup failures: {}", report.cleanup_failures);
    }
    println!("   Expiring soon:      {}", report.expiring_soon_customers);
    println!(
        "   Warnings sent:      {} ({} failed)",
        report.notifications_sent, report.notifications_failed
    );
    Ok(())
}

/// Programme-wide totals
pub async fn stats(ctx: &ServiceContext) -> Result<()> {
    let stats = ReportService::new(ctx)
        .program_stats()
        .await
        .map_err(engine_error)?;

    println!("📊 Programme Statistics");
    println!("   Customers:        {}", stats.total_customers);
    println!("   Ledger entries:   {}", stats.total_entries);
    println!("   Points issued:    {}", stats.points_issued);
    println!("   Points redeemed:  {}", stats.points_redeemed);
    println!("   Points expired:   {}", stats.points_expired);
    println!("   Outstanding:      {}", stats.outstanding_balance);
    Ok(())
}

/// Compute and store the daily report
pub async fn daily(ctx: &ServiceContext, date: NaiveDate) -> Result<()> {
    let report = ReportService::new(ctx)
        .daily_report(date)
        .await
        .map_err(engine_error)?;

    println!("✅ Daily report stored for {}", report.date);
    println!("   New customers:    {} ({} total)", report.new_customers, report.total_customers);
    println!("   Points earned:    {}", report.points_earned);
    println!("   Points redeemed:  {}", report.points_redeemed);
    println!("   Points expired:   {}", report.points_expired);
    println!("   Transactions:     {}", report.transaction_count);
    println!("   Purchases:        {}", report.total_purchase_amount);
    Ok(())
}
