//! Ledger listing

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use loyalty_business::{LedgerService, ServiceContext};
use loyalty_core::{LedgerFilter, LedgerPage, LedgerQuery, Pagination};

use super::engine_error;
use crate::LedgerArgs;

fn start_of(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Exclusive bound covering all of `date`
fn end_of(date: NaiveDate) -> DateTime<Utc> {
    start_of(date) + Duration::days(1)
}

fn build_query(args: LedgerArgs) -> LedgerQuery {
    LedgerQuery {
        filter: LedgerFilter {
            customer_id: args.customer,
            kinds: args.kind.iter().map(|k| k.to_core_kind()).collect(),
            preset: args.preset,
            from: args.from.map(start_of),
            to: args.to.map(end_of),
            min_points: args.min_points,
            max_points: args.max_points,
            min_purchase: args.min_purchase,
            max_purchase: args.max_purchase,
            search: args.search,
        },
        sort: args.sort,
        order: args.order.to_core_order(),
        page: Pagination {
            limit: args.limit,
            offset: args.offset,
        },
    }
}

/// List ledger entries with filters
pub async fn list(ctx: &ServiceContext, args: LedgerArgs) -> Result<()> {
    let json = args.json;
    let query = build_query(args);
    let page = LedgerService::new(ctx)
        .list(&query)
        .await
        .map_err(engine_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    print_page(&page, &query);
    Ok(())
}

fn print_page(page: &LedgerPage, query: &LedgerQuery) {
    if page.entries.is_empty() {
        println!("No ledger entries match");
    } else {
        println!(
            "{:>6}  {:<16}  {:<10} {:<6} {:>7} {:>8} {:>10}  Description",
            "#", "Date", "Customer", "Kind", "Points", "Balance", "Purchase"
        );
        println!("{}", "-".repeat(96));
        for record in &page.entries {
            let e = &record.entry;
            println!(
                "{:>6}  {:<16}  {:<10} {:<6} {:>+7} {:>8} {:>10}  {}",
                e.entry_id,
                e.created_at.format("%Y-%m-%d %H:%M"),
                e.customer_id,
                e.kind.as_str(),
                e.points,
                e.balance_after,
                e.purchase_amount.map(|a| a.to_string()).unwrap_or_default(),
                e.description
            );
        }
    }

    let s = &page.summary;
    println!();
    println!(
        "📒 Showing {}-{} of {}",
        if page.entries.is_empty() { 0 } else { query.page.offset + 1 },
        query.page.offset as usize + page.entries.len(),
        page.total
    );
    println!("   Earned:    {} ({} entries)", s.total_earned, s.earn_count);
    println!("   Redeemed:  {} ({} entries)", s.total_redeemed, s.redeem_count);
    println!("   Expired:   {} ({} entries)", s.total_expired, s.expiry_count);
    println!("   Purchases: {}", s.total_purchase_amount);
    if page.has_more {
        println!(
            "   More entries: use --offset {}",
            query.page.offset as usize + page.entries.len()
        );
    }
}
