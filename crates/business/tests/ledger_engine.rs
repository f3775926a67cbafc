//! End-to-end tests for the points ledger engine.
//!
//! Each test runs against a fresh in-memory database with a manual clock
//! and a recording notifier.
//! Run with: cargo test -p loyalty-business --test ledger_engine

use async_trait::async_trait;
use chrono::{DateTime, Duration, Months, TimeZone, Utc};
use loyalty_business::{
    AccrualEngine, BusinessError, CustomerService, InMemoryStatsCache, LedgerService,
    LoyaltyConfig, Notifier, NotifyError, RedemptionEngine, ReportService, ServiceContext,
    SweepJob,
};
use loyalty_core::{
    Clock, DatePreset, EntryKind, LedgerFilter, LedgerQuery, ManualClock, MessageType, Pagination,
};
use loyalty_persistence::{BatchRepo, CustomerRepo, Database};
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct Sent {
    customer_id: String,
    phone: String,
    message_type: MessageType,
    body: String,
}

/// Records every message; phones in `failing` are refused.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
    failing: HashSet<String>,
}

impl RecordingNotifier {
    fn failing_for(phones: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: phones.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn of_type(&self, message_type: MessageType) -> Vec<Sent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.message_type == message_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        customer_id: &str,
        phone_number: &str,
        message_type: MessageType,
        body: &str,
    ) -> Result<(), NotifyError> {
        if self.failing.contains(phone_number) {
            return Err(NotifyError::Delivery {
                phone: phone_number.to_string(),
                reason: "gateway refused".to_string(),
            });
        }
        self.sent.lock().unwrap().push(Sent {
            customer_id: customer_id.to_string(),
            phone: phone_number.to_string(),
            message_type,
            body: body.to_string(),
        });
        Ok(())
    }
}

struct Harness {
    _db: Database,
    clock: Arc<ManualClock>,
    notifier: Arc<RecordingNotifier>,
    ctx: ServiceContext,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

fn months_after(start: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    start.checked_add_months(Months::new(months)).unwrap()
}

async fn harness_with(config: LoyaltyConfig, notifier: RecordingNotifier) -> Harness {
    let db = Database::in_memory().await.unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let notifier = Arc::new(notifier);
    let ctx = ServiceContext::from_parts(
        db.pool().clone(),
        config,
        clock.clone() as Arc<dyn Clock>,
        notifier.clone() as Arc<dyn Notifier>,
        Arc::new(InMemoryStatsCache::new(std::time::Duration::from_secs(300))),
    );
    Harness {
        _db: db,
        clock,
        notifier,
        ctx,
    }
}

async fn harness() -> Harness {
    harness_with(LoyaltyConfig::default(), RecordingNotifier::default()).await
}

async fn register(h: &Harness, name: &str, phone: &str) -> String {
    CustomerService::new(&h.ctx)
        .register(name, phone, None)
        .await
        .unwrap()
        .customer_id
}

async fn assert_consistent(h: &Harness, customer_id: &str) {
    let report = LedgerService::new(&h.ctx).verify(customer_id).await.unwrap();
    assert!(report.is_consistent(), "inconsistent ledger: {:?}", report);
}

#[tokio::test]
async fn test_earn_credits_balance_and_batch() {
    let h = harness().await;
    let id = register(&h, "Asha", "9876543210").await;

    let result = AccrualEngine::new(&h.ctx)
        .earn(&id, dec!(500), "Grocery")
        .await
        .unwrap();

    assert_eq!(result.points_earned, 50);
    assert_eq!(result.new_balance, 50);
    assert_eq!(result.expires_at, months_after(t0(), 6));
    assert_eq!(result.expired_points, 0);

    let batch = BatchRepo::get_by_id(h.ctx.pool(), result.batch_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.earned_points, 50);
    assert_eq!(batch.remaining_points, 50);

    let history = LedgerService::new(&h.ctx).history(&id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, EntryKind::Earn);
    assert_eq!(history[0].balance_after, 50);
    assert_eq!(history[0].purchase_amount, Some(dec!(500)));

    assert_consistent(&h, &id).await;
}

#[tokio::test]
async fn test_points_round_down_and_tiny_purchase_rejected() {
    let h = harness().await;
    let id = register(&h, "Asha", "9876543210").await;
    let accrual = AccrualEngine::new(&h.ctx);

    assert_eq!(accrual.earn(&id, dec!(499), "Purchase").await.unwrap().points_earned, 49);

    let err = accrual.earn(&id, dec!(9), "Purchase").await.unwrap_err();
    assert_eq!(err.reason_code(), "purchase_too_small");
    let err = accrual.earn(&id, dec!(0), "Purchase").await.unwrap_err();
    assert_eq!(err.reason_code(), "invalid_amount");

    let customer = CustomerService::new(&h.ctx).get(&id).await.unwrap();
    assert_eq!(customer.balance, 49);
    assert_eq!(LedgerService::new(&h.ctx).history(&id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_redeem_consumes_soonest_expiring_batches_first() {
    let h = harness().await;
    let id = register(&h, "Asha", "9876543210").await;
    let accrual = AccrualEngine::new(&h.ctx);

    for _ in 0..3 {
        accrual.earn(&id, dec!(50), "Purchase").await.unwrap();
        h.clock.advance(Duration::days(1));
    }

    let result = RedemptionEngine::new(&h.ctx)
        .redeem(&id, 7, "Voucher")
        .await
        .unwrap();
    assert_eq!(result.new_balance, 8);
    assert_eq!(result.batches_consumed, 2);

    let summary = CustomerService::new(&h.ctx).points_summary(&id).await.unwrap();
    let remaining: Vec<i64> = summary.batches.iter().map(|b| b.remaining_points).collect();
    assert_eq!(remaining, vec![3, 5]);
    assert_eq!(summary.next_expiry().unwrap().expires_at, months_after(t0() + Duration::days(1), 6));

    let history = LedgerService::new(&h.ctx).history(&id).await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.kind, EntryKind::Redeem);
    assert_eq!(last.points, -7);
    assert_eq!(last.balance_after, 8);

    assert_consistent(&h, &id).await;
}

#[tokio::test]
async fn test_insufficient_balance_changes_nothing() {
    let h = harness().await;
    let id = register(&h, "Asha", "9876543210").await;
    AccrualEngine::new(&h.ctx).earn(&id, dec!(400), "Purchase").await.unwrap();
    let redemption = RedemptionEngine::new(&h.ctx);

    let err = redemption.redeem(&id, 41, "Too much").await.unwrap_err();
    match err {
        BusinessError::InsufficientBalance {
            requested,
            available,
        } => {
            assert_eq!(requested, 41);
            assert_eq!(available, 40);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(CustomerService::new(&h.ctx).get(&id).await.unwrap().balance, 40);
    assert_eq!(LedgerService::new(&h.ctx).history(&id).await.unwrap().len(), 1);

    let result = redemption.redeem(&id, 40, "Everything").await.unwrap();
    assert_eq!(result.new_balance, 0);

    let err = redemption.redeem(&id, 0, "Nothing").await.unwrap_err();
    assert_eq!(err.reason_code(), "invalid_amount");

    assert_consistent(&h, &id).await;
}

#[tokio::test]
async fn test_earn_earn_redeem_scenario() {
    let h = harness().await;
    let id = register(&h, "Asha", "9876543210").await;
    let accrual = AccrualEngine::new(&h.ctx);

    accrual.earn(&id, dec!(500), "Purchase").await.unwrap();
    h.clock.advance(Duration::hours(2));
    let second = accrual.earn(&id, dec!(600), "Purchase").await.unwrap();
    assert_eq!(second.new_balance, 110);

    let result = RedemptionEngine::new(&h.ctx).redeem(&id, 100, "Gift").await.unwrap();
    assert_eq!(result.new_balance, 10);
    assert_eq!(result.batches_consumed, 2);

    let summary = CustomerService::new(&h.ctx).points_summary(&id).await.unwrap();
    assert_eq!(summary.batches.len(), 1);
    assert_eq!(summary.batches[0].batch_id, second.batch_id);
    assert_eq!(summary.batches[0].remaining_points, 10);

    let balances: Vec<i64> = LedgerService::new(&h.ctx)
        .history(&id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.balance_after)
        .collect();
    assert_eq!(balances, vec![50, 110, 10]);
    assert_consistent(&h, &id).await;
}

#[tokio::test]
async fn test_lazy_expiry_is_idempotent() {
    let h = harness().await;
    let id = register(&h, "Asha", "9876543210").await;
    AccrualEngine::new(&h.ctx).earn(&id, dec!(500), "Purchase").await.unwrap();

    h.clock.set(months_after(t0(), 6) + Duration::days(1));
    let customers = CustomerService::new(&h.ctx);

    let first = customers.points_summary(&id).await.unwrap();
    assert_eq!(first.expired_points, 50);
    assert_eq!(first.customer.balance, 0);
    assert!(first.batches.is_empty());

    let second = customers.points_summary(&id).await.unwrap();
    assert_eq!(second.expired_points, 0);
    assert_eq!(second.customer.balance, 0);

    let history = LedgerService::new(&h.ctx).history(&id).await.unwrap();
    let expiries: Vec<_> = history.iter().filter(|e| e.kind == EntryKind::Expiry).collect();
    assert_eq!(expiries.len(), 1);
    assert_eq!(expiries[0].points, -50);
    assert_eq!(expiries[0].balance_after, 0);

    assert_consistent(&h, &id).await;
}

#[tokio::test]
async fn test_batch_expires_exactly_at_deadline() {
    let h = harness().await;
    let id = register(&h, "Asha", "9876543210").await;
    AccrualEngine::new(&h.ctx).earn(&id, dec!(500), "Purchase").await.unwrap();

    h.clock.set(months_after(t0(), 6) - Duration::seconds(1));
    let summary = CustomerService::new(&h.ctx).points_summary(&id).await.unwrap();
    assert_eq!(summary.customer.balance, 50);

    h.clock.set(months_after(t0(), 6));
    let summary = CustomerService::new(&h.ctx).points_summary(&id).await.unwrap();
    assert_eq!(summary.customer.balance, 0);
    assert_eq!(summary.expired_points, 50);
}

#[tokio::test]
async fn test_redeem_after_partial_expiry() {
    let h = harness().await;
    let id = register(&h, "Asha", "9876543210").await;
    let accrual = AccrualEngine::new(&h.ctx);

    accrual.earn(&id, dec!(500), "Old purchase").await.unwrap();
    h.clock.set(months_after(t0(), 3));
    accrual.earn(&id, dec!(600), "New purchase").await.unwrap();
    h.clock.set(months_after(t0(), 6) + Duration::days(1));

    let redemption = RedemptionEngine::new(&h.ctx);
    let err = redemption.redeem(&id, 100, "Gift").await.unwrap_err();
    assert_eq!(err.reason_code(), "insufficient_balance");

    // The rejected unit rolled back its reconciliation too
    let stored = CustomerRepo::get_by_id(h.ctx.pool(), &id).await.unwrap();
    assert_eq!(stored.balance, 110);
    let report = LedgerService::new(&h.ctx).verify(&id).await.unwrap();
    assert_eq!(report.pending_expiry, 50);
    assert!(report.is_consistent());

    let result = redemption.redeem(&id, 60, "Gift").await.unwrap();
    assert_eq!(result.expired_points, 50);
    assert_eq!(result.new_balance, 0);

    let kinds: Vec<EntryKind> = LedgerService::new(&h.ctx)
        .history(&id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![EntryKind::Earn, EntryKind::Earn, EntryKind::Expiry, EntryKind::Redeem]
    );
    assert_consistent(&h, &id).await;
}

#[tokio::test]
async fn test_concurrent_redemptions_never_overdraw() {
    let h = harness().await;
    let id = register(&h, "Asha", "9876543210").await;
    AccrualEngine::new(&h.ctx).earn(&id, dec!(500), "Purchase").await.unwrap();

    let redemption = RedemptionEngine::new(&h.ctx);
    let (a, b) = tokio::join!(
        redemption.redeem(&id, 30, "Till 1"),
        redemption.redeem(&id, 30, "Till 2")
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert_eq!(CustomerService::new(&h.ctx).get(&id).await.unwrap().balance, 20);
    assert_consistent(&h, &id).await;
}

#[tokio::test]
async fn test_unknown_customer() {
    let h = harness().await;
    let err = AccrualEngine::new(&h.ctx)
        .earn("99999999", dec!(100), "Purchase")
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), "customer_not_found");
    assert!(!err.is_fatal());

    let err = RedemptionEngine::new(&h.ctx)
        .redeem("99999999", 10, "Gift")
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), "customer_not_found");
}

#[tokio::test]
async fn test_register_sends_welcome_and_rejects_duplicate_phone() {
    let h = harness().await;
    let customers = CustomerService::new(&h.ctx);

    let customer = customers.register("Asha", " 9876543210 ", Some("12 Main St")).await.unwrap();
    assert_eq!(customer.customer_id.len(), 8);
    assert_eq!(customer.phone_number, "9876543210");
    assert_eq!(customer.balance, 0);

    let err = customers.register("Other", "9876543210", None).await.unwrap_err();
    assert_eq!(err.reason_code(), "duplicate_phone");
    let err = customers.register("Short", "12345", None).await.unwrap_err();
    assert!(!err.is_fatal());

    h.ctx.flush().await;
    let welcome = h.notifier.of_type(MessageType::Welcome);
    assert_eq!(welcome.len(), 1);
    assert_eq!(welcome[0].customer_id, customer.customer_id);
    assert!(welcome[0].body.contains(&customer.customer_id));

    let found = customers.search(Some("98765")).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(customers.search(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_receipts_follow_commits() {
    let h = harness().await;
    let id = register(&h, "Asha", "9876543210").await;
    AccrualEngine::new(&h.ctx).earn(&id, dec!(500), "Purchase").await.unwrap();
    RedemptionEngine::new(&h.ctx).redeem(&id, 20, "Gift").await.unwrap();
    let _ = RedemptionEngine::new(&h.ctx).redeem(&id, 500, "Gift").await;

    h.ctx.flush().await;
    let receipts = h.notifier.of_type(MessageType::Txn);
    assert_eq!(receipts.len(), 2);
    assert!(receipts.iter().all(|m| m.phone == "9876543210"));
    assert!(receipts.iter().any(|m| m.body.contains("earned 50 points")));
    assert!(receipts.iter().any(|m| m.body.contains("balance: 30 points")));
}

#[tokio::test]
async fn test_sweep_expires_everyone_once() {
    let h = harness().await;
    let a = register(&h, "Asha", "9876543210").await;
    let b = register(&h, "Bala", "9123456780").await;
    let accrual = AccrualEngine::new(&h.ctx);
    accrual.earn(&a, dec!(500), "Purchase").await.unwrap();
    accrual.earn(&a, dec!(300), "Purchase").await.unwrap();
    accrual.earn(&b, dec!(200), "Purchase").await.unwrap();

    h.clock.set(months_after(t0(), 7));
    let sweep = SweepJob::new(&h.ctx);

    let first = sweep.sweep().await.unwrap();
    assert_eq!(first.expired_batch_count, 3);
    assert_eq!(first.expired_points, 100);
    assert_eq!(first.customers_affected, 2);
    assert_eq!(first.cleanup_failures, 0);

    let second = sweep.sweep().await.unwrap();
    assert_eq!(second.expired_batch_count, 0);
    assert_eq!(second.expired_points, 0);
    assert_eq!(second.customers_affected, 0);

    for id in [&a, &b] {
        assert_eq!(CustomerService::new(&h.ctx).get(id).await.unwrap().balance, 0);
        assert_consistent(&h, id).await;
    }
}

#[tokio::test]
async fn test_sweep_warns_customers_with_points_expiring_soon() {
    let h = harness_with(
        LoyaltyConfig::default(),
        RecordingNotifier::failing_for(&["9000000001"]),
    )
    .await;
    let soon = register(&h, "Asha", "9876543210").await;
    let failing = register(&h, "Chen", "9000000001").await;
    let accrual = AccrualEngine::new(&h.ctx);
    accrual.earn(&soon, dec!(500), "Purchase").await.unwrap();
    accrual.earn(&failing, dec!(300), "Purchase").await.unwrap();

    h.clock.set(months_after(t0(), 6) - Duration::days(3));
    let fresh = register(&h, "Bala", "9123456780").await;
    accrual.earn(&fresh, dec!(200), "Purchase").await.unwrap();

    let report = SweepJob::new(&h.ctx).sweep().await.unwrap();
    assert_eq!(report.expired_batch_count, 0);
    assert_eq!(report.expiring_soon_customers, 2);
    assert_eq!(report.notifications_sent, 1);
    assert_eq!(report.notifications_failed, 1);

    let warnings = h.notifier.of_type(MessageType::Expiry);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].customer_id, soon);
    assert!(warnings[0].body.contains("50"));

    // Warnings never touch balances
    assert_eq!(CustomerService::new(&h.ctx).get(&soon).await.unwrap().balance, 50);
}

#[tokio::test]
async fn test_list_filters_and_summarises() {
    let h = harness().await;
    let a = register(&h, "Asha", "9876543210").await;
    let b = register(&h, "Bala", "9123456780").await;
    let accrual = AccrualEngine::new(&h.ctx);
    accrual.earn(&a, dec!(500), "Grocery run").await.unwrap();
    h.clock.advance(Duration::minutes(5));
    accrual.earn(&a, dec!(250.50), "Pharmacy").await.unwrap();
    h.clock.advance(Duration::minutes(5));
    RedemptionEngine::new(&h.ctx).redeem(&a, 30, "Voucher").await.unwrap();
    h.clock.advance(Duration::minutes(5));
    accrual.earn(&b, dec!(1000), "Grocery").await.unwrap();

    let ledger = LedgerService::new(&h.ctx);

    let everything = ledger.list(&LedgerQuery::default()).await.unwrap();
    assert_eq!(everything.total, 4);
    assert_eq!(everything.summary.total_earned, 50 + 25 + 100);
    assert_eq!(everything.summary.total_redeemed, 30);
    assert_eq!(everything.summary.total_purchase_amount, dec!(1750.50));
    // Newest first by default
    assert_eq!(everything.entries[0].entry.customer_id, b);
    assert_eq!(everything.entries[0].customer_name, "Bala");

    let query = LedgerQuery {
        filter: LedgerFilter::for_customer(&a).with_kinds(&[EntryKind::Earn]),
        ..LedgerQuery::default()
    };
    let earns = ledger.list(&query).await.unwrap();
    assert_eq!(earns.total, 2);
    assert_eq!(earns.summary.redeem_count, 0);

    let mut search = LedgerQuery::default();
    search.filter.search = Some("grocery".to_string());
    assert_eq!(ledger.list(&search).await.unwrap().total, 2);

    let paged = LedgerQuery {
        page: Pagination {
            limit: 3,
            offset: 0,
        },
        ..LedgerQuery::default()
    };
    let page = ledger.list(&paged).await.unwrap();
    assert_eq!(page.entries.len(), 3);
    assert!(page.has_more);

    let bad = LedgerQuery {
        page: Pagination {
            limit: 0,
            offset: 0,
        },
        ..LedgerQuery::default()
    };
    assert_eq!(ledger.list(&bad).await.unwrap_err().reason_code(), "invalid_input");
}

#[tokio::test]
async fn test_daily_report_is_stored_and_sent_to_admin() {
    let config = LoyaltyConfig {
        admin_phone: Some("9999999999".to_string()),
        ..LoyaltyConfig::default()
    };
    let h = harness_with(config, RecordingNotifier::default()).await;
    let a = register(&h, "Asha", "9876543210").await;
    let accrual = AccrualEngine::new(&h.ctx);
    accrual.earn(&a, dec!(500), "Purchase").await.unwrap();
    accrual.earn(&a, dec!(120.25), "Purchase").await.unwrap();
    RedemptionEngine::new(&h.ctx).redeem(&a, 10, "Gift").await.unwrap();

    // Activity on the next day stays out of the report
    h.clock.advance(Duration::days(1));
    register(&h, "Bala", "9123456780").await;

    let reports = ReportService::new(&h.ctx);
    let report = reports.daily_report(t0().date_naive()).await.unwrap();
    assert_eq!(report.new_customers, 1);
    assert_eq!(report.total_customers, 2);
    assert_eq!(report.points_earned, 62);
    assert_eq!(report.points_redeemed, 10);
    assert_eq!(report.points_expired, 0);
    assert_eq!(report.transaction_count, 3);
    assert_eq!(report.total_purchase_amount, dec!(620.25));

    let stored = reports.stored_report(t0().date_naive()).await.unwrap().unwrap();
    assert_eq!(stored, report);

    // Re-running replaces the stored row
    let again = reports.daily_report(t0().date_naive()).await.unwrap();
    assert_eq!(again.points_earned, 62);

    h.ctx.flush().await;
    let admin = h.notifier.of_type(MessageType::DailyReport);
    assert_eq!(admin.len(), 2);
    assert_eq!(admin[0].customer_id, "ADMIN");
    assert_eq!(admin[0].phone, "9999999999");
}

#[tokio::test]
async fn test_program_stats_refresh_after_balance_change() {
    let h = harness().await;
    let id = register(&h, "Asha", "9876543210").await;
    AccrualEngine::new(&h.ctx).earn(&id, dec!(500), "Purchase").await.unwrap();
    h.ctx.flush().await;

    let reports = ReportService::new(&h.ctx);
    let stats = reports.program_stats().await.unwrap();
    assert_eq!(stats.total_customers, 1);
    assert_eq!(stats.points_issued, 50);
    assert_eq!(stats.outstanding_balance, 50);

    RedemptionEngine::new(&h.ctx).redeem(&id, 20, "Gift").await.unwrap();
    h.ctx.flush().await;

    let stats = reports.program_stats().await.unwrap();
    assert_eq!(stats.points_redeemed, 20);
    assert_eq!(stats.outstanding_balance, 30);
    assert_eq!(stats.total_entries, 2);
}

#[tokio::test]
async fn test_last_instant_of_day_is_reported() {
    let h = harness().await;
    let id = register(&h, "Asha", "9876543210").await;
    let day = t0().date_naive();
    let next_midnight =
        Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).unwrap()) + Duration::days(1);

    h.clock.set(next_midnight - Duration::microseconds(500));
    AccrualEngine::new(&h.ctx).earn(&id, dec!(500), "Late purchase").await.unwrap();

    let reports = ReportService::new(&h.ctx);
    let report = reports.daily_report(day).await.unwrap();
    assert_eq!(report.points_earned, 50);
    assert_eq!(report.transaction_count, 1);
    assert_eq!(report.total_purchase_amount, dec!(500));

    let mut today = LedgerQuery::default();
    today.filter.preset = Some(DatePreset::Today);
    let page = LedgerService::new(&h.ctx).list(&today).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.summary.total_earned, 50);

    let next = reports.daily_report(day.succ_opt().unwrap()).await.unwrap();
    assert_eq!(next.points_earned, 0);
    assert_eq!(next.new_customers, 0);
}

#[tokio::test]
async fn test_balance_above_batches_is_fatal_and_rolled_back() {
    let h = harness().await;
    let id = register(&h, "Asha", "9876543210").await;
    let earned = AccrualEngine::new(&h.ctx).earn(&id, dec!(500), "Purchase").await.unwrap();

    // Out-of-band credit with no batch behind it
    CustomerRepo::credit(h.ctx.pool(), &id, 30).await.unwrap();

    let err = RedemptionEngine::new(&h.ctx).redeem(&id, 70, "Gift").await.unwrap_err();
    assert_eq!(err.reason_code(), "consistency_violation");
    assert!(err.is_fatal());
    assert_eq!(err.public_message(), "Operation failed; no changes were applied");

    assert_eq!(CustomerRepo::get_by_id(h.ctx.pool(), &id).await.unwrap().balance, 80);
    let batch = BatchRepo::get_by_id(h.ctx.pool(), earned.batch_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.remaining_points, 50);
    assert_eq!(LedgerService::new(&h.ctx).history(&id).await.unwrap().len(), 1);

    let report = LedgerService::new(&h.ctx).verify(&id).await.unwrap();
    assert!(!report.is_consistent());
}

#[tokio::test]
async fn test_sweep_failure_is_isolated_to_one_customer() {
    let h = harness().await;
    let broken = register(&h, "Asha", "9876543210").await;
    let healthy = register(&h, "Bala", "9123456780").await;
    let accrual = AccrualEngine::new(&h.ctx);
    accrual.earn(&broken, dec!(500), "Purchase").await.unwrap();
    accrual.earn(&healthy, dec!(200), "Purchase").await.unwrap();

    // Balance now lower than the batch that will expire
    assert_eq!(
        CustomerRepo::debit_guarded(h.ctx.pool(), &broken, 40).await.unwrap(),
        Some(10)
    );

    h.clock.set(months_after(t0(), 7));
    let report = SweepJob::new(&h.ctx).sweep().await.unwrap();
    assert_eq!(report.cleanup_failures, 1);
    assert_eq!(report.customers_affected, 1);
    assert_eq!(report.expired_batch_count, 1);
    assert_eq!(report.expired_points, 20);

    assert_eq!(CustomerService::new(&h.ctx).get(&healthy).await.unwrap().balance, 0);
    assert_consistent(&h, &healthy).await;

    assert_eq!(CustomerRepo::get_by_id(h.ctx.pool(), &broken).await.unwrap().balance, 10);
    let batches = BatchRepo::all_for_customer(h.ctx.pool(), &broken).await.unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].remaining_points, 50);
    assert_eq!(LedgerService::new(&h.ctx).history(&broken).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_sweep_warnings_span_several_chunks() {
    let config = LoyaltyConfig {
        notification_chunk_size: 1,
        ..LoyaltyConfig::default()
    };
    let h = harness_with(config, RecordingNotifier::failing_for(&["9000000003"])).await;
    let accrual = AccrualEngine::new(&h.ctx);
    let mut ids = Vec::new();
    for (name, phone) in [
        ("Asha", "9000000001"),
        ("Bala", "9000000002"),
        ("Chen", "9000000003"),
        ("Dina", "9000000004"),
    ] {
        let id = register(&h, name, phone).await;
        accrual.earn(&id, dec!(100), "Purchase").await.unwrap();
        ids.push(id);
    }

    h.clock.set(months_after(t0(), 6) - Duration::days(2));
    let report = SweepJob::new(&h.ctx).sweep().await.unwrap();
    assert_eq!(report.expiring_soon_customers, 4);
    assert_eq!(report.notifications_sent, 3);
    assert_eq!(report.notifications_failed, 1);

    let mut warned: Vec<String> = h
        .notifier
        .of_type(MessageType::Expiry)
        .into_iter()
        .map(|m| m.customer_id)
        .collect();
    warned.sort();
    let mut expected = vec![ids[0].clone(), ids[1].clone(), ids[3].clone()];
    expected.sort();
    assert_eq!(warned, expected);
}
