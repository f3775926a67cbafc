//! Programme statistics and daily reports

use crate::error::BusinessResult;
use crate::notify::ADMIN_RECIPIENT;
use crate::services::ServiceContext;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use loyalty_core::{EntryKind, MessageType};
use loyalty_persistence::{
    parse_decimal, CustomerRepo, DailyReportRepo, DailyReportRow, KindTotalsRow, LedgerRepo,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Whole-programme aggregates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramStats {
    pub total_customers: i64,
    pub total_entries: i64,
    pub points_issued: i64,
    /// Absolute value
    pub points_redeemed: i64,
    /// Absolute value
    pub points_expired: i64,
    /// Sum of current balances
    pub outstanding_balance: i64,
}

/// Statistics for one UTC day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub new_customers: i64,
    pub total_customers: i64,
    pub points_earned: i64,
    pub points_redeemed: i64,
    pub points_expired: i64,
    /// EARN and REDEEM entries
    pub transaction_count: i64,
    pub total_purchase_amount: Decimal,
    pub generated_at: DateTime<Utc>,
}

impl DailyReport {
    fn to_row(&self) -> DailyReportRow {
        DailyReportRow {
            report_date: self.date,
            new_customers: self.new_customers,
            total_customers: self.total_customers,
            points_earned: self.points_earned,
            points_redeemed: self.points_redeemed,
            points_expired: self.points_expired,
            transaction_count: self.transaction_count,
            total_purchase_amount: self.total_purchase_amount.to_string(),
            generated_at: self.generated_at,
        }
    }

    pub fn summary_line(&self) -> String {
        format!(
            "Daily report {}: {} new customers ({} total), {} pts earned, {} redeemed, {} expired, {} transactions, purchases {}",
            self.date,
            self.new_customers,
            self.total_customers,
            self.points_earned,
            self.points_redeemed,
            self.points_expired,
            self.transaction_count,
            self.total_purchase_amount
        )
    }
}

#[derive(Default)]
struct KindTotals {
    earned: i64,
    redeemed: i64,
    expired: i64,
    earn_entries: i64,
    redeem_entries: i64,
    entries: i64,
}

impl KindTotals {
    fn from_rows(rows: Vec<KindTotalsRow>) -> Self {
        let mut totals = Self::default();
        for row in rows {
            totals.entries += row.entries;
            match EntryKind::from_str(&row.kind) {
                Ok(EntryKind::Earn) => {
                    totals.earned = row.points;
                    totals.earn_entries = row.entries;
                }
                Ok(EntryKind::Redeem) => {
                    totals.redeemed = row.points.abs();
                    totals.redeem_entries = row.entries;
                }
                Ok(EntryKind::Expiry) => totals.expired = row.points.abs(),
                Err(_) => tracing::warn!(kind = %row.kind, "Unknown ledger kind in totals"),
            }
        }
        totals
    }
}

pub struct ReportService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> ReportService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Programme totals, served from the stats cache when fresh
    pub async fn program_stats(&self) -> BusinessResult<ProgramStats> {
        if let Some(stats) = self.ctx.stats_cache().get() {
            tracing::debug!("Program stats served from cache");
            return Ok(stats);
        }

        // Taken before reading so a commit landing mid-read is not cached
        let generation = self.ctx.stats_cache().generation();
        let pool = self.ctx.pool();
        let totals = KindTotals::from_rows(LedgerRepo::totals_by_kind(pool, None, None).await?);
        let stats = ProgramStats {
            total_customers: CustomerRepo::count(pool).await?,
            total_entries: LedgerRepo::count(pool).await?,
            points_issued: totals.earned,
            points_redeemed: totals.redeemed,
            points_expired: totals.expired,
            outstanding_balance: CustomerRepo::total_balance(pool).await?,
        };

        self.ctx.stats_cache().put(generation, stats.clone());
        Ok(stats)
    }

    /// Compute and store the report for `date`, replacing any earlier run.
    ///
    /// The admin summary message is best-effort.
    pub async fn daily_report(&self, date: NaiveDate) -> BusinessResult<DailyReport> {
        // [midnight, next midnight)
        let start = Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN));
        let end = start + Duration::days(1);
        let pool = self.ctx.pool();

        let totals =
            KindTotals::from_rows(LedgerRepo::totals_by_kind(pool, Some(start), Some(end)).await?);
        let total_purchase_amount = LedgerRepo::purchase_amounts(pool, Some(start), Some(end))
            .await?
            .iter()
            .map(|raw| parse_decimal(raw))
            .sum::<Result<Decimal, _>>()?;

        let report = DailyReport {
            date,
            new_customers: CustomerRepo::count_created_between(pool, start, end).await?,
            total_customers: CustomerRepo::count(pool).await?,
            points_earned: totals.earned,
            points_redeemed: totals.redeemed,
            points_expired: totals.expired,
            transaction_count: totals.earn_entries + totals.redeem_entries,
            total_purchase_amount,
            generated_at: self.ctx.now(),
        };

        DailyReportRepo::upsert(pool, &report.to_row()).await?;
        tracing::info!(
            %date,
            entries = totals.entries,
            points_earned = report.points_earned,
            "Daily report stored"
        );

        if let Some(phone) = self.ctx.config().admin_phone.as_deref() {
            if let Err(e) = self
                .ctx
                .notifier()
                .notify(ADMIN_RECIPIENT, phone, MessageType::DailyReport, &report.summary_line())
                .await
            {
                tracing::warn!(error = %e, "Daily report message not delivered");
            }
        }

        Ok(report)
    }

    /// Previously stored report, if any
    pub async fn stored_report(&self, date: NaiveDate) -> BusinessResult<Option<DailyReport>> {
        let Some(row) = DailyReportRepo::get(self.ctx.pool(), date).await? else {
            return Ok(None);
        };
        Ok(Some(DailyReport {
            date: row.report_date,
            new_customers: row.new_customers,
            total_customers: row.total_customers,
            points_earned: row.points_earned,
            points_redeemed: row.points_redeemed,
            points_expired: row.points_expired,
            transaction_count: row.transaction_count,
            total_purchase_amount: row.total_purchase_amount()?,
            generated_at: row.generated_at,
        }))
    }
}
