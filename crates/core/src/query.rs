//! # Query Module
//!
//! Read-side contract for listing the ledger: filters, sorting, paging and
//! the page returned. Date presets are resolved against a caller-supplied
//! `now` in UTC.

use crate::ledger::{EntryKind, LedgerEntry};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Named date ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DatePreset {
    Today,
    Yesterday,
    Last7Days,
    Last30Days,
    Last90Days,
    ThisMonth,
    LastMonth,
    ThisYear,
    LastYear,
}

impl FromStr for DatePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "today" => Ok(DatePreset::Today),
            "yesterday" => Ok(DatePreset::Yesterday),
            "last7days" => Ok(DatePreset::Last7Days),
            "last30days" => Ok(DatePreset::Last30Days),
            "last90days" => Ok(DatePreset::Last90Days),
            "thismonth" => Ok(DatePreset::ThisMonth),
            "lastmonth" => Ok(DatePreset::LastMonth),
            "thisyear" => Ok(DatePreset::ThisYear),
            "lastyear" => Ok(DatePreset::LastYear),
            other => Err(format!("unknown date preset: {other}")),
        }
    }
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

fn month_first(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

impl DatePreset {
    /// Half-open `[start, end)` range for this preset.
    ///
    /// Rolling windows have no upper bound: nothing is recorded after `now`.
    pub fn range(&self, now: DateTime<Utc>) -> (DateTime<Utc>, Option<DateTime<Utc>>) {
        let today = now.date_naive();
        let (year, month) = (today.year(), today.month());
        let whole_day =
            |date: NaiveDate| (day_start(date), Some(day_start(date) + Duration::days(1)));
        match self {
            DatePreset::Today => whole_day(today),
            DatePreset::Yesterday => whole_day(today - Duration::days(1)),
            DatePreset::Last7Days => (now - Duration::days(7), None),
            DatePreset::Last30Days => (now - Duration::days(30), None),
            DatePreset::Last90Days => (now - Duration::days(90), None),
            DatePreset::ThisMonth => {
                let (ny, nm) = next_month(year, month);
                (
                    day_start(month_first(year, month)),
                    Some(day_start(month_first(ny, nm))),
                )
            }
            DatePreset::LastMonth => {
                let (py, pm) = previous_month(year, month);
                (
                    day_start(month_first(py, pm)),
                    Some(day_start(month_first(year, month))),
                )
            }
            DatePreset::ThisYear => (
                day_start(month_first(year, 1)),
                Some(day_start(month_first(year + 1, 1))),
            ),
            DatePreset::LastYear => (
                day_start(month_first(year - 1, 1)),
                Some(day_start(month_first(year, 1))),
            ),
        }
    }
}

/// Filters applied to the ledger listing. All fields are optional and
/// combined with AND.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerFilter {
    pub customer_id: Option<String>,
    /// Empty means every kind
    #[serde(default)]
    pub kinds: Vec<EntryKind>,
    /// Takes precedence over `from` / `to`
    pub preset: Option<DatePreset>,
    /// Inclusive lower bound
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound
    pub to: Option<DateTime<Utc>>,
    pub min_points: Option<i64>,
    pub max_points: Option<i64>,
    pub min_purchase: Option<Decimal>,
    pub max_purchase: Option<Decimal>,
    /// Case-insensitive substring of the description
    pub search: Option<String>,
}

impl LedgerFilter {
    pub fn for_customer(customer_id: &str) -> Self {
        Self {
            customer_id: Some(customer_id.to_string()),
            ..Self::default()
        }
    }

    pub fn with_kinds(mut self, kinds: &[EntryKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    /// Resolve the effective `[from, to)` bounds.
    pub fn date_bounds(&self, now: DateTime<Utc>) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        match self.preset {
            Some(preset) => {
                let (start, end) = preset.range(now);
                (Some(start), end)
            }
            None => (self.from, self.to),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    Points,
    PurchaseAmount,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "").as_str() {
            "createdat" | "date" => Ok(SortField::CreatedAt),
            "points" => Ok(SortField::Points),
            "purchaseamount" | "purchase" => Ok(SortField::PurchaseAmount),
            other => Err(format!("unknown sort field: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// Complete listing request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerQuery {
    #[serde(default)]
    pub filter: LedgerFilter,
    #[serde(default)]
    pub sort: SortField,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default)]
    pub page: Pagination,
}

/// Ledger entry joined with the owning customer's contact details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    #[serde(flatten)]
    pub entry: LedgerEntry,
    pub customer_name: String,
    pub phone_number: String,
}

/// Aggregates over every entry matching the filter (not just the page).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub total_earned: i64,
    /// Absolute value
    pub total_redeemed: i64,
    /// Absolute value
    pub total_expired: i64,
    pub earn_count: i64,
    pub redeem_count: i64,
    pub expiry_count: i64,
    pub total_entries: i64,
    pub total_purchase_amount: Decimal,
}

/// One page of the ledger listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerPage {
    pub entries: Vec<LedgerRecord>,
    pub total: i64,
    pub has_more: bool,
    pub summary: LedgerSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_preset_today_and_yesterday() {
        let now = at(2026, 3, 10, 15);
        let (start, end) = DatePreset::Today.range(now);
        assert_eq!(start, at(2026, 3, 10, 0));
        assert_eq!(end, Some(at(2026, 3, 11, 0)));

        let (start, end) = DatePreset::Yesterday.range(now);
        assert_eq!(start, at(2026, 3, 9, 0));
        assert_eq!(end, Some(at(2026, 3, 10, 0)));
    }

    #[test]
    fn test_rolling_presets_are_open_ended() {
        let now = at(2026, 3, 10, 15);
        assert_eq!(DatePreset::Last7Days.range(now), (at(2026, 3, 3, 15), None));
        assert_eq!(DatePreset::Last90Days.range(now).1, None);
    }

    #[test]
    fn test_preset_month_boundaries() {
        let now = at(2026, 1, 20, 8);
        let (start, end) = DatePreset::LastMonth.range(now);
        assert_eq!(start, at(2025, 12, 1, 0));
        assert_eq!(end, Some(at(2026, 1, 1, 0)));

        let (start, end) = DatePreset::ThisMonth.range(at(2026, 12, 5, 0));
        assert_eq!(start, at(2026, 12, 1, 0));
        assert_eq!(end, Some(at(2027, 1, 1, 0)));

        let (start, end) = DatePreset::LastYear.range(at(2026, 6, 1, 0));
        assert_eq!(start, at(2025, 1, 1, 0));
        assert_eq!(end, Some(at(2026, 1, 1, 0)));
    }

    #[test]
    fn test_preset_parse() {
        assert_eq!("last7days".parse::<DatePreset>().unwrap(), DatePreset::Last7Days);
        assert_eq!("thisMonth".parse::<DatePreset>().unwrap(), DatePreset::ThisMonth);
        assert!("fortnight".parse::<DatePreset>().is_err());
    }

    #[test]
    fn test_filter_preset_overrides_explicit_range() {
        let now = at(2026, 3, 10, 15);
        let filter = LedgerFilter {
            preset: Some(DatePreset::Today),
            from: Some(at(2020, 1, 1, 0)),
            ..LedgerFilter::default()
        };
        let (start, _) = filter.date_bounds(now);
        assert_eq!(start, Some(at(2026, 3, 10, 0)));

        let explicit = LedgerFilter {
            from: Some(at(2020, 1, 1, 0)),
            ..LedgerFilter::default()
        };
        assert_eq!(explicit.date_bounds(now), (Some(at(2020, 1, 1, 0)), None));
    }

    #[test]
    fn test_sort_field_parse() {
        assert_eq!("createdAt".parse::<SortField>().unwrap(), SortField::CreatedAt);
        assert_eq!("purchase_amount".parse::<SortField>().unwrap(), SortField::PurchaseAmount);
    }
}
