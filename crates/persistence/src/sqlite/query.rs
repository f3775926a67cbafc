//! Ledger listing queries
//!
//! Filters are pushed through `QueryBuilder` so the count, page and
//! summary statements share one WHERE clause.

use crate::error::PersistenceResult;
use crate::sqlite::schema::{parse_decimal, KindTotalsRow, LedgerRecordRow};
use chrono::{DateTime, Utc};
use loyalty_core::{
    EntryKind, LedgerFilter, LedgerPage, LedgerQuery, LedgerRecord, LedgerSummary, SortField,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::{Executor, QueryBuilder, Sqlite, SqliteConnection};
use std::str::FromStr;

const RECORD_COLUMNS: &str = r#"
    SELECT l.entry_id, l.customer_id, l.kind, l.points, l.balance_after,
           l.purchase_amount, l.description, l.created_at,
           c.name AS customer_name, c.phone_number
    FROM ledger_entries l
    JOIN customers c ON c.customer_id = l.customer_id
"#;

fn push_filters(
    qb: &mut QueryBuilder<'_, Sqlite>,
    filter: &LedgerFilter,
    bounds: (Option<DateTime<Utc>>, Option<DateTime<Utc>>),
) {
    qb.push(" WHERE 1 = 1");

    if let Some(customer_id) = &filter.customer_id {
        qb.push(" AND l.customer_id = ").push_bind(customer_id.clone());
    }

    if !filter.kinds.is_empty() {
        qb.push(" AND l.kind IN (");
        let mut kinds = qb.separated(", ");
        for kind in &filter.kinds {
            kinds.push_bind(kind.as_str());
        }
        kinds.push_unseparated(")");
    }

    let (start, end) = bounds;
    if let Some(start) = start {
        qb.push(" AND l.created_at >= ").push_bind(start);
    }
    if let Some(end) = end {
        qb.push(" AND l.created_at < ").push_bind(end);
    }

    // Signed: REDEEM and EXPIRY entries are negative
    if let Some(min) = filter.min_points {
        qb.push(" AND l.points >= ").push_bind(min);
    }
    if let Some(max) = filter.max_points {
        qb.push(" AND l.points <= ").push_bind(max);
    }

    // purchase_amount is TEXT; REAL is precise enough for range filtering
    if let Some(min) = filter.min_purchase.and_then(|d| d.to_f64()) {
        qb.push(" AND CAST(l.purchase_amount AS REAL) >= ").push_bind(min);
    }
    if let Some(max) = filter.max_purchase.and_then(|d| d.to_f64()) {
        qb.push(" AND CAST(l.purchase_amount AS REAL) <= ").push_bind(max);
    }

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        qb.push(" AND LOWER(l.description) LIKE ")
            .push_bind(format!("%{}%", search.to_lowercase()));
    }
}

fn sort_column(field: SortField) -> &'static str {
    match field {
        SortField::CreatedAt => "l.created_at",
        SortField::Points => "l.points",
        SortField::PurchaseAmount => "CAST(l.purchase_amount AS REAL)",
    }
}

/// Read-only queries over the ledger joined with customers
pub struct LedgerQueryRepo;

impl LedgerQueryRepo {
    /// One page of matching entries
    pub async fn records<'e, E>(
        executor: E,
        query: &LedgerQuery,
        now: DateTime<Utc>,
    ) -> PersistenceResult<Vec<LedgerRecord>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(RECORD_COLUMNS);
        push_filters(&mut qb, &query.filter, query.filter.date_bounds(now));

        let order = query.order.as_sql();
        qb.push(format!(
            " ORDER BY {} {order}, l.entry_id {order}",
            sort_column(query.sort)
        ));
        qb.push(" LIMIT ")
            .push_bind(i64::from(query.page.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(query.page.offset));

        let rows = qb
            .build_query_as::<LedgerRecordRow>()
            .fetch_all(executor)
            .await?;

        rows.into_iter().map(LedgerRecord::try_from).collect()
    }

    /// Aggregates over every matching entry
    pub async fn summary(
        conn: &mut SqliteConnection,
        filter: &LedgerFilter,
        now: DateTime<Utc>,
    ) -> PersistenceResult<LedgerSummary> {
        let bounds = filter.date_bounds(now);

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT l.kind, COALESCE(SUM(l.points), 0) AS points, COUNT(*) AS entries \
             FROM ledger_entries l JOIN customers c ON c.customer_id = l.customer_id",
        );
        push_filters(&mut qb, filter, bounds);
        qb.push(" GROUP BY l.kind");
        let totals = qb
            .build_query_as::<KindTotalsRow>()
            .fetch_all(&mut *conn)
            .await?;

        let mut summary = LedgerSummary::default();
        for row in totals {
            match EntryKind::from_str(&row.kind) {
                Ok(EntryKind::Earn) => {
                    summary.total_earned = row.points;
                    summary.earn_count = row.entries;
                }
                Ok(EntryKind::Redeem) => {
                    summary.total_redeemed = row.points.abs();
                    summary.redeem_count = row.entries;
                }
                Ok(EntryKind::Expiry) => {
                    summary.total_expired = row.points.abs();
                    summary.expiry_count = row.entries;
                }
                Err(_) => {
                    tracing::warn!(kind = %row.kind, "Skipping unknown ledger kind in summary");
                    continue;
                }
            }
            summary.total_entries += row.entries;
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT l.purchase_amount \
             FROM ledger_entries l JOIN customers c ON c.customer_id = l.customer_id",
        );
        push_filters(&mut qb, filter, bounds);
        qb.push(" AND l.kind = ")
            .push_bind(EntryKind::Earn.as_str())
            .push(" AND l.purchase_amount IS NOT NULL");
        let amounts: Vec<(String,)> = qb.build_query_as().fetch_all(&mut *conn).await?;

        summary.total_purchase_amount = amounts
            .iter()
            .map(|(amount,)| parse_decimal(amount))
            .sum::<PersistenceResult<Decimal>>()?;

        Ok(summary)
    }

    /// Page plus total and summary, read on a single connection
    pub async fn page(
        conn: &mut SqliteConnection,
        query: &LedgerQuery,
        now: DateTime<Utc>,
    ) -> PersistenceResult<LedgerPage> {
        let entries = Self::records(&mut *conn, query, now).await?;
        let summary = Self::summary(conn, &query.filter, now).await?;
        let total = summary.total_entries;
        let shown = i64::from(query.page.offset) + entries.len() as i64;

        Ok(LedgerPage {
            entries,
            total,
            has_more: shown < total,
            summary,
        })
    }
}
