//! Repository implementations for SQLite
//!
//! Every function is generic over `sqlx::Executor`, so callers pass either
//! `&SqlitePool` for standalone reads or `&mut *tx` to take part in a
//! unit of work.

use crate::error::{PersistenceError, PersistenceResult};
use crate::sqlite::schema::*;
use chrono::{DateTime, NaiveDate, Utc};
use loyalty_core::{Customer, EntryKind, MessageType};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Executor, QueryBuilder, Sqlite, SqlitePool};
use std::str::FromStr;

// ============================================================================
// Customer Repository
// ============================================================================

/// Repository for the customers table
pub struct CustomerRepo;

impl CustomerRepo {
    pub async fn insert<'e, E>(executor: E, customer: &Customer) -> PersistenceResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO customers (customer_id, name, phone_number, address, balance, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&customer.customer_id)
        .bind(&customer.name)
        .bind(&customer.phone_number)
        .bind(&customer.address)
        .bind(customer.balance)
        .bind(customer.is_active)
        .bind(customer.created_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn find_by_id<'e, E>(executor: E, id: &str) -> PersistenceResult<Option<CustomerRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, CustomerRow>("SELECT * FROM customers WHERE customer_id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(row)
    }

    pub async fn get_by_id<'e, E>(executor: E, id: &str) -> PersistenceResult<CustomerRow>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        Self::find_by_id(executor, id)
            .await?
            .ok_or_else(|| PersistenceError::not_found("Customer", id))
    }

    pub async fn find_by_phone<'e, E>(
        executor: E,
        phone_number: &str,
    ) -> PersistenceResult<Option<CustomerRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, CustomerRow>("SELECT * FROM customers WHERE phone_number = ?")
            .bind(phone_number)
            .fetch_optional(executor)
            .await?;
        Ok(row)
    }

    /// Customers whose phone, id or name contains `needle`
    pub async fn search<'e, E>(
        executor: E,
        needle: &str,
        limit: i64,
    ) -> PersistenceResult<Vec<CustomerRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let pattern = format!("%{}%", needle);
        let rows = sqlx::query_as::<_, CustomerRow>(
            r#"
            SELECT * FROM customers
            WHERE phone_number LIKE ?1 OR customer_id LIKE ?1 OR name LIKE ?1
            ORDER BY created_at DESC
            LIMIT ?2
            "#,
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Most recently registered customers
    pub async fn recent<'e, E>(executor: E, limit: i64) -> PersistenceResult<Vec<CustomerRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, CustomerRow>(
            "SELECT * FROM customers ORDER BY created_at DESC, customer_id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Add points and return the new balance
    pub async fn credit<'e, E>(executor: E, id: &str, points: i64) -> PersistenceResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row: Option<(i64,)> = sqlx::query_as(
            "UPDATE customers SET balance = balance + ? WHERE customer_id = ? RETURNING balance",
        )
        .bind(points)
        .bind(id)
        .fetch_optional(executor)
        .await?;
        row.map(|(balance,)| balance)
            .ok_or_else(|| PersistenceError::not_found("Customer", id))
    }

    /// Remove points only if the balance covers them.
    ///
    /// Returns `None` when the customer is missing or the balance is
    /// lower than `points`; nothing is written in that case.
    pub async fn debit_guarded<'e, E>(
        executor: E,
        id: &str,
        points: i64,
    ) -> PersistenceResult<Option<i64>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE customers SET balance = balance - ?1
            WHERE customer_id = ?2 AND balance >= ?1
            RETURNING balance
            "#,
        )
        .bind(points)
        .bind(id)
        .fetch_optional(executor)
        .await?;
        Ok(row.map(|(balance,)| balance))
    }

    pub async fn count<'e, E>(executor: E) -> PersistenceResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM customers")
            .fetch_one(executor)
            .await?;
        Ok(row.0)
    }

    /// Customers registered in `[start, end)`
    pub async fn count_created_between<'e, E>(
        executor: E,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PersistenceResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM customers WHERE created_at >= ? AND created_at < ?")
                .bind(start)
                .bind(end)
                .fetch_one(executor)
                .await?;
        Ok(row.0)
    }

    /// Sum of all customer balances
    pub async fn total_balance<'e, E>(executor: E) -> PersistenceResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row: (i64,) = sqlx::query_as("SELECT COALESCE(SUM(balance), 0) FROM customers")
            .fetch_one(executor)
            .await?;
        Ok(row.0)
    }
}

// ============================================================================
// Batch Repository
// ============================================================================

/// Repository for the point_batches table
pub struct BatchRepo;

impl BatchRepo {
    /// Insert a fresh batch (`remaining = earned`) and return its id
    pub async fn insert<'e, E>(
        executor: E,
        customer_id: &str,
        points: i64,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> PersistenceResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            INSERT INTO point_batches (customer_id, earned_points, remaining_points, created_at, expires_at)
            VALUES (?1, ?2, ?2, ?3, ?4)
            "#,
        )
        .bind(customer_id)
        .bind(points)
        .bind(created_at)
        .bind(expires_at)
        .execute(executor)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_by_id<'e, E>(executor: E, batch_id: i64) -> PersistenceResult<Option<BatchRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, BatchRow>("SELECT * FROM point_batches WHERE batch_id = ?")
            .bind(batch_id)
            .fetch_optional(executor)
            .await?;
        Ok(row)
    }

    /// Spendable batches, soonest-to-expire first
    pub async fn live_for_customer<'e, E>(
        executor: E,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> PersistenceResult<Vec<BatchRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, BatchRow>(
            r#"
            SELECT * FROM point_batches
            WHERE customer_id = ? AND remaining_points > 0 AND expires_at > ?
            ORDER BY expires_at ASC, batch_id ASC
            "#,
        )
        .bind(customer_id)
        .bind(now)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Batches past their deadline that still hold points
    pub async fn expired_for_customer<'e, E>(
        executor: E,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> PersistenceResult<Vec<BatchRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, BatchRow>(
            r#"
            SELECT * FROM point_batches
            WHERE customer_id = ? AND remaining_points > 0 AND expires_at <= ?
            ORDER BY expires_at ASC, batch_id ASC
            "#,
        )
        .bind(customer_id)
        .bind(now)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Every batch of the customer regardless of state
    pub async fn all_for_customer<'e, E>(
        executor: E,
        customer_id: &str,
    ) -> PersistenceResult<Vec<BatchRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, BatchRow>(
            "SELECT * FROM point_batches WHERE customer_id = ? ORDER BY expires_at ASC, batch_id ASC",
        )
        .bind(customer_id)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    pub async fn sum_live_for_customer<'e, E>(
        executor: E,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> PersistenceResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(remaining_points), 0) FROM point_batches
            WHERE customer_id = ? AND remaining_points > 0 AND expires_at > ?
            "#,
        )
        .bind(customer_id)
        .bind(now)
        .fetch_one(executor)
        .await?;
        Ok(row.0)
    }

    pub async fn set_remaining<'e, E>(
        executor: E,
        batch_id: i64,
        remaining: i64,
    ) -> PersistenceResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("UPDATE point_batches SET remaining_points = ? WHERE batch_id = ?")
            .bind(remaining)
            .bind(batch_id)
            .execute(executor)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::not_found("PointsBatch", &batch_id.to_string()));
        }
        Ok(())
    }

    /// Delete the given batches, returning how many rows went away
    pub async fn delete_many<'e, E>(executor: E, batch_ids: &[i64]) -> PersistenceResult<u64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        if batch_ids.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM point_batches WHERE batch_id IN (");
        let mut ids = qb.separated(", ");
        for id in batch_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(")");

        let result = qb.build().execute(executor).await?;
        Ok(result.rows_affected())
    }

    /// Overdue batches across all customers, grouped per customer
    pub async fn expired_groups<'e, E>(
        executor: E,
        now: DateTime<Utc>,
    ) -> PersistenceResult<Vec<ExpiredGroupRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, ExpiredGroupRow>(
            r#"
            SELECT customer_id,
                   COUNT(*) AS batch_count,
                   SUM(remaining_points) AS points
            FROM point_batches
            WHERE remaining_points > 0 AND expires_at <= ?
            GROUP BY customer_id
            ORDER BY customer_id
            "#,
        )
        .bind(now)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Batches with `after < expires_at <= until`, grouped per customer
    pub async fn expiring_groups<'e, E>(
        executor: E,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> PersistenceResult<Vec<ExpiringGroupRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, ExpiringGroupRow>(
            r#"
            SELECT b.customer_id,
                   c.name,
                   c.phone_number,
                   COUNT(*) AS batch_count,
                   SUM(b.remaining_points) AS points,
                   MIN(b.expires_at) AS earliest_expiry
            FROM point_batches b
            JOIN customers c ON c.customer_id = b.customer_id
            WHERE b.remaining_points > 0 AND b.expires_at > ? AND b.expires_at <= ?
            GROUP BY b.customer_id, c.name, c.phone_number
            ORDER BY b.customer_id
            "#,
        )
        .bind(after)
        .bind(until)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }
}

// ============================================================================
// Ledger Repository
// ============================================================================

/// Repository for the append-only ledger_entries table
pub struct LedgerRepo;

impl LedgerRepo {
    /// Append an entry and return its id
    pub async fn append<'e, E>(executor: E, entry: &NewLedgerEntry<'_>) -> PersistenceResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            INSERT INTO ledger_entries (customer_id, kind, points, balance_after, purchase_amount, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.customer_id)
        .bind(entry.kind.as_str())
        .bind(entry.points)
        .bind(entry.balance_after)
        .bind(entry.purchase_amount.map(|d| d.to_string()))
        .bind(entry.description)
        .bind(entry.created_at)
        .execute(executor)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Full history of a customer, oldest first
    pub async fn by_customer<'e, E>(
        executor: E,
        customer_id: &str,
    ) -> PersistenceResult<Vec<LedgerEntryRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, LedgerEntryRow>(
            "SELECT * FROM ledger_entries WHERE customer_id = ? ORDER BY created_at ASC, entry_id ASC",
        )
        .bind(customer_id)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    pub async fn sum_for_customer<'e, E>(executor: E, customer_id: &str) -> PersistenceResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row: (i64,) =
            sqlx::query_as("SELECT COALESCE(SUM(points), 0) FROM ledger_entries WHERE customer_id = ?")
                .bind(customer_id)
                .fetch_one(executor)
                .await?;
        Ok(row.0)
    }

    pub async fn count<'e, E>(executor: E) -> PersistenceResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ledger_entries")
            .fetch_one(executor)
            .await?;
        Ok(row.0)
    }

    /// Sum of points by kind, optionally bounded to `[start, end)`
    pub async fn totals_by_kind<'e, E>(
        executor: E,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> PersistenceResult<Vec<KindTotalsRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, KindTotalsRow>(
            r#"
            SELECT kind, COALESCE(SUM(points), 0) AS points, COUNT(*) AS entries
            FROM ledger_entries
            WHERE (?1 IS NULL OR created_at >= ?1) AND (?2 IS NULL OR created_at < ?2)
            GROUP BY kind
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Purchase amounts (TEXT) of EARN entries within `[start, end)`
    pub async fn purchase_amounts<'e, E>(
        executor: E,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> PersistenceResult<Vec<String>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT purchase_amount FROM ledger_entries
            WHERE kind = ?1 AND purchase_amount IS NOT NULL
              AND (?2 IS NULL OR created_at >= ?2) AND (?3 IS NULL OR created_at < ?3)
            "#,
        )
        .bind(EntryKind::Earn.as_str())
        .bind(start)
        .bind(end)
        .fetch_all(executor)
        .await?;
        Ok(rows.into_iter().map(|(amount,)| amount).collect())
    }
}

// ============================================================================
// Message Log Repository
// ============================================================================

/// Repository for the message_logs table
pub struct MessageLogRepo;

impl MessageLogRepo {
    pub async fn insert<'e, E>(
        executor: E,
        customer_id: &str,
        message_type: MessageType,
        content: &str,
        sent: bool,
        created_at: DateTime<Utc>,
    ) -> PersistenceResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            INSERT INTO message_logs (customer_id, message_type, content, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(customer_id)
        .bind(message_type.as_str())
        .bind(content)
        .bind(if sent { "SENT" } else { "FAILED" })
        .bind(created_at)
        .execute(executor)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn by_customer<'e, E>(
        executor: E,
        customer_id: &str,
    ) -> PersistenceResult<Vec<MessageLogRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, MessageLogRow>(
            "SELECT * FROM message_logs WHERE customer_id = ? ORDER BY log_id ASC",
        )
        .bind(customer_id)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }
}

// ============================================================================
// Daily Report Repository
// ============================================================================

/// Repository for the daily_reports table
pub struct DailyReportRepo;

impl DailyReportRepo {
    /// Insert or replace the report for `row.report_date`
    pub async fn upsert<'e, E>(executor: E, row: &DailyReportRow) -> PersistenceResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO daily_reports (
                report_date, new_customers, total_customers, points_earned, points_redeemed,
                points_expired, transaction_count, total_purchase_amount, generated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(report_date) DO UPDATE SET
                new_customers = excluded.new_customers,
                total_customers = excluded.total_customers,
                points_earned = excluded.points_earned,
                points_redeemed = excluded.points_redeemed,
                points_expired = excluded.points_expired,
                transaction_count = excluded.transaction_count,
                total_purchase_amount = excluded.total_purchase_amount,
                generated_at = excluded.generated_at
            "#,
        )
        .bind(row.report_date)
        .bind(row.new_customers)
        .bind(row.total_customers)
        .bind(row.points_earned)
        .bind(row.points_redeemed)
        .bind(row.points_expired)
        .bind(row.transaction_count)
        .bind(&row.total_purchase_amount)
        .bind(row.generated_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn get<'e, E>(executor: E, date: NaiveDate) -> PersistenceResult<Option<DailyReportRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, DailyReportRow>("SELECT * FROM daily_reports WHERE report_date = ?")
            .bind(date)
            .fetch_optional(executor)
            .await?;
        Ok(row)
    }
}

// ============================================================================
// Database initialization
// ============================================================================

/// Open a connection pool
pub async fn create_pool(database_url: &str) -> PersistenceResult<SqlitePool> {
    let pool = SqlitePool::connect(database_url).await?;
    Ok(pool)
}

/// Run migrations
pub async fn run_migrations(pool: &SqlitePool) -> PersistenceResult<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// Create (if missing) and migrate the database at `database_url`
pub async fn init_database(database_url: &str) -> PersistenceResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(options).await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Private in-memory database, migrated and ready.
///
/// A single connection that is never recycled, since every new SQLite
/// memory connection would start from an empty database.
pub async fn init_memory_database() -> PersistenceResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}
