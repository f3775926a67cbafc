//! # Loyalty Persistence
//!
//! LedgerStore for the loyalty engine, backed by SQLite.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Database                             │
//! │  ┌────────────┐   ┌──────────────┐   ┌────────────────────┐  │
//! │  │ customers  │   │ point_batches│   │  ledger_entries    │  │
//! │  │ (balance)  │   │ (FIFO/expiry)│   │  (append-only)     │  │
//! │  └────────────┘   └──────────────┘   └────────────────────┘  │
//! │        message_logs            daily_reports                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use loyalty_persistence::{CustomerRepo, Database};
//!
//! let db = Database::init_with_migrations("sqlite:loyalty.db").await?;
//!
//! // Standalone read on the pool
//! let customer = CustomerRepo::get_by_id(db.pool(), "10000001").await?;
//!
//! // Unit of work
//! let mut tx = db.pool().begin().await?;
//! let balance = CustomerRepo::credit(&mut *tx, "10000001", 50).await?;
//! tx.commit().await?;
//! ```

pub mod error;
pub mod sqlite;

pub use error::{PersistenceError, PersistenceResult};
pub use sqlite::schema::{
    parse_decimal, BatchRow, CustomerRow, DailyReportRow, ExpiredGroupRow, ExpiringGroupRow,
    KindTotalsRow, LedgerEntryRow, LedgerRecordRow, MessageLogRow, NewLedgerEntry,
};
pub use sqlite::{
    init_database, BatchRepo, CustomerRepo, DailyReportRepo, LedgerQueryRepo, LedgerRepo,
    MessageLogRepo,
};

use sqlx::SqlitePool;

/// Database facade
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to an existing database
    ///
    /// # Arguments
    /// * `db_url` - SQLite database URL (e.g., "sqlite:loyalty.db")
    pub async fn new(db_url: &str) -> PersistenceResult<Self> {
        let pool = sqlite::create_pool(db_url).await?;
        Ok(Self { pool })
    }

    /// Create the database if missing and apply migrations
    pub async fn init_with_migrations(db_url: &str) -> PersistenceResult<Self> {
        let pool = init_database(db_url).await?;
        Ok(Self { pool })
    }

    /// Fresh migrated in-memory database
    pub async fn in_memory() -> PersistenceResult<Self> {
        let pool = sqlite::init_memory_database().await?;
        Ok(Self { pool })
    }

    /// Get SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
