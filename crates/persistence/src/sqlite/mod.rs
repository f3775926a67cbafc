//! SQLite persistence module
//!
//! Repository pattern for SQLite database access.

pub mod query;
pub mod repos;
pub mod schema;

pub use query::LedgerQueryRepo;
pub use repos::{
    create_pool, init_database, init_memory_database, run_migrations, BatchRepo, CustomerRepo,
    DailyReportRepo, LedgerRepo, MessageLogRepo,
};
pub use schema::{
    BatchRow, CustomerRow, DailyReportRow, ExpiredGroupRow, ExpiringGroupRow, KindTotalsRow,
    LedgerEntryRow, LedgerRecordRow, MessageLogRow, NewLedgerEntry,
};
