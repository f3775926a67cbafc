//! # Loyalty Core
//!
//! Domain types for the points ledger. No I/O lives here: the persistence
//! and business crates build on these types.
//!
//! ```text
//! Customer ──< PointsBatch      (spendable remainder of one accrual)
//!     └─────< LedgerEntry      (append-only audit: EARN / REDEEM / EXPIRY)
//! ```

pub mod batch;
pub mod clock;
pub mod customer;
pub mod error;
pub mod event;
pub mod ledger;
pub mod policy;
pub mod query;

pub use batch::{plan_redemption, BatchDraw, PointsBatch, RedemptionPlan};
pub use clock::{Clock, ManualClock, SystemClock};
pub use customer::{generate_membership_id, validate_phone, Customer};
pub use error::{CoreError, CoreResult};
pub use event::{LedgerEvent, MessageType};
pub use ledger::{EntryKind, LedgerEntry};
pub use policy::PointsPolicy;
pub use query::{
    DatePreset, LedgerFilter, LedgerPage, LedgerQuery, LedgerRecord, LedgerSummary, Pagination,
    SortField, SortOrder,
};
