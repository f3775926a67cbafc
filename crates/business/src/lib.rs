//! # Loyalty Business
//!
//! The points ledger engine and the services around it.
//!
//! ```text
//!   earn / redeem / points_summary / sweep
//!          │
//!          ▼
//!   ┌──────────────── one transaction per customer ────────────────┐
//!   │ ExpiryReconciler → Accrual / Redemption → balance → ledger   │
//!   └──────────────────────────────────────────────────────────────┘
//!          │ commit
//!          ▼
//!   EventDispatcher ──► NotificationSubscriber ──► Notifier
//!                   └─► CacheInvalidationSubscriber ──► StatsCache
//! ```

pub mod accrual;
pub mod cache;
pub mod config;
pub mod customer;
pub mod dispatch;
pub mod error;
pub mod expiry;
pub mod ledger;
pub mod locks;
pub mod notify;
pub mod redemption;
pub mod reports;
pub mod services;
pub mod sweep;

pub use accrual::AccrualEngine;
pub use cache::{InMemoryStatsCache, StatsCache};
pub use config::LoyaltyConfig;
pub use customer::{CustomerService, PointsSummary};
pub use dispatch::{
    CacheInvalidationSubscriber, DispatchError, EventDispatcher, EventSubscriber,
    NotificationSubscriber,
};
pub use error::{BusinessError, BusinessResult, ErrorKind};
pub use expiry::{ExpiryOutcome, ExpiryReconciler};
pub use ledger::{LedgerService, VerifyReport};
pub use locks::CustomerLocks;
pub use notify::{Notifier, NotifyError, SimulatedNotifier};
pub use redemption::RedemptionEngine;
pub use reports::{DailyReport, ProgramStats, ReportService};
pub use services::{EarnResult, RedeemResult, ServiceContext};
pub use sweep::{SweepJob, SweepReport};
