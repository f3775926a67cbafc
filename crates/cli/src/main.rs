//! Loyalty CLI - points ledger operations from the command line
//!
//! Usage:
//! ```bash
//! loyalty init
//! loyalty customer register --name "Asha" --phone 9876543210
//! loyalty earn 48213377 500
//! loyalty redeem 48213377 100
//! loyalty ledger --customer 48213377 --preset last30days --json
//! loyalty sweep
//! loyalty report daily --date 2026-10-15
//! ```

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use loyalty_core::{DatePreset, EntryKind, SortField, SortOrder};
use rust_decimal::Decimal;
use std::path::PathBuf;

mod commands;
mod db;

use commands::{customer, ledger, points, report};

/// Loyalty - retail points ledger with FIFO-by-expiry redemption
#[derive(Parser)]
#[command(name = "loyalty")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Database file path
    #[arg(long, default_value = "data/loyalty.db", global = true)]
    pub db: PathBuf,

    /// JSON configuration file (earn rate, validity, notification settings)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Customer management
    Customer {
        #[command(subcommand)]
        action: CustomerAction,
    },

    /// Earn points for a purchase
    Earn {
        /// Membership number
        customer_id: String,
        /// Purchase amount
        purchase_amount: Decimal,
        #[arg(long, short, default_value = "Purchase")]
        description: String,
    },

    /// Redeem points
    Redeem {
        /// Membership number
        customer_id: String,
        /// Points to redeem
        points: i64,
        #[arg(long, short, default_value = "Redemption")]
        description: String,
    },

    /// List ledger entries
    Ledger(LedgerArgs),

    /// Expire overdue batches for every customer and send expiry warnings
    Sweep {
        #[arg(long)]
        json: bool,
    },

    /// Programme reports
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },

    /// Check a customer's balance against ledger and batches
    Verify {
        customer_id: String,
    },

    /// Initialize database with schema
    Init {
        /// Force re-initialization (drops existing data)
        #[arg(long)]
        force: bool,
    },

    /// Show database status
    Status,
}

#[derive(Subcommand)]
pub enum CustomerAction {
    /// Register a new customer
    Register {
        #[arg(long, short)]
        name: String,
        /// 10-digit phone number
        #[arg(long, short)]
        phone: String,
        #[arg(long, short)]
        address: Option<String>,
    },
    /// List recent customers, or search by phone, id or name
    List {
        #[arg(long, short)]
        search: Option<String>,
    },
    /// Show balance and live batches
    Show {
        customer_id: String,
    },
    /// Every ledger entry of one customer, oldest first
    History {
        customer_id: String,
    },
}

#[derive(Subcommand)]
pub enum ReportAction {
    /// Programme-wide totals
    Stats,
    /// Compute and store the report for one UTC day (default: yesterday)
    Daily {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[derive(Args)]
pub struct LedgerArgs {
    /// Only this customer
    #[arg(long)]
    pub customer: Option<String>,

    /// Entry kinds (repeatable)
    #[arg(long, value_enum)]
    pub kind: Vec<KindArg>,

    /// today, yesterday, last7days, last30days, last90days, thisMonth, lastMonth, thisYear, lastYear
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub preset: Option<DatePreset>,

    /// First day (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last day (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub to: Option<NaiveDate>,

    /// Signed: redemptions and expiries are negative
    #[arg(long, allow_negative_numbers = true)]
    pub min_points: Option<i64>,

    #[arg(long, allow_negative_numbers = true)]
    pub max_points: Option<i64>,

    #[arg(long)]
    pub min_purchase: Option<Decimal>,

    #[arg(long)]
    pub max_purchase: Option<Decimal>,

    /// Text contained in the description
    #[arg(long, short)]
    pub search: Option<String>,

    /// created_at, points or purchase_amount
    #[arg(long, default_value = "created_at")]
    pub sort: SortField,

    #[arg(long, value_enum, default_value = "desc")]
    pub order: OrderArg,

    #[arg(long, default_value_t = 50)]
    pub limit: u32,

    #[arg(long, default_value_t = 0)]
    pub offset: u32,

    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum KindArg {
    Earn,
    Redeem,
    Expiry,
}

impl KindArg {
    pub fn to_core_kind(&self) -> EntryKind {
        match self {
            KindArg::Earn => EntryKind::Earn,
            KindArg::Redeem => EntryKind::Redeem,
            KindArg::Expiry => EntryKind::Expiry,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OrderArg {
    Asc,
    Desc,
}

impl OrderArg {
    pub fn to_core_order(&self) -> SortOrder {
        match self {
            OrderArg::Asc => SortOrder::Asc,
            OrderArg::Desc => SortOrder::Desc,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    // Ensure data directory exists
    if let Some(parent) = cli.db.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    match cli.command {
        Commands::Init { force } => {
            db::init_database(&cli.db, force).await?;
            println!("✅ Database initialized at {:?}", cli.db);
            return Ok(());
        }
        Commands::Status => {
            db::show_status(&cli.db).await?;
            return Ok(());
        }
        _ => {}
    }

    let (database, ctx) = db::open(&cli.db, cli.config.as_deref()).await?;

    let result = match cli.command {
        Commands::Customer { action } => customer::handle(&ctx, action).await,
        Commands::Earn {
            customer_id,
            purchase_amount,
            description,
        } => points::earn(&ctx, &customer_id, purchase_amount, &description).await,
        Commands::Redeem {
            customer_id,
            points,
            description,
        } => points::redeem(&ctx, &customer_id, points, &description).await,
        Commands::Verify { customer_id } => points::verify(&ctx, &customer_id).await,
        Commands::Ledger(args) => ledger::list(&ctx, args).await,
        Commands::Sweep { json } => report::sweep(&ctx, json).await,
        Commands::Report { action } => match action {
            ReportAction::Stats => report::stats(&ctx).await,
            ReportAction::Daily { date } => {
                let date = date.unwrap_or_else(|| {
                    Utc::now().date_naive().pred_opt().unwrap_or(NaiveDate::MIN)
                });
                report::daily(&ctx, date).await
            }
        },
        Commands::Init { .. } | Commands::Status => Ok(()),
    };

    // Let post-commit messages finish before the runtime shuts down
    ctx.flush().await;
    database.close().await;

    result
}
