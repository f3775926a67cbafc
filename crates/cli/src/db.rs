//! Database initialization, status and service wiring

use anyhow::{bail, Context, Result};
use loyalty_business::{LoyaltyConfig, ServiceContext};
use loyalty_persistence::{CustomerRepo, Database, LedgerRepo};
use std::path::Path;

fn db_url(db_path: &Path) -> String {
    format!("sqlite:{}", db_path.display())
}

/// Initialize the database with schema
pub async fn init_database(db_path: &Path, force: bool) -> Result<()> {
    if force && db_path.exists() {
        std::fs::remove_file(db_path).context("Failed to remove existing database")?;
        println!("🗑️  Removed existing database");
    }

    println!("📦 Applying migrations...");
    let db = Database::init_with_migrations(&db_url(db_path))
        .await
        .context("Failed to initialize database")?;
    db.close().await;
    Ok(())
}

/// Show database status
pub async fn show_status(db_path: &Path) -> Result<()> {
    if !db_path.exists() {
        println!("❌ Database not found at {:?}", db_path);
        println!("   Run 'loyalty init' to create the database");
        return Ok(());
    }

    let db = Database::new(&db_url(db_path)).await?;
    let pool = db.pool();

    println!("📊 Database Status");
    println!("   Path: {:?}", db_path);
    println!();

    let customers = CustomerRepo::count(pool).await?;
    let entries = LedgerRepo::count(pool).await?;
    let outstanding = CustomerRepo::total_balance(pool).await?;

    println!("   Customers:        {}", customers);
    println!("   Ledger entries:   {}", entries);
    println!("   Outstanding pts:  {}", outstanding);

    db.close().await;
    Ok(())
}

/// Open an initialized database and build the service context
pub async fn open(db_path: &Path, config_path: Option<&Path>) -> Result<(Database, ServiceContext)> {
    if !db_path.exists() {
        bail!(
            "Database not found at {:?}. Run 'loyalty init' first.",
            db_path
        );
    }

    let config = match config_path {
        Some(path) => LoyaltyConfig::from_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => LoyaltyConfig::default(),
    };

    let db = Database::init_with_migrations(&db_url(db_path))
        .await
        .context("Failed to connect to database")?;
    let ctx = ServiceContext::new(&db, config);
    Ok((db, ctx))
}
