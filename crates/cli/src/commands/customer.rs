//! Customer commands: register, list, show

use anyhow::Result;
use loyalty_business::{CustomerService, LedgerService, ServiceContext};

use super::engine_error;
use crate::CustomerAction;

/// Handle customer subcommands
pub async fn handle(ctx: &ServiceContext, action: CustomerAction) -> Result<()> {
    let service = CustomerService::new(ctx);

    match action {
        CustomerAction::Register {
            name,
            phone,
            address,
        } => {
            let customer = service
                .register(&name, &phone, address.as_deref())
                .await
                .map_err(engine_error)?;

            println!("✅ Customer registered!");
            println!("   Membership: {}", customer.customer_id);
            println!("   Name:       {}", customer.name);
            println!("   Phone:      {}", customer.phone_number);
        }

        CustomerAction::List { search } => {
            let customers = service.search(search.as_deref()).await.map_err(engine_error)?;
            if customers.is_empty() {
                println!("No customers found");
                return Ok(());
            }

            println!("{:<10} {:<24} {:<12} {:>8}  Registered", "ID", "Name", "Phone", "Points");
            println!("{}", "-".repeat(72));
            for c in customers {
                println!(
                    "{:<10} {:<24} {:<12} {:>8}  {}",
                    c.customer_id,
                    c.name,
                    c.phone_number,
                    c.balance,
                    c.created_at.format("%Y-%m-%d")
                );
            }
        }

        CustomerAction::Show { customer_id } => {
            let summary = service
                .points_summary(&customer_id)
                .await
                .map_err(engine_error)?;
            let customer = &summary.customer;

            println!("👤 {} ({})", customer.name, customer.customer_id);
            println!("   Phone:   {}", customer.phone_number);
            if let Some(address) = &customer.address {
                println!("   Address: {}", address);
            }
            println!("   Balance: {} points", customer.balance);
            if summary.expired_points > 0 {
                println!("   ⏳ {} points expired just now", summary.expired_points);
            }

            if summary.batches.is_empty() {
                return Ok(());
            }
            println!();
            println!("   {:>8} {:>8}  Expires", "Earned", "Left");
            for batch in &summary.batches {
                println!(
                    "   {:>8} {:>8}  {}",
                    batch.earned_points,
                    batch.remaining_points,
                    batch.expires_at.format("%Y-%m-%d")
                );
            }
        }

        CustomerAction::History { customer_id } => {
            let entries = LedgerService::new(ctx)
                .history(&customer_id)
                .await
                .map_err(engine_error)?;
            if entries.is_empty() {
                println!("No ledger entries for {}", customer_id);
                return Ok(());
            }

            println!("{:<16}  {:<6} {:>7} {:>8}  Description", "Date", "Kind", "Points", "Balance");
            println!("{}", "-".repeat(64));
            for e in entries {
                println!(
                    "{:<16}  {:<6} {:>+7} {:>8}  {}",
                    e.created_at.format("%Y-%m-%d %H:%M"),
                    e.kind.as_str(),
                    e.points,
                    e.balance_after,
                    e.description
                );
            }
        }
    }

    Ok(())
}
