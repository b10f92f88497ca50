//! Cart signal and intervention follow-up commands

use anyhow::{Context, Result};
use anya_core::{
    db::Database, money, CartSignal, ProductDetails, SessionOrchestrator, SignalStatus,
};
use chrono::Utc;

use super::truncate;

/// Assemble a cart signal from command-line flags
pub fn build_signal(
    user_id: &str,
    merchant: Option<String>,
    url: Option<String>,
    price: f64,
    items: Vec<String>,
    checkout: bool,
) -> CartSignal {
    CartSignal {
        user_id: user_id.to_string(),
        url,
        merchant,
        product_details: ProductDetails {
            price,
            items,
            is_cart: !checkout,
            is_checkout: checkout,
        },
    }
}

pub fn cmd_signal(orchestrator: &SessionOrchestrator, signal: &CartSignal) -> Result<()> {
    let response = orchestrator
        .handle_signal(signal, Utc::now())
        .context("Failed to handle cart signal")?;

    match response.status {
        SignalStatus::Rejected => {
            anyhow::bail!(
                "Signal rejected: {}",
                response.reason.as_deref().unwrap_or("invalid signal")
            );
        }
        SignalStatus::Suppressed => {
            println!(
                "🔕 Suppressed ({})",
                response
                    .verdict
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "no verdict".to_string())
            );
        }
        SignalStatus::Accepted => {
            if let Some(verdict) = response.verdict {
                println!("🧭 Verdict: {}", verdict);
            }
            if let Some(message) = &response.message {
                println!();
                println!("{}", message);
            }
        }
    }
    if let Some(id) = response.event_id {
        println!();
        println!("   Event #{}", id);
    }
    Ok(())
}

pub fn cmd_interventions(db: &Database, user_id: &str, limit: i64) -> Result<()> {
    let user = db.get_user(user_id)?;
    let events = db.list_interventions(&user.id, limit.clamp(1, 1000))?;

    if events.is_empty() {
        println!("No interventions yet.");
        return Ok(());
    }

    println!();
    println!(
        "{:>5}  {:16}  {:20}  {:>12}  {:12}  {}",
        "ID", "When", "Merchant", "Amount", "Verdict", "Outcome"
    );
    println!("{}", "─".repeat(90));
    for event in events {
        println!(
            "{:>5}  {:16}  {:20}  {:>12}  {:12}  {}",
            event.id,
            event
                .created_at
                .with_timezone(&user.tz())
                .format("%Y-%m-%d %H:%M"),
            truncate(&event.merchant, 20),
            money::format_amount(event.amount, &user.currency),
            event.verdict,
            event.outcome
        );
    }
    println!();
    Ok(())
}

/// Reconcile one user, or every active user when `user_id` is `None`
pub fn cmd_reconcile(orchestrator: &SessionOrchestrator, user_id: Option<&str>) -> Result<()> {
    let now = Utc::now();
    let summary = match user_id {
        Some(user_id) => orchestrator.reconcile(user_id, now)?,
        None => orchestrator.reconcile_all(now)?,
    };

    println!("🔁 Reconciled interventions");
    println!("   Checked:   {}", summary.checked);
    println!("   Purchased: {}", summary.purchased);
    println!("   Abandoned: {}", summary.abandoned);
    Ok(())
}
