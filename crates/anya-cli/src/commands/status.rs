//! Status and dashboard command implementations

use std::path::Path;

use anyhow::Result;
use anya_core::{db::Database, money, DashboardSnapshot, EngineConfig};
use chrono::Utc;

use super::{open_db, truncate};

pub fn cmd_status(db_path: &Path, no_encrypt: bool) -> Result<()> {
    use anya_core::db::DB_KEY_ENV;
    use std::fs;

    println!();
    println!("📊 Anya Status");
    println!("   ─────────────────────────────────────────────────────────────");

    // Database path
    println!("   Database: {}", db_path.display());

    // Check if database file exists and get size
    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    // Check encryption status
    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    // Try to open the database and show stats
    if db_path.exists() {
        match open_db(db_path, no_encrypt) {
            Ok(db) => {
                if let Ok(users) = db.list_active_user_ids() {
                    println!();
                    println!("   Active users: {}", users.len());
                }
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {}", e);
                if !no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                } else if has_key {
                    println!("      (Check if {} is correct)", DB_KEY_ENV);
                }
            }
        }
    }

    println!();
    Ok(())
}

pub fn cmd_dashboard(db: &Database, config: &EngineConfig, user_id: &str, json: bool) -> Result<()> {
    let snapshot = DashboardSnapshot::build(db, config, user_id, Utc::now())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let currency = &snapshot.user.currency;

    println!();
    println!("╭─────────────────────────────────────────╮");
    println!("│           💰 Anya Dashboard             │");
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!("{}", snapshot.summary_text());

    if !snapshot.recent_transactions.is_empty() {
        println!();
        println!("  Recent activity:");
        for tx in &snapshot.recent_transactions {
            let label = tx
                .merchant
                .clone()
                .unwrap_or_else(|| tx.category.label());
            println!(
                "    {}  {:24}  {:>12}",
                tx.occurred_at
                    .with_timezone(&snapshot.user.tz())
                    .format("%Y-%m-%d"),
                truncate(&label, 24),
                money::format_amount(tx.amount, currency)
            );
        }
    }
    println!();

    Ok(())
}
