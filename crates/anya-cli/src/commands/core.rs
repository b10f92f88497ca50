//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_config` - Engine config from --config or the default locations
//! - `open_orchestrator` - Database + config + categorization backend
//! - `cmd_init` - Initialize the database and the acting user

use std::path::Path;

use anyhow::{Context, Result};
use anya_core::{db::Database, AIBackend, AIClient, EngineConfig, SessionOrchestrator};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path must be valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Load engine config from an explicit path, or the user override / built-ins
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => EngineConfig::load().context("Failed to load config"),
    }
}

/// Wire up the session orchestrator with the environment's categorization backend
pub fn open_orchestrator(
    db_path: &Path,
    no_encrypt: bool,
    config: EngineConfig,
) -> Result<SessionOrchestrator> {
    let db = open_db(db_path, no_encrypt)?;
    let ai = AIClient::from_env(&config.keywords);
    tracing::debug!(model = ai.model(), host = ai.host(), "Categorization backend");
    SessionOrchestrator::new(db, config, ai).context("Failed to start session orchestrator")
}

pub fn cmd_init(
    db_path: &Path,
    no_encrypt: bool,
    config: &EngineConfig,
    user_id: &str,
    currency: Option<&str>,
    timezone: Option<&str>,
) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;

    let currency = currency.unwrap_or(&config.default_currency);
    let timezone = timezone.unwrap_or(config.default_timezone.name());
    let user = db
        .ensure_user(user_id, currency, timezone)
        .context("Failed to create user")?;
    println!(
        "   User '{}' ({}, {})",
        user.id, user.currency, user.timezone
    );
    println!(
        "   Keyword table v{} ({} rules)",
        config.keywords.version,
        config.keywords.rules().len()
    );

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Set a goal: anya chat \"Save 60000 for a laptop in 6 months\"");
    println!("  2. Log spending: anya chat \"Spent 450 on coffee at Starbucks\"");
    println!("  3. Start the API: anya serve");

    Ok(())
}
