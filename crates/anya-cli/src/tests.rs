//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::path::PathBuf;

use anya_core::db::Database;
use anya_core::models::{BudgetPeriod, BudgetScope, Category};
use anya_core::{AIClient, Attachment, EngineConfig, SessionOrchestrator};
use chrono::{Months, Utc};
use clap::Parser;
use tempfile::TempDir;

use crate::cli::{BudgetAction, Cli, Commands};
use crate::commands::{self, truncate};

fn setup_test_db() -> Database {
    let db = Database::in_memory().unwrap();
    db.ensure_user("local", "INR", "Asia/Kolkata").unwrap();
    db
}

fn setup_orchestrator() -> (SessionOrchestrator, Database) {
    let db = setup_test_db();
    let orchestrator =
        SessionOrchestrator::new(db.clone(), EngineConfig::default(), AIClient::mock()).unwrap();
    (orchestrator, db)
}

fn seed_goal(db: &Database) {
    let now = Utc::now();
    let deadline = now
        .date_naive()
        .checked_add_months(Months::new(6))
        .unwrap();
    db.create_goal("local", "Bike", 9_000_000, deadline, now)
        .unwrap();
}

// ========== Utility Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a longer merchant name", 10), "a longe...");
    // Multi-byte characters are not split
    assert_eq!(truncate("₹₹₹₹₹₹₹₹", 5), "₹₹...");
}

#[test]
fn test_load_config_missing_file() {
    let result = commands::load_config(Some(&PathBuf::from("/nonexistent/anya.toml")));
    assert!(result.is_err());
}

#[test]
fn test_load_config_explicit_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("anya.toml");
    std::fs::write(&path, "[budget]\nwarning_ratio = 0.9\n").unwrap();

    let config = commands::load_config(Some(&path)).unwrap();
    assert!((config.budget.warning_ratio - 0.9).abs() < 1e-9);
}

// ========== Argument Parsing Tests ==========

#[test]
fn test_parse_budget_set() {
    let cli = Cli::try_parse_from([
        "anya", "--user", "u1", "budget", "set", "--scope", "dining", "--period", "weekly", "4000",
    ])
    .unwrap();
    assert_eq!(cli.user, "u1");
    match cli.command {
        Commands::Budget {
            action: Some(BudgetAction::Set { scope, period, limit }),
        } => {
            assert_eq!(scope, "dining");
            assert_eq!(period, "weekly");
            assert_eq!(limit, "4000");
        }
        _ => panic!("expected budget set"),
    }
}

#[test]
fn test_parse_signal_items() {
    let cli = Cli::try_parse_from([
        "anya", "signal", "-m", "Amazon", "-p", "2499.5", "-i", "Mouse", "-i", "Keyboard",
        "--checkout",
    ])
    .unwrap();
    match cli.command {
        Commands::Signal {
            merchant,
            price,
            items,
            checkout,
            ..
        } => {
            assert_eq!(merchant.as_deref(), Some("Amazon"));
            assert_eq!(price, 2499.5);
            assert_eq!(items, vec!["Mouse", "Keyboard"]);
            assert!(checkout);
        }
        _ => panic!("expected signal"),
    }
}

#[test]
fn test_parse_chat_words_joined() {
    let cli = Cli::try_parse_from(["anya", "chat", "Spent", "450", "on", "coffee"]).unwrap();
    match cli.command {
        Commands::Chat { text } => assert_eq!(text.join(" "), "Spent 450 on coffee"),
        _ => panic!("expected chat"),
    }
}

// ========== Init Command Tests ==========

#[test]
fn test_cmd_init_creates_user() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("anya.db");
    let config = EngineConfig::default();

    commands::cmd_init(&db_path, true, &config, "priya", None, Some("Asia/Kolkata")).unwrap();
    assert!(db_path.exists());

    let db = commands::open_db(&db_path, true).unwrap();
    let user = db.get_user("priya").unwrap();
    assert_eq!(user.currency, config.default_currency);
    assert_eq!(user.timezone, "Asia/Kolkata");

    // Re-running is harmless
    commands::cmd_init(&db_path, true, &config, "priya", None, None).unwrap();
}

#[test]
fn test_cmd_init_invalid_timezone() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("anya.db");
    let result = commands::cmd_init(
        &db_path,
        true,
        &EngineConfig::default(),
        "priya",
        None,
        Some("Mars/Olympus"),
    );
    assert!(result.is_err());
}

#[test]
fn test_cmd_status() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("anya.db");
    assert!(commands::cmd_status(&db_path, true).is_ok());

    commands::open_db(&db_path, true).unwrap();
    assert!(commands::cmd_status(&db_path, true).is_ok());
}

// ========== Budget Command Tests ==========

#[test]
fn test_cmd_budget_set_list_delete() {
    let db = setup_test_db();
    let config = EngineConfig::default();

    commands::cmd_budget_set(&db, &config, "local", "overall", "monthly", "5,000").unwrap();
    commands::cmd_budget_set(&db, &config, "local", "dining", "weekly", "1500").unwrap();

    let overall = db
        .find_budget("local", &BudgetScope::Overall, BudgetPeriod::Monthly)
        .unwrap()
        .unwrap();
    assert_eq!(overall.limit_amount, 500_000);

    assert!(commands::cmd_budget_list(&db, &config, "local").is_ok());

    commands::cmd_budget_delete(&db, "local", "dining", "weekly").unwrap();
    assert_eq!(db.list_budgets("local").unwrap().len(), 1);

    // Deleting again reports the missing budget
    assert!(commands::cmd_budget_delete(&db, "local", "dining", "weekly").is_err());
}

#[test]
fn test_cmd_budget_set_invalid_input() {
    let db = setup_test_db();
    let config = EngineConfig::default();

    assert!(commands::cmd_budget_set(&db, &config, "local", "overall", "yearly", "100").is_err());
    assert!(commands::cmd_budget_set(&db, &config, "local", "overall", "monthly", "lots").is_err());
    assert!(commands::cmd_budget_set(&db, &config, "local", "", "monthly", "100").is_err());
    assert!(db.list_budgets("local").unwrap().is_empty());
}

#[test]
fn test_cmd_budget_add_conflicts_on_existing() {
    let db = setup_test_db();
    let config = EngineConfig::default();

    commands::cmd_budget_add(&db, &config, "local", "dining", "monthly", "4000").unwrap();
    let err = commands::cmd_budget_add(&db, &config, "local", "dining", "monthly", "9000")
        .unwrap_err();
    let core_err = err.downcast_ref::<anya_core::Error>().unwrap();
    assert_eq!(core_err.kind(), anya_core::ErrorKind::Conflict);

    // The original limit is untouched
    let budget = db
        .find_budget("local", &BudgetScope::Category(Category::Dining), BudgetPeriod::Monthly)
        .unwrap()
        .unwrap();
    assert_eq!(budget.limit_amount, 400_000);
}

// ========== Goal Command Tests ==========

#[test]
fn test_cmd_goals() {
    let db = setup_test_db();
    assert!(commands::cmd_goals(&db, "local", false).is_ok());

    seed_goal(&db);
    assert!(commands::cmd_goals(&db, "local", false).is_ok());
    assert!(commands::cmd_goals(&db, "local", true).is_ok());
}

#[test]
fn test_cmd_goal_primary() {
    let db = setup_test_db();
    seed_goal(&db);
    let now = Utc::now();
    let deadline = now.date_naive().checked_add_months(Months::new(3)).unwrap();
    let second = db.create_goal("local", "Phone", 3_000_000, deadline, now).unwrap();
    assert!(!second.is_primary);

    commands::cmd_goal_primary(&db, "local", second.id).unwrap();
    assert!(db.get_goal(second.id).unwrap().is_primary);
    assert!(commands::cmd_goal_primary(&db, "local", 9999).is_err());
}

#[test]
fn test_parse_goals_primary() {
    let cli = Cli::try_parse_from(["anya", "goals", "--primary", "7"]).unwrap();
    match cli.command {
        Commands::Goals { all, primary } => {
            assert!(!all);
            assert_eq!(primary, Some(7));
        }
        _ => panic!("expected goals"),
    }
}

#[test]
fn test_cmd_goals_unknown_user() {
    let db = setup_test_db();
    assert!(commands::cmd_goals(&db, "ghost", false).is_err());
}

// ========== Chat Command Tests ==========

#[tokio::test]
async fn test_cmd_chat_logs_expense() {
    let (orchestrator, db) = setup_orchestrator();

    commands::cmd_chat(&orchestrator, "local", "Spent ₹450 on coffee at Starbucks")
        .await
        .unwrap();

    let transactions = db.list_transactions("local", 10).unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].amount, 45_000);
}

#[test]
fn test_describe_attachment() {
    let text = commands::describe_attachment(&Attachment::Dashboard {
        user_id: "local".to_string(),
    });
    assert!(text.contains("anya dashboard --user local"));

    let text = commands::describe_attachment(&Attachment::ImageRequest {
        prompt: "a red bike".to_string(),
    });
    assert_eq!(text, "image: a red bike");
}

// ========== Signal Command Tests ==========

#[test]
fn test_build_signal() {
    let signal = commands::build_signal(
        "local",
        Some("Amazon".to_string()),
        None,
        1200.0,
        vec!["Mouse".to_string()],
        true,
    );
    assert!(signal.product_details.is_checkout);
    assert!(!signal.product_details.is_cart);
    assert_eq!(signal.product_details.items, vec!["Mouse"]);
}

#[test]
fn test_cmd_signal_records_event() {
    let (orchestrator, db) = setup_orchestrator();
    seed_goal(&db);

    let signal = commands::build_signal(
        "local",
        Some("Amazon".to_string()),
        None,
        30_000.0,
        vec![],
        false,
    );
    commands::cmd_signal(&orchestrator, &signal).unwrap();

    let events = db.list_interventions("local", 10).unwrap();
    assert_eq!(events.len(), 1);
    assert!(commands::cmd_interventions(&db, "local", 10).is_ok());
}

#[test]
fn test_cmd_signal_rejected_is_error() {
    let (orchestrator, db) = setup_orchestrator();

    let signal = commands::build_signal("local", None, None, 100.0, vec![], false);
    assert!(commands::cmd_signal(&orchestrator, &signal).is_err());
    assert!(db.list_interventions("local", 10).unwrap().is_empty());
}

#[test]
fn test_cmd_reconcile() {
    let (orchestrator, _db) = setup_orchestrator();

    assert!(commands::cmd_reconcile(&orchestrator, Some("local")).is_ok());
    assert!(commands::cmd_reconcile(&orchestrator, None).is_ok());
    assert!(commands::cmd_reconcile(&orchestrator, Some("ghost")).is_err());
}

// ========== Dashboard Command Tests ==========

#[test]
fn test_cmd_dashboard() {
    let db = setup_test_db();
    let config = EngineConfig::default();
    seed_goal(&db);

    assert!(commands::cmd_dashboard(&db, &config, "local", false).is_ok());
    assert!(commands::cmd_dashboard(&db, &config, "local", true).is_ok());
    assert!(commands::cmd_dashboard(&db, &config, "ghost", false).is_err());
}
