//! Anya CLI - Goal-aware spending companion
//!
//! Usage:
//!   anya init                          Initialize database
//!   anya chat "Spent 450 on coffee"    Talk to the assistant
//!   anya signal -m Amazon -p 30000     Score a cart against your goals
//!   anya serve --port 3000             Start web server

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init { currency, timezone } => commands::cmd_init(
            &cli.db,
            cli.no_encrypt,
            &config,
            &cli.user,
            currency.as_deref(),
            timezone.as_deref(),
        ),
        Commands::Chat { text } => {
            let orchestrator = commands::open_orchestrator(&cli.db, cli.no_encrypt, config)?;
            if text.is_empty() {
                commands::cmd_chat_interactive(&orchestrator, &cli.user).await
            } else {
                commands::cmd_chat(&orchestrator, &cli.user, &text.join(" ")).await
            }
        }
        Commands::Signal {
            merchant,
            url,
            price,
            items,
            checkout,
        } => {
            let orchestrator = commands::open_orchestrator(&cli.db, cli.no_encrypt, config)?;
            let signal = commands::build_signal(&cli.user, merchant, url, price, items, checkout);
            commands::cmd_signal(&orchestrator, &signal)
        }
        Commands::Goals { all, primary } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            if let Some(goal_id) = primary {
                commands::cmd_goal_primary(&db, &cli.user, goal_id)?;
            }
            commands::cmd_goals(&db, &cli.user, all)
        }
        Commands::Budget { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(BudgetAction::List) => commands::cmd_budget_list(&db, &config, &cli.user),
                Some(BudgetAction::Add {
                    scope,
                    period,
                    limit,
                }) => commands::cmd_budget_add(&db, &config, &cli.user, &scope, &period, &limit),
                Some(BudgetAction::Set {
                    scope,
                    period,
                    limit,
                }) => commands::cmd_budget_set(&db, &config, &cli.user, &scope, &period, &limit),
                Some(BudgetAction::Delete { scope, period }) => {
                    commands::cmd_budget_delete(&db, &cli.user, &scope, &period)
                }
            }
        }
        Commands::Dashboard { json } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_dashboard(&db, &config, &cli.user, json)
        }
        Commands::Interventions { limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_interventions(&db, &cli.user, limit)
        }
        Commands::Reconcile { all } => {
            let orchestrator = commands::open_orchestrator(&cli.db, cli.no_encrypt, config)?;
            commands::cmd_reconcile(&orchestrator, (!all).then_some(cli.user.as_str()))
        }
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt),
        Commands::Serve {
            port,
            host,
            no_auth,
        } => commands::cmd_serve(&cli.db, &host, port, no_auth, cli.no_encrypt, config).await,
    }
}
