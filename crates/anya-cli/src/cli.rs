//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Anya - Goal-aware spending companion
#[derive(Parser)]
#[command(name = "anya")]
#[command(about = "Budget and intervention engine for your savings goals", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "anya.db", global = true)]
    pub db: PathBuf,

    /// Engine config file (defaults to ~/.local/share/anya/config/anya.toml, then built-ins)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// User the command acts for
    #[arg(short, long, default_value = "local", global = true)]
    pub user: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set ANYA_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init {
        /// Currency for the user (ISO 4217)
        #[arg(long)]
        currency: Option<String>,

        /// IANA timezone for the user's calendar
        #[arg(long)]
        timezone: Option<String>,
    },

    /// Send a chat message (interactive session when no text is given)
    Chat {
        /// Message text
        text: Vec<String>,
    },

    /// Send a cart signal to the intervention engine
    Signal {
        /// Merchant name
        #[arg(short, long)]
        merchant: Option<String>,

        /// Page URL
        #[arg(long)]
        url: Option<String>,

        /// Cart total in whole currency units
        #[arg(short, long)]
        price: f64,

        /// Item in the cart (repeatable)
        #[arg(short, long = "item")]
        items: Vec<String>,

        /// The user is on the checkout page
        #[arg(long)]
        checkout: bool,
    },

    /// Show goal progress
    Goals {
        /// Include achieved and abandoned goals
        #[arg(short, long)]
        all: bool,

        /// Make this goal the one interventions compare against
        #[arg(long, value_name = "GOAL_ID")]
        primary: Option<i64>,
    },

    /// Manage budgets
    Budget {
        #[command(subcommand)]
        action: Option<BudgetAction>,
    },

    /// Show dashboard summary
    Dashboard {
        /// Print the full snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// List recent intervention events
    Interventions {
        /// Maximum number of events to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Settle old nudges as purchased or abandoned
    Reconcile {
        /// Reconcile every active user instead of --user
        #[arg(long)]
        all: bool,
    },

    /// Show database status (encryption, size, users)
    Status,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, the server requires a Bearer key from ANYA_API_KEYS.
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
pub enum BudgetAction {
    /// List budgets with their current status
    List,

    /// Define a new budget (fails if one exists for the scope and period)
    Add {
        /// Category, or "overall" for total spending
        #[arg(short, long, default_value = "overall")]
        scope: String,

        /// weekly or monthly
        #[arg(short, long, default_value = "monthly")]
        period: String,

        /// Limit in whole currency units (e.g. 5000 or 5,000.50)
        limit: String,
    },

    /// Create or update a budget
    Set {
        /// Category, or "overall" for total spending
        #[arg(short, long, default_value = "overall")]
        scope: String,

        /// weekly or monthly
        #[arg(short, long, default_value = "monthly")]
        period: String,

        /// Limit in whole currency units (e.g. 5000 or 5,000.50)
        limit: String,
    },

    /// Delete a budget
    Delete {
        /// Category, or "overall"
        #[arg(short, long, default_value = "overall")]
        scope: String,

        /// weekly or monthly
        #[arg(short, long, default_value = "monthly")]
        period: String,
    },
}
