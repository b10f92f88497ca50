//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Shared utilities (open_db, load_config, open_orchestrator) and init
//! - `chat` - One-shot and interactive chat through the session orchestrator
//! - `signal` - Cart signals and intervention follow-ups (list, reconcile)
//! - `goals` - Goal progress and the primary goal
//! - `budgets` - Budget management commands (list, add, set, delete)
//! - `serve` - Web server command
//! - `status` - Status/dashboard commands

pub mod budgets;
pub mod chat;
pub mod core;
pub mod goals;
pub mod serve;
pub mod signal;
pub mod status;

// Re-export command functions for main.rs
pub use budgets::*;
pub use chat::*;
pub use core::*;
pub use goals::*;
pub use serve::*;
pub use signal::*;
pub use status::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
