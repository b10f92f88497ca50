//! Anya Core Library
//!
//! Budget and intervention decision engine for the Anya finance assistant:
//! - Ledger store (SQLite/SQLCipher) for users, transactions, goals, budgets
//!   and intervention events
//! - Expense interpreter turning chat text into transaction proposals
//! - Goal planner and budget monitor
//! - Intervention engine scoring cart signals against goals and budgets
//! - Session orchestrator routing chat commands and intents
//! - Pluggable categorization backends (OpenAI-compatible, local keywords)

pub mod ai;
pub mod categories;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod interpreter;
pub mod intervention;
pub mod models;
pub mod money;
pub mod monitor;
pub mod orchestrator;
pub mod period;
pub mod planner;

pub use ai::{AIBackend, AIClient, ExpenseClassification, LocalBackend, MockBackend, OpenAICompatibleBackend};
pub use categories::{KeywordMatch, KeywordRule, KeywordTable};
pub use config::EngineConfig;
pub use dashboard::DashboardSnapshot;
pub use db::{Database, TransactionInsertResult};
pub use error::{Error, ErrorKind, Result};
pub use interpreter::{ExpenseInterpreter, ExpenseProposal, Interpretation};
pub use intervention::{CartSignal, InterventionEngine, ProductDetails, SignalResponse, SignalStatus};
pub use monitor::{BudgetEvaluation, BudgetMonitor, BudgetStatus};
pub use orchestrator::{Attachment, InboundMessage, OutboundMessage, SessionOrchestrator};
pub use planner::GoalPlanner;
