//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod chat;
pub mod interventions;
pub mod plans;
pub mod signals;
pub mod users;

// Re-export all handlers for use in router
pub use chat::*;
pub use interventions::*;
pub use plans::*;
pub use signals::*;
pub use users::*;
