//! Friendlink Common Library
//!
//! Shared code for the Friendlink services:
//! - Friendship and interaction graph stores (Redis, in-memory)
//! - Interaction decay scheduling and graph event handling
//! - Member collaborators (block list, recent members)
//! - Error types, configuration, metrics and tracing setup
//! - SQS event queue

pub mod config;
pub mod db;
pub mod errors;
pub mod graph;
pub mod kv;
pub mod members;
pub mod metrics;
pub mod observability;
pub mod queue;

// Re-export commonly used types
pub use crate::config::AppConfig;
pub use crate::errors::{AppError, Result};
pub use crate::graph::{FriendshipGraphStore, InteractionScoreStore, MemberId};
pub use crate::members::{BlacklistGate, RecentMemberSource};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
