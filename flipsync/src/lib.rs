// FlipSync Core Library
// Multi-agent orchestration for cross-marketplace e-commerce automation

pub mod agents;
pub mod approval;
pub mod config;
pub mod decision;
pub mod error;
pub mod events;
pub mod executive;
pub mod inventory;
pub mod llm;
pub mod marketplace;
pub mod monitoring;
pub mod orders;
pub mod prelude;
pub mod runtime;

// Re-export the main entry points
pub use crate::config::FlipsyncConfig;
pub use crate::error::{ErrorCode, FlipsyncError, FsResult};
pub use crate::runtime::Runtime;
