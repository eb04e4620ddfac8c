//! Transparency module for the sensor report agent.
//!
//! Tracks how much the agent sampled and wrote, for display to the user.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, PersistedStats, SharedTransparencyLog,
    TransparencyLog, TransparencyStats,
};
