//! Transparency module for the exposure agent.
//!
//! Tracks what the agent did so users can audit it with `status`.

pub mod log;

pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
