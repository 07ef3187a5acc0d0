//! Transparency module.
//!
//! Exposes what the recorder did with the classifications it received,
//! so throttling and store failures are both visible to an operator.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, load_persisted, PersistedStats,
    SharedTransparencyLog, TransparencyLog, TransparencyStats,
};
