//! Utility modules for cross-cutting concerns

pub mod error;
pub mod fs;
pub mod paths;

// Re-export commonly used items
pub use error::{BotwardenError, Result};
pub use paths::{ensure_data_dir, remove_pid_file, write_pid_file};
