pub mod loader;
pub mod schema;

pub use loader::{CliOverrides, ConfigError, load_config};
pub use schema::{Config, HealthCheckConfig, SupervisorConfig, ValidationError};
