#[cfg(feature = "cli")]
pub mod cli;
pub mod lambda;
pub mod pms_config;

#[cfg(feature = "cli")]
pub use cli::{Cli, Command};
pub use pms_config::{FailurePolicy, PmsConfig};
