//! Shared utilities for stock-chat
//!
//! Logging setup and environment-driven configuration helpers used by the
//! other crates in the workspace.

pub mod config;
pub mod logging;

pub use config::{EnvError, env_flag, env_parse, env_var, load_env_file};
pub use logging::{LogFormat, init_tracing};
