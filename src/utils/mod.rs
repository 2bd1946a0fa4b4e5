//! Utility module
//!
//! This module provides:
//! - Configuration management
//! - Logging setup

mod config;
mod logging;

pub use config::{Config, DataConfig, LoggingConfig, OutputConfig};
pub use logging::{level_from_verbosity, setup_logging};
