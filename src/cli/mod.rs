//! CLI-specific functionality for the modelgate binary
//!
//! This module contains argument parsing and configuration discovery.

pub mod args;
pub mod config;

pub use args::{Args, ChatConfig, Commands, ExecutionMode};
pub use config::{ConfigDiscovery, LoadedConfig};
