//! Configuration discovery and loading
//!
//! This module handles the configuration discovery hierarchy:
//! 0. `MODELGATE_CONFIG` environment variable, when set
//! 1. Current directory: ./modelgate.toml or ./.modelgate/config.toml
//! 2. User config: ~/.modelgate/config.toml
//! 3. System config: /etc/modelgate/config.toml
//! 4. Built-in defaults (no providers)

use crate::env;
use crate::llm::config::{ConfigError, ProviderManagerConfig};
use std::env as std_env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of resolving the configuration for one run.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// File the configuration came from; `None` means built-in defaults.
    pub path: Option<PathBuf>,
    pub config: ProviderManagerConfig,
}

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Load `explicit` when given, otherwise walk the discovery hierarchy.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
        if let Some(path) = explicit {
            info!("Loading configuration override from: {:?}", path);
            return Ok(LoadedConfig {
                path: Some(path.to_path_buf()),
                config: ProviderManagerConfig::from_toml_file(path)?,
            });
        }

        match Self::find_config_file() {
            Some(path) => {
                info!("Loading configuration from: {:?}", path);
                let config = ProviderManagerConfig::from_toml_file(&path)?;
                Ok(LoadedConfig {
                    path: Some(path),
                    config,
                })
            }
            None => {
                info!("No configuration file found, using defaults");
                Ok(LoadedConfig {
                    path: None,
                    config: ProviderManagerConfig::default(),
                })
            }
        }
    }

    /// Discover and load configuration using the hierarchy
    pub fn discover_config() -> Result<ProviderManagerConfig, ConfigError> {
        Self::load(None).map(|loaded| loaded.config)
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        for candidate in Self::get_config_candidates() {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate);
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    /// Get list of configuration file candidates in priority order
    pub fn get_config_candidates() -> Vec<PathBuf> {
        Self::candidates_for(
            std_env::var_os(env::CONFIG_PATH_ENV).map(PathBuf::from),
            std_env::current_dir().ok().as_deref(),
            Self::get_home_dir().as_deref(),
        )
    }

    fn candidates_for(
        env_override: Option<PathBuf>,
        current_dir: Option<&Path>,
        home_dir: Option<&Path>,
    ) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Some(path) = env_override.filter(|p| !p.as_os_str().is_empty()) {
            candidates.push(path);
        }

        // 1. Current directory: ./modelgate.toml, ./.modelgate/config.toml
        if let Some(current_dir) = current_dir {
            candidates.push(current_dir.join(env::LOCAL_CONFIG_FILE_NAME));
            candidates.push(env::local_config_file_path(current_dir));
        }

        // 2. User config: ~/.modelgate/config.toml
        if let Some(home_dir) = home_dir {
            candidates.push(env::user_config_file_path(home_dir));
        }

        // 3. System config (Unix-like systems)
        #[cfg(unix)]
        candidates.push(PathBuf::from("/etc/modelgate").join(env::CONFIG_FILE_NAME));

        #[cfg(windows)]
        if let Some(program_data) = std_env::var_os("PROGRAMDATA") {
            candidates.push(
                PathBuf::from(program_data)
                    .join("modelgate")
                    .join(env::CONFIG_FILE_NAME),
            );
        }

        candidates
    }

    /// Get home directory path
    fn get_home_dir() -> Option<PathBuf> {
        std_env::var_os("HOME")
            .or_else(|| std_env::var_os("USERPROFILE"))
            .map(PathBuf::from)
    }

    /// Show configuration discovery information for debugging
    pub fn show_discovery_info() {
        println!("Configuration Discovery Hierarchy:");
        println!();

        for (i, candidate) in Self::get_config_candidates().iter().enumerate() {
            let status = if candidate.exists() {
                if candidate.is_file() {
                    "✓ EXISTS"
                } else {
                    "✗ NOT A FILE"
                }
            } else {
                "✗ NOT FOUND"
            };

            println!("  {}. {:?} - {}", i + 1, candidate, status);
        }

        println!();
        if let Some(found) = Self::find_config_file() {
            println!("Active configuration: {:?}", found);
        } else {
            println!("Active configuration: Built-in defaults");
        }
    }
}
