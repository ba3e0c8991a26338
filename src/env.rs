//! Environment constants, tuning defaults and path utilities.
//!
//! This module centralizes the hardcoded names, timeouts and limits used
//! throughout the crate so they can be adjusted in one place.

use std::path::{Path, PathBuf};

/// Application directory name (hidden directory like .git, .vscode)
pub const APP_DIR_NAME: &str = ".modelgate";

/// Configuration file name inside [`APP_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file name looked up directly in the working directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "modelgate.toml";

/// Environment variable that may point at an explicit config file
pub const CONFIG_PATH_ENV: &str = "MODELGATE_CONFIG";

/// Default tracing filter for the binary
pub const DEFAULT_LOG_FILTER: &str = "modelgate=info";

/// Retry executor defaults
pub mod retry {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;
    /// 5 minutes
    pub const DEFAULT_MAX_DELAY_MS: u64 = 300_000;
    pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
}

/// Provider manager health-check defaults
pub mod health {
    pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
    /// 5 minutes
    pub const DEFAULT_CACHE_TTL_MS: u64 = 300_000;
}

/// CLI provider process defaults
pub mod cli {
    pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;
    pub const HEALTH_TIMEOUT_MS: u64 = 5_000;
    /// How long pipe readers may keep draining after a forced kill
    pub const KILL_DRAIN_GRACE_MS: u64 = 1_000;
    /// Maximum characters of stderr/stdout kept in a process failure message
    pub const MAX_ERROR_CHARS: usize = 500;
    pub const DEFAULT_VERSION_FLAG: &str = "--version";
}

/// HTTP provider defaults
pub mod api {
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;
    pub const DEFAULT_COST_PER_1K_TOKENS: f64 = 0.002;
    pub const DEFAULT_LOCAL_BASE_URL: &str = "http://localhost:11434";
    pub const DEFAULT_COOLDOWN_MINUTES: u32 = 5;
    pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 120_000;
    /// Maximum characters of a response body kept in an HTTP error message
    pub const MAX_ERROR_BODY_CHARS: usize = 500;
}

/// Logging defaults
pub mod logging {
    pub const DEFAULT_MAX_PREVIEW_CHARS: usize = 500;
}

/// Build the application directory path below `root`
pub fn app_dir_path(root: &Path) -> PathBuf {
    root.join(APP_DIR_NAME)
}

/// Build config directory path in user's home directory
pub fn user_config_dir_path(home_dir: &Path) -> PathBuf {
    app_dir_path(home_dir)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    user_config_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// Build local config file path in current directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    app_dir_path(current_dir).join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_paths() {
        let home_dir = Path::new("/home/user");
        let current_dir = Path::new("/current/project");

        assert_eq!(
            user_config_file_path(home_dir),
            Path::new("/home/user/.modelgate/config.toml")
        );

        assert_eq!(
            local_config_file_path(current_dir),
            Path::new("/current/project/.modelgate/config.toml")
        );
    }
}
