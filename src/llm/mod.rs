pub mod api_provider;
pub mod auth;
pub mod cli_output;
pub mod cli_provider;
pub mod config;
pub mod error;
mod http;
pub mod local_provider;
pub mod manager;
pub mod provider;
pub mod provider_logger;
pub mod tool_call_parser;
pub mod types;

#[cfg(test)]
mod tests;

pub use api_provider::ApiProvider;
pub use auth::{AuthProfile, AuthProfileRing};
pub use cli_provider::CliProvider;
pub use config::{
    AuthProfileConfig, CliFlavor, ConfigError, HealthCheckConfig, ProviderConfig,
    ProviderManagerConfig, RoutingConfig,
};
pub use error::ProviderError;
pub use local_provider::LocalProvider;
pub use manager::{ProviderManager, RoutingError};
pub use provider::{Provider, ProviderFactory};
pub use provider_logger::{
    Operation, ProviderLogEvent, ProviderLogger, ProviderLoggerConfig, SharedProviderLogger,
    TracingProviderLogger,
};
pub use tool_call_parser::{ToolCallExtraction, extract_tool_calls, looks_like_tool_call_markup};
pub use types::*;
