//! # modelgate
//!
//! Provider routing and failover layer for LLM backends.
//!
//! A caller asks for "a model able to perform action X" and gets back a
//! provider behind one uniform contract, whether the model is reached over an
//! HTTP API, by spawning a command-line tool, or through a local inference
//! server. Failures are classified so that transient ones are retried with
//! exponential backoff and fatal ones surface immediately as typed errors.
//!
//! ## Architecture Overview
//!
//! - **[`llm`]**: provider contract, the three provider variants, the
//!   provider manager with its health cache, auth profile rotation, CLI output
//!   normalization and the tool-call extractor
//! - **[`failover`]**: failure classifier and retry executor
//! - **[`cli`]**: argument parsing and configuration discovery for the binary
//! - **[`env`]**: constants and path helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modelgate::failover::{RetryOptions, with_retry};
//! use modelgate::llm::{
//!     Action, ChatOptions, Message, ProviderManager, ProviderManagerConfig,
//!     TracingProviderLogger,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ProviderManagerConfig::from_toml_file("modelgate.toml")?;
//!     let manager = ProviderManager::new(config, TracingProviderLogger::shared(Default::default()));
//!
//!     let provider = manager.get_provider(Action::Chat)?;
//!     let messages = vec![Message::user("Summarize the release notes")];
//!     let options = ChatOptions::default();
//!
//!     let response = with_retry(|| provider.chat(&messages, &options), RetryOptions::default()).await?;
//!     println!("{}", response.content);
//!     Ok(())
//! }
//! ```

/// Provider-agnostic LLM interface.
///
/// Uniform provider contract over HTTP APIs, CLI tools and local inference
/// servers, plus routing and health-aware selection across them.
pub mod llm;

/// Failure classification and retry with exponential backoff.
pub mod failover;

/// Environment constants and path utilities.
///
/// Centralizes hardcoded paths, timeouts and limits used throughout the crate.
pub mod env;

// CLI module for the command-line interface
pub mod cli;

pub use failover::{FailoverError, FailoverReason, RetryOptions, with_retry};
pub use llm::{
    Action, ChatOptions, ChatResponse, Message, Provider, ProviderConfig, ProviderError,
    ProviderManager, ProviderManagerConfig, RoutingError,
};
