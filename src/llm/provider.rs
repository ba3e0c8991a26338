use crate::llm::api_provider::ApiProvider;
use crate::llm::cli_provider::CliProvider;
use crate::llm::config::ProviderConfig;
use crate::llm::error::ProviderError;
use crate::llm::local_provider::LocalProvider;
use crate::llm::provider_logger::SharedProviderLogger;
use crate::llm::types::{ChatOptions, ChatResponse, Message, ProviderKind};
use futures::future::BoxFuture;

/// Uniform contract implemented by every backend family.
pub trait Provider: Send + Sync {
    /// Registry id, unique within a manager
    fn id(&self) -> &str;

    /// Human readable name
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Target model identifier
    fn model(&self) -> &str;

    /// Run one chat completion.
    ///
    /// Backend failures surface as a [`ProviderError`] carrying enough signal
    /// (status, code, message) for the failover classifier.
    fn chat<'a>(
        &'a self,
        messages: &'a [Message],
        options: &'a ChatOptions,
    ) -> BoxFuture<'a, Result<ChatResponse, ProviderError>>;

    fn supports_embeddings(&self) -> bool {
        false
    }

    /// One vector per input text, in input order.
    fn embeddings<'a>(
        &'a self,
        _texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Vec<f32>>, ProviderError>> {
        Box::pin(async { Err(ProviderError::Unsupported("embeddings".to_string())) })
    }

    /// Cheap liveness probe. Never fails; any error resolves to `false`.
    fn health(&self) -> BoxFuture<'_, bool>;

    /// Local, deterministic cost estimate for sending `messages`.
    fn estimate_cost(&self, messages: &[Message]) -> f64;

    /// Signal that the credential used for the last call was rejected.
    fn mark_auth_failure(&self) {}
}

impl std::fmt::Debug for dyn Provider + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("model", &self.model())
            .finish()
    }
}

/// Factory for creating providers from configuration
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create(
        id: &str,
        config: &ProviderConfig,
        logger: SharedProviderLogger,
    ) -> Result<Box<dyn Provider>, ProviderError> {
        match config.kind {
            ProviderKind::Api => Ok(Box::new(ApiProvider::new(id, config, logger)?)),
            ProviderKind::Cli => Ok(Box::new(CliProvider::new(id, config, logger)?)),
            ProviderKind::LocalNetwork => Ok(Box::new(LocalProvider::new(id, config, logger)?)),
        }
    }
}
