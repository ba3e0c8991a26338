//! Provider registry, routing and health-aware selection.

use crate::llm::config::ProviderManagerConfig;
use crate::llm::provider::{Provider, ProviderFactory};
use crate::llm::provider_logger::SharedProviderLogger;
use crate::llm::types::Action;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Fatal routing failures. Never retried by this layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("No provider available for action '{action}'")]
    NoProviderForAction { action: Action },
    #[error("No healthy providers available")]
    NoHealthyProvider,
}

impl RoutingError {
    pub fn is_retryable(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy)]
struct HealthEntry {
    ok: bool,
    checked_at: Instant,
}

/// Owns every configured provider plus the health cache.
///
/// Construction never fails: a provider whose construction fails is logged and
/// left out of the registry.
pub struct ProviderManager {
    config: ProviderManagerConfig,
    providers: BTreeMap<String, Box<dyn Provider>>,
    health: DashMap<String, HealthEntry>,
}

impl fmt::Debug for ProviderManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderManager")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("default_provider", &self.config.default_provider)
            .field("fallback_chain", &self.config.fallback_chain)
            .field("cached_health_entries", &self.health.len())
            .finish()
    }
}

impl ProviderManager {
    pub fn new(config: ProviderManagerConfig, logger: SharedProviderLogger) -> Self {
        let mut providers = BTreeMap::new();

        for (id, provider_config) in &config.providers {
            match ProviderFactory::create(id, provider_config, Arc::clone(&logger)) {
                Ok(provider) => {
                    info!(
                        provider = %id,
                        kind = %provider_config.kind,
                        model = %provider_config.model,
                        "Registered provider"
                    );
                    providers.insert(id.clone(), provider);
                }
                Err(e) => {
                    warn!(provider = %id, error = %e, "Skipping provider that failed to initialize");
                }
            }
        }

        Self::assemble(config, providers)
    }

    /// Build a manager around already constructed providers, keyed by their ids.
    pub fn with_providers(
        config: ProviderManagerConfig,
        providers: Vec<Box<dyn Provider>>,
    ) -> Self {
        let providers = providers
            .into_iter()
            .map(|provider| (provider.id().to_string(), provider))
            .collect();
        Self::assemble(config, providers)
    }

    fn assemble(
        config: ProviderManagerConfig,
        providers: BTreeMap<String, Box<dyn Provider>>,
    ) -> Self {
        for warning in config.validate() {
            warn!("Configuration: {}", warning);
        }
        Self {
            config,
            providers,
            health: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ProviderManagerConfig {
        &self.config
    }

    pub fn provider(&self, id: &str) -> Option<&dyn Provider> {
        self.providers.get(id).map(|provider| provider.as_ref())
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Routing lookup for `action`; no health check is involved.
    ///
    /// The routed id (or the default provider when the action has no route)
    /// wins if registered, otherwise the first registered fallback.
    pub fn get_provider(&self, action: Action) -> Result<&dyn Provider, RoutingError> {
        if let Some(id) = self.config.routed_id(action)
            && let Some(provider) = self.provider(id)
        {
            return Ok(provider);
        }

        let fallback = self
            .config
            .fallback_chain
            .iter()
            .find_map(|id| self.provider(id));
        match fallback {
            Some(provider) => {
                debug!(
                    action = %action,
                    provider = %provider.id(),
                    "Routed provider unavailable, using fallback chain"
                );
                Ok(provider)
            }
            None => Err(RoutingError::NoProviderForAction { action }),
        }
    }

    /// First provider in preference order (chat route or default, then the
    /// fallback chain) whose health check passes.
    pub async fn select_best_provider(&self) -> Result<&dyn Provider, RoutingError> {
        for id in self.config.preference_order() {
            let Some(provider) = self.provider(id) else {
                continue;
            };
            if self.probe(provider).await {
                return Ok(provider);
            }
            debug!(provider = %id, "Skipping unhealthy provider");
        }
        Err(RoutingError::NoHealthyProvider)
    }

    /// Cached, time-boxed health of a registered provider.
    pub async fn check_health(&self, id: &str) -> Option<bool> {
        let provider = self.provider(id)?;
        Some(self.probe(provider).await)
    }

    /// Health of every registered provider, in id order.
    pub async fn health_report(&self) -> Vec<(String, bool)> {
        let mut report = Vec::with_capacity(self.providers.len());
        for (id, provider) in &self.providers {
            report.push((id.clone(), self.probe(provider.as_ref()).await));
        }
        report
    }

    /// Forward an auth failure to the provider's credential rotation and
    /// forget its cached health. Returns `false` for unknown ids.
    pub fn report_auth_failure(&self, id: &str) -> bool {
        match self.provider(id) {
            Some(provider) => {
                provider.mark_auth_failure();
                self.invalidate_health(id);
                true
            }
            None => false,
        }
    }

    pub fn invalidate_health(&self, id: &str) {
        self.health.remove(id);
    }

    /// Cached result still within its TTL, if any.
    pub fn cached_health(&self, id: &str) -> Option<bool> {
        let ttl = self.config.health_check.cache_ttl();
        self.health
            .get(id)
            .map(|entry| *entry)
            .filter(|entry| entry.checked_at.elapsed() < ttl)
            .map(|entry| entry.ok)
    }

    /// Reuse a fresh cache entry or probe with a timeout and record the result.
    ///
    /// Concurrent probes for the same id may both run; the last write wins.
    async fn probe(&self, provider: &dyn Provider) -> bool {
        let id = provider.id();
        if let Some(ok) = self.cached_health(id) {
            return ok;
        }

        let timeout = self.config.health_check.timeout();
        let ok = match tokio::time::timeout(timeout, provider.health()).await {
            Ok(ok) => ok,
            Err(_) => {
                warn!(
                    provider = %id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Health check timed out"
                );
                false
            }
        };

        self.health.insert(
            id.to_string(),
            HealthEntry {
                ok,
                checked_at: Instant::now(),
            },
        );
        ok
    }
}
