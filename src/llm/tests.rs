use super::*;
use crate::failover::{FailoverError, FailoverReason, RetryOptions, with_retry};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct Counters {
    health_probes: AtomicUsize,
    chats: AtomicUsize,
    auth_failures: AtomicUsize,
}

struct MockProvider {
    id: String,
    healthy: AtomicBool,
    health_delay: Option<Duration>,
    replies: Mutex<VecDeque<Result<ChatResponse, ProviderError>>>,
    counters: Arc<Counters>,
}

impl MockProvider {
    fn new(id: &str, healthy: bool) -> Self {
        Self {
            id: id.to_string(),
            healthy: AtomicBool::new(healthy),
            health_delay: None,
            replies: Mutex::new(VecDeque::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    fn with_health_delay(mut self, delay: Duration) -> Self {
        self.health_delay = Some(delay);
        self
    }

    fn with_replies(self, replies: Vec<Result<ChatResponse, ProviderError>>) -> Self {
        *self.replies.lock().unwrap() = replies.into();
        self
    }

    fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    fn boxed(self) -> Box<dyn Provider> {
        Box::new(self)
    }
}

impl Provider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Api
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn chat<'a>(
        &'a self,
        _messages: &'a [Message],
        _options: &'a ChatOptions,
    ) -> BoxFuture<'a, Result<ChatResponse, ProviderError>> {
        Box::pin(async move {
            self.counters.chats.fetch_add(1, Ordering::SeqCst);
            let next = self.replies.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(reply(&format!("hello from {}", self.id))))
        })
    }

    fn health(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            self.counters.health_probes.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.health_delay {
                tokio::time::sleep(delay).await;
            }
            self.healthy.load(Ordering::SeqCst)
        })
    }

    fn estimate_cost(&self, _messages: &[Message]) -> f64 {
        0.0
    }

    fn mark_auth_failure(&self) {
        self.counters.auth_failures.fetch_add(1, Ordering::SeqCst);
    }
}

fn reply(content: &str) -> ChatResponse {
    ChatResponse {
        content: content.to_string(),
        ..Default::default()
    }
}

fn base_config() -> ProviderManagerConfig {
    ProviderManagerConfig::default()
        .with_default_provider("primary")
        .with_fallback_chain(vec!["secondary".to_string(), "tertiary".to_string()])
}

fn with_ttl(mut config: ProviderManagerConfig, ttl_ms: u64, timeout_ms: u64) -> ProviderManagerConfig {
    config.health_check = HealthCheckConfig {
        timeout_ms,
        cache_ttl_ms: ttl_ms,
    };
    config
}

#[test]
fn test_routing_prefers_routed_provider() {
    let config = base_config().with_route(Action::Tools, "secondary");
    let manager = ProviderManager::with_providers(
        config,
        vec![
            MockProvider::new("primary", true).boxed(),
            MockProvider::new("secondary", true).boxed(),
        ],
    );

    assert_eq!(manager.get_provider(Action::Tools).unwrap().id(), "secondary");
    assert_eq!(manager.get_provider(Action::Chat).unwrap().id(), "primary");
    assert_eq!(manager.provider_ids(), vec!["primary", "secondary"]);
}

#[test]
fn test_embeddings_falls_back_to_default_then_chain() {
    let manager = ProviderManager::with_providers(
        base_config(),
        vec![MockProvider::new("primary", true).boxed()],
    );
    assert_eq!(
        manager.get_provider(Action::Embeddings).unwrap().id(),
        "primary"
    );

    let manager = ProviderManager::with_providers(
        base_config(),
        vec![MockProvider::new("tertiary", false).boxed()],
    );
    assert_eq!(
        manager.get_provider(Action::Embeddings).unwrap().id(),
        "tertiary"
    );

    let manager = ProviderManager::with_providers(
        base_config(),
        vec![MockProvider::new("unlisted", true).boxed()],
    );
    let err = manager.get_provider(Action::Embeddings).unwrap_err();
    assert_eq!(
        err,
        RoutingError::NoProviderForAction {
            action: Action::Embeddings
        }
    );
    assert!(!err.is_retryable());
}

#[test]
fn test_unregistered_route_uses_fallback_chain() {
    let config = base_config().with_route(Action::Subagent, "ghost");
    let manager = ProviderManager::with_providers(
        config,
        vec![
            MockProvider::new("primary", true).boxed(),
            MockProvider::new("secondary", true).boxed(),
        ],
    );
    assert_eq!(
        manager.get_provider(Action::Subagent).unwrap().id(),
        "secondary"
    );
}

#[tokio::test]
async fn test_select_best_skips_unhealthy() {
    let manager = ProviderManager::with_providers(
        base_config(),
        vec![
            MockProvider::new("primary", false).boxed(),
            MockProvider::new("tertiary", true).boxed(),
        ],
    );

    let best = manager.select_best_provider().await.unwrap();
    assert_eq!(best.id(), "tertiary");
    assert_eq!(manager.cached_health("primary"), Some(false));
    assert_eq!(manager.cached_health("tertiary"), Some(true));
    assert_eq!(manager.cached_health("secondary"), None);
}

#[tokio::test]
async fn test_no_healthy_provider() {
    let manager = ProviderManager::with_providers(
        base_config(),
        vec![
            MockProvider::new("primary", false).boxed(),
            MockProvider::new("secondary", false).boxed(),
        ],
    );
    assert_eq!(
        manager.select_best_provider().await.unwrap_err(),
        RoutingError::NoHealthyProvider
    );
}

#[tokio::test]
async fn test_health_cache_respects_ttl() {
    let primary = MockProvider::new("primary", true);
    let counters = primary.counters();
    let manager =
        ProviderManager::with_providers(with_ttl(base_config(), 150, 1_000), vec![primary.boxed()]);

    manager.select_best_provider().await.unwrap();
    manager.select_best_provider().await.unwrap();
    assert_eq!(counters.health_probes.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    manager.select_best_provider().await.unwrap();
    assert_eq!(counters.health_probes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_health_probe_timeout_is_cached_as_down() {
    let slow = MockProvider::new("primary", true).with_health_delay(Duration::from_secs(5));
    let counters = slow.counters();
    let manager = ProviderManager::with_providers(
        with_ttl(base_config(), 60_000, 20),
        vec![slow.boxed(), MockProvider::new("secondary", true).boxed()],
    );

    let best = manager.select_best_provider().await.unwrap();
    assert_eq!(best.id(), "secondary");
    assert_eq!(manager.check_health("primary").await, Some(false));
    assert_eq!(counters.health_probes.load(Ordering::SeqCst), 1);
    assert_eq!(manager.check_health("nope").await, None);
}

#[tokio::test]
async fn test_report_auth_failure_invalidates_cache() {
    let primary = MockProvider::new("primary", true);
    let counters = primary.counters();
    let manager = ProviderManager::with_providers(base_config(), vec![primary.boxed()]);

    assert_eq!(manager.check_health("primary").await, Some(true));
    assert!(manager.report_auth_failure("primary"));
    assert_eq!(counters.auth_failures.load(Ordering::SeqCst), 1);
    assert_eq!(manager.cached_health("primary"), None);

    manager.check_health("primary").await;
    assert_eq!(counters.health_probes.load(Ordering::SeqCst), 2);
    assert!(!manager.report_auth_failure("missing"));
}

#[tokio::test]
async fn test_health_report_covers_all_providers() {
    let manager = ProviderManager::with_providers(
        base_config(),
        vec![
            MockProvider::new("secondary", false).boxed(),
            MockProvider::new("primary", true).boxed(),
        ],
    );
    assert_eq!(
        manager.health_report().await,
        vec![("primary".to_string(), true), ("secondary".to_string(), false)]
    );
}

#[test]
fn test_construction_failures_are_isolated() {
    let config = base_config()
        .with_provider("primary", ProviderConfig::api("not a url", "m"))
        .with_provider(
            "secondary",
            ProviderConfig::cli(CliFlavor::Generic, "m")
                .with_command("no-such-binary-for-modelgate-tests", Vec::new()),
        )
        .with_provider("tertiary", ProviderConfig::local_network("llama3"));

    let manager = ProviderManager::new(config, TracingProviderLogger::shared(Default::default()));

    assert_eq!(manager.provider_ids(), vec!["tertiary"]);
    assert_eq!(manager.get_provider(Action::Chat).unwrap().id(), "tertiary");
    assert_eq!(
        manager.provider("tertiary").unwrap().kind(),
        ProviderKind::LocalNetwork
    );
}

#[tokio::test]
async fn test_retry_over_routed_provider() {
    let rate_limited = || {
        Err(ProviderError::Http {
            status: 429,
            message: "slow down".to_string(),
        })
    };
    let primary = MockProvider::new("primary", true)
        .with_replies(vec![rate_limited(), rate_limited(), Ok(reply("finally"))]);
    let counters = primary.counters();
    let manager = ProviderManager::with_providers(base_config(), vec![primary.boxed()]);

    let provider = manager.get_provider(Action::Chat).unwrap();
    let messages = vec![Message::user("hi")];
    let options = ChatOptions::default();
    let options_fast = RetryOptions::default()
        .with_delays(Duration::from_millis(1), Duration::from_millis(5));

    let response = with_retry(|| provider.chat(&messages, &options), options_fast)
        .await
        .unwrap();
    assert_eq!(response.content, "finally");
    assert_eq!(counters.chats.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_auth_failure_surfaces_typed_error() {
    let primary = MockProvider::new("primary", true).with_replies(vec![Err(ProviderError::Http {
        status: 401,
        message: "invalid api key".to_string(),
    })]);
    let counters = primary.counters();
    let manager = ProviderManager::with_providers(base_config(), vec![primary.boxed()]);

    let provider = manager.get_provider(Action::Chat).unwrap();
    let messages = vec![Message::user("hi")];
    let options = ChatOptions::default();
    let err = with_retry(|| provider.chat(&messages, &options), RetryOptions::default())
        .await
        .unwrap_err();

    let typed = FailoverError::from_provider_error(err, Some(provider.id()), Some(provider.model()));
    assert_eq!(typed.reason, FailoverReason::Auth);
    assert_eq!(typed.status, Some(401));
    assert_eq!(typed.provider_id.as_deref(), Some("primary"));
    assert_eq!(counters.chats.load(Ordering::SeqCst), 1);
}

#[test]
fn test_factory_builds_provider_per_kind() {
    let logger = TracingProviderLogger::shared(Default::default());

    let api = ProviderFactory::create(
        "api",
        &ProviderConfig::api("http://localhost:8080/v1", "gpt-test"),
        logger.clone(),
    )
    .unwrap();
    assert_eq!(api.kind(), ProviderKind::Api);
    assert!(api.supports_embeddings());

    let local =
        ProviderFactory::create("local", &ProviderConfig::local_network("llama3"), logger.clone())
            .unwrap();
    assert_eq!(local.kind(), ProviderKind::LocalNetwork);
    assert_eq!(local.estimate_cost(&[Message::user("hi")]), 0.0);

    let cli = ProviderFactory::create(
        "cli",
        &ProviderConfig::cli(CliFlavor::Generic, "").with_command("sh", Vec::new()),
        logger.clone(),
    )
    .unwrap();
    assert_eq!(cli.kind(), ProviderKind::Cli);
    assert!(!cli.supports_embeddings());

    let bad_url = ProviderFactory::create("bad", &ProviderConfig::api("not a url", "m"), logger);
    assert!(bad_url.is_err());
}
