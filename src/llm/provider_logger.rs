//! Logging boundary for provider interactions.
//!
//! Every provider operation reports a start event and a completion event
//! through an injected [`ProviderLogger`]. The default sink,
//! [`TracingProviderLogger`], forwards them to `tracing`; embedders may plug in
//! their own sink (audit files, metrics, a dashboard feed).
//!
//! ## Example Usage
//!
//! ```rust
//! use modelgate::llm::provider_logger::{LogContext, Operation, TracingProviderLogger};
//! use modelgate::llm::ProviderKind;
//!
//! let logger = TracingProviderLogger::default();
//! let ctx = LogContext::new("openai", ProviderKind::Api, "gpt-4o-mini", Operation::Chat);
//! ctx.start(&logger);
//! // ... perform the request ...
//! ctx.finish(&logger, true, "Hello there");
//! ```

use crate::env;
use crate::llm::error::truncate_chars;
use crate::llm::types::ProviderKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Shared handle passed to every provider.
pub type SharedProviderLogger = Arc<dyn ProviderLogger>;

/// Configuration for provider logging behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderLoggerConfig {
    /// Enable/disable all logging
    pub enabled: bool,
    /// Maximum characters to show in log previews
    pub max_preview_chars: usize,
}

impl Default for ProviderLoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_preview_chars: env::logging::DEFAULT_MAX_PREVIEW_CHARS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Chat,
    Embeddings,
    Health,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Chat => "chat",
            Operation::Embeddings => "embeddings",
            Operation::Health => "health",
        })
    }
}

/// Structured record of one provider call.
///
/// Start events carry no timing, outcome or preview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderLogEvent {
    pub provider_id: String,
    pub kind: ProviderKind,
    pub model: String,
    pub operation: Operation,
    pub elapsed: Option<Duration>,
    pub success: Option<bool>,
    pub preview: Option<String>,
}

/// Sink for provider log events.
pub trait ProviderLogger: Send + Sync + fmt::Debug {
    fn request_started(&self, event: &ProviderLogEvent);

    fn request_finished(&self, event: &ProviderLogEvent);

    /// Previews longer than this are truncated before reaching the sink.
    fn max_preview_chars(&self) -> usize {
        env::logging::DEFAULT_MAX_PREVIEW_CHARS
    }
}

/// Default sink: structured `tracing` events.
#[derive(Debug, Clone, Default)]
pub struct TracingProviderLogger {
    config: ProviderLoggerConfig,
}

impl TracingProviderLogger {
    pub fn new(config: ProviderLoggerConfig) -> Self {
        Self { config }
    }

    pub fn shared(config: ProviderLoggerConfig) -> SharedProviderLogger {
        Arc::new(Self::new(config))
    }
}

impl ProviderLogger for TracingProviderLogger {
    fn request_started(&self, event: &ProviderLogEvent) {
        if !self.config.enabled {
            return;
        }
        debug!(
            provider = %event.provider_id,
            kind = %event.kind,
            model = %event.model,
            operation = %event.operation,
            "Provider request started"
        );
    }

    fn request_finished(&self, event: &ProviderLogEvent) {
        if !self.config.enabled {
            return;
        }
        let elapsed_ms = event.elapsed.map(|d| d.as_millis() as u64).unwrap_or(0);
        let preview = event.preview.as_deref().unwrap_or("");
        if event.success == Some(true) {
            info!(
                provider = %event.provider_id,
                kind = %event.kind,
                model = %event.model,
                operation = %event.operation,
                elapsed_ms,
                preview,
                "Provider request completed"
            );
        } else {
            warn!(
                provider = %event.provider_id,
                kind = %event.kind,
                model = %event.model,
                operation = %event.operation,
                elapsed_ms,
                error = preview,
                "Provider request failed"
            );
        }
    }

    fn max_preview_chars(&self) -> usize {
        self.config.max_preview_chars
    }
}

/// Context for a single request being logged.
#[derive(Debug, Clone)]
pub struct LogContext {
    provider_id: String,
    kind: ProviderKind,
    model: String,
    operation: Operation,
    started_at: Instant,
}

impl LogContext {
    pub fn new(
        provider_id: impl Into<String>,
        kind: ProviderKind,
        model: impl Into<String>,
        operation: Operation,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            kind,
            model: model.into(),
            operation,
            started_at: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn event(&self) -> ProviderLogEvent {
        ProviderLogEvent {
            provider_id: self.provider_id.clone(),
            kind: self.kind,
            model: self.model.clone(),
            operation: self.operation,
            elapsed: None,
            success: None,
            preview: None,
        }
    }

    pub fn start(&self, logger: &dyn ProviderLogger) {
        logger.request_started(&self.event());
    }

    pub fn finish(&self, logger: &dyn ProviderLogger, success: bool, preview: &str) {
        let event = ProviderLogEvent {
            elapsed: Some(self.elapsed()),
            success: Some(success),
            preview: Some(truncate_chars(preview, logger.max_preview_chars())),
            ..self.event()
        };
        logger.request_finished(&event);
    }
}
