use crate::llm::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a provider call failed, as far as failover decisions are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverReason {
    Auth,
    RateLimit,
    Timeout,
    Billing,
    Format,
    Compaction,
    Unknown,
}

impl FailoverReason {
    /// Primary retryability table.
    ///
    /// Returns `None` for [`FailoverReason::Unknown`]: callers must fall back to
    /// the coarser text check in [`crate::failover::is_retryable`].
    pub fn is_retryable(self) -> Option<bool> {
        match self {
            FailoverReason::RateLimit | FailoverReason::Timeout => Some(true),
            FailoverReason::Auth
            | FailoverReason::Billing
            | FailoverReason::Format
            | FailoverReason::Compaction => Some(false),
            FailoverReason::Unknown => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailoverReason::Auth => "auth",
            FailoverReason::RateLimit => "rate_limit",
            FailoverReason::Timeout => "timeout",
            FailoverReason::Billing => "billing",
            FailoverReason::Format => "format",
            FailoverReason::Compaction => "compaction",
            FailoverReason::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailoverReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified provider failure.
///
/// Built once where a raw [`ProviderError`] is caught, then handed to the retry
/// executor and finally to the caller for reporting.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason} failure{}: {message}", provider_suffix(.provider_id, .model))]
pub struct FailoverError {
    pub reason: FailoverReason,
    pub provider_id: Option<String>,
    pub model: Option<String>,
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
    #[source]
    pub cause: Option<Box<ProviderError>>,
}

fn provider_suffix(provider_id: &Option<String>, model: &Option<String>) -> String {
    match (provider_id, model) {
        (Some(id), Some(model)) => format!(" ({id}/{model})"),
        (Some(id), None) => format!(" ({id})"),
        (None, Some(model)) => format!(" ({model})"),
        (None, None) => String::new(),
    }
}

impl FailoverError {
    pub fn new(reason: FailoverReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            provider_id: None,
            model: None,
            status: None,
            code: None,
            message: message.into(),
            cause: None,
        }
    }

    /// Classify `error` and wrap it, tagging the originating provider.
    ///
    /// Unclassifiable errors get [`FailoverReason::Unknown`]. An error that is
    /// already a [`ProviderError::Failover`] keeps its reason and only picks up
    /// missing origin fields.
    pub fn from_provider_error(
        error: ProviderError,
        provider_id: Option<&str>,
        model: Option<&str>,
    ) -> Self {
        if let ProviderError::Failover(mut existing) = error {
            if existing.provider_id.is_none() {
                existing.provider_id = provider_id.map(str::to_string);
            }
            if existing.model.is_none() {
                existing.model = model.map(str::to_string);
            }
            return existing;
        }

        let reason = super::classify(&error).unwrap_or(FailoverReason::Unknown);
        Self {
            reason,
            provider_id: provider_id.map(str::to_string),
            model: model.map(str::to_string),
            status: error.status(),
            code: error.code().map(str::to_string),
            message: error.to_string(),
            cause: Some(Box::new(error)),
        }
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self.model = Some(model.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn is_retryable(&self) -> bool {
        super::is_retryable(Some(self.reason), &self.message)
    }
}
