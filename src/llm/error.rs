use crate::failover::FailoverError;

/// Error surfaced by every provider operation.
///
/// Raw transport and process failures are converted into one of these variants
/// at the provider boundary, so the failover classifier works on a stable shape
/// (status, machine code, timeout flag, message) instead of probing arbitrary
/// error values.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Network error{}: {message}", code_suffix(.code))]
    Network {
        code: Option<String>,
        message: String,
    },
    #[error("Request timed out: {message}")]
    Timeout {
        message: String,
        partial_output: Option<String>,
    },
    #[error("Request aborted: {reason}")]
    Aborted { reason: String },
    #[error("Process exited with code {}: {message}", exit_code(.code))]
    ProcessFailed { code: Option<i32>, message: String },
    #[error("Failed to spawn process: {0}")]
    Spawn(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Operation not supported by this provider: {0}")]
    Unsupported(String),
    #[error("Invalid provider configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Failover(#[from] FailoverError),
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_ref().map(|c| format!(" ({c})")).unwrap_or_default()
}

fn exit_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "<signal>".to_string())
}

impl ProviderError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            ProviderError::Failover(e) => e.status,
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            ProviderError::Network { code, .. } => code.as_deref(),
            ProviderError::Failover(e) => e.code.as_deref(),
            _ => None,
        }
    }

    /// True for errors that are timeouts by construction rather than by wording.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Timeout { .. })
    }

    /// Output captured before a CLI process was killed, if any.
    pub fn partial_output(&self) -> Option<&str> {
        match self {
            ProviderError::Timeout { partial_output, .. } => partial_output.as_deref(),
            _ => None,
        }
    }

    /// Map a reqwest failure onto a classifiable variant.
    ///
    /// reqwest does not expose OS error codes, so a code is synthesized from
    /// the failure category to feed the classifier's transient-network check.
    /// The request URL is dropped: ports and paths would otherwise leak status
    /// lookalikes such as `401` into the text the classifier reads.
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        let error = error.without_url();
        if error.is_timeout() {
            return ProviderError::Timeout {
                message: error.to_string(),
                partial_output: None,
            };
        }
        if let Some(status) = error.status() {
            return ProviderError::Http {
                status: status.as_u16(),
                message: error.to_string(),
            };
        }
        if error.is_decode() {
            return ProviderError::InvalidResponse(error.to_string());
        }

        let code = if error.is_connect() {
            Some("ECONNREFUSED")
        } else if error.is_request() || error.is_body() {
            Some("ECONNRESET")
        } else {
            None
        };
        ProviderError::Network {
            code: code.map(str::to_string),
            message: error.to_string(),
        }
    }
}

/// Truncate `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}
