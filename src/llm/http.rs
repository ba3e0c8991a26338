//! Shared plumbing for the HTTP-backed providers.

use crate::env;
use crate::llm::config::ProviderConfig;
use crate::llm::error::{ProviderError, truncate_chars};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

pub(crate) fn build_client(config: &ProviderConfig) -> Result<Client, ProviderError> {
    let timeout = config
        .timeout_ms
        .unwrap_or(env::api::DEFAULT_REQUEST_TIMEOUT_MS);
    Client::builder()
        .timeout(Duration::from_millis(timeout))
        .build()
        .map_err(|e| ProviderError::Config(format!("Failed to build HTTP client: {e}")))
}

/// Validate `raw` and return it without a trailing slash.
pub(crate) fn parse_base_url(id: &str, raw: &str) -> Result<String, ProviderError> {
    let url = Url::parse(raw.trim()).map_err(|e| {
        ProviderError::Config(format!("Invalid base_url '{raw}' for provider '{id}': {e}"))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProviderError::Config(format!(
            "base_url '{raw}' for provider '{id}' must use http or https"
        )));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{base_url}/{}", path.trim_start_matches('/'))
}

/// Send `request`, turning non-2xx statuses into [`ProviderError::Http`] and
/// decoding the body as `T`.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
) -> Result<T, ProviderError> {
    let response = request.send().await.map_err(ProviderError::from_reqwest)?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            truncate_chars(body.trim(), env::api::MAX_ERROR_BODY_CHARS)
        };
        return Err(ProviderError::Http {
            status: status.as_u16(),
            message,
        });
    }

    response.json::<T>().await.map_err(ProviderError::from_reqwest)
}

/// GET `url` and report whether it answered with a 2xx status.
pub(crate) async fn probe(request: RequestBuilder) -> bool {
    match request.send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}
