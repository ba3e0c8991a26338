//! Provider for hosted chat-completions style HTTP APIs.

use crate::env;
use crate::llm::auth::AuthProfileRing;
use crate::llm::config::ProviderConfig;
use crate::llm::error::ProviderError;
use crate::llm::http::{build_client, endpoint, parse_base_url, probe, send_json};
use crate::llm::provider::Provider;
use crate::llm::provider_logger::{LogContext, Operation, SharedProviderLogger};
use crate::llm::types::{
    ChatOptions, ChatResponse, FinishReason, Message, ProviderKind, ThinkingLevel, ToolCall,
    ToolChoice, Usage, coerce_arguments, estimate_message_tokens,
};
use chrono::Utc;
use futures::future::BoxFuture;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Mutex, PoisonError};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug)]
pub struct ApiProvider {
    id: String,
    name: String,
    model: String,
    embedding_model: String,
    base_url: String,
    client: Client,
    auth: Mutex<AuthProfileRing>,
    cost_per_1k_tokens: f64,
    logger: SharedProviderLogger,
}

impl ApiProvider {
    pub fn new(
        id: &str,
        config: &ProviderConfig,
        logger: SharedProviderLogger,
    ) -> Result<Self, ProviderError> {
        let raw_url = config.base_url.as_deref().ok_or_else(|| {
            ProviderError::Config(format!("API provider '{id}' requires a base_url"))
        })?;

        Ok(Self {
            id: id.to_string(),
            name: config.display_name(id),
            model: config.model.clone(),
            embedding_model: config
                .embedding_model
                .clone()
                .unwrap_or_else(|| config.model.clone()),
            base_url: parse_base_url(id, raw_url)?,
            client: build_client(config)?,
            auth: Mutex::new(AuthProfileRing::new(&config.resolved_auth_profiles())),
            cost_per_1k_tokens: config
                .cost_per_1k_tokens
                .unwrap_or(env::api::DEFAULT_COST_PER_1K_TOKENS),
            logger,
        })
    }

    /// Snapshot of the credential rotation state.
    pub fn auth_profiles(&self) -> AuthProfileRing {
        self.auth
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let key = self
            .auth
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .active_profile(Utc::now())
            .map(|profile| profile.api_key().to_string());
        match key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn run_chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ChatResponse, ProviderError> {
        let body = build_chat_request(&self.model, messages, options);
        let request = self
            .client
            .post(endpoint(&self.base_url, "chat/completions"))
            .json(&body);

        let response: WireChatResponse = send_json(self.authorized(request)).await?;
        map_chat_response(response)
    }

    async fn run_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let request = self
            .client
            .post(endpoint(&self.base_url, "embeddings"))
            .json(&json!({ "model": self.embedding_model, "input": texts }));

        let mut response: WireEmbeddingResponse = send_json(self.authorized(request)).await?;
        if response.data.len() != texts.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }
        response.data.sort_by_key(|item| item.index);
        Ok(response.data.into_iter().map(|item| item.embedding).collect())
    }
}

impl Provider for ApiProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Api
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn chat<'a>(
        &'a self,
        messages: &'a [Message],
        options: &'a ChatOptions,
    ) -> BoxFuture<'a, Result<ChatResponse, ProviderError>> {
        Box::pin(async move {
            let ctx = LogContext::new(&self.id, ProviderKind::Api, &self.model, Operation::Chat);
            ctx.start(self.logger.as_ref());

            let result = self.run_chat(messages, options).await;
            match &result {
                Ok(response) => ctx.finish(self.logger.as_ref(), true, &response.content),
                Err(e) => ctx.finish(self.logger.as_ref(), false, &e.to_string()),
            }
            result
        })
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    fn embeddings<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Vec<f32>>, ProviderError>> {
        Box::pin(async move {
            let ctx = LogContext::new(
                &self.id,
                ProviderKind::Api,
                &self.embedding_model,
                Operation::Embeddings,
            );
            ctx.start(self.logger.as_ref());

            let result = self.run_embeddings(texts).await;
            match &result {
                Ok(vectors) => ctx.finish(
                    self.logger.as_ref(),
                    true,
                    &format!("{} vectors", vectors.len()),
                ),
                Err(e) => ctx.finish(self.logger.as_ref(), false, &e.to_string()),
            }
            result
        })
    }

    fn health(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let ctx = LogContext::new(&self.id, ProviderKind::Api, &self.model, Operation::Health);
            ctx.start(self.logger.as_ref());

            let request = self.client.get(endpoint(&self.base_url, "models"));
            let healthy = probe(self.authorized(request)).await;

            ctx.finish(
                self.logger.as_ref(),
                healthy,
                if healthy { "ok" } else { "down" },
            );
            healthy
        })
    }

    fn estimate_cost(&self, messages: &[Message]) -> f64 {
        estimate_message_tokens(messages) as f64 / 1000.0 * self.cost_per_1k_tokens
    }

    fn mark_auth_failure(&self) {
        let mut ring = self.auth.lock().unwrap_or_else(PoisonError::into_inner);
        if ring.is_empty() {
            return;
        }
        ring.mark_failure(Utc::now());
        warn!(
            provider = %self.id,
            next_profile = ring.cursor(),
            profiles = ring.len(),
            "Auth failure reported, rotating credential profile"
        );
    }
}

#[derive(Debug, Serialize)]
struct WireChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<Value>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct WireChatResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct WireEmbeddingResponse {
    data: Vec<WireEmbedding>,
}

#[derive(Debug, Deserialize)]
struct WireEmbedding {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

fn build_chat_request<'a>(
    model: &'a str,
    messages: &'a [Message],
    options: &ChatOptions,
) -> WireChatRequest<'a> {
    let messages = messages
        .iter()
        .map(|message| WireMessage {
            role: message.role.as_str(),
            content: &message.content,
            tool_call_id: message.tool_call_id.as_deref(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": Value::Object(call.arguments.clone()).to_string(),
                        }
                    })
                })
                .collect(),
            name: message.name.as_deref(),
        })
        .collect();

    let tools = options
        .tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                }
            })
        })
        .collect();

    let tool_choice = options.tool_choice.as_ref().map(|choice| match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Tool(name) => json!({"type": "function", "function": {"name": name}}),
    });

    let reasoning = (options.thinking != ThinkingLevel::Off)
        .then(|| json!({ "effort": options.thinking.as_str() }));

    WireChatRequest {
        model,
        messages,
        temperature: options
            .temperature
            .unwrap_or(env::api::DEFAULT_TEMPERATURE),
        max_tokens: options.max_tokens,
        tools,
        tool_choice,
        reasoning,
    }
}

fn map_chat_response(response: WireChatResponse) -> Result<ChatResponse, ProviderError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("response contained no choices".to_string()))?;

    let tool_calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .into_iter()
        .filter(|call| !call.function.name.trim().is_empty())
        .map(|call| {
            let id = call
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call-{}", Uuid::new_v4()));
            let arguments = coerce_arguments(call.function.arguments.as_ref());
            ToolCall::new(id, call.function.name, arguments)
        })
        .collect();

    let finish_reason = match choice.finish_reason.as_deref() {
        _ if !tool_calls.is_empty() => FinishReason::ToolCalls,
        Some("tool_calls") => FinishReason::ToolCalls,
        Some("length") => FinishReason::Length,
        _ => FinishReason::Stop,
    };

    let usage = response.usage.map(|usage| Usage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: if usage.total_tokens > 0 {
            usage.total_tokens
        } else {
            usage.prompt_tokens + usage.completion_tokens
        },
    });

    Ok(ChatResponse {
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
        finish_reason,
        usage,
    })
}
