//! Provider for a local-network inference server (Ollama wire format).

use crate::env;
use crate::llm::config::ProviderConfig;
use crate::llm::error::ProviderError;
use crate::llm::http::{build_client, endpoint, parse_base_url, probe, send_json};
use crate::llm::provider::Provider;
use crate::llm::provider_logger::{LogContext, Operation, SharedProviderLogger};
use crate::llm::tool_call_parser::{ToolCallExtraction, extract_tool_calls};
use crate::llm::types::{ChatOptions, ChatResponse, FinishReason, Message, ProviderKind, Usage};
use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug)]
pub struct LocalProvider {
    id: String,
    name: String,
    model: String,
    embedding_model: String,
    base_url: String,
    client: Client,
    logger: SharedProviderLogger,
}

#[derive(Debug, Deserialize)]
struct WireChatResponse {
    message: WireMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireEmbedding {
    embedding: Vec<f32>,
}

impl LocalProvider {
    pub fn new(
        id: &str,
        config: &ProviderConfig,
        logger: SharedProviderLogger,
    ) -> Result<Self, ProviderError> {
        let raw_url = config
            .base_url
            .as_deref()
            .unwrap_or(env::api::DEFAULT_LOCAL_BASE_URL);

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
            logger,
        })
    }

    async fn run_chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ChatResponse, ProviderError> {
        let wire_messages: Vec<_> = messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();
        let temperature = options
            .temperature
            .unwrap_or(env::api::DEFAULT_TEMPERATURE);

        let mut model_options = json!({ "temperature": temperature });
        if let Some(max_tokens) = options.max_tokens {
            model_options["num_predict"] = json!(max_tokens);
        }

        let request = self.client.post(endpoint(&self.base_url, "api/chat")).json(&json!({
            "model": self.model,
            "messages": wire_messages,
            "stream": false,
            "options": model_options,
        }));
        let response: WireChatResponse = send_json(request).await?;

        let usage = match (response.prompt_eval_count, response.eval_count) {
            (None, None) => None,
            (prompt, completion) => Some(Usage::new(
                prompt.unwrap_or_default(),
                completion.unwrap_or_default(),
            )),
        };
        let finish_reason = match response.done_reason.as_deref() {
            Some("length") => FinishReason::Length,
            _ => FinishReason::Stop,
        };
        let content = response.message.content;

        if !options.tools.is_empty()
            && let ToolCallExtraction::Found {
                tool_calls,
                cleaned_content,
                ..
            } = extract_tool_calls(&content)
        {
            return Ok(ChatResponse {
                content: cleaned_content,
                tool_calls,
                finish_reason: FinishReason::ToolCalls,
                usage,
            });
        }

        Ok(ChatResponse {
            content,
            tool_calls: Vec::new(),
            finish_reason,
            usage,
        })
    }

    /// The server embeds one prompt per request.
    async fn run_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            let request = self
                .client
                .post(endpoint(&self.base_url, "api/embeddings"))
                .json(&json!({ "model": self.embedding_model, "prompt": text }));
            let response: WireEmbedding = send_json(request).await?;
            vectors.push(response.embedding);
        }
        Ok(vectors)
    }
}

impl Provider for LocalProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::LocalNetwork
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
            let ctx = LogContext::new(
                &self.id,
                ProviderKind::LocalNetwork,
                &self.model,
                Operation::Chat,
            );
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
                ProviderKind::LocalNetwork,
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
            let ctx = LogContext::new(
                &self.id,
                ProviderKind::LocalNetwork,
                &self.model,
                Operation::Health,
            );
            ctx.start(self.logger.as_ref());

            let healthy = probe(self.client.get(endpoint(&self.base_url, "api/tags"))).await;

            ctx.finish(
                self.logger.as_ref(),
                healthy,
                if healthy { "ok" } else { "down" },
            );
            healthy
        })
    }

    fn estimate_cost(&self, _messages: &[Message]) -> f64 {
        0.0
    }
}
