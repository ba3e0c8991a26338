//! Provider backed by a locally installed command-line model tool.
//!
//! The conversation is flattened into a role-tagged prompt, handed to the
//! tool using its own argument convention, and the captured stdout is
//! normalized into answer text. A hard wall-clock timeout kills the process
//! and reports whatever output had arrived so far.

use crate::env;
use crate::llm::cli_output::normalize_output;
use crate::llm::config::{CliFlavor, ProviderConfig};
use crate::llm::error::{ProviderError, truncate_chars};
use crate::llm::provider::Provider;
use crate::llm::provider_logger::{LogContext, Operation, SharedProviderLogger};
use crate::llm::tool_call_parser::{ToolCallExtraction, extract_tool_calls};
use crate::llm::types::{
    ChatOptions, ChatResponse, FinishReason, Message, ProviderKind, Role, ThinkingLevel, Usage,
    estimate_tokens,
};
use futures::future::BoxFuture;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use which::which;

type SharedBuffer = Arc<Mutex<Vec<u8>>>;

#[derive(Debug)]
pub struct CliProvider {
    id: String,
    name: String,
    model: String,
    flavor: CliFlavor,
    command: String,
    args: Vec<String>,
    health_args: Vec<String>,
    timeout: Duration,
    logger: SharedProviderLogger,
}

/// Captured result of a process that exited on its own.
struct ProcessOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl CliProvider {
    pub fn new(
        id: &str,
        config: &ProviderConfig,
        logger: SharedProviderLogger,
    ) -> Result<Self, ProviderError> {
        let flavor = config.cli_flavor();
        let command = config
            .command
            .clone()
            .or_else(|| flavor.default_command().map(str::to_string))
            .ok_or_else(|| {
                ProviderError::Config(format!("CLI provider '{id}' has no command configured"))
            })?;

        if which(&command).is_err() {
            return Err(ProviderError::Config(format!(
                "CLI command '{command}' for provider '{id}' was not found on PATH"
            )));
        }
        if flavor == CliFlavor::Ollama && config.model.trim().is_empty() {
            return Err(ProviderError::Config(format!(
                "ollama CLI provider '{id}' needs a model"
            )));
        }

        Ok(Self {
            id: id.to_string(),
            name: config.display_name(id),
            model: config.model.clone(),
            flavor,
            command,
            args: config.args.clone(),
            health_args: config
                .health_args
                .clone()
                .unwrap_or_else(|| vec![env::cli::DEFAULT_VERSION_FLAG.to_string()]),
            timeout: config.cli_timeout(),
            logger,
        })
    }

    pub fn flavor(&self) -> CliFlavor {
        self.flavor
    }

    /// Full argument list for `prompt`: configured args, model flag, then the
    /// flavor's prompt convention.
    pub fn build_args(&self, prompt: &str) -> Vec<String> {
        let mut args = self.args.clone();
        let has_model = !self.model.trim().is_empty();

        match self.flavor {
            CliFlavor::Claude | CliFlavor::Gemini | CliFlavor::Codex | CliFlavor::Kimi
                if has_model =>
            {
                args.extend(["--model".to_string(), self.model.clone()]);
            }
            _ => {}
        }

        match self.flavor {
            CliFlavor::Claude => args.extend(["-p".to_string(), prompt.to_string()]),
            CliFlavor::Gemini => args.extend(["--prompt".to_string(), prompt.to_string()]),
            CliFlavor::Codex => args.extend(["exec".to_string(), prompt.to_string()]),
            CliFlavor::Kimi => args.extend([
                "--print".to_string(),
                "-c".to_string(),
                prompt.to_string(),
            ]),
            CliFlavor::Ollama => args.extend([
                "run".to_string(),
                self.model.clone(),
                prompt.to_string(),
            ]),
            CliFlavor::Generic => args.push(prompt.to_string()),
        }
        args
    }

    fn command_line(&self, args: &[String]) -> String {
        std::iter::once(self.command.as_str())
            .chain(args.iter().map(String::as_str))
            .map(|part| shell_escape::escape(part.into()).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn run_chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ChatResponse, ProviderError> {
        let prompt = build_prompt(messages, options.thinking);
        let args = self.build_args(&prompt);

        let output = self.run_process(&args, self.timeout).await?;
        if !output.status.success() {
            return Err(ProviderError::ProcessFailed {
                code: output.status.code(),
                message: failure_message(&output.stderr, &output.stdout),
            });
        }

        let content = normalize_output(self.flavor, &output.stdout);
        let usage = Usage::new(estimate_tokens(&prompt), estimate_tokens(&content));

        if !options.tools.is_empty()
            && let ToolCallExtraction::Found {
                tool_calls,
                cleaned_content,
                ..
            } = extract_tool_calls(&content)
        {
            debug!(
                provider = %self.id,
                count = tool_calls.len(),
                "Recovered tool calls from CLI output"
            );
            return Ok(ChatResponse {
                content: cleaned_content,
                tool_calls,
                finish_reason: FinishReason::ToolCalls,
                usage: Some(usage),
            });
        }

        Ok(ChatResponse {
            content,
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
            usage: Some(usage),
        })
    }

    /// Spawn the command and wait for it, killing it once `timeout` elapses.
    ///
    /// A process that exits on its own (successfully or not) yields its
    /// output; a killed one yields [`ProviderError::Timeout`] with the stdout
    /// captured before the kill.
    async fn run_process(
        &self,
        args: &[String],
        timeout: Duration,
    ) -> Result<ProcessOutput, ProviderError> {
        debug!(
            provider = %self.id,
            command = %truncate_chars(&self.command_line(args), env::logging::DEFAULT_MAX_PREVIEW_CHARS),
            timeout_ms = timeout.as_millis() as u64,
            "Spawning CLI process"
        );

        let mut child = Command::new(&self.command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProviderError::Spawn(format!("{}: {e}", self.command)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProviderError::Spawn("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProviderError::Spawn("Failed to capture stderr".to_string()))?;

        let stdout_buf = SharedBuffer::default();
        let stderr_buf = SharedBuffer::default();
        let mut readers = [
            tokio::spawn(drain(stdout, Arc::clone(&stdout_buf))),
            tokio::spawn(drain(stderr, Arc::clone(&stderr_buf))),
        ];

        let waited = tokio::time::timeout(timeout, child.wait()).await;
        let killed = waited.is_err();
        if killed {
            warn!(
                provider = %self.id,
                timeout_ms = timeout.as_millis() as u64,
                "CLI process timed out, killing it"
            );
            if let Err(e) = child.kill().await {
                warn!(provider = %self.id, "Failed to kill CLI process: {}", e);
            }
        }

        finish_readers(&mut readers).await;
        let stdout = take_text(&stdout_buf);
        let stderr = take_text(&stderr_buf);

        match waited {
            Err(_) => Err(ProviderError::Timeout {
                message: format!(
                    "CLI process '{}' exceeded {}ms",
                    self.command,
                    timeout.as_millis()
                ),
                partial_output: (!stdout.trim().is_empty()).then_some(stdout),
            }),
            Ok(Err(e)) => Err(ProviderError::Spawn(format!(
                "Failed to wait for '{}': {e}",
                self.command
            ))),
            Ok(Ok(status)) => Ok(ProcessOutput {
                status,
                stdout,
                stderr,
            }),
        }
    }
}

impl Provider for CliProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Cli
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
            let ctx = LogContext::new(&self.id, ProviderKind::Cli, &self.model, Operation::Chat);
            ctx.start(self.logger.as_ref());

            let result = self.run_chat(messages, options).await;
            match &result {
                Ok(response) => ctx.finish(self.logger.as_ref(), true, &response.content),
                Err(e) => ctx.finish(self.logger.as_ref(), false, &e.to_string()),
            }
            result
        })
    }

    fn health(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let ctx = LogContext::new(&self.id, ProviderKind::Cli, &self.model, Operation::Health);
            ctx.start(self.logger.as_ref());

            let timeout = Duration::from_millis(env::cli::HEALTH_TIMEOUT_MS);
            let healthy = match self.run_process(&self.health_args, timeout).await {
                Ok(output) => output.status.success(),
                Err(e) => {
                    debug!(provider = %self.id, error = %e, "CLI health probe failed");
                    false
                }
            };

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

/// Flatten a conversation into role-tagged text blocks.
pub fn build_prompt(messages: &[Message], thinking: ThinkingLevel) -> String {
    let mut blocks = Vec::with_capacity(messages.len() + 1);

    if thinking != ThinkingLevel::Off {
        blocks.push(format!("Thinking level: {}", thinking.as_str()));
    }

    for message in messages {
        let prefix = match message.role {
            Role::System => "System:",
            Role::User => "User:",
            Role::Assistant => "Assistant:",
            Role::Tool => "Tool result:",
        };
        let mut block = format!("{prefix} {}", message.content.trim());
        for call in &message.tool_calls {
            let arguments = serde_json::Value::Object(call.arguments.clone());
            block.push_str(&format!("\nTool call: {} {}", call.name, arguments));
        }
        blocks.push(block);
    }

    blocks.join("\n\n")
}

/// Stderr, else stdout, else a generic note, bounded for error reporting.
fn failure_message(stderr: &str, stdout: &str) -> String {
    let text = [stderr.trim(), stdout.trim()]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or("CLI process failed without output");
    truncate_chars(text, env::cli::MAX_ERROR_CHARS)
}

async fn drain<R>(mut reader: R, buffer: SharedBuffer)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buffer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(&chunk[..n]),
            Err(e) => {
                debug!("Error reading CLI output: {}", e);
                break;
            }
        }
    }
}

/// Let the pipe readers reach EOF, within a grace period. Descendants that
/// inherited the pipes can keep them open after the child exits.
async fn finish_readers(readers: &mut [JoinHandle<()>; 2]) {
    let grace = Duration::from_millis(env::cli::KILL_DRAIN_GRACE_MS);
    let joined = tokio::time::timeout(grace, async {
        for reader in readers.iter_mut() {
            let _ = reader.await;
        }
    })
    .await;

    if joined.is_err() {
        for reader in readers.iter() {
            reader.abort();
        }
    }
}

fn take_text(buffer: &SharedBuffer) -> String {
    let bytes = std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner));
    String::from_utf8_lossy(&bytes).into_owned()
}
