use anyhow::{Context, Result};
use modelgate::cli::{Args, ChatConfig, ConfigDiscovery, ExecutionMode, LoadedConfig};
use modelgate::env;
use modelgate::failover::{FailoverError, FailoverReason, RetryOptions, with_retry};
use modelgate::llm::{
    Action, ChatOptions, Message, Provider, ProviderManager, TracingProviderLogger,
    extract_tool_calls,
};
use std::io::Read;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output stays pipeable
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(env::DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    match mode {
        ExecutionMode::Chat(config) => run_chat(args.config, config).await,
        ExecutionMode::Health => run_health(args.config).await,
        ExecutionMode::Route(action) => run_route(args.config, action),
        ExecutionMode::ExtractTools(file) => run_extract_tools(file),
        ExecutionMode::ShowConfig => run_show_config(args.config),
    }
}

fn build_manager(config_path: Option<PathBuf>) -> Result<ProviderManager> {
    let LoadedConfig { path, config } = ConfigDiscovery::load(config_path.as_deref())
        .context("Failed to load configuration")?;
    match &path {
        Some(path) => info!("Using configuration {:?}", path),
        None => warn!("No configuration file found, no providers will be available"),
    }
    Ok(ProviderManager::new(
        config,
        TracingProviderLogger::shared(Default::default()),
    ))
}

async fn run_chat(config_path: Option<PathBuf>, config: ChatConfig) -> Result<()> {
    let manager = build_manager(config_path)?;

    let provider: &dyn Provider = if config.select_best {
        manager.select_best_provider().await?
    } else {
        manager.get_provider(config.action)?
    };
    info!(
        provider = %provider.id(),
        model = %provider.model(),
        action = %config.action,
        "Resolved provider"
    );

    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &config.system {
        messages.push(Message::system(system.clone()));
    }
    messages.push(Message::user(config.prompt.clone()));
    let options = ChatOptions::default();

    let mut retry = RetryOptions::default().on_retry(|event| {
        eprintln!(
            "retry {} in {:?} ({})",
            event.attempt,
            event.delay,
            event
                .reason
                .map(FailoverReason::as_str)
                .unwrap_or("unclassified")
        );
    });
    if let Some(max_retries) = config.max_retries {
        retry = retry.with_max_retries(max_retries);
    }

    if config.action == Action::Embeddings && provider.supports_embeddings() {
        let texts = vec![config.prompt.clone()];
        return match with_retry(|| provider.embeddings(&texts), retry).await {
            Ok(vectors) => {
                for (i, vector) in vectors.iter().enumerate() {
                    println!("embedding {}: {} dimensions", i, vector.len());
                }
                Ok(())
            }
            Err(e) => Err(report_failure(&manager, provider, e)),
        };
    }

    match with_retry(|| provider.chat(&messages, &options), retry).await {
        Ok(response) => {
            if !response.content.is_empty() {
                println!("{}", response.content);
            }
            for call in &response.tool_calls {
                println!(
                    "tool call {} -> {} {}",
                    call.id,
                    call.name,
                    serde_json::Value::Object(call.arguments.clone())
                );
            }
            if let Some(usage) = response.usage {
                info!(
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    estimated_cost = provider.estimate_cost(&messages),
                    "Chat finished"
                );
            }
            Ok(())
        }
        Err(e) => Err(report_failure(&manager, provider, e)),
    }
}

/// Classify the final error once and rotate credentials on auth failures.
fn report_failure(
    manager: &ProviderManager,
    provider: &dyn Provider,
    error: modelgate::ProviderError,
) -> anyhow::Error {
    let failure = FailoverError::from_provider_error(error, Some(provider.id()), Some(provider.model()));
    eprintln!("failover reason: {}", failure.reason);
    if failure.reason == FailoverReason::Auth && manager.report_auth_failure(provider.id()) {
        warn!(provider = %provider.id(), "Reported auth failure, credentials rotated");
    }
    anyhow::Error::new(failure)
}

async fn run_health(config_path: Option<PathBuf>) -> Result<()> {
    let manager = build_manager(config_path)?;
    let report = manager.health_report().await;
    if report.is_empty() {
        println!("No providers registered");
        return Ok(());
    }
    for (id, ok) in report {
        println!("{}: {}", id, if ok { "ok" } else { "down" });
    }
    Ok(())
}

fn run_route(config_path: Option<PathBuf>, action: Action) -> Result<()> {
    let manager = build_manager(config_path)?;
    let provider = manager.get_provider(action)?;
    println!("{}", provider.id());
    Ok(())
}

fn run_extract_tools(file: Option<PathBuf>) -> Result<()> {
    let text = match &file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read stdin")?;
            buffer
        }
    };

    let extraction = extract_tool_calls(&text);
    println!("{}", serde_json::to_string_pretty(&extraction)?);
    Ok(())
}

fn run_show_config(config_path: Option<PathBuf>) -> Result<()> {
    if config_path.is_none() {
        ConfigDiscovery::show_discovery_info();
        println!();
    }

    let LoadedConfig { path, config } = ConfigDiscovery::load(config_path.as_deref())?;
    match path {
        Some(path) => println!("Loaded: {:?}", path),
        None => println!("Loaded: built-in defaults"),
    }
    println!("Providers: {}", config.providers.keys().cloned().collect::<Vec<_>>().join(", "));

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("No configuration warnings");
    } else {
        println!("Warnings:");
        for warning in warnings {
            println!("  - {}", warning);
        }
    }
    Ok(())
}
