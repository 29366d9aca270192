use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fm_domain::config::{Config, ConfigSeverity};
use fm_gateway::runtime::AgentService;
use fm_gateway::state::AppState;
use fm_gateway::api;
use fm_providers::OpenAiClient;
use fm_sandbox::SandboxManager;
use fm_store::{AgentStore, SessionStore};

#[derive(Parser)]
#[command(name = "foreman", about = "Autonomous agent orchestrator", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway server (default).
    Serve,
    /// Inspect the configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the version.
    Version,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration.
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing(&config);
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let mut shown = config.clone();
            if shown.llm.api_key.is_some() {
                shown.llm.api_key = Some("<set>".into());
            }
            println!("{}", serde_json::to_string_pretty(&shown)?);
            Ok(())
        }
        Some(Command::Version) => {
            println!("foreman {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing(config: &Config) {
    let default_filter = format!("{},fm_gateway=debug", config.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .json()
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("foreman starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Stores ───────────────────────────────────────────────────────
    let sessions = Arc::new(
        SessionStore::new(&config.storage.state_path).context("initializing session store")?,
    );
    let agents =
        Arc::new(AgentStore::new(&config.storage.state_path).context("initializing agent store")?);

    // ── LLM client ───────────────────────────────────────────────────
    let llm = Arc::new(OpenAiClient::from_config(&config.llm).context("initializing LLM client")?);
    tracing::info!(model = %config.llm.model_name, base = %config.llm.api_base, "LLM client ready");

    // ── Sandbox manager ──────────────────────────────────────────────
    let sandboxes = Arc::new(SandboxManager::new(config.sandbox.clone()));
    tracing::info!(
        address = config.sandbox.address.as_deref().unwrap_or("<none>"),
        "sandbox manager ready"
    );

    // ── Orchestrator ─────────────────────────────────────────────────
    let service = Arc::new(AgentService::new(
        config.clone(),
        llm,
        sessions,
        agents,
        sandboxes,
    ));

    // ── Periodic store flush ─────────────────────────────────────────
    {
        let service = service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
            loop {
                interval.tick().await;
                service.flush_stores();
            }
        });
    }

    // ── Serve ────────────────────────────────────────────────────────
    let state = AppState {
        config: config.clone(),
        service: service.clone(),
    };
    let app = api::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "foreman listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(service))
        .await
        .context("server error")?;

    Ok(())
}

/// Wait for ctrl-c, then stop every worker within the shutdown budget.
async fn shutdown_signal(service: Arc<AgentService>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
    service.shutdown().await;
}
