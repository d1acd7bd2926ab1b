use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sha2::{Digest, Sha256};
use tower_http::cors::{Any, CorsLayer};

use voco_audio::{CartesiaTts, DeepgramStt, EnergyVad};
use voco_domain::config::{Config, ConfigSeverity};
use voco_gateway::cli::{Cli, Command, ConfigCommand};
use voco_gateway::state::AppState;
use voco_gateway::{api, telemetry};
use voco_mcp_client::McpManager;
use voco_providers::ModelRegistry;
use voco_tools::ToolRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            telemetry::init_tracing();
            let config = Config::load().context("loading config")?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Config { command }) => {
            let config = Config::load().context("loading config")?;
            match command {
                ConfigCommand::Validate => {
                    let issues = config.validate();
                    for issue in &issues {
                        eprintln!("{issue}");
                    }
                    if issues
                        .iter()
                        .any(|i| i.severity == ConfigSeverity::Error)
                    {
                        std::process::exit(1);
                    }
                    println!("config OK ({} warning(s))", issues.len());
                    Ok(())
                }
                ConfigCommand::Show => {
                    println!(
                        "{}",
                        toml::to_string_pretty(&config).context("serializing config")?
                    );
                    Ok(())
                }
            }
        }
        Some(Command::Version) => {
            println!("voco-engine {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("Voco engine starting");

    // ── Config validation ────────────────────────────────────────
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

    // ── VAD weights (loaded once, shared read-only) ──────────────
    let vad_source = Arc::new(EnergyVad::default());
    tracing::info!("VAD model ready");

    // ── Speech providers ─────────────────────────────────────────
    let stt = Arc::new(DeepgramStt::new(&config.stt).context("initializing STT client")?);
    let tts = Arc::new(CartesiaTts::new(config.tts.clone()));
    tracing::info!("speech providers ready");

    // ── External tool servers ────────────────────────────────────
    let mcp = if config.tool_servers.servers.is_empty() {
        tracing::info!("no external tool servers configured");
        Arc::new(McpManager::empty())
    } else {
        let manager = McpManager::from_config(&config.tool_servers).await;
        tracing::info!(
            servers = manager.server_count(),
            tools = manager.tool_count(),
            "external tool servers connected"
        );
        Arc::new(manager)
    };

    // ── Tool registry + model clients ────────────────────────────
    let tools = Arc::new(ToolRegistry::new(mcp.clone()));
    let models =
        Arc::new(ModelRegistry::from_config(&config.llm).context("initializing model clients")?);
    models.rebind_tools(tools.definitions());
    tracing::info!(tools = tools.tool_count(), "tool registry bound to models");

    // ── Session token (read once, hashed for constant-time compare) ──
    let session_token_hash = match std::env::var(&config.server.session_token_env) {
        Ok(token) if !token.is_empty() => {
            tracing::info!("session token auth enabled");
            Some(Sha256::digest(token.as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!(
                env_var = %config.server.session_token_env,
                "session token auth DISABLED — open access"
            );
            None
        }
    };

    let state = AppState {
        config: config.clone(),
        vad_source,
        stt,
        tts,
        models,
        tools,
        mcp: mcp.clone(),
        sandbox: Arc::new(parking_lot::RwLock::new(String::new())),
        session_token_hash,
    };

    // ── Router ───────────────────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET]);
    let app = api::router(state)
        .layer(cors)
        .layer(tower::limit::ConcurrencyLimitLayer::new(
            config.server.max_concurrent_requests,
        ));

    // ── Bind ─────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "Voco engine listening");

    axum::serve(listener, app).await.context("server error")?;

    mcp.shutdown().await;
    Ok(())
}
