// ABOUTME: Entry point for the docbundle binary.
// ABOUTME: Parses CLI arguments, initializes tracing, opens the bundle database, and serves the API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docbundle_server::{AppState, BundlerConfig, create_router};
use docbundle_store::BundleStore;

#[derive(Parser)]
#[command(name = "docbundle", version, about = "Bundle related business documents by PO and invoice number")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API until interrupted.
    Serve {
        /// Override DOCBUNDLE_BIND.
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Create the home directory and database schema.
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("docbundle=debug,tower_http=debug")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = BundlerConfig::from_env().context("invalid configuration")?;

    match cli.command {
        Command::Init => {
            let store = open_store(&config)?;
            let version = store.schema_version()?.unwrap_or_default();
            println!("{} (schema v{})", config.db_path.display(), version);
            Ok(())
        }
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                if !config.allow_remote && !bind.ip().is_loopback() {
                    anyhow::bail!("--bind {bind} is not loopback; set DOCBUNDLE_ALLOW_REMOTE=true and DOCBUNDLE_AUTH_TOKEN");
                }
                config.bind = bind;
            }
            serve(config).await
        }
    }
}

fn open_store(config: &BundlerConfig) -> Result<BundleStore> {
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    BundleStore::open_with(&config.db_path, &config.store_options())
        .with_context(|| format!("opening {}", config.db_path.display()))
}

async fn serve(config: BundlerConfig) -> Result<()> {
    let store = open_store(&config)?;
    let state = Arc::new(
        AppState::new(store)
            .with_default_org(config.default_org_id)
            .with_retry(config.retry_policy()),
    );
    let app = create_router(state, config.auth_token.clone());

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    tracing::info!(
        bind = %config.bind,
        db = %config.db_path.display(),
        auth = config.auth_token.is_some(),
        default_org_id = ?config.default_org_id,
        "docbundle listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down");
        })
        .await
        .context("server error")
}
