//! Optimus authentication API server binary.
//!
//! Configuration comes from the environment (see
//! [`optimus_api::config::ApiConfig::from_env`]); a `.env` file is honoured.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use optimus_core::store::PgStore;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "optimus_api_server", about = "Optimus authentication API server")]
struct Args {
    /// Address to listen on. Overrides `BIND_ADDR`.
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<String>,

    /// PostgreSQL connection URL. Overrides `DATABASE_URL`.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 10)]
    max_connections: u32,

    /// Seconds between sweeps of expired password reset records.
    #[arg(long, default_value_t = 600, value_parser = clap::value_parser!(u64).range(1..))]
    reset_sweep_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,optimus_api=debug,optimus_core=debug".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = optimus_api::config::ApiConfig::from_env();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(url) = args.database_url {
        config.pg_connection_url = url;
    }

    info!(bind = %config.bind_addr, "starting optimus_api_server");

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.pg_connection_url)
        .await?;

    info!("running database migrations");
    optimus_api::migrate(&pool).await?;

    let store = Arc::new(PgStore::new(pool));
    let mailer = optimus_core::mail::from_config(&config.mail)?;
    if config.mail.api_url.is_none() {
        warn!("MAIL_API_URL not set; reset emails are logged instead of sent");
    }

    let providers = config.provider_registry()?;
    if providers.is_empty() {
        info!("no OAuth providers configured");
    } else {
        info!(providers = ?providers.names(), "OAuth providers configured");
    }

    let bind_addr = config.bind_addr.clone();
    let state = optimus_api::AppState::new(config, store.clone(), store, mailer, providers);

    let sweep = state
        .resets
        .spawn_sweep_task(Duration::from_secs(args.reset_sweep_secs));
    let cleanup = state.oauth_state.spawn_cleanup_task();

    let app = optimus_api::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    sweep.abort();
    cleanup.abort();
    Ok(())
}
