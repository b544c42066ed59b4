use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use quota_bucket::config::QuotaConfig;
use quota_bucket::http::HttpServer;
use quota_bucket::ratelimit::{RedisStore, TokenBucketLimiter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Token bucket quota service backed by Redis.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Address for the HTTP server
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Redis connection URL
    #[arg(long)]
    redis_url: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting quota-bucket service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = QuotaConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.http_addr {
        config.server.http_addr = addr;
    }
    if let Some(url) = args.redis_url {
        config.store.redis_url = url;
    }
    config.validate()?;
    info!(
        http_addr = %config.server.http_addr,
        capacity = config.limiter.capacity,
        refill_rate = config.limiter.refill_rate,
        "Configuration loaded"
    );

    let store =
        RedisStore::connect_with_config(&config.store.redis_url, config.store.redis_store_config())
            .await?;
    let limiter = Arc::new(TokenBucketLimiter::new(config.limiter.clone(), Arc::new(store))?);
    info!("Token bucket limiter initialized");

    HttpServer::new(config.server.http_addr, limiter)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    info!("quota-bucket service stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
