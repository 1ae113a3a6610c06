use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use smsguard::clock::{Clock, SystemClock};
use smsguard::config::{AppConfig, LogFormat, LoggingConfig};
use smsguard::ratelimit::{CleanupSweeper, MetricsAggregator, RateLimiter};
use smsguard::service::{HealthChecker, MessageService, SmsRequest};
use smsguard::store;

/// Distributed rate limiting for message sending.
#[derive(Debug, Parser)]
#[command(name = "smsguard", version, about)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the periodic cleanup sweep until interrupted
    Sweep,
    /// Run one admission check for a message
    Send {
        /// Sender phone number
        #[arg(long)]
        sender: String,
        /// Receiver phone number
        #[arg(long)]
        receiver: String,
        /// Message body
        #[arg(long)]
        message: String,
    },
    /// Print trailing-window usage, global unless a sender is given
    Usage {
        /// Sender phone number
        #[arg(long)]
        sender: Option<String>,
    },
    /// Print aggregated metrics over a time range
    Metrics {
        /// Sender phone number
        #[arg(long)]
        sender: Option<String>,
        /// Range start, RFC 3339
        #[arg(long)]
        from: DateTime<Utc>,
        /// Range end, RFC 3339, inclusive
        #[arg(long)]
        to: DateTime<Utc>,
    },
    /// Probe the counter store
    Health,
}

#[derive(Serialize)]
struct UsageReport<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    sender_number: Option<&'a str>,
    usage_percentage: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(&config.logging);

    info!("Starting SmsGuard");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = store::connect(&config.store, clock.clone()).await?;
    let rate_limiter = Arc::new(RateLimiter::with_clock(
        store.clone(),
        clock.clone(),
        config.rate_limit_config()?,
    )?);
    info!(
        max_per_sender = rate_limiter.max_messages_per_sender(),
        max_global = rate_limiter.max_messages_global(),
        "Rate limiter initialized"
    );

    match cli.command {
        Command::Sweep => {
            let sweeper = CleanupSweeper::from_limiter(&rate_limiter);
            sweeper
                .run(
                    config.cleanup.interval(),
                    config.cleanup.inactivity_threshold(),
                    shutdown_signal(),
                )
                .await;
        }
        Command::Send {
            sender,
            receiver,
            message,
        } => {
            let service = MessageService::new(rate_limiter.clone());
            let response = service
                .send_message(&SmsRequest::new(sender, receiver, message))
                .await?;
            print_json(&response)?;
        }
        Command::Usage { sender } => {
            let usage_percentage = match &sender {
                Some(sender) => rate_limiter.get_sender_usage_percentage(sender).await?,
                None => rate_limiter.get_global_usage_percentage().await?,
            };
            print_json(&UsageReport {
                sender_number: sender.as_deref(),
                usage_percentage,
            })?;
        }
        Command::Metrics { sender, from, to } => {
            let aggregator = MetricsAggregator::from_limiter(&rate_limiter);
            let metrics = match &sender {
                Some(sender) => {
                    aggregator
                        .get_aggregated_sender_metrics(sender, from, to)
                        .await?
                }
                None => aggregator.get_aggregated_global_metrics(from, to).await?,
            };
            print_json(&metrics)?;
        }
        Command::Health => {
            let status = HealthChecker::new(store, clock).check().await;
            print_json(&status)?;
            if !status.healthy {
                anyhow::bail!("counter store is unreachable");
            }
        }
    }

    info!("SmsGuard stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
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
