use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::config::{LoggingConfig, TurnstileConfig};
use turnstile::ratelimit::{admit, CircuitBreaker};

/// Sliding window rate limiter driven by stdin: every non-empty line is one
/// request, answered with the admission decision and the current count.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Window span in milliseconds
    #[arg(long)]
    window_ms: Option<u64>,

    /// Number of buckets in the window
    #[arg(long)]
    buckets: Option<usize>,

    /// Event count at which requests are throttled
    #[arg(long)]
    threshold: Option<i64>,

    /// Default log filter
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<TurnstileConfig> {
        let mut config = match &self.config {
            Some(path) => TurnstileConfig::from_file(path)?,
            None => TurnstileConfig::default(),
        };

        if let Some(window_ms) = self.window_ms {
            config.window.window_ms = window_ms;
        }
        if let Some(buckets) = self.buckets {
            config.window.buckets = buckets;
        }
        if let Some(threshold) = self.threshold {
            config.window.threshold = threshold;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if self.json_logs {
            config.logging.json = true;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;
    init_tracing(&config.logging);

    info!("Starting Turnstile");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let window = config.window.start()?;
    info!(
        window = ?window.window(),
        buckets = window.num_buckets(),
        threshold = window.threshold(),
        "Sliding window counter started"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Input closed, shutting down");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let admission = admit(&window);
                if !admission.is_admitted() {
                    warn!(count = admission.count(), state = %window.state(), "Request throttled");
                }
                stdout.write_all(format!("{}\n", admission).as_bytes()).await?;
                stdout.flush().await?;
            }
        }
    }

    window.stop();
    info!(count = window.count(), "Turnstile stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
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
