//! Control Chain Monitor
//!
//! Runs the Control Chain listener and logs hardware as it is discovered,
//! connected and removed.
//!
//! # Usage
//!
//! ```bash
//! # Default socket (/tmp/control-chain.sock)
//! chain-monitor
//!
//! # Custom socket, retry a crashed connection every 2 seconds
//! chain-monitor --socket /run/control-chain.sock --retry-secs 2
//!
//! # Verbose logging
//! RUST_LOG=chain_core=debug chain-monitor
//! ```
//!
//! The listener never reconnects on its own. The monitor asks it to
//! restart on every retry tick while the connection is crashed.

mod report;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chain_core::{
    load_config_from_path, spawn, ConfigOverrides, ConnectionState, ListenerConfig,
};
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use report::LoggingObserver;

/// Control Chain Monitor - log hardware seen by the Control Chain daemon
#[derive(Parser, Debug)]
#[command(name = "chain-monitor")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Daemon socket path
    #[arg(short = 's', long, value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "CONTROL_CHAIN_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Largest accepted frame in bytes
    #[arg(long, value_name = "BYTES")]
    max_frame_size: Option<usize>,

    /// Seconds between restart attempts after a crash (0 disables)
    #[arg(short = 'r', long, default_value_t = 5)]
    retry_secs: u64,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref socket) = self.socket {
            overrides = overrides.with_socket_path(socket.clone());
        }
        if let Some(size) = self.max_frame_size {
            overrides = overrides.with_max_frame_size(size);
        }
        overrides
    }

    fn load_config(&self) -> Result<ListenerConfig> {
        let path = self
            .config
            .clone()
            .or_else(chain_core::default_config_path);
        let mut config = load_config_from_path(path).context("Failed to load configuration")?;
        self.overrides().apply(&mut config);
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chain_monitor=info".parse()?)
                .add_directive("chain_core=info".parse()?),
        )
        .with_target(true)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging()?;

    let config = args.load_config()?;
    info!(
        socket = %config.socket_path.display(),
        source = %config.source,
        "Starting control chain monitor"
    );

    let (handle, task) = spawn(&config, LoggingObserver::default());

    handle
        .initialized()
        .await
        .context("Listener stopped before becoming ready")?;
    info!(state = %handle.state(), "Control chain ready");

    let retry_enabled = args.retry_secs > 0;
    let mut retry = tokio::time::interval(Duration::from_secs(args.retry_secs.max(1)));
    retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for Ctrl+C");
                }
                info!("Shutting down");
                break;
            }
            _ = retry.tick(), if retry_enabled => {
                if handle.state() == ConnectionState::Crashed {
                    info!("Connection crashed, restarting listener");
                    handle.restart_if_crashed().await?;
                }
            }
        }
    }

    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "Listener already stopped");
    }
    task.await.context("Listener task panicked")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["chain-monitor"]).unwrap();

        assert!(args.socket.is_none());
        assert_eq!(args.retry_secs, 5);
    }

    #[test]
    fn test_cli_socket_wins_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[daemon]\nsocket_path = \"/from/file.sock\"").unwrap();

        let args = Args::try_parse_from([
            "chain-monitor",
            "--config",
            file.path().to_str().unwrap(),
            "--socket",
            "/from/cli.sock",
            "--max-frame-size",
            "2048",
        ])
        .unwrap();
        let config = args.load_config().unwrap();

        assert_eq!(config.socket_path, PathBuf::from("/from/cli.sock"));
        assert_eq!(config.max_frame_size, 2048);
        assert_eq!(config.config_file_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_zero_frame_size_is_rejected() {
        let args = Args::try_parse_from([
            "chain-monitor",
            "--config",
            "/nonexistent/listener.toml",
            "--max-frame-size",
            "0",
        ])
        .unwrap();

        assert!(args.load_config().is_err());
    }
}
