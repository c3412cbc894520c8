// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Overseer Daemon (ovd)
//!
//! Background process that supervises LLM coding subprocesses: it owns the
//! worker pool, the event ledger and the conversation store, and exposes the
//! observer WebSocket channel.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use ov_adapters::PtyProcessAdapter;
use ov_core::{SupervisorConfig, SystemClock};
use ov_daemon::Observer;
use ov_engine::Supervisor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config or socket setup
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("ovd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("ovd {}", env!("CARGO_PKG_VERSION"));
                println!("Overseer Daemon - supervises LLM coding subprocesses");
                println!();
                println!("USAGE:");
                println!("    ovd");
                println!();
                println!("Configuration is read from $OVERSEER_CONFIG or ./overseer.toml.");
                println!("Tasks are submitted through the tool host; observers connect on");
                println!("the WebSocket port (default 8080).");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: ovd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = load_config()?;
    std::fs::create_dir_all(config.log_dir())?;
    let _log_guard = setup_logging(&config)?;

    info!(
        state_dir = %config.state_dir.display(),
        observer_port = config.observer_port,
        "starting overseer daemon"
    );

    let supervisor = Arc::new(Supervisor::new(
        config.clone(),
        PtyProcessAdapter::new(),
        SystemClock,
    )?);

    let (observer, addr) = Observer::bind(Arc::clone(&supervisor), config.observer_port).await?;
    tokio::spawn(observer.run());

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(%addr, "daemon ready");

    // Signal ready for parent process (CLI or service manager waiting on us)
    println!("READY");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }

    info!("shutting down");
    supervisor.shutdown().await;

    Ok(())
}

/// Resolve the config file: `$OVERSEER_CONFIG`, then `./overseer.toml`,
/// then defaults.
fn load_config() -> Result<SupervisorConfig, ov_core::ConfigError> {
    if let Ok(path) = std::env::var("OVERSEER_CONFIG") {
        return SupervisorConfig::load(&PathBuf::from(path));
    }
    let local = PathBuf::from("overseer.toml");
    if local.exists() {
        return SupervisorConfig::load(&local);
    }
    Ok(SupervisorConfig::default())
}

/// File logging with env-filter; returns the guard keeping the writer alive.
fn setup_logging(
    config: &SupervisorConfig,
) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error>> {
    let file_appender = tracing_appender::rolling::daily(config.log_dir(), "ovd.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
    {
        error!("logging setup failed: {e}");
    }

    Ok(guard)
}
