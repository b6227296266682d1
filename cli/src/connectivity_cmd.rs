//! `check` and `watch` subcommands.

use std::process::ExitCode;
use std::time::Duration;

use clap::Args;
use successfuel_core::api_client::create_client;
use successfuel_core::config::AppConfig;
use successfuel_core::{ConnectionStatus, ConnectivityMonitor, RequestCoordinator};

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Re-checks after a failed probe (defaults to `connectivity.max_retries`).
    #[arg(long = "retries", short = 'r')]
    pub retries: Option<u32>,

    /// Print the final status as JSON.
    #[arg(long = "json", short = 'j')]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Probe interval (defaults to `connectivity.check_interval_ms`).
    #[arg(long = "interval-ms")]
    pub interval_ms: Option<u64>,

    /// Print each status change as a JSON line.
    #[arg(long = "json", short = 'j')]
    pub json: bool,
}

fn coordinator(config: &AppConfig) -> anyhow::Result<RequestCoordinator> {
    let http = create_client(config.api.request_timeout())?;
    Ok(RequestCoordinator::from_app_config(http, config))
}

pub async fn run_check(config: &AppConfig, args: &CheckArgs) -> anyhow::Result<ExitCode> {
    let coordinator = coordinator(config)?;
    let retries = args.retries.unwrap_or(config.connectivity.max_retries);
    tracing::debug!(url = %config.api.health_url(), retries, "checking API health");

    let status = coordinator
        .engine()
        .check_connection_with_retry(retries)
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("{}", render(&status));
    }

    Ok(if status.is_connected {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub async fn run_watch(config: &AppConfig, args: &WatchArgs) -> anyhow::Result<()> {
    let coordinator = coordinator(config)?;
    let register = coordinator.register().clone();
    let interval = match args.interval_ms {
        Some(ms) => Some(Duration::from_millis(ms)),
        None => config.connectivity.check_interval(),
    };

    let json = args.json;
    let _subscription = register.subscribe(move |status| {
        // Skip the intermediate "checking" notification
        if status.is_checking {
            return;
        }
        if json {
            match serde_json::to_string(status) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "failed to encode status"),
            }
        } else {
            println!("{}", render(status));
        }
    });

    register.check_connection().await;
    let monitor = ConnectivityMonitor::start(register, interval);
    if !monitor.is_running() {
        tracing::info!("periodic checks disabled, exiting after the first probe");
        return Ok(());
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("stopping connectivity monitor");
    monitor.shutdown().await;
    Ok(())
}

/// One-line human summary of a status.
pub fn render(status: &ConnectionStatus) -> String {
    let checked = status
        .last_check
        .map(|at| at.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());

    if status.is_connected {
        let latency = status
            .latency_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "n/a".to_string());
        format!(
            "[{checked}] online ({}) latency {latency}",
            status.stability
        )
    } else {
        let reason = status.error.as_deref().unwrap_or("no response");
        format!(
            "[{checked}] offline after {} failed check(s): {reason}",
            status.retry_count
        )
    }
}
