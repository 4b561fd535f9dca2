//! Bosun - connectivity watchdog
//!
//! Periodically probes a monitored condition (by default IPv6 reachability)
//! and runs a remediation action when it is absent, at most once per
//! cooldown window.

mod cli;
mod error;
mod manifest;
mod sickbay;
mod warden;

use cli::{Cli, Commands};
use error::{Error, Result};
use manifest::BosunConfig;
use sickbay::{MonitorSnapshot, Outcome, RemediationLoop, Trigger};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use warden::Warden;

/// Exit status for a completed run whose outcome is not healthy
const EXIT_UNHEALTHY: i32 = 2;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();

    if let Commands::Completion { shell } = cli.command {
        Cli::generate_completion(shell);
        return Ok(());
    }

    init_logging(cli.verbose, cli.log_json);

    let config = manifest::load(&cli.config)?;

    match cli.command {
        Commands::Validate => {
            println!("Configuration is valid: {}", cli.config.display());
            println!("  probe:       {}", config.probe.describe());
            println!("  remediation: {}", config.remediation.describe());
            println!(
                "  interval {}s, cooldown {}s, settle {}s, max attempts {}",
                config.monitor.interval,
                config.monitor.cooldown,
                config.monitor.settle,
                match config.monitor.max_attempts {
                    0 => "unlimited".to_string(),
                    n => n.to_string(),
                }
            );
            Ok(())
        }
        Commands::Run => runtime()?.block_on(serve(config)),
        Commands::Check { json } => {
            let mut monitor = RemediationLoop::from_config(&config);
            let outcome = runtime()?.block_on(monitor.evaluate_as(Trigger::Manual));
            report(&outcome, &monitor.snapshot(), json)?;
            exit_for(&outcome);
            Ok(())
        }
        Commands::Remediate { json } => {
            let mut monitor = RemediationLoop::from_config(&config);
            let outcome = runtime()?.block_on(monitor.remediate_now());
            report(&outcome, &monitor.snapshot(), json)?;
            exit_for(&outcome);
            Ok(())
        }
        Commands::Probe { json } => {
            let monitor = RemediationLoop::from_config(&config);
            let value = runtime()?.block_on(monitor.probe_once())?;

            if json {
                let doc = serde_json::json!({
                    "probe": monitor.probe_name(),
                    "present": value.is_some(),
                    "value": value,
                });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                match &value {
                    Some(v) => println!("{}: \x1b[32mpresent\x1b[0m ({})", monitor.probe_name(), v),
                    None => println!("{}: \x1b[31mabsent\x1b[0m", monitor.probe_name()),
                }
            }

            if value.is_none() {
                std::process::exit(EXIT_UNHEALTHY);
            }
            Ok(())
        }
        Commands::Completion { .. } => Ok(()),
    }
}

/// Set up the tracing subscriber; `RUST_LOG` overrides the default level
fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "bosun=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| Error::Runtime(e.to_string()))
}

/// Run the Warden until Ctrl+C or SIGTERM
async fn serve(config: BosunConfig) -> Result<()> {
    let monitor = RemediationLoop::from_config(&config);
    let warden = Warden::new(monitor, config.monitor.interval_duration());
    let handle = warden.handle();
    let task = tokio::spawn(warden.run());

    let mut terminate = signal(SignalKind::terminate())?;
    let mut force_remediation = signal(SignalKind::hangup())?;
    let mut evaluate_now = signal(SignalKind::user_defined1())?;
    let mut toggle_pause = signal(SignalKind::user_defined2())?;
    let mut updates = handle.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = terminate.recv() => break,
            _ = evaluate_now.recv() => {
                info!("SIGUSR1 received, evaluating now");
                let handle = handle.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle.evaluate().await {
                        warn!(error = %e, "evaluation request failed");
                    }
                });
            }
            _ = force_remediation.recv() => {
                info!("SIGHUP received, remediating now");
                let handle = handle.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle.remediate().await {
                        warn!(error = %e, "remediation request failed");
                    }
                });
            }
            _ = toggle_pause.recv() => match handle.toggle().await {
                Ok(running) => info!(running, "SIGUSR2 received, polling toggled"),
                Err(e) => warn!(error = %e, "pause toggle failed"),
            },
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                info!(
                    running = snapshot.is_running,
                    remediations = snapshot.remediation_count,
                    attempts = snapshot.consecutive_attempts,
                    last_health = snapshot.last_health_value.as_deref().unwrap_or("none"),
                    "monitor state"
                );
            }
        }
    }

    info!("shutting down");
    for record in handle.history(5).await.unwrap_or_default() {
        info!("{}", record.summary());
    }
    handle.shutdown().await?;
    task.await.map_err(|e| Error::Runtime(e.to_string()))?;

    let snapshot = handle.snapshot();
    info!(
        remediations = snapshot.remediation_count,
        last_health = snapshot.last_health_value.as_deref().unwrap_or("none"),
        "final state"
    );
    Ok(())
}

/// Print an outcome and the resulting state
fn report(outcome: &Outcome, snapshot: &MonitorSnapshot, json: bool) -> Result<()> {
    if json {
        let doc = serde_json::json!({
            "outcome": outcome,
            "state": snapshot,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    let colored = if outcome.is_healthy() {
        format!("\x1b[32m{}\x1b[0m", outcome.label())
    } else {
        format!("\x1b[31m{}\x1b[0m", outcome.label())
    };
    println!("{:<20} {}", "OUTCOME", colored);
    println!("{:<20} {}", "DETAIL", outcome);
    println!(
        "{:<20} {}",
        "LAST HEALTH",
        snapshot.last_health_value.as_deref().unwrap_or("-")
    );
    println!(
        "{:<20} {}",
        "LAST REMEDIATION",
        snapshot
            .last_remediation_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("{:<20} {}", "REMEDIATIONS", snapshot.remediation_count);
    Ok(())
}

fn exit_for(outcome: &Outcome) {
    if !outcome.is_healthy() {
        std::process::exit(EXIT_UNHEALTHY);
    }
}
