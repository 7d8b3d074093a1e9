use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Notify;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod alert;
mod browser;
mod config;
mod consent;
mod dates;
mod engine;
mod error;
mod matcher;
mod models;
mod navigator;
mod notify;
mod page;
mod profile;
mod request;
mod retry;
mod selector;
mod sites;
mod watcher;

use browser::ChromiumLauncher;
use config::{Cli, Settings};
use notify::Notifier;
use profile::ProfileRegistry;
use watcher::Watcher;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config, cli.prompt)?.with_cli(&cli);

    let requests = if cli.prompt {
        let record = config::prompt_booking(&mut std::io::stdin().lock(), &mut std::io::stdout())?;
        vec![record.validate().context("Invalid booking")?]
    } else {
        settings.requests()?
    };

    info!(
        "Starting Seat Finder: watching {} booking(s) every {}s",
        requests.len(),
        settings.interval_secs
    );

    let registry = ProfileRegistry::with_builtins(settings.profiles.clone());
    let names: Vec<&str> = registry.iter().map(|p| p.name.as_str()).collect();
    info!("Site profiles: {}", names.join(", "));

    let watcher = Arc::new(Watcher::new(
        ChromiumLauncher::new(settings.headless),
        registry,
        settings.engine.clone(),
        Notifier::from_env(),
        requests,
    ));

    // Run once immediately
    if let Err(e) = watcher.tick().await {
        error!("Error during initial check: {:#}", e);
    }
    if watcher.remaining() == 0 {
        info!("Every booking is available, nothing left to watch");
        return Ok(());
    }
    if cli.once {
        info!("{} booking(s) still unavailable", watcher.remaining());
        return Ok(());
    }

    let mut sched = JobScheduler::new().await?;
    let done = Arc::new(Notify::new());

    let job_watcher = Arc::clone(&watcher);
    let job_done = Arc::clone(&done);
    sched
        .add(Job::new_repeated_async(
            Duration::from_secs(settings.interval_secs),
            move |uuid, l| {
                let watcher = Arc::clone(&job_watcher);
                let done = Arc::clone(&job_done);
                Box::pin(async move {
                    if let Err(e) = watcher.tick().await {
                        error!("Error checking bookings: {:#}", e);
                    }
                    if watcher.remaining() == 0 {
                        info!("Every booking is available, stopping the scheduler");
                        if let Err(e) = l.remove(&uuid).await {
                            error!("Failed to remove job: {}", e);
                        }
                        done.notify_one();
                    }
                })
            },
        )?)
        .await?;

    info!("Scheduler started - checking every {}s", settings.interval_secs);
    sched.start().await?;

    tokio::select! {
        _ = done.notified() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted, shutting down");
        }
    }

    sched.shutdown().await?;
    Ok(())
}
