// Petfeeder - LAN control daemon for a Tuya pet feeder
// Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use petfeeder::config::{self, Settings};
use petfeeder::device::{Dispatcher, LanDevice, RetryPolicy};
use petfeeder::scheduler::FeedScheduler;
use petfeeder::store::StateStore;

#[derive(Parser)]
#[command(name = "petfeederd", about = "Feeding scheduler daemon for a Tuya pet feeder")]
struct Cli {
    /// Config file (default: ~/.petfeeder/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = config::load_settings(cli.config.as_deref())?;

    let state_path = match &settings.general.state_path {
        Some(path) => path.clone(),
        None => config::default_state_path()?,
    };

    // A corrupt state file must not take the daemon down, but it must be
    // loud: the operator decides whether to recover the file or accept
    // starting over.
    let store = match StateStore::load(&state_path) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, path = %state_path.display(),
                "State file unreadable; continuing with empty state");
            StateStore::open_empty(&state_path)
        }
    };
    let store = Arc::new(store);

    store
        .seed_operators(&settings.operators.seed)
        .await
        .context("Failed to persist seed operators")?;

    let dispatcher = Arc::new(Dispatcher::new(
        LanDevice::new(&settings.device),
        settings.device.feed_dp.clone(),
        retry_policy(&settings),
    ));

    // Connectivity probe, same as the original standalone feeder check.
    // Failure is not fatal: the device may simply be rebooting.
    match dispatcher.status().await {
        Ok(state) => info!(data_points = state.len(), "Feeder reachable"),
        Err(e) => warn!(error = %e, "Feeder not reachable at startup"),
    }

    let scheduler = Arc::new(FeedScheduler::new(
        store,
        dispatcher,
        settings.general.timezone,
    ));

    let scheduler_task = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run().await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    scheduler.stop();
    scheduler_task.abort();
    let _ = scheduler_task.await;

    info!("petfeederd stopped");
    Ok(())
}

fn retry_policy(settings: &Settings) -> RetryPolicy {
    RetryPolicy {
        max_attempts: settings.device.max_attempts,
        attempt_timeout: settings.attempt_timeout(),
        acquire_timeout: settings.acquire_timeout(),
        ..RetryPolicy::default()
    }
}
