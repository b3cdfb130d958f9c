use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::error;
use tracing::info;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use weatherd::config::DEFAULT_CONFIG_PATH;
use weatherd::engine;
use weatherd::format_diagnostics;
use weatherd::weather::HttpFetcher;
use weatherd::Config;
use weatherd::Engine;
use weatherd::Registry;

/// Poll weather stations and keep normalized sensor readings
#[derive(Parser, Debug)]
#[command(name = "weatherd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Config files, merged in order; the first definition of a field wins
    #[arg(default_value = DEFAULT_CONFIG_PATH)]
    config: Vec<PathBuf>,

    /// Load and validate the configuration, print diagnostics and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (config, diagnostics) =
        Config::from_files(&args.config).context("failed to load configuration")?;

    if !diagnostics.is_empty() {
        eprint!("{}", format_diagnostics(&diagnostics));
    }

    if args.check {
        println!(
            "Configuration OK: {} target(s), heartbeat every {}s",
            config.targets.len(),
            config.heartbeat.interval_secs
        );
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(config.logging.filter())
        .init();

    info!("weatherd starting");
    info!("Loaded config from: {:?}", args.config);

    let (tx, rx) = engine::channel();
    let registry = Arc::new(Registry::new(rx));
    let registry_task = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.run().await })
    };

    let fetcher = Arc::new(HttpFetcher::new().context("failed to build HTTP client")?);
    let mut engine = Engine::new(fetcher, tx, config.heartbeat.ticks_per_minute());
    engine.register_targets_from_config(&config);
    info!(
        "Polling {} target(s), {} tick(s) per minute",
        engine.targets().count(),
        config.heartbeat.ticks_per_minute()
    );
    let engine = Arc::new(engine);

    let mut heartbeat = tokio::time::interval(config.heartbeat.interval());
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Press Ctrl+C to exit");

    let mut tick: u64 = 0;
    let mut heartbeats = JoinSet::new();
    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                tick += 1;
                let engine = Arc::clone(&engine);
                heartbeats.spawn(async move {
                    engine.on_heartbeat(tick).await;
                });
            }
            Some(_) = heartbeats.join_next(), if !heartbeats.is_empty() => {}
            result = tokio::signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Received shutdown signal"),
                    Err(e) => error!("Failed to listen for shutdown signal: {}", e),
                }
                break;
            }
        }
    }

    if !heartbeats.is_empty() {
        info!("Waiting for {} heartbeat(s) to finish", heartbeats.len());
    }
    while heartbeats.join_next().await.is_some() {}

    // The engine holds the last sender; the registry stops once it is gone
    drop(engine);
    if let Err(e) = registry_task.await {
        error!("Registry task failed: {}", e);
    }

    for (id, target) in &registry.snapshot().targets {
        info!(
            "Target '{}': {} sensor(s), last observation {}",
            id,
            target.sensors.len(),
            if target.last_observation_valid {
                "valid"
            } else {
                "invalid"
            }
        );
    }

    info!("weatherd shutdown complete after {} tick(s)", tick);

    Ok(())
}
