//! busflow-loading CLI: tune and inspect the busy-indicator engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use busflow_loading::config::{Config, EngineConfig};
use busflow_loading::engine::LoadingEngine;
use busflow_loading::model::{Snapshot, StartOptions};
use busflow_loading::scenario::{Script, replay};
use busflow_loading::telemetry::{TelemetryConfig, init_telemetry};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "busflow-loading", about = "BusFlow busy-indicator engine")]
struct Cli {
    /// Engine config TOML (overrides LOADING_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a timed script on a manual clock and print frames as JSON lines
    Replay {
        /// Script TOML with [[step]] tables
        script: PathBuf,
        /// Pretty-print each frame
        #[arg(long)]
        pretty: bool,
    },
    /// Run simulated dashboard work on the real clock and log every change
    Demo {
        /// Multiply every simulated duration by this factor
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
    },
    /// Print the effective engine config as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(path) = cli.config {
        config.engine_config_path = Some(path);
    }

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "busflow-loading".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let engine_config = config.engine_config()?;

    match cli.command {
        Command::Replay { script, pretty } => cmd_replay(&script, engine_config, pretty),
        Command::Demo { speed } => cmd_demo(engine_config, speed).await,
        Command::Config => {
            print!("{}", engine_config.to_toml_string()?);
            Ok(())
        }
    }
}

fn cmd_replay(path: &Path, engine_config: EngineConfig, pretty: bool) -> anyhow::Result<()> {
    let script = Script::load(path)?;
    let frames = replay(&script, engine_config)?;
    for frame in &frames {
        let line = if pretty {
            serde_json::to_string_pretty(frame)?
        } else {
            serde_json::to_string(frame)?
        };
        println!("{line}");
    }
    info!(frames = frames.len(), "replay finished");
    Ok(())
}

async fn cmd_demo(engine_config: EngineConfig, speed: f64) -> anyhow::Result<()> {
    if !(speed.is_finite() && speed > 0.0) {
        anyhow::bail!("--speed must be a positive number, got {speed}");
    }
    let scaled = |ms: u64| Duration::from_millis((ms as f64 * speed).round() as u64);

    let engine = LoadingEngine::with_tokio(engine_config)?;
    let origin = tokio::time::Instant::now();
    let subscription = engine.subscribe(move |snapshot| {
        println!("{:>6}ms  {}", origin.elapsed().as_millis(), describe(snapshot));
    });

    // Fast page transition: finishes inside the reveal delay, never shown.
    engine
        .run_with_loading(
            StartOptions::route().key("routes"),
            tokio::time::sleep(scaled(100)),
        )
        .await;

    // Save right after: within the rapid-resume window, shown at once.
    engine
        .run_with_loading(StartOptions::action().key("save_route"), async {
            tokio::time::sleep(scaled(600)).await;
            Ok::<(), anyhow::Error>(())
        })
        .await?;

    tokio::time::sleep(scaled(1_200)).await;

    // Customer import with progress, after a quiet gap: delayed reveal.
    let rows = 5;
    engine
        .run_with_handle(
            StartOptions::action().key("import_customers").progress(0, rows),
            |handle| async move {
                for row in 1..=rows {
                    tokio::time::sleep(scaled(300)).await;
                    handle.set_progress(row, rows);
                }
            },
        )
        .await;

    subscription.unsubscribe();
    engine.shutdown();
    Ok(())
}

fn describe(snapshot: &Snapshot) -> String {
    let visibility = match (snapshot.should_reveal, snapshot.is_short_visible) {
        (false, _) => "hidden",
        (true, true) => "short",
        (true, false) => "full",
    };
    let display = snapshot
        .display
        .as_ref()
        .map(|d| match serde_json::to_string(&d.progress) {
            Ok(progress) => format!("[{}] {} {progress}", d.scope, d.message),
            Err(_) => format!("[{}] {}", d.scope, d.message),
        })
        .unwrap_or_else(|| "-".to_string());
    format!(
        "active={:<2} {:<6} {display}",
        snapshot.active_count, visibility
    )
}
