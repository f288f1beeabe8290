use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use history_fetcher::{
    RequestScheduler,
    config::{ConnectionMode, load_plan_path, resolve_config},
    progress::LogListener,
    providers::ReplayProvider,
    store::MemoryCandleStore,
};
use indexmap::IndexMap;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Paced historical bar fetcher")]
struct Cli {
    /// Fetcher config (TOML). Falls back to HISTORY_FETCHER_CONFIG, then defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Live,
    Offline,
}

#[derive(Subcommand)]
enum Cmd {
    /// Fetch every session of a run plan from recorded bar files.
    Run {
        /// Run plan (TOML) listing instruments, strategies and sessions.
        #[arg(long, value_name = "FILE")]
        plan: PathBuf,

        /// Directory of `<SYMBOL>_<bar_seconds>.json` files.
        /// Defaults to HISTORY_FETCHER_BARS_DIR.
        #[arg(long, value_name = "DIR")]
        bars_dir: Option<PathBuf>,

        /// Override the pacing regime from the config.
        #[arg(long, value_enum)]
        mode: Option<Mode>,

        /// Write the summary and closed candles as JSON.
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Run {
            plan,
            bars_dir,
            mode,
            out,
        } => {
            let mut config = resolve_config(cli.config.as_deref())?;
            if let Some(mode) = mode {
                config.mode = match mode {
                    Mode::Live => ConnectionMode::Live,
                    Mode::Offline => ConnectionMode::Offline,
                };
            }
            let sessions = load_plan_path(&plan)?.sessions()?;
            let provider = match bars_dir {
                Some(dir) => ReplayProvider::new(dir)?,
                None => ReplayProvider::from_env()?,
            };
            info!(dir = %provider.dir().display(), sessions = sessions.len(), "starting run");

            let store = Arc::new(MemoryCandleStore::new());
            let scheduler = RequestScheduler::new(
                config,
                Arc::new(provider),
                store.clone(),
                Arc::new(LogListener),
            );
            let report = scheduler.run(sessions).await?;
            println!("{}", serde_json::to_string_pretty(&report.summary)?);

            if let Some(out) = out {
                let candles: IndexMap<String, _> = store
                    .snapshot()
                    .await
                    .into_iter()
                    .map(|(key, candles)| (key.to_string(), candles))
                    .collect();
                let body = serde_json::json!({
                    "summary": report.summary,
                    "candles": candles,
                });
                std::fs::write(&out, serde_json::to_string_pretty(&body)?)
                    .with_context(|| format!("write {}", out.display()))?;
                info!(path = %out.display(), "wrote candles");
            }
        }
    }

    Ok(())
}
