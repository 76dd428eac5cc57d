//! firmwatch - probes law-firm headcounts, crawls the firms that changed and
//! records roster movements.
//!
//! The run summary is printed to stdout as JSON; logs go to stderr (and to a
//! daily file when `log_dir` is configured).

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use firmwatch_core::{BatchRunner, Config, HttpSessionFactory, JsonFileStore, MemoryStore, RosterStore, RunOptions};

#[derive(Parser)]
#[command(name = "firmwatch", version, about = "Track law-firm roster movements from the lawyer directory")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe every organization, then crawl the ones whose headcount changed
    Run(RunArgs),
    /// Only compare probed headcounts with the stored rosters
    Probe(TargetArgs),
    /// Crawl organizations without probing first
    Crawl(RunArgs),
    /// Print the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Organization to process (repeatable); defaults to the configured list
    #[arg(long = "org", value_name = "NAME")]
    organizations: Vec<String>,

    /// Use a throwaway in-memory store instead of the data directory
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Stop each organization's crawl after this many result pages
    #[arg(long, value_name = "N")]
    max_pages: Option<u32>,
}

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` controls the level (default `info`). The returned guard must be
/// held until exit so buffered file output is flushed.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match config.log_dir {
        Some(ref dir) => {
            let appender = tracing_appender::rolling::daily(dir, "firmwatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn open_store(config: &Config, dry_run: bool) -> Result<Arc<dyn RosterStore>> {
    if dry_run {
        info!("Dry run: using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let dir = config.data_dir()?;
    let store = JsonFileStore::open(&dir).with_context(|| format!("Failed to open store in {}", dir.display()))?;
    info!(path = %store.path().display(), "Using JSON store");
    Ok(Arc::new(store))
}

fn options(target: &TargetArgs, skip_probe: bool, max_pages: Option<u32>) -> RunOptions {
    RunOptions {
        skip_probe,
        max_pages,
        only: (!target.organizations.is_empty()).then(|| target.organizations.clone()),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize output")?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load().context("Failed to load configuration")?;
    let _guard = init_tracing(&config);

    if let Command::Config { save } = cli.command {
        if save {
            config.save().context("Failed to save configuration")?;
            info!(path = %Config::config_path()?.display(), "Configuration saved");
        }
        print_json(&config)?;
        return Ok(ExitCode::SUCCESS);
    }

    config.validate().context("Configuration check failed")?;
    let factory = HttpSessionFactory::new(&config)?;

    match cli.command {
        Command::Run(args) => run_batch(&config, factory, &args, false).await,
        Command::Crawl(args) => run_batch(&config, factory, &args, true).await,
        Command::Probe(target) => {
            let store = open_store(&config, target.dry_run)?;
            let runner = BatchRunner::new(config.clone(), factory, store)?;
            let organizations = match options(&target, false, None).only {
                Some(only) => only,
                None => config.organizations(),
            };
            let comparisons = runner.probe_all(&organizations).await;
            print_json(&comparisons)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { .. } => Ok(ExitCode::SUCCESS),
    }
}

async fn run_batch(config: &Config, factory: HttpSessionFactory, args: &RunArgs, skip_probe: bool) -> Result<ExitCode> {
    let store = open_store(config, args.target.dry_run)?;
    let runner = BatchRunner::new(config.clone(), factory, store)?;
    let summary = runner
        .run(&options(&args.target, skip_probe, args.max_pages))
        .await;
    print_json(&summary)?;
    Ok(exit_code(summary.failure_count))
}

fn exit_code(failures: usize) -> ExitCode {
    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
