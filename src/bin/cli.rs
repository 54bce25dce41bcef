//! Board Harvester CLI
//!
//! Local execution entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use harvester::{
    error::Result,
    models::{Config, Credentials, PipelineMode},
    pipeline::{self, PipelineOptions, Runtime},
    services::{BoardSource, Classifiers, HttpBoardSource, analyzed_ids},
    storage::RecordStream,
    utils::{clock::StopFlag, http::RetryPolicy},
};

/// Board Harvester - collect board posts and annotate them with moderation scores
#[derive(Parser, Debug)]
#[command(
    name = "harvester",
    version,
    about = "Discussion board post harvester and annotator"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the raw posts file
    #[arg(long, global = true)]
    posts_file: Option<PathBuf>,

    /// Override the analysis results file
    #[arg(long, global = true)]
    results_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect new posts into the raw stream
    Crawl {
        /// Number of new posts to collect
        #[arg(long)]
        target: Option<usize>,
    },

    /// Annotate collected posts with both classifiers
    Analyze {
        /// Number of raw posts to consider
        #[arg(long)]
        limit: Option<usize>,

        /// Posts per batch
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Run full pipeline: Crawl → Analyze
    Pipeline {
        /// Number of new posts to collect
        #[arg(long)]
        target: Option<usize>,

        /// Number of raw posts to consider for analysis
        #[arg(long)]
        limit: Option<usize>,

        /// Posts per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Analyze while crawling instead of after
        #[arg(long)]
        concurrent: bool,
    },

    /// Validate configuration and credentials
    Validate,

    /// Show record counts
    Info,
}

/// Initialize logging based on verbosity flag and configured level.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Exit status for a forced quit on a second interrupt.
const FORCED_EXIT_CODE: i32 = 130;

/// What a Ctrl-C does given the current stop state.
#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    /// First signal: finish the current record, then stop.
    Graceful,
    /// A stop was already requested: quit now.
    Force,
}

fn on_interrupt(stop: &StopFlag) -> Interrupt {
    if stop.is_stopped() {
        return Interrupt::Force;
    }
    stop.request_stop();
    Interrupt::Graceful
}

/// Set the stop flag on the first Ctrl-C so both phases end after the current
/// record. A second Ctrl-C exits immediately.
fn install_stop_handler() -> StopFlag {
    let stop = StopFlag::new();
    let flag = stop.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            match on_interrupt(&flag) {
                Interrupt::Graceful => log::warn!(
                    "Stop requested, finishing current record (Ctrl-C again to force quit)..."
                ),
                Interrupt::Force => {
                    log::error!("Second interrupt, exiting without waiting");
                    std::process::exit(FORCED_EXIT_CODE);
                }
            }
        }
    });
    stop
}

fn board_source(config: &Config, runtime: &Runtime) -> Result<Arc<dyn BoardSource>> {
    let source = HttpBoardSource::new(
        &config.source,
        RetryPolicy::from(&config.retry),
        Arc::clone(&runtime.sleeper),
    )?;
    Ok(Arc::new(source))
}

fn classifiers(config: &Config, runtime: &Runtime) -> Result<Classifiers> {
    let credentials = Credentials::from_env()?;
    Classifiers::from_config(config, &credentials, Arc::clone(&runtime.sleeper))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = if cli.config.exists() {
        Config::load(&cli.config)
    } else {
        Ok(Config::default())
    };
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    init_logging(cli.verbose, &level);

    let mut config = match loaded {
        Ok(config) => {
            if cli.config.exists() {
                log::info!("Loaded configuration from {}", cli.config.display());
            } else {
                log::info!(
                    "No configuration at {}, using defaults",
                    cli.config.display()
                );
            }
            config
        }
        Err(e) => {
            log::warn!(
                "Config load failed from {}: {}. Using defaults.",
                cli.config.display(),
                e
            );
            Config::default()
        }
    };

    if let Some(path) = cli.posts_file {
        config.paths.posts_file = path;
    }
    if let Some(path) = cli.results_file {
        config.paths.results_file = path;
    }

    if let Command::Validate = cli.command {
        return pipeline::run_validate(&config, Credentials::from_env());
    }

    config.validate()?;
    let runtime = Runtime::open(&config, install_stop_handler()).await?;

    match cli.command {
        Command::Crawl { target } => {
            let source = board_source(&config, &runtime)?;
            let target = target.unwrap_or(config.crawl.target_posts);
            pipeline::run_crawler(&config, source, &runtime, target).await?;
        }

        Command::Analyze { limit, batch_size } => {
            let classifiers = classifiers(&config, &runtime)?;
            pipeline::run_analysis(
                &config,
                classifiers,
                &runtime,
                limit.unwrap_or(config.analysis.limit),
                batch_size.unwrap_or(config.analysis.batch_size),
            )
            .await?;
        }

        Command::Pipeline {
            target,
            limit,
            batch_size,
            concurrent,
        } => {
            // Fail on missing credentials before any crawling.
            let classifiers = classifiers(&config, &runtime)?;
            let source = board_source(&config, &runtime)?;

            let mut options = PipelineOptions::from_config(&config);
            if let Some(target) = target {
                options.target = target;
            }
            if let Some(limit) = limit {
                options.limit = limit;
            }
            if let Some(batch_size) = batch_size {
                options.batch_size = batch_size;
            }
            if concurrent {
                options.mode = PipelineMode::Concurrent;
            }

            pipeline::run_pipeline(&config, source, classifiers, &runtime, &options).await?;
        }

        Command::Info => {
            let posts = runtime.store.count(RecordStream::Posts).await;
            let results = runtime.store.count(RecordStream::Results).await;
            let analyzed = analyzed_ids(&runtime.store, RecordStream::Results).await;

            log::info!(
                "Posts: {} ({})",
                posts,
                runtime.store.path(RecordStream::Posts).display()
            );
            log::info!(
                "Results: {} ({}), {} distinct posts analyzed",
                results,
                runtime.store.path(RecordStream::Results).display(),
                analyzed.len()
            );
        }

        Command::Validate => {}
    }

    log::info!("Done!");

    Ok(())
}
