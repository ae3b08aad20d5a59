//! # MTPSync - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del `Reporter` (console colorata + file di log)
//! - Risoluzione e caricamento della configurazione
//! - Watcher di Ctrl-C che cancella il token di shutdown
//! - Mappatura dell'esito della run sugli exit code
//!
//! ## Exit code:
//! - `0`: completato (anche con errori per singolo file o sync fallito)
//! - `1`: errore di configurazione
//! - `2`: errore fatale durante il refresh
//! - `130`: interrotto
//!
//! ## Esempio di utilizzo:
//! ```bash
//! mtpsync --refresh
//! mtpsync --sync --config ~/music/mtpsync.yaml --workers 4
//! ```

use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use mtpsync::{Config, MtpSync, Notifier, Reporter, SyncError};

const EXIT_CONFIG: u8 = 1;
const EXIT_FATAL: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "mtpsync", version)]
#[command(about = "Select FLAC files, convert to mp3, sync with an MTP device")]
struct Args {
    /// Use an alternative configuration file
    #[arg(long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Refresh export library
    #[arg(short, long)]
    refresh: bool,

    /// Sync export library with unlocked MTP device
    #[arg(short, long)]
    sync: bool,

    /// Number of parallel workers (overrides the configuration)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Verbose logging on the console
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Refresh,
    Sync,
}

impl Args {
    /// `--refresh` wins when both actions are given
    fn action(&self) -> Option<Action> {
        if self.refresh {
            Some(Action::Refresh)
        } else if self.sync {
            Some(Action::Sync)
        } else {
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let reporter = Reporter::init(args.verbose)?;
    reporter.headline("\n# # # M T P S Y N C # # #");

    let config = match load_config(args.config.as_deref(), args.workers).await {
        Ok(config) => config,
        Err(e) => {
            reporter.error(e.to_string());
            return Ok(ExitCode::from(EXIT_CONFIG));
        }
    };
    reporter.note(config.describe());

    let started = Instant::now();
    let notifier = Notifier::from_config(&config);

    let code = match args.action() {
        Some(action) => run(action, config, &reporter, &notifier).await,
        None => {
            Args::command().print_help()?;
            ExitCode::SUCCESS
        }
    };

    let message = format!("Everything was done in {:.2}s.", started.elapsed().as_secs_f64());
    reporter.headline(format!("\n{}", message));
    notifier.notify("MTPSync", &message).await;
    if let Some(path) = reporter.log_path() {
        debug!("Log written to {}", path.display());
    }

    Ok(code)
}

async fn load_config(explicit: Option<&Path>, workers: Option<usize>) -> Result<Config, SyncError> {
    let path = Config::resolve_path(explicit)?;
    debug!("Loading configuration from {}", path.display());

    let mut config = Config::from_file(&path).await?;
    if let Some(workers) = workers {
        config.workers = workers;
        config.validate()?;
    }
    Ok(config)
}

async fn run(action: Action, config: Config, reporter: &Reporter, notifier: &Notifier) -> ExitCode {
    let shutdown = CancellationToken::new();
    let watcher = tokio::spawn(watch_ctrl_c(shutdown.clone()));

    let sync = MtpSync::new(config, reporter.clone());
    let outcome = match action {
        Action::Refresh => sync.update_export(&shutdown).await,
        Action::Sync => sync.sync(&shutdown).await,
    };
    watcher.abort();

    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(SyncError::Interrupted) => {
            reporter.error("Got interrupted.");
            notifier.notify("MTPSync", "Got interrupted.").await;
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(e) => {
            reporter.error(e.to_string());
            if e.is_config() {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::from(EXIT_FATAL)
            }
        }
    }
}

async fn watch_ctrl_c(shutdown: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("Ctrl-C received, cancelling the run");
        shutdown.cancel();
    }
}
