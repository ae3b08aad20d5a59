//! # Logging Context Module
//!
//! Il `Reporter` è il contesto di logging esplicito, costruito una volta in
//! `main` e passato a tutti i componenti.
//!
//! ## Responsabilità:
//! - Inizializza `tracing-subscriber` una sola volta (idempotente)
//! - Layer file: testo semplice a livello DEBUG in
//!   `~/.local/share/mtpsync/log/<YYYY-MM-DD_HHhMM>_mtpsync.log`
//! - Layer console: stderr a WARN (DEBUG con `--verbose`), senza righe di stato
//! - Righe di stato colorate su stdout, replicate identiche nel file di log
//! - Crea le progress bar (nascoste in modalità quiet)
//!
//! ## Colori:
//! - headline: bianco grassetto
//! - note: giallo
//! - info: blu
//! - success: verde
//! - warn: giallo
//! - error: rosso

use crate::config::APP_NAME;
use crate::progress::ProgressManager;
use anyhow::{Context, Result};
use console::style;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::prelude::*;

/// Target of the status-line events; filtered out of the console layer
pub const STATUS_TARGET: &str = "mtpsync::status";

static LOG_FILE: OnceLock<PathBuf> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Headline,
    Note,
    Info,
    Success,
    Warn,
    Error,
}

#[derive(Debug)]
struct ReporterInner {
    log_path: Option<PathBuf>,
    console: bool,
}

/// Colored status lines mirrored to the log file
#[derive(Debug, Clone)]
pub struct Reporter {
    inner: Arc<ReporterInner>,
}

impl Reporter {
    /// Install the global subscriber and open the per-run log file.
    /// Later calls reuse the first log file.
    pub fn init(verbose: bool) -> Result<Self> {
        if let Some(path) = LOG_FILE.get() {
            return Ok(Self::with_log(Some(path.clone()), true));
        }

        let log_dir = dirs::data_dir()
            .context("Could not find the user data directory")?
            .join(APP_NAME)
            .join("log");
        let log_path = Self::install(&log_dir, verbose)?;
        let log_path = LOG_FILE.get_or_init(|| log_path).clone();

        Ok(Self::with_log(Some(log_path), true))
    }

    fn install(log_dir: &Path, verbose: bool) -> Result<PathBuf> {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

        let stamp = chrono::Local::now().format("%Y-%m-%d_%Hh%M");
        let log_path = log_dir.join(format!("{}_{}.log", stamp, APP_NAME));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
            .with_filter(LevelFilter::DEBUG);

        let console_level = if verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::WARN
        };
        let console_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(
                Targets::new()
                    .with_target(STATUS_TARGET, LevelFilter::OFF)
                    .with_default(console_level),
            );

        tracing_subscriber::registry()
            .with(file_layer)
            .with(console_layer)
            .try_init()
            .context("Failed to install the tracing subscriber")?;

        Ok(log_path)
    }

    /// Reporter without a log file that prints nothing; tracing events still flow
    pub fn quiet() -> Self {
        Self::with_log(None, false)
    }

    fn with_log(log_path: Option<PathBuf>, console: bool) -> Self {
        Self {
            inner: Arc::new(ReporterInner { log_path, console }),
        }
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.inner.log_path.as_deref()
    }

    pub fn headline(&self, text: impl AsRef<str>) {
        self.emit(Tone::Headline, text.as_ref());
    }

    pub fn note(&self, text: impl AsRef<str>) {
        self.emit(Tone::Note, text.as_ref());
    }

    pub fn info(&self, text: impl AsRef<str>) {
        self.emit(Tone::Info, text.as_ref());
    }

    pub fn success(&self, text: impl AsRef<str>) {
        self.emit(Tone::Success, text.as_ref());
    }

    pub fn warn(&self, text: impl AsRef<str>) {
        self.emit(Tone::Warn, text.as_ref());
    }

    pub fn error(&self, text: impl AsRef<str>) {
        self.emit(Tone::Error, text.as_ref());
    }

    /// Progress bar for one pool phase
    pub fn progress(&self, title: &str, total: usize) -> ProgressManager {
        if self.inner.console {
            ProgressManager::new(title, total)
        } else {
            ProgressManager::hidden(total)
        }
    }

    fn emit(&self, tone: Tone, text: &str) {
        if self.inner.console {
            let styled = match tone {
                Tone::Headline => style(text).white().bold(),
                Tone::Note => style(text).yellow(),
                Tone::Info => style(text).blue(),
                Tone::Success => style(text).green(),
                Tone::Warn => style(text).yellow().bold(),
                Tone::Error => style(text).red().bold(),
            };
            println!("{}", styled);
        }

        match tone {
            Tone::Error => tracing::error!(target: STATUS_TARGET, "{}", text),
            Tone::Warn => tracing::warn!(target: STATUS_TARGET, "{}", text),
            _ => tracing::info!(target: STATUS_TARGET, "{}", text),
        }
    }
}
