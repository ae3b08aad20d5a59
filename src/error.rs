//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `SyncError` enum per categorizzare gli errori fatali o di fase
//! - Fornisce messaggi di errore descrittivi e strutturati
//! - Integra con `thiserror` per automatic error conversion
//! - Gli errori per singolo file restano `anyhow::Error` e vengono raccolti dal pool
//!
//! ## Categorie di errori:
//! - `Io`: Errori di I/O con il path coinvolto
//! - `ConfigNotFound` / `ConfigParse` / `InvalidConfig`: configurazione (fatali, exit 1)
//! - `MissingDependency`: Tool esterno mancante (ffmpeg, rsync, simple-mtpfs)
//! - `Tool`: Tool esterno terminato con exit code non zero
//! - `Mount` / `Mirror` / `Unmount`: fasi della sessione col dispositivo
//! - `SessionActive`: una sessione col dispositivo è già aperta
//! - `Interrupted`: Ctrl-C ricevuto durante l'esecuzione
//!
//! ## Esempio:
//! ```rust,ignore
//! if find_in_path("ffmpeg").is_none() {
//!     return Err(SyncError::MissingDependency("ffmpeg".to_string()));
//! }
//! ```

use std::path::PathBuf;

/// Custom error types for the export and device sync pipeline
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No configuration file found at {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Could not parse configuration {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Dependency missing: {0}")]
    MissingDependency(String),

    #[error("{tool} failed ({status}) ==>\n{output}")]
    Tool {
        tool: String,
        status: String,
        output: String,
    },

    #[error("Could not mount device: {0}")]
    Mount(String),

    #[error("Could not mirror export tree: {0}")]
    Mirror(String),

    #[error("Could not unmount device: {0}")]
    Unmount(String),

    #[error("A device session is already active")]
    SessionActive,

    #[error("Interrupted")]
    Interrupted,
}

impl SyncError {
    /// Attach a path to an I/O error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Configuration problems are fatal before any work starts
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParse { .. } | Self::InvalidConfig(_)
        )
    }
}
