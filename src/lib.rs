//! # MTPSync Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi principali tramite re-exports per `main.rs` e per i test
//!
//! ## Architettura dei moduli:
//! - `config`: Configurazione YAML e validazione
//! - `error`: Tipi di errore custom (`SyncError`)
//! - `logging`: `Reporter`, righe di stato colorate e file di log
//! - `hasher`: Fingerprint SHA-256 del contenuto
//! - `track`: Tracce sorgente, file esportati, layout shardato
//! - `catalog`: Discovery di sorgenti ed export tree
//! - `diff`: Calcolo di delete-set e convert-set
//! - `pool`: Worker pool a concorrenza limitata
//! - `progress`: Progress bar e statistiche della run
//! - `platform`: Esecuzione dei tool esterni
//! - `transcoder`: Conversione e normalizzazione del loudness
//! - `device`: Sessione mount → mirror → unmount
//! - `notify`: Notifiche desktop
//! - `exporter`: Orchestratore principale (`MtpSync`)
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use mtpsync::{Config, MtpSync, Reporter};
//!
//! let reporter = Reporter::init(false)?;
//! let config = Config::from_file(&path).await?;
//! let stats = MtpSync::new(config, reporter).update_export(&shutdown).await?;
//! ```

pub mod catalog;
pub mod config;
pub mod device;
pub mod diff;
pub mod error;
pub mod exporter;
pub mod hasher;
pub mod logging;
pub mod notify;
pub mod platform;
pub mod pool;
pub mod progress;
pub mod track;
pub mod transcoder;

pub use config::Config;
pub use error::SyncError;
pub use exporter::MtpSync;
pub use logging::Reporter;
pub use notify::Notifier;
pub use progress::RunStats;
