//! # Exporter Module
//!
//! Orchestrazione della run, divisa in sottomoduli:
//! - `library_sync`: `MtpSync`, l'orchestratore principale (refresh + sync)
//! - `tasks`: lavoro per singolo item eseguito dentro il worker pool

pub mod library_sync;
pub mod tasks;

pub use library_sync::MtpSync;
