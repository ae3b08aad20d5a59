//! # Content Hasher Module
//!
//! Calcola il fingerprint di contenuto dei file sorgente.
//!
//! ## Responsabilità:
//! - SHA-256 dell'intero contenuto del file, codificato in hex
//! - Lettura in streaming con buffer, senza caricare il file in memoria
//! - Funzione pura dei byte: nessun side effect
//!
//! Il fingerprint è la chiave d'identità di una traccia: due file con lo
//! stesso contenuto producono lo stesso export, indipendentemente da nome e path.

use crate::error::SyncError;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const READ_BUFFER: usize = 64 * 1024;

/// Hex-encoded SHA-256 digest of a file's content
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already computed digest
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shard directory name: the first two characters of the digest
    pub fn shard(&self) -> &str {
        let end = self.0.char_indices().nth(2).map_or(self.0.len(), |(i, _)| i);
        &self.0[..end]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes content fingerprints
pub struct ContentHasher;

impl ContentHasher {
    /// Fingerprint of an in-memory buffer
    pub fn fingerprint_bytes(bytes: &[u8]) -> Fingerprint {
        Fingerprint(hex::encode(Sha256::digest(bytes)))
    }

    /// Fingerprint of a file, streamed from disk
    pub fn fingerprint_file(path: &Path) -> Result<Fingerprint, SyncError> {
        let file = File::open(path).map_err(|e| SyncError::io(path, e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER, file);
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; READ_BUFFER];

        loop {
            let read = reader
                .read(&mut buffer)
                .map_err(|e| SyncError::io(path, e))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(Fingerprint(hex::encode(hasher.finalize())))
    }
}
