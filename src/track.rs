//! # Track Model
//!
//! Tipi dati del catalogo: tracce sorgente e file già esportati.
//!
//! ## Ciclo di vita:
//! - `DiscoveredTrack`: creato dalla scansione, solo il path sorgente
//! - `HashedTrack`: prodotto da `DiscoveredTrack::hash`, con fingerprint
//! - `ExportedFile`: file trovato nell'export tree, identificato dallo stem
//!
//! ## Layout dell'export tree:
//! `output_dir/<fp[0:2]>/<fp>.<ext>`: lo sharding evita directory con
//! troppe entry.

use crate::error::SyncError;
use crate::hasher::{ContentHasher, Fingerprint};
use std::fmt;
use std::path::{Path, PathBuf};

/// Maps fingerprints to their place in the export tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportLayout {
    root: PathBuf,
    extension: String,
}

impl ExportLayout {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `root/ab/abcdef….ext`
    pub fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root
            .join(fingerprint.shard())
            .join(format!("{}.{}", fingerprint, self.extension))
    }

    /// Temporary sibling written by the transcoder before the final rename
    pub fn partial_path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root
            .join(fingerprint.shard())
            .join(format!("{}.partial.{}", fingerprint, self.extension))
    }
}

/// A source file found by the catalog, not hashed yet
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DiscoveredTrack {
    pub source_path: PathBuf,
}

impl DiscoveredTrack {
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
        }
    }

    /// Read the file and produce its hashed form
    pub fn hash(self) -> Result<HashedTrack, SyncError> {
        let fingerprint = ContentHasher::fingerprint_file(&self.source_path)?;
        Ok(HashedTrack {
            source_path: self.source_path,
            fingerprint,
        })
    }
}

/// A source file with its content fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedTrack {
    pub source_path: PathBuf,
    pub fingerprint: Fingerprint,
}

impl HashedTrack {
    pub fn new(source_path: impl Into<PathBuf>, fingerprint: Fingerprint) -> Self {
        Self {
            source_path: source_path.into(),
            fingerprint,
        }
    }

    pub fn export_path(&self, layout: &ExportLayout) -> PathBuf {
        layout.path_for(&self.fingerprint)
    }
}

impl fmt::Display for HashedTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.source_path.display(), self.fingerprint)
    }
}

/// A file already present in the export tree
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExportedFile {
    pub path: PathBuf,
    /// File name without extension; equals a fingerprint while still referenced
    pub fingerprint_stem: String,
}

impl ExportedFile {
    /// Returns `None` for paths without a file stem
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let fingerprint_stem = path.file_stem()?.to_string_lossy().into_owned();
        Some(Self {
            path,
            fingerprint_stem,
        })
    }
}
