//! # Track Catalog Module
//!
//! Questo modulo gestisce la discovery dei file sorgente e dei file esportati.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva dei file sorgente (es. FLAC) nelle directory incluse
//! - Esclusione per contenimento di path (componenti, non prefisso di stringa)
//! - Discovery ricorsiva dell'export tree, ignorando lo sharding
//! - Ordinamento stabile dei risultati per log riproducibili
//!
//! ## Robustezza:
//! - I symlink vengono seguiti; i cicli vengono rilevati da `walkdir`
//! - Directory senza permessi o cicli: entry saltata e warning nel log
//!
//! ## Esempio:
//! ```rust,ignore
//! let sources = TrackCatalog::scan_sources(&config.directories, &config.excluded, "flac");
//! let exports = TrackCatalog::scan_exports(&config.output_directory, "mp3")?;
//! ```

use crate::error::SyncError;
use crate::track::{DiscoveredTrack, ExportedFile};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Entries found by one scan plus the number of unreadable entries skipped
#[derive(Debug, Clone, Default)]
pub struct CatalogScan<T> {
    pub entries: Vec<T>,
    pub skipped: usize,
}

/// Enumerates source tracks and exported files
pub struct TrackCatalog;

impl TrackCatalog {
    /// Find all source files under the include roots, minus the excluded subtrees
    pub fn scan_sources(
        include: &[PathBuf],
        exclude: &[PathBuf],
        extension: &str,
    ) -> CatalogScan<DiscoveredTrack> {
        let mut found = BTreeSet::new();
        let mut skipped = 0;

        for root in include {
            if Self::is_excluded(root, exclude) {
                debug!("Include root {} is excluded, skipping", root.display());
                continue;
            }

            let walker = WalkDir::new(root)
                .follow_links(true)
                .into_iter()
                .filter_entry(|e| !Self::is_excluded(e.path(), exclude));

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                        skipped += 1;
                        continue;
                    }
                };
                if entry.file_type().is_file() && Self::has_extension(entry.path(), extension) {
                    found.insert(entry.into_path());
                }
            }
        }

        CatalogScan {
            entries: found.into_iter().map(DiscoveredTrack::new).collect(),
            skipped,
        }
    }

    /// Find all exported files, whatever shard directory they live in
    pub fn scan_exports(root: &Path, extension: &str) -> Result<CatalogScan<ExportedFile>, SyncError> {
        let mut found = BTreeSet::new();
        let mut skipped = 0;

        for entry in WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(SyncError::io(root, e.into()));
                }
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    skipped += 1;
                    continue;
                }
            };
            if entry.file_type().is_file() && Self::has_extension(entry.path(), extension) {
                found.insert(entry.into_path());
            }
        }

        Ok(CatalogScan {
            entries: found.into_iter().filter_map(ExportedFile::from_path).collect(),
            skipped,
        })
    }

    /// True when `path` is one of the excluded roots or lies below one.
    /// Compares whole components, so `/music2` is not under `/music`.
    pub fn is_excluded(path: &Path, excluded: &[PathBuf]) -> bool {
        excluded.iter().any(|root| path.starts_with(root))
    }

    /// Case-insensitive extension check
    pub fn has_extension(path: &Path, extension: &str) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
            .unwrap_or(false)
    }
}
