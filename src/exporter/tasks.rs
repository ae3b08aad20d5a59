//! # Per-item Tasks
//!
//! Le operazioni eseguite dai worker del pool, una per item.
//!
//! ## Responsabilità:
//! - Hash di una traccia in `spawn_blocking` (lettura a chunk, CPU bound)
//! - Cancellazione di un file orfano dall'export tree, con pulizia dello
//!   shard rimasto vuoto
//!
//! Gli errori sono `anyhow::Error` con contesto; il pool li raccoglie.

use crate::track::{DiscoveredTrack, ExportedFile, HashedTrack};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Fingerprint a source track off the async runtime
pub async fn hash_track(track: DiscoveredTrack) -> Result<HashedTrack> {
    let source = track.source_path.clone();
    let hashed = tokio::task::spawn_blocking(move || track.hash())
        .await
        .with_context(|| format!("Hashing task for {} did not complete", source.display()))??;
    Ok(hashed)
}

/// Remove an orphaned export; an emptied shard directory goes with it
pub async fn delete_export(file: ExportedFile, export_root: &Path) -> Result<PathBuf> {
    tokio::fs::remove_file(&file.path)
        .await
        .with_context(|| format!("Failed to delete {}", file.path.display()))?;
    debug!("Deleted {}", file.path.display());

    if let Some(shard) = file.path.parent() {
        if shard != export_root && shard.starts_with(export_root) {
            // fails while the shard still holds files
            if tokio::fs::remove_dir(shard).await.is_ok() {
                debug!("Removed empty shard {}", shard.display());
            }
        }
    }

    Ok(file.path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::ContentHasher;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_hash_track() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.flac");
        std::fs::write(&path, b"audio").unwrap();

        let hashed = hash_track(DiscoveredTrack::new(&path)).await.unwrap();
        assert_eq!(hashed.fingerprint, ContentHasher::fingerprint_bytes(b"audio"));

        let missing = hash_track(DiscoveredTrack::new(temp_dir.path().join("gone.flac"))).await;
        assert!(format!("{:#}", missing.unwrap_err()).contains("gone.flac"));
    }

    #[tokio::test]
    async fn test_delete_export_prunes_empty_shard_only() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("aa")).unwrap();
        std::fs::create_dir_all(root.join("bb")).unwrap();
        std::fs::write(root.join("aa/aa1.mp3"), b"x").unwrap();
        std::fs::write(root.join("bb/bb1.mp3"), b"x").unwrap();
        std::fs::write(root.join("bb/bb2.mp3"), b"x").unwrap();
        std::fs::write(root.join("stray.mp3"), b"x").unwrap();

        for name in ["aa/aa1.mp3", "bb/bb1.mp3", "stray.mp3"] {
            let file = ExportedFile::from_path(root.join(name)).unwrap();
            delete_export(file, root).await.unwrap();
        }

        assert!(!root.join("aa").exists());
        assert!(root.join("bb/bb2.mp3").exists());
        assert!(root.exists());
    }

    #[tokio::test]
    async fn test_delete_missing_export_fails() {
        let temp_dir = TempDir::new().unwrap();
        let file = ExportedFile::from_path(temp_dir.path().join("aa/gone.mp3")).unwrap();
        assert!(delete_export(file, temp_dir.path()).await.is_err());
    }
}
