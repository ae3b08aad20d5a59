//! # Transcoding and Loudness Module
//!
//! Interfacce verso i collaboratori esterni che producono l'export tree.
//!
//! ## Responsabilità:
//! - `Transcoder`: converte un file sorgente nel formato di export
//! - `LoudnessNormalizer`: normalizza il loudness dell'intera collezione
//! - Implementazioni di default con ffmpeg (libmp3lame) e collectiongain
//! - `convert_track`: scrive su un file `.partial` e rinomina solo a successo
//!
//! ## Pipeline di conversione per traccia:
//! 1. Crea la directory shard (`output/ab/`)
//! 2. Transcodifica su `output/ab/<fp>.partial.mp3`
//! 3. Rinomina atomicamente su `output/ab/<fp>.mp3`
//! 4. In caso di errore rimuove il file parziale
//!
//! Un file parziale rimasto dopo un'interruzione non ha come stem un
//! fingerprint valido e viene eliminato alla run successiva.

use crate::config::Config;
use crate::error::SyncError;
use crate::platform::{run_tool, OutputMode};
use crate::track::{ExportLayout, HashedTrack};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Converts one source file into the export format
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn convert(&self, source: &Path, destination: &Path) -> Result<(), SyncError>;

    /// Program that has to be installed for `convert` to work
    fn program(&self) -> Option<&str> {
        None
    }
}

/// Normalizes loudness across the whole export tree
#[async_trait]
pub trait LoudnessNormalizer: Send + Sync {
    async fn normalize(&self, export_dir: &Path) -> Result<(), SyncError>;
}

/// ffmpeg with the LAME encoder in VBR mode
pub struct FfmpegTranscoder {
    program: String,
    quality: u8,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>, quality: u8) -> Self {
        Self {
            program: program.into(),
            quality,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.tools.transcoder.clone(), config.quality)
    }

    fn arguments(&self, source: &Path, destination: &Path) -> Vec<OsString> {
        vec![
            "-nostdin".into(),
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            source.as_os_str().to_owned(),
            "-codec:a".into(),
            "libmp3lame".into(),
            "-qscale:a".into(),
            self.quality.to_string().into(),
            destination.as_os_str().to_owned(),
        ]
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert(&self, source: &Path, destination: &Path) -> Result<(), SyncError> {
        run_tool(&self.program, self.arguments(source, destination), OutputMode::Capture).await?;
        Ok(())
    }

    fn program(&self) -> Option<&str> {
        Some(&self.program)
    }
}

/// `collectiongain` from rgain, run over the export directory
pub struct CollectionGain {
    program: String,
}

impl CollectionGain {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl LoudnessNormalizer for CollectionGain {
    async fn normalize(&self, export_dir: &Path) -> Result<(), SyncError> {
        run_tool(&self.program, [export_dir.as_os_str()], OutputMode::Capture).await?;
        Ok(())
    }
}

/// Convert one track into its content-addressed export path
pub async fn convert_track(
    transcoder: &dyn Transcoder,
    track: &HashedTrack,
    layout: &ExportLayout,
) -> Result<PathBuf> {
    let destination = track.export_path(layout);
    let partial = layout.partial_path_for(&track.fingerprint);

    if let Some(shard) = destination.parent() {
        tokio::fs::create_dir_all(shard)
            .await
            .with_context(|| format!("Failed to create shard directory {}", shard.display()))?;
    }

    debug!("Converting {} -> {}", track.source_path.display(), destination.display());
    if let Err(e) = transcoder.convert(&track.source_path, &partial).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e).with_context(|| format!("Failed to convert {}", track.source_path.display()));
    }

    tokio::fs::rename(&partial, &destination)
        .await
        .with_context(|| format!("Failed to move {} into place", partial.display()))?;

    Ok(destination)
}
