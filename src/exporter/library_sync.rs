//! # Library Sync Orchestrator
//!
//! Questo è il modulo che orchestra tutto il processo di export e sync.
//!
//! ## Responsabilità:
//! - Coordinamento di catalogo, hashing, diff, cancellazione e conversione
//! - Protezione dell'export tree (scansione vuota, hash falliti)
//! - Normalizzazione del loudness dopo la conversione
//! - Sessione col dispositivo per `--sync` (una sola per invocazione)
//! - Notifiche e riepilogo finale
//!
//! ## Flusso di esecuzione (`refresh`):
//! 1. **Dependency check**: il transcoder deve essere installato
//! 2. **Discovery**: sorgenti ed export tree
//! 3. **Hashing**: worker pool, `spawn_blocking` per traccia
//! 4. **Diff**: delete-set e convert-set, duplicati segnalati
//! 5. **Delete**: file orfani, saltato se una guardia scatta
//! 6. **Convert**: worker pool, file parziale + rename
//! 7. **Loudness**: collectiongain sull'intero export tree
//!
//! Ogni fase termina prima che inizi la successiva; il token di shutdown
//! viene controllato tra una fase e l'altra.

use crate::{
    catalog::TrackCatalog,
    config::Config,
    device::{DeviceBackend, DeviceSyncer, ExternalDevice},
    diff::{DiffEngine, DuplicateGroup},
    error::SyncError,
    exporter::tasks::{delete_export, hash_track},
    logging::Reporter,
    notify::Notifier,
    platform::check_dependencies,
    pool::{ItemFailure, WorkerPool},
    progress::RunStats,
    track::{DiscoveredTrack, ExportLayout, ExportedFile, HashedTrack},
    transcoder::{convert_track, CollectionGain, FfmpegTranscoder, LoudnessNormalizer, Transcoder},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const NOTIFY_TITLE: &str = "MTPSync";

/// Top-level orchestrator: export refresh and device sync
pub struct MtpSync {
    config: Config,
    reporter: Reporter,
    layout: ExportLayout,
    pool: WorkerPool,
    transcoder: Arc<dyn Transcoder>,
    normalizer: Arc<dyn LoudnessNormalizer>,
    device: Arc<dyn DeviceBackend>,
    notifier: Notifier,
}

impl MtpSync {
    /// Wire the external tools named in the configuration
    pub fn new(config: Config, reporter: Reporter) -> Self {
        let layout = ExportLayout::new(
            config.output_directory.clone(),
            config.export_extension.clone(),
        );
        let pool = WorkerPool::new(config.workers);
        debug!("Worker pool with {} workers", pool.workers());

        Self {
            transcoder: Arc::new(FfmpegTranscoder::from_config(&config)),
            normalizer: Arc::new(CollectionGain::new(config.tools.loudness.clone())),
            device: Arc::new(ExternalDevice::from_config(&config)),
            notifier: Notifier::from_config(&config),
            config,
            reporter,
            layout,
            pool,
        }
    }

    pub fn with_transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoder = transcoder;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn LoudnessNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_device(mut self, device: Arc<dyn DeviceBackend>) -> Self {
        self.device = device;
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Refresh the export tree and announce it
    pub async fn update_export(&self, shutdown: &CancellationToken) -> Result<RunStats, SyncError> {
        let stats = self.refresh(shutdown).await?;
        self.notifier.notify(NOTIFY_TITLE, "Converting done.").await;
        Ok(stats)
    }

    /// Refresh, then mirror the export tree onto the device.
    /// A failed device session is reported, not returned; only an interruption is.
    pub async fn sync(&self, shutdown: &CancellationToken) -> Result<RunStats, SyncError> {
        let stats = self.update_export(shutdown).await?;

        let outcome = self.device_session(shutdown).await;
        self.notifier.notify(NOTIFY_TITLE, "Sync done.").await;

        match outcome {
            Ok(()) => {
                self.reporter.success("Device is in sync.");
                Ok(stats)
            }
            Err(SyncError::Interrupted) => Err(SyncError::Interrupted),
            Err(e) => {
                self.reporter.error(e.to_string());
                self.reporter.error("Is your device plugged in and unlocked?");
                Ok(stats)
            }
        }
    }

    async fn device_session(&self, shutdown: &CancellationToken) -> Result<(), SyncError> {
        let programs = self.device.programs();
        let programs: Vec<&str> = programs.iter().map(String::as_str).collect();
        check_dependencies(&programs)?;

        let mut device = DeviceSyncer::new(
            Arc::clone(&self.device),
            self.config.mtp_target.clone(),
            self.reporter.clone(),
        )?;
        device.run_session(self.layout.root(), shutdown).await
    }

    /// Bring the export tree in line with the source directories
    pub async fn refresh(&self, shutdown: &CancellationToken) -> Result<RunStats, SyncError> {
        if let Some(program) = self.transcoder.program() {
            check_dependencies(&[program])?;
        }

        let mut stats = RunStats::new();

        let sources = TrackCatalog::scan_sources(
            &self.config.directories,
            &self.config.excluded,
            &self.config.source_extension,
        );
        let exports = TrackCatalog::scan_exports(self.layout.root(), self.layout.extension())?;
        stats.tracks = sources.entries.len();
        stats.scan_skipped = sources.skipped + exports.skipped;
        stats.exported_before = exports.entries.len();
        checkpoint(shutdown)?;

        let hashed = self.hash_sources(sources.entries, &mut stats, shutdown).await?;

        let plan = DiffEngine::compute(&hashed, &exports.entries);
        stats.duplicates = plan.duplicates.iter().map(|g| g.tracks.len() - 1).sum();
        self.report_duplicates(&plan.duplicates);

        let to_delete = match deletion_blocker(&stats, plan.to_delete.len(), self.config.allow_empty_prune) {
            Some(reason) => {
                self.reporter.error(reason);
                stats.deletion_skipped = true;
                Vec::new()
            }
            None => plan.to_delete,
        };

        self.reporter.success(format!("{} tracks selected for export.", stats.tracks));
        self.reporter.success(format!(
            "{} unused files will be deleted, {} new tracks will be converted.",
            to_delete.len(),
            plan.to_convert.len()
        ));

        self.delete_orphans(to_delete, &mut stats, shutdown).await?;
        self.convert_tracks(plan.to_convert, &mut stats, shutdown).await?;
        self.normalize_loudness(shutdown).await?;

        self.reporter.success(stats.format_summary());
        Ok(stats)
    }

    async fn hash_sources(
        &self,
        tracks: Vec<DiscoveredTrack>,
        stats: &mut RunStats,
        shutdown: &CancellationToken,
    ) -> Result<Vec<HashedTrack>, SyncError> {
        let progress = self.reporter.progress("Calculating hashes: ", tracks.len());
        let report = self.pool.run(tracks, hash_track, &progress, shutdown).await;
        progress.finish();

        stats.hash_errors = self.report_failures(&report.failures);
        if report.cancelled {
            return Err(SyncError::Interrupted);
        }
        Ok(report.results)
    }

    async fn delete_orphans(
        &self,
        files: Vec<ExportedFile>,
        stats: &mut RunStats,
        shutdown: &CancellationToken,
    ) -> Result<(), SyncError> {
        self.reporter.info("Deleting obsolete files...");
        if files.is_empty() {
            return Ok(());
        }

        let progress = self.reporter.progress("Deleting: ", files.len());
        let root = self.layout.root().to_path_buf();
        let report = self
            .pool
            .run(
                files,
                move |file: ExportedFile| {
                    let root = root.clone();
                    async move { delete_export(file, &root).await }
                },
                &progress,
                shutdown,
            )
            .await;
        progress.finish();

        stats.deleted = report.results.len();
        stats.delete_errors = self.report_failures(&report.failures);
        if report.cancelled {
            return Err(SyncError::Interrupted);
        }
        Ok(())
    }

    async fn convert_tracks(
        &self,
        tracks: Vec<HashedTrack>,
        stats: &mut RunStats,
        shutdown: &CancellationToken,
    ) -> Result<(), SyncError> {
        self.reporter.info("Converting new files...");
        if tracks.is_empty() {
            return Ok(());
        }

        let progress = self.reporter.progress("Converting: ", tracks.len());
        let transcoder = Arc::clone(&self.transcoder);
        let layout = self.layout.clone();
        let report = self
            .pool
            .run(
                tracks,
                move |track: HashedTrack| {
                    let transcoder = Arc::clone(&transcoder);
                    let layout = layout.clone();
                    async move { convert_track(transcoder.as_ref(), &track, &layout).await }
                },
                &progress,
                shutdown,
            )
            .await;
        progress.finish();

        stats.converted = report.results.len();
        stats.convert_errors = self.report_failures(&report.failures);
        if report.cancelled {
            return Err(SyncError::Interrupted);
        }
        Ok(())
    }

    async fn normalize_loudness(&self, shutdown: &CancellationToken) -> Result<(), SyncError> {
        if !self.config.normalize_loudness {
            debug!("Loudness normalization disabled");
            return Ok(());
        }
        checkpoint(shutdown)?;

        self.reporter.info("Calculating replaygain...");
        let outcome = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(SyncError::Interrupted),
            outcome = self.normalizer.normalize(self.layout.root()) => outcome,
        };
        // a loudness failure never aborts the run
        if let Err(e) = outcome {
            self.reporter.error(e.to_string());
        }
        Ok(())
    }

    fn report_duplicates(&self, duplicates: &[DuplicateGroup]) {
        for group in duplicates {
            let mut message = format!(
                "{} files share content {}, exporting it once:",
                group.tracks.len(),
                group.fingerprint
            );
            for track in &group.tracks {
                message.push_str(&format!("\n\t{}", track.source_path.display()));
            }
            self.reporter.warn(message);
        }
    }

    fn report_failures(&self, failures: &[ItemFailure]) -> usize {
        for failure in failures {
            self.reporter.error(format!("{:#}", failure.error));
        }
        failures.len()
    }
}

fn checkpoint(shutdown: &CancellationToken) -> Result<(), SyncError> {
    if shutdown.is_cancelled() {
        Err(SyncError::Interrupted)
    } else {
        Ok(())
    }
}

/// Reason to keep every pending deletion for this run, if any
fn deletion_blocker(stats: &RunStats, pending: usize, allow_empty_prune: bool) -> Option<String> {
    if pending == 0 {
        return None;
    }
    if stats.tracks == 0 && !allow_empty_prune {
        return Some(format!(
            "No source tracks found; keeping all {} exported files (set allow_empty_prune to prune them)",
            pending
        ));
    }
    if stats.hash_errors > 0 {
        return Some(format!(
            "{} tracks could not be hashed; not deleting {} exported files this run",
            stats.hash_errors, pending
        ));
    }
    None
}
