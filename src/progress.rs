//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche di una run.
//!
//! ## Responsabilità:
//! - Progress bar visual con `indicatif` per ogni fase (hash, delete, convert)
//! - Implementa `ProgressObserver` così il pool può aggiornare la barra
//! - Tracking statistiche della run (tracce, convertite, cancellate, errori)
//! - Report finale con statistiche aggregate
//!
//! ## Visual feedback:
//! ```text
//! Converting: 12/150 (8%) [=====>------------------------------] 00:03:10
//! ```
//!
//! ## Esempio:
//! ```rust,ignore
//! let progress = reporter.progress("Calculating hashes: ", tracks.len());
//! let report = pool.run(tracks, hash, &progress, &shutdown).await;
//! progress.finish();
//! ```

use crate::pool::ProgressObserver;
use indicatif::{ProgressBar, ProgressStyle};

/// Manages one progress bar for a pool phase
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a visible progress bar titled like `"Converting: "`
    pub fn new(title: &str, total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{prefix}{pos}/{len} ({percent}%) [{bar:40.cyan/blue}] {eta_precise}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.set_prefix(title.to_string());

        Self { bar }
    }

    /// A bar that never draws (quiet mode and tests)
    pub fn hidden(total: usize) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(total as u64);
        Self { bar }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Finish and leave the bar on screen
    pub fn finish(&self) {
        self.bar.finish();
    }

}

impl ProgressObserver for ProgressManager {
    fn on_progress(&self, completed: usize, _total: usize) {
        self.bar.set_position(completed as u64);
    }
}

/// Statistics for one export refresh
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub tracks: usize,
    pub exported_before: usize,
    pub hash_errors: usize,
    pub scan_skipped: usize,
    pub deleted: usize,
    pub delete_errors: usize,
    pub converted: usize,
    pub convert_errors: usize,
    pub duplicates: usize,
    pub deletion_skipped: bool,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> usize {
        self.hash_errors + self.delete_errors + self.convert_errors
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Tracks: {} | Converted: {} | Deleted: {}{} | Duplicates: {} | Errors: {}",
            self.tracks,
            self.converted,
            self.deleted,
            if self.deletion_skipped { " (pruning skipped)" } else { "" },
            self.duplicates,
            self.errors()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_bar_tracks_progress() {
        let progress = ProgressManager::hidden(10);
        progress.on_progress(3, 10);
        assert_eq!(progress.position(), 3);
        progress.on_progress(10, 10);
        progress.finish();
        assert_eq!(progress.position(), 10);
    }

    #[test]
    fn test_stats_summary() {
        let stats = RunStats {
            tracks: 12,
            converted: 3,
            deleted: 1,
            convert_errors: 1,
            hash_errors: 1,
            duplicates: 2,
            ..Default::default()
        };
        assert_eq!(stats.errors(), 2);
        assert_eq!(
            stats.format_summary(),
            "Tracks: 12 | Converted: 3 | Deleted: 1 | Duplicates: 2 | Errors: 2"
        );

        let skipped = RunStats {
            deletion_skipped: true,
            ..Default::default()
        };
        assert!(skipped.format_summary().contains("(pruning skipped)"));
    }
}
