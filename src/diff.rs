//! # Diff Engine Module
//!
//! Confronta i fingerprint sorgente con gli stem dei file esportati.
//!
//! ## Regole:
//! - `to_delete`: file esportati il cui stem non è un fingerprint sorgente
//! - `to_convert`: tracce il cui fingerprint non è tra gli stem esportati
//! - Tracce con lo stesso contenuto vengono convertite una sola volta
//!   (la prima in ordine di path) e riportate in `duplicates`
//!
//! Il confronto è per insiemi: l'ordine di input non cambia il risultato.
//! Un set sorgente vuoto produce la cancellazione di tutto l'export: il
//! chiamante deve proteggersi da una scansione vuota per errore.

use crate::hasher::Fingerprint;
use crate::track::{ExportedFile, HashedTrack};
use std::collections::{BTreeMap, HashSet};

/// Source tracks sharing one fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub fingerprint: Fingerprint,
    pub tracks: Vec<HashedTrack>,
}

/// What a run has to do to bring the export tree in line with the sources
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub to_delete: Vec<ExportedFile>,
    pub to_convert: Vec<HashedTrack>,
    pub duplicates: Vec<DuplicateGroup>,
}

impl SyncPlan {
    pub fn is_noop(&self) -> bool {
        self.to_delete.is_empty() && self.to_convert.is_empty()
    }
}

/// Set-based comparison of sources against the export tree
pub struct DiffEngine;

impl DiffEngine {
    pub fn compute(sources: &[HashedTrack], exported: &[ExportedFile]) -> SyncPlan {
        let exported_stems: HashSet<&str> = exported
            .iter()
            .map(|file| file.fingerprint_stem.as_str())
            .collect();

        // fingerprint -> tracks, sorted by path inside each group
        let mut by_fingerprint: BTreeMap<&Fingerprint, Vec<&HashedTrack>> = BTreeMap::new();
        for track in sources {
            by_fingerprint.entry(&track.fingerprint).or_default().push(track);
        }

        let mut to_convert = Vec::new();
        let mut duplicates = Vec::new();
        for (fingerprint, tracks) in by_fingerprint.iter_mut() {
            tracks.sort_by(|a, b| a.source_path.cmp(&b.source_path));
            if !exported_stems.contains(fingerprint.as_str()) {
                to_convert.push(tracks[0].clone());
            }
            if tracks.len() > 1 {
                duplicates.push(DuplicateGroup {
                    fingerprint: (*fingerprint).clone(),
                    tracks: tracks.iter().map(|t| (*t).clone()).collect(),
                });
            }
        }
        to_convert.sort_by(|a, b| a.source_path.cmp(&b.source_path));

        let to_delete = exported
            .iter()
            .filter(|file| {
                !by_fingerprint.contains_key(&Fingerprint::from_hex(file.fingerprint_stem.as_str()))
            })
            .cloned()
            .collect();

        SyncPlan {
            to_delete,
            to_convert,
            duplicates,
        }
    }
}
