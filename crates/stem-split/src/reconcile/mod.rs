//! Post-separation reconciliation
//!
//! Turns the engine's filenames into the stable output naming scheme:
//! classify each produced file, then place it under its canonical name
//! without clobbering anything already in the output directory.
//!
//! Individual entries may fail (file missing, move refused); those are
//! logged and reported as skipped while the remaining entries continue.

mod classify;
mod place;

use std::path::Path;

pub use classify::{StemClassifier, StemRule, DEFAULT_RULES};
pub use place::{place, PlaceError, MAX_SUFFIX};

/// Classifier decision for one produced file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    /// Filename as reported by the engine
    pub source: String,
    /// Canonical target basename, `None` when no keyword matched
    pub target: Option<String>,
}

/// Classify every produced filename (no filesystem access)
pub fn plan(classifier: &StemClassifier, produced: &[String]) -> Vec<PlanEntry> {
    produced
        .iter()
        .map(|source| {
            let basename = Path::new(source)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| source.clone());
            PlanEntry {
                source: source.clone(),
                target: classifier.target_name(&basename),
            }
        })
        .collect()
}

/// A produced file that ended up in the output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedFile {
    /// Filename as reported by the engine
    pub source: String,
    /// Final basename on disk
    pub final_name: String,
    /// Whether the file matched a stem keyword (false = original name kept)
    pub matched: bool,
}

/// Why a produced file was not placed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Engine reported the file but it is not on disk
    Missing,
    /// Reported path points outside the output directory
    OutsideOutputDir,
    /// Filesystem refused the move
    MoveFailed(String),
}

/// A produced file that was left alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub source: String,
    pub reason: SkipReason,
}

/// Outcome of reconciling one run's output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub placed: Vec<PlacedFile>,
    pub skipped: Vec<SkippedFile>,
}

impl ReconcileReport {
    /// Final basenames in engine order
    pub fn final_names(&self) -> Vec<&str> {
        self.placed.iter().map(|p| p.final_name.as_str()).collect()
    }

    pub fn has_warnings(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Classify and place every produced file in `output_dir`
pub fn reconcile(
    classifier: &StemClassifier,
    output_dir: &Path,
    produced: &[String],
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for entry in plan(classifier, produced) {
        let source_path = output_dir.join(&entry.source);

        if source_path.parent() != Some(output_dir) {
            log::warn!(
                "Ignoring {}: not inside output directory {:?}",
                entry.source,
                output_dir
            );
            report.skipped.push(SkippedFile {
                source: entry.source,
                reason: SkipReason::OutsideOutputDir,
            });
            continue;
        }

        if !source_path.exists() {
            log::warn!("Warning: Expected file {} not found.", entry.source);
            report.skipped.push(SkippedFile {
                source: entry.source,
                reason: SkipReason::Missing,
            });
            continue;
        }

        let Some(target) = entry.target else {
            log::info!(
                "Could not match stem for {}, keeping original name.",
                entry.source
            );
            let final_name = source_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| entry.source.clone());
            report.placed.push(PlacedFile {
                source: entry.source,
                final_name,
                matched: false,
            });
            continue;
        };

        match place(&source_path, &target, output_dir) {
            Ok(final_name) => {
                if final_name != target {
                    log::info!(
                        "{} already exists, keeping it and writing {}",
                        target,
                        final_name
                    );
                }
                log::info!("Renamed {} -> {}", entry.source, final_name);
                report.placed.push(PlacedFile {
                    source: entry.source,
                    final_name,
                    matched: true,
                });
            }
            Err(PlaceError::SourceMissing(_)) => {
                log::warn!("Warning: Expected file {} not found.", entry.source);
                report.skipped.push(SkippedFile {
                    source: entry.source,
                    reason: SkipReason::Missing,
                });
            }
            Err(e) => {
                log::error!("Error renaming {}: {}", entry.source, e);
                report.skipped.push(SkippedFile {
                    source: entry.source,
                    reason: SkipReason::MoveFailed(e.to_string()),
                });
            }
        }
    }

    report
}
