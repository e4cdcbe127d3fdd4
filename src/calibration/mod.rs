//! Batch calibration of segmentation parameters
//!
//! Scores candidate [`SegmentationConfig`]s against reference tracks with
//! annotated boundaries. Candidates are evaluated in parallel on a bounded
//! rayon pool; each worker keeps its own [`SimilarityCache`], so matrices are
//! shared across the candidates a worker handles but never across threads.
//!
//! A candidate is first scored on a short probe of tracks. If the probe mean
//! falls below the floor, the remaining tracks are skipped and the candidate
//! is reported as pruned.
//!
//! # Reference
//!
//! Turnbull, D., Lanckriet, G., Pampalk, E., & Goto, M. (2007). A Supervised
//! Approach for Detecting Boundaries in Music Using Difference Features and
//! Boosting. *Proceedings of ISMIR* (boundary hit-rate with tolerance window).

use std::cmp::Ordering;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cache::{SimilarityCache, DEFAULT_CACHE_ENTRIES};
use crate::config::SegmentationConfig;
use crate::error::AnalysisError;
use crate::input::FeatureSequence;
use crate::schedule::RunContext;

/// A track with annotated section boundaries
#[derive(Debug, Clone)]
pub struct ReferenceTrack {
    /// Display name for logs and reports
    pub name: String,
    /// Extracted features
    pub features: FeatureSequence,
    /// Annotated boundary times in seconds (track start and end are ignored)
    pub boundaries: Vec<f32>,
}

/// Calibration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalibrationOptions {
    /// Hit window for boundary matching in seconds (default: 3.0)
    pub tolerance_sec: f32,
    /// Tracks scored before the prune decision (default: 3)
    pub probe_tracks: usize,
    /// Candidates whose probe mean F-measure is below this are pruned (default: 0.2)
    pub prune_floor: f32,
    /// Worker threads (default: available cores - 1, at least 1)
    pub jobs: usize,
    /// Cache entries per worker (default: 16)
    pub cache_entries: usize,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            tolerance_sec: 3.0,
            probe_tracks: 3,
            prune_floor: 0.2,
            jobs: default_jobs(),
            cache_entries: DEFAULT_CACHE_ENTRIES,
        }
    }
}

/// Available cores minus one, keeping one free for the caller
pub fn default_jobs() -> usize {
    let n = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    std::cmp::max(1, n.saturating_sub(1))
}

/// Boundary retrieval scores for one track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundaryScore {
    /// Matched estimates / all estimates
    pub precision: f32,
    /// Matched references / all references
    pub recall: f32,
    /// Harmonic mean of precision and recall
    pub f_measure: f32,
}

/// Outcome of one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateReport {
    /// Position of the candidate in the input list
    pub candidate_index: usize,
    /// Mean F-measure over the evaluated tracks
    pub mean_f_measure: f32,
    /// Tracks actually scored
    pub tracks_evaluated: usize,
    /// Tracks whose analysis failed (scored as 0)
    pub failures: usize,
    /// Whether evaluation stopped after the probe
    pub pruned: bool,
}

/// All candidate outcomes, best first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// Sorted by mean F-measure descending, then candidate index
    pub candidates: Vec<CandidateReport>,
}

impl CalibrationReport {
    /// Best candidate, if any
    pub fn best(&self) -> Option<&CandidateReport> {
        self.candidates.first()
    }
}

/// Boundary F-measure with one-to-one greedy matching
///
/// Pairs closer than `tolerance` are matched closest first; each estimate and
/// each reference is used at most once. Two empty lists score 1.
///
/// # Example
///
/// ```
/// use stratum_structure::calibration::boundary_f_measure;
///
/// let s = boundary_f_measure(&[10.2, 30.0], &[10.0, 20.0], 3.0);
/// assert_eq!(s.precision, 0.5);
/// assert_eq!(s.recall, 0.5);
/// ```
pub fn boundary_f_measure(estimated: &[f32], reference: &[f32], tolerance: f32) -> BoundaryScore {
    if estimated.is_empty() && reference.is_empty() {
        return BoundaryScore {
            precision: 1.0,
            recall: 1.0,
            f_measure: 1.0,
        };
    }

    let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
    for (i, &e) in estimated.iter().enumerate() {
        for (j, &r) in reference.iter().enumerate() {
            let d = (e - r).abs();
            if d <= tolerance {
                pairs.push((d, i, j));
            }
        }
    }
    pairs.sort_by(|a, b| {
        a.0.total_cmp(&b.0)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });

    let mut used_est = vec![false; estimated.len()];
    let mut used_ref = vec![false; reference.len()];
    let mut hits = 0usize;
    for (_, i, j) in pairs {
        if !used_est[i] && !used_ref[j] {
            used_est[i] = true;
            used_ref[j] = true;
            hits += 1;
        }
    }

    let precision = if estimated.is_empty() {
        0.0
    } else {
        hits as f32 / estimated.len() as f32
    };
    let recall = if reference.is_empty() {
        0.0
    } else {
        hits as f32 / reference.len() as f32
    };
    let f_measure = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    BoundaryScore {
        precision,
        recall,
        f_measure,
    }
}

/// Score one candidate on one track
///
/// Only interior boundaries count: section starts after 0 against reference
/// times strictly inside the track.
pub fn score_track(
    track: &ReferenceTrack,
    config: &SegmentationConfig,
    tolerance: f32,
    cache: &mut SimilarityCache,
) -> Result<BoundaryScore, AnalysisError> {
    let map = crate::analyze_structure_with(
        &track.features,
        config,
        &mut RunContext::new().with_cache(cache),
    )?;
    let estimated: Vec<f32> = map
        .sections
        .iter()
        .skip(1)
        .map(|s| s.time_range.start_time)
        .collect();
    let duration = track.features.duration_seconds();
    let reference: Vec<f32> = track
        .boundaries
        .iter()
        .copied()
        .filter(|&t| t > 0.0 && t < duration)
        .collect();
    Ok(boundary_f_measure(&estimated, &reference, tolerance))
}

/// Evaluate one candidate with probe-based pruning
fn evaluate_candidate(
    index: usize,
    tracks: &[ReferenceTrack],
    config: &SegmentationConfig,
    options: &CalibrationOptions,
    cache: &mut SimilarityCache,
) -> CandidateReport {
    let probe = options.probe_tracks.min(tracks.len());
    let mut total = 0.0f32;
    let mut failures = 0usize;
    let mut evaluated = 0usize;

    for (t, track) in tracks.iter().enumerate() {
        if t == probe && probe < tracks.len() {
            let probe_mean = total / probe.max(1) as f32;
            if probe > 0 && probe_mean < options.prune_floor {
                log::debug!(
                    "Candidate {} pruned after {} tracks (mean F={:.3} < {:.3})",
                    index,
                    probe,
                    probe_mean,
                    options.prune_floor
                );
                return CandidateReport {
                    candidate_index: index,
                    mean_f_measure: probe_mean,
                    tracks_evaluated: evaluated,
                    failures,
                    pruned: true,
                };
            }
        }

        match score_track(track, config, options.tolerance_sec, cache) {
            Ok(score) => total += score.f_measure,
            Err(e) => {
                log::warn!("Candidate {}: track '{}' failed: {}", index, track.name, e);
                failures += 1;
            }
        }
        evaluated += 1;
    }

    CandidateReport {
        candidate_index: index,
        mean_f_measure: total / evaluated.max(1) as f32,
        tracks_evaluated: evaluated,
        failures,
        pruned: false,
    }
}

/// Score every candidate over the reference tracks
///
/// # Arguments
///
/// * `tracks` - Reference tracks; the first `probe_tracks` form the probe
/// * `candidates` - Parameter sets to compare
/// * `options` - Tolerance, pruning and pool size
///
/// # Errors
///
/// - `InsufficientData` if there are no tracks
/// - `InvalidInput` if a candidate or the options are out of range
/// - `ProcessingError` if the worker pool cannot be built
pub fn calibrate(
    tracks: &[ReferenceTrack],
    candidates: &[SegmentationConfig],
    options: &CalibrationOptions,
) -> Result<CalibrationReport, AnalysisError> {
    if tracks.is_empty() {
        return Err(AnalysisError::InsufficientData(
            "No reference tracks for calibration".to_string(),
        ));
    }
    if !(options.tolerance_sec.is_finite() && options.tolerance_sec > 0.0) {
        return Err(AnalysisError::InvalidInput(format!(
            "tolerance_sec must be positive, got {}",
            options.tolerance_sec
        )));
    }
    for (i, c) in candidates.iter().enumerate() {
        c.validate().map_err(|e| {
            AnalysisError::InvalidInput(format!("Candidate {}: {}", i, e))
        })?;
    }

    let jobs = if options.jobs == 0 {
        default_jobs()
    } else {
        options.jobs
    };
    log::debug!(
        "Calibrating {} candidates over {} tracks with {} workers (probe={}, floor={:.3})",
        candidates.len(),
        tracks.len(),
        jobs,
        options.probe_tracks,
        options.prune_floor
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| AnalysisError::ProcessingError(format!("Failed to build thread pool: {}", e)))?;

    let cache_entries = options.cache_entries;
    let mut reports: Vec<CandidateReport> = pool.install(|| {
        candidates
            .par_iter()
            .enumerate()
            .map_init(
                || SimilarityCache::new(cache_entries),
                |cache, (i, config)| evaluate_candidate(i, tracks, config, options, cache),
            )
            .collect()
    });

    reports.sort_by(|a, b| {
        b.mean_f_measure
            .partial_cmp(&a.mean_f_measure)
            .unwrap_or(Ordering::Equal)
            .then(a.candidate_index.cmp(&b.candidate_index))
    });

    let pruned = reports.iter().filter(|r| r.pruned).count();
    log::debug!(
        "Calibration complete: {} candidates, {} pruned, best F={:.3}",
        reports.len(),
        pruned,
        reports.first().map(|r| r.mean_f_measure).unwrap_or(0.0)
    );

    Ok(CalibrationReport { candidates: reports })
}
