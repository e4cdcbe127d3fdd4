//! Boundary picking on novelty curves
//!
//! A boundary candidate is a strict local maximum of the combined novelty
//! curve that reaches an adaptive median + k·MAD threshold (never below
//! [`MIN_PEAK_NOVELTY`]).

pub mod threshold;

pub use threshold::adaptive_threshold_median_mad;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::features::novelty::NoveltyCurve;

/// Sensitivity multiplier applied in over-segmentation mode
///
/// Lowers the threshold so more peaks survive; false positives are cheaper to
/// delete in an editor than missing boundaries are to add.
pub const OVERSEG_SENSITIVITY_SCALE: f32 = 0.35;

/// Peaks below this novelty are rounding noise, not structure
pub const MIN_PEAK_NOVELTY: f32 = 1e-3;

/// A detected section boundary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundaryCandidate {
    /// Native frame index of the peak
    pub frame_index: usize,
    /// Novelty value at the peak
    pub novelty_value: f32,
    /// Peak time in seconds
    pub time: f32,
}

/// Pick boundary candidates from a novelty curve
///
/// # Arguments
///
/// * `curve` - Combined novelty curve
/// * `sensitivity` - MAD multiplier for the threshold
/// * `force_over_seg` - Lower the threshold to deliberately over-segment
///
/// # Returns
///
/// Candidates in time order. A curve shorter than 3 values yields none.
///
/// # Errors
///
/// Returns `InvalidInput` if `sensitivity` is negative or the curve's
/// value and time arrays differ in length
///
/// # Example
///
/// ```
/// use stratum_structure::features::boundaries::pick_boundaries;
/// use stratum_structure::features::novelty::NoveltyCurve;
///
/// let curve = NoveltyCurve {
///     values: vec![0.1, 0.2, 0.1, 0.2, 0.9, 0.2, 0.1, 0.2],
///     times: (0..8).map(|i| i as f32).collect(),
/// };
/// let peaks = pick_boundaries(&curve, 1.5, false)?;
/// assert_eq!(peaks.len(), 1);
/// assert_eq!(peaks[0].frame_index, 4);
/// # Ok::<(), stratum_structure::AnalysisError>(())
/// ```
pub fn pick_boundaries(
    curve: &NoveltyCurve,
    sensitivity: f32,
    force_over_seg: bool,
) -> Result<Vec<BoundaryCandidate>, AnalysisError> {
    if curve.values.len() != curve.times.len() {
        return Err(AnalysisError::InvalidInput(format!(
            "Novelty curve has {} values but {} times",
            curve.values.len(),
            curve.times.len()
        )));
    }
    if curve.values.len() < 3 {
        log::debug!("Novelty curve too short for boundaries ({} values)", curve.values.len());
        return Ok(Vec::new());
    }

    let k = if force_over_seg {
        sensitivity * OVERSEG_SENSITIVITY_SCALE
    } else {
        sensitivity
    };
    let threshold = adaptive_threshold_median_mad(&curve.values, k)?.max(MIN_PEAK_NOVELTY);

    let boundaries: Vec<BoundaryCandidate> = find_local_maxima(&curve.values, threshold)
        .into_iter()
        .map(|(i, v)| BoundaryCandidate {
            frame_index: i,
            novelty_value: v,
            time: curve.times[i],
        })
        .collect();

    log::debug!(
        "Picked {} boundaries (threshold={:.4}, k={:.2}, over_seg={})",
        boundaries.len(),
        threshold,
        k,
        force_over_seg
    );

    Ok(boundaries)
}

/// Strict interior local maxima at or above `threshold`, in index order
///
/// The first and last values are never peaks: a strict maximum needs a
/// neighbor on both sides.
pub fn find_local_maxima(signal: &[f32], threshold: f32) -> Vec<(usize, f32)> {
    if signal.len() < 3 {
        return vec![];
    }
    (1..signal.len() - 1)
        .filter(|&i| {
            let v = signal[i];
            v > signal[i - 1] && v > signal[i + 1] && v >= threshold
        })
        .map(|i| (i, signal[i]))
        .collect()
}
