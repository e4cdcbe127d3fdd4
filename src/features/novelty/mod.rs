//! Multi-scale checkerboard novelty
//!
//! Slides a Gaussian-tapered checkerboard kernel along the diagonal of a
//! similarity matrix at several kernel sizes and combines the per-scale
//! curves into one. Peaks in the combined curve mark block-diagonal
//! transitions, i.e. section changes.
//!
//! Small kernels respond to phrase-level changes; large kernels only to
//! changes that persist for many seconds on both sides.
//!
//! # Reference
//!
//! Foote, J. (2000). Automatic Audio Segmentation Using a Measure of Audio Novelty.
//! *Proceedings of the IEEE International Conference on Multimedia and Expo*.

pub mod kernel;

pub use kernel::CheckerboardKernel;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::features::similarity::SimilarityMatrix;
use crate::schedule::{RunContext, Stage, CHECKPOINT_INTERVAL};

/// Combined novelty at native frame resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoveltyCurve {
    /// Novelty per native frame, never negative
    pub values: Vec<f32>,
    /// Time in seconds of each value
    pub times: Vec<f32>,
}

impl NoveltyCurve {
    /// Number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the curve is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Convert kernel sizes in seconds to half-widths in matrix indices
///
/// Each half-width is at least 1 and at most half the matrix size.
pub fn kernel_half_widths(matrix: &SimilarityMatrix, kernel_sizes_sec: &[f32]) -> Vec<usize> {
    let index_seconds = matrix.frame_hop_seconds() * matrix.downsample_factor() as f32;
    let cap = (matrix.size() / 2).max(1);
    kernel_sizes_sec
        .iter()
        .map(|&sec| {
            let k = if index_seconds > 0.0 {
                (sec / index_seconds).round() as usize
            } else {
                1
            };
            k.clamp(1, cap)
        })
        .collect()
}

/// Compute the combined novelty curve without a cache or checkpoint
///
/// # Arguments
///
/// * `matrix` - Similarity matrix
/// * `kernel_sizes` - Kernel half-widths in matrix indices
/// * `scale_weights` - One weight per kernel size (normalized to sum to 1)
///
/// # Errors
///
/// - `InvalidInput` if the weights do not match the kernel sizes, or are negative
/// - `InsufficientData` if the matrix is empty
pub fn compute_novelty(
    matrix: &SimilarityMatrix,
    kernel_sizes: &[usize],
    scale_weights: &[f32],
) -> Result<NoveltyCurve, AnalysisError> {
    compute_novelty_with(matrix, kernel_sizes, scale_weights, &mut RunContext::new())
}

/// Compute the combined novelty curve, reusing cached kernels and running checkpoints
pub fn compute_novelty_with(
    matrix: &SimilarityMatrix,
    kernel_sizes: &[usize],
    scale_weights: &[f32],
    ctx: &mut RunContext<'_>,
) -> Result<NoveltyCurve, AnalysisError> {
    let n = matrix.size();
    if n == 0 {
        return Err(AnalysisError::InsufficientData(
            "Empty similarity matrix".to_string(),
        ));
    }
    if kernel_sizes.is_empty() || kernel_sizes.len() != scale_weights.len() {
        return Err(AnalysisError::InvalidInput(format!(
            "Need one weight per kernel size ({} sizes, {} weights)",
            kernel_sizes.len(),
            scale_weights.len()
        )));
    }
    let weights = normalize_weights(scale_weights)?;

    log::debug!(
        "Computing novelty: {} indices, kernels={:?}, weights={:?}",
        n,
        kernel_sizes,
        weights
    );

    let mut combined = vec![0.0f32; n];
    for (scale, (&half_width, &weight)) in kernel_sizes.iter().zip(weights.iter()).enumerate() {
        let kernel = match ctx.cache() {
            Some(cache) => cache.kernel(half_width),
            None => Arc::new(CheckerboardKernel::new(half_width)),
        };
        for i in 0..n {
            if i % CHECKPOINT_INTERVAL == 0 {
                let progress = (scale as f32 + i as f32 / n as f32) / kernel_sizes.len() as f32;
                ctx.checkpoint(Stage::Novelty, progress)?;
            }
            if weight > 0.0 {
                combined[i] += weight * kernel.response(|r, c| matrix.get(r, c), n, i);
            }
        }
    }

    for v in combined.iter_mut() {
        *v = v.max(0.0);
    }

    let values = resample_to_native(&combined, matrix.downsample_factor(), matrix.native_frames());
    let hop = matrix.frame_hop_seconds();
    let start = matrix.start_time();
    let times = (0..values.len()).map(|j| start + j as f32 * hop).collect();

    log::debug!(
        "Novelty curve: {} native values, max={:.4}",
        values.len(),
        values.iter().copied().fold(0.0f32, f32::max)
    );

    Ok(NoveltyCurve { values, times })
}

/// Normalize weights to sum to 1; all-zero weights become uniform
fn normalize_weights(weights: &[f32]) -> Result<Vec<f32>, AnalysisError> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(AnalysisError::InvalidInput(format!(
            "Scale weights must be non-negative, got {:?}",
            weights
        )));
    }
    let sum: f32 = weights.iter().sum();
    if sum <= 0.0 {
        let uniform = 1.0 / weights.len() as f32;
        return Ok(vec![uniform; weights.len()]);
    }
    Ok(weights.iter().map(|w| w / sum).collect())
}

/// Linear interpolation from downsampled indices back to native frames
///
/// Downsampled index `i` marks a boundary at the start of its block, so it
/// maps onto native frame `i * factor`.
fn resample_to_native(values: &[f32], factor: usize, native_frames: usize) -> Vec<f32> {
    if factor <= 1 || values.len() < 2 {
        let mut out = values.to_vec();
        out.resize(native_frames.max(values.len()), values.last().copied().unwrap_or(0.0));
        out.truncate(native_frames.max(1));
        return out;
    }
    let last = values.len() - 1;
    (0..native_frames)
        .map(|j| {
            let p = j as f32 / factor as f32;
            let i0 = (p.floor() as usize).min(last);
            let i1 = (i0 + 1).min(last);
            let frac = (p - i0 as f32).clamp(0.0, 1.0);
            values[i0] * (1.0 - frac) + values[i1] * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SimilarityCache;
    use crate::features::similarity::FeatureChannel;

    fn block_matrix(n: usize, split: usize, factor: usize) -> SimilarityMatrix {
        let rows: Vec<Vec<f32>> = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| if (i < split) == (j < split) { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect();
        SimilarityMatrix::from_rows(&rows, factor, 0.5).unwrap()
    }

    #[test]
    fn test_peak_at_block_change() {
        let m = block_matrix(20, 12, 1);
        let curve = compute_novelty(&m, &[3], &[1.0]).unwrap();
        assert_eq!(curve.len(), 20);
        let peak = crate::numeric::argmax(&curve.values).unwrap();
        assert_eq!(peak, 12);
        assert_eq!(curve.values[0], 0.0);
        assert!(curve.values.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_no_edge_novelty_on_uniform_matrix() {
        let m = block_matrix(16, 16, 1);
        let curve = compute_novelty(&m, &[2, 4], &[0.5, 0.5]).unwrap();
        assert!(curve.values.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_resampled_to_native_resolution() {
        let m = block_matrix(10, 5, 4);
        let curve = compute_novelty(&m, &[2], &[1.0]).unwrap();
        assert_eq!(curve.len(), 40);
        let peak = crate::numeric::argmax(&curve.values).unwrap();
        assert_eq!(peak, 20);
        assert!((curve.times[20] - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_weights_normalized() {
        let m = block_matrix(20, 10, 1);
        let a = compute_novelty(&m, &[3, 3], &[1.0, 1.0]).unwrap();
        let b = compute_novelty(&m, &[3], &[1.0]).unwrap();
        for (x, y) in a.values.iter().zip(b.values.iter()) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_mismatched_weights_rejected() {
        let m = block_matrix(8, 4, 1);
        assert!(matches!(
            compute_novelty(&m, &[2, 3], &[1.0]),
            Err(AnalysisError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_kernels_cached() {
        let m = block_matrix(20, 10, 1);
        let mut cache = SimilarityCache::new(8);
        let mut ctx = RunContext::new().with_cache(&mut cache);
        let first = compute_novelty_with(&m, &[2, 4], &[0.5, 0.5], &mut ctx).unwrap();
        let second = compute_novelty_with(&m, &[2, 4], &[0.5, 0.5], &mut ctx).unwrap();
        assert_eq!(first, second);
        drop(ctx);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().hits, 2);
    }

    #[test]
    fn test_kernel_half_widths_from_seconds() {
        let m = SimilarityMatrix::identity(100, 2, 0.5, FeatureChannel::Chroma);
        // one index = 1 s
        assert_eq!(kernel_half_widths(&m, &[2.0, 6.0, 120.0]), vec![2, 6, 50]);
    }
}
