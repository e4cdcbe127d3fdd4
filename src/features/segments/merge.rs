//! Adjacent-segment merging
//!
//! Two phases, both deterministic:
//!
//! 1. **Duration floor**: while some segment is shorter than the minimum
//!    duration, absorb the shortest one (earliest on ties) into whichever
//!    neighbor it is more similar to (the following one on ties).
//! 2. **Similarity**: while the most similar adjacent pair (later pair on ties)
//!    reaches the merge threshold, merge it.
//!
//! Neither phase stops below the minimum segment count. The pair chosen at
//! each step of phase 2 does not depend on the threshold, so raising the
//! threshold can only stop the loop earlier.
//!
//! Inter-segment similarity is the mean of the similarity-matrix block
//! spanned by the two segments, read in O(1) from a summed-area table.

use std::ops::Range;

use crate::analysis::result::Segment;
use crate::config::SegmentationConfig;
use crate::error::AnalysisError;
use crate::features::boundaries::BoundaryCandidate;
use crate::features::similarity::SimilarityMatrix;
use crate::schedule::{RunContext, Stage};

use super::{check_coverage, raw_segments};

/// Merge-loop parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeParams {
    /// Segments shorter than this are absorbed into a neighbor
    pub min_duration_sec: f32,
    /// Adjacent pairs at or above this similarity are merged
    pub merge_threshold: f32,
    /// Threshold used instead when over-segmentation was requested
    pub exact_threshold: f32,
    /// Never merge below this count (treated as at least 1)
    pub min_segment_count: usize,
    /// Whether boundaries were picked in over-segmentation mode
    pub force_over_seg: bool,
}

impl MergeParams {
    /// Similarity threshold in effect
    pub fn active_threshold(&self) -> f32 {
        if self.force_over_seg {
            self.exact_threshold
        } else {
            self.merge_threshold
        }
    }
}

impl From<&SegmentationConfig> for MergeParams {
    fn from(config: &SegmentationConfig) -> Self {
        Self {
            min_duration_sec: config.min_section_duration_sec,
            merge_threshold: config.merge_chroma_threshold,
            exact_threshold: config.exact_chroma_threshold,
            min_segment_count: config.min_sections_stop,
            force_over_seg: config.force_over_seg,
        }
    }
}

/// Merge segments without a checkpoint
///
/// # Arguments
///
/// * `boundaries` - Boundary candidates (any order)
/// * `matrix` - Similarity matrix used to compare segments
/// * `duration` - Track duration in seconds
/// * `params` - Merge parameters
///
/// # Returns
///
/// Segments covering `[0, duration)` exactly, in time order
///
/// # Errors
///
/// - `InsufficientData` if `duration` is not positive or the matrix is empty
/// - `ProcessingError` if the result does not cover the track exactly
pub fn merge_segments(
    boundaries: &[BoundaryCandidate],
    matrix: &SimilarityMatrix,
    duration: f32,
    params: &MergeParams,
) -> Result<Vec<Segment>, AnalysisError> {
    merge_segments_with(boundaries, matrix, duration, params, &mut RunContext::new())
}

/// Merge segments, running the context's checkpoint once per merge
pub fn merge_segments_with(
    boundaries: &[BoundaryCandidate],
    matrix: &SimilarityMatrix,
    duration: f32,
    params: &MergeParams,
    ctx: &mut RunContext<'_>,
) -> Result<Vec<Segment>, AnalysisError> {
    if matrix.size() == 0 {
        return Err(AnalysisError::InsufficientData(
            "Empty similarity matrix".to_string(),
        ));
    }
    let times: Vec<f32> = boundaries.iter().map(|b| b.time).collect();
    let segments = raw_segments(&times, duration)?;
    let sat = SummedAreaTable::new(matrix);

    let mut working: Vec<Working> = segments
        .into_iter()
        .map(|seg| Working {
            range: matrix.index_range(seg.start_time, seg.end_time),
            seg,
        })
        .collect();

    let floor = params.min_segment_count.max(1);
    let threshold = params.active_threshold();
    let initial = working.len();

    log::debug!(
        "Merging {} raw segments: min_duration={:.2}s, threshold={:.3}, floor={}",
        initial,
        params.min_duration_sec,
        threshold,
        floor
    );

    // Phase 1: duration floor
    while working.len() > floor {
        ctx.checkpoint(Stage::Merge, merge_progress(initial, working.len(), floor))?;
        let Some(i) = shortest_below(&working, params.min_duration_sec) else {
            break;
        };
        let into_next = if i == 0 {
            true
        } else if i + 1 == working.len() {
            false
        } else {
            let prev = sat.pair_mean(&working[i - 1].range, &working[i].range);
            let next = sat.pair_mean(&working[i].range, &working[i + 1].range);
            next >= prev
        };
        let left = if into_next { i } else { i - 1 };
        merge_pair(&mut working, left);
    }
    let after_duration = working.len();

    // Phase 2: similarity
    while working.len() > floor {
        ctx.checkpoint(Stage::Merge, merge_progress(initial, working.len(), floor))?;
        let mut best: Option<(usize, f32)> = None;
        for p in 0..working.len() - 1 {
            let s = sat.pair_mean(&working[p].range, &working[p + 1].range);
            match best {
                Some((_, b)) if s < b => {}
                _ => best = Some((p, s)),
            }
        }
        match best {
            Some((p, s)) if s >= threshold => merge_pair(&mut working, p),
            _ => break,
        }
    }

    let result: Vec<Segment> = working.into_iter().map(|w| w.seg).collect();
    check_coverage(&result, duration)?;

    log::debug!(
        "Merge complete: {} -> {} (duration pass) -> {} segments",
        initial,
        after_duration,
        result.len()
    );

    Ok(result)
}

#[derive(Debug, Clone)]
struct Working {
    seg: Segment,
    range: Range<usize>,
}

/// Merge `working[left]` and `working[left + 1]` in place
fn merge_pair(working: &mut Vec<Working>, left: usize) {
    let right = working.remove(left + 1);
    let target = &mut working[left];
    target.seg.end_time = right.seg.end_time;
    target.range = target.range.start.min(right.range.start)..target.range.end.max(right.range.end);
}

/// Index of the shortest segment below `min_duration`; earliest on ties
fn shortest_below(working: &[Working], min_duration: f32) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, w) in working.iter().enumerate() {
        let d = w.seg.duration();
        if d >= min_duration {
            continue;
        }
        match best {
            Some((_, b)) if d >= b => {}
            _ => best = Some((i, d)),
        }
    }
    best.map(|(i, _)| i)
}

fn merge_progress(initial: usize, current: usize, floor: usize) -> f32 {
    let span = initial.saturating_sub(floor);
    if span == 0 {
        return 1.0;
    }
    initial.saturating_sub(current) as f32 / span as f32
}

/// Summed-area table over a similarity matrix
///
/// Accumulates in f64 so block means over long tracks stay exact enough for
/// threshold comparisons.
struct SummedAreaTable {
    stride: usize,
    sums: Vec<f64>,
}

impl SummedAreaTable {
    fn new(matrix: &SimilarityMatrix) -> Self {
        let n = matrix.size();
        let stride = n + 1;
        let mut sums = vec![0.0f64; stride * stride];
        for i in 0..n {
            let mut row_sum = 0.0f64;
            for (j, &v) in matrix.row(i).iter().enumerate() {
                row_sum += v as f64;
                sums[(i + 1) * stride + j + 1] = sums[i * stride + j + 1] + row_sum;
            }
        }
        Self { stride, sums }
    }

    /// Sum over rows `r` and columns `c`
    fn block_sum(&self, r: &Range<usize>, c: &Range<usize>) -> f64 {
        let s = self.stride;
        self.sums[r.end * s + c.end] - self.sums[r.start * s + c.end] - self.sums[r.end * s + c.start]
            + self.sums[r.start * s + c.start]
    }

    /// Mean similarity between the frames of two segments
    fn pair_mean(&self, a: &Range<usize>, b: &Range<usize>) -> f32 {
        let count = a.len() * b.len();
        if count == 0 {
            return 0.0;
        }
        (self.block_sum(a, b) / count as f64) as f32
    }
}
