//! Self-similarity matrices over feature frames
//!
//! Builds an N×N cosine-similarity matrix over a (block-averaged) feature
//! sequence for one feature channel. Cost is O(N²) in time and memory, so the
//! downsampled frame count is capped by a budget: callers either raise the
//! downsample factor up front ([`required_downsample_factor`]) or receive
//! `ResourceExceeded` and retry.
//!
//! # Reference
//!
//! Foote, J. (2000). Automatic Audio Segmentation Using a Measure of Audio Novelty.
//! *Proceedings of the IEEE International Conference on Multimedia and Expo*.

pub mod matrix;

pub use matrix::SimilarityMatrix;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::CacheKey;
use crate::error::AnalysisError;
use crate::input::Frame;
use crate::numeric::{cosine_similarity, l2_normalize};
use crate::schedule::{RunContext, Stage, CHECKPOINT_INTERVAL};

/// Default maximum downsampled frame count
pub const DEFAULT_MAX_FRAMES: usize = 1500;

/// Feature channel a matrix is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureChannel {
    /// 12-bin chroma, L2-normalized per frame
    Chroma,
    /// 13 MFCCs
    Mfcc,
    /// Weighted blend of other channels
    Combined,
}

/// Downsample factor needed to keep `frame_count` within `budget`
///
/// # Example
///
/// ```
/// use stratum_structure::features::similarity::required_downsample_factor;
///
/// assert_eq!(required_downsample_factor(1000, 1500), 1);
/// assert_eq!(required_downsample_factor(4000, 1500), 3);
/// ```
pub fn required_downsample_factor(frame_count: usize, budget: usize) -> usize {
    if budget == 0 {
        return frame_count.max(1);
    }
    frame_count.div_ceil(budget).max(1)
}

/// Downsampled frame count for a given factor
pub fn downsampled_len(frame_count: usize, downsample_factor: usize) -> usize {
    frame_count.div_ceil(downsample_factor.max(1))
}

/// Similarity matrix builder with a frame budget
#[derive(Debug, Clone, Copy)]
pub struct SimilarityEngine {
    /// Maximum downsampled frame count
    pub max_frames: usize,
}

impl Default for SimilarityEngine {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }
}

impl SimilarityEngine {
    /// Engine with a custom frame budget
    pub fn new(max_frames: usize) -> Self {
        Self { max_frames }
    }

    /// Build (or fetch from the context's cache) the matrix for one channel
    ///
    /// # Errors
    ///
    /// - `InsufficientData` if `frames` is empty
    /// - `InvalidInput` if `downsample_factor` is 0
    /// - `ResourceExceeded` if the downsampled size exceeds `max_frames`
    /// - `Cancelled` if the context's checkpoint cancels
    pub fn build(
        &self,
        frames: &[Frame],
        channel: FeatureChannel,
        downsample_factor: usize,
        ctx: &mut RunContext<'_>,
    ) -> Result<Arc<SimilarityMatrix>, AnalysisError> {
        if frames.is_empty() {
            return Err(AnalysisError::InsufficientData(
                "No frames for similarity matrix".to_string(),
            ));
        }
        if downsample_factor == 0 {
            return Err(AnalysisError::InvalidInput(
                "downsample_factor must be >= 1".to_string(),
            ));
        }
        let n = downsampled_len(frames.len(), downsample_factor);
        if n > self.max_frames {
            return Err(AnalysisError::ResourceExceeded {
                frames: n,
                budget: self.max_frames,
            });
        }

        let key = CacheKey::Similarity {
            range_hash: frame_range_hash(frames, channel),
            frame_count: frames.len(),
            channel,
            downsample_factor,
        };
        if let Some(cache) = ctx.cache() {
            if let Some(matrix) = cache.get_similarity(&key) {
                log::debug!("Similarity cache hit: {:?}, {} frames", channel, n);
                return Ok(matrix);
            }
        }

        let matrix = Arc::new(compute_matrix(frames, channel, downsample_factor, ctx)?);
        if let Some(cache) = ctx.cache() {
            cache.put_similarity(key, Arc::clone(&matrix));
        }
        Ok(matrix)
    }
}

/// Build a similarity matrix with the default frame budget and no cache
///
/// # Example
///
/// ```
/// use stratum_structure::features::similarity::{build_similarity, FeatureChannel};
/// use stratum_structure::input::Frame;
///
/// let mut c = [0.0f32; 12];
/// c[0] = 1.0;
/// let frames: Vec<Frame> = (0..8).map(|i| Frame::from_chroma(i as f32 * 0.1, c)).collect();
/// let m = build_similarity(&frames, FeatureChannel::Chroma, 2)?;
/// assert_eq!(m.size(), 4);
/// assert_eq!(m.get(0, 3), 1.0);
/// # Ok::<(), stratum_structure::AnalysisError>(())
/// ```
pub fn build_similarity(
    frames: &[Frame],
    channel: FeatureChannel,
    downsample_factor: usize,
) -> Result<SimilarityMatrix, AnalysisError> {
    let matrix = SimilarityEngine::default().build(
        frames,
        channel,
        downsample_factor,
        &mut RunContext::new(),
    )?;
    Ok(Arc::try_unwrap(matrix).unwrap_or_else(|shared| (*shared).clone()))
}

/// Block-average features and fill the cosine matrix
fn compute_matrix(
    frames: &[Frame],
    channel: FeatureChannel,
    downsample_factor: usize,
    ctx: &mut RunContext<'_>,
) -> Result<SimilarityMatrix, AnalysisError> {
    let vectors = block_vectors(frames, channel, downsample_factor)?;
    let n = vectors.len();

    log::debug!(
        "Computing {:?} similarity: {} native frames, factor={}, {}x{} matrix",
        channel,
        frames.len(),
        downsample_factor,
        n,
        n
    );

    let mut data = vec![0.0f32; n * n];
    for i in 0..n {
        if i % CHECKPOINT_INTERVAL == 0 {
            ctx.checkpoint(Stage::Similarity, i as f32 / n as f32)?;
        }
        data[i * n + i] = 1.0;
        for j in (i + 1)..n {
            let s = cosine_similarity(&vectors[i], &vectors[j]);
            data[i * n + j] = s;
            data[j * n + i] = s;
        }
    }

    let frame_hop = native_hop(frames);
    Ok(SimilarityMatrix::from_raw(
        n,
        data,
        downsample_factor,
        frames.len(),
        frames[0].timestamp,
        frame_hop,
        channel,
    ))
}

/// One averaged feature vector per block of `downsample_factor` frames
fn block_vectors(
    frames: &[Frame],
    channel: FeatureChannel,
    downsample_factor: usize,
) -> Result<Vec<Vec<f32>>, AnalysisError> {
    let k = downsample_factor.max(1);
    let mut out = Vec::with_capacity(downsampled_len(frames.len(), k));
    for block in frames.chunks(k) {
        let mut acc: Vec<f32> = match channel {
            FeatureChannel::Chroma => vec![0.0; 12],
            FeatureChannel::Mfcc => vec![0.0; 13],
            FeatureChannel::Combined => {
                return Err(AnalysisError::InvalidInput(
                    "Combined matrices are blended, not built from frames".to_string(),
                ))
            }
        };
        for frame in block {
            match channel {
                FeatureChannel::Chroma => {
                    let mut c = frame.chroma;
                    l2_normalize(&mut c);
                    for (a, v) in acc.iter_mut().zip(c.iter()) {
                        *a += v;
                    }
                }
                _ => {
                    for (a, v) in acc.iter_mut().zip(frame.mfcc.iter()) {
                        *a += v;
                    }
                }
            }
        }
        let len = block.len() as f32;
        for a in acc.iter_mut() {
            *a /= len;
        }
        out.push(acc);
    }
    Ok(out)
}

/// Median native frame hop
fn native_hop(frames: &[Frame]) -> f32 {
    if frames.len() < 2 {
        return 1.0;
    }
    let diffs: Vec<f32> = frames
        .windows(2)
        .map(|w| w[1].timestamp - w[0].timestamp)
        .collect();
    crate::numeric::median(&diffs).unwrap_or(1.0)
}

/// Content hash of a frame range for one channel
fn frame_range_hash(frames: &[Frame], channel: FeatureChannel) -> u64 {
    let mut hasher = DefaultHasher::new();
    channel.hash(&mut hasher);
    frames.len().hash(&mut hasher);
    for frame in frames {
        frame.timestamp.to_bits().hash(&mut hasher);
        match channel {
            FeatureChannel::Mfcc => frame.mfcc.iter().for_each(|v| v.to_bits().hash(&mut hasher)),
            _ => frame.chroma.iter().for_each(|v| v.to_bits().hash(&mut hasher)),
        }
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SimilarityCache;

    fn pc(p: usize) -> [f32; 12] {
        let mut c = [0.0f32; 12];
        c[p] = 1.0;
        c
    }

    fn two_part_frames(n: usize) -> Vec<Frame> {
        (0..n)
            .map(|i| {
                let chroma = if i < n / 2 { pc(0) } else { pc(7) };
                Frame::from_chroma(i as f32 * 0.1, chroma)
            })
            .collect()
    }

    #[test]
    fn test_diagonal_and_symmetry() {
        let frames = two_part_frames(10);
        let m = build_similarity(&frames, FeatureChannel::Chroma, 1).unwrap();
        assert_eq!(m.size(), 10);
        for i in 0..10 {
            assert_eq!(m.get(i, i), 1.0);
            for j in 0..10 {
                assert_eq!(m.get(i, j), m.get(j, i));
                assert!((-1.0..=1.0).contains(&m.get(i, j)));
            }
        }
        assert!((m.get(0, 4) - 1.0).abs() < 1e-6);
        assert!(m.get(0, 9).abs() < 1e-6);
    }

    #[test]
    fn test_chroma_loudness_invariant() {
        let mut frames = two_part_frames(4);
        for x in frames[1].chroma.iter_mut() {
            *x *= 50.0;
        }
        let m = build_similarity(&frames, FeatureChannel::Chroma, 1).unwrap();
        assert!((m.get(0, 1) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_block_averaging_size() {
        let frames = two_part_frames(11);
        let m = build_similarity(&frames, FeatureChannel::Chroma, 3).unwrap();
        assert_eq!(m.size(), 4);
        assert_eq!(m.downsample_factor(), 3);
        assert_eq!(m.native_frames(), 11);
    }

    #[test]
    fn test_empty_frames_insufficient() {
        assert!(matches!(
            build_similarity(&[], FeatureChannel::Chroma, 1),
            Err(AnalysisError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_budget_exceeded() {
        let frames = two_part_frames(40);
        let engine = SimilarityEngine::new(10);
        let result = engine.build(&frames, FeatureChannel::Chroma, 1, &mut RunContext::new());
        assert_eq!(
            result.unwrap_err(),
            AnalysisError::ResourceExceeded { frames: 40, budget: 10 }
        );
        let factor = required_downsample_factor(40, 10);
        assert!(engine
            .build(&frames, FeatureChannel::Chroma, factor, &mut RunContext::new())
            .is_ok());
    }

    #[test]
    fn test_cache_hit_returns_same_matrix() {
        let frames = two_part_frames(12);
        let engine = SimilarityEngine::default();
        let mut cache = SimilarityCache::new(4);
        let first = {
            let mut ctx = RunContext::new().with_cache(&mut cache);
            engine.build(&frames, FeatureChannel::Chroma, 2, &mut ctx).unwrap()
        };
        let second = {
            let mut ctx = RunContext::new().with_cache(&mut cache);
            engine.build(&frames, FeatureChannel::Chroma, 2, &mut ctx).unwrap()
        };
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_mfcc_channel() {
        let mut frames = two_part_frames(6);
        for (i, f) in frames.iter_mut().enumerate() {
            f.mfcc[0] = 1.0;
            f.mfcc[1] = if i < 3 { 1.0 } else { -1.0 };
        }
        let m = build_similarity(&frames, FeatureChannel::Mfcc, 1).unwrap();
        assert!((m.get(0, 2) - 1.0).abs() < 1e-6);
        assert!(m.get(0, 5).abs() < 1e-6);
    }
}
