//! Dense symmetric similarity matrix

use super::FeatureChannel;
use crate::error::AnalysisError;

/// Square, symmetric similarity matrix over downsampled frame indices
///
/// Index `i` covers native frames `[i * factor, (i + 1) * factor)`. The
/// diagonal is always 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    size: usize,
    data: Vec<f32>,
    downsample_factor: usize,
    native_frames: usize,
    start_time: f32,
    frame_hop_seconds: f32,
    channel: FeatureChannel,
}

impl SimilarityMatrix {
    pub(crate) fn from_raw(
        size: usize,
        data: Vec<f32>,
        downsample_factor: usize,
        native_frames: usize,
        start_time: f32,
        frame_hop_seconds: f32,
        channel: FeatureChannel,
    ) -> Self {
        debug_assert_eq!(data.len(), size * size);
        Self {
            size,
            data,
            downsample_factor: downsample_factor.max(1),
            native_frames,
            start_time,
            frame_hop_seconds,
            channel,
        }
    }

    /// Identity matrix (every index dissimilar to every other)
    pub fn identity(
        size: usize,
        downsample_factor: usize,
        frame_hop_seconds: f32,
        channel: FeatureChannel,
    ) -> Self {
        let mut data = vec![0.0f32; size * size];
        for i in 0..size {
            data[i * size + i] = 1.0;
        }
        Self::from_raw(
            size,
            data,
            downsample_factor,
            size * downsample_factor.max(1),
            0.0,
            frame_hop_seconds,
            channel,
        )
    }

    /// Build from a row-major square array (values clamped to [-1, 1], diagonal set to 1)
    ///
    /// Intended for callers that already hold a similarity measure; symmetry is
    /// enforced by averaging `(i, j)` and `(j, i)`.
    pub fn from_rows(
        rows: &[Vec<f32>],
        downsample_factor: usize,
        frame_hop_seconds: f32,
    ) -> Result<Self, AnalysisError> {
        let n = rows.len();
        if n == 0 {
            return Err(AnalysisError::InsufficientData("Empty matrix".to_string()));
        }
        if rows.iter().any(|r| r.len() != n) {
            return Err(AnalysisError::InvalidInput("Matrix must be square".to_string()));
        }
        let mut data = vec![0.0f32; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
            for j in (i + 1)..n {
                let v = ((rows[i][j] + rows[j][i]) * 0.5).clamp(-1.0, 1.0);
                if !v.is_finite() {
                    return Err(AnalysisError::InvalidInput(format!(
                        "Non-finite similarity at ({}, {})",
                        i, j
                    )));
                }
                data[i * n + j] = v;
                data[j * n + i] = v;
            }
        }
        Ok(Self::from_raw(
            n,
            data,
            downsample_factor,
            n * downsample_factor.max(1),
            0.0,
            frame_hop_seconds,
            FeatureChannel::Combined,
        ))
    }

    /// Weighted blend `w * a + (1 - w) * b` of two matrices with the same geometry
    pub fn blend(a: &Self, b: &Self, weight_a: f32) -> Result<Self, AnalysisError> {
        if a.size != b.size || a.downsample_factor != b.downsample_factor {
            return Err(AnalysisError::InvalidInput(format!(
                "Cannot blend {}x{} (factor {}) with {}x{} (factor {})",
                a.size, a.size, a.downsample_factor, b.size, b.size, b.downsample_factor
            )));
        }
        let w = weight_a.clamp(0.0, 1.0);
        let data = a
            .data
            .iter()
            .zip(b.data.iter())
            .map(|(&x, &y)| (w * x + (1.0 - w) * y).clamp(-1.0, 1.0))
            .collect();
        Ok(Self {
            data,
            channel: FeatureChannel::Combined,
            ..a.clone_geometry()
        })
    }

    fn clone_geometry(&self) -> Self {
        Self {
            size: self.size,
            data: Vec::new(),
            downsample_factor: self.downsample_factor,
            native_frames: self.native_frames,
            start_time: self.start_time,
            frame_hop_seconds: self.frame_hop_seconds,
            channel: self.channel,
        }
    }

    /// Matrix dimension N
    pub fn size(&self) -> usize {
        self.size
    }

    /// Similarity between downsampled indices `i` and `j`
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.data[i * self.size + j]
    }

    /// Row `i`
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.size..(i + 1) * self.size]
    }

    /// Native frames per index
    pub fn downsample_factor(&self) -> usize {
        self.downsample_factor
    }

    /// Native frame count the matrix was built from
    pub fn native_frames(&self) -> usize {
        self.native_frames
    }

    /// Timestamp of the first native frame
    pub fn start_time(&self) -> f32 {
        self.start_time
    }

    /// Native frame hop in seconds
    pub fn frame_hop_seconds(&self) -> f32 {
        self.frame_hop_seconds
    }

    /// Channel the matrix was built from
    pub fn channel(&self) -> FeatureChannel {
        self.channel
    }

    /// Downsampled index containing `time` (clamped to the matrix)
    pub fn index_at(&self, time: f32) -> usize {
        if self.size == 0 {
            return 0;
        }
        let native = if self.frame_hop_seconds > 0.0 {
            ((time - self.start_time) / self.frame_hop_seconds).floor()
        } else {
            0.0
        };
        let native = native.max(0.0) as usize;
        (native / self.downsample_factor).min(self.size - 1)
    }

    /// Half-open index range covering `[start, end)`; never empty
    pub fn index_range(&self, start: f32, end: f32) -> std::ops::Range<usize> {
        let lo = self.index_at(start);
        // `end` is exclusive: step back a hair so a boundary on a block edge
        // does not pull in the next block
        let hi_time = if end > start {
            end - self.frame_hop_seconds * 1e-3
        } else {
            start
        };
        let hi = self.index_at(hi_time).max(lo);
        lo..hi + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_mapping() {
        let m = SimilarityMatrix::identity(10, 2, 0.5, FeatureChannel::Chroma);
        // each index spans 1.0 s
        assert_eq!(m.index_at(0.0), 0);
        assert_eq!(m.index_at(0.99), 0);
        assert_eq!(m.index_at(1.0), 1);
        assert_eq!(m.index_at(100.0), 9);
        assert_eq!(m.index_range(1.0, 3.0), 1..3);
        assert_eq!(m.index_range(1.2, 1.3), 1..2);
    }

    #[test]
    fn test_blend() {
        let a = SimilarityMatrix::from_rows(&[vec![1.0, 1.0], vec![1.0, 1.0]], 1, 0.1).unwrap();
        let b = SimilarityMatrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0]], 1, 0.1).unwrap();
        let c = SimilarityMatrix::blend(&a, &b, 0.25).unwrap();
        assert!((c.get(0, 1) - 0.25).abs() < 1e-6);
        assert_eq!(c.get(1, 1), 1.0);
        assert_eq!(c.channel(), FeatureChannel::Combined);
    }

    #[test]
    fn test_from_rows_rejects_non_square() {
        assert!(SimilarityMatrix::from_rows(&[vec![1.0, 0.0]], 1, 0.1).is_err());
    }
}
