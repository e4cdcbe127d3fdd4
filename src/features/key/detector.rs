//! Global key estimation
//!
//! Correlates the track's mean chroma against the 24 Krumhansl-Kessler
//! templates (Krumhansl-Schmuckler algorithm) and picks the best match.
//!
//! # Reference
//!
//! Krumhansl, C. L., & Kessler, E. J. (1982). Tracing the Dynamic Changes in Perceived
//! Tonal Organization in a Spatial Representation of Musical Keys. *Psychological Review*,
//! 89(4), 334-368.

use super::{templates::KeyTemplates, Key};
use crate::error::AnalysisError;
use crate::input::Frame;

/// Key estimation result
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEstimate {
    /// Best matching key
    pub key: Key,

    /// Pearson correlation mapped from [-1, 1] to [0, 1]
    pub confidence: f32,

    /// All 24 correlations, majors (C..B) then minors (C..B)
    pub all_scores: Vec<(Key, f32)>,
}

/// Estimate the global key from frame chroma
///
/// Each frame's chroma is sum-normalized before averaging so loud passages do
/// not dominate. Ties resolve to the earliest key in C..B order, majors first.
///
/// # Errors
///
/// Returns `InsufficientData` if there are no frames, and `NumericDegenerate`
/// if the mean chroma has no energy or no variance (correlation undefined).
pub fn estimate_key(frames: &[Frame], templates: &KeyTemplates) -> Result<KeyEstimate, AnalysisError> {
    if frames.is_empty() {
        return Err(AnalysisError::InsufficientData(
            "No frames for key estimation".to_string(),
        ));
    }

    let mut mean = [0.0f32; 12];
    let mut used = 0usize;
    for frame in frames {
        let total: f32 = frame.chroma.iter().map(|v| v.max(0.0)).sum();
        if total <= crate::numeric::EPSILON {
            continue;
        }
        for (m, v) in mean.iter_mut().zip(frame.chroma.iter()) {
            *m += v.max(0.0) / total;
        }
        used += 1;
    }
    if used == 0 {
        return Err(AnalysisError::NumericDegenerate(
            "All frames are silent; key is undefined".to_string(),
        ));
    }
    for m in mean.iter_mut() {
        *m /= used as f32;
    }

    let mut all_scores = Vec::with_capacity(24);
    for tonic in 0..12u32 {
        let r = pearson(&mean, templates.get_major_template(tonic)).ok_or_else(flat_chroma)?;
        all_scores.push((Key::Major(tonic), r));
    }
    for tonic in 0..12u32 {
        let r = pearson(&mean, templates.get_minor_template(tonic)).ok_or_else(flat_chroma)?;
        all_scores.push((Key::Minor(tonic), r));
    }

    let scores: Vec<f32> = all_scores.iter().map(|(_, s)| *s).collect();
    let best = crate::numeric::argmax(&scores).unwrap_or(0);
    let (key, r) = all_scores[best];
    let confidence = ((r + 1.0) / 2.0).clamp(0.0, 1.0);

    log::debug!(
        "Estimated key {} (r={:.4}, confidence={:.3}) from {} frames",
        key,
        r,
        confidence,
        used
    );

    Ok(KeyEstimate {
        key,
        confidence,
        all_scores,
    })
}

fn flat_chroma() -> AnalysisError {
    AnalysisError::NumericDegenerate("Mean chroma is flat; key is undefined".to_string())
}

/// Pearson correlation; `None` when either side has zero variance
fn pearson(a: &[f32; 12], b: &[f32; 12]) -> Option<f32> {
    let ma = a.iter().sum::<f32>() / 12.0;
    let mb = b.iter().sum::<f32>() / 12.0;
    let mut cov = 0.0f32;
    let mut va = 0.0f32;
    let mut vb = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        let dx = x - ma;
        let dy = y - mb;
        cov += dx * dy;
        va += dx * dx;
        vb += dy * dy;
    }
    if va <= 1e-12 || vb <= 1e-12 {
        return None;
    }
    Some(cov / (va.sqrt() * vb.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames_with(chroma: [f32; 12], n: usize) -> Vec<Frame> {
        (0..n).map(|i| Frame::from_chroma(i as f32 * 0.1, chroma)).collect()
    }

    #[test]
    fn test_c_major_scale_detected() {
        // C major scale tones, tonic triad emphasized
        let mut chroma = [0.0f32; 12];
        for (pc, w) in [(0, 1.0), (2, 0.4), (4, 0.8), (5, 0.4), (7, 0.9), (9, 0.4), (11, 0.3)] {
            chroma[pc] = w;
        }
        let est = estimate_key(&frames_with(chroma, 10), &KeyTemplates::new()).unwrap();
        assert_eq!(est.key, Key::Major(0));
        assert!(est.confidence > 0.5);
        assert_eq!(est.all_scores.len(), 24);
    }

    #[test]
    fn test_a_minor_triad_detected() {
        let mut chroma = [0.0f32; 12];
        for (pc, w) in [(9, 1.0), (0, 0.8), (4, 0.8), (11, 0.2), (2, 0.2), (5, 0.2), (8, 0.1)] {
            chroma[pc] = w;
        }
        let est = estimate_key(&frames_with(chroma, 4), &KeyTemplates::new()).unwrap();
        assert_eq!(est.key, Key::Minor(9));
    }

    #[test]
    fn test_silence_is_degenerate() {
        let result = estimate_key(&frames_with([0.0; 12], 4), &KeyTemplates::new());
        assert!(matches!(result, Err(AnalysisError::NumericDegenerate(_))));
    }

    #[test]
    fn test_empty_is_insufficient() {
        assert!(matches!(
            estimate_key(&[], &KeyTemplates::new()),
            Err(AnalysisError::InsufficientData(_))
        ));
    }
}
