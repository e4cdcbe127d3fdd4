//! Shared numeric helpers
//!
//! Small vector and robust-statistics routines used by both the segmentation
//! and the harmony halves of the engine.

/// Numerical stability epsilon
pub const EPSILON: f32 = 1e-10;

/// Dot product of two equally sized slices (extra elements are ignored)
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum()
}

/// Euclidean norm
#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|&x| x * x).sum::<f32>().sqrt()
}

/// Normalize a vector to unit L2 length in place
///
/// Returns the original norm. Vectors with norm below [`EPSILON`] are left
/// untouched (all zeros stay all zeros).
pub fn l2_normalize(v: &mut [f32]) -> f32 {
    let norm = l2_norm(v);
    if norm > EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    norm
}

/// Cosine similarity in [-1, 1]; zero if either vector has no energy
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let na = l2_norm(a);
    let nb = l2_norm(b);
    if na <= EPSILON || nb <= EPSILON {
        return 0.0;
    }
    (dot(a, b) / (na * nb)).clamp(-1.0, 1.0)
}

/// Median of a slice (mean of the two central values for even lengths)
///
/// Returns `None` for an empty slice.
pub fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) * 0.5)
    } else {
        Some(sorted[mid])
    }
}

/// Median absolute deviation: `median(|x - median(x)|)`
///
/// Returns `(median, mad)`, or `None` for an empty slice.
pub fn median_mad(values: &[f32]) -> Option<(f32, f32)> {
    let med = median(values)?;
    let deviations: Vec<f32> = values.iter().map(|&v| (v - med).abs()).collect();
    let mad = median(&deviations)?;
    Some((med, mad))
}

/// Index of the largest value; ties resolve to the lowest index
///
/// NaN values never win (an all-NaN slice yields index 0). Returns `None`
/// for an empty slice.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
        .or_else(|| (!values.is_empty()).then_some(0))
}

/// Temperature-scaled softmax
///
/// `p_i = exp(s_i / T) / Σ exp(s_j / T)`, computed with max subtraction. Any
/// non-finite score, or a non-positive temperature, yields a uniform distribution.
pub fn softmax(scores: &[f32], temperature: f32) -> Vec<f32> {
    let n = scores.len();
    if n == 0 {
        return Vec::new();
    }
    let uniform = || vec![1.0 / n as f32; n];
    if temperature.is_nan() || temperature <= 0.0 || scores.iter().any(|s| !s.is_finite()) {
        return uniform();
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f64> = scores
        .iter()
        .map(|&s| (((s - max) / temperature) as f64).exp())
        .collect();
    let sum: f64 = exps.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return uniform();
    }
    exps.iter().map(|&e| (e / sum) as f32).collect()
}
