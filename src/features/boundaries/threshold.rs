//! Adaptive thresholding for novelty curves

use crate::error::AnalysisError;
use crate::numeric::median_mad;

/// Compute adaptive threshold using median + MAD (Median Absolute Deviation)
///
/// `threshold = median(values) + k * MAD(values)` where
/// `MAD = median(|values - median(values)|)`. Unlike mean + stddev, a few
/// very tall novelty spikes barely move the threshold.
///
/// # Reference
///
/// McFee, B., & Ellis, D. P. W. (2014). Better Beat Tracking Through Robust Onset Aggregation.
/// *Proceedings of the International Society for Music Information Retrieval Conference*.
///
/// # Arguments
///
/// * `values` - Novelty values
/// * `k` - Multiplier for MAD (the boundary sensitivity)
///
/// # Errors
///
/// Returns `InvalidInput` if values are empty or `k` is negative
pub fn adaptive_threshold_median_mad(values: &[f32], k: f32) -> Result<f32, AnalysisError> {
    if !(k.is_finite() && k >= 0.0) {
        return Err(AnalysisError::InvalidInput(
            "MAD multiplier k must be non-negative".to_string(),
        ));
    }
    let (median, mad) = median_mad(values).ok_or_else(|| {
        AnalysisError::InvalidInput("Empty values for threshold calculation".to_string())
    })?;
    Ok(median + k * mad)
}
