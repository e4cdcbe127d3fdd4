//! Segment construction and merging
//!
//! Turns boundary times into contiguous segments covering the whole track,
//! then merges adjacent segments that are too short or too similar.

pub mod merge;

pub use merge::{merge_segments, merge_segments_with, MergeParams};

use crate::analysis::result::Segment;
use crate::error::AnalysisError;

/// Minimum segment length kept when building raw segments
///
/// Boundaries closer than this to each other or to the track ends are dropped.
const MIN_RAW_SEGMENT_SEC: f32 = 1e-3;

/// Build contiguous segments from boundary times
///
/// Times outside `(0, duration)` are ignored; the rest are sorted and
/// de-duplicated. The first segment starts at 0 and the last ends at `duration`.
///
/// # Errors
///
/// Returns `InsufficientData` if `duration` is not positive
pub fn raw_segments(boundary_times: &[f32], duration: f32) -> Result<Vec<Segment>, AnalysisError> {
    if !(duration.is_finite() && duration > 0.0) {
        return Err(AnalysisError::InsufficientData(format!(
            "Track duration must be positive, got {}",
            duration
        )));
    }

    let mut times: Vec<f32> = boundary_times
        .iter()
        .copied()
        .filter(|t| t.is_finite() && *t >= MIN_RAW_SEGMENT_SEC && *t <= duration - MIN_RAW_SEGMENT_SEC)
        .collect();
    times.sort_by(|a, b| a.total_cmp(b));

    let mut segments = Vec::with_capacity(times.len() + 1);
    let mut start = 0.0f32;
    for t in times {
        if t - start >= MIN_RAW_SEGMENT_SEC {
            segments.push(Segment::new(start, t));
            start = t;
        }
    }
    segments.push(Segment::new(start, duration));
    Ok(segments)
}

/// Verify that segments are non-empty, contiguous and cover `[0, duration)` exactly
///
/// # Errors
///
/// Returns `ProcessingError` describing the first violation found
pub fn check_coverage(segments: &[Segment], duration: f32) -> Result<(), AnalysisError> {
    let first = segments
        .first()
        .ok_or_else(|| AnalysisError::ProcessingError("No segments produced".to_string()))?;
    if first.start_time != 0.0 {
        return Err(AnalysisError::ProcessingError(format!(
            "First segment starts at {} instead of 0",
            first.start_time
        )));
    }
    for (i, s) in segments.iter().enumerate() {
        if s.start_time >= s.end_time {
            return Err(AnalysisError::ProcessingError(format!(
                "Segment {} is empty or inverted ({} .. {})",
                i, s.start_time, s.end_time
            )));
        }
        if let Some(next) = segments.get(i + 1) {
            if next.start_time != s.end_time {
                return Err(AnalysisError::ProcessingError(format!(
                    "Gap or overlap between segments {} and {} ({} vs {})",
                    i,
                    i + 1,
                    s.end_time,
                    next.start_time
                )));
            }
        }
    }
    let last_end = segments[segments.len() - 1].end_time;
    if last_end != duration {
        return Err(AnalysisError::ProcessingError(format!(
            "Last segment ends at {} instead of {}",
            last_end, duration
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_segments_cover_track() {
        let segs = raw_segments(&[30.0, 10.0, 10.0, -1.0, 0.0, 60.0, 75.0], 60.0).unwrap();
        assert_eq!(
            segs,
            vec![
                Segment::new(0.0, 10.0),
                Segment::new(10.0, 30.0),
                Segment::new(30.0, 60.0)
            ]
        );
        assert!(check_coverage(&segs, 60.0).is_ok());
    }

    #[test]
    fn test_no_boundaries_single_segment() {
        let segs = raw_segments(&[], 12.5).unwrap();
        assert_eq!(segs, vec![Segment::new(0.0, 12.5)]);
    }

    #[test]
    fn test_coverage_violations_detected() {
        let gap = vec![Segment::new(0.0, 1.0), Segment::new(1.5, 3.0)];
        assert!(matches!(
            check_coverage(&gap, 3.0),
            Err(AnalysisError::ProcessingError(_))
        ));
        let short = vec![Segment::new(0.0, 2.0)];
        assert!(check_coverage(&short, 3.0).is_err());
        assert!(check_coverage(&[], 3.0).is_err());
    }

    #[test]
    fn test_zero_duration_rejected() {
        assert!(matches!(
            raw_segments(&[1.0], 0.0),
            Err(AnalysisError::InsufficientData(_))
        ));
    }
}
