//! Error types for the structure and harmony engine

use std::fmt;

use crate::schedule::Stage;

/// Errors that can occur during segmentation or chord decoding
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Empty or too-short input (no frames, zero duration, no beats)
    ///
    /// Non-recoverable for the call; callers typically skip the track or fall
    /// back to a single-section result.
    InsufficientData(String),

    /// The similarity matrix would exceed the configured frame budget
    ///
    /// Retry with a larger downsample factor.
    ResourceExceeded {
        /// Downsampled frame count that was requested
        frames: usize,
        /// Maximum frame count allowed
        budget: usize,
    },

    /// NaN or all-zero values where a distribution was expected
    ///
    /// The pipeline recovers from this internally; only strict helpers return it.
    NumericDegenerate(String),

    /// Invalid input parameters or malformed feature data
    InvalidInput(String),

    /// The caller's checkpoint asked to abandon the run
    Cancelled(Stage),

    /// Internal contract violation during processing
    ProcessingError(String),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::InsufficientData(msg) => write!(f, "Insufficient data: {}", msg),
            AnalysisError::ResourceExceeded { frames, budget } => write!(
                f,
                "Resource exceeded: similarity matrix of {} frames exceeds budget of {}",
                frames, budget
            ),
            AnalysisError::NumericDegenerate(msg) => write!(f, "Numeric degenerate: {}", msg),
            AnalysisError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AnalysisError::Cancelled(stage) => write!(f, "Cancelled during {}", stage),
            AnalysisError::ProcessingError(msg) => write!(f, "Processing error: {}", msg),
        }
    }
}

impl std::error::Error for AnalysisError {}

impl From<serde_json::Error> for AnalysisError {
    fn from(err: serde_json::Error) -> Self {
        AnalysisError::InvalidInput(format!("Malformed JSON: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let e = AnalysisError::ResourceExceeded {
            frames: 3000,
            budget: 1500,
        };
        assert!(e.to_string().contains("3000"));
        assert!(e.to_string().contains("1500"));

        let e = AnalysisError::Cancelled(Stage::Viterbi);
        assert_eq!(e.to_string(), "Cancelled during viterbi");
    }

    #[test]
    fn test_from_json_error() {
        let err = serde_json::from_str::<Vec<f32>>("[1.0,").unwrap_err();
        let e: AnalysisError = err.into();
        assert!(matches!(e, AnalysisError::InvalidInput(_)));
    }
}
