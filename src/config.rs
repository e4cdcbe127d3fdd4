//! Configuration parameters for segmentation and chord decoding
//!
//! Every option is a named, typed field with a documented default. The structs
//! deserialize with `deny_unknown_fields`, so a misspelled key in a JSON config
//! is rejected instead of silently ignored.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::features::chords::templates::ChordVocabulary;
use crate::features::chords::viterbi::TransitionWeighting;
use crate::features::key::Key;

/// Relative weights of the three novelty scales
///
/// Normalized to sum to 1 before use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScaleWeights {
    /// Finest kernel (phrase-level changes)
    pub phrase: f32,
    /// Middle kernel (section-level changes)
    pub section: f32,
    /// Coarsest kernel (movement-level changes)
    pub movement: f32,
}

impl ScaleWeights {
    /// Weights as a slice-compatible array, finest first
    pub fn as_array(&self) -> [f32; 3] {
        [self.phrase, self.section, self.movement]
    }
}

impl Default for ScaleWeights {
    fn default() -> Self {
        Self {
            phrase: 0.25,
            section: 0.5,
            movement: 0.25,
        }
    }
}

/// Structural segmentation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SegmentationConfig {
    /// Block size for similarity-matrix construction (default: 1)
    ///
    /// Raised automatically when the track would exceed `max_matrix_frames`.
    pub downsample_factor: usize,

    /// Maximum downsampled frame count for the similarity matrix (default: 1500)
    ///
    /// Memory grows with the square of this value.
    pub max_matrix_frames: usize,

    /// Checkerboard kernel half-widths in seconds, finest first (default: [2, 6, 12])
    pub kernel_sizes_sec: Vec<f32>,

    /// Weights for the three kernel scales (default: 0.25 / 0.5 / 0.25)
    pub scale_weights: ScaleWeights,

    /// Weight of the chroma matrix when blending with MFCC (default: 0.6)
    ///
    /// Ignored when the input carries no MFCCs.
    pub chroma_weight: f32,

    /// MAD multiplier for the boundary threshold (default: 1.5)
    pub sensitivity: f32,

    /// Merge adjacent segments at or above this mean chroma similarity (default: 0.92)
    pub merge_chroma_threshold: f32,

    /// Merge threshold used instead when `force_over_seg` is set (default: 0.985)
    pub exact_chroma_threshold: f32,

    /// Segments shorter than this are absorbed into a neighbor (default: 8.0 s)
    pub min_section_duration_sec: f32,

    /// Never merge below this many segments (default: 2)
    pub min_sections_stop: usize,

    /// Bias toward more, shorter segments for manual editing (default: false)
    pub force_over_seg: bool,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            downsample_factor: 1,
            max_matrix_frames: 1500,
            kernel_sizes_sec: vec![2.0, 6.0, 12.0],
            scale_weights: ScaleWeights::default(),
            chroma_weight: 0.6,
            sensitivity: 1.5,
            merge_chroma_threshold: 0.92,
            exact_chroma_threshold: 0.985,
            min_section_duration_sec: 8.0,
            min_sections_stop: 2,
            force_over_seg: false,
        }
    }
}

impl SegmentationConfig {
    /// Check ranges
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.downsample_factor == 0 {
            return Err(invalid("downsample_factor must be >= 1"));
        }
        if self.max_matrix_frames < 3 {
            return Err(invalid("max_matrix_frames must be >= 3"));
        }
        if self.kernel_sizes_sec.is_empty() || self.kernel_sizes_sec.len() > 3 {
            return Err(invalid("kernel_sizes_sec must hold 1 to 3 sizes"));
        }
        if self.kernel_sizes_sec.iter().any(|k| !(k.is_finite() && *k > 0.0)) {
            return Err(invalid("kernel_sizes_sec must be positive"));
        }
        if self.scale_weights.as_array().iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
            return Err(invalid("scale_weights must be non-negative"));
        }
        if !(0.0..=1.0).contains(&self.chroma_weight) {
            return Err(invalid("chroma_weight must be in [0, 1]"));
        }
        if !(self.sensitivity.is_finite() && self.sensitivity >= 0.0) {
            return Err(invalid("sensitivity must be non-negative"));
        }
        for (name, t) in [
            ("merge_chroma_threshold", self.merge_chroma_threshold),
            ("exact_chroma_threshold", self.exact_chroma_threshold),
        ] {
            if !t.is_finite() || !(-1.0..=1.5).contains(&t) {
                return Err(invalid(&format!("{} must be in [-1, 1.5], got {}", name, t)));
            }
        }
        if !(self.min_section_duration_sec.is_finite() && self.min_section_duration_sec >= 0.0) {
            return Err(invalid("min_section_duration_sec must be non-negative"));
        }
        Ok(())
    }

    /// Scale weights matched to the configured kernel count
    pub fn active_scale_weights(&self) -> Vec<f32> {
        let all = self.scale_weights.as_array();
        match self.kernel_sizes_sec.len() {
            1 => vec![1.0],
            2 => vec![all[0], all[1]],
            _ => all.to_vec(),
        }
    }
}

/// Harmonic decoding parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarmonyConfig {
    /// Chord states to decode over (default: Full)
    pub vocabulary: ChordVocabulary,

    /// Viterbi stay-probability (default: 0.8)
    pub transition_prob: f32,

    /// How off-diagonal transition mass is spread (default: Uniform)
    pub transition_weighting: TransitionWeighting,

    /// Score bonus for chords diatonic to the global key (default: 0.05)
    pub diatonic_bonus: f32,

    /// Score bonus for chords rooted on the bass pitch class (default: 0.08)
    pub root_peak_bias: f32,

    /// Softmax temperature for emissions (default: 0.1)
    ///
    /// Lower values sharpen the distribution.
    pub temperature: f32,

    /// Key context for the diatonic bonus (default: none)
    pub global_key: Option<Key>,

    /// Estimate the key from chroma when `global_key` is unset (default: true)
    pub estimate_key: bool,

    /// Stable interior of each beat as fractions of its length (default: 0.3..0.8)
    pub stable_window: (f32, f32),
}

impl Default for HarmonyConfig {
    fn default() -> Self {
        Self {
            vocabulary: ChordVocabulary::Full,
            transition_prob: 0.8,
            transition_weighting: TransitionWeighting::Uniform,
            diatonic_bonus: 0.05,
            root_peak_bias: 0.08,
            temperature: 0.1,
            global_key: None,
            estimate_key: true,
            stable_window: (0.3, 0.8),
        }
    }
}

impl HarmonyConfig {
    /// Check ranges
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(self.transition_prob > 0.0 && self.transition_prob < 1.0) {
            return Err(invalid(&format!(
                "transition_prob must be in (0, 1), got {}",
                self.transition_prob
            )));
        }
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(invalid(&format!(
                "temperature must be positive, got {}",
                self.temperature
            )));
        }
        if !self.diatonic_bonus.is_finite() || !self.root_peak_bias.is_finite() {
            return Err(invalid("diatonic_bonus and root_peak_bias must be finite"));
        }
        let (lo, hi) = self.stable_window;
        if !(0.0..1.0).contains(&lo) || !(lo < hi && hi <= 1.0) {
            return Err(invalid(&format!(
                "stable_window must satisfy 0 <= start < end <= 1, got ({}, {})",
                lo, hi
            )));
        }
        Ok(())
    }
}

/// Full engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Structural segmentation
    pub segmentation: SegmentationConfig,

    /// Harmonic decoding
    pub harmony: HarmonyConfig,

    /// Maximum cached matrices/kernels per engine session (default: 16, 0 disables)
    pub cache_entries: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            segmentation: SegmentationConfig::default(),
            harmony: HarmonyConfig::default(),
            cache_entries: crate::cache::DEFAULT_CACHE_ENTRIES,
        }
    }
}

impl AnalysisConfig {
    /// Parse from JSON; unknown keys are an error
    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check both halves
    pub fn validate(&self) -> Result<(), AnalysisError> {
        self.segmentation.validate()?;
        self.harmony.validate()
    }
}

fn invalid(msg: &str) -> AnalysisError {
    AnalysisError::InvalidInput(msg.to_string())
}
