//! Analysis result types

use serde::{Deserialize, Serialize};

use crate::analysis::dna::{HarmonicDna, RhythmicDna};
use crate::features::boundaries::BoundaryCandidate;
use crate::features::key::Key;

/// A contiguous time span of the track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds (inclusive)
    pub start_time: f32,
    /// End time in seconds (exclusive)
    pub end_time: f32,
}

impl Segment {
    /// Create a segment
    pub fn new(start_time: f32, end_time: f32) -> Self {
        Self {
            start_time,
            end_time,
        }
    }

    /// Length in seconds
    pub fn duration(&self) -> f32 {
        self.end_time - self.start_time
    }

    /// Whether `time` falls in `[start_time, end_time)`
    pub fn contains(&self, time: f32) -> bool {
        time >= self.start_time && time < self.end_time
    }
}

/// Serialized time range of a section
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start time in seconds
    pub start_time: f32,
    /// End time in seconds
    pub end_time: f32,
}

impl From<Segment> for TimeRange {
    fn from(s: Segment) -> Self {
        Self {
            start_time: s.start_time,
            end_time: s.end_time,
        }
    }
}

impl From<TimeRange> for Segment {
    fn from(r: TimeRange) -> Self {
        Segment::new(r.start_time, r.end_time)
    }
}

/// One section of the structural map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Section span
    pub time_range: TimeRange,
    /// Pitch content summary
    pub harmonic_dna: HarmonicDna,
    /// Energy and pulse summary
    pub rhythmic_dna: RhythmicDna,
}

/// Structural segmentation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralMap {
    /// Sections in time order, covering `[0, duration)` exactly
    pub sections: Vec<Section>,

    /// Boundary candidates picked before merging
    pub boundaries: Vec<BoundaryCandidate>,

    /// Downsample factor actually used for the similarity matrix
    pub downsample_factor: usize,

    /// Track duration in seconds
    pub duration_seconds: f32,
}

impl StructuralMap {
    /// Sections as plain segments
    pub fn segments(&self) -> Vec<Segment> {
        self.sections
            .iter()
            .map(|s| Segment::from(s.time_range))
            .collect()
    }
}

/// One decoded beat
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChordStep {
    /// Index into the beat grid
    pub beat_index: usize,
    /// State index into the chord template bank
    pub chord_id: usize,
    /// Margin-based confidence in [0, 1]
    pub confidence: f32,
    /// True if the chord differs from the previous beat's (always true for beat 0)
    pub is_attack: bool,
}

/// Maximum-likelihood chord sequence over the beat grid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChordPath {
    /// One step per beat, in beat order
    pub steps: Vec<ChordStep>,
}

impl ChordPath {
    /// Number of beats
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True if no beats were decoded
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Decoded state index per beat
    pub fn chord_ids(&self) -> Vec<usize> {
        self.steps.iter().map(|s| s.chord_id).collect()
    }
}

/// Serialized chord event for persistence and the editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordEvent {
    /// Beat time in seconds
    pub timestamp: f32,
    /// Chord label (e.g. "C", "Am", "G7")
    pub chord: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// True on chord changes
    pub is_attack: bool,
    /// 0 root position, 1 first, 2 second, 3 third inversion; absent when the bass is unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inversion: Option<u8>,
}

/// Harmonic decoding result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonicAnalysis {
    /// Key used for the diatonic bonus, if any
    pub key: Option<Key>,
    /// Confidence of an estimated key (1.0 when configured, 0.0 when none)
    pub key_confidence: f32,
    /// Decoded state path
    pub path: ChordPath,
    /// Labelled per-beat events
    pub events: Vec<ChordEvent>,
}

/// Combined output of [`crate::analyze`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    /// Section map
    pub structure: StructuralMap,
    /// Beat-level chords
    pub harmony: HarmonicAnalysis,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_contains_half_open() {
        let s = Segment::new(1.0, 2.0);
        assert!(s.contains(1.0));
        assert!(!s.contains(2.0));
        assert_eq!(s.duration(), 1.0);
    }

    #[test]
    fn test_chord_event_serializes_without_unknown_inversion() {
        let e = ChordEvent {
            timestamp: 0.5,
            chord: "Am".to_string(),
            confidence: 0.75,
            is_attack: true,
            inversion: None,
        };
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(
            json,
            r#"{"timestamp":0.5,"chord":"Am","confidence":0.75,"is_attack":true}"#
        );
    }
}
