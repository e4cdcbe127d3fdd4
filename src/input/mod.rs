//! Input contract: per-frame features and the beat grid
//!
//! Features are produced upstream by the extraction front-end. This module
//! only validates and reshapes them:
//! - [`LinearAnalysis`]: the JSON record handed over by the extractor
//! - [`FeatureSequence`]: validated frames + beat grid consumed by the engine

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Chroma width (pitch classes)
pub const CHROMA_BINS: usize = 12;

/// MFCC width
pub const MFCC_COEFFS: usize = 13;

/// One analysis frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame time in seconds
    pub timestamp: f32,

    /// Pitch-class energy (C, C#, ..., B)
    pub chroma: [f32; CHROMA_BINS],

    /// Mel-frequency cepstral coefficients
    pub mfcc: [f32; MFCC_COEFFS],

    /// Frame RMS energy
    pub rms: f32,

    /// Spectral flux into this frame
    pub flux: f32,

    /// Bass-register chroma, if the extractor supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bass_chroma: Option<[f32; CHROMA_BINS]>,
}

impl Frame {
    /// Frame with only chroma populated (MFCC zero, unit RMS)
    pub fn from_chroma(timestamp: f32, chroma: [f32; CHROMA_BINS]) -> Self {
        Self {
            timestamp,
            chroma,
            mfcc: [0.0; MFCC_COEFFS],
            rms: 1.0,
            flux: 0.0,
            bass_chroma: None,
        }
    }
}

/// Beat grid produced by the beat tracker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatGrid {
    /// Global tempo estimate
    #[serde(default)]
    pub tempo_bpm: f32,

    /// All beat times in seconds (ascending)
    #[serde(rename = "beat_timestamps", default)]
    pub beats: Vec<f32>,

    /// Downbeat times (beat 1 of each bar) in seconds
    #[serde(rename = "downbeat_timestamps", default)]
    pub downbeats: Vec<f32>,
}

impl BeatGrid {
    /// Median inter-beat interval in seconds
    ///
    /// Falls back to `60 / tempo` when fewer than two beats exist, and to
    /// `None` when the tempo is unknown as well.
    pub fn median_beat_length(&self) -> Option<f32> {
        let intervals: Vec<f32> = self
            .beats
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|d| *d > 0.0)
            .collect();
        if let Some(m) = crate::numeric::median(&intervals) {
            return Some(m);
        }
        if self.tempo_bpm > 0.0 && self.tempo_bpm.is_finite() {
            return Some(60.0 / self.tempo_bpm);
        }
        None
    }
}

/// Scalar metadata of a [`LinearAnalysis`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearMetadata {
    /// Track duration in seconds
    pub duration_seconds: f32,
}

/// Feature record as delivered by the extraction front-end
///
/// Frame arrays are parallel with an implicit uniform hop of
/// `duration_seconds / chroma_frames.len()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearAnalysis {
    /// Beat grid
    #[serde(default)]
    pub beat_grid: BeatGrid,

    /// 12-bin chroma per frame
    pub chroma_frames: Vec<Vec<f32>>,

    /// 13-coefficient MFCC per frame (may be empty)
    #[serde(default)]
    pub mfcc_frames: Vec<Vec<f32>>,

    /// RMS per frame (may be empty)
    #[serde(default)]
    pub rms_frames: Vec<f32>,

    /// Spectral flux per frame (may be empty)
    #[serde(default)]
    pub flux_frames: Vec<f32>,

    /// Bass-register chroma per frame (may be empty)
    #[serde(default)]
    pub bass_chroma_frames: Vec<Vec<f32>>,

    /// Bass pitch class per beat, `null` where unknown (may be empty)
    #[serde(default)]
    pub bass_pitch_classes: Vec<Option<u8>>,

    /// Scalar metadata
    pub metadata: LinearMetadata,
}

impl LinearAnalysis {
    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Validated feature sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSequence {
    frames: Vec<Frame>,
    beat_grid: BeatGrid,
    duration_seconds: f32,
    frame_hop_seconds: f32,
    has_mfcc: bool,
    bass_pitch_classes: Vec<Option<u8>>,
}

impl FeatureSequence {
    /// Build from frames, validating ordering and values
    ///
    /// # Errors
    ///
    /// - `InsufficientData` if `frames` is empty or `duration_seconds` is not positive
    /// - `InvalidInput` for non-finite values or non-increasing timestamps
    pub fn new(
        frames: Vec<Frame>,
        beat_grid: BeatGrid,
        duration_seconds: f32,
    ) -> Result<Self, AnalysisError> {
        if frames.is_empty() {
            return Err(AnalysisError::InsufficientData("No feature frames".to_string()));
        }
        if !(duration_seconds.is_finite() && duration_seconds > 0.0) {
            return Err(AnalysisError::InsufficientData(format!(
                "Track duration must be positive, got {}",
                duration_seconds
            )));
        }

        for (i, frame) in frames.iter().enumerate() {
            let finite = frame.timestamp.is_finite()
                && frame.rms.is_finite()
                && frame.flux.is_finite()
                && frame.chroma.iter().all(|v| v.is_finite())
                && frame.mfcc.iter().all(|v| v.is_finite())
                && frame
                    .bass_chroma
                    .map_or(true, |b| b.iter().all(|v| v.is_finite()));
            if !finite {
                return Err(AnalysisError::InvalidInput(format!(
                    "Frame {} contains non-finite values",
                    i
                )));
            }
            if i > 0 && frame.timestamp <= frames[i - 1].timestamp {
                return Err(AnalysisError::InvalidInput(format!(
                    "Frame timestamps must be strictly increasing (frame {} at {:.4}s)",
                    i, frame.timestamp
                )));
            }
        }

        validate_times(&beat_grid.beats, "beat")?;
        validate_times(&beat_grid.downbeats, "downbeat")?;

        let frame_hop_seconds = if frames.len() > 1 {
            let diffs: Vec<f32> = frames.windows(2).map(|w| w[1].timestamp - w[0].timestamp).collect();
            crate::numeric::median(&diffs).unwrap_or(duration_seconds)
        } else {
            duration_seconds
        };
        let has_mfcc = frames.iter().any(|f| f.mfcc.iter().any(|&v| v != 0.0));

        Ok(Self {
            frames,
            beat_grid,
            duration_seconds,
            frame_hop_seconds,
            has_mfcc,
            bass_pitch_classes: Vec::new(),
        })
    }

    /// Build from the extractor's [`LinearAnalysis`] record
    pub fn from_linear(linear: &LinearAnalysis) -> Result<Self, AnalysisError> {
        let n = linear.chroma_frames.len();
        if n == 0 {
            return Err(AnalysisError::InsufficientData("No chroma frames".to_string()));
        }
        let duration = linear.metadata.duration_seconds;
        if !(duration.is_finite() && duration > 0.0) {
            return Err(AnalysisError::InsufficientData(format!(
                "Track duration must be positive, got {}",
                duration
            )));
        }
        check_parallel(linear.mfcc_frames.len(), n, "mfcc_frames")?;
        check_parallel(linear.rms_frames.len(), n, "rms_frames")?;
        check_parallel(linear.flux_frames.len(), n, "flux_frames")?;
        check_parallel(linear.bass_chroma_frames.len(), n, "bass_chroma_frames")?;

        let hop = duration / n as f32;
        let mut frames = Vec::with_capacity(n);
        for i in 0..n {
            let chroma = to_array::<CHROMA_BINS>(&linear.chroma_frames[i], "chroma", i)?;
            let mfcc = match linear.mfcc_frames.get(i) {
                Some(v) => to_array::<MFCC_COEFFS>(v, "mfcc", i)?,
                None => [0.0; MFCC_COEFFS],
            };
            let bass_chroma = match linear.bass_chroma_frames.get(i) {
                Some(v) => Some(to_array::<CHROMA_BINS>(v, "bass chroma", i)?),
                None => None,
            };
            frames.push(Frame {
                timestamp: i as f32 * hop,
                chroma,
                mfcc,
                rms: linear.rms_frames.get(i).copied().unwrap_or(1.0),
                flux: linear.flux_frames.get(i).copied().unwrap_or(0.0),
                bass_chroma,
            });
        }

        log::debug!(
            "Linear analysis: {} frames, hop={:.4}s, {} beats, duration={:.2}s",
            n,
            hop,
            linear.beat_grid.beats.len(),
            duration
        );

        let mut seq = Self::new(frames, linear.beat_grid.clone(), duration)?;
        seq.frame_hop_seconds = hop;
        seq.bass_pitch_classes = linear
            .bass_pitch_classes
            .iter()
            .map(|pc| pc.map(|p| p % 12))
            .collect();
        Ok(seq)
    }

    /// Attach per-beat bass pitch classes (values are taken modulo 12)
    pub fn with_bass_pitch_classes(mut self, bass: Vec<Option<u8>>) -> Self {
        self.bass_pitch_classes = bass.into_iter().map(|pc| pc.map(|p| p % 12)).collect();
        self
    }

    /// Frames in time order
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Beat grid
    pub fn beat_grid(&self) -> &BeatGrid {
        &self.beat_grid
    }

    /// Track duration in seconds
    pub fn duration_seconds(&self) -> f32 {
        self.duration_seconds
    }

    /// Frame hop in seconds
    pub fn frame_hop_seconds(&self) -> f32 {
        self.frame_hop_seconds
    }

    /// Whether any frame carries non-zero MFCCs
    pub fn has_mfcc(&self) -> bool {
        self.has_mfcc
    }

    /// Supplied bass estimate for a beat, if any
    pub fn bass_pitch_class(&self, beat_index: usize) -> Option<u8> {
        self.bass_pitch_classes.get(beat_index).copied().flatten()
    }

    /// Index of the frame nearest to `time` (clamped to the sequence)
    pub fn nearest_frame(&self, time: f32) -> usize {
        let idx = self.frames.partition_point(|f| f.timestamp < time);
        if idx == 0 {
            return 0;
        }
        if idx >= self.frames.len() {
            return self.frames.len() - 1;
        }
        let before = time - self.frames[idx - 1].timestamp;
        let after = self.frames[idx].timestamp - time;
        if before <= after {
            idx - 1
        } else {
            idx
        }
    }

    /// Half-open range of frame indices with `start <= timestamp < end`
    pub fn frame_range(&self, start: f32, end: f32) -> std::ops::Range<usize> {
        let lo = self.frames.partition_point(|f| f.timestamp < start);
        let hi = self.frames.partition_point(|f| f.timestamp < end);
        lo..hi.max(lo)
    }
}

fn validate_times(times: &[f32], what: &str) -> Result<(), AnalysisError> {
    for (i, t) in times.iter().enumerate() {
        if !t.is_finite() {
            return Err(AnalysisError::InvalidInput(format!(
                "Non-finite {} timestamp at index {}",
                what, i
            )));
        }
        if i > 0 && *t <= times[i - 1] {
            return Err(AnalysisError::InvalidInput(format!(
                "{} timestamps must be strictly increasing (index {})",
                what, i
            )));
        }
    }
    Ok(())
}

fn check_parallel(len: usize, expected: usize, name: &str) -> Result<(), AnalysisError> {
    if len != 0 && len != expected {
        return Err(AnalysisError::InvalidInput(format!(
            "{} has {} entries, expected {} (parallel to chroma_frames)",
            name, len, expected
        )));
    }
    Ok(())
}

fn to_array<const N: usize>(v: &[f32], what: &str, index: usize) -> Result<[f32; N], AnalysisError> {
    if v.len() != N {
        return Err(AnalysisError::InvalidInput(format!(
            "{} vector at index {} has {} elements, expected {}",
            what,
            index,
            v.len(),
            N
        )));
    }
    let mut out = [0.0f32; N];
    out.copy_from_slice(v);
    Ok(out)
}
