//! Per-section feature summaries ("DNA")
//!
//! Simple reductions over the frames and beats inside a section, attached to
//! every section of the structural map for the downstream labelling pass.

use serde::{Deserialize, Serialize};

use crate::analysis::result::{ChordEvent, Segment};
use crate::input::{FeatureSequence, CHROMA_BINS};
use crate::numeric::{argmax, l2_normalize, median, EPSILON};

/// Pitch content of a section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonicDna {
    /// Mean of the per-frame L2-normalized chroma
    pub mean_chroma: [f32; CHROMA_BINS],
    /// Strongest pitch class of `mean_chroma`; `None` for a silent section
    pub dominant_pitch_class: Option<u8>,
    /// Distinct decoded chord labels in order of first appearance
    pub chords: Vec<String>,
}

/// Energy and pulse of a section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RhythmicDna {
    /// Mean frame RMS
    pub mean_rms: f32,
    /// Mean spectral flux
    pub mean_flux: f32,
    /// Beats starting inside the section
    pub beat_count: usize,
    /// Downbeats inside the section
    pub downbeat_count: usize,
    /// 60 / median beat interval inside the section (global tempo if too few beats)
    pub local_tempo_bpm: f32,
}

/// Summarize the pitch content of one section
///
/// Chord events whose beat starts inside the section contribute their labels;
/// pass an empty slice before chords are decoded.
pub fn harmonic_dna(seq: &FeatureSequence, section: &Segment, chords: &[ChordEvent]) -> HarmonicDna {
    let frames = seq.frames();
    let mut range = seq.frame_range(section.start_time, section.end_time);
    if range.is_empty() {
        let nearest = seq.nearest_frame(0.5 * (section.start_time + section.end_time));
        range = nearest..nearest + 1;
    }

    let mut mean = [0.0f32; CHROMA_BINS];
    let count = range.len() as f32;
    for frame in &frames[range] {
        let mut c = frame.chroma;
        l2_normalize(&mut c);
        for (m, v) in mean.iter_mut().zip(c.iter()) {
            *m += v / count;
        }
    }
    let dominant_pitch_class = if mean.iter().sum::<f32>() > EPSILON {
        argmax(&mean).map(|pc| pc as u8)
    } else {
        None
    };

    let mut labels: Vec<String> = Vec::new();
    for event in chords.iter().filter(|e| section.contains(e.timestamp)) {
        if !labels.contains(&event.chord) {
            labels.push(event.chord.clone());
        }
    }

    HarmonicDna {
        mean_chroma: mean,
        dominant_pitch_class,
        chords: labels,
    }
}

/// Summarize energy and beat structure of one section
pub fn rhythmic_dna(seq: &FeatureSequence, section: &Segment) -> RhythmicDna {
    let frames = &seq.frames()[seq.frame_range(section.start_time, section.end_time)];
    let (mean_rms, mean_flux) = if frames.is_empty() {
        (0.0, 0.0)
    } else {
        let n = frames.len() as f32;
        (
            frames.iter().map(|f| f.rms).sum::<f32>() / n,
            frames.iter().map(|f| f.flux).sum::<f32>() / n,
        )
    };

    let grid = seq.beat_grid();
    let beats: Vec<f32> = grid
        .beats
        .iter()
        .copied()
        .filter(|&t| section.contains(t))
        .collect();
    let downbeat_count = grid.downbeats.iter().filter(|&&t| section.contains(t)).count();

    let intervals: Vec<f32> = beats.windows(2).map(|w| w[1] - w[0]).collect();
    let local_tempo_bpm = match median(&intervals) {
        Some(m) if m > EPSILON => 60.0 / m,
        _ => grid.tempo_bpm,
    };

    RhythmicDna {
        mean_rms,
        mean_flux,
        beat_count: beats.len(),
        downbeat_count,
        local_tempo_bpm,
    }
}
