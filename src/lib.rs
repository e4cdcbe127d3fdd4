//! # Stratum Structure
//!
//! Structural segmentation and beat-synchronous chord decoding over features
//! that were already extracted from a track (chroma, MFCC, beat grid).
//!
//! ## Features
//!
//! - **Segmentation**: self-similarity matrix, multi-scale checkerboard novelty,
//!   median+MAD boundary picking and similarity-driven segment merging
//! - **Harmony**: chord templates with diatonic and bass biases, temperature
//!   softmax emissions and a Viterbi decoder with margin confidences
//! - **Key**: Krumhansl-Schmuckler estimate when no key is configured
//! - **Calibration**: parallel boundary-accuracy search over parameter sets
//!
//! ## Quick Start
//!
//! ```no_run
//! use stratum_structure::{analyze, AnalysisConfig, FeatureSequence, LinearAnalysis};
//!
//! let json = std::fs::read_to_string("track.linear.json").unwrap();
//! let linear = LinearAnalysis::from_json(&json)?;
//! let seq = FeatureSequence::from_linear(&linear)?;
//!
//! let output = analyze(&seq, &AnalysisConfig::default())?;
//! for section in &output.structure.sections {
//!     println!("{:.1}s - {:.1}s", section.time_range.start_time, section.time_range.end_time);
//! }
//! # Ok::<(), stratum_structure::AnalysisError>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! FeatureSequence → Similarity → Novelty → Boundaries → Merge → StructuralMap
//!                 ↘ Key → Emissions → Viterbi → ChordPath ↗ (section chords)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod cache;
pub mod calibration;
pub mod config;
pub mod error;
pub mod features;
pub mod input;
pub mod numeric;
pub mod schedule;

use std::sync::Arc;

// Re-export main types
pub use analysis::result::{
    AnalysisOutput, ChordEvent, ChordPath, ChordStep, HarmonicAnalysis, Section, Segment,
    StructuralMap, TimeRange,
};
pub use cache::SimilarityCache;
pub use config::{AnalysisConfig, HarmonyConfig, SegmentationConfig};
pub use error::AnalysisError;
pub use features::key::Key;
pub use input::{BeatGrid, FeatureSequence, Frame, LinearAnalysis};
pub use schedule::{Checkpoint, RunContext, Stage, Yield};

use analysis::dna::{harmonic_dna, rhythmic_dna};
use features::boundaries::pick_boundaries;
use features::chords::{
    beat_observations, decode_with, score_observations, ChordTemplateBank, EmissionOptions,
    TransitionModel, TransitionWeighting,
};
use features::key::{estimate_key, KeyTemplates};
use features::novelty::{compute_novelty_with, kernel_half_widths};
use features::segments::{merge_segments_with, MergeParams};
use features::similarity::{
    required_downsample_factor, FeatureChannel, SimilarityEngine, SimilarityMatrix,
};

/// Full analysis: section map plus beat-level chords
///
/// Sections carry the chord labels decoded inside them. A cache sized by
/// `config.cache_entries` lives for the duration of the call.
///
/// # Arguments
///
/// * `seq` - Validated feature sequence
/// * `config` - Segmentation and harmony parameters
///
/// # Errors
///
/// - `InvalidInput` if the configuration is out of range
/// - `InsufficientData` if the sequence has no beats to decode
pub fn analyze(seq: &FeatureSequence, config: &AnalysisConfig) -> Result<AnalysisOutput, AnalysisError> {
    let mut cache = SimilarityCache::new(config.cache_entries);
    analyze_with(seq, config, &mut RunContext::new().with_cache(&mut cache))
}

/// Full analysis with a caller-owned cache and checkpoint
pub fn analyze_with(
    seq: &FeatureSequence,
    config: &AnalysisConfig,
    ctx: &mut RunContext<'_>,
) -> Result<AnalysisOutput, AnalysisError> {
    config.validate()?;
    let mut structure = analyze_structure_with(seq, &config.segmentation, ctx)?;
    let harmony = decode_chords_with(seq, &config.harmony, ctx)?;

    for section in &mut structure.sections {
        let span = Segment::from(section.time_range);
        section.harmonic_dna = harmonic_dna(seq, &span, &harmony.events);
    }
    Ok(AnalysisOutput { structure, harmony })
}

/// Segment a track into sections
///
/// # Example
///
/// ```
/// use stratum_structure::{analyze_structure, BeatGrid, FeatureSequence, Frame, SegmentationConfig};
///
/// let frames: Vec<Frame> = (0..400)
///     .map(|i| {
///         let mut c = [0.0f32; 12];
///         c[if i < 200 { 0 } else { 6 }] = 1.0;
///         Frame::from_chroma(i as f32 * 0.1, c)
///     })
///     .collect();
/// let seq = FeatureSequence::new(frames, BeatGrid::default(), 40.0)?;
/// let map = analyze_structure(&seq, &SegmentationConfig::default())?;
/// assert_eq!(map.sections.len(), 2);
/// assert!((map.sections[0].time_range.end_time - 20.0).abs() < 0.5);
/// # Ok::<(), stratum_structure::AnalysisError>(())
/// ```
pub fn analyze_structure(
    seq: &FeatureSequence,
    config: &SegmentationConfig,
) -> Result<StructuralMap, AnalysisError> {
    analyze_structure_with(seq, config, &mut RunContext::new())
}

/// Segment a track, reusing the context's cache and running its checkpoint
///
/// The downsample factor is raised to fit `max_matrix_frames` when needed.
/// With MFCCs present, novelty runs on the chroma/MFCC blend; merging always
/// compares segments on chroma.
pub fn analyze_structure_with(
    seq: &FeatureSequence,
    config: &SegmentationConfig,
    ctx: &mut RunContext<'_>,
) -> Result<StructuralMap, AnalysisError> {
    config.validate()?;
    let frames = seq.frames();
    let duration = seq.duration_seconds();

    let required = required_downsample_factor(frames.len(), config.max_matrix_frames);
    let factor = config.downsample_factor.max(required);
    if factor > config.downsample_factor {
        log::warn!(
            "Raising downsample factor {} -> {} to keep {} frames within {}",
            config.downsample_factor,
            factor,
            frames.len(),
            config.max_matrix_frames
        );
    }

    log::debug!(
        "Structure analysis: {} frames, {:.1}s, factor={}, mfcc={}",
        frames.len(),
        duration,
        factor,
        seq.has_mfcc()
    );

    let engine = SimilarityEngine::new(config.max_matrix_frames);
    let chroma = engine.build(frames, FeatureChannel::Chroma, factor, ctx)?;
    let novelty_matrix: Arc<SimilarityMatrix> = if seq.has_mfcc() && config.chroma_weight < 1.0 {
        let mfcc = engine.build(frames, FeatureChannel::Mfcc, factor, ctx)?;
        Arc::new(SimilarityMatrix::blend(&chroma, &mfcc, config.chroma_weight)?)
    } else {
        Arc::clone(&chroma)
    };

    let half_widths = kernel_half_widths(&novelty_matrix, &config.kernel_sizes_sec);
    let curve = compute_novelty_with(
        &novelty_matrix,
        &half_widths,
        &config.active_scale_weights(),
        ctx,
    )?;
    let boundaries = pick_boundaries(&curve, config.sensitivity, config.force_over_seg)?;
    let segments = merge_segments_with(
        &boundaries,
        &chroma,
        duration,
        &MergeParams::from(config),
        ctx,
    )?;

    let sections: Vec<Section> = segments
        .iter()
        .map(|seg| Section {
            time_range: TimeRange::from(*seg),
            harmonic_dna: harmonic_dna(seq, seg, &[]),
            rhythmic_dna: rhythmic_dna(seq, seg),
        })
        .collect();

    log::debug!(
        "Structure analysis complete: {} candidates, {} sections",
        boundaries.len(),
        sections.len()
    );

    Ok(StructuralMap {
        sections,
        boundaries,
        downsample_factor: factor,
        duration_seconds: duration,
    })
}

/// Decode one chord per beat
///
/// # Errors
///
/// - `InvalidInput` if the configuration is out of range
/// - `InsufficientData` if the sequence has no beats
pub fn decode_chords(
    seq: &FeatureSequence,
    config: &HarmonyConfig,
) -> Result<HarmonicAnalysis, AnalysisError> {
    decode_chords_with(seq, config, &mut RunContext::new())
}

/// Decode chords, running the context's checkpoint
pub fn decode_chords_with(
    seq: &FeatureSequence,
    config: &HarmonyConfig,
    ctx: &mut RunContext<'_>,
) -> Result<HarmonicAnalysis, AnalysisError> {
    config.validate()?;
    let bank = ChordTemplateBank::new(config.vocabulary);

    let (key, key_confidence) = resolve_key(seq, config);
    let options = EmissionOptions {
        global_key: key,
        ..EmissionOptions::from(config)
    };

    let observations = beat_observations(seq, options.stable_window)?;
    let emissions = score_observations(&observations, &bank, &options, ctx)?;

    let model = match (config.transition_weighting, key) {
        (TransitionWeighting::Diatonic, Some(k)) => {
            TransitionModel::diatonic(config.transition_prob, &bank.diatonic_mask(&k))?
        }
        (TransitionWeighting::Diatonic, None) => {
            log::debug!("No key for diatonic transitions, using uniform");
            TransitionModel::uniform(bank.len(), config.transition_prob)?
        }
        (TransitionWeighting::Uniform, _) => {
            TransitionModel::uniform(bank.len(), config.transition_prob)?
        }
    };
    let path = decode_with(&emissions, &model, ctx)?;

    let events: Vec<ChordEvent> = path
        .steps
        .iter()
        .zip(observations.iter())
        .map(|(step, obs)| ChordEvent {
            timestamp: obs.timestamp,
            chord: bank.label(step.chord_id),
            confidence: step.confidence,
            is_attack: step.is_attack,
            inversion: obs
                .bass_pitch_class
                .and_then(|bass| bank.get(step.chord_id).and_then(|t| t.inversion(bass))),
        })
        .collect();

    let changes = events.iter().filter(|e| e.is_attack).count();
    log::debug!(
        "Chord decoding complete: {} beats, {} changes, key={:?}",
        events.len(),
        changes,
        key.map(|k| k.name())
    );

    Ok(HarmonicAnalysis {
        key,
        key_confidence,
        path,
        events,
    })
}

/// Configured key, else an estimate when enabled, else none
fn resolve_key(seq: &FeatureSequence, config: &HarmonyConfig) -> (Option<Key>, f32) {
    if let Some(key) = config.global_key {
        return (Some(key), 1.0);
    }
    if !config.estimate_key {
        return (None, 0.0);
    }
    match estimate_key(seq.frames(), &KeyTemplates::new()) {
        Ok(estimate) => (Some(estimate.key), estimate.confidence),
        Err(e) => {
            log::warn!("Key estimation failed, decoding without key context: {}", e);
            (None, 0.0)
        }
    }
}
