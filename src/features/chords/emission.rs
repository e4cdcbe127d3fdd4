//! Beat-synchronous emission scoring
//!
//! For each beat, a representative chroma vector is synthesized from the
//! frames in the beat's stable interior (by default 30%-80% of the beat),
//! skipping the attack transient and the decay that bleeds into the next
//! chord. The vector is correlated against every chord template, biased
//! toward diatonic chords and chords rooted on the bass note, and turned into
//! a probability distribution with a temperature softmax.

use serde::{Deserialize, Serialize};

use crate::config::HarmonyConfig;
use crate::error::AnalysisError;
use crate::features::key::Key;
use crate::input::{FeatureSequence, Frame, CHROMA_BINS};
use crate::numeric::{argmax, dot, l2_normalize, softmax, EPSILON};
use crate::schedule::{RunContext, Stage, CHECKPOINT_INTERVAL};

use super::templates::ChordTemplateBank;

/// Emission scoring options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionOptions {
    /// Added to the score of chords diatonic to `global_key`
    pub diatonic_bonus: f32,
    /// Added to the score of chords rooted on the beat's bass pitch class
    pub root_peak_bias: f32,
    /// Softmax temperature
    pub temperature: f32,
    /// Key context for the diatonic bonus
    pub global_key: Option<Key>,
    /// Stable interior of each beat as fractions of its length
    pub stable_window: (f32, f32),
}

impl Default for EmissionOptions {
    fn default() -> Self {
        Self::from(&HarmonyConfig::default())
    }
}

impl From<&HarmonyConfig> for EmissionOptions {
    fn from(config: &HarmonyConfig) -> Self {
        Self {
            diatonic_bonus: config.diatonic_bonus,
            root_peak_bias: config.root_peak_bias,
            temperature: config.temperature,
            global_key: config.global_key,
            stable_window: config.stable_window,
        }
    }
}

/// Synthesized per-beat observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatObservation {
    /// Index into the beat grid
    pub beat_index: usize,
    /// Beat time in seconds
    pub timestamp: f32,
    /// Representative chroma (not normalized; all zero when nothing was heard)
    pub chroma: [f32; CHROMA_BINS],
    /// Bass pitch class, if known
    pub bass_pitch_class: Option<u8>,
}

/// Probability of each chord state at one beat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionDistribution {
    /// One probability per template bank state; sums to 1
    pub probabilities: Vec<f32>,
}

impl EmissionDistribution {
    /// Uniform distribution over `states` states
    pub fn uniform(states: usize) -> Self {
        Self {
            probabilities: vec![1.0 / states.max(1) as f32; states],
        }
    }

    /// Most probable state (lowest index on ties)
    pub fn best(&self) -> Option<usize> {
        argmax(&self.probabilities)
    }
}

/// Build one observation per beat of the sequence's grid
///
/// # Errors
///
/// - `InsufficientData` if the beat grid is empty
/// - `InvalidInput` if the stable window is not inside [0, 1]
pub fn beat_observations(
    seq: &FeatureSequence,
    stable_window: (f32, f32),
) -> Result<Vec<BeatObservation>, AnalysisError> {
    let beats = &seq.beat_grid().beats;
    if beats.is_empty() {
        return Err(AnalysisError::InsufficientData("No beats to decode".to_string()));
    }
    let (lo, hi) = stable_window;
    if !(0.0..1.0).contains(&lo) || !(lo < hi && hi <= 1.0) {
        return Err(AnalysisError::InvalidInput(format!(
            "Stable window must satisfy 0 <= start < end <= 1, got ({}, {})",
            lo, hi
        )));
    }

    let last_len = seq
        .beat_grid()
        .median_beat_length()
        .or_else(|| {
            let tail = seq.duration_seconds() - beats[beats.len() - 1];
            (tail > 0.0).then_some(tail)
        })
        .unwrap_or_else(|| seq.frame_hop_seconds());

    let observations: Vec<BeatObservation> = beats
        .iter()
        .enumerate()
        .map(|(i, &t)| {
            let end = beats.get(i + 1).copied().unwrap_or(t + last_len);
            let window = (t + lo * (end - t), t + hi * (end - t));
            let frames = seq.frames();
            let chroma = synthesize_chroma(frames, window, |f| Some(&f.chroma)).unwrap_or([0.0; CHROMA_BINS]);
            let bass_pitch_class = seq.bass_pitch_class(i).or_else(|| {
                synthesize_chroma(frames, window, |f| f.bass_chroma.as_ref())
                    .filter(|b| b.iter().sum::<f32>() > EPSILON)
                    .and_then(|b| argmax(&b))
                    .map(|pc| pc as u8)
            });
            BeatObservation {
                beat_index: i,
                timestamp: t,
                chroma,
                bass_pitch_class,
            }
        })
        .collect();

    log::debug!(
        "Synthesized {} beat observations (window {:.2}-{:.2}, last beat {:.3}s)",
        observations.len(),
        lo,
        hi,
        last_len
    );

    Ok(observations)
}

/// Gaussian-weighted average of one chroma channel over a time window
///
/// Weights fall off from the window center with σ = width / 4. If no frame
/// lies inside the window the frame nearest its center is used. Frames
/// without the channel are skipped; `None` if no frame has it.
pub fn synthesize_chroma<'a>(
    frames: &'a [Frame],
    window: (f32, f32),
    channel: impl Fn(&'a Frame) -> Option<&'a [f32; CHROMA_BINS]>,
) -> Option<[f32; CHROMA_BINS]> {
    let (start, end) = window;
    let center = 0.5 * (start + end);
    let sigma = ((end - start) / 4.0).max(EPSILON);

    let lo = frames.partition_point(|f| f.timestamp < start);
    let hi = frames.partition_point(|f| f.timestamp < end).max(lo);

    let mut acc = [0.0f32; CHROMA_BINS];
    let mut total = 0.0f32;
    for frame in &frames[lo..hi] {
        if let Some(values) = channel(frame) {
            let d = frame.timestamp - center;
            let w = (-(d * d) / (2.0 * sigma * sigma)).exp();
            for (a, v) in acc.iter_mut().zip(values.iter()) {
                *a += w * v;
            }
            total += w;
        }
    }
    if total > 0.0 {
        for a in acc.iter_mut() {
            *a /= total;
        }
        return Some(acc);
    }

    // Beat shorter than the frame hop: nearest frame carrying the channel
    frames
        .iter()
        .filter_map(|f| channel(f).map(|v| ((f.timestamp - center).abs(), v)))
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, v)| *v)
}

/// Score one observation against every template
pub fn score_observation(
    observation: &BeatObservation,
    bank: &ChordTemplateBank,
    diatonic: Option<&[bool]>,
    options: &EmissionOptions,
) -> EmissionDistribution {
    let mut chroma = observation.chroma;
    if l2_normalize(&mut chroma) <= EPSILON {
        log::warn!(
            "Numeric degenerate: silent chroma at beat {} ({:.3}s), using uniform emission",
            observation.beat_index,
            observation.timestamp
        );
        return EmissionDistribution::uniform(bank.len());
    }

    let scores: Vec<f32> = bank
        .templates()
        .iter()
        .enumerate()
        .map(|(id, template)| {
            let mut score = dot(&template.weights, &chroma);
            if diatonic.is_some_and(|mask| mask[id]) {
                score += options.diatonic_bonus;
            }
            if observation.bass_pitch_class == Some(template.root) {
                score += options.root_peak_bias;
            }
            score
        })
        .collect();

    EmissionDistribution {
        probabilities: softmax(&scores, options.temperature),
    }
}

/// Score precomputed observations
pub fn score_observations(
    observations: &[BeatObservation],
    bank: &ChordTemplateBank,
    options: &EmissionOptions,
    ctx: &mut RunContext<'_>,
) -> Result<Vec<EmissionDistribution>, AnalysisError> {
    if bank.is_empty() {
        return Err(AnalysisError::InvalidInput("Empty chord vocabulary".to_string()));
    }
    let mask = options.global_key.map(|key| bank.diatonic_mask(&key));
    let n = observations.len();
    let mut out = Vec::with_capacity(n);
    for (i, obs) in observations.iter().enumerate() {
        if i % CHECKPOINT_INTERVAL == 0 {
            ctx.checkpoint(Stage::Emission, i as f32 / n as f32)?;
        }
        out.push(score_observation(obs, bank, mask.as_deref(), options));
    }
    log::debug!(
        "Scored {} beats over {} states (T={}, key={:?})",
        n,
        bank.len(),
        options.temperature,
        options.global_key.map(|k| k.name())
    );
    Ok(out)
}

/// Emission distributions for every beat of a feature sequence
///
/// # Errors
///
/// - `InsufficientData` if the sequence has no beats
/// - `InvalidInput` for an empty vocabulary or bad stable window
pub fn score_beats(
    seq: &FeatureSequence,
    bank: &ChordTemplateBank,
    options: &EmissionOptions,
) -> Result<Vec<EmissionDistribution>, AnalysisError> {
    let observations = beat_observations(seq, options.stable_window)?;
    score_observations(&observations, bank, options, &mut RunContext::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::chords::templates::ChordVocabulary;
    use crate::input::BeatGrid;

    fn chord_chroma(pcs: &[usize]) -> [f32; 12] {
        let mut c = [0.0f32; 12];
        for &p in pcs {
            c[p] = 1.0;
        }
        c
    }

    fn sequence(chroma_per_beat: &[[f32; 12]], frames_per_beat: usize) -> FeatureSequence {
        let hop = 0.5 / frames_per_beat as f32;
        let mut frames = Vec::new();
        for (b, chroma) in chroma_per_beat.iter().enumerate() {
            for f in 0..frames_per_beat {
                let t = (b * frames_per_beat + f) as f32 * hop;
                frames.push(Frame::from_chroma(t, *chroma));
            }
        }
        let beats = (0..chroma_per_beat.len()).map(|b| b as f32 * 0.5).collect();
        let grid = BeatGrid {
            tempo_bpm: 120.0,
            beats,
            downbeats: vec![],
        };
        FeatureSequence::new(frames, grid, chroma_per_beat.len() as f32 * 0.5).unwrap()
    }

    #[test]
    fn test_distributions_sum_to_one() {
        let seq = sequence(&[chord_chroma(&[0, 4, 7]), chord_chroma(&[2, 5, 9]), [0.0; 12]], 10);
        let bank = ChordTemplateBank::new(ChordVocabulary::Full);
        let mut options = EmissionOptions::default();
        options.global_key = Some(Key::Major(0));
        let emissions = score_beats(&seq, &bank, &options).unwrap();
        assert_eq!(emissions.len(), 3);
        for e in &emissions {
            let sum: f32 = e.probabilities.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
        assert_eq!(bank.label(emissions[0].best().unwrap()), "C");
        assert_eq!(bank.label(emissions[1].best().unwrap()), "Dm");
        // silent beat is uniform
        assert!(emissions[2].probabilities.iter().all(|&p| (p - 1.0 / 84.0).abs() < 1e-6));
    }

    #[test]
    fn test_stable_window_skips_attack() {
        // Each beat opens with a frame of the previous chord
        let hop = 0.05;
        let mut frames = Vec::new();
        for i in 0..20 {
            let t = i as f32 * hop;
            let chroma = if i < 10 || i == 10 {
                chord_chroma(&[0, 4, 7])
            } else {
                chord_chroma(&[7, 11, 2])
            };
            frames.push(Frame::from_chroma(t, chroma));
        }
        let grid = BeatGrid {
            tempo_bpm: 120.0,
            beats: vec![0.0, 0.5],
            downbeats: vec![],
        };
        let seq = FeatureSequence::new(frames, grid, 1.0).unwrap();
        let obs = beat_observations(&seq, (0.3, 0.8)).unwrap();
        assert_eq!(obs[1].chroma, chord_chroma(&[7, 11, 2]));
    }

    #[test]
    fn test_short_beat_falls_back_to_nearest_frame() {
        let frames = vec![
            Frame::from_chroma(0.0, chord_chroma(&[0])),
            Frame::from_chroma(1.0, chord_chroma(&[7])),
        ];
        let window = (0.9, 0.95);
        let c = synthesize_chroma(&frames, window, |f| Some(&f.chroma)).unwrap();
        assert_eq!(c, chord_chroma(&[7]));
        assert!(synthesize_chroma(&[], window, |f| Some(&f.chroma)).is_none());
    }

    #[test]
    fn test_bass_bias_prefers_rooted_chord() {
        // C-E alone leans to C; an A in the bass tips it to Am
        let mut obs = BeatObservation {
            beat_index: 0,
            timestamp: 0.0,
            chroma: chord_chroma(&[0, 4]),
            bass_pitch_class: None,
        };
        let bank = ChordTemplateBank::new(ChordVocabulary::Triads);
        let options = EmissionOptions {
            root_peak_bias: 0.2,
            ..EmissionOptions::default()
        };
        let without_bass = score_observation(&obs, &bank, None, &options);
        assert_eq!(bank.label(without_bass.best().unwrap()), "C");

        obs.bass_pitch_class = Some(9);
        let with_bass = score_observation(&obs, &bank, None, &options);
        assert_eq!(bank.label(with_bass.best().unwrap()), "Am");
    }

    #[test]
    fn test_supplied_bass_overrides_bass_chroma() {
        let mut seq_frames = Vec::new();
        for i in 0..10 {
            let mut f = Frame::from_chroma(i as f32 * 0.1, chord_chroma(&[0, 4, 7]));
            f.bass_chroma = Some(chord_chroma(&[4]));
            seq_frames.push(f);
        }
        let grid = BeatGrid {
            tempo_bpm: 120.0,
            beats: vec![0.0, 0.5],
            downbeats: vec![],
        };
        let seq = FeatureSequence::new(seq_frames, grid, 1.0)
            .unwrap()
            .with_bass_pitch_classes(vec![Some(0)]);
        let obs = beat_observations(&seq, (0.3, 0.8)).unwrap();
        assert_eq!(obs[0].bass_pitch_class, Some(0));
        assert_eq!(obs[1].bass_pitch_class, Some(4));
    }

    #[test]
    fn test_no_beats_is_insufficient() {
        let seq = FeatureSequence::new(
            vec![Frame::from_chroma(0.0, chord_chroma(&[0]))],
            BeatGrid::default(),
            1.0,
        )
        .unwrap();
        assert!(matches!(
            beat_observations(&seq, (0.3, 0.8)),
            Err(AnalysisError::InsufficientData(_))
        ));
    }
}
