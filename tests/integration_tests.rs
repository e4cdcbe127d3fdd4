//! Integration tests over synthetic feature sequences

use stratum_structure::features::chords::templates::{ChordQuality, ChordTemplate, ChordVocabulary};
use stratum_structure::features::chords::viterbi::TransitionWeighting;
use stratum_structure::features::chords::{score_beats, ChordTemplateBank, EmissionOptions};
use stratum_structure::features::similarity::{FeatureChannel, SimilarityEngine};
use stratum_structure::{
    analyze, analyze_structure, analyze_structure_with, analyze_with, decode_chords,
    AnalysisConfig, AnalysisError, BeatGrid, FeatureSequence, Frame, HarmonyConfig, Key,
    LinearAnalysis, RunContext, SegmentationConfig, SimilarityCache, Stage, Yield,
};

const HOP: f32 = 0.1;

/// Pitch classes of a triad chroma vector
fn triad(pcs: [usize; 3]) -> [f32; 12] {
    let mut c = [0.0f32; 12];
    for p in pcs {
        c[p] = 1.0;
    }
    c
}

/// One chroma vector per `section_len` seconds, uniform beats every 0.5 s
fn song(sections: &[[f32; 12]], section_len: f32) -> FeatureSequence {
    let duration = section_len * sections.len() as f32;
    let n = (duration / HOP).round() as usize;
    let per_section = (section_len / HOP).round() as usize;
    let frames: Vec<Frame> = (0..n)
        .map(|i| Frame::from_chroma(i as f32 * HOP, sections[i / per_section]))
        .collect();
    let beats: Vec<f32> = (0..(duration * 2.0) as usize).map(|b| b as f32 * 0.5).collect();
    let downbeats: Vec<f32> = beats.iter().copied().step_by(4).collect();
    let grid = BeatGrid {
        tempo_bpm: 120.0,
        beats,
        downbeats,
    };
    FeatureSequence::new(frames, grid, duration).unwrap()
}

/// C major, D major, C major; 20 s each
fn aba_song() -> FeatureSequence {
    let c = triad([0, 4, 7]);
    let d = triad([2, 6, 9]);
    song(&[c, d, c], 20.0)
}

fn assert_covers(segments: &[stratum_structure::Segment], duration: f32) {
    assert!(!segments.is_empty());
    assert_eq!(segments[0].start_time, 0.0);
    assert_eq!(segments[segments.len() - 1].end_time, duration);
    for w in segments.windows(2) {
        assert_eq!(w[0].end_time, w[1].start_time);
        assert!(w[0].start_time < w[0].end_time);
    }
}

#[test]
fn test_structure_finds_sections() {
    let seq = aba_song();
    let map = analyze_structure(&seq, &SegmentationConfig::default()).unwrap();

    assert_covers(&map.segments(), 60.0);
    assert_eq!(map.sections.len(), 3);
    assert!((map.sections[1].time_range.start_time - 20.0).abs() < 0.5);
    assert!((map.sections[2].time_range.start_time - 40.0).abs() < 0.5);

    assert_eq!(map.sections[0].harmonic_dna.dominant_pitch_class, Some(0));
    assert_eq!(map.sections[1].harmonic_dna.dominant_pitch_class, Some(2));
    assert!(map.sections[0].harmonic_dna.chords.is_empty());
    assert!((map.sections[1].rhythmic_dna.local_tempo_bpm - 120.0).abs() < 1e-2);
}

#[test]
fn test_full_analysis_labels_sections() {
    let seq = aba_song();
    let output = analyze(&seq, &AnalysisConfig::default()).unwrap();

    let events = &output.harmony.events;
    assert_eq!(events.len(), 120);
    for e in events {
        let expected = if e.timestamp < 19.9 || e.timestamp >= 40.1 {
            "C"
        } else if e.timestamp >= 20.1 && e.timestamp < 39.9 {
            "D"
        } else {
            continue;
        };
        assert_eq!(e.chord, expected, "beat at {:.1}s", e.timestamp);
    }

    let sections = &output.structure.sections;
    assert_eq!(sections.len(), 3);
    assert!(sections[0].harmonic_dna.chords.contains(&"C".to_string()));
    assert!(sections[1].harmonic_dna.chords.contains(&"D".to_string()));
    assert!(sections[2].harmonic_dna.chords.contains(&"C".to_string()));
    assert!(output.harmony.key.is_some());
}

#[test]
fn test_attack_flags_follow_path() {
    let seq = aba_song();
    let harmony = decode_chords(&seq, &HarmonyConfig::default()).unwrap();
    let ids = harmony.path.chord_ids();

    assert!(harmony.path.steps[0].is_attack);
    for i in 1..ids.len() {
        assert_eq!(harmony.path.steps[i].is_attack, ids[i] != ids[i - 1]);
        assert_eq!(harmony.events[i].is_attack, harmony.path.steps[i].is_attack);
    }
    for step in &harmony.path.steps {
        assert!((0.0..=1.0).contains(&step.confidence));
    }
}

#[test]
fn test_emissions_are_distributions() {
    let seq = aba_song();
    let bank = ChordTemplateBank::new(ChordVocabulary::Full);
    let options = EmissionOptions {
        global_key: Some(Key::Major(7)),
        ..EmissionOptions::default()
    };
    let emissions = score_beats(&seq, &bank, &options).unwrap();
    assert_eq!(emissions.len(), 120);
    for e in &emissions {
        let sum: f32 = e.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6, "sum = {}", sum);
        assert!(e.probabilities.iter().all(|p| *p >= 0.0));
    }
}

#[test]
fn test_alternating_c_g_scenario() {
    // 8 beats of 0.5 s; pure C-major template for 4 beats, then G-major
    let c = ChordTemplate::new(0, ChordQuality::Major).weights;
    let g = ChordTemplate::new(7, ChordQuality::Major).weights;
    let frames: Vec<Frame> = (0..80)
        .map(|i| Frame::from_chroma(i as f32 * 0.05, if i < 40 { c } else { g }))
        .collect();
    let grid = BeatGrid {
        tempo_bpm: 120.0,
        beats: (0..8).map(|b| b as f32 * 0.5).collect(),
        downbeats: vec![0.0, 2.0],
    };
    let seq = FeatureSequence::new(frames, grid, 4.0).unwrap();

    let config = HarmonyConfig {
        transition_prob: 0.9,
        global_key: Some(Key::Major(0)),
        ..HarmonyConfig::default()
    };
    let harmony = decode_chords(&seq, &config).unwrap();
    let labels: Vec<&str> = harmony.events.iter().map(|e| e.chord.as_str()).collect();
    assert_eq!(labels, vec!["C", "C", "C", "C", "G", "G", "G", "G"]);
    let attacks: Vec<bool> = harmony.events.iter().map(|e| e.is_attack).collect();
    assert_eq!(
        attacks,
        vec![true, false, false, false, true, false, false, false]
    );
}

#[test]
fn test_diatonic_transitions_break_chromatic_tie() {
    // Root-only chords: C, then a chroma with equal F# and G peaks, which
    // score identically; only the transition model can choose between them
    let mut c = [0.0f32; 12];
    c[0] = 1.0;
    let mut split = [0.0f32; 12];
    split[6] = 1.0;
    split[7] = 1.0;
    let seq = song(&[c, split], 8.0);

    let uniform = HarmonyConfig {
        vocabulary: ChordVocabulary::RootOnly,
        transition_prob: 0.9,
        diatonic_bonus: 0.0,
        global_key: Some(Key::Major(0)),
        ..HarmonyConfig::default()
    };
    let diatonic = HarmonyConfig {
        transition_weighting: TransitionWeighting::Diatonic,
        ..uniform.clone()
    };

    let plain = decode_chords(&seq, &uniform).unwrap();
    let keyed = decode_chords(&seq, &diatonic).unwrap();
    assert_eq!(keyed.key, Some(Key::Major(0)));
    assert_eq!(keyed.key_confidence, 1.0);
    assert_eq!(keyed.events.len(), 32);

    assert!(keyed.events[..16].iter().all(|e| e.chord == "C"));
    assert!(plain.events[..16].iter().all(|e| e.chord == "C"));
    // Lowest index wins the tie without key context
    assert!(plain.events[16..].iter().all(|e| e.chord == "F#"));
    // Diatonic G is preferred once transitions favor the key
    assert!(keyed.events[16..].iter().all(|e| e.chord == "G"));
    assert!(keyed.events[16].is_attack);
    assert!(keyed.events.iter().all(|e| (0.0..=1.0).contains(&e.confidence)));
}

#[test]
fn test_deterministic_output() {
    let seq = aba_song();
    let config = AnalysisConfig::default();
    let a = serde_json::to_string(&analyze(&seq, &config).unwrap()).unwrap();
    let b = serde_json::to_string(&analyze(&seq, &config).unwrap()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_checkpoints_do_not_change_results() {
    let seq = aba_song();
    let config = AnalysisConfig::default();
    let plain = analyze(&seq, &config).unwrap();

    let mut calls = 0usize;
    let mut stages = Vec::new();
    let mut hook = |stage: Stage, _p: f32| {
        calls += 1;
        if !stages.contains(&stage) {
            stages.push(stage);
        }
        Yield::Continue
    };
    let hooked = analyze_with(&seq, &config, &mut RunContext::new().with_checkpoint(&mut hook)).unwrap();

    assert_eq!(plain, hooked);
    assert!(calls > 0);
    for stage in [
        Stage::Similarity,
        Stage::Novelty,
        Stage::Merge,
        Stage::Emission,
        Stage::Viterbi,
    ] {
        assert!(stages.contains(&stage), "no checkpoint at {}", stage);
    }
}

#[test]
fn test_cancel_returns_no_result() {
    let seq = aba_song();
    let config = AnalysisConfig::default();

    let mut cancel_viterbi = |stage: Stage, _p: f32| {
        if stage == Stage::Viterbi {
            Yield::Cancel
        } else {
            Yield::Continue
        }
    };
    let result = analyze_with(
        &seq,
        &config,
        &mut RunContext::new().with_checkpoint(&mut cancel_viterbi),
    );
    assert_eq!(result, Err(AnalysisError::Cancelled(Stage::Viterbi)));

    let mut cancel_now = |_: Stage, _: f32| Yield::Cancel;
    let result = analyze_with(
        &seq,
        &config,
        &mut RunContext::new().with_checkpoint(&mut cancel_now),
    );
    assert_eq!(result, Err(AnalysisError::Cancelled(Stage::Similarity)));
}

#[test]
fn test_cache_reuse_is_transparent() {
    let seq = aba_song();
    let config = SegmentationConfig::default();
    let mut cache = SimilarityCache::new(8);

    let first = analyze_structure_with(&seq, &config, &mut RunContext::new().with_cache(&mut cache)).unwrap();
    let second = analyze_structure_with(&seq, &config, &mut RunContext::new().with_cache(&mut cache)).unwrap();
    assert_eq!(first, second);
    assert!(cache.stats().hits > 0);

    let mut disabled = SimilarityCache::disabled();
    let third = analyze_structure_with(&seq, &config, &mut RunContext::new().with_cache(&mut disabled)).unwrap();
    assert_eq!(first, third);
    assert!(disabled.is_empty());
}

#[test]
fn test_merge_threshold_monotone() {
    // Neighboring sections of decreasing similarity
    let sections = [
        triad([0, 4, 7]),
        triad([0, 4, 9]),
        triad([0, 5, 9]),
        triad([2, 5, 9]),
        triad([2, 6, 11]),
    ];
    let seq = song(&sections, 12.0);
    let mut last = 0usize;
    for threshold in [0.2, 0.4, 0.6, 0.8, 0.92, 0.99] {
        let config = SegmentationConfig {
            merge_chroma_threshold: threshold,
            min_sections_stop: 1,
            ..SegmentationConfig::default()
        };
        let map = analyze_structure(&seq, &config).unwrap();
        assert_covers(&map.segments(), 60.0);
        let n = map.sections.len();
        assert!(n >= last, "threshold {} gave {} sections after {}", threshold, n, last);
        last = n;
    }
}

#[test]
fn test_constant_track_is_one_section() {
    let seq = song(&[triad([0, 4, 7])], 30.0);
    let map = analyze_structure(&seq, &SegmentationConfig::default()).unwrap();
    assert!(map.boundaries.is_empty());
    assert_eq!(map.sections.len(), 1);
    assert_covers(&map.segments(), 30.0);
}

#[test]
fn test_downsample_raised_to_budget() {
    let seq = aba_song();
    let config = SegmentationConfig {
        max_matrix_frames: 200,
        ..SegmentationConfig::default()
    };
    let map = analyze_structure(&seq, &config).unwrap();
    assert_eq!(map.downsample_factor, 3);
    assert_covers(&map.segments(), 60.0);
    assert_eq!(map.sections.len(), 3);

    let raw = SimilarityEngine::new(200).build(
        seq.frames(),
        FeatureChannel::Chroma,
        1,
        &mut RunContext::new(),
    );
    assert_eq!(
        raw.err(),
        Some(AnalysisError::ResourceExceeded {
            frames: 600,
            budget: 200
        })
    );
}

#[test]
fn test_missing_beats() {
    let frames: Vec<Frame> = (0..100)
        .map(|i| Frame::from_chroma(i as f32 * HOP, triad([0, 4, 7])))
        .collect();
    let seq = FeatureSequence::new(frames, BeatGrid::default(), 10.0).unwrap();

    assert!(analyze_structure(&seq, &SegmentationConfig::default()).is_ok());
    assert!(matches!(
        decode_chords(&seq, &HarmonyConfig::default()),
        Err(AnalysisError::InsufficientData(_))
    ));
}

#[test]
fn test_linear_analysis_json() {
    let n = 300;
    let chroma: Vec<Vec<f32>> = (0..n)
        .map(|i| {
            if i < 150 {
                triad([9, 0, 4]).to_vec()
            } else {
                triad([5, 9, 0]).to_vec()
            }
        })
        .collect();
    let mfcc: Vec<Vec<f32>> = (0..n)
        .map(|i| {
            let mut m = vec![0.0f32; 13];
            m[if i < 150 { 1 } else { 2 }] = 1.0;
            m
        })
        .collect();
    let beats: Vec<f32> = (0..60).map(|b| b as f32 * 0.5).collect();
    let mut bass: Vec<Option<u8>> = vec![None; 60];
    bass[0] = Some(0);
    bass[40] = Some(5);

    let json = serde_json::json!({
        "beat_grid": {
            "tempo_bpm": 120.0,
            "beat_timestamps": beats,
            "downbeat_timestamps": [0.0, 2.0, 4.0],
        },
        "chroma_frames": chroma,
        "mfcc_frames": mfcc,
        "bass_pitch_classes": bass,
        "metadata": { "duration_seconds": 30.0 },
    })
    .to_string();

    let linear = LinearAnalysis::from_json(&json).unwrap();
    let seq = FeatureSequence::from_linear(&linear).unwrap();
    assert!(seq.has_mfcc());

    let config = AnalysisConfig::from_json(
        r#"{"segmentation": {"min_section_duration_sec": 4.0}, "harmony": {"global_key": "C"}}"#,
    )
    .unwrap();
    let output = analyze(&seq, &config).unwrap();

    assert_covers(&output.structure.segments(), 30.0);
    assert_eq!(output.structure.sections.len(), 2);
    assert!((output.structure.sections[1].time_range.start_time - 15.0).abs() < 0.5);

    let events = &output.harmony.events;
    assert_eq!(events[0].chord, "Am");
    assert_eq!(events[0].inversion, Some(1));
    assert_eq!(events[1].inversion, None);
    assert_eq!(events[40].chord, "F");
    assert_eq!(events[40].inversion, Some(0));

    let round_trip: serde_json::Value = serde_json::to_value(&output).unwrap();
    assert!(round_trip["structure"]["sections"][0]["time_range"]["start_time"].is_number());
    assert!(round_trip["harmony"]["events"][1].get("inversion").is_none());
}

#[test]
fn test_malformed_linear_analysis_rejected() {
    let json = r#"{
        "chroma_frames": [[1,0,0,0,0,0,0,0,0,0,0,0], [1,0,0]],
        "metadata": {"duration_seconds": 1.0}
    }"#;
    let linear = LinearAnalysis::from_json(json).unwrap();
    assert!(matches!(
        FeatureSequence::from_linear(&linear),
        Err(AnalysisError::InvalidInput(_))
    ));

    assert!(matches!(
        LinearAnalysis::from_json("{not json"),
        Err(AnalysisError::InvalidInput(_))
    ));
}
