//! Harmonic decoding
//!
//! - [`templates`]: chord template bank (root × quality)
//! - [`emission`]: beat-synchronous template correlation and softmax
//! - [`viterbi`]: maximum-likelihood chord path over the beat grid

pub mod emission;
pub mod templates;
pub mod viterbi;

pub use emission::{
    beat_observations, score_beats, score_observations, BeatObservation, EmissionDistribution,
    EmissionOptions,
};
pub use templates::{ChordQuality, ChordTemplate, ChordTemplateBank, ChordVocabulary};
pub use viterbi::{decode, decode_with, TransitionModel, TransitionWeighting};
