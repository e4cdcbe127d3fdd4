//! Structure and harmony feature modules
//!
//! Segmentation runs leaf-first:
//! - Similarity matrices (chroma, MFCC, blended)
//! - Multi-scale checkerboard novelty
//! - Boundary picking (median + MAD threshold)
//! - Segment merging
//!
//! Harmony runs on the beat grid:
//! - Key context (profile correlation)
//! - Chord templates, emission scoring, Viterbi decoding

pub mod boundaries;
pub mod chords;
pub mod key;
pub mod novelty;
pub mod segments;
pub mod similarity;
