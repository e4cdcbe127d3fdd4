//! Result types and per-section summaries
//!
//! - Result types (segments, sections, chord paths and events)
//! - Section DNA reductions

pub mod dna;
pub mod result;
