//! Cooperative scheduling hooks
//!
//! The heavy loops (matrix construction, novelty convolution, segment merging,
//! Viterbi) call [`RunContext::checkpoint`] at fixed intervals. The caller's
//! [`Checkpoint`] can yield to its own scheduler there, report progress, or ask
//! to abandon the run. Whether checkpoints run has no effect on results.

use std::fmt;

use crate::cache::SimilarityCache;
use crate::error::AnalysisError;

/// Iterations between checkpoint calls inside long loops
pub const CHECKPOINT_INTERVAL: usize = 64;

/// Pipeline stage reported to checkpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Pairwise similarity matrix construction
    Similarity,
    /// Checkerboard novelty convolution
    Novelty,
    /// Adjacent segment merging
    Merge,
    /// Beat-synchronous emission scoring
    Emission,
    /// Viterbi forward/backward passes
    Viterbi,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Similarity => "similarity",
            Stage::Novelty => "novelty",
            Stage::Merge => "merge",
            Stage::Emission => "emission",
            Stage::Viterbi => "viterbi",
        };
        f.write_str(name)
    }
}

/// Decision returned from a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Yield {
    /// Keep going
    Continue,
    /// Abandon the computation; no partial result is returned
    Cancel,
}

/// Caller-supplied scheduling hook
///
/// `progress` is the fraction of the current stage completed, in [0, 1].
pub trait Checkpoint {
    /// Called between units of work
    fn checkpoint(&mut self, stage: Stage, progress: f32) -> Yield;
}

impl<F> Checkpoint for F
where
    F: FnMut(Stage, f32) -> Yield,
{
    fn checkpoint(&mut self, stage: Stage, progress: f32) -> Yield {
        self(stage, progress)
    }
}

/// Per-invocation resources: an optional cache and an optional checkpoint
///
/// Both are borrowed from the caller, who owns them across runs.
#[derive(Default)]
pub struct RunContext<'a> {
    cache: Option<&'a mut SimilarityCache>,
    checkpoint: Option<&'a mut dyn Checkpoint>,
}

impl<'a> RunContext<'a> {
    /// Context with no cache and no checkpoint (plain blocking run)
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a similarity/kernel cache
    pub fn with_cache(mut self, cache: &'a mut SimilarityCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach a checkpoint
    pub fn with_checkpoint(mut self, checkpoint: &'a mut dyn Checkpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Cache, if one is attached and enabled
    pub(crate) fn cache(&mut self) -> Option<&mut SimilarityCache> {
        match self.cache.as_deref_mut() {
            Some(cache) if cache.is_enabled() => Some(cache),
            _ => None,
        }
    }

    /// Run the checkpoint, converting a cancel request into an error
    pub(crate) fn checkpoint(&mut self, stage: Stage, progress: f32) -> Result<(), AnalysisError> {
        if let Some(cp) = self.checkpoint.as_deref_mut() {
            if cp.checkpoint(stage, progress.clamp(0.0, 1.0)) == Yield::Cancel {
                log::debug!("Run cancelled at {} ({:.0}%)", stage, progress * 100.0);
                return Err(AnalysisError::Cancelled(stage));
            }
        }
        Ok(())
    }
}
