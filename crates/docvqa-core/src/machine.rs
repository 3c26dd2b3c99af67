//! The request state machine: stages, edge table, and loop guard.
//!
//! Every edge is a pure function of the current stage and a closed
//! [`Signal`]. The orchestrator executes a stage, turns its output into a
//! signal, and asks [`Stage::next`] where to go. Loops that classifiers can
//! re-enter indefinitely are bounded by a [`LoopGuard`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decision::{FilterDecision, GroundednessDecision, RetrievalDecision, UsefulnessDecision};

/// A node in the request graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Resolve document text (pass-through, vision extraction, or empty)
    Extract,
    /// Hypothetical-answer expansion plus vector search
    Retrieve,
    /// Binary relevance filter over retrieved provisions
    Filter,
    /// Answer generation with citations
    Generate,
    /// Contradiction detection between document and provisions
    Detect,
    /// Groundedness classification of the answer
    GroundednessGate,
    /// Repackage for the usefulness check
    Finalize,
    /// Usefulness classification of the answer
    UsefulnessGate,
    /// Question reformulation
    Rewrite,
    /// Terminal: relevance streak reached its limit
    NoAnswer,
    /// Terminal: a loop guard limit was breached
    Exhausted,
    /// Terminal: answer accepted
    Done,
}

impl Stage {
    /// Entry stage of every request.
    pub const INITIAL: Stage = Stage::Extract;

    /// Whether no further node runs after this stage.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::NoAnswer | Stage::Exhausted)
    }

    /// Resolve the next stage for a signal emitted by this stage.
    pub fn next(self, signal: Signal) -> Result<Stage, MachineError> {
        use Signal::*;

        let next = match (self, signal) {
            (Stage::Extract, Route(RetrievalDecision::Retrieve)) => Stage::Retrieve,
            (Stage::Extract, Route(RetrievalDecision::GenerateDirect)) => Stage::Generate,
            (Stage::Retrieve, Continue) => Stage::Filter,
            (Stage::Filter, Filter(FilterDecision::Generate)) => Stage::Generate,
            (Stage::Filter, Filter(FilterDecision::Rewrite)) => Stage::Rewrite,
            (Stage::Filter, Filter(FilterDecision::NoAnswer)) => Stage::NoAnswer,
            (Stage::Generate, Continue) => Stage::Detect,
            (Stage::Detect, Continue) => Stage::GroundednessGate,
            (Stage::GroundednessGate, Grounded(GroundednessDecision::Accept)) => Stage::Finalize,
            (Stage::GroundednessGate, Grounded(GroundednessDecision::Regenerate)) => {
                Stage::Generate
            }
            (Stage::Finalize, Continue) => Stage::UsefulnessGate,
            (Stage::UsefulnessGate, Useful(UsefulnessDecision::Finish)) => Stage::Done,
            (Stage::UsefulnessGate, Useful(UsefulnessDecision::Rewrite)) => Stage::Rewrite,
            (Stage::Rewrite, Continue) => Stage::Retrieve,
            (stage, signal) => return Err(MachineError::InvalidTransition { stage, signal }),
        };

        Ok(next)
    }
}

/// What a stage reports to the edge table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Unconditional edge
    Continue,
    Route(RetrievalDecision),
    Filter(FilterDecision),
    Grounded(GroundednessDecision),
    Useful(UsefulnessDecision),
}

/// Errors raised by the state machine itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MachineError {
    #[error("Invalid transition: {signal:?} is not an edge out of {stage:?}")]
    InvalidTransition { stage: Stage, signal: Signal },
}

/// Upper bounds for one traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopLimits {
    /// Total node executions, the entry stage included
    pub max_steps: u32,

    /// Groundedness-driven regenerations
    pub max_regenerations: u32,

    /// Usefulness-driven rewrites
    pub max_usefulness_rewrites: u32,
}

impl LoopLimits {
    /// Fewest steps that still let the relevance streak reach its terminal:
    /// Extract, five (Retrieve, Filter) passes, and four Rewrites.
    pub const MIN_STEPS: u32 = 1 + 5 * 2 + 4;
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_steps: 40,
            max_regenerations: 3,
            max_usefulness_rewrites: 3,
        }
    }
}

/// Which bound was breached.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "limit", rename_all = "snake_case")]
pub enum LimitReached {
    #[error("step limit of {max} reached")]
    Steps { max: u32 },

    #[error("regeneration limit of {max} reached")]
    Regenerations { max: u32 },

    #[error("usefulness rewrite limit of {max} reached")]
    UsefulnessRewrites { max: u32 },

    #[error("token budget of {max} exceeded")]
    TokenBudget { max: u32 },
}

/// Counts loop iterations for one request.
#[derive(Debug, Clone)]
pub struct LoopGuard {
    limits: LoopLimits,
    steps: u32,
    regenerations: u32,
    usefulness_rewrites: u32,
}

impl LoopGuard {
    /// A fresh guard; the entry stage counts as the first step.
    pub fn new(limits: LoopLimits) -> Self {
        Self {
            limits,
            steps: 1,
            regenerations: 0,
            usefulness_rewrites: 0,
        }
    }

    /// Record the edge `from -> to` before `to` executes.
    ///
    /// Edges into terminal stages are always admitted.
    pub fn record(&mut self, from: Stage, to: Stage) -> Result<(), LimitReached> {
        if to.is_terminal() {
            return Ok(());
        }

        match (from, to) {
            (Stage::GroundednessGate, Stage::Generate) => {
                self.regenerations += 1;
                if self.regenerations > self.limits.max_regenerations {
                    return Err(LimitReached::Regenerations {
                        max: self.limits.max_regenerations,
                    });
                }
            }
            (Stage::UsefulnessGate, Stage::Rewrite) => {
                self.usefulness_rewrites += 1;
                if self.usefulness_rewrites > self.limits.max_usefulness_rewrites {
                    return Err(LimitReached::UsefulnessRewrites {
                        max: self.limits.max_usefulness_rewrites,
                    });
                }
            }
            _ => {}
        }

        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(LimitReached::Steps {
                max: self.limits.max_steps,
            });
        }

        Ok(())
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn regenerations(&self) -> u32 {
        self.regenerations
    }

    pub fn usefulness_rewrites(&self) -> u32 {
        self.usefulness_rewrites
    }
}

/// How a traversal ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The usefulness check accepted the answer
    Answered,
    /// No relevant provisions after the streak limit
    NoAnswer,
    /// A loop guard fired
    Exhausted { reason: LimitReached },
}

impl Outcome {
    /// The terminal stage this outcome corresponds to.
    pub fn stage(self) -> Stage {
        match self {
            Outcome::Answered => Stage::Done,
            Outcome::NoAnswer => Stage::NoAnswer,
            Outcome::Exhausted { .. } => Stage::Exhausted,
        }
    }
}
