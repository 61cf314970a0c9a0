//! Exact stochastic simulation of chemical reaction networks, with optional
//! fixed delays between the initiation and the completion of a reaction.
//!
//! Two engines share one [`ReactionNetwork`]:
//!
//! - [`EngineKind::DirectMethod`]: Gillespie's direct method, every reaction
//!   applied the instant it fires.
//! - [`EngineKind::DelayRejection`]: delay SSA using the reaction rejection
//!   method. A drawn candidate is rejected whenever a scheduled delayed
//!   completion falls inside its waiting time.
//!
//! Trajectories are sampled at integer checkpoints `0..horizon` into a
//! `[time][species][replicate]` tensor.

mod engine;
mod network;
mod propensity;
mod runner;
mod schedule;

use thiserror::Error;

pub use engine::{EngineKind, UniformSource};
pub use network::{NetworkDescription, Reaction, ReactionNetwork};
pub use propensity::{Propensity, RateFn};
pub use runner::{Ensemble, ReplicateRun, RunConfig, Simulator, Termination, Trajectory};
pub use schedule::{DelaySchedule, ScheduledCompletion};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid model: {0}")]
    InvalidModel(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("reaction {reaction} has degenerate propensity {value} at t = {time}")]
    NumericDegeneracy {
        reaction: usize,
        value: f64,
        time: f64,
    },
    #[error("replicate {replicate} cancelled at t = {time}")]
    Cancelled { replicate: usize, time: f64 },
}
