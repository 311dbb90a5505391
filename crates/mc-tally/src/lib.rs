//! # mc-tally
//!
//! Phase-space binned estimators for Monte Carlo particle transport.
//!
//! Contributions made during one particle history are summed per worker and
//! folded into the permanent moments exactly once at the end of the history.
//! Estimators can be shared by every worker of a `rayon` pool, reduced across
//! a group of processes through [`mc_core::Communicator`] and exported with
//! `mc-store`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod comm;
pub mod entity;
pub mod estimator;
pub mod handler;
pub mod kind;
pub mod moments;
pub mod phase_space;
pub mod reduce;
pub mod response;
pub mod stats;
pub mod tracker;

pub use comm::{LocalCommunicator, LocalGroup, SerialCommunicator};
pub use entity::EntityRecord;
pub use estimator::{ContributionOutcome, Estimator, current_worker_index};
pub use handler::{EventHandler, RunSummary, thread_pool};
pub use kind::{EntityType, EstimatorKind};
pub use moments::{MomentPair, MomentQuad, PairArray, QuadArray, ScratchBuffer};
pub use phase_space::{BinBoundaries, Dimension, PhaseSpaceBinSet, PhaseSpacePoint};
pub use reduce::DistributedReducer;
pub use response::{ResponseFunction, ResponseFunctionSet, ResponseKind};
pub use stats::{ProcessedPair, ProcessedQuad};
pub use tracker::{HistoryMap, ParticleTracker, TrajectorySample};
