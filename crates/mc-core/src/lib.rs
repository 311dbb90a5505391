//! # mc-core
//!
//! Core types and traits for the mctally Monte Carlo tally subsystem.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atomic;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use atomic::AtomicF64;
pub use config::RunConfig;
pub use error::{Error, Result};
pub use traits::Communicator;
pub use types::{EntityId, ObserverId, ParticleState, ParticleType, RunStatistics};
