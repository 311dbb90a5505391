//! The closed set of estimator flavours.
//!
//! Every flavour shares the generic binning / commit / reduction core in
//! [`crate::estimator::Estimator`]; a kind only decides which entities it is
//! attached to and which particle species may contribute. The per-event score
//! (collision weight, track length, deposited energy, crossing weight) is
//! computed by the caller.

use std::fmt;

use mc_core::ParticleType;
use serde::{Deserialize, Serialize};

/// The kind of geometric entity an estimator is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Geometry cell.
    Cell,
    /// Geometry surface.
    Surface,
    /// Mesh element.
    MeshElement,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityType::Cell => write!(f, "Cell"),
            EntityType::Surface => write!(f, "Surface"),
            EntityType::MeshElement => write!(f, "Mesh element"),
        }
    }
}

/// Estimator flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    /// Collision-flux estimator over cells.
    CellCollisionFlux,
    /// Track-length-flux estimator over cells.
    CellTrackLengthFlux,
    /// Pulse-height (deposited energy) estimator over cells.
    CellPulseHeight,
    /// Surface-flux estimator.
    SurfaceFlux,
    /// Surface-current estimator.
    SurfaceCurrent,
    /// Track-length-flux estimator over mesh elements.
    MeshTrackLengthFlux,
}

impl EstimatorKind {
    /// Entity type scored by this kind.
    pub fn entity_type(self) -> EntityType {
        match self {
            EstimatorKind::CellCollisionFlux
            | EstimatorKind::CellTrackLengthFlux
            | EstimatorKind::CellPulseHeight => EntityType::Cell,
            EstimatorKind::SurfaceFlux | EstimatorKind::SurfaceCurrent => EntityType::Surface,
            EstimatorKind::MeshTrackLengthFlux => EntityType::MeshElement,
        }
    }

    /// Whether `particle_type` may be assigned to this kind.
    ///
    /// Pulse-height tallies track charged-particle/photon energy deposition and
    /// do not accept neutrons.
    pub fn accepts(self, particle_type: ParticleType) -> bool {
        match self {
            EstimatorKind::CellPulseHeight => particle_type != ParticleType::Neutron,
            _ => true,
        }
    }

    /// Particle types accepted by default.
    pub fn default_particle_types(self) -> Vec<ParticleType> {
        ParticleType::ALL.into_iter().filter(|p| self.accepts(*p)).collect()
    }
}

impl fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EstimatorKind::CellCollisionFlux => "Cell Collision Flux Estimator",
            EstimatorKind::CellTrackLengthFlux => "Cell Track-Length Flux Estimator",
            EstimatorKind::CellPulseHeight => "Cell Pulse Height Estimator",
            EstimatorKind::SurfaceFlux => "Surface Flux Estimator",
            EstimatorKind::SurfaceCurrent => "Surface Current Estimator",
            EstimatorKind::MeshTrackLengthFlux => "Mesh Track-Length Flux Estimator",
        };
        f.write_str(name)
    }
}
