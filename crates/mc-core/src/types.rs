//! Common data types for mctally

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Opaque geometric entity handle (cell, surface or mesh element).
pub type EntityId = u64;

/// Estimator / particle-tracker handle.
pub type ObserverId = u32;

/// Particle species that can contribute to an estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticleType {
    /// Neutron.
    Neutron,
    /// Photon.
    Photon,
    /// Electron.
    Electron,
    /// Positron.
    Positron,
}

impl ParticleType {
    /// All particle types, in persisted order.
    pub const ALL: [ParticleType; 4] = [
        ParticleType::Neutron,
        ParticleType::Photon,
        ParticleType::Electron,
        ParticleType::Positron,
    ];
}

impl fmt::Display for ParticleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParticleType::Neutron => write!(f, "neutron"),
            ParticleType::Photon => write!(f, "photon"),
            ParticleType::Electron => write!(f, "electron"),
            ParticleType::Positron => write!(f, "positron"),
        }
    }
}

/// Snapshot of a particle as seen by observers at an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleState {
    /// History this particle belongs to.
    pub history_number: u64,
    /// Identifier unique among the particles of one history (0 = source).
    #[serde(default)]
    pub particle_id: u64,
    /// Species.
    pub particle_type: ParticleType,
    /// Generation (0 = source particle).
    pub generation: u32,
    /// Collisions undergone so far.
    pub collision_number: u32,
    /// Position (cm).
    pub position: [f64; 3],
    /// Unit direction.
    pub direction: [f64; 3],
    /// Energy (MeV).
    pub energy: f64,
    /// Time (s).
    pub time: f64,
    /// Statistical weight.
    pub weight: f64,
    /// Particle has been killed / escaped at this event.
    pub gone: bool,
}

impl ParticleState {
    /// Source particle of `history_number` at the origin, travelling along +z with unit weight.
    pub fn new(history_number: u64, particle_type: ParticleType) -> Self {
        Self {
            history_number,
            particle_id: 0,
            particle_type,
            generation: 0,
            collision_number: 0,
            position: [0.0; 3],
            direction: [0.0, 0.0, 1.0],
            energy: 1.0,
            time: 0.0,
            weight: 1.0,
            gone: false,
        }
    }

    /// Set the energy.
    pub fn with_energy(mut self, energy: f64) -> Self {
        self.energy = energy;
        self
    }

    /// Set the time.
    pub fn with_time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }

    /// Set the weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Set position and direction.
    pub fn with_ray(mut self, position: [f64; 3], direction: [f64; 3]) -> Self {
        self.position = position;
        self.direction = direction;
        self
    }

    /// Record one more collision.
    pub fn increment_collision_number(&mut self) {
        self.collision_number += 1;
    }

    /// Spawn secondary `particle_id` of `particle_type` in the next generation.
    pub fn secondary(&self, particle_type: ParticleType, particle_id: u64) -> Self {
        Self {
            particle_id,
            particle_type,
            generation: self.generation + 1,
            collision_number: 0,
            gone: false,
            ..self.clone()
        }
    }
}

/// Run-level normalization inputs for processed export.
///
/// Both fields must be set before processed data can be computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Number of simulated histories (the normalization divisor).
    pub number_of_histories: Option<u64>,
    /// Wall-clock time of the run (s), used by rate diagnostics.
    pub end_time: Option<f64>,
}

impl RunStatistics {
    /// Fully configured statistics.
    pub fn new(number_of_histories: u64, end_time: f64) -> Self {
        Self { number_of_histories: Some(number_of_histories), end_time: Some(end_time) }
    }

    /// Set the number of histories.
    pub fn set_number_of_histories(&mut self, n: u64) {
        self.number_of_histories = Some(n);
    }

    /// Set the elapsed wall-clock time.
    pub fn set_end_time(&mut self, t: f64) {
        self.end_time = Some(t);
    }

    /// `(N, T)` or `StatisticsNotConfigured`.
    pub fn require(&self) -> Result<(u64, f64)> {
        let n = match self.number_of_histories {
            Some(n) if n > 0 => n,
            Some(_) => {
                return Err(Error::StatisticsNotConfigured(
                    "number of histories must be > 0".into(),
                ));
            }
            None => {
                return Err(Error::StatisticsNotConfigured("number of histories not set".into()));
            }
        };
        let t = match self.end_time {
            Some(t) if t > 0.0 && t.is_finite() => t,
            Some(t) => {
                return Err(Error::StatisticsNotConfigured(format!(
                    "end time must be finite and > 0 (got {t})"
                )));
            }
            None => return Err(Error::StatisticsNotConfigured("end time not set".into())),
        };
        Ok((n, t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secondary_resets_collisions() {
        let mut p = ParticleState::new(4, ParticleType::Neutron).with_energy(2.0);
        p.increment_collision_number();
        let s = p.secondary(ParticleType::Photon, 3);
        assert_eq!(s.history_number, 4);
        assert_eq!(s.particle_id, 3);
        assert_eq!(s.generation, 1);
        assert_eq!(s.collision_number, 0);
        assert_eq!(s.particle_type, ParticleType::Photon);
        assert_eq!(s.energy, 2.0);
    }

    #[test]
    fn test_builders_set_fields() {
        let p = ParticleState::new(0, ParticleType::Electron)
            .with_time(1.5)
            .with_ray([1.0, 2.0, 3.0], [1.0, 0.0, 0.0]);
        assert_eq!(p.time, 1.5);
        assert_eq!(p.position, [1.0, 2.0, 3.0]);
        assert_eq!(p.direction, [1.0, 0.0, 0.0]);
        assert_eq!(p.particle_id, 0);
    }

    #[test]
    fn test_run_statistics_require() {
        let mut stats = RunStatistics::default();
        assert!(matches!(stats.require(), Err(Error::StatisticsNotConfigured(_))));
        stats.set_number_of_histories(10);
        assert!(matches!(stats.require(), Err(Error::StatisticsNotConfigured(_))));
        stats.set_end_time(2.5);
        assert_eq!(stats.require().unwrap(), (10, 2.5));
        assert!(RunStatistics::new(0, 1.0).require().is_err());
        assert!(RunStatistics::new(1, 0.0).require().is_err());
    }

    #[test]
    fn test_particle_type_serde_names() {
        let json = serde_json::to_string(&ParticleType::Positron).unwrap();
        assert_eq!(json, "\"positron\"");
    }
}
