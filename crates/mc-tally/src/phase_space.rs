//! Multi-dimensional phase-space binning.
//!
//! A [`PhaseSpaceBinSet`] holds the active dimensions in the order they were
//! first configured. That order is persisted with the data: the composite bin
//! index is a mixed-radix number whose fastest-varying digit is the first
//! recorded dimension.

use std::fmt;

use mc_core::{Error, ParticleState, Result};
use serde::{Deserialize, Serialize};

/// A discretizable phase-space axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Particle energy.
    Energy,
    /// Direction cosine relative to the entity normal / reference axis.
    Cosine,
    /// Particle time.
    Time,
    /// Number of collisions undergone (discrete).
    CollisionNumber,
}

impl Dimension {
    /// Integer-valued dimension (threshold bins).
    pub fn is_discrete(self) -> bool {
        matches!(self, Dimension::CollisionNumber)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Energy => write!(f, "Energy"),
            Dimension::Cosine => write!(f, "Cosine"),
            Dimension::Time => write!(f, "Time"),
            Dimension::CollisionNumber => write!(f, "Collision Number"),
        }
    }
}

/// Boundaries of one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum BinBoundaries {
    /// Strictly increasing edges; bins are `[b[k], b[k+1])`, the last one closed.
    Continuous(Vec<f64>),
    /// Strictly increasing thresholds; bin 0 holds `c <= t[0]`, bin `k` holds
    /// `t[k-1] < c <= t[k]`, and the last bin is unbounded above.
    Thresholds(Vec<u32>),
}

impl BinBoundaries {
    /// Number of bins described by these boundaries.
    pub fn number_of_bins(&self) -> usize {
        match self {
            BinBoundaries::Continuous(edges) => edges.len() - 1,
            BinBoundaries::Thresholds(t) => t.len(),
        }
    }

    /// Boundaries widened to `f64` for persistence.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            BinBoundaries::Continuous(edges) => edges.clone(),
            BinBoundaries::Thresholds(t) => t.iter().map(|&v| f64::from(v)).collect(),
        }
    }

    fn validate(&self, dimension: Dimension) -> Result<()> {
        let invalid = |reason: String| Error::InvalidBoundaries {
            dimension: dimension.to_string(),
            reason,
        };
        match (self, dimension.is_discrete()) {
            (BinBoundaries::Continuous(edges), false) => {
                if edges.len() < 2 {
                    return Err(invalid(format!("need at least 2 boundaries, got {}", edges.len())));
                }
                if let Some(bad) = edges.iter().find(|e| !e.is_finite()) {
                    return Err(invalid(format!("non-finite boundary {bad}")));
                }
                if let Some(w) = edges.windows(2).position(|w| w[0] >= w[1]) {
                    return Err(invalid(format!(
                        "not strictly increasing at position {} ({} >= {})",
                        w + 1,
                        edges[w],
                        edges[w + 1]
                    )));
                }
                Ok(())
            }
            (BinBoundaries::Thresholds(t), true) => {
                if t.is_empty() {
                    return Err(invalid("need at least 1 threshold".into()));
                }
                if let Some(w) = t.windows(2).position(|w| w[0] >= w[1]) {
                    return Err(invalid(format!(
                        "thresholds not strictly increasing at position {}",
                        w + 1
                    )));
                }
                Ok(())
            }
            (BinBoundaries::Continuous(_), true) => {
                Err(invalid("discrete dimension requires integer thresholds".into()))
            }
            (BinBoundaries::Thresholds(_), false) => {
                Err(invalid("continuous dimension requires real boundaries".into()))
            }
        }
    }

    fn locate(&self, dimension: Dimension, point: &PhaseSpacePoint) -> Result<usize> {
        match self {
            BinBoundaries::Continuous(edges) => {
                let value = point.continuous(dimension);
                let last = edges.len() - 1;
                // NaN fails both comparisons below, so test the in-range form.
                if !(value >= edges[0] && value <= edges[last]) {
                    return Err(Error::OutOfRangeCoordinate {
                        dimension: dimension.to_string(),
                        value,
                        lower: edges[0],
                        upper: edges[last],
                    });
                }
                if value == edges[last] {
                    return Ok(last - 1);
                }
                Ok(edges.partition_point(|e| *e <= value) - 1)
            }
            BinBoundaries::Thresholds(t) => {
                let c = point.collision_number;
                Ok(t.partition_point(|th| *th < c).min(t.len() - 1))
            }
        }
    }

    fn describe_bin(&self, k: usize) -> String {
        match self {
            BinBoundaries::Continuous(edges) => {
                let close = if k + 2 == edges.len() { ']' } else { ')' };
                format!("[{}, {}{close}", edges[k], edges[k + 1])
            }
            BinBoundaries::Thresholds(t) => {
                let lower = if k == 0 { 0 } else { t[k - 1] + 1 };
                if k + 1 == t.len() {
                    format!("[{lower}, inf)")
                } else {
                    format!("[{lower}, {}]", t[k])
                }
            }
        }
    }
}

/// Phase-space coordinates of one event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseSpacePoint {
    /// Energy (MeV).
    pub energy: f64,
    /// Direction cosine.
    pub cosine: f64,
    /// Time (s).
    pub time: f64,
    /// Collision number.
    pub collision_number: u32,
}

impl PhaseSpacePoint {
    /// Explicit coordinates.
    pub fn new(energy: f64, cosine: f64, time: f64, collision_number: u32) -> Self {
        Self { energy, cosine, time, collision_number }
    }

    /// Coordinates of `particle`, with the angle cosine supplied by the geometry.
    pub fn from_particle(particle: &ParticleState, cosine: f64) -> Self {
        Self {
            energy: particle.energy,
            cosine,
            time: particle.time,
            collision_number: particle.collision_number,
        }
    }

    fn continuous(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Energy => self.energy,
            Dimension::Cosine => self.cosine,
            Dimension::Time => self.time,
            Dimension::CollisionNumber => f64::from(self.collision_number),
        }
    }
}

/// Ordered set of active dimensions and their boundaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpaceBinSet {
    dimensions: Vec<(Dimension, BinBoundaries)>,
}

impl PhaseSpaceBinSet {
    /// Empty set: a single "total" bin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the boundaries of `dimension`.
    ///
    /// An already-active dimension keeps its position in the ordering; a new one
    /// is appended (and so becomes the slowest-varying digit).
    pub fn set_bin_boundaries(
        &mut self,
        dimension: Dimension,
        boundaries: BinBoundaries,
    ) -> Result<()> {
        boundaries.validate(dimension)?;
        match self.dimensions.iter_mut().find(|(d, _)| *d == dimension) {
            Some(slot) => slot.1 = boundaries,
            None => self.dimensions.push((dimension, boundaries)),
        }
        Ok(())
    }

    /// Continuous-dimension convenience form of [`Self::set_bin_boundaries`].
    pub fn set_continuous(&mut self, dimension: Dimension, edges: &[f64]) -> Result<()> {
        self.set_bin_boundaries(dimension, BinBoundaries::Continuous(edges.to_vec()))
    }

    /// Collision-number convenience form of [`Self::set_bin_boundaries`].
    pub fn set_collision_number_thresholds(&mut self, thresholds: &[u32]) -> Result<()> {
        self.set_bin_boundaries(
            Dimension::CollisionNumber,
            BinBoundaries::Thresholds(thresholds.to_vec()),
        )
    }

    /// Bins along `dimension` (1 if inactive).
    pub fn number_of_bins_for(&self, dimension: Dimension) -> usize {
        self.boundaries(dimension).map_or(1, BinBoundaries::number_of_bins)
    }

    /// Total bins: product over active dimensions (1 with none active).
    pub fn number_of_bins(&self) -> usize {
        self.dimensions.iter().map(|(_, b)| b.number_of_bins()).product()
    }

    /// Active dimensions in persisted order.
    pub fn dimension_ordering(&self) -> Vec<Dimension> {
        self.dimensions.iter().map(|(d, _)| *d).collect()
    }

    /// Boundaries of `dimension`, if active.
    pub fn boundaries(&self, dimension: Dimension) -> Option<&BinBoundaries> {
        self.dimensions.iter().find(|(d, _)| *d == dimension).map(|(_, b)| b)
    }

    /// True if `dimension` is discretized.
    pub fn is_active(&self, dimension: Dimension) -> bool {
        self.boundaries(dimension).is_some()
    }

    /// Composite bin index of `point`.
    pub fn compute_bin_index(&self, point: &PhaseSpacePoint) -> Result<usize> {
        let mut index = 0usize;
        let mut stride = 1usize;
        for (dimension, boundaries) in &self.dimensions {
            index += boundaries.locate(*dimension, point)? * stride;
            stride *= boundaries.number_of_bins();
        }
        Ok(index)
    }

    /// Per-dimension indices of a composite bin index (persisted order).
    pub fn decompose_bin_index(&self, mut index: usize) -> Vec<usize> {
        self.dimensions
            .iter()
            .map(|(_, b)| {
                let n = b.number_of_bins();
                let k = index % n;
                index /= n;
                k
            })
            .collect()
    }

    /// Human-readable description of a composite bin.
    pub fn bin_name(&self, index: usize) -> String {
        if self.dimensions.is_empty() {
            return "Total Bin".to_string();
        }
        self.dimensions
            .iter()
            .zip(self.decompose_bin_index(index))
            .map(|((d, b), k)| format!("{d} Bin: {}", b.describe_bin(k)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
