//! Per-entity moment state.

use mc_core::EntityId;

use crate::moments::{PairArray, QuadArray};

/// One geometric entity attached to an estimator.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    id: EntityId,
    normalization: f64,
    /// `(S1, S2)` per `response * n_bins + bin`.
    pub(crate) binned: PairArray,
    /// `(S1..S4)` per response function.
    pub(crate) total: QuadArray,
}

impl EntityRecord {
    pub(crate) fn new(id: EntityId, normalization: f64, n_bins: usize, n_responses: usize) -> Self {
        Self {
            id,
            normalization,
            binned: PairArray::new(n_bins * n_responses),
            total: QuadArray::new(n_responses),
        }
    }

    /// Entity handle.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Normalization constant (volume, area, …).
    pub fn normalization(&self) -> f64 {
        self.normalization
    }

    /// Binned moments.
    pub fn binned_moments(&self) -> &PairArray {
        &self.binned
    }

    /// Total (un-binned) moments.
    pub fn total_moments(&self) -> &QuadArray {
        &self.total
    }

    pub(crate) fn resize(&mut self, n_bins: usize, n_responses: usize) {
        self.binned = PairArray::new(n_bins * n_responses);
        self.total = QuadArray::new(n_responses);
    }

    pub(crate) fn reset(&self) {
        self.binned.reset();
        self.total.reset();
    }
}
