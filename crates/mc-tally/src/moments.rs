//! Raw statistical moments and the per-thread scratch buffer.
//!
//! Permanent moments live in atomic cells so that several workers can commit
//! into the same arrays without a lock. Scratch buffers are private to one
//! worker and hold the in-flight contribution of its current history.

use std::collections::BTreeMap;

use mc_core::AtomicF64;
use serde::{Deserialize, Serialize};

/// `(S1, S2)` of per-history scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MomentPair {
    /// Σ x
    pub first: f64,
    /// Σ x²
    pub second: f64,
}

impl MomentPair {
    /// Pair contributed by a single history score.
    pub fn from_score(x: f64) -> Self {
        Self { first: x, second: x * x }
    }
}

/// `(S1, S2, S3, S4)` of per-history scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MomentQuad {
    /// Σ x
    pub first: f64,
    /// Σ x²
    pub second: f64,
    /// Σ x³
    pub third: f64,
    /// Σ x⁴
    pub fourth: f64,
}

impl MomentQuad {
    /// Quad contributed by a single history score.
    pub fn from_score(x: f64) -> Self {
        let x2 = x * x;
        Self { first: x, second: x2, third: x2 * x, fourth: x2 * x2 }
    }
}

/// Fixed-size array of atomically accumulated `(S1, S2)` cells.
#[derive(Debug, Clone)]
pub struct PairArray {
    first: Vec<AtomicF64>,
    second: Vec<AtomicF64>,
}

impl PairArray {
    /// `len` zeroed cells.
    pub fn new(len: usize) -> Self {
        Self {
            first: (0..len).map(|_| AtomicF64::default()).collect(),
            second: (0..len).map(|_| AtomicF64::default()).collect(),
        }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.first.len()
    }

    /// True if there are no cells.
    pub fn is_empty(&self) -> bool {
        self.first.is_empty()
    }

    /// Fold one history score into cell `i`.
    #[inline]
    pub fn add_score(&self, i: usize, x: f64) {
        self.first[i].fetch_add(x);
        self.second[i].fetch_add(x * x);
    }

    /// Moments of cell `i`.
    pub fn get(&self, i: usize) -> MomentPair {
        MomentPair { first: self.first[i].load(), second: self.second[i].load() }
    }

    /// Copy of every cell.
    pub fn snapshot(&self) -> Vec<MomentPair> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }

    /// First moments of every cell.
    pub fn first_moments(&self) -> Vec<f64> {
        self.first.iter().map(AtomicF64::load).collect()
    }

    /// Second moments of every cell.
    pub fn second_moments(&self) -> Vec<f64> {
        self.second.iter().map(AtomicF64::load).collect()
    }

    /// Zero every cell.
    pub fn reset(&self) {
        self.first.iter().chain(&self.second).for_each(|c| c.store(0.0));
    }

    /// S1 block followed by S2 block.
    pub(crate) fn to_flat(&self) -> Vec<f64> {
        let mut flat = self.first_moments();
        flat.extend(self.second_moments());
        flat
    }

    /// Inverse of [`Self::to_flat`]; `flat.len()` must be `2 * len()`.
    pub(crate) fn store_flat(&self, flat: &[f64]) {
        let n = self.len();
        for i in 0..n {
            self.first[i].store(flat[i]);
            self.second[i].store(flat[n + i]);
        }
    }
}

/// Fixed-size array of atomically accumulated `(S1..S4)` cells.
#[derive(Debug, Clone)]
pub struct QuadArray {
    moments: [Vec<AtomicF64>; 4],
}

impl QuadArray {
    /// `len` zeroed cells.
    pub fn new(len: usize) -> Self {
        Self { moments: std::array::from_fn(|_| (0..len).map(|_| AtomicF64::default()).collect()) }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.moments[0].len()
    }

    /// True if there are no cells.
    pub fn is_empty(&self) -> bool {
        self.moments[0].is_empty()
    }

    /// Fold one history score into cell `i`.
    #[inline]
    pub fn add_score(&self, i: usize, x: f64) {
        let q = MomentQuad::from_score(x);
        self.moments[0][i].fetch_add(q.first);
        self.moments[1][i].fetch_add(q.second);
        self.moments[2][i].fetch_add(q.third);
        self.moments[3][i].fetch_add(q.fourth);
    }

    /// Moments of cell `i`.
    pub fn get(&self, i: usize) -> MomentQuad {
        MomentQuad {
            first: self.moments[0][i].load(),
            second: self.moments[1][i].load(),
            third: self.moments[2][i].load(),
            fourth: self.moments[3][i].load(),
        }
    }

    /// Copy of every cell.
    pub fn snapshot(&self) -> Vec<MomentQuad> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }

    /// Zero every cell.
    pub fn reset(&self) {
        self.moments.iter().flatten().for_each(|c| c.store(0.0));
    }

    /// S1, S2, S3, S4 blocks back to back.
    pub(crate) fn to_flat(&self) -> Vec<f64> {
        self.moments.iter().flatten().map(AtomicF64::load).collect()
    }

    /// Inverse of [`Self::to_flat`]; `flat.len()` must be `4 * len()`.
    pub(crate) fn store_flat(&self, flat: &[f64]) {
        for (cell, v) in self.moments.iter().flatten().zip(flat) {
            cell.store(*v);
        }
    }
}

/// In-flight contributions of one worker's current history.
///
/// Sparse: entity index → (cell index → summed partial score). Cell index is
/// `response * n_bins + bin`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScratchBuffer {
    cells: BTreeMap<usize, BTreeMap<usize, f64>>,
}

impl ScratchBuffer {
    /// Add a partial contribution to `(entity, cell)`.
    #[inline]
    pub fn add(&mut self, entity: usize, cell: usize, value: f64) {
        *self.cells.entry(entity).or_default().entry(cell).or_insert(0.0) += value;
    }

    /// True iff any cell holds a non-zero partial score.
    pub fn is_dirty(&self) -> bool {
        self.cells.values().flat_map(|m| m.values()).any(|v| *v != 0.0)
    }

    /// Partial score of `(entity, cell)`.
    pub fn get(&self, entity: usize, cell: usize) -> f64 {
        self.cells.get(&entity).and_then(|m| m.get(&cell)).copied().unwrap_or(0.0)
    }

    /// Take the contents, leaving the buffer zeroed.
    pub fn take(&mut self) -> BTreeMap<usize, BTreeMap<usize, f64>> {
        std::mem::take(&mut self.cells)
    }

    /// Zero the buffer.
    pub fn clear(&mut self) {
        self.cells.clear();
    }
}
