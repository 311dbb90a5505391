//! Entity estimator: phase-space binning, per-worker scratch and the
//! once-per-history commit.
//!
//! Contributions made during a history are summed in the calling worker's
//! [`ScratchBuffer`]; [`Estimator::commit_history_contribution`] folds the
//! combined per-history score into the permanent moments exactly once. The
//! permanent arrays are atomic, so several workers may commit concurrently
//! through `&Estimator`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use mc_core::{EntityId, Error, ObserverId, ParticleState, ParticleType, Result};

use crate::entity::EntityRecord;
use crate::kind::EstimatorKind;
use crate::moments::{PairArray, QuadArray, ScratchBuffer};
use crate::phase_space::{BinBoundaries, Dimension, PhaseSpaceBinSet, PhaseSpacePoint};
use crate::response::ResponseFunctionSet;

/// Index of the calling rayon worker (0 outside a pool).
#[inline]
pub fn current_worker_index() -> usize {
    rayon::current_thread_index().unwrap_or(0)
}

/// What happened to a single partial contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContributionOutcome {
    /// Added to the worker's scratch buffer.
    Recorded,
    /// Outside the active bin intervals; counted in
    /// [`Estimator::dropped_event_count`].
    Dropped,
    /// Particle type not assigned to this estimator.
    Filtered,
}

/// Binned estimator over a fixed set of entities.
#[derive(Debug)]
pub struct Estimator {
    id: ObserverId,
    multiplier: f64,
    kind: EstimatorKind,
    bins: PhaseSpaceBinSet,
    responses: ResponseFunctionSet,
    particle_types: BTreeSet<ParticleType>,
    entities: Vec<EntityRecord>,
    index: HashMap<EntityId, usize>,
    /// Σ over entities, per `response * n_bins + bin`.
    total_binned: PairArray,
    /// Σ over entities and bins, per response.
    total: QuadArray,
    scratch: Vec<Mutex<ScratchBuffer>>,
    finalized: AtomicBool,
    dropped: AtomicU64,
}

impl Estimator {
    /// Build an estimator over `entities` (`(id, normalization)` pairs).
    ///
    /// Starts with no active dimensions, the default response set, every
    /// particle type `kind` accepts and one scratch buffer.
    pub fn new(
        id: ObserverId,
        multiplier: f64,
        kind: EstimatorKind,
        entities: &[(EntityId, f64)],
    ) -> Result<Self> {
        if !(multiplier.is_finite() && multiplier > 0.0) {
            return Err(Error::Validation(format!(
                "estimator {id}: multiplier must be positive and finite, got {multiplier}"
            )));
        }
        if entities.is_empty() {
            return Err(Error::Validation(format!("estimator {id}: no entities assigned")));
        }

        let bins = PhaseSpaceBinSet::new();
        let responses = ResponseFunctionSet::default();
        let n_bins = bins.number_of_bins();
        let n_resp = responses.len();

        let mut records = Vec::with_capacity(entities.len());
        let mut index = HashMap::with_capacity(entities.len());
        for &(entity, norm) in entities {
            if !(norm.is_finite() && norm > 0.0) {
                return Err(Error::Validation(format!(
                    "estimator {id}: entity {entity} normalization must be positive \
                     and finite, got {norm}"
                )));
            }
            if index.insert(entity, records.len()).is_some() {
                return Err(Error::Validation(format!(
                    "estimator {id}: entity {entity} assigned twice"
                )));
            }
            records.push(EntityRecord::new(entity, norm, n_bins, n_resp));
        }

        Ok(Self {
            id,
            multiplier,
            kind,
            bins,
            responses,
            particle_types: kind.default_particle_types().into_iter().collect(),
            entities: records,
            index,
            total_binned: PairArray::new(n_bins * n_resp),
            total: QuadArray::new(n_resp),
            scratch: vec![Mutex::new(ScratchBuffer::default())],
            finalized: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        })
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    fn ensure_not_finalized(&self, operation: &'static str) -> Result<()> {
        if self.finalized.load(Ordering::Acquire) {
            return Err(Error::AlreadyFinalized { estimator: self.id, operation });
        }
        Ok(())
    }

    /// Set (or replace) the boundaries of one phase-space dimension.
    pub fn set_bin_boundaries(
        &mut self,
        dimension: Dimension,
        boundaries: BinBoundaries,
    ) -> Result<()> {
        self.ensure_not_finalized("set_bin_boundaries")?;
        self.bins.set_bin_boundaries(dimension, boundaries)?;
        self.reshape();
        Ok(())
    }

    /// Set continuous boundaries for `dimension`.
    pub fn set_continuous_bins(&mut self, dimension: Dimension, edges: &[f64]) -> Result<()> {
        self.set_bin_boundaries(dimension, BinBoundaries::Continuous(edges.to_vec()))
    }

    /// Set collision-number thresholds.
    pub fn set_collision_number_bins(&mut self, thresholds: &[u32]) -> Result<()> {
        let boundaries = BinBoundaries::Thresholds(thresholds.to_vec());
        self.set_bin_boundaries(Dimension::CollisionNumber, boundaries)
    }

    /// Replace the response functions.
    pub fn set_response_functions(&mut self, responses: ResponseFunctionSet) -> Result<()> {
        self.ensure_not_finalized("set_response_functions")?;
        self.responses = responses;
        self.reshape();
        Ok(())
    }

    /// Restrict the particle types that may contribute.
    pub fn set_particle_types(&mut self, types: &[ParticleType]) -> Result<()> {
        self.ensure_not_finalized("set_particle_types")?;
        if types.is_empty() {
            let msg = format!("estimator {}: empty particle type list", self.id);
            return Err(Error::Validation(msg));
        }
        if let Some(bad) = types.iter().find(|p| !self.kind.accepts(**p)) {
            return Err(Error::Validation(format!(
                "estimator {}: {} does not accept {bad} contributions",
                self.id, self.kind
            )));
        }
        self.particle_types = types.iter().copied().collect();
        Ok(())
    }

    // Shape changed: every moment array and scratch buffer starts over.
    fn reshape(&mut self) {
        let n_bins = self.bins.number_of_bins();
        let n_resp = self.responses.len();
        for e in &mut self.entities {
            e.resize(n_bins, n_resp);
        }
        self.total_binned = PairArray::new(n_bins * n_resp);
        self.total = QuadArray::new(n_resp);
        for s in &self.scratch {
            s.lock().expect("scratch mutex poisoned").clear();
        }
    }

    /// Grow the scratch array to `threads` buffers (never shrinks).
    pub fn enable_thread_support(&mut self, threads: usize) {
        if threads > self.scratch.len() {
            self.scratch.resize_with(threads, Default::default);
        }
    }

    // ------------------------------------------------------------------
    // Shape / metadata
    // ------------------------------------------------------------------

    /// Estimator id.
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Constant multiplier applied to processed means.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Estimator flavour.
    pub fn kind(&self) -> EstimatorKind {
        self.kind
    }

    /// Bin set.
    pub fn bin_set(&self) -> &PhaseSpaceBinSet {
        &self.bins
    }

    /// Response functions.
    pub fn response_functions(&self) -> &ResponseFunctionSet {
        &self.responses
    }

    /// Assigned particle types, sorted.
    pub fn particle_types(&self) -> Vec<ParticleType> {
        self.particle_types.iter().copied().collect()
    }

    /// Total number of phase-space bins.
    pub fn number_of_bins(&self) -> usize {
        self.bins.number_of_bins()
    }

    /// Bins along `dimension` (1 if inactive).
    pub fn number_of_bins_for(&self, dimension: Dimension) -> usize {
        self.bins.number_of_bins_for(dimension)
    }

    /// Number of response functions.
    pub fn number_of_response_functions(&self) -> usize {
        self.responses.len()
    }

    /// Number of scratch buffers.
    pub fn number_of_threads(&self) -> usize {
        self.scratch.len()
    }

    /// Entity records in construction order.
    pub fn entities(&self) -> &[EntityRecord] {
        &self.entities
    }

    /// Entity ids in construction order.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.iter().map(EntityRecord::id).collect()
    }

    /// Record of entity `id`.
    pub fn entity(&self, id: EntityId) -> Result<&EntityRecord> {
        self.index
            .get(&id)
            .map(|&i| &self.entities[i])
            .ok_or(Error::UnknownEntity { estimator: self.id, entity: id })
    }

    /// Sum of every entity's normalization constant.
    pub fn total_normalization(&self) -> f64 {
        self.entities.iter().map(EntityRecord::normalization).sum()
    }

    /// Estimator-wide binned moments (summed over entities).
    pub fn total_bin_moments(&self) -> &PairArray {
        &self.total_binned
    }

    /// Estimator-wide total moments per response function.
    pub fn total_moments(&self) -> &QuadArray {
        &self.total
    }

    /// Contributions dropped because a coordinate fell outside the bins.
    pub fn dropped_event_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// True once the first commit has happened.
    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Contribution
    // ------------------------------------------------------------------

    /// Add `value × response(particle)` to the calling worker's scratch cell.
    pub fn add_partial_history_contribution(
        &self,
        entity: EntityId,
        point: &PhaseSpacePoint,
        particle: &ParticleState,
        value: f64,
    ) -> Result<ContributionOutcome> {
        let thread = current_worker_index();
        self.add_partial_history_contribution_on_thread(thread, entity, point, particle, value)
    }

    /// [`Self::add_partial_history_contribution`] on an explicit scratch buffer.
    pub fn add_partial_history_contribution_on_thread(
        &self,
        thread: usize,
        entity: EntityId,
        point: &PhaseSpacePoint,
        particle: &ParticleState,
        value: f64,
    ) -> Result<ContributionOutcome> {
        let scratch = self.scratch_for(thread)?;
        let Some(&entity_index) = self.index.get(&entity) else {
            return Err(Error::UnknownEntity { estimator: self.id, entity });
        };
        if !self.particle_types.contains(&particle.particle_type) {
            return Ok(ContributionOutcome::Filtered);
        }

        let bin = match self.bins.compute_bin_index(point) {
            Ok(bin) => bin,
            Err(e) if e.is_recoverable() => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("estimator {}: dropped contribution to entity {entity}: {e}", self.id);
                return Ok(ContributionOutcome::Dropped);
            }
            Err(e) => return Err(e),
        };

        let n_bins = self.bins.number_of_bins();
        let mut buf = scratch.lock().expect("scratch mutex poisoned");
        for (r, response) in self.responses.iter().enumerate() {
            buf.add(entity_index, r * n_bins + bin, value * response.evaluate(particle));
        }
        Ok(ContributionOutcome::Recorded)
    }

    fn scratch_for(&self, thread: usize) -> Result<&Mutex<ScratchBuffer>> {
        self.scratch.get(thread).ok_or_else(|| {
            Error::Validation(format!(
                "estimator {}: worker {thread} has no scratch buffer ({} enabled)",
                self.id,
                self.scratch.len()
            ))
        })
    }

    /// True iff the calling worker's scratch holds a non-zero cell.
    pub fn has_uncommitted_history_contribution(&self) -> bool {
        self.has_uncommitted_history_contribution_on_thread(current_worker_index())
    }

    /// True iff scratch buffer `thread` holds a non-zero cell.
    pub fn has_uncommitted_history_contribution_on_thread(&self, thread: usize) -> bool {
        self.scratch
            .get(thread)
            .is_some_and(|s| s.lock().expect("scratch mutex poisoned").is_dirty())
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    /// Fold the calling worker's history into the permanent moments.
    pub fn commit_history_contribution(&self) -> Result<()> {
        self.commit_history_contribution_on_thread(current_worker_index())
    }

    /// Fold scratch buffer `thread` into the permanent moments and zero it.
    ///
    /// Per entity, each `(response, bin)` cell receives `(v, v²)` and the
    /// per-response total `t = Σ_bins v` receives `(t, t², t³, t⁴)`. The
    /// estimator-wide arrays receive the same folds of the sums over entities.
    /// Zero scores are skipped.
    pub fn commit_history_contribution_on_thread(&self, thread: usize) -> Result<()> {
        let cells = self.scratch_for(thread)?.lock().expect("scratch mutex poisoned").take();
        self.finalized.store(true, Ordering::Release);
        if cells.is_empty() {
            return Ok(());
        }

        let n_bins = self.bins.number_of_bins();
        let n_resp = self.responses.len();
        let mut estimator_bins: BTreeMap<usize, f64> = BTreeMap::new();
        let mut estimator_totals = vec![0.0; n_resp];

        for (entity_index, entity_cells) in cells {
            let record = &self.entities[entity_index];
            let mut entity_totals = vec![0.0; n_resp];
            for (cell, v) in entity_cells {
                if v == 0.0 {
                    continue;
                }
                record.binned.add_score(cell, v);
                entity_totals[cell / n_bins] += v;
                *estimator_bins.entry(cell).or_insert(0.0) += v;
            }
            for (r, t) in entity_totals.into_iter().enumerate() {
                if t != 0.0 {
                    record.total.add_score(r, t);
                    estimator_totals[r] += t;
                }
            }
        }

        for (cell, v) in estimator_bins {
            if v != 0.0 {
                self.total_binned.add_score(cell, v);
            }
        }
        for (r, t) in estimator_totals.into_iter().enumerate() {
            if t != 0.0 {
                self.total.add_score(r, t);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reset
    // ------------------------------------------------------------------

    /// Zero every permanent and scratch moment and the dropped-event counter.
    ///
    /// Boundaries, entities and response functions are kept; the estimator
    /// accepts configuration changes again.
    pub fn reset_data(&self) {
        for e in &self.entities {
            e.reset();
        }
        self.total_binned.reset();
        self.total.reset();
        for s in &self.scratch {
            s.lock().expect("scratch mutex poisoned").clear();
        }
        self.dropped.store(0, Ordering::Relaxed);
        self.finalized.store(false, Ordering::Release);
    }

    /// Discard the in-flight history of worker `thread`.
    pub fn reset_thread_scratch(&self, thread: usize) -> Result<()> {
        self.scratch_for(thread)?.lock().expect("scratch mutex poisoned").clear();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Flat state (distributed reduction)
    // ------------------------------------------------------------------

    /// Every permanent moment in a fixed order: per entity binned then total,
    /// then the estimator-wide binned and total blocks, then the dropped-event
    /// count.
    pub(crate) fn moments_to_flat(&self) -> Vec<f64> {
        let mut flat = Vec::with_capacity(self.flat_len());
        for e in &self.entities {
            flat.extend(e.binned.to_flat());
            flat.extend(e.total.to_flat());
        }
        flat.extend(self.total_binned.to_flat());
        flat.extend(self.total.to_flat());
        // Exact for counts below 2^53.
        flat.push(self.dropped_event_count() as f64);
        flat
    }

    /// Inverse of [`Self::moments_to_flat`].
    pub(crate) fn store_flat_moments(&self, flat: &[f64]) -> Result<()> {
        if flat.len() != self.flat_len() {
            return Err(Error::Communication(format!(
                "estimator {}: moment buffer has {} values, expected {}",
                self.id,
                flat.len(),
                self.flat_len()
            )));
        }
        let mut rest = flat;
        for e in &self.entities {
            e.binned.store_flat(split_block(&mut rest, 2 * e.binned.len()));
            e.total.store_flat(split_block(&mut rest, 4 * e.total.len()));
        }
        self.total_binned.store_flat(split_block(&mut rest, 2 * self.total_binned.len()));
        self.total.store_flat(split_block(&mut rest, 4 * self.total.len()));
        if let [dropped] = rest {
            self.dropped.store(*dropped as u64, Ordering::Relaxed);
        }
        Ok(())
    }

    pub(crate) fn flat_len(&self) -> usize {
        let n_resp = self.responses.len();
        let per_entity = 2 * self.bins.number_of_bins() * n_resp + 4 * n_resp;
        per_entity * (self.entities.len() + 1) + 1
    }

    /// Human-readable description of the configuration.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Estimator {} ({}), multiplier {}\n  {}s:",
            self.id,
            self.kind,
            self.multiplier,
            self.kind.entity_type()
        );
        for e in &self.entities {
            out.push_str(&format!(" {}", e.id()));
        }
        out.push_str("\n  Particle types:");
        for p in &self.particle_types {
            out.push_str(&format!(" {p}"));
        }
        out.push_str(&format!("\n  Response functions: {}", self.responses.names().join(", ")));
        for dim in self.bins.dimension_ordering() {
            if let Some(b) = self.bins.boundaries(dim) {
                out.push_str(&format!("\n  {dim} Bins: {:?}", b.to_f64_vec()));
            }
        }
        out.push_str(&format!("\n  Dropped events: {}", self.dropped_event_count()));
        out
    }
}

fn split_block<'a>(rest: &mut &'a [f64], len: usize) -> &'a [f64] {
    let whole: &'a [f64] = *rest;
    let (block, tail) = whole.split_at(len);
    *rest = tail;
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moments::MomentPair;
    use crate::response::{ResponseFunction, ResponseKind};
    use approx::assert_relative_eq;

    fn photon() -> ParticleState {
        ParticleState::new(0, ParticleType::Photon)
    }

    fn energy_estimator() -> Estimator {
        let kind = EstimatorKind::CellTrackLengthFlux;
        let mut est = Estimator::new(3, 1.0, kind, &[(1, 1.0), (2, 2.0)]).unwrap();
        est.set_continuous_bins(Dimension::Energy, &[0.0, 0.5, 1.0]).unwrap();
        est
    }

    fn at(energy: f64) -> PhaseSpacePoint {
        PhaseSpacePoint::new(energy, 0.0, 0.0, 0)
    }

    #[test]
    fn test_construction_validation() {
        let kind = EstimatorKind::CellCollisionFlux;
        assert!(Estimator::new(0, 0.0, kind, &[(1, 1.0)]).is_err());
        assert!(Estimator::new(0, 1.0, kind, &[]).is_err());
        assert!(Estimator::new(0, 1.0, kind, &[(1, -1.0)]).is_err());
        assert!(Estimator::new(0, 1.0, kind, &[(1, 1.0), (1, 2.0)]).is_err());
        let est = Estimator::new(0, 1.0, kind, &[(1, 1.0), (4, 2.5)]).unwrap();
        assert_eq!(est.entity_ids(), vec![1, 4]);
        assert_relative_eq!(est.total_normalization(), 3.5);
        assert_eq!(est.number_of_bins(), 1);
        assert_eq!(est.number_of_response_functions(), 1);
    }

    #[test]
    fn test_partials_combine_before_squaring() {
        let est = energy_estimator();
        let p = photon();
        est.add_partial_history_contribution_on_thread(0, 1, &at(0.7), &p, 1.0).unwrap();
        est.add_partial_history_contribution_on_thread(0, 1, &at(0.7), &p, 1.0).unwrap();
        assert!(est.has_uncommitted_history_contribution_on_thread(0));
        est.commit_history_contribution_on_thread(0).unwrap();
        assert!(!est.has_uncommitted_history_contribution_on_thread(0));

        let e = est.entity(1).unwrap();
        assert_eq!(e.binned_moments().get(1), MomentPair { first: 2.0, second: 4.0 });
        assert_eq!(e.binned_moments().get(0), MomentPair::default());
        let t = e.total_moments().get(0);
        assert_eq!((t.first, t.second, t.third, t.fourth), (2.0, 4.0, 8.0, 16.0));
        assert_eq!(est.entity(2).unwrap().total_moments().get(0).first, 0.0);
    }

    #[test]
    fn test_entity_total_sums_across_bins() {
        let est = energy_estimator();
        let p = photon();
        est.add_partial_history_contribution_on_thread(0, 1, &at(0.2), &p, 1.0).unwrap();
        est.add_partial_history_contribution_on_thread(0, 1, &at(0.9), &p, 2.0).unwrap();
        est.add_partial_history_contribution_on_thread(0, 2, &at(0.9), &p, 1.0).unwrap();
        est.commit_history_contribution_on_thread(0).unwrap();

        let e1 = est.entity(1).unwrap();
        assert_eq!(e1.binned_moments().get(0), MomentPair { first: 1.0, second: 1.0 });
        assert_eq!(e1.binned_moments().get(1), MomentPair { first: 2.0, second: 4.0 });
        assert_eq!(e1.total_moments().get(0).second, 9.0);

        // Estimator-wide: bin 1 holds 2 + 1 from one history.
        assert_eq!(est.total_bin_moments().get(1), MomentPair { first: 3.0, second: 9.0 });
        assert_eq!(est.total_moments().get(0).first, 4.0);
        assert_eq!(est.total_moments().get(0).second, 16.0);
    }

    #[test]
    fn test_response_functions_fill_separate_cells() {
        let mut est = energy_estimator();
        est.set_response_functions(
            ResponseFunctionSet::new(vec![
                ResponseFunction::unit(),
                ResponseFunction::new("energy", ResponseKind::Energy),
            ])
            .unwrap(),
        )
        .unwrap();
        let p = photon().with_energy(0.25);
        est.add_partial_history_contribution_on_thread(0, 1, &at(0.25), &p, 2.0).unwrap();
        est.commit_history_contribution_on_thread(0).unwrap();

        let e = est.entity(1).unwrap();
        assert_eq!(e.binned_moments().len(), 4);
        assert_eq!(e.binned_moments().get(0).first, 2.0);
        assert_eq!(e.binned_moments().get(2).first, 0.5);
        assert_eq!(e.total_moments().get(1).first, 0.5);
    }

    #[test]
    fn test_out_of_range_is_counted_not_fatal() {
        let est = energy_estimator();
        let outcome =
            est.add_partial_history_contribution_on_thread(0, 1, &at(1.5), &photon(), 1.0).unwrap();
        assert_eq!(outcome, ContributionOutcome::Dropped);
        assert_eq!(est.dropped_event_count(), 1);
        assert!(!est.has_uncommitted_history_contribution_on_thread(0));
    }

    #[test]
    fn test_unknown_entity_and_thread_are_errors() {
        let est = energy_estimator();
        let err = est
            .add_partial_history_contribution_on_thread(0, 99, &at(0.1), &photon(), 1.0)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownEntity { entity: 99, .. }));
        let p = photon();
        assert!(est.add_partial_history_contribution_on_thread(5, 1, &at(0.1), &p, 1.0).is_err());
        assert!(est.commit_history_contribution_on_thread(5).is_err());
    }

    #[test]
    fn test_particle_filter() {
        let mut est = energy_estimator();
        est.set_particle_types(&[ParticleType::Neutron]).unwrap();
        let outcome =
            est.add_partial_history_contribution_on_thread(0, 1, &at(0.1), &photon(), 1.0).unwrap();
        assert_eq!(outcome, ContributionOutcome::Filtered);

        let mut ph = Estimator::new(1, 1.0, EstimatorKind::CellPulseHeight, &[(1, 1.0)]).unwrap();
        assert!(ph.set_particle_types(&[ParticleType::Neutron]).is_err());
        assert!(!ph.particle_types().contains(&ParticleType::Neutron));
    }

    #[test]
    fn test_configuration_locked_after_commit() {
        let mut est = energy_estimator();
        assert!(!est.is_finalized());
        est.commit_history_contribution_on_thread(0).unwrap();
        assert!(est.is_finalized());
        let err = est.set_continuous_bins(Dimension::Time, &[0.0, 1.0]).unwrap_err();
        assert!(matches!(err, Error::AlreadyFinalized { estimator: 3, .. }));
        assert!(est.set_response_functions(ResponseFunctionSet::default()).is_err());
        assert!(est.set_particle_types(&[ParticleType::Photon]).is_err());

        est.reset_data();
        assert!(!est.is_finalized());
        assert!(est.set_continuous_bins(Dimension::Time, &[0.0, 1.0]).is_ok());
    }

    #[test]
    fn test_thread_support_grows_and_preserves() {
        let mut est = energy_estimator();
        est.add_partial_history_contribution_on_thread(0, 1, &at(0.1), &photon(), 1.0).unwrap();
        est.enable_thread_support(4);
        est.enable_thread_support(2);
        assert_eq!(est.number_of_threads(), 4);
        assert!(est.has_uncommitted_history_contribution_on_thread(0));
        assert!(!est.has_uncommitted_history_contribution_on_thread(3));

        est.reset_thread_scratch(0).unwrap();
        assert!(!est.has_uncommitted_history_contribution_on_thread(0));
    }

    #[test]
    fn test_flat_round_trip_and_shape_check() {
        let est = energy_estimator();
        est.add_partial_history_contribution_on_thread(0, 2, &at(0.6), &photon(), 3.0).unwrap();
        est.add_partial_history_contribution_on_thread(0, 2, &at(4.0), &photon(), 3.0).unwrap();
        est.commit_history_contribution_on_thread(0).unwrap();
        let flat = est.moments_to_flat();
        assert_eq!(flat.len(), est.flat_len());
        assert_eq!(flat.last(), Some(&1.0));

        est.reset_data();
        assert_eq!(est.dropped_event_count(), 0);
        est.store_flat_moments(&flat).unwrap();
        assert_eq!(est.entity(2).unwrap().binned_moments().get(1).second, 9.0);
        assert_eq!(est.dropped_event_count(), 1);
        assert!(est.store_flat_moments(&flat[1..]).is_err());
    }

    #[test]
    fn test_summary_mentions_configuration() {
        let est = energy_estimator();
        let s = est.summary();
        assert!(s.contains("Cell Track-Length Flux Estimator"));
        assert!(s.contains("Cells: 1 2"));
        assert!(s.contains("Energy Bins: [0.0, 0.5, 1.0]"));
    }
}
