//! Run-level ownership of estimators and particle trackers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use mc_core::{Communicator, Error, ObserverId, Result, RunConfig};
use rayon::prelude::*;

use crate::estimator::{Estimator, current_worker_index};
use crate::reduce::DistributedReducer;
use crate::tracker::ParticleTracker;

/// Build the worker pool described by `config`.
pub fn thread_pool(config: &RunConfig) -> Result<rayon::ThreadPool> {
    config.validate()?;
    rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()
        .map_err(|e| Error::Validation(format!("failed to create thread pool: {e}")))
}

/// End-of-run report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Committed histories.
    pub histories: u64,
    /// Dropped out-of-range contributions per estimator.
    pub dropped_events: BTreeMap<ObserverId, u64>,
}

impl RunSummary {
    /// Sum of dropped contributions over all estimators.
    pub fn total_dropped(&self) -> u64 {
        self.dropped_events.values().sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RunSummary(histories={}, dropped={}", self.histories, self.total_dropped())?;
        for (id, n) in self.dropped_events.iter().filter(|(_, n)| **n > 0) {
            write!(f, ", estimator {id}: {n}")?;
        }
        write!(f, ")")
    }
}

/// Owns every observer of a run and drives the per-history commit.
#[derive(Debug, Default)]
pub struct EventHandler {
    estimators: BTreeMap<ObserverId, Estimator>,
    trackers: BTreeMap<ObserverId, ParticleTracker>,
    histories: AtomicU64,
}

impl EventHandler {
    /// Empty handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an estimator; ids must be unique.
    pub fn add_estimator(&mut self, estimator: Estimator) -> Result<()> {
        let id = estimator.id();
        if self.estimators.contains_key(&id) {
            return Err(Error::Validation(format!("estimator {id} already registered")));
        }
        self.estimators.insert(id, estimator);
        Ok(())
    }

    /// Register a particle tracker; ids must be unique.
    pub fn add_particle_tracker(&mut self, tracker: ParticleTracker) -> Result<()> {
        let id = tracker.id();
        if self.trackers.contains_key(&id) {
            return Err(Error::Validation(format!("particle tracker {id} already registered")));
        }
        self.trackers.insert(id, tracker);
        Ok(())
    }

    /// Estimator `id`.
    pub fn estimator(&self, id: ObserverId) -> Result<&Estimator> {
        self.estimators
            .get(&id)
            .ok_or_else(|| Error::Validation(format!("estimator {id} not registered")))
    }

    /// Mutable estimator `id` (configuration time only).
    pub fn estimator_mut(&mut self, id: ObserverId) -> Result<&mut Estimator> {
        self.estimators
            .get_mut(&id)
            .ok_or_else(|| Error::Validation(format!("estimator {id} not registered")))
    }

    /// Particle tracker `id`.
    pub fn particle_tracker(&self, id: ObserverId) -> Result<&ParticleTracker> {
        self.trackers
            .get(&id)
            .ok_or_else(|| Error::Validation(format!("particle tracker {id} not registered")))
    }

    /// Estimators in id order.
    pub fn estimators(&self) -> impl Iterator<Item = &Estimator> {
        self.estimators.values()
    }

    /// Particle trackers in id order.
    pub fn particle_trackers(&self) -> impl Iterator<Item = &ParticleTracker> {
        self.trackers.values()
    }

    /// Number of estimators.
    pub fn number_of_estimators(&self) -> usize {
        self.estimators.len()
    }

    /// Number of particle trackers.
    pub fn number_of_particle_trackers(&self) -> usize {
        self.trackers.len()
    }

    /// Committed histories since the last reset.
    pub fn number_of_committed_histories(&self) -> u64 {
        self.histories.load(Ordering::Relaxed)
    }

    /// Give every observer `threads` scratch buffers.
    pub fn enable_thread_support(&mut self, threads: usize) {
        for e in self.estimators.values_mut() {
            e.enable_thread_support(threads);
        }
        for t in self.trackers.values_mut() {
            t.enable_thread_support(threads);
        }
    }

    /// True if any estimator holds uncommitted contributions on `thread`.
    pub fn has_uncommitted_history_contribution_on_thread(&self, thread: usize) -> bool {
        self.estimators.values().any(|e| e.has_uncommitted_history_contribution_on_thread(thread))
    }

    /// Commit the calling worker's history on every observer.
    pub fn commit_history_contribution(&self) -> Result<()> {
        self.commit_history_contribution_on_thread(current_worker_index())
    }

    /// Commit worker `thread`'s history on every observer.
    pub fn commit_history_contribution_on_thread(&self, thread: usize) -> Result<()> {
        for e in self.estimators.values() {
            e.commit_history_contribution_on_thread(thread)?;
        }
        for t in self.trackers.values() {
            t.commit_history_contribution_on_thread(thread)?;
        }
        self.histories.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Discard worker `thread`'s in-flight history on every observer.
    pub fn abandon_history_on_thread(&self, thread: usize) -> Result<()> {
        for e in self.estimators.values() {
            e.reset_thread_scratch(thread)?;
        }
        for t in self.trackers.values() {
            t.reset_thread_partial(thread)?;
        }
        Ok(())
    }

    /// Run histories `0..n` on `pool`, committing each once.
    ///
    /// `simulate(history, thread, handler)` feeds contributions for one
    /// history. If it fails, that worker's in-flight history is discarded on
    /// every observer and the error is returned once the pool drains.
    pub fn run_histories<F>(&self, pool: &rayon::ThreadPool, n: u64, simulate: F) -> Result<()>
    where
        F: Fn(u64, usize, &EventHandler) -> Result<()> + Sync,
    {
        let threads = pool.current_num_threads();
        if let Some(e) = self.estimators.values().find(|e| e.number_of_threads() < threads) {
            return Err(Error::Validation(format!(
                "estimator {} has {} scratch buffers, pool has {threads} workers",
                e.id(),
                e.number_of_threads()
            )));
        }

        pool.install(|| {
            (0..n).into_par_iter().try_for_each(|history| {
                let thread = current_worker_index();
                if let Err(e) = simulate(history, thread, self) {
                    if let Err(cleanup) = self.abandon_history_on_thread(thread) {
                        log::error!(
                            "history {history}: failed to discard worker {thread}: {cleanup}"
                        );
                    }
                    return Err(e);
                }
                self.commit_history_contribution_on_thread(thread)
            })
        })
    }

    /// Reduce every estimator and tracker onto `root` (collective).
    ///
    /// Every collective step runs on every rank even after a local failure;
    /// the first error is returned once the group has finished.
    pub fn reduce_data(&self, comm: &dyn Communicator, root: usize) -> Result<()> {
        if root >= comm.size() {
            return Err(Error::Validation(format!(
                "root rank {root} outside group of size {}",
                comm.size()
            )));
        }
        let estimators: Vec<&Estimator> = self.estimators.values().collect();
        let mut outcome = DistributedReducer::reduce(&estimators, comm, root);
        for t in self.trackers.values() {
            let step = t.reduce_data(comm, root);
            outcome = outcome.and(step);
        }
        if comm.size() > 1 {
            let local = self.histories.load(Ordering::Relaxed) as f64;
            let step = comm.sum_to_root(&[local], root).map(|total| {
                let histories = total.map_or(0, |v| v[0] as u64);
                self.histories.store(histories, Ordering::Relaxed);
            });
            outcome = outcome.and(step);
            outcome = outcome.and(comm.barrier());
        }
        outcome
    }

    /// Zero every observer and the history counter.
    pub fn reset_data(&self) {
        for e in self.estimators.values() {
            e.reset_data();
        }
        for t in self.trackers.values() {
            t.clear();
        }
        self.histories.store(0, Ordering::Relaxed);
    }

    /// Histories and per-estimator dropped-event counts; logged at `info`.
    pub fn run_summary(&self) -> RunSummary {
        let summary = RunSummary {
            histories: self.number_of_committed_histories(),
            dropped_events: self
                .estimators
                .iter()
                .map(|(id, e)| (*id, e.dropped_event_count()))
                .collect(),
        };
        log::info!("{summary}");
        summary
    }
}
