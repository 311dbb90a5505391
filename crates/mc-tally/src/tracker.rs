//! Trajectory capture for the first few histories of a run.
//!
//! Samples are keyed `history → particle type → generation → collision
//! number → sub-track index`. A sub-track continues while each new segment
//! starts where the previous one ended; any jump opens a new sub-track.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use mc_core::{Communicator, Error, ObserverId, ParticleState, ParticleType, Result};
use serde::{Deserialize, Serialize};

use crate::estimator::current_worker_index;

/// One trajectory point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    /// Position.
    pub position: [f64; 3],
    /// Direction cosines.
    pub direction: [f64; 3],
    /// Energy (MeV).
    pub energy: f64,
    /// Collision number.
    pub collision_number: u32,
    /// Statistical weight.
    pub weight: f64,
}

impl TrajectorySample {
    fn at(particle: &ParticleState, position: [f64; 3]) -> Self {
        Self {
            position,
            direction: particle.direction,
            energy: particle.energy,
            collision_number: particle.collision_number,
            weight: particle.weight,
        }
    }
}

/// Sub-track index → samples.
pub type SubtrackMap = BTreeMap<u32, Vec<TrajectorySample>>;
/// Particle type → generation → collision number → sub-tracks.
pub type ParticleMap = BTreeMap<ParticleType, BTreeMap<u32, BTreeMap<u32, SubtrackMap>>>;
/// History number → per-particle data.
pub type HistoryMap = BTreeMap<u64, ParticleMap>;

#[derive(Debug, Default)]
struct PartialHistory {
    history: Option<u64>,
    particles: ParticleMap,
    /// `(type, generation, particle id)` of particles not yet gone.
    alive: BTreeSet<(ParticleType, u32, u64)>,
}

impl PartialHistory {
    fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
}

/// Records sub-track endpoints per history.
#[derive(Debug)]
pub struct ParticleTracker {
    id: ObserverId,
    histories_to_track: u64,
    partial: Vec<Mutex<PartialHistory>>,
    data: Mutex<HistoryMap>,
}

impl ParticleTracker {
    /// Track histories `0..histories_to_track`.
    pub fn new(id: ObserverId, histories_to_track: u64) -> Self {
        Self {
            id,
            histories_to_track,
            partial: vec![Mutex::default()],
            data: Mutex::new(HistoryMap::new()),
        }
    }

    /// Tracker id.
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Histories with a number below this are recorded.
    pub fn number_of_histories_to_track(&self) -> u64 {
        self.histories_to_track
    }

    /// Grow to `threads` partial-history buffers (never shrinks).
    pub fn enable_thread_support(&mut self, threads: usize) {
        if threads > self.partial.len() {
            self.partial.resize_with(threads, Default::default);
        }
    }

    fn partial_for(&self, thread: usize) -> Result<&Mutex<PartialHistory>> {
        self.partial.get(thread).ok_or_else(|| {
            Error::Validation(format!("particle tracker {}: worker {thread} not enabled", self.id))
        })
    }

    /// Record the segment `start → end` of `particle` on the calling worker.
    pub fn update_from_global_particle_subtrack_ending_event(
        &self,
        particle: &ParticleState,
        start: [f64; 3],
        end: [f64; 3],
    ) -> Result<()> {
        self.update_from_global_particle_subtrack_ending_event_on_thread(
            current_worker_index(),
            particle,
            start,
            end,
        )
    }

    /// As above on an explicit worker buffer.
    pub fn update_from_global_particle_subtrack_ending_event_on_thread(
        &self,
        thread: usize,
        particle: &ParticleState,
        start: [f64; 3],
        end: [f64; 3],
    ) -> Result<()> {
        if particle.history_number >= self.histories_to_track {
            return Ok(());
        }
        let mut partial = self.partial_for(thread)?.lock().expect("tracker mutex poisoned");

        // A new history on this worker flushes the previous one.
        if partial.history.is_some_and(|h| h != particle.history_number) && !partial.is_empty() {
            let finished = std::mem::take(&mut *partial);
            self.store(finished);
        }
        partial.history = Some(particle.history_number);

        let subtracks = partial
            .particles
            .entry(particle.particle_type)
            .or_default()
            .entry(particle.generation)
            .or_default()
            .entry(particle.collision_number)
            .or_default();

        let continues = subtracks
            .values()
            .next_back()
            .and_then(|samples| samples.last())
            .is_some_and(|last| last.position == start);
        if continues {
            if let Some((_, samples)) = subtracks.iter_mut().next_back() {
                samples.push(TrajectorySample::at(particle, end));
            }
        } else {
            let index = subtracks.len() as u32;
            subtracks.insert(
                index,
                vec![TrajectorySample::at(particle, start), TrajectorySample::at(particle, end)],
            );
        }

        let key = (particle.particle_type, particle.generation, particle.particle_id);
        if particle.gone {
            partial.alive.remove(&key);
        } else {
            partial.alive.insert(key);
        }
        Ok(())
    }

    /// True once every particle recorded on the calling worker is gone.
    pub fn is_particle_reset(&self) -> bool {
        self.is_particle_reset_on_thread(current_worker_index())
    }

    /// True once every particle recorded on worker `thread` is gone.
    pub fn is_particle_reset_on_thread(&self, thread: usize) -> bool {
        self.partial
            .get(thread)
            .is_none_or(|p| p.lock().expect("tracker mutex poisoned").alive.is_empty())
    }

    /// Move the calling worker's history into the data map.
    pub fn commit_history_contribution(&self) -> Result<()> {
        self.commit_history_contribution_on_thread(current_worker_index())
    }

    /// Move worker `thread`'s history into the data map.
    pub fn commit_history_contribution_on_thread(&self, thread: usize) -> Result<()> {
        let mut partial = self.partial_for(thread)?.lock().expect("tracker mutex poisoned");
        let finished = std::mem::take(&mut *partial);
        drop(partial);
        self.store(finished);
        Ok(())
    }

    /// Discard the in-flight history of worker `thread` without storing it.
    pub fn reset_thread_partial(&self, thread: usize) -> Result<()> {
        let mut partial = self.partial_for(thread)?.lock().expect("tracker mutex poisoned");
        *partial = PartialHistory::default();
        Ok(())
    }

    fn store(&self, partial: PartialHistory) {
        let Some(history) = partial.history else {
            return;
        };
        if partial.particles.is_empty() {
            return;
        }
        let mut data = self.data.lock().expect("tracker mutex poisoned");
        merge_particles(data.entry(history).or_default(), partial.particles);
    }

    /// Copy of the committed histories.
    pub fn data_map(&self) -> HistoryMap {
        self.data.lock().expect("tracker mutex poisoned").clone()
    }

    /// Number of committed histories.
    pub fn number_of_tracked_histories(&self) -> usize {
        self.data.lock().expect("tracker mutex poisoned").len()
    }

    /// Drop committed and in-flight data.
    pub fn clear(&self) {
        self.data.lock().expect("tracker mutex poisoned").clear();
        for p in &self.partial {
            *p.lock().expect("tracker mutex poisoned") = PartialHistory::default();
        }
    }

    /// Union every rank's data map onto `root`; other ranks are cleared.
    pub fn reduce_data(&self, comm: &dyn Communicator, root: usize) -> Result<()> {
        if root >= comm.size() {
            return Err(Error::Validation(format!(
                "root rank {root} outside group of size {}",
                comm.size()
            )));
        }
        if comm.size() == 1 {
            return Ok(());
        }

        let payload = serde_json::to_vec(&*self.data.lock().expect("tracker mutex poisoned"))?;
        let outcome = match comm.gather_bytes(payload, root) {
            Ok(Some(gathered)) => self.merge_gathered(comm.rank(), &gathered),
            Ok(None) => {
                self.clear();
                Ok(())
            }
            Err(e) => Err(e),
        };
        comm.barrier()?;
        outcome
    }

    fn merge_gathered(&self, own_rank: usize, gathered: &[Vec<u8>]) -> Result<()> {
        let mut data = self.data.lock().expect("tracker mutex poisoned");
        for (rank, bytes) in gathered.iter().enumerate() {
            if rank == own_rank {
                continue;
            }
            let remote: HistoryMap = serde_json::from_slice(bytes)?;
            for (history, particles) in remote {
                if data.contains_key(&history) {
                    log::warn!(
                        "particle tracker {}: history {history} reported by several ranks",
                        self.id
                    );
                }
                merge_particles(data.entry(history).or_default(), particles);
            }
        }
        log::info!("particle tracker {}: {} histories after reduction", self.id, data.len());
        Ok(())
    }
}

fn merge_particles(into: &mut ParticleMap, from: ParticleMap) {
    for (ptype, generations) in from {
        let g_into = into.entry(ptype).or_default();
        for (generation, collisions) in generations {
            let c_into = g_into.entry(generation).or_default();
            for (collision, subtracks) in collisions {
                let s_into = c_into.entry(collision).or_default();
                for (_, samples) in subtracks {
                    let index = s_into.len() as u32;
                    s_into.insert(index, samples);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::LocalGroup;

    fn photon(history: u64) -> ParticleState {
        ParticleState::new(history, ParticleType::Photon)
    }

    fn segment(tracker: &ParticleTracker, p: &ParticleState, start: [f64; 3], end: [f64; 3]) {
        tracker
            .update_from_global_particle_subtrack_ending_event_on_thread(0, p, start, end)
            .unwrap();
    }

    #[test]
    fn test_continuous_segments_share_a_subtrack() {
        let tracker = ParticleTracker::new(0, 10);
        let p = photon(0);
        segment(&tracker, &p, [0.0; 3], [1.0, 0.0, 0.0]);
        segment(&tracker, &p, [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]);
        segment(&tracker, &p, [5.0, 0.0, 0.0], [6.0, 0.0, 0.0]);
        assert!(!tracker.is_particle_reset_on_thread(0));
        tracker.commit_history_contribution_on_thread(0).unwrap();

        let map = tracker.data_map();
        let subtracks = &map[&0][&ParticleType::Photon][&0][&0];
        assert_eq!(subtracks.len(), 2);
        assert_eq!(subtracks[&0].len(), 3);
        assert_eq!(subtracks[&1][1].position, [6.0, 0.0, 0.0]);
        assert!(tracker.is_particle_reset_on_thread(0));
    }

    #[test]
    fn test_gone_particle_resets() {
        let tracker = ParticleTracker::new(0, 10);
        let mut p = photon(1);
        segment(&tracker, &p, [0.0; 3], [1.0; 3]);
        assert!(!tracker.is_particle_reset_on_thread(0));
        p.gone = true;
        segment(&tracker, &p, [1.0; 3], [2.0; 3]);
        assert!(tracker.is_particle_reset_on_thread(0));
    }

    #[test]
    fn test_sibling_particles_tracked_separately() {
        let tracker = ParticleTracker::new(0, 10);
        let source = ParticleState::new(0, ParticleType::Neutron);
        let mut first = source.secondary(ParticleType::Photon, 1);
        let mut second = source.secondary(ParticleType::Photon, 2);
        segment(&tracker, &first, [0.0; 3], [1.0; 3]);
        segment(&tracker, &second, [0.0; 3], [-1.0; 3]);

        first.gone = true;
        segment(&tracker, &first, [1.0; 3], [2.0; 3]);
        assert!(!tracker.is_particle_reset_on_thread(0));

        second.gone = true;
        segment(&tracker, &second, [-1.0; 3], [-2.0; 3]);
        assert!(tracker.is_particle_reset_on_thread(0));
    }

    #[test]
    fn test_untracked_histories_ignored_and_history_switch_flushes() {
        let tracker = ParticleTracker::new(0, 2);
        segment(&tracker, &photon(5), [0.0; 3], [1.0; 3]);
        segment(&tracker, &photon(0), [0.0; 3], [1.0; 3]);
        segment(&tracker, &photon(1), [0.0; 3], [1.0; 3]);
        assert_eq!(tracker.number_of_tracked_histories(), 1);
        tracker.commit_history_contribution_on_thread(0).unwrap();
        assert_eq!(tracker.data_map().keys().copied().collect::<Vec<_>>(), vec![0, 1]);

        tracker.clear();
        assert!(tracker.data_map().is_empty());
    }

    #[test]
    fn test_reset_thread_partial_discards_history() {
        let tracker = ParticleTracker::new(0, 10);
        segment(&tracker, &photon(0), [0.0; 3], [1.0; 3]);
        tracker.reset_thread_partial(0).unwrap();
        assert!(tracker.is_particle_reset_on_thread(0));
        tracker.commit_history_contribution_on_thread(0).unwrap();
        assert_eq!(tracker.number_of_tracked_histories(), 0);
        assert!(tracker.reset_thread_partial(3).is_err());
    }

    #[test]
    fn test_reduce_unions_histories() {
        let comms = LocalGroup::new(2).unwrap();
        let trackers: Vec<ParticleTracker> = (0..2).map(|_| ParticleTracker::new(7, 10)).collect();
        for (rank, t) in trackers.iter().enumerate() {
            segment(t, &photon(rank as u64), [0.0; 3], [1.0; 3]);
            t.commit_history_contribution_on_thread(0).unwrap();
        }
        std::thread::scope(|scope| {
            for (c, t) in comms.iter().zip(&trackers) {
                scope.spawn(move || t.reduce_data(c, 0).unwrap());
            }
        });
        assert_eq!(trackers[0].data_map().len(), 2);
        assert!(trackers[1].data_map().is_empty());
    }
}
