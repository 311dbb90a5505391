//! Estimator, tracker and handler export into a [`TallyStore`].

use mc_core::{Result, RunStatistics};
use mc_tally::stats::{process_pair, process_quad};
use mc_tally::{Estimator, EventHandler, MomentPair, MomentQuad, ParticleTracker};

use crate::schema::{
    EstimatorMetadata, EstimatorRecord, MomentRecord, ResponseFunctionEntry, TallyStore,
};

/// Types that can write themselves into a tally store.
pub trait ExportData {
    /// Export raw moments, plus processed moments if `include_processed`.
    ///
    /// Processed export needs both `stats` fields set; otherwise this fails
    /// with `StatisticsNotConfigured` and leaves `store` untouched.
    fn export_data(
        &self,
        store: &mut TallyStore,
        include_processed: bool,
        stats: &RunStatistics,
    ) -> Result<()>;
}

impl ExportData for Estimator {
    fn export_data(
        &self,
        store: &mut TallyStore,
        include_processed: bool,
        stats: &RunStatistics,
    ) -> Result<()> {
        export_estimator(self, store, include_processed, stats)
    }
}

impl ExportData for ParticleTracker {
    fn export_data(
        &self,
        store: &mut TallyStore,
        _include_processed: bool,
        _stats: &RunStatistics,
    ) -> Result<()> {
        export_particle_tracker(self, store);
        Ok(())
    }
}

impl ExportData for EventHandler {
    fn export_data(
        &self,
        store: &mut TallyStore,
        include_processed: bool,
        stats: &RunStatistics,
    ) -> Result<()> {
        if include_processed {
            stats.require()?;
        }
        for est in self.estimators() {
            export_estimator(est, store, include_processed, stats)?;
        }
        for tracker in self.particle_trackers() {
            export_particle_tracker(tracker, store);
        }
        Ok(())
    }
}

fn moment_record(
    normalization: f64,
    bins: Vec<MomentPair>,
    totals: Vec<MomentQuad>,
    processed: Option<(f64, u64, f64)>,
) -> MomentRecord {
    let (processed_bin_moments, processed_total_moments) = match processed {
        Some((multiplier, n, time)) => {
            let norm = normalization;
            (
                Some(bins.iter().map(|m| process_pair(m, multiplier, norm, n, time)).collect()),
                Some(totals.iter().map(|q| process_quad(q, multiplier, norm, n, time)).collect()),
            )
        }
        None => (None, None),
    };
    MomentRecord {
        normalization,
        raw_bin_moments: bins,
        raw_total_moments: totals,
        processed_bin_moments,
        processed_total_moments,
    }
}

/// Write `estimator` into `store`, replacing any previous record with its id.
pub fn export_estimator(
    estimator: &Estimator,
    store: &mut TallyStore,
    include_processed: bool,
    stats: &RunStatistics,
) -> Result<()> {
    let processed = if include_processed {
        let (n, time) = stats.require()?;
        Some((estimator.multiplier(), n, time))
    } else {
        None
    };

    let bins = estimator.bin_set();
    let metadata = EstimatorMetadata {
        multiplier: estimator.multiplier(),
        kind: estimator.kind(),
        entity_type: estimator.kind().entity_type(),
        particle_types: estimator.particle_types(),
        response_functions: estimator
            .response_functions()
            .names()
            .into_iter()
            .enumerate()
            .map(|(id, name)| ResponseFunctionEntry { id, name })
            .collect(),
        dimension_ordering: bins.dimension_ordering(),
        bin_boundaries: bins
            .dimension_ordering()
            .into_iter()
            .filter_map(|d| bins.boundaries(d).map(|b| (d, b.clone())))
            .collect(),
        total_normalization: estimator.total_normalization(),
    };

    let entities = estimator
        .entities()
        .iter()
        .map(|e| {
            let record = moment_record(
                e.normalization(),
                e.binned_moments().snapshot(),
                e.total_moments().snapshot(),
                processed,
            );
            (e.id(), record)
        })
        .collect();
    let total = moment_record(
        estimator.total_normalization(),
        estimator.total_bin_moments().snapshot(),
        estimator.total_moments().snapshot(),
        processed,
    );

    if processed.is_some() && total.raw_total_moments.iter().all(|q| q.first == 0.0) {
        log::warn!("estimator {}: exporting processed data with no scores", estimator.id());
    }

    store.estimators.insert(estimator.id(), EstimatorRecord { metadata, entities, total });
    log::info!(
        "exported estimator {} ({} entities, {} bins, processed={})",
        estimator.id(),
        estimator.entities().len(),
        estimator.number_of_bins(),
        include_processed
    );
    Ok(())
}

/// Write a tracker's committed histories into `store`.
pub fn export_particle_tracker(tracker: &ParticleTracker, store: &mut TallyStore) {
    store.particle_trackers.insert(tracker.id(), tracker.data_map());
}
