//! Export of a fully configured estimator.

use approx::assert_relative_eq;
use mc_core::{Error, ParticleState, ParticleType, RunStatistics};
use mc_store::{ExportData, SCHEMA_VERSION, TallyStore, export_estimator};
use mc_tally::{
    Dimension, Estimator, EstimatorKind, EventHandler, ParticleTracker, PhaseSpacePoint,
    ResponseFunction, ResponseFunctionSet, ResponseKind,
};

fn scenario_estimator() -> Estimator {
    let mut est =
        Estimator::new(0, 10.0, EstimatorKind::CellCollisionFlux, &[(0, 1.0), (1, 2.0)]).unwrap();
    est.set_continuous_bins(Dimension::Energy, &[0.0, 0.1, 1.0]).unwrap();
    est.set_continuous_bins(Dimension::Cosine, &[-1.0, 0.0, 1.0]).unwrap();
    est.set_continuous_bins(Dimension::Time, &[0.0, 1.0, 2.0]).unwrap();
    est.set_collision_number_bins(&[0, 1]).unwrap();
    est
}

fn one_history(est: &Estimator) {
    let p = ParticleState::new(0, ParticleType::Photon).with_energy(1.0);
    let point = PhaseSpacePoint::new(1.0, 1.0, 2.0, 0);
    for entity in [0, 1] {
        est.add_partial_history_contribution_on_thread(0, entity, &point, &p, 1.0).unwrap();
    }
    est.commit_history_contribution_on_thread(0).unwrap();
}

#[test]
fn scenario_raw_and_processed() {
    let est = scenario_estimator();
    one_history(&est);
    let mut store = TallyStore::new();
    est.export_data(&mut store, true, &RunStatistics::new(1, 1.0)).unwrap();

    let record = store.estimator(0).unwrap();
    assert_eq!(record.metadata.multiplier, 10.0);
    assert_eq!(
        record.metadata.dimension_ordering,
        vec![Dimension::Energy, Dimension::Cosine, Dimension::Time, Dimension::CollisionNumber]
    );
    assert_eq!(record.metadata.total_normalization, 3.0);
    assert_eq!(record.metadata.response_functions[0].name, "default");

    let e0 = &record.entities[&0];
    assert_eq!(e0.normalization, 1.0);
    assert_eq!(e0.raw_bin_moments.len(), 16);
    for (bin, m) in e0.raw_bin_moments.iter().enumerate() {
        let expected = if bin == 7 { (1.0, 1.0) } else { (0.0, 0.0) };
        assert_eq!((m.first, m.second), expected, "bin {bin}");
    }
    let processed = e0.processed_bin_moments.as_ref().unwrap();
    assert_relative_eq!(processed[7].mean, 10.0);
    assert_eq!(processed[7].relative_error, 0.0);
    assert_eq!(processed[0].mean, 0.0);

    // One history: higher diagnostics cannot be estimated.
    let total = &e0.processed_total_moments.as_ref().unwrap()[0];
    assert_relative_eq!(total.mean, 10.0);
    assert_eq!(total.relative_error, 0.0);
    assert_eq!(total.variance_of_variance, 0.0);
    assert_eq!(total.figure_of_merit, 0.0);

    let e1 = &record.entities[&1];
    assert_relative_eq!(e1.processed_bin_moments.as_ref().unwrap()[7].mean, 5.0);

    // Estimator-wide: one history scored 2 in bin 7, normalized by 3.
    assert_eq!(record.total.raw_bin_moments[7].second, 4.0);
    assert_relative_eq!(record.total.processed_bin_moments.as_ref().unwrap()[7].mean, 20.0 / 3.0);
}

#[test]
fn processed_export_requires_statistics() {
    let est = scenario_estimator();
    one_history(&est);
    let mut store = TallyStore::new();

    let err = export_estimator(&est, &mut store, true, &RunStatistics::default()).unwrap_err();
    assert!(matches!(err, Error::StatisticsNotConfigured(_)));
    assert!(store.estimators.is_empty());

    let mut partial = RunStatistics::default();
    partial.set_number_of_histories(1);
    assert!(export_estimator(&est, &mut store, true, &partial).is_err());
    assert!(store.estimators.is_empty());

    // A failed export leaves the moments in place for the retry.
    export_estimator(&est, &mut store, true, &RunStatistics::new(1, 1.0)).unwrap();
    assert_eq!(store.estimator(0).unwrap().entities[&0].raw_bin_moments[7].first, 1.0);
}

#[test]
fn raw_export_skips_processed_fields() {
    let est = scenario_estimator();
    let mut store = TallyStore::new();
    export_estimator(&est, &mut store, false, &RunStatistics::default()).unwrap();
    let json = store.to_json_string().unwrap();
    assert!(json.contains(SCHEMA_VERSION));
    assert!(!json.contains("processed_bin_moments"));
}

#[test]
fn export_is_idempotent() {
    let mut est = scenario_estimator();
    est.set_response_functions(
        ResponseFunctionSet::new(vec![
            ResponseFunction::unit(),
            ResponseFunction::new("window", ResponseKind::EnergyWindow { lower: 0.5, upper: 2.0 }),
        ])
        .unwrap(),
    )
    .unwrap();
    one_history(&est);
    let stats = RunStatistics::new(1, 2.0);

    let mut first = TallyStore::new();
    est.export_data(&mut first, true, &stats).unwrap();
    let mut second = first.clone();
    est.export_data(&mut second, true, &stats).unwrap();
    assert_eq!(first.to_json_string().unwrap(), second.to_json_string().unwrap());
}

#[test]
fn store_survives_save_and_load() {
    let mut handler = EventHandler::new();
    let est = scenario_estimator();
    one_history(&est);
    handler.add_estimator(est).unwrap();

    let tracker = ParticleTracker::new(9, 1);
    let mut p = ParticleState::new(0, ParticleType::Photon);
    p.gone = true;
    let (start, end) = ([0.0; 3], [0.0, 0.0, 1.0]);
    tracker.update_from_global_particle_subtrack_ending_event_on_thread(0, &p, start, end).unwrap();
    tracker.commit_history_contribution_on_thread(0).unwrap();
    handler.add_particle_tracker(tracker).unwrap();

    let mut store = TallyStore::new();
    handler.export_data(&mut store, true, &RunStatistics::new(1, 1.0)).unwrap();
    assert_eq!(store.particle_trackers[&9].len(), 1);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.json");
    store.save(&path).unwrap();
    let loaded = TallyStore::load(&path).unwrap();
    let (before, after) = (store.estimator(0).unwrap(), loaded.estimator(0).unwrap());
    assert_eq!(after.metadata, before.metadata);
    assert_eq!(after.entities[&1].raw_bin_moments, before.entities[&1].raw_bin_moments);
    assert_eq!(after.total.raw_total_moments, before.total.raw_total_moments);
    assert_eq!(loaded.particle_trackers, store.particle_trackers);
    assert_eq!(loaded.particle_trackers[&9][&0][&ParticleType::Photon][&0][&0][&0].len(), 2);
}

#[test]
fn handler_export_checks_statistics_first() {
    let mut handler = EventHandler::new();
    handler.add_estimator(scenario_estimator()).unwrap();
    let mut store = TallyStore::new();
    assert!(handler.export_data(&mut store, true, &RunStatistics::default()).is_err());
    assert!(store.estimators.is_empty());
}
