use std::sync::Arc;
use std::time::Duration;

use restamp::stores::IndexStore;
use restamp::{SagaStage, UpdateOptions};

mod common;

#[tokio::test]
async fn cancel_before_start_schedules_nothing() {
    let (fx, study, uids) = common::seeded_study("1.2.840.300", &["i1", "i2"]).await;
    let delta = common::patient_delta("Doe^John");

    let saga = fx.saga();
    saga.cancellation_handle().cancel();

    let result = saga.run(&study, &delta).await.unwrap();

    assert_eq!(result.stage, SagaStage::PartiallyFailed);
    assert_eq!(result.succeeded, 0);
    assert_eq!(result.failed, 2);
    for failure in &result.failures {
        assert!(failure.reason.contains("cancelled"));
    }

    // no index movement, no study-level attribute change
    for uid in &uids {
        assert_eq!(
            fx.index.current_version(uid).await.unwrap(),
            Some(common::baseline_tag())
        );
    }
    assert!(fx.index.study_attributes(&study).await.is_none());
}

#[tokio::test]
async fn cancel_mid_flight_stops_scheduling_and_reports_leftovers() {
    let (fx, study, uids) = common::seeded_study("1.2.840.301", &["i1", "i2", "i3"]).await;
    let delta = common::patient_delta("Doe^John");

    // the first instance's rewrite blocks long enough for the cancel to land
    fx.index.faults.slow("index.current_version", &uids[0].to_string(), 200).await;

    let saga = Arc::new(fx.saga_with(UpdateOptions {
        max_parallel_updates: 1,
        ..Default::default()
    }));
    let handle = saga.cancellation_handle();

    let task = {
        let saga = saga.clone();
        let study = study.clone();
        let delta = delta.clone();
        tokio::spawn(async move { saga.run(&study, &delta).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();
    let result = task.await.unwrap().unwrap();

    // the in-flight rewrite finished naturally, but nothing further was
    // scheduled: no instance reached the index, every one is reported
    assert_eq!(result.stage, SagaStage::PartiallyFailed);
    assert_eq!(result.succeeded, 0);
    assert_eq!(result.failed, 3);
    assert_eq!(fx.index.cas_count(), 0);
    for uid in &uids {
        assert_eq!(
            fx.index.current_version(uid).await.unwrap(),
            Some(common::baseline_tag())
        );
    }

    // never-started instances carry the cancellation reason
    let unstarted: Vec<_> = result
        .failures
        .iter()
        .filter(|f| f.reason.contains("cancelled before"))
        .collect();
    assert_eq!(unstarted.len(), 2);

    // cancelled workflows leave the study-level attributes untouched
    assert!(fx.index.study_attributes(&study).await.is_none());
}
