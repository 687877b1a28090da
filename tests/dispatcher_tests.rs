//! Dispatcher pipeline tests: store updates, synthetic metrics, record
//! routing flags, and sink fan-out behavior

mod common;

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use common::*;
use doctor::{
    Autohealer, Collector, Dispatcher, DisplayEvent, MetricStore, SampleStreams,
    SAMPLE_STREAM_CAPACITY,
};

fn disabled_healer() -> Autohealer {
    Autohealer::new(
        healer_config(false),
        Arc::new(MockStatusProbe::caught_up()),
        Arc::new(MockServiceManager::default()),
        None,
        CancellationToken::new(),
    )
}

fn build_dispatcher(
    collectors: Vec<Box<dyn Collector>>,
) -> (Dispatcher, SampleStreams) {
    let streams = SampleStreams::new(SAMPLE_STREAM_CAPACITY);
    let store = MetricStore::new(10_000, 60);
    let dispatcher = Dispatcher::new(store, collectors, disabled_healer(), streams.clone());

    (dispatcher, streams)
}

#[tokio::test]
async fn test_sync_sample_emits_expected_records_and_routing_flags() {
    let recorder = RecordingCollector::default();
    let (mut dispatcher, _streams) = build_dispatcher(vec![Box::new(recorder.clone())]);

    let start = Utc::now();

    dispatcher
        .handle_sync_sample(sync_sample("node-1", 100, 3, start))
        .await;
    dispatcher
        .handle_sync_sample(sync_sample("node-1", 105, 3, start + Duration::seconds(1)))
        .await;

    let records = recorder.records.lock().unwrap().clone();

    // first sample has no hash rate yet (a single sync sample), the
    // second one does
    let first_batch: Vec<&str> = records[..4].iter().map(|m| m.name.as_str()).collect();
    assert_eq!(
        first_batch,
        vec![
            "SyncStatus",
            "LatestBlockHeight",
            "SecondsBehindLive",
            "StatusCheckLatencyMilliseconds"
        ]
    );

    let second_batch: Vec<&str> = records[4..].iter().map(|m| m.name.as_str()).collect();
    assert_eq!(
        second_batch,
        vec![
            "BlocksHashedPerSecond",
            "SyncStatus",
            "LatestBlockHeight",
            "SecondsBehindLive",
            "StatusCheckLatencyMilliseconds"
        ]
    );

    for record in &records {
        assert_eq!(record.dimensions.get("node_id").unwrap(), "node-1");

        match record.name.as_str() {
            "BlocksHashedPerSecond" => {
                assert!(record.collect_to_file && record.collect_to_cloudwatch);
                // 5 blocks over 1 second
                assert_eq!(record.value, 5.0);
            }
            "SyncStatus" => {
                assert!(record.collect_to_file && !record.collect_to_cloudwatch);
                assert!(record.data.is_some());
            }
            "LatestBlockHeight" => {
                assert!(!record.collect_to_file && record.collect_to_cloudwatch);
            }
            "SecondsBehindLive" => {
                assert!(!record.collect_to_file && record.collect_to_cloudwatch);
                assert_eq!(record.value, 3.0);
            }
            "StatusCheckLatencyMilliseconds" => {
                assert!(!record.collect_to_file && record.collect_to_cloudwatch);
            }
            other => panic!("unexpected record {}", other),
        }
    }
}

#[tokio::test]
async fn test_uptime_sample_enriches_rolling_average() {
    let recorder = RecordingCollector::default();
    let (mut dispatcher, _streams) = build_dispatcher(vec![Box::new(recorder.clone())]);

    let start = Utc::now();

    dispatcher.handle_uptime_sample(uptime_sample(true, start)).await;
    dispatcher
        .handle_uptime_sample(uptime_sample(false, start + Duration::seconds(5)))
        .await;

    let records = recorder.records.lock().unwrap().clone();

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|record| record.name == "Uptime"));
    assert!(records
        .iter()
        .all(|record| record.collect_to_file && record.collect_to_cloudwatch));

    assert_eq!(records[0].value, 100.0);
    assert_eq!(records[1].value, 50.0);

    assert_eq!(
        records[0].dimensions.get("endpoint_url").unwrap(),
        TEST_ENDPOINT_URL
    );
}

#[tokio::test]
async fn test_sink_error_does_not_suppress_other_sinks() {
    let recorder = RecordingCollector::default();
    let (mut dispatcher, _streams) = build_dispatcher(vec![
        Box::new(FailingCollector),
        Box::new(recorder.clone()),
    ]);

    dispatcher
        .handle_sync_sample(sync_sample("node-1", 100, 3, Utc::now()))
        .await;

    assert_eq!(recorder.records.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn test_display_events_follow_synthesis() {
    let (mut dispatcher, streams) = build_dispatcher(Vec::new());
    let mut display_rx = streams.subscribe_display();

    let start = Utc::now();

    dispatcher
        .handle_sync_sample(sync_sample("node-1", 100, 3, start))
        .await;
    dispatcher.handle_uptime_sample(uptime_sample(true, start)).await;

    match display_rx.recv().await.unwrap() {
        DisplayEvent::SyncStatus {
            sample,
            blocks_per_second,
        } => {
            assert_eq!(sample.node_id, "node-1");
            assert!(blocks_per_second.is_none());
        }
        other => panic!("expected sync display event, got {:?}", other),
    }

    match display_rx.recv().await.unwrap() {
        DisplayEvent::Uptime { sample } => {
            assert_eq!(sample.rolling_avg_percent_available, 100.0);
        }
        other => panic!("expected uptime display event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_run_consumes_streams_until_cancelled() {
    let recorder = RecordingCollector::default();
    let (dispatcher, streams) = build_dispatcher(vec![Box::new(recorder.clone())]);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(dispatcher.run(cancel.clone()));

    streams
        .sync
        .send(sync_sample("node-1", 100, 3, Utc::now()))
        .unwrap();
    streams.uptime.send(uptime_sample(true, Utc::now())).unwrap();

    // give the dispatcher a moment to drain the streams
    for _ in 0..100 {
        if recorder.records.lock().unwrap().len() >= 5 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    cancel.cancel();
    let result = handle.await.unwrap();

    assert!(result.is_ok());
    assert_eq!(recorder.records.lock().unwrap().len(), 5);
}
