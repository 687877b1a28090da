//! File collector tests: naming, appending, and routing-flag gating

mod common;

use chrono::Utc;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use common::*;
use doctor::collect::{FileCollector, FileCollectorConfig};
use doctor::metrics::{Metric, MetricDimensions};
use doctor::Collector;

fn file_metric(name: &str, collect_to_file: bool) -> Metric {
    Metric {
        name: name.to_string(),
        dimensions: MetricDimensions::from([(
            "endpoint_url".to_string(),
            TEST_ENDPOINT_URL.to_string(),
        )]),
        data: None,
        value: 1.0,
        timestamp: Utc::now(),
        collect_to_file,
        collect_to_cloudwatch: false,
    }
}

fn metric_files(directory: &Path) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = fs::read_dir(directory)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    files.sort();
    files
}

fn collector_in(directory: &TempDir, suffix: Option<&str>) -> FileCollector {
    FileCollector::new(FileCollectorConfig {
        metric_file_name_suffix: suffix.map(str::to_string),
        file_rotation_interval: None,
        directory: Some(directory.path().to_path_buf()),
    })
    .unwrap()
}

#[tokio::test]
async fn test_collect_appends_concatenated_json_records() {
    let directory = TempDir::new().unwrap();
    let collector = collector_in(&directory, None);

    collector.collect(&file_metric("Uptime", true)).await.unwrap();
    collector
        .collect(&file_metric("SyncStatus", true))
        .await
        .unwrap();

    let files = metric_files(directory.path());
    assert_eq!(files.len(), 1);

    let contents = fs::read_to_string(&files[0]).unwrap();

    // a sequence of concatenated objects, not a JSON array
    let records: Vec<serde_json::Value> = serde_json::Deserializer::from_str(&contents)
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["name"], "Uptime");
    assert_eq!(records[1]["name"], "SyncStatus");
    assert_eq!(
        records[0]["dimensions"]["endpoint_url"],
        TEST_ENDPOINT_URL
    );
}

#[tokio::test]
async fn test_collect_ignores_records_not_routed_to_file() {
    let directory = TempDir::new().unwrap();
    let collector = collector_in(&directory, None);

    collector
        .collect(&file_metric("LatestBlockHeight", false))
        .await
        .unwrap();

    let files = metric_files(directory.path());
    assert_eq!(files.len(), 1);
    assert_eq!(fs::read_to_string(&files[0]).unwrap(), "");
}

#[tokio::test]
async fn test_file_names_use_unix_seconds_prefix_and_suffix() {
    let directory = TempDir::new().unwrap();
    let _collector = collector_in(&directory, None);

    let files = metric_files(directory.path());
    assert_eq!(files.len(), 1);

    let file_name = files[0].file_name().unwrap().to_string_lossy().to_string();
    let prefix = file_name.split('-').next().unwrap();

    assert!(prefix.parse::<i64>().is_ok(), "prefix {} is not unix seconds", prefix);
    assert!(file_name.ends_with("-doctor-metrics.json"));
}

#[tokio::test]
async fn test_custom_file_name_suffix() {
    let directory = TempDir::new().unwrap();
    let collector = collector_in(&directory, Some("node-health.json"));

    collector.collect(&file_metric("Uptime", true)).await.unwrap();

    let files = metric_files(directory.path());
    assert_eq!(files.len(), 1);
    assert!(files[0]
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with("-node-health.json"));
}
