//! Metric records and probe sample types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::client::SyncInfo;

/// Arbitrary key/value tags attached to a metric during collection
pub type MetricDimensions = HashMap<String, String>;

/// A single metric record handed to the collector sinks.
///
/// The routing flags decide which sinks act on the record; they are
/// transport metadata and are not serialized with the payload.
#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    pub name: String,
    pub dimensions: MetricDimensions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    pub collect_to_file: bool,
    #[serde(skip)]
    pub collect_to_cloudwatch: bool,
}

/// Sync state observed for a single node on one probe tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatusSample {
    pub node_id: String,
    pub sync_status: SyncInfo,
    pub seconds_behind_live: i64,
    pub sample_latency_milliseconds: i64,
    pub sampled_at: DateTime<Utc>,
}

/// Availability observed for the endpoint on one probe tick.
///
/// `rolling_avg_percent_available` is filled in by the dispatcher after
/// uptime synthesis, not by the probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UptimeSample {
    pub endpoint_url: String,
    pub up: bool,
    pub sampled_at: DateTime<Utc>,
    pub rolling_avg_percent_available: f32,
}

/// Payload for the blocks-per-second synthetic metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashRateData {
    pub node_id: String,
    pub blocks_per_second: f32,
}
