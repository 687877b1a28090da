//! Shared fixtures: mock capabilities and sample builders
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use doctor::client::{NodeInfo, NodeState, NodeStatusProbe, SyncInfo};
use doctor::heal::{
    AutoscalingClient, AutoscalingMembership, HealerConfig, LifecycleState, ServiceManager,
};
use doctor::metrics::{Metric, SyncStatusSample, UptimeSample};
use doctor::{Collector, HealError};

pub const TEST_ENDPOINT_URL: &str = "https://rpc.example.kava.io";
pub const TEST_SERVICE_NAME: &str = "kava";
pub const TEST_GROUP_NAME: &str = "kava-api-group";
pub const TEST_INSTANCE_ID: &str = "i-0123456789abcdef0";

/// Service manager that records restart requests and can be told to fail
#[derive(Default)]
pub struct MockServiceManager {
    pub restarts: Mutex<Vec<String>>,
    pub attempts: AtomicUsize,
    pub fail: AtomicBool,
}

impl MockServiceManager {
    pub fn restart_count(&self) -> usize {
        self.restarts.lock().unwrap().len()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceManager for MockServiceManager {
    async fn restart(&self, service_name: &str) -> Result<(), HealError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(HealError::ServiceRestart {
                service_name: service_name.to_string(),
                reason: "scripted failure".to_string(),
            });
        }

        self.restarts.lock().unwrap().push(service_name.to_string());
        Ok(())
    }
}

/// Status probe that pops scripted responses, falling back to a healthy
/// caught-up state once the script runs out
pub struct MockStatusProbe {
    responses: Mutex<VecDeque<Result<NodeState>>>,
}

impl MockStatusProbe {
    pub fn caught_up() -> Self {
        Self::with_responses(Vec::new())
    }

    pub fn with_responses(responses: Vec<Result<NodeState>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl NodeStatusProbe for MockStatusProbe {
    async fn status(&self) -> Result<NodeState> {
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            // catching up and current, so standby healing converges
            // without extra restarts
            None => Ok(node_state(1_000_000, Utc::now(), true)),
        }
    }
}

/// Autoscaling client that records calls; describe responses walk a
/// scripted list of lifecycle states and can be gated on a semaphore to
/// hold healing tasks open
#[derive(Default)]
pub struct MockAutoscalingClient {
    pub lifecycle_states: Mutex<VecDeque<LifecycleState>>,
    pub describe_calls: AtomicUsize,
    pub enter_standby_calls: AtomicUsize,
    pub exit_standby_calls: AtomicUsize,
    pub gate: Option<Arc<Semaphore>>,
}

impl MockAutoscalingClient {
    pub fn with_lifecycle_states(states: Vec<LifecycleState>) -> Self {
        Self {
            lifecycle_states: Mutex::new(states.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl AutoscalingClient for MockAutoscalingClient {
    async fn describe(
        &self,
        _instance_id: &str,
    ) -> Result<Vec<AutoscalingMembership>, HealError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate semaphore closed").forget();
        }

        self.describe_calls.fetch_add(1, Ordering::SeqCst);

        let lifecycle_state = self
            .lifecycle_states
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(LifecycleState::InService);

        Ok(vec![AutoscalingMembership {
            group_name: TEST_GROUP_NAME.to_string(),
            lifecycle_state,
        }])
    }

    async fn enter_standby(
        &self,
        _group_name: &str,
        _instance_id: &str,
        _decrement_desired_capacity: bool,
    ) -> Result<(), HealError> {
        self.enter_standby_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn exit_standby(
        &self,
        _group_name: &str,
        _instance_id: &str,
    ) -> Result<(), HealError> {
        self.exit_standby_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Collector that records every record offered to it
#[derive(Clone, Default)]
pub struct RecordingCollector {
    pub records: Arc<Mutex<Vec<Metric>>>,
}

impl RecordingCollector {
    pub fn record_names(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|metric| metric.name.clone())
            .collect()
    }
}

#[async_trait]
impl Collector for RecordingCollector {
    async fn collect(&self, metric: &Metric) -> Result<()> {
        self.records.lock().unwrap().push(metric.clone());
        Ok(())
    }
}

/// Collector that fails every call
pub struct FailingCollector;

#[async_trait]
impl Collector for FailingCollector {
    async fn collect(&self, _metric: &Metric) -> Result<()> {
        Err(anyhow!("sink unavailable"))
    }
}

pub fn node_state(height: i64, latest_block_time: DateTime<Utc>, catching_up: bool) -> NodeState {
    NodeState {
        node_info: NodeInfo {
            id: "test-node".to_string(),
            moniker: "test-moniker".to_string(),
        },
        sync_info: SyncInfo {
            latest_block_height: height,
            latest_block_time,
            catching_up,
        },
    }
}

pub fn sync_sample(
    node_id: &str,
    height: i64,
    seconds_behind_live: i64,
    sampled_at: DateTime<Utc>,
) -> SyncStatusSample {
    SyncStatusSample {
        node_id: node_id.to_string(),
        sync_status: SyncInfo {
            latest_block_height: height,
            latest_block_time: sampled_at,
            catching_up: false,
        },
        seconds_behind_live,
        sample_latency_milliseconds: 25,
        sampled_at,
    }
}

pub fn uptime_sample(up: bool, sampled_at: DateTime<Utc>) -> UptimeSample {
    UptimeSample {
        endpoint_url: TEST_ENDPOINT_URL.to_string(),
        up,
        sampled_at,
        rolling_avg_percent_available: 0.0,
    }
}

/// Healer thresholds sized for direct-drive tests: restarts after 300s of
/// downtime or freeze, with a 2700s delay between restarts and no initial
/// buffer
pub fn healer_config(enabled: bool) -> HealerConfig {
    HealerConfig {
        enabled,
        service_name: TEST_SERVICE_NAME.to_string(),
        sync_latency_tolerance: chrono::Duration::seconds(10),
        sync_to_live_tolerance: chrono::Duration::seconds(12),
        downtime_restart_threshold: chrono::Duration::seconds(300),
        no_new_blocks_restart_threshold: chrono::Duration::seconds(300),
        restart_delay: chrono::Duration::seconds(2700),
        initial_delay: chrono::Duration::seconds(0),
    }
}
