//! Autohealing rules for the monitored node
//!
//! Three independent rules advance per-endpoint healer state on every probe
//! sample: an offline node is restarted after a continuous downtime window,
//! a frozen node (no new blocks) is restarted after a no-progress window,
//! and a node that falls too far behind live is placed on autoscaling
//! standby until it catches back up. Restarts are rate limited by a shared
//! delay; the standby rule runs as an independent task guarded by a single
//! in-progress claim.

pub mod autoscaling;
pub mod service;

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use autoscaling::{
    AutoscalingClient, AutoscalingMembership, AwsAutoscalingClient, LifecycleState,
};
pub use service::{ServiceManager, SystemdServiceManager};

use crate::client::NodeStatusProbe;
use crate::errors::HealError;
use crate::metrics::{SyncStatusSample, UptimeSample};

const CATCH_UP_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);
const EXIT_STANDBY_RETRY_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// Thresholds and delays driving the healing rules
#[derive(Debug, Clone)]
pub struct HealerConfig {
    /// When false, every rule is a no-op
    pub enabled: bool,

    /// OS service restarted by the offline and frozen rules
    pub service_name: String,

    /// How far behind live the node may fall before standby healing starts
    pub sync_latency_tolerance: Duration,

    /// How close to live the node must resync to before standby healing ends
    pub sync_to_live_tolerance: Duration,

    /// Continuous unreachable window that triggers a restart
    pub downtime_restart_threshold: Duration,

    /// Continuous no-new-block window that triggers a restart
    pub no_new_blocks_restart_threshold: Duration,

    /// Minimum interval between consecutive restarts
    pub restart_delay: Duration,

    /// Grace period after process start during which no restart fires
    pub initial_delay: Duration,
}

/// The autoscaling capability bound to the host it controls
#[derive(Clone)]
pub struct AutoscalingHost {
    pub client: Arc<dyn AutoscalingClient>,
    pub instance_id: String,
}

struct HealerState {
    last_restart_at: Option<DateTime<Utc>>,
    last_new_block_observed_at: DateTime<Utc>,
    last_observed_block_height: i64,
    current_downtime_started_at: Option<DateTime<Utc>>,
    earliest_allowed_restart_at: DateTime<Utc>,
}

/// Per-endpoint healing processor.
///
/// The offline and frozen rules run inline on the caller's task; the
/// out-of-sync rule spawns an independent standby task. The in-progress
/// flag is the only state shared with that task.
pub struct Autohealer {
    config: HealerConfig,
    probe: Arc<dyn NodeStatusProbe>,
    service_manager: Arc<dyn ServiceManager>,
    autoscaling: Option<AutoscalingHost>,
    state: HealerState,
    out_of_sync_in_progress: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl Autohealer {
    /// Create a healer. Passing `autoscaling: None` downgrades the
    /// out-of-sync rule to a logging no-op while the restart rules keep
    /// working.
    pub fn new(
        config: HealerConfig,
        probe: Arc<dyn NodeStatusProbe>,
        service_manager: Arc<dyn ServiceManager>,
        autoscaling: Option<AutoscalingHost>,
        cancel: CancellationToken,
    ) -> Self {
        let now = Utc::now();

        Self {
            state: HealerState {
                last_restart_at: None,
                last_new_block_observed_at: now,
                last_observed_block_height: 0,
                current_downtime_started_at: None,
                earliest_allowed_restart_at: now + config.initial_delay,
            },
            config,
            probe,
            service_manager,
            autoscaling,
            out_of_sync_in_progress: Arc::new(AtomicBool::new(false)),
            cancel,
        }
    }

    /// Whether a standby healing task is currently active
    pub fn healing_in_progress(&self) -> bool {
        self.out_of_sync_in_progress.load(Ordering::SeqCst)
    }

    /// When the node was last restarted by a healing rule
    pub fn last_restart_at(&self) -> Option<DateTime<Utc>> {
        self.state.last_restart_at
    }

    /// Offline rule: restart the service once the endpoint has been
    /// continuously unreachable for longer than the downtime threshold,
    /// rate limited by the restart delay.
    pub async fn on_uptime_sample(&mut self, sample: &UptimeSample) {
        if sample.up {
            if self.state.current_downtime_started_at.take().is_some() {
                info!("node back online at {}", sample.sampled_at);
            }
            return;
        }

        if self.state.current_downtime_started_at.is_none() {
            warn!("node went offline at {}", sample.sampled_at);
            self.state.current_downtime_started_at = Some(sample.sampled_at);
        }

        let Some(downtime_started_at) = self.state.current_downtime_started_at else {
            return;
        };
        let downtime = sample.sampled_at - downtime_started_at;

        if !self.config.enabled {
            return;
        }

        debug!(
            "node has been down for {}s, downtime threshold {}s, restart delay {}s",
            downtime.num_seconds(),
            self.config.downtime_restart_threshold.num_seconds(),
            self.config.restart_delay.num_seconds()
        );

        if self.state.last_restart_at.is_some() {
            // already restarted once for this endpoint; only the restart
            // delay gates further attempts
            if downtime < self.config.restart_delay {
                debug!(
                    "not restarting offline node, down {}s of the {}s restart delay",
                    downtime.num_seconds(),
                    self.config.restart_delay.num_seconds()
                );
                return;
            }
        } else if downtime <= self.config.downtime_restart_threshold {
            debug!(
                "not restarting node, down for {}s, downtime threshold {}s",
                downtime.num_seconds(),
                self.config.downtime_restart_threshold.num_seconds()
            );
            return;
        }

        match self.service_manager.restart(&self.config.service_name).await {
            Ok(()) => {
                self.state.last_restart_at = Some(Utc::now());
                self.state.current_downtime_started_at = None;
                warn!("restarted offline node at {:?}", self.state.last_restart_at);
            }
            Err(e) => {
                warn!("error {} restarting node", e);
            }
        }
    }

    /// Out-of-sync and frozen rules, evaluated against each successful
    /// sync sample.
    pub async fn on_sync_sample(&mut self, sample: &SyncStatusSample) {
        let height = sample.sync_status.latest_block_height;

        if height > self.state.last_observed_block_height {
            self.state.last_new_block_observed_at = sample.sampled_at;
            debug!("node has synched new blocks since last check");
        } else {
            debug!(
                "node has been frozen for {}s since {}",
                (sample.sampled_at - self.state.last_new_block_observed_at).num_seconds(),
                self.state.last_new_block_observed_at
            );
        }
        self.state.last_observed_block_height = height;

        if !self.config.enabled {
            debug!(
                "autoheal not enabled for node {}, skipping autoheal checks",
                sample.node_id
            );
            return;
        }

        self.check_out_of_sync(sample);
        self.check_frozen(sample).await;
    }

    /// Out-of-sync rule: claim the healer and spawn a standby task when
    /// the node trails live beyond the latency tolerance.
    fn check_out_of_sync(&mut self, sample: &SyncStatusSample) {
        if sample.seconds_behind_live <= self.config.sync_latency_tolerance.num_seconds() {
            debug!(
                "node {} is less than {}s behind live, no standby healing needed",
                sample.node_id,
                self.config.sync_latency_tolerance.num_seconds()
            );
            return;
        }

        warn!(
            "node {} is more than {}s behind live: {}s, checking whether it is already being healed",
            sample.node_id,
            self.config.sync_latency_tolerance.num_seconds(),
            sample.seconds_behind_live
        );

        let Some(host) = self.autoscaling.clone() else {
            warn!(
                "autoscaling capability unavailable, cannot place node {} on standby",
                sample.node_id
            );
            return;
        };

        if self.out_of_sync_in_progress.swap(true, Ordering::SeqCst) {
            info!("node {} is currently being autohealed", sample.node_id);
            return;
        }

        let task = StandbyTask {
            node_id: sample.node_id.clone(),
            probe: Arc::clone(&self.probe),
            service_manager: Arc::clone(&self.service_manager),
            host,
            service_name: self.config.service_name.clone(),
            sync_to_live_tolerance: self.config.sync_to_live_tolerance,
            in_progress: Arc::clone(&self.out_of_sync_in_progress),
            cancel: self.cancel.clone(),
        };

        tokio::spawn(task.run());
    }

    /// Frozen rule: restart the service once no new block has been
    /// observed for longer than the no-new-blocks threshold.
    async fn check_frozen(&mut self, sample: &SyncStatusSample) {
        let now = sample.sampled_at;

        if now < self.state.earliest_allowed_restart_at {
            debug!(
                "not restarting frozen node, still in initial restart delay buffer, first restart allowed at {}",
                self.state.earliest_allowed_restart_at
            );
            return;
        }

        let frozen = now - self.state.last_new_block_observed_at;

        if frozen <= self.config.no_new_blocks_restart_threshold {
            debug!(
                "not restarting node, frozen for {}s, frozen threshold {}s",
                frozen.num_seconds(),
                self.config.no_new_blocks_restart_threshold.num_seconds()
            );
            return;
        }

        if self.state.last_restart_at.is_some() && frozen < self.config.restart_delay {
            debug!(
                "not restarting frozen node, frozen {}s of the {}s restart delay",
                frozen.num_seconds(),
                self.config.restart_delay.num_seconds()
            );
            return;
        }

        warn!(
            "autohealing frozen node, last new block observed at {}, frozen threshold {}s",
            self.state.last_new_block_observed_at,
            self.config.no_new_blocks_restart_threshold.num_seconds()
        );

        match self.service_manager.restart(&self.config.service_name).await {
            Ok(()) => {
                self.state.last_restart_at = Some(Utc::now());
                self.state.last_new_block_observed_at = now;
                warn!("restarted frozen node at {:?}", self.state.last_restart_at);
            }
            Err(e) => {
                warn!("error {} restarting node", e);
            }
        }
    }
}

/// One standby-until-caught-up attempt, spawned by the out-of-sync rule
struct StandbyTask {
    node_id: String,
    probe: Arc<dyn NodeStatusProbe>,
    service_manager: Arc<dyn ServiceManager>,
    host: AutoscalingHost,
    service_name: String,
    sync_to_live_tolerance: Duration,
    in_progress: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl StandbyTask {
    async fn run(self) {
        if let Err(e) = self.standby_until_caught_up().await {
            warn!(
                "standby healing for node {} aborted: {}",
                self.node_id, e
            );
        }

        self.in_progress.store(false, Ordering::SeqCst);
        debug!("released out-of-sync healer claim for node {}", self.node_id);
    }

    async fn standby_until_caught_up(&self) -> Result<(), HealError> {
        let memberships = self.host.client.describe(&self.host.instance_id).await?;

        if memberships.len() != 1 {
            return Err(HealError::MembershipNotFound {
                instance_id: self.host.instance_id.clone(),
                matches: memberships.len(),
            });
        }

        let membership = &memberships[0];

        if membership.lifecycle_state != LifecycleState::Standby {
            self.host
                .client
                .enter_standby(&membership.group_name, &self.host.instance_id, true)
                .await?;

            info!(
                "host entered standby with autoscaling group {}",
                membership.group_name
            );
        } else {
            info!("host is already in standby with the autoscaling group");
        }

        // a node that trails live but does not report catching-up has a
        // wedged sync; restart it before waiting for convergence
        match self.probe.status().await {
            Ok(state) if !state.sync_info.catching_up => {
                info!(
                    "node {} is out of sync and doesn't know it, restarting {}",
                    self.node_id, self.service_name
                );
                if let Err(e) = self.service_manager.restart(&self.service_name).await {
                    warn!("error {} restarting service while on standby", e);
                }
            }
            Ok(_) => {
                info!(
                    "node {} is out of sync and knows it, not restarting",
                    self.node_id
                );
            }
            Err(e) => {
                warn!("error {} getting node status", e);
            }
        }

        self.wait_for_catch_up().await?;
        self.return_to_service().await
    }

    async fn wait_for_catch_up(&self) -> Result<(), HealError> {
        loop {
            match self.probe.status().await {
                Ok(state) => {
                    let behind = (Utc::now() - state.sync_info.latest_block_time).num_seconds();

                    if behind <= self.sync_to_live_tolerance.num_seconds() {
                        info!(
                            "node {} caught back up to live, {}s behind",
                            self.node_id, behind
                        );
                        return Ok(());
                    }

                    debug!(
                        "node {} is still catching up, {}s behind live",
                        self.node_id, behind
                    );
                }
                Err(e) => {
                    warn!("error {} getting node status", e);
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(HealError::Cancelled {
                        operation: "waiting for node to catch up",
                    });
                }
                _ = tokio::time::sleep(CATCH_UP_POLL_INTERVAL) => {}
            }
        }
    }

    async fn return_to_service(&self) -> Result<(), HealError> {
        loop {
            match self.host.client.describe(&self.host.instance_id).await {
                Ok(memberships) if memberships.len() == 1 => {
                    let membership = &memberships[0];

                    if membership.lifecycle_state == LifecycleState::InService {
                        info!(
                            "host exited standby with autoscaling group {}",
                            membership.group_name
                        );
                        return Ok(());
                    }

                    if let Err(e) = self
                        .host
                        .client
                        .exit_standby(&membership.group_name, &self.host.instance_id)
                        .await
                    {
                        warn!("error {} attempting to exit standby", e);
                    }
                }
                Ok(memberships) => {
                    warn!(
                        "expected exactly one autoscaling record for instance {}, got {}",
                        self.host.instance_id,
                        memberships.len()
                    );
                }
                Err(e) => {
                    warn!("error {} checking autoscaling state", e);
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(HealError::Cancelled {
                        operation: "waiting to exit standby",
                    });
                }
                _ = tokio::time::sleep(EXIT_STANDBY_RETRY_INTERVAL) => {}
            }
        }
    }
}
