//! Timer-driven sampling of the monitored node

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::NodeStatusProbe;
use crate::metrics::{SyncStatusSample, UptimeSample};
use crate::render::SampleStreams;

/// Samples the node's status on a fixed interval and publishes the
/// results to the sample streams.
///
/// Publishing never blocks: the streams are bounded and drop their oldest
/// entries under pressure, so a slow consumer can never stall the ticker.
pub struct NodeProbe {
    probe: Arc<dyn NodeStatusProbe>,
    endpoint_url: String,
    monitoring_interval: Duration,
    streams: SampleStreams,
}

impl NodeProbe {
    pub fn new(
        probe: Arc<dyn NodeStatusProbe>,
        endpoint_url: String,
        monitoring_interval: Duration,
        streams: SampleStreams,
    ) -> Self {
        Self {
            probe,
            endpoint_url,
            monitoring_interval,
            streams,
        }
    }

    /// Run the sampling loop until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.monitoring_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("probe loop for {} stopping", self.endpoint_url);
                    return;
                }
                _ = ticker.tick() => {
                    self.sample_once().await;
                }
            }
        }
    }

    /// Take one status sample, timing the request, and publish an uptime
    /// sample (always) and a sync-status sample (on success).
    async fn sample_once(&self) {
        let sampled_at = Utc::now();
        let status_check_started = Instant::now();

        let status = self.probe.status().await;

        let sample_latency_milliseconds = status_check_started.elapsed().as_millis() as i64;

        let uptime_sample = UptimeSample {
            endpoint_url: self.endpoint_url.clone(),
            up: status.is_ok(),
            sampled_at,
            rolling_avg_percent_available: 0.0,
        };

        match status {
            Ok(state) => {
                let seconds_behind_live = (Utc::now() - state.sync_info.latest_block_time)
                    .num_seconds()
                    .max(0);

                let sync_sample = SyncStatusSample {
                    node_id: state.node_info.id,
                    sync_status: state.sync_info,
                    seconds_behind_live,
                    sample_latency_milliseconds,
                    sampled_at,
                };

                debug!(
                    "node {} at block {}, {}s behind live, status check took {}ms",
                    sync_sample.node_id,
                    sync_sample.sync_status.latest_block_height,
                    seconds_behind_live,
                    sample_latency_milliseconds
                );

                if self.streams.sync.send(sync_sample).is_err() {
                    debug!("no subscribers for sync status samples");
                }
            }
            Err(e) => {
                warn!("error {} getting node status", e);
            }
        }

        if self.streams.uptime.send(uptime_sample).is_err() {
            debug!("no subscribers for uptime samples");
        }
    }
}
