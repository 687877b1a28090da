//! Sample dispatch pipeline
//!
//! The dispatcher consumes the probe's sample streams, records samples in
//! the metric store, derives the synthetic metrics, fans typed records out
//! to the collector sinks, publishes display events, and drives the inline
//! healing rules. Nothing inside the loop is fatal except a closed sample
//! stream.

use anyhow::{anyhow, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collect::Collector;
use crate::heal::Autohealer;
use crate::metrics::{HashRateData, Metric, MetricDimensions, SyncStatusSample, UptimeSample};
use crate::render::{DisplayEvent, SampleStreams};
use crate::store::{MetricStore, NodeMetric};

/// Wires probe output to the store, sinks, renderers, and healer
pub struct Dispatcher {
    store: MetricStore,
    collectors: Vec<Box<dyn Collector>>,
    healer: Autohealer,
    streams: SampleStreams,
    sync_rx: Option<tokio::sync::broadcast::Receiver<SyncStatusSample>>,
    uptime_rx: Option<tokio::sync::broadcast::Receiver<UptimeSample>>,
}

impl Dispatcher {
    /// Create a dispatcher subscribed to the given streams. Subscription
    /// happens here so samples published before [`run`](Self::run) starts
    /// are not lost.
    pub fn new(
        store: MetricStore,
        collectors: Vec<Box<dyn Collector>>,
        healer: Autohealer,
        streams: SampleStreams,
    ) -> Self {
        let sync_rx = streams.subscribe_sync();
        let uptime_rx = streams.subscribe_uptime();

        Self {
            store,
            collectors,
            healer,
            streams,
            sync_rx: Some(sync_rx),
            uptime_rx: Some(uptime_rx),
        }
    }

    /// Consume samples until cancelled. Returns an error only when a
    /// sample stream closes underneath the loop.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let mut sync_rx = self
            .sync_rx
            .take()
            .ok_or_else(|| anyhow!("dispatcher is already running"))?;
        let mut uptime_rx = self
            .uptime_rx
            .take()
            .ok_or_else(|| anyhow!("dispatcher is already running"))?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("dispatcher stopping");
                    return Ok(());
                }
                received = sync_rx.recv() => match received {
                    Ok(sample) => self.handle_sync_sample(sample).await,
                    Err(RecvError::Lagged(dropped)) => {
                        warn!("sync sample stream lagged, dropped {} samples", dropped);
                    }
                    Err(RecvError::Closed) => {
                        return Err(anyhow!("sync sample stream closed"));
                    }
                },
                received = uptime_rx.recv() => match received {
                    Ok(sample) => self.handle_uptime_sample(sample).await,
                    Err(RecvError::Lagged(dropped)) => {
                        warn!("uptime sample stream lagged, dropped {} samples", dropped);
                    }
                    Err(RecvError::Closed) => {
                        return Err(anyhow!("uptime sample stream closed"));
                    }
                },
            }
        }
    }

    /// Record the sample, derive the hash rate, and fan out the sync
    /// metric records.
    pub async fn handle_sync_sample(&mut self, sample: SyncStatusSample) {
        self.store
            .add_sample(&sample.node_id, NodeMetric::Sync(sample.clone()));

        let blocks_per_second = match self.store.hash_rate_per_second(&sample.node_id) {
            Ok(rate) => Some(rate),
            Err(e) => {
                debug!(
                    "error {} calculating hash rate for node {}",
                    e, sample.node_id
                );
                None
            }
        };

        let metrics = build_sync_metrics(&sample, blocks_per_second);
        self.collect_metrics(&metrics).await;

        if self
            .streams
            .display
            .send(DisplayEvent::SyncStatus {
                sample: sample.clone(),
                blocks_per_second,
            })
            .is_err()
        {
            debug!("no subscribers for display events");
        }

        self.healer.on_sync_sample(&sample).await;
    }

    /// Record the sample, derive rolling uptime, and fan out the uptime
    /// metric record.
    pub async fn handle_uptime_sample(&mut self, sample: UptimeSample) {
        self.store
            .add_sample(&sample.endpoint_url, NodeMetric::Uptime(sample.clone()));

        let mut sample = sample;

        match self.store.uptime_percent(&sample.endpoint_url) {
            Ok(uptime) => {
                sample.rolling_avg_percent_available = uptime * 100.0;

                let metric = build_uptime_metric(&sample);
                self.collect_metrics(std::slice::from_ref(&metric)).await;

                if self
                    .streams
                    .display
                    .send(DisplayEvent::Uptime {
                        sample: sample.clone(),
                    })
                    .is_err()
                {
                    debug!("no subscribers for display events");
                }
            }
            Err(e) => {
                debug!(
                    "error {} calculating uptime for {}",
                    e, sample.endpoint_url
                );
            }
        }

        self.healer.on_uptime_sample(&sample).await;
    }

    /// Offer every record to every sink; a failing sink never suppresses
    /// the others or stops the loop.
    async fn collect_metrics(&self, metrics: &[Metric]) {
        for metric in metrics {
            for collector in &self.collectors {
                if let Err(e) = collector.collect(metric).await {
                    warn!("error {} collecting metric {}", e, metric.name);
                }
            }
        }
    }
}

fn node_dimensions(node_id: &str) -> MetricDimensions {
    MetricDimensions::from([("node_id".to_string(), node_id.to_string())])
}

fn build_sync_metrics(sample: &SyncStatusSample, blocks_per_second: Option<f32>) -> Vec<Metric> {
    let dimensions = node_dimensions(&sample.node_id);
    let mut metrics = Vec::new();

    if let Some(rate) = blocks_per_second {
        metrics.push(Metric {
            name: "BlocksHashedPerSecond".to_string(),
            dimensions: dimensions.clone(),
            data: serde_json::to_value(HashRateData {
                node_id: sample.node_id.clone(),
                blocks_per_second: rate,
            })
            .ok(),
            value: rate as f64,
            timestamp: sample.sampled_at,
            collect_to_file: true,
            collect_to_cloudwatch: true,
        });
    }

    metrics.push(Metric {
        name: "SyncStatus".to_string(),
        dimensions: dimensions.clone(),
        data: serde_json::to_value(sample).ok(),
        value: 0.0,
        timestamp: sample.sampled_at,
        collect_to_file: true,
        collect_to_cloudwatch: false,
    });

    metrics.push(Metric {
        name: "LatestBlockHeight".to_string(),
        dimensions: dimensions.clone(),
        data: None,
        value: sample.sync_status.latest_block_height as f64,
        timestamp: sample.sampled_at,
        collect_to_file: false,
        collect_to_cloudwatch: true,
    });

    metrics.push(Metric {
        name: "SecondsBehindLive".to_string(),
        dimensions: dimensions.clone(),
        data: None,
        value: sample.seconds_behind_live as f64,
        timestamp: sample.sampled_at,
        collect_to_file: false,
        collect_to_cloudwatch: true,
    });

    metrics.push(Metric {
        name: "StatusCheckLatencyMilliseconds".to_string(),
        dimensions,
        data: None,
        value: sample.sample_latency_milliseconds as f64,
        timestamp: sample.sampled_at,
        collect_to_file: false,
        collect_to_cloudwatch: true,
    });

    metrics
}

fn build_uptime_metric(sample: &UptimeSample) -> Metric {
    Metric {
        name: "Uptime".to_string(),
        dimensions: MetricDimensions::from([(
            "endpoint_url".to_string(),
            sample.endpoint_url.clone(),
        )]),
        data: serde_json::to_value(sample).ok(),
        value: sample.rolling_avg_percent_available as f64,
        timestamp: sample.sampled_at,
        collect_to_file: true,
        collect_to_cloudwatch: true,
    }
}
