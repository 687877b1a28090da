//! Sample streams and the plain console renderer
//!
//! Renderers are read-only consumers: they subscribe to broadcast streams
//! and never touch the metric store directly. The bounded streams drop
//! their oldest entries when a consumer lags, which each consumer observes
//! and reports.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::metrics::{SyncStatusSample, UptimeSample};

pub const SAMPLE_STREAM_CAPACITY: usize = 1024;

/// A fully processed observation, ready for display
#[derive(Debug, Clone)]
pub enum DisplayEvent {
    SyncStatus {
        sample: SyncStatusSample,
        blocks_per_second: Option<f32>,
    },
    Uptime {
        sample: UptimeSample,
    },
}

/// The set of broadcast streams connecting probe, dispatcher, and
/// renderers. Cloning shares the underlying channels.
#[derive(Clone)]
pub struct SampleStreams {
    /// Raw sync-status samples from the probe
    pub sync: broadcast::Sender<SyncStatusSample>,
    /// Raw uptime samples from the probe
    pub uptime: broadcast::Sender<UptimeSample>,
    /// Post-synthesis events from the dispatcher
    pub display: broadcast::Sender<DisplayEvent>,
}

impl SampleStreams {
    pub fn new(capacity: usize) -> Self {
        let (sync, _) = broadcast::channel(capacity);
        let (uptime, _) = broadcast::channel(capacity);
        let (display, _) = broadcast::channel(capacity);

        Self {
            sync,
            uptime,
            display,
        }
    }

    pub fn subscribe_sync(&self) -> broadcast::Receiver<SyncStatusSample> {
        self.sync.subscribe()
    }

    pub fn subscribe_uptime(&self) -> broadcast::Receiver<UptimeSample> {
        self.uptime.subscribe()
    }

    pub fn subscribe_display(&self) -> broadcast::Receiver<DisplayEvent> {
        self.display.subscribe()
    }
}

impl Default for SampleStreams {
    fn default() -> Self {
        Self::new(SAMPLE_STREAM_CAPACITY)
    }
}

/// Prints processed observations as plain lines on stdout
pub struct ConsoleRenderer {
    endpoint_url: String,
    events: broadcast::Receiver<DisplayEvent>,
}

impl ConsoleRenderer {
    pub fn new(endpoint_url: String, events: broadcast::Receiver<DisplayEvent>) -> Self {
        Self {
            endpoint_url,
            events,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("console renderer stopping");
                    return;
                }
                received = self.events.recv() => match received {
                    Ok(event) => self.render(&event),
                    Err(broadcast::error::RecvError::Lagged(dropped)) => {
                        warn!("console renderer lagged, dropped {} events", dropped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    }

    fn render(&self, event: &DisplayEvent) {
        match event {
            DisplayEvent::SyncStatus {
                sample,
                blocks_per_second,
            } => match blocks_per_second {
                Some(rate) => println!(
                    "{} node {} is synched up to block {}, {} seconds behind live, hashing {} blocks per second, status check took {} milliseconds",
                    self.endpoint_url,
                    sample.node_id,
                    sample.sync_status.latest_block_height,
                    sample.seconds_behind_live,
                    rate,
                    sample.sample_latency_milliseconds
                ),
                None => println!(
                    "{} node {} is synched up to block {}, {} seconds behind live, status check took {} milliseconds",
                    self.endpoint_url,
                    sample.node_id,
                    sample.sync_status.latest_block_height,
                    sample.seconds_behind_live,
                    sample.sample_latency_milliseconds
                ),
            },
            DisplayEvent::Uptime { sample } => println!(
                "{} uptime {}%",
                sample.endpoint_url, sample.rolling_avg_percent_available
            ),
        }
    }
}
