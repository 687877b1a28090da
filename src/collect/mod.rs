//! Metric collection sinks
//!
//! A collector delivers metric records to one storage backend. Records carry
//! routing flags deciding which backends act on them; a collector that is
//! not selected by a record treats the call as a no-op.

pub mod cloudwatch;
pub mod file;

use anyhow::Result;
use async_trait::async_trait;

pub use cloudwatch::{CloudWatchCollector, CloudWatchCollectorConfig};
pub use file::{FileCollector, FileCollectorConfig};

use crate::config::{CollectorKind, DoctorConfig};
use crate::metrics::Metric;

/// Sink for metric records, safe for concurrent use
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self, metric: &Metric) -> Result<()>;
}

/// Build the collector set selected by the configuration.
///
/// File collectors open their first output file here; the cloud collector
/// loads AWS configuration and probes for an instance id. Failures surface
/// to the caller and prevent startup.
pub async fn build_collectors(config: &DoctorConfig) -> Result<Vec<Box<dyn Collector>>> {
    let mut collectors: Vec<Box<dyn Collector>> = Vec::new();

    for kind in config.metric_collectors()? {
        match kind {
            CollectorKind::File => {
                let collector = FileCollector::new(FileCollectorConfig::default())?;
                collectors.push(Box::new(collector));
            }
            CollectorKind::Cloudwatch => {
                let collector = CloudWatchCollector::new(CloudWatchCollectorConfig {
                    aws_region: config.aws_region.clone(),
                    metric_namespace: config.metric_namespace.clone(),
                })
                .await?;
                collectors.push(Box::new(collector));
            }
        }
    }

    Ok(collectors)
}
