//! CloudWatch-backed metric collection

use anyhow::Result;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_cloudwatch::config::Region;
use aws_sdk_cloudwatch::primitives::DateTime;
use aws_sdk_cloudwatch::types::{Dimension, MetricDatum, StandardUnit};
use aws_sdk_cloudwatch::Client as CloudWatchClient;
use tracing::debug;

use super::Collector;
use crate::imds;
use crate::metrics::Metric;

/// Configuration for a [`CloudWatchCollector`]
#[derive(Debug, Clone)]
pub struct CloudWatchCollectorConfig {
    pub aws_region: String,
    pub metric_namespace: String,
}

/// Collects metrics by putting one datum per record into a CloudWatch
/// namespace. When the process runs on an EC2 host, the instance id is
/// attached as an extra dimension; anywhere else the lookup fails once at
/// construction and is tolerated.
pub struct CloudWatchCollector {
    cloudwatch_client: CloudWatchClient,
    metric_namespace: String,
    instance_id: Option<String>,
}

impl CloudWatchCollector {
    pub async fn new(config: CloudWatchCollectorConfig) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.aws_region))
            .load()
            .await;

        let cloudwatch_client = CloudWatchClient::new(&aws_config);

        let instance_id = match imds::discover_instance_id().await {
            Ok(instance_id) => Some(instance_id),
            Err(e) => {
                debug!("no instance id available for metric dimensions: {}", e);
                None
            }
        };

        Ok(Self {
            cloudwatch_client,
            metric_namespace: config.metric_namespace,
            instance_id,
        })
    }
}

#[async_trait]
impl Collector for CloudWatchCollector {
    async fn collect(&self, metric: &Metric) -> Result<()> {
        if !metric.collect_to_cloudwatch {
            return Ok(());
        }

        let mut dimensions: Vec<Dimension> = metric
            .dimensions
            .iter()
            .map(|(name, value)| Dimension::builder().name(name).value(value).build())
            .collect();

        if let Some(instance_id) = &self.instance_id {
            dimensions.push(
                Dimension::builder()
                    .name("instance-id")
                    .value(instance_id)
                    .build(),
            );
        }

        let datum = MetricDatum::builder()
            .metric_name(&metric.name)
            .set_dimensions(Some(dimensions))
            .timestamp(DateTime::from_millis(metric.timestamp.timestamp_millis()))
            .value(metric.value)
            .unit(StandardUnit::None)
            .build();

        self.cloudwatch_client
            .put_metric_data()
            .namespace(&self.metric_namespace)
            .metric_data(datum)
            .send()
            .await?;

        Ok(())
    }
}
