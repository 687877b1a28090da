//! EC2 instance metadata lookups
//!
//! The daemon attaches host identity to cloud metrics and autoscaling
//! actions when it runs on an EC2 instance. Discovery is a one-shot,
//! short-timeout call at construction; off-cloud hosts simply fail it.

use anyhow::{anyhow, Result};
use std::time::Duration;

const METADATA_BASE_URL: &str = "http://169.254.169.254";
const METADATA_TIMEOUT: Duration = Duration::from_secs(2);

/// Fetch the instance id of the host from the EC2 metadata service (IMDSv2)
pub async fn discover_instance_id() -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(METADATA_TIMEOUT)
        .build()
        .map_err(|e| anyhow!("failed to create metadata client: {}", e))?;

    let token = client
        .put(format!("{}/latest/api/token", METADATA_BASE_URL))
        .header("X-aws-ec2-metadata-token-ttl-seconds", "60")
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let instance_id = client
        .get(format!("{}/latest/meta-data/instance-id", METADATA_BASE_URL))
        .header("X-aws-ec2-metadata-token", token)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    if instance_id.is_empty() {
        return Err(anyhow!("metadata service returned an empty instance id"));
    }

    Ok(instance_id)
}
