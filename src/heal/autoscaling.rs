//! Cloud autoscaling-group membership control

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_autoscaling::config::Region;
use aws_sdk_autoscaling::Client as AutoscalingSdkClient;

use crate::errors::HealError;

/// Lifecycle states of an autoscaling-group member relevant to healing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    InService,
    Standby,
    Pending,
    Terminating,
    Other,
}

impl From<&str> for LifecycleState {
    fn from(state: &str) -> Self {
        match state {
            "InService" => LifecycleState::InService,
            "Standby" => LifecycleState::Standby,
            "Pending" => LifecycleState::Pending,
            "Terminating" => LifecycleState::Terminating,
            _ => LifecycleState::Other,
        }
    }
}

/// One instance's membership record within its autoscaling group
#[derive(Debug, Clone)]
pub struct AutoscalingMembership {
    pub group_name: String,
    pub lifecycle_state: LifecycleState,
}

/// Capability for moving a host in and out of serving rotation
#[async_trait]
pub trait AutoscalingClient: Send + Sync {
    /// Look up membership records for the instance; healing requires
    /// exactly one match.
    async fn describe(&self, instance_id: &str) -> Result<Vec<AutoscalingMembership>, HealError>;

    async fn enter_standby(
        &self,
        group_name: &str,
        instance_id: &str,
        decrement_desired_capacity: bool,
    ) -> Result<(), HealError>;

    async fn exit_standby(&self, group_name: &str, instance_id: &str) -> Result<(), HealError>;
}

/// AWS implementation of the autoscaling capability
pub struct AwsAutoscalingClient {
    client: AutoscalingSdkClient,
}

impl AwsAutoscalingClient {
    pub async fn new(aws_region: &str) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(aws_region.to_string()))
            .load()
            .await;

        Self {
            client: AutoscalingSdkClient::new(&aws_config),
        }
    }
}

#[async_trait]
impl AutoscalingClient for AwsAutoscalingClient {
    async fn describe(&self, instance_id: &str) -> Result<Vec<AutoscalingMembership>, HealError> {
        let response = self
            .client
            .describe_auto_scaling_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| HealError::Autoscaling {
                operation: "describe instances",
                reason: e.to_string(),
            })?;

        let memberships = response
            .auto_scaling_instances()
            .iter()
            .map(|details| AutoscalingMembership {
                group_name: details
                    .auto_scaling_group_name()
                    .unwrap_or_default()
                    .to_string(),
                lifecycle_state: LifecycleState::from(
                    details.lifecycle_state().unwrap_or_default(),
                ),
            })
            .collect();

        Ok(memberships)
    }

    async fn enter_standby(
        &self,
        group_name: &str,
        instance_id: &str,
        decrement_desired_capacity: bool,
    ) -> Result<(), HealError> {
        self.client
            .enter_standby()
            .auto_scaling_group_name(group_name)
            .instance_ids(instance_id)
            .should_decrement_desired_capacity(decrement_desired_capacity)
            .send()
            .await
            .map_err(|e| HealError::Autoscaling {
                operation: "enter standby",
                reason: e.to_string(),
            })?;

        Ok(())
    }

    async fn exit_standby(&self, group_name: &str, instance_id: &str) -> Result<(), HealError> {
        self.client
            .exit_standby()
            .auto_scaling_group_name(group_name)
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| HealError::Autoscaling {
                operation: "exit standby",
                reason: e.to_string(),
            })?;

        Ok(())
    }
}
