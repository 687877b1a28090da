//! Operating-system service control

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::errors::HealError;

/// Capability for restarting the monitored node's OS service
#[async_trait]
pub trait ServiceManager: Send + Sync {
    async fn restart(&self, service_name: &str) -> Result<(), HealError>;
}

/// Restarts services through the host's systemd
pub struct SystemdServiceManager;

#[async_trait]
impl ServiceManager for SystemdServiceManager {
    async fn restart(&self, service_name: &str) -> Result<(), HealError> {
        info!("restarting service: {}", service_name);

        let output = Command::new("sudo")
            .arg("systemctl")
            .arg("restart")
            .arg(service_name)
            .output()
            .await
            .map_err(|e| HealError::ServiceRestart {
                service_name: service_name.to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(HealError::ServiceRestart {
                service_name: service_name.to_string(),
                reason: error.to_string(),
            });
        }

        info!("service {} restarted successfully", service_name);
        Ok(())
    }
}
