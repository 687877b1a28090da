//! Configuration for the doctor daemon
//!
//! Values come from command-line flags, each overridable through a
//! `DOCTOR_`-prefixed environment variable. Validation happens once at
//! startup; nothing past construction can fail the process.

use chrono::Duration as ChronoDuration;
use clap::Parser;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::heal::HealerConfig;
use crate::store::{DEFAULT_METRIC_SAMPLES_TO_KEEP_PER_NODE, DEFAULT_SYNTHETIC_METRIC_WINDOW};

pub const FILE_METRIC_COLLECTOR: &str = "file";
pub const CLOUDWATCH_METRIC_COLLECTOR: &str = "cloudwatch";

/// Metric sinks the daemon can be configured with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorKind {
    File,
    Cloudwatch,
}

/// Runtime configuration for the doctor daemon
#[derive(Parser, Debug, Clone)]
#[command(
    name = "doctor",
    version,
    about = "health monitoring and autohealing daemon for a blockchain RPC endpoint"
)]
pub struct DoctorConfig {
    /// URL of the endpoint that doctor should monitor
    #[arg(
        long = "kava_api_address",
        env = "DOCTOR_KAVA_API_ADDRESS",
        default_value = "https://rpc.data.kava.io"
    )]
    pub kava_api_address: String,

    /// Default interval doctor will use for the various monitoring routines
    #[arg(
        long = "default_monitoring_interval_seconds",
        env = "DOCTOR_DEFAULT_MONITORING_INTERVAL_SECONDS",
        default_value_t = 5
    )]
    pub default_monitoring_interval_seconds: u64,

    /// Maximum number of metric samples that will be kept in memory per node
    #[arg(
        long = "max_metric_samples_to_retain_per_node",
        env = "DOCTOR_MAX_METRIC_SAMPLES_TO_RETAIN_PER_NODE",
        default_value_t = DEFAULT_METRIC_SAMPLES_TO_KEEP_PER_NODE
    )]
    pub max_metric_samples_to_retain_per_node: usize,

    /// Number of metric samples to use when calculating synthetic metrics
    /// such as the node hash rate
    #[arg(
        long = "metric_samples_to_use_for_synthetic_metrics",
        env = "DOCTOR_METRIC_SAMPLES_TO_USE_FOR_SYNTHETIC_METRICS",
        default_value_t = DEFAULT_SYNTHETIC_METRIC_WINDOW
    )]
    pub metric_samples_to_use_for_synthetic_metrics: usize,

    /// Where to send collected metrics to; multiple collectors can be
    /// specified as a comma separated list, supported collectors are
    /// 'file' and 'cloudwatch'
    #[arg(
        long = "metric_collectors",
        env = "DOCTOR_METRIC_COLLECTORS",
        default_value = FILE_METRIC_COLLECTOR
    )]
    pub metric_collectors: String,

    /// AWS region to use for sending metrics to CloudWatch
    #[arg(
        long = "aws_region",
        env = "DOCTOR_AWS_REGION",
        default_value = "us-east-1"
    )]
    pub aws_region: String,

    /// Top level namespace to use for grouping all metrics sent to CloudWatch
    #[arg(
        long = "metric_namespace",
        env = "DOCTOR_METRIC_NAMESPACE",
        default_value = "kava"
    )]
    pub metric_namespace: String,

    /// Whether doctor should take active measures to attempt to heal the
    /// node process (e.g. place on standby if it falls significantly
    /// behind live)
    #[arg(long = "autoheal", env = "DOCTOR_AUTOHEAL", default_value_t = false)]
    pub autoheal: bool,

    /// Name of the OS service running the blockchain process that
    /// autohealing restarts
    #[arg(
        long = "autoheal_blockchain_service_name",
        env = "DOCTOR_AUTOHEAL_BLOCKCHAIN_SERVICE_NAME",
        default_value = "kava"
    )]
    pub autoheal_blockchain_service_name: String,

    /// How far behind live the node is allowed to fall before autohealing
    /// actions are attempted
    #[arg(
        long = "autoheal_sync_latency_tolerance_seconds",
        env = "DOCTOR_AUTOHEAL_SYNC_LATENCY_TOLERANCE_SECONDS",
        default_value_t = 120
    )]
    pub autoheal_sync_latency_tolerance_seconds: u64,

    /// How close to the current time the node must resync to before being
    /// considered in sync again
    #[arg(
        long = "autoheal_sync_to_live_tolerance_seconds",
        env = "DOCTOR_AUTOHEAL_SYNC_TO_LIVE_TOLERANCE_SECONDS",
        default_value_t = 12
    )]
    pub autoheal_sync_to_live_tolerance_seconds: u64,

    /// How many continuous seconds the endpoint being monitored has to be
    /// offline or unresponsive before autohealing will be attempted
    #[arg(
        long = "downtime_restart_threshold_seconds",
        env = "DOCTOR_DOWNTIME_RESTART_THRESHOLD_SECONDS",
        default_value_t = 300
    )]
    pub downtime_restart_threshold_seconds: u64,

    /// How many continuous seconds the endpoint being monitored has not
    /// produced a new block before autohealing will be attempted
    #[arg(
        long = "no_new_blocks_restart_threshold_seconds",
        env = "DOCTOR_NO_NEW_BLOCKS_RESTART_THRESHOLD_SECONDS",
        default_value_t = 300
    )]
    pub no_new_blocks_restart_threshold_seconds: u64,

    /// Number of seconds autohealing routines will wait to restart the
    /// endpoint, effective from the last time it was restarted
    #[arg(
        long = "autoheal_restart_delay_seconds",
        env = "DOCTOR_AUTOHEAL_RESTART_DELAY_SECONDS",
        default_value_t = 2700
    )]
    pub autoheal_restart_delay_seconds: u64,

    /// Initial buffer after process start during which no autoheal restart
    /// will fire
    #[arg(
        long = "autoheal_checks_startup_delay_seconds",
        env = "DOCTOR_AUTOHEAL_CHECKS_STARTUP_DELAY_SECONDS",
        default_value_t = 2700
    )]
    pub autoheal_checks_startup_delay_seconds: u64,

    /// Max number of seconds doctor will wait for a health check response
    /// from the endpoint
    #[arg(
        long = "health_check_timeout_seconds",
        env = "DOCTOR_HEALTH_CHECK_TIMEOUT_SECONDS",
        default_value_t = 10
    )]
    pub health_check_timeout_seconds: u64,

    /// Controls whether debug logging is enabled
    #[arg(long = "debug", env = "DOCTOR_DEBUG", default_value_t = false)]
    pub debug: bool,

    /// Controls whether an interactive terminal UI is displayed; when set,
    /// the plain console renderer is disabled and the sample streams are
    /// left for an external UI to consume
    #[arg(
        long = "interactive",
        env = "DOCTOR_INTERACTIVE",
        default_value_t = false
    )]
    pub interactive: bool,
}

impl DoctorConfig {
    /// Validate values that have no safe interpretation when out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_monitoring_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "default_monitoring_interval_seconds",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.max_metric_samples_to_retain_per_node == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_metric_samples_to_retain_per_node",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.metric_samples_to_use_for_synthetic_metrics == 0 {
            return Err(ConfigError::InvalidValue {
                field: "metric_samples_to_use_for_synthetic_metrics",
                reason: "must be at least 1".to_string(),
            });
        }

        self.metric_collectors().map(|_| ())
    }

    /// Parse the comma separated collector selection; any name outside
    /// the supported set fails startup.
    pub fn metric_collectors(&self) -> Result<Vec<CollectorKind>, ConfigError> {
        let mut collectors = Vec::new();

        for requested in self.metric_collectors.split(',') {
            match requested.trim() {
                FILE_METRIC_COLLECTOR => collectors.push(CollectorKind::File),
                CLOUDWATCH_METRIC_COLLECTOR => collectors.push(CollectorKind::Cloudwatch),
                other => {
                    return Err(ConfigError::InvalidCollector {
                        requested: other.to_string(),
                    });
                }
            }
        }

        Ok(collectors)
    }

    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_secs(self.default_monitoring_interval_seconds)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_seconds)
    }

    /// Thresholds and delays for the autohealer
    pub fn healer_config(&self) -> HealerConfig {
        HealerConfig {
            enabled: self.autoheal,
            service_name: self.autoheal_blockchain_service_name.clone(),
            sync_latency_tolerance: ChronoDuration::seconds(
                self.autoheal_sync_latency_tolerance_seconds as i64,
            ),
            sync_to_live_tolerance: ChronoDuration::seconds(
                self.autoheal_sync_to_live_tolerance_seconds as i64,
            ),
            downtime_restart_threshold: ChronoDuration::seconds(
                self.downtime_restart_threshold_seconds as i64,
            ),
            no_new_blocks_restart_threshold: ChronoDuration::seconds(
                self.no_new_blocks_restart_threshold_seconds as i64,
            ),
            restart_delay: ChronoDuration::seconds(self.autoheal_restart_delay_seconds as i64),
            initial_delay: ChronoDuration::seconds(
                self.autoheal_checks_startup_delay_seconds as i64,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_collectors(collectors: &str) -> DoctorConfig {
        DoctorConfig::parse_from([
            "doctor",
            "--metric_collectors",
            collectors,
        ])
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = DoctorConfig::parse_from(["doctor"]);

        assert_eq!(config.kava_api_address, "https://rpc.data.kava.io");
        assert_eq!(config.default_monitoring_interval_seconds, 5);
        assert_eq!(config.max_metric_samples_to_retain_per_node, 10_000);
        assert_eq!(config.metric_samples_to_use_for_synthetic_metrics, 60);
        assert_eq!(config.metric_collectors, "file");
        assert_eq!(config.aws_region, "us-east-1");
        assert_eq!(config.metric_namespace, "kava");
        assert!(!config.autoheal);
        assert_eq!(config.autoheal_sync_latency_tolerance_seconds, 120);
        assert_eq!(config.autoheal_sync_to_live_tolerance_seconds, 12);
        assert_eq!(config.downtime_restart_threshold_seconds, 300);
        assert_eq!(config.no_new_blocks_restart_threshold_seconds, 300);
        assert_eq!(config.autoheal_restart_delay_seconds, 2700);
        assert_eq!(config.health_check_timeout_seconds, 10);
    }

    #[test]
    fn test_metric_collectors_parses_supported_names() {
        let config = config_with_collectors("file,cloudwatch");

        assert_eq!(
            config.metric_collectors().unwrap(),
            vec![CollectorKind::File, CollectorKind::Cloudwatch]
        );
    }

    #[test]
    fn test_metric_collectors_rejects_unknown_names() {
        let config = config_with_collectors("file,graphite");

        assert_eq!(
            config.metric_collectors(),
            Err(ConfigError::InvalidCollector {
                requested: "graphite".to_string()
            })
        );
    }

    #[test]
    fn test_validate_rejects_zero_monitoring_interval() {
        let config = DoctorConfig::parse_from([
            "doctor",
            "--default_monitoring_interval_seconds",
            "0",
        ]);

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
