pub mod client;
pub mod collect;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod heal;
pub mod imds;
pub mod metrics;
pub mod probe;
pub mod render;
pub mod store;

// Re-export commonly used types
pub use client::{HttpNodeClient, NodeState, NodeStatusProbe, SyncInfo};
pub use collect::{build_collectors, Collector};
pub use config::{CollectorKind, DoctorConfig};
pub use dispatch::Dispatcher;
pub use errors::{ConfigError, HealError, SynthesisError};
pub use heal::{
    Autohealer, AutoscalingClient, AutoscalingHost, HealerConfig, ServiceManager,
    SystemdServiceManager,
};
pub use metrics::{Metric, SyncStatusSample, UptimeSample};
pub use probe::NodeProbe;
pub use render::{ConsoleRenderer, DisplayEvent, SampleStreams, SAMPLE_STREAM_CAPACITY};
pub use store::{MetricStore, NodeMetric};
