//! Custom error types for the doctor daemon
//!
//! Only construction-time errors are allowed to stop the process; everything
//! raised inside the running loops degrades to a log entry.

use std::fmt;

/// Errors raised by synthetic metric calculation over the metric store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisError {
    /// No samples have been recorded for the requested key
    NoSamples,

    /// Samples exist for the key, but not enough of the required kind
    /// to compute the synthetic value
    InsufficientSamples,
}

impl fmt::Display for SynthesisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthesisError::NoSamples => {
                write!(f, "no metric samples found for requested node")
            }
            SynthesisError::InsufficientSamples => {
                write!(f, "not enough metric samples to calculate synthetic metric")
            }
        }
    }
}

impl std::error::Error for SynthesisError {}

/// Configuration error variants, surfaced before any loop starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A metric collector name outside the supported set
    InvalidCollector { requested: String },

    /// A value that fails validation
    InvalidValue { field: &'static str, reason: String },
}

/// Healing capability error variants.
///
/// These abort the current rule iteration and surface as log entries;
/// the rule re-evaluates on the next probe sample.
#[derive(Debug)]
pub enum HealError {
    /// Autoscaling membership lookup did not return exactly one record
    MembershipNotFound { instance_id: String, matches: usize },

    /// An autoscaling control call failed
    Autoscaling {
        operation: &'static str,
        reason: String,
    },

    /// A service restart failed
    ServiceRestart {
        service_name: String,
        reason: String,
    },

    /// A healing loop was cancelled mid-flight
    Cancelled { operation: &'static str },
}

impl fmt::Display for HealError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealError::MembershipNotFound {
                instance_id,
                matches,
            } => {
                write!(
                    f,
                    "expected exactly one autoscaling record for instance '{}', got {}",
                    instance_id, matches
                )
            }
            HealError::Autoscaling { operation, reason } => {
                write!(f, "autoscaling {} failed: {}", operation, reason)
            }
            HealError::ServiceRestart {
                service_name,
                reason,
            } => {
                write!(f, "failed to restart service '{}': {}", service_name, reason)
            }
            HealError::Cancelled { operation } => {
                write!(f, "cancelled while {}", operation)
            }
        }
    }
}

impl std::error::Error for HealError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidCollector { requested } => {
                write!(
                    f,
                    "invalid metric collector '{}', supported collectors are 'file' and 'cloudwatch'",
                    requested
                )
            }
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
