//! File-backed metric collection

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::Collector;
use crate::metrics::Metric;

pub const DEFAULT_METRIC_FILE_NAME_SUFFIX: &str = "doctor-metrics.json";
pub const DEFAULT_FILE_ROTATION_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Configuration for a [`FileCollector`]
#[derive(Debug, Clone, Default)]
pub struct FileCollectorConfig {
    /// Suffix appended to the unix-seconds file name prefix;
    /// defaults to `doctor-metrics.json`
    pub metric_file_name_suffix: Option<String>,

    /// How long a file stays current before a new one is opened;
    /// defaults to one hour
    pub file_rotation_interval: Option<Duration>,

    /// Directory metric files are written to; defaults to the
    /// working directory
    pub directory: Option<PathBuf>,
}

struct CurrentFile {
    file: File,
    opened_at: Instant,
}

/// Collects metrics by appending one serialized record per call to a
/// periodically rotated file.
///
/// The lock is held across the rotate-and-write sequence so rotation and
/// writes never interleave.
pub struct FileCollector {
    current: Mutex<CurrentFile>,
    file_rotation_interval: Duration,
    metric_file_name_suffix: String,
    directory: PathBuf,
}

impl FileCollector {
    pub fn new(config: FileCollectorConfig) -> Result<Self> {
        let metric_file_name_suffix = config
            .metric_file_name_suffix
            .unwrap_or_else(|| DEFAULT_METRIC_FILE_NAME_SUFFIX.to_string());

        let file_rotation_interval = config
            .file_rotation_interval
            .unwrap_or(DEFAULT_FILE_ROTATION_INTERVAL);

        let directory = config.directory.unwrap_or_else(|| PathBuf::from("."));

        let file = open_metric_file(&directory, &metric_file_name_suffix)?;

        Ok(Self {
            current: Mutex::new(CurrentFile {
                file,
                opened_at: Instant::now(),
            }),
            file_rotation_interval,
            metric_file_name_suffix,
            directory,
        })
    }
}

fn open_metric_file(directory: &PathBuf, suffix: &str) -> Result<File> {
    let file_name = format!("{}-{}", Utc::now().timestamp(), suffix);

    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(directory.join(file_name))?;

    Ok(file)
}

#[async_trait]
impl Collector for FileCollector {
    async fn collect(&self, metric: &Metric) -> Result<()> {
        if !metric.collect_to_file {
            return Ok(());
        }

        let encoded = serde_json::to_vec(metric)?;

        let mut current = self
            .current
            .lock()
            .map_err(|_| anyhow!("file collector lock poisoned"))?;

        if current.opened_at.elapsed() >= self.file_rotation_interval {
            current.file = open_metric_file(&self.directory, &self.metric_file_name_suffix)?;
            current.opened_at = Instant::now();
        }

        current.file.write_all(&encoded)?;

        Ok(())
    }
}
