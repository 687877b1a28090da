//! In-memory metric store and synthetic metric calculation
//!
//! Samples are aggregated per node id (sync metrics) or endpoint URL
//! (uptime metrics) in a bounded FIFO ring. Synthetic metrics are computed
//! over a window of the most recently retained samples.

use std::collections::{HashMap, VecDeque};

use crate::errors::SynthesisError;
use crate::metrics::{SyncStatusSample, UptimeSample};

pub const DEFAULT_METRIC_SAMPLES_TO_KEEP_PER_NODE: usize = 10_000;
pub const DEFAULT_SYNTHETIC_METRIC_WINDOW: usize = 60;

/// A single stored sample; carries exactly one kind of measurement
#[derive(Debug, Clone)]
pub enum NodeMetric {
    Sync(SyncStatusSample),
    Uptime(UptimeSample),
}

/// Bounded per-key sample store for one monitored endpoint
pub struct MetricStore {
    per_node: HashMap<String, VecDeque<NodeMetric>>,
    max_samples_per_node: usize,
    synthetic_window: usize,
}

impl MetricStore {
    pub fn new(max_samples_per_node: usize, synthetic_window: usize) -> Self {
        Self {
            per_node: HashMap::new(),
            max_samples_per_node: max_samples_per_node.max(1),
            synthetic_window: synthetic_window.max(1),
        }
    }

    /// Append a sample for the given key, pruning the oldest sample
    /// first when the ring is at capacity.
    pub fn add_sample(&mut self, key: &str, sample: NodeMetric) {
        let samples = self
            .per_node
            .entry(key.to_string())
            .or_insert_with(VecDeque::new);

        if samples.len() == self.max_samples_per_node {
            samples.pop_front();
        }

        samples.push_back(sample);
    }

    /// Average blocks-per-second over the most recent window of sync
    /// samples for the node.
    ///
    /// The rate is the mean of pairwise block deltas between consecutive
    /// samples in chronological order; pairs with a non-positive time delta
    /// are skipped. At least two sync samples and one valid pair are
    /// required.
    pub fn hash_rate_per_second(&self, node_id: &str) -> Result<f32, SynthesisError> {
        let samples = self.per_node.get(node_id).ok_or(SynthesisError::NoSamples)?;

        // newest first, capped to the synthetic window, then flipped
        // back to chronological order for the pairwise deltas
        let mut window: Vec<&SyncStatusSample> = samples
            .iter()
            .rev()
            .filter_map(|metric| match metric {
                NodeMetric::Sync(sample) => Some(sample),
                _ => None,
            })
            .take(self.synthetic_window)
            .collect();
        window.reverse();

        if window.len() < 2 {
            return Err(SynthesisError::InsufficientSamples);
        }

        let mut rate_sum = 0.0_f64;
        let mut valid_pairs = 0_u32;

        for pair in window.windows(2) {
            let elapsed = pair[1].sampled_at - pair[0].sampled_at;
            let elapsed_seconds = elapsed.num_milliseconds() as f64 / 1000.0;

            if elapsed_seconds <= 0.0 {
                continue;
            }

            let blocks = (pair[1].sync_status.latest_block_height
                - pair[0].sync_status.latest_block_height) as f64;

            rate_sum += blocks / elapsed_seconds;
            valid_pairs += 1;
        }

        if valid_pairs == 0 {
            return Err(SynthesisError::InsufficientSamples);
        }

        Ok((rate_sum / valid_pairs as f64) as f32)
    }

    /// Fraction of up observations over the most recent window of uptime
    /// samples for the endpoint. Always within [0.0, 1.0].
    pub fn uptime_percent(&self, endpoint_url: &str) -> Result<f32, SynthesisError> {
        let samples = self
            .per_node
            .get(endpoint_url)
            .ok_or(SynthesisError::NoSamples)?;

        let window: Vec<&UptimeSample> = samples
            .iter()
            .rev()
            .filter_map(|metric| match metric {
                NodeMetric::Uptime(sample) => Some(sample),
                _ => None,
            })
            .take(self.synthetic_window)
            .collect();

        if window.is_empty() {
            return Err(SynthesisError::InsufficientSamples);
        }

        let up_count = window.iter().filter(|sample| sample.up).count();

        Ok(up_count as f32 / window.len() as f32)
    }

}
