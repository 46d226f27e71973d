//! Summary statistics over sampled values.
//!
//! Used by the network analyzer for per-origin RTT and server response
//! estimates, and by the report for request size distributions.

use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

/// Min/max/mean/median of a set of samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ValueSummary {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub median: f64,
    pub count: usize,
}

/// Summarize `values`
///
/// **Public** - returns `None` for an empty sample set
///
/// The median of an even-sized set is the mean of the two middle values.
pub fn summarize(values: &[f64]) -> Option<ValueSummary> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let count = sorted.len();
    let mid = count / 2;
    let median = if count % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    Some(ValueSummary {
        min: sorted[0],
        max: sorted[count - 1],
        avg: sorted.iter().sum::<f64>() / count as f64,
        median,
        count,
    })
}

/// Summarize every group, dropping empty ones
pub fn summarize_groups(groups: &BTreeMap<String, Vec<f64>>) -> BTreeMap<String, ValueSummary> {
    groups
        .iter()
        .filter_map(|(key, values)| summarize(values).map(|summary| (key.clone(), summary)))
        .collect()
}

/// How transferred bytes spread over requests
///
/// **Public** - returned from calculate_transfer_distribution
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransferDistribution {
    /// Total bytes across all requests
    pub total_bytes: u64,

    /// Number of requests
    pub request_count: usize,

    pub mean_bytes_per_request: u64,

    pub median_bytes_per_request: u64,

    /// Bytes transferred by the largest 10% of requests
    pub top_10_percent_bytes: u64,

    /// Percentage of total bytes in the largest 10%
    pub top_10_percent_percentage: f64,
}

impl TransferDistribution {
    /// True if the largest 10% of requests carry more than 80% of the bytes
    pub fn is_highly_concentrated(&self) -> bool {
        self.top_10_percent_percentage > 80.0
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        format!(
            "{} requests, {} bytes total, mean {} / median {} bytes, top 10% carry {:.1}%",
            self.request_count,
            self.total_bytes,
            self.mean_bytes_per_request,
            self.median_bytes_per_request,
            self.top_10_percent_percentage
        )
    }
}

/// Calculate transfer size distribution statistics
///
/// # Arguments
/// * `sizes` - Transfer size of each request, in any order
pub fn calculate_transfer_distribution(sizes: &[u64]) -> TransferDistribution {
    if sizes.is_empty() {
        return TransferDistribution::default();
    }

    let mut sorted = sizes.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));

    let total: u64 = sorted.iter().sum();
    let count = sorted.len();
    let median = sorted[count / 2];

    let top_count = (count as f64 * 0.1).ceil() as usize;
    let top_bytes: u64 = sorted.iter().take(top_count).sum();

    debug!("Transfer distribution over {} requests ({} bytes)", count, total);

    TransferDistribution {
        total_bytes: total,
        request_count: count,
        mean_bytes_per_request: total / count as u64,
        median_bytes_per_request: median,
        top_10_percent_bytes: top_bytes,
        top_10_percent_percentage: if total > 0 {
            (top_bytes as f64 / total as f64) * 100.0
        } else {
            0.0
        },
    }
}
