//! Analysis report schema.
//!
//! This module defines the structure of the JSON report we write to disk
//! and the digest read back for validation. The schema is versioned.

use crate::aggregator::{calculate_transfer_distribution, TransferDistribution};
use crate::handlers::{HandlerName, ParsedTraceData};
use crate::insights::NavigationInsights;
use crate::lantern::SimulationProfile;
use crate::parser::TraceMetadata;
use crate::utils::config::SCHEMA_VERSION;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What was analyzed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    /// Display name, `host (n)`
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    pub event_count: usize,

    /// Events that could not be read
    #[serde(default)]
    pub skipped_events: usize,

    #[serde(default)]
    pub metadata: TraceMetadata,
}

/// Top-level report written to JSON
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    /// Schema version for compatibility checking
    pub schema_version: String,

    pub generated_at: DateTime<Utc>,

    pub trace: TraceSummary,

    /// Simulation profile; absent when Lantern was not run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<SimulationProfile>,

    /// Handlers that produced data
    pub handlers: Vec<HandlerName>,

    /// Transfer sizes over every request of the trace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer: Option<TransferDistribution>,

    pub navigations: Vec<NavigationInsights>,
}

impl AnalysisReport {
    /// Assemble a report stamped with the current time
    ///
    /// **Public** - called by the analyze command
    pub fn new(
        trace: TraceSummary,
        parsed: &ParsedTraceData,
        profile: Option<SimulationProfile>,
        navigations: Vec<NavigationInsights>,
    ) -> Self {
        let transfer = parsed.network_requests().ok().map(|requests| {
            let sizes: Vec<u64> = requests.by_time.iter().map(|r| r.transfer_size).collect();
            calculate_transfer_distribution(&sizes)
        });

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            trace,
            profile,
            handlers: parsed.keys().collect(),
            transfer,
            navigations,
        }
    }
}

/// A metric as read back from a report
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricDigest {
    pub metric: String,
    pub timing_ms: f64,
}

/// A navigation as read back from a report
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NavigationDigest {
    pub navigation_id: String,
    pub frame_id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub metrics: Vec<MetricDigest>,
    #[serde(default)]
    pub lantern_error: Option<String>,
    #[serde(default)]
    pub errors: BTreeMap<String, String>,
}

/// The parts of a report needed to validate and summarize it
#[derive(Debug, Clone, Deserialize)]
pub struct ReportDigest {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub trace: TraceSummary,
    #[serde(default)]
    pub profile: Option<SimulationProfile>,
    pub handlers: Vec<HandlerName>,
    pub navigations: Vec<NavigationDigest>,
}

impl ReportDigest {
    /// Same major schema version as this build
    pub fn is_compatible(&self) -> bool {
        major(&self.schema_version) == major(SCHEMA_VERSION)
    }
}

fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}
