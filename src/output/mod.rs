//! Report output.
//!
//! This module handles:
//! - The versioned JSON report schema
//! - Writing reports to disk and reading them back

pub mod json;
pub mod report;

pub use json::{read_report, report_to_string, write_report};
pub use report::{AnalysisReport, MetricDigest, NavigationDigest, ReportDigest, TraceSummary};
