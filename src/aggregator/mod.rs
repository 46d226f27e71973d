//! Aggregation of parsed data into summary statistics.
//!
//! This module provides:
//! - Min/max/mean/median summaries (network analyzer estimates)
//! - Transfer size distributions for the report

pub mod statistics;

pub use statistics::{
    calculate_transfer_distribution, summarize, summarize_groups, TransferDistribution,
    ValueSummary,
};
