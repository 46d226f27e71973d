//! Trace file parsing.
//!
//! This module handles:
//! - Detecting the trace file shape (bare array or `traceEvents` object)
//! - Reading events tolerantly (malformed events are skipped)
//! - Extracting the metadata block

pub mod trace_file;

// Re-export main types
pub use trace_file::{parse_trace, parse_trace_str, read_trace_file, TraceFile, TraceMetadata};
