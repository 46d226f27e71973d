//! Handler orchestration.
//!
//! This module handles:
//! - Ordering handlers by their dependencies
//! - Streaming events through every handler exactly once
//! - Collecting finalized results into `ParsedTraceData`
//! - Keeping several processed traces side by side

pub mod model;
pub mod orchestrator;

pub use model::{ParsedTrace, TraceModel};
pub use orchestrator::TraceProcessor;
