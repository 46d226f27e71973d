//! Trace event model and time units.

pub mod event;
pub mod timing;

pub use event::{names, EventId2, Phase, ProcessId, ThreadId, TraceEvent};
pub use timing::{MicroSeconds, MilliSeconds, TraceWindow};
