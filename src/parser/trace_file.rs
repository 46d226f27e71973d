//! Trace file parser.
//!
//! Accepts the two shapes trace producers write: a bare JSON array of
//! events, or an object with `traceEvents` and optional `metadata`.

use crate::types::TraceEvent;
use crate::utils::error::ParseError;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Metadata block written alongside the events by some producers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_throttling: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_throttling: Option<String>,

    /// Anything else the producer recorded
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A parsed trace file: events in file order plus metadata
#[derive(Debug, Clone, Default)]
pub struct TraceFile {
    pub trace_events: Vec<TraceEvent>,
    pub metadata: TraceMetadata,
    /// Events that could not be read and were skipped
    pub skipped_events: usize,
}

/// Parse a trace from an already-decoded JSON value
///
/// **Public** - main entry point for parsing
///
/// # Arguments
/// * `raw` - Either an array of events or `{traceEvents, metadata}`
///
/// # Returns
/// The events in file order with the metadata block
///
/// # Errors
/// * `ParseError::InvalidFormat` - Neither accepted shape, or no event could be read
/// * `ParseError::JsonError` - The metadata block is malformed
pub fn parse_trace(raw: &Value) -> Result<TraceFile, ParseError> {
    let (events, metadata) = detect_trace_shape(raw)?;

    let metadata = match metadata {
        Some(value) => serde_json::from_value(value.clone())?,
        None => TraceMetadata::default(),
    };

    let mut trace_events = Vec::with_capacity(events.len());
    let mut skipped_events = 0;

    for (index, value) in events.iter().enumerate() {
        match serde_json::from_value::<TraceEvent>(value.clone()) {
            Ok(event) => trace_events.push(event),
            Err(e) => {
                skipped_events += 1;
                debug!("Skipping malformed event #{}: {}", index, e);
            }
        }
    }

    if trace_events.is_empty() && !events.is_empty() {
        return Err(ParseError::InvalidFormat(format!(
            "none of the {} events could be read",
            events.len()
        )));
    }

    if skipped_events > 0 {
        warn!("Skipped {} malformed trace events", skipped_events);
    }

    debug!("Parsed {} trace events", trace_events.len());

    Ok(TraceFile {
        trace_events,
        metadata,
        skipped_events,
    })
}

/// Parse a trace from a JSON string
pub fn parse_trace_str(raw: &str) -> Result<TraceFile, ParseError> {
    let value: Value = serde_json::from_str(raw)?;
    parse_trace(&value)
}

/// Read and parse a trace file from disk
///
/// **Public** - used by the analyze command
pub fn read_trace_file(path: impl AsRef<Path>) -> Result<TraceFile, ParseError> {
    let path = path.as_ref();
    debug!("Reading trace from: {}", path.display());

    let file = File::open(path)?;
    let value: Value = serde_json::from_reader(BufReader::new(file))?;
    parse_trace(&value)
}

/// Split the raw JSON into its event list and optional metadata
///
/// **Private** - internal helper for parse_trace
fn detect_trace_shape(raw: &Value) -> Result<(&Vec<Value>, Option<&Value>), ParseError> {
    match raw {
        Value::Array(events) => {
            debug!("Trace is a bare event array");
            Ok((events, None))
        }
        Value::Object(obj) => {
            let events = obj
                .get("traceEvents")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    ParseError::InvalidFormat(
                        "object trace without a traceEvents array".to_string(),
                    )
                })?;
            Ok((events, obj.get("metadata").filter(|m| m.is_object())))
        }
        _ => Err(ParseError::InvalidFormat(
            "expected an array of events or an object with traceEvents".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Phase;
    use serde_json::json;

    #[test]
    fn test_parse_bare_array() {
        let raw = json!([
            {"name": "a", "ph": "X", "ts": 1, "dur": 2, "pid": 1, "tid": 1},
            {"name": "b", "ph": "I", "ts": 3, "pid": 1, "tid": 1}
        ]);

        let trace = parse_trace(&raw).unwrap();
        assert_eq!(trace.trace_events.len(), 2);
        assert_eq!(trace.trace_events[1].ph, Phase::Instant);
        assert_eq!(trace.metadata, TraceMetadata::default());
    }

    #[test]
    fn test_parse_object_with_metadata() {
        let raw = json!({
            "traceEvents": [{"name": "a", "ph": "M", "ts": 0}],
            "metadata": {"source": "DevTools", "cpuThrottling": 4, "hostDPR": 2}
        });

        let trace = parse_trace(&raw).unwrap();
        assert_eq!(trace.trace_events.len(), 1);
        assert_eq!(trace.metadata.source.as_deref(), Some("DevTools"));
        assert_eq!(trace.metadata.cpu_throttling, Some(4.0));
        assert_eq!(trace.metadata.extra.get("hostDPR"), Some(&json!(2)));
    }

    #[test]
    fn test_malformed_events_are_skipped() {
        let raw = json!([
            {"name": "a", "ph": "X", "ts": 1},
            {"ph": "X", "ts": 1},
            "garbage"
        ]);

        let trace = parse_trace(&raw).unwrap();
        assert_eq!(trace.trace_events.len(), 1);
        assert_eq!(trace.skipped_events, 2);
    }

    #[test]
    fn test_rejects_unknown_shapes() {
        assert!(parse_trace(&json!(42)).is_err());
        assert!(parse_trace(&json!({"events": []})).is_err());
        assert!(parse_trace(&json!(["garbage"])).is_err());
    }

    #[test]
    fn test_empty_trace_is_valid() {
        let trace = parse_trace_str("[]").unwrap();
        assert!(trace.trace_events.is_empty());
    }
}
