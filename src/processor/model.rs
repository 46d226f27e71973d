//! A collection of processed traces.
//!
//! Each trace is run through its own [`TraceProcessor`] and kept with its
//! metadata and a display name derived from the main frame's host.

use super::orchestrator::TraceProcessor;
use crate::handlers::{HandlerName, ParsedTraceData};
use crate::helpers::TraceCache;
use crate::parser::{TraceFile, TraceMetadata};
use crate::types::TraceEvent;
use crate::utils::error::ProcessorError;
use log::info;
use std::sync::Arc;

/// One processed trace
#[derive(Debug, Clone)]
pub struct ParsedTrace {
    /// `host (n)` where n counts earlier traces of the same host
    pub name: String,
    pub metadata: TraceMetadata,
    pub events: Arc<Vec<Arc<TraceEvent>>>,
    pub data: Arc<ParsedTraceData>,
}

/// Ordered list of processed traces
#[derive(Debug, Default)]
pub struct TraceModel {
    traces: Vec<ParsedTrace>,
    handlers: Option<Vec<HandlerName>>,
    cache: TraceCache,
}

impl TraceModel {
    /// Model that runs every handler
    pub fn new() -> Self {
        Self::default()
    }

    /// Model that runs only `handlers` (closed over dependencies)
    pub fn with_handlers(handlers: Vec<HandlerName>) -> Self {
        Self {
            handlers: Some(handlers),
            ..Self::default()
        }
    }

    /// Process a trace and append it to the model
    ///
    /// # Returns
    /// Index of the new trace
    ///
    /// # Errors
    /// Any orchestrator failure; the model is left unchanged
    pub async fn parse(&mut self, file: TraceFile) -> Result<usize, ProcessorError> {
        let mut processor = match &self.handlers {
            Some(names) => TraceProcessor::with_subset(names)?,
            None => TraceProcessor::with_all_handlers()?,
        };

        let events: Vec<Arc<TraceEvent>> = file.trace_events.into_iter().map(Arc::new).collect();
        let data = processor.run_shared(&events).await?;

        let name = self.recording_name(&data);
        info!("Parsed trace '{}' ({} events)", name, events.len());

        self.traces.push(ParsedTrace {
            name,
            metadata: file.metadata,
            events: Arc::new(events),
            data: Arc::new(data),
        });
        Ok(self.traces.len() - 1)
    }

    pub fn parsed_trace(&self, index: usize) -> Result<&ParsedTrace, ProcessorError> {
        self.traces
            .get(index)
            .ok_or(ProcessorError::TraceIndexOutOfRange(index))
    }

    pub fn traces(&self) -> &[ParsedTrace] {
        &self.traces
    }

    pub fn size(&self) -> usize {
        self.traces.len()
    }

    pub fn delete_trace(&mut self, index: usize) -> Result<ParsedTrace, ProcessorError> {
        if index >= self.traces.len() {
            return Err(ProcessorError::TraceIndexOutOfRange(index));
        }
        Ok(self.traces.remove(index))
    }

    pub fn reset(&mut self) {
        self.traces.clear();
        self.cache.clear();
    }

    /// **Private** - internal helper for parse
    fn recording_name(&mut self, data: &ParsedTraceData) -> String {
        let host = data
            .meta()
            .ok()
            .and_then(|meta| self.cache.parse_url(&meta.main_frame_url))
            .map(|url| url.host.clone())
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| "Trace".to_string());

        let prefix = format!("{} (", host);
        let earlier = self
            .traces
            .iter()
            .filter(|trace| trace.name.starts_with(&prefix))
            .count();
        format!("{} ({})", host, earlier + 1)
    }
}
