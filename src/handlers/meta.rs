//! Trace-wide facts: bounds, processes, threads, frames and navigations.
//!
//! Every other handler depends on this one, directly or through the
//! orchestrator's subset closure.

use super::types::{HandlerData, HandlerName, HandlerState, ParsedTraceData, TraceHandler};
use crate::helpers::navigation::{document_url, is_main_frame_navigation, navigation_id};
use crate::types::{names, MicroSeconds, Phase, ProcessId, ThreadId, TraceEvent, TraceWindow};
use crate::utils::config::{BROWSER_MAIN_THREAD_NAME, GPU_MAIN_THREAD_NAME};
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Finalized trace metadata
#[derive(Debug, Clone, Default)]
pub struct MetaData {
    pub trace_bounds: TraceWindow,
    pub browser_process_id: Option<ProcessId>,
    pub browser_thread_id: Option<ThreadId>,
    pub gpu_process_id: Option<ProcessId>,
    pub gpu_thread_id: Option<ThreadId>,
    /// Empty when the trace never names a main frame
    pub main_frame_id: String,
    pub main_frame_url: String,
    /// Renderer processes that hosted the main frame at some point
    pub top_level_renderer_ids: BTreeSet<ProcessId>,
    pub thread_names: HashMap<(ProcessId, ThreadId), String>,
    pub process_names: HashMap<ProcessId, String>,
    /// Navigations per frame, sorted by timestamp
    pub navigations_by_frame_id: HashMap<String, Vec<Arc<TraceEvent>>>,
    pub navigations_by_navigation_id: HashMap<String, Arc<TraceEvent>>,
    /// Main-frame navigations, sorted by timestamp
    pub main_frame_navigations: Vec<Arc<TraceEvent>>,
    pub viewport_events: Vec<Arc<TraceEvent>>,
}

impl MetaData {
    pub fn thread_name(&self, pid: ProcessId, tid: ThreadId) -> Option<&str> {
        self.thread_names.get(&(pid, tid)).map(String::as_str)
    }

    /// Navigation ids of the main frame, in time order
    pub fn main_frame_navigation_ids(&self) -> Vec<String> {
        self.main_frame_navigations
            .iter()
            .filter_map(|nav| navigation_id(nav).map(str::to_string))
            .collect()
    }
}

/// Handler collecting [`MetaData`]
#[derive(Debug, Default)]
pub struct MetaHandler {
    state: HandlerState,
    min_ts: Option<MicroSeconds>,
    max_ts: Option<MicroSeconds>,
    browser_process_id: Option<ProcessId>,
    browser_thread_id: Option<ThreadId>,
    gpu_process_id: Option<ProcessId>,
    gpu_thread_id: Option<ThreadId>,
    main_frame_id: Option<String>,
    main_frame_url: Option<String>,
    top_level_renderer_ids: BTreeSet<ProcessId>,
    thread_names: HashMap<(ProcessId, ThreadId), String>,
    process_names: HashMap<ProcessId, String>,
    navigations: Vec<Arc<TraceEvent>>,
    viewport_events: Vec<Arc<TraceEvent>>,
    result: Option<Arc<MetaData>>,
}

impl MetaHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn update_bounds(&mut self, event: &TraceEvent) {
        // Metadata events carry ts 0 and would drag the minimum down
        if event.ph == Phase::Metadata || event.ts.0 <= 0 {
            return;
        }
        self.min_ts = Some(self.min_ts.map_or(event.ts, |min| min.min(event.ts)));
        let end = event.end_time();
        self.max_ts = Some(self.max_ts.map_or(end, |max| max.max(end)));
    }

    fn handle_thread_name(&mut self, event: &TraceEvent) {
        let Some(name) = event.arg_str("name") else {
            return;
        };
        match name {
            BROWSER_MAIN_THREAD_NAME => {
                self.browser_process_id = Some(event.pid);
                self.browser_thread_id = Some(event.tid);
            }
            GPU_MAIN_THREAD_NAME => {
                self.gpu_process_id = Some(event.pid);
                self.gpu_thread_id = Some(event.tid);
            }
            _ => {}
        }
        self.thread_names
            .insert((event.pid, event.tid), name.to_string());
    }

    fn handle_tracing_started_in_browser(&mut self, event: &TraceEvent) {
        self.browser_process_id.get_or_insert(event.pid);
        self.browser_thread_id.get_or_insert(event.tid);

        let frames = event
            .data_value("frames")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for frame in frames {
            let has_parent = frame.get("parent").map_or(false, |p| !p.is_null());
            if has_parent {
                continue;
            }
            if let Some(frame_id) = frame.get("frame").and_then(Value::as_str) {
                self.main_frame_id = Some(frame_id.to_string());
            }
            if let Some(url) = frame.get("url").and_then(Value::as_str) {
                self.main_frame_url = Some(url.to_string());
            }
            if let Some(pid) = frame.get("processId").and_then(Value::as_i64) {
                self.top_level_renderer_ids.insert(ProcessId(pid));
            }
        }
    }

    fn handle_frame_committed(&mut self, event: &TraceEvent) {
        let Some(frame_id) = event.data_str("frame") else {
            return;
        };
        let has_parent = event.data_value("parent").map_or(false, |p| !p.is_null());
        let is_main = match &self.main_frame_id {
            Some(main) => main == frame_id,
            None => !has_parent,
        };
        if !is_main {
            return;
        }
        if let Some(pid) = event.data_i64("processId") {
            self.top_level_renderer_ids.insert(ProcessId(pid));
        }
        if self.main_frame_url.as_deref().map_or(true, str::is_empty) {
            self.main_frame_url = event.data_str("url").map(str::to_string);
        }
    }

    fn build(&mut self) -> MetaData {
        let mut navigations = std::mem::take(&mut self.navigations);
        navigations.sort_by_key(|nav| nav.ts);

        if self.main_frame_id.is_none() {
            self.main_frame_id = navigations
                .iter()
                .find(|nav| is_main_frame_navigation(nav))
                .and_then(|nav| nav.frame_id().map(str::to_string));
        }
        let main_frame_id = self.main_frame_id.clone().unwrap_or_default();

        let mut navigations_by_frame_id: HashMap<String, Vec<Arc<TraceEvent>>> = HashMap::new();
        let mut navigations_by_navigation_id = HashMap::new();
        for nav in &navigations {
            let (Some(frame_id), Some(nav_id)) = (nav.frame_id(), navigation_id(nav)) else {
                continue;
            };
            navigations_by_frame_id
                .entry(frame_id.to_string())
                .or_default()
                .push(Arc::clone(nav));
            navigations_by_navigation_id.insert(nav_id.to_string(), Arc::clone(nav));
        }

        let main_frame_navigations = navigations_by_frame_id
            .get(&main_frame_id)
            .cloned()
            .unwrap_or_default();

        let mut main_frame_url = self.main_frame_url.clone().unwrap_or_default();
        if main_frame_url.is_empty() || main_frame_url == "about:blank" {
            if let Some(url) = main_frame_navigations.first().and_then(|nav| document_url(nav)) {
                main_frame_url = url.to_string();
            }
        }

        let mut top_level_renderer_ids = self.top_level_renderer_ids.clone();
        if top_level_renderer_ids.is_empty() {
            top_level_renderer_ids.extend(main_frame_navigations.iter().map(|nav| nav.pid));
        }

        let trace_bounds = match (self.min_ts, self.max_ts) {
            (Some(min), Some(max)) => TraceWindow::new(min, max),
            _ => TraceWindow::default(),
        };

        MetaData {
            trace_bounds,
            browser_process_id: self.browser_process_id,
            browser_thread_id: self.browser_thread_id,
            gpu_process_id: self.gpu_process_id,
            gpu_thread_id: self.gpu_thread_id,
            main_frame_id,
            main_frame_url,
            top_level_renderer_ids,
            thread_names: std::mem::take(&mut self.thread_names),
            process_names: std::mem::take(&mut self.process_names),
            navigations_by_frame_id,
            navigations_by_navigation_id,
            main_frame_navigations,
            viewport_events: std::mem::take(&mut self.viewport_events),
        }
    }
}

#[async_trait]
impl TraceHandler for MetaHandler {
    fn name(&self) -> HandlerName {
        HandlerName::Meta
    }

    fn reset(&mut self) {
        *self = Self {
            state: HandlerState::Initialized,
            ..Self::default()
        };
    }

    fn handle_event(&mut self, event: &Arc<TraceEvent>) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;
        self.update_bounds(event);

        match event.name.as_str() {
            names::THREAD_NAME if event.ph == Phase::Metadata => self.handle_thread_name(event),
            names::PROCESS_NAME if event.ph == Phase::Metadata => {
                if let Some(name) = event.arg_str("name") {
                    self.process_names.insert(event.pid, name.to_string());
                }
            }
            names::TRACING_STARTED_IN_BROWSER => self.handle_tracing_started_in_browser(event),
            names::TRACING_STARTED_IN_PAGE => {
                if let Some(page) = event.data_str("page") {
                    self.main_frame_id.get_or_insert_with(|| page.to_string());
                }
                self.top_level_renderer_ids.insert(event.pid);
            }
            names::FRAME_COMMITTED_IN_BROWSER => self.handle_frame_committed(event),
            names::NAVIGATION_START => {
                let has_url = document_url(event).map_or(false, |url| !url.is_empty());
                if has_url && navigation_id(event).is_some() {
                    self.navigations.push(Arc::clone(event));
                }
            }
            names::PARSE_META_VIEWPORT => self.viewport_events.push(Arc::clone(event)),
            _ => {}
        }
        Ok(())
    }

    async fn finalize(&mut self, _parsed: &ParsedTraceData) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;
        let data = self.build();
        debug!(
            "Meta: main frame {:?}, {} main-frame navigations, {} renderer processes",
            data.main_frame_id,
            data.main_frame_navigations.len(),
            data.top_level_renderer_ids.len()
        );
        self.result = Some(Arc::new(data));
        self.state = HandlerState::Finalized;
        Ok(())
    }

    fn data(&self) -> Result<HandlerData, HandlerError> {
        self.state.ensure_finalized(self.name())?;
        self.result
            .clone()
            .map(HandlerData::Meta)
            .ok_or(HandlerError::NotFinalized(HandlerName::Meta))
    }
}
