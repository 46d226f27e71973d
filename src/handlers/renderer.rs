//! Renderer processes, threads and main-thread tasks.
//!
//! Collects every duration event, pairs `B`/`E` into complete events,
//! sorts each thread, then carves renderer main threads into top-level
//! tasks with their flattened children.

use super::types::{
    require, HandlerData, HandlerName, HandlerState, ParsedTraceData, TraceHandler,
};
use crate::types::{names, MicroSeconds, Phase, ProcessId, ThreadId, TraceEvent};
use crate::utils::config::{RENDERER_MAIN_THREAD_NAME, TOP_LEVEL_TASK_NAMES};
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A top-level main-thread task and everything that ran inside it
#[derive(Debug, Clone)]
pub struct MainThreadTask {
    pub event: Arc<TraceEvent>,
    pub pid: ProcessId,
    pub tid: ThreadId,
    pub start_time: MicroSeconds,
    pub end_time: MicroSeconds,
    pub duration: MicroSeconds,
    /// Duration not covered by direct children
    pub self_time: MicroSeconds,
    /// All events nested in the task, in start order
    pub children: Vec<Arc<TraceEvent>>,
    /// First script URL the task ran, used for attribution
    pub attributable_url: Option<String>,
}

impl MainThreadTask {
    pub fn has_child(&self, name: &str) -> bool {
        self.children.iter().any(|c| c.name == name)
    }

    pub fn did_perform_layout(&self) -> bool {
        self.has_child(names::LAYOUT)
    }

    /// URLs of scripts evaluated in this task, first occurrence order
    pub fn evaluate_script_urls(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = Vec::new();
        for child in &self.children {
            if child.name != names::EVALUATE_SCRIPT {
                continue;
            }
            if let Some(url) = child.data_str("url").filter(|u| !u.is_empty()) {
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
        }
        urls
    }
}

#[derive(Debug, Clone, Default)]
pub struct RendererThread {
    pub tid: ThreadId,
    pub name: Option<String>,
    /// Complete and instant events sorted by start (longest first on ties)
    pub entries: Vec<Arc<TraceEvent>>,
    /// Top-level tasks; only populated for main threads
    pub tasks: Vec<Arc<MainThreadTask>>,
}

impl RendererThread {
    pub fn is_main_thread(&self) -> bool {
        self.name.as_deref() == Some(RENDERER_MAIN_THREAD_NAME)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RendererProcess {
    pub pid: ProcessId,
    pub name: Option<String>,
    pub is_on_main_frame: bool,
    pub threads: BTreeMap<ThreadId, RendererThread>,
}

impl RendererProcess {
    pub fn main_thread(&self) -> Option<&RendererThread> {
        self.threads.values().find(|t| !t.tasks.is_empty() && t.is_main_thread())
            .or_else(|| self.threads.values().find(|t| !t.tasks.is_empty()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RendererData {
    pub processes: BTreeMap<ProcessId, RendererProcess>,
}

impl RendererData {
    pub fn main_thread(&self, pid: ProcessId) -> Option<&RendererThread> {
        self.processes.get(&pid).and_then(RendererProcess::main_thread)
    }

    /// Main threads of processes that hosted the main frame
    pub fn main_frame_main_threads(
        &self,
    ) -> impl Iterator<Item = (ProcessId, &RendererThread)> + '_ {
        self.processes
            .values()
            .filter(|p| p.is_on_main_frame)
            .filter_map(|p| p.main_thread().map(|t| (p.pid, t)))
    }

    pub fn task_count(&self) -> usize {
        self.processes
            .values()
            .flat_map(|p| p.threads.values())
            .map(|t| t.tasks.len())
            .sum()
    }
}

#[derive(Debug, Default)]
pub struct RendererHandler {
    state: HandlerState,
    events_by_thread: HashMap<(ProcessId, ThreadId), Vec<Arc<TraceEvent>>>,
    open_begins: HashMap<(ProcessId, ThreadId), Vec<Arc<TraceEvent>>>,
    result: Option<Arc<RendererData>>,
}

impl RendererHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn pair_end(&mut self, event: &Arc<TraceEvent>) {
        let key = (event.pid, event.tid);
        let Some(stack) = self.open_begins.get_mut(&key) else {
            return;
        };
        // Mismatched names are tolerated; the innermost begin is closed
        let Some(begin) = stack.pop() else {
            return;
        };
        let mut complete = (*begin).clone();
        complete.ph = Phase::Complete;
        complete.dur = Some((event.ts - begin.ts).max(MicroSeconds::ZERO));
        if let (Value::Object(into), Value::Object(from)) = (&mut complete.args, &event.args) {
            for (k, v) in from {
                into.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        self.events_by_thread.entry(key).or_default().push(Arc::new(complete));
    }
}

fn is_top_level_task(event: &TraceEvent) -> bool {
    event.ph == Phase::Complete
        && event.duration() > MicroSeconds::ZERO
        && TOP_LEVEL_TASK_NAMES.contains(&event.name.as_str())
}

fn attributable_url(children: &[Arc<TraceEvent>]) -> Option<String> {
    children.iter().find_map(|child| match child.name.as_str() {
        names::EVALUATE_SCRIPT | names::FUNCTION_CALL | names::V8_COMPILE => child
            .data_str("url")
            .filter(|u| !u.is_empty())
            .map(str::to_string),
        _ => None,
    })
}

/// Split a sorted thread into top-level tasks
///
/// **Public** - also used by tests building tasks by hand
pub fn build_tasks(entries: &[Arc<TraceEvent>]) -> Vec<Arc<MainThreadTask>> {
    let mut tasks = Vec::new();
    let mut i = 0;
    while i < entries.len() {
        let event = &entries[i];
        i += 1;
        if !is_top_level_task(event) {
            continue;
        }

        let end = event.end_time();
        let mut children = Vec::new();
        while i < entries.len() && entries[i].ts < end {
            children.push(Arc::clone(&entries[i]));
            i += 1;
        }

        // Direct children are those not nested inside an earlier child
        let mut open_ends: Vec<MicroSeconds> = Vec::new();
        let mut direct_children_time = MicroSeconds::ZERO;
        for child in &children {
            while open_ends.last().map_or(false, |e| *e <= child.ts) {
                open_ends.pop();
            }
            if open_ends.is_empty() {
                direct_children_time = direct_children_time + child.duration();
            }
            if child.duration() > MicroSeconds::ZERO {
                open_ends.push(child.end_time());
            }
        }

        tasks.push(Arc::new(MainThreadTask {
            event: Arc::clone(event),
            pid: event.pid,
            tid: event.tid,
            start_time: event.ts,
            end_time: end,
            duration: event.duration(),
            self_time: (event.duration() - direct_children_time).max(MicroSeconds::ZERO),
            attributable_url: attributable_url(&children),
            children,
        }));
    }
    tasks
}

#[async_trait]
impl TraceHandler for RendererHandler {
    fn name(&self) -> HandlerName {
        HandlerName::Renderer
    }

    fn deps(&self) -> &'static [HandlerName] {
        &[HandlerName::Meta]
    }

    fn reset(&mut self) {
        *self = Self {
            state: HandlerState::Initialized,
            ..Self::default()
        };
    }

    fn handle_event(&mut self, event: &Arc<TraceEvent>) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;
        match event.ph {
            Phase::Complete | Phase::Instant => self
                .events_by_thread
                .entry((event.pid, event.tid))
                .or_default()
                .push(Arc::clone(event)),
            Phase::Begin => self
                .open_begins
                .entry((event.pid, event.tid))
                .or_default()
                .push(Arc::clone(event)),
            Phase::End => self.pair_end(event),
            _ => {}
        }
        Ok(())
    }

    async fn finalize(&mut self, parsed: &ParsedTraceData) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;
        let meta = require(self.name(), HandlerName::Meta, parsed.meta())?;

        let renderer_pids: Vec<ProcessId> = {
            let mut pids: Vec<ProcessId> = meta
                .thread_names
                .iter()
                .filter(|(_, name)| name.as_str() == RENDERER_MAIN_THREAD_NAME)
                .map(|((pid, _), _)| *pid)
                .chain(meta.top_level_renderer_ids.iter().copied())
                .collect();
            pids.sort();
            pids.dedup();
            pids
        };

        let mut processes: BTreeMap<ProcessId, RendererProcess> = BTreeMap::new();
        for ((pid, tid), mut entries) in std::mem::take(&mut self.events_by_thread) {
            if !renderer_pids.contains(&pid) {
                continue;
            }
            entries.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| b.duration().cmp(&a.duration())));

            let name = meta.thread_name(pid, tid).map(str::to_string);
            let mut thread = RendererThread {
                tid,
                name,
                entries,
                tasks: Vec::new(),
            };
            let named_main = thread.is_main_thread();
            let unnamed_process = !meta
                .thread_names
                .iter()
                .any(|((p, _), n)| *p == pid && n.as_str() == RENDERER_MAIN_THREAD_NAME);
            if named_main || unnamed_process {
                thread.tasks = build_tasks(&thread.entries);
            }

            let process = processes.entry(pid).or_insert_with(|| RendererProcess {
                pid,
                name: meta.process_names.get(&pid).cloned(),
                is_on_main_frame: meta.top_level_renderer_ids.contains(&pid),
                threads: BTreeMap::new(),
            });
            process.threads.insert(tid, thread);
        }

        let data = RendererData { processes };
        debug!(
            "Renderer: {} processes, {} main-thread tasks",
            data.processes.len(),
            data.task_count()
        );
        self.open_begins.clear();
        self.result = Some(Arc::new(data));
        self.state = HandlerState::Finalized;
        Ok(())
    }

    fn data(&self) -> Result<HandlerData, HandlerError> {
        self.state.ensure_finalized(self.name())?;
        self.result
            .clone()
            .map(HandlerData::Renderer)
            .ok_or(HandlerError::NotFinalized(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete(name: &str, ts: i64, dur: i64) -> Arc<TraceEvent> {
        Arc::new(
            serde_json::from_value(json!({"name": name, "ph": "X", "ts": ts, "dur": dur,
                "pid": 1, "tid": 1}))
                .unwrap(),
        )
    }

    #[test]
    fn test_build_tasks_groups_children_and_self_time() {
        let mut script = (*complete("EvaluateScript", 110, 50)).clone();
        script.args = json!({"data": {"url": "https://a.test/app.js"}});
        let entries = vec![
            complete("RunTask", 100, 100),
            Arc::new(script),
            complete("FunctionCall", 120, 10),
            complete("Layout", 170, 20),
            complete("RunTask", 300, 5),
            complete("Stray", 400, 5),
        ];

        let tasks = build_tasks(&entries);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].children.len(), 3);
        // 100 - (50 + 20); FunctionCall nests inside EvaluateScript
        assert_eq!(tasks[0].self_time, MicroSeconds(30));
        assert!(tasks[0].did_perform_layout());
        assert_eq!(tasks[0].attributable_url.as_deref(), Some("https://a.test/app.js"));
        assert_eq!(tasks[0].evaluate_script_urls(), vec!["https://a.test/app.js"]);
        assert_eq!(tasks[1].self_time, MicroSeconds(5));
    }

    #[test]
    fn test_begin_end_pairs_become_complete_events() {
        let mut handler = RendererHandler::new();
        handler.reset();
        let begin: Arc<TraceEvent> = Arc::new(
            serde_json::from_value(json!({"name": "RunTask", "ph": "B", "ts": 10,
                "pid": 1, "tid": 1, "args": {"a": 1}}))
                .unwrap(),
        );
        let end: Arc<TraceEvent> = Arc::new(
            serde_json::from_value(json!({"name": "RunTask", "ph": "E", "ts": 40,
                "pid": 1, "tid": 1, "args": {"b": 2}}))
                .unwrap(),
        );
        handler.handle_event(&begin).unwrap();
        handler.handle_event(&end).unwrap();

        let paired = &handler.events_by_thread[&(ProcessId(1), ThreadId(1))][0];
        assert_eq!(paired.ph, Phase::Complete);
        assert_eq!(paired.dur, Some(MicroSeconds(30)));
        assert_eq!(paired.args, json!({"a": 1, "b": 2}));
    }
}
