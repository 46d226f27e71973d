//! Layout forced synchronously by script.
//!
//! A `Layout` or `UpdateLayoutTree` nested inside a script invocation
//! (`FunctionCall`, `EvaluateScript`, `TimerFire`) stalls the script until
//! layout is computed. Invocations whose nested reflows add up to
//! [`FORCED_REFLOW_THRESHOLD_US`] are reported, aggregated by the script
//! call that started them.

use super::InsightContext;
use crate::handlers::renderer::MainThreadTask;
use crate::handlers::ParsedTraceData;
use crate::types::{names, MicroSeconds, TraceEvent};
use crate::utils::config::{FORCED_REFLOW_STACK_DEPTH, FORCED_REFLOW_THRESHOLD_US};
use crate::utils::error::InsightError;
use log::debug;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// A script location
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallFrame {
    pub function_name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_number: Option<i64>,
}

impl CallFrame {
    /// Read a call frame from an event's `data` or a `stackTrace` entry
    ///
    /// Returns `None` when the value names no function, URL or script.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let text = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let script_id = match object.get("scriptId") {
            Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        let frame = Self {
            function_name: text("functionName"),
            url: text("url"),
            script_id,
            line_number: object.get("lineNumber").and_then(Value::as_i64),
            column_number: object.get("columnNumber").and_then(Value::as_i64),
        };
        if frame.function_name.is_empty() && frame.url.is_empty() && frame.script_id.is_none() {
            return None;
        }
        Some(frame)
    }

    /// Location identity; the function name is ignored
    fn key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.script_id.as_deref().unwrap_or(&self.url),
            self.line_number.unwrap_or(-1),
            self.column_number.unwrap_or(-1)
        )
    }
}

/// One layout or style recalculation forced by script
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForcedReflowEvent {
    pub name: String,
    pub ts: MicroSeconds,
    pub duration_ms: f64,
    /// Innermost frame first
    pub stack: Vec<CallFrame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_level_function_call: Option<CallFrame>,
}

impl ForcedReflowEvent {
    /// Frame that requested a style recalculation
    fn recalc_frame(&self) -> Option<&CallFrame> {
        if self.name == names::UPDATE_LAYOUT_TREE {
            self.stack.first()
        } else {
            None
        }
    }
}

/// A distinct bottom-up stack and the style recalculations it requested
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BottomUpCallStack {
    pub bottom_up: Vec<CallFrame>,
    pub recalc: Vec<CallFrame>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ForcedReflowInsight {
    /// The script call whose forced reflows took longest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_level_function_call: Option<CallFrame>,
    pub top_level_reflow_time_ms: f64,
    /// Stacks that forced reflows under the top-level call
    pub aggregated_bottom_up: Vec<BottomUpCallStack>,
    /// Every forced reflow of the navigation, in time order
    pub events: Vec<ForcedReflowEvent>,
}

fn is_script_invocation(event: &TraceEvent) -> bool {
    matches!(
        event.name.as_str(),
        names::FUNCTION_CALL | names::EVALUATE_SCRIPT | names::TIMER_FIRE
    )
}

fn is_reflow(event: &TraceEvent) -> bool {
    matches!(event.name.as_str(), names::LAYOUT | names::UPDATE_LAYOUT_TREE)
}

type ReflowGroup = (Arc<TraceEvent>, Vec<Arc<TraceEvent>>);

/// Reflows nested in each outermost script invocation of `task`
fn reflows_by_invocation(task: &MainThreadTask) -> Vec<ReflowGroup> {
    let mut groups: Vec<ReflowGroup> = Vec::new();
    let mut open: Vec<&Arc<TraceEvent>> = Vec::new();

    for child in &task.children {
        while open.last().is_some_and(|parent| parent.end_time() <= child.ts) {
            open.pop();
        }
        if is_reflow(child) {
            if let Some(invocation) = open.iter().copied().find(|e| is_script_invocation(e)) {
                let same_invocation = groups
                    .last()
                    .is_some_and(|(current, _)| Arc::ptr_eq(current, invocation));
                match groups.last_mut() {
                    Some((_, reflows)) if same_invocation => reflows.push(Arc::clone(child)),
                    _ => groups.push((Arc::clone(invocation), vec![Arc::clone(child)])),
                }
            }
        }
        if child.duration() > MicroSeconds::ZERO {
            open.push(child);
        }
    }
    groups
}

fn stack_of(reflow: &TraceEvent) -> Vec<CallFrame> {
    reflow
        .arg("beginData")
        .and_then(|data| data.get("stackTrace"))
        .or_else(|| reflow.data_value("stackTrace"))
        .and_then(Value::as_array)
        .map(|frames| {
            frames
                .iter()
                .filter_map(CallFrame::from_value)
                .take(FORCED_REFLOW_STACK_DEPTH)
                .collect()
        })
        .unwrap_or_default()
}

/// Forced reflows of one main-thread task
///
/// **Public** - reusable on any task list
///
/// Only invocations whose nested reflows add up to the threshold count.
pub fn find_forced_reflows(task: &MainThreadTask) -> Vec<ForcedReflowEvent> {
    let mut found = Vec::new();
    for (invocation, reflows) in reflows_by_invocation(task) {
        let total = reflows
            .iter()
            .fold(MicroSeconds::ZERO, |sum, reflow| sum + reflow.duration());
        if total < MicroSeconds(FORCED_REFLOW_THRESHOLD_US) {
            continue;
        }

        let invocation_frame = invocation.arg("data").and_then(CallFrame::from_value);
        for reflow in reflows {
            let mut stack = stack_of(&reflow);
            let top_level_function_call =
                invocation_frame.clone().or_else(|| stack.last().cloned());
            if stack.is_empty() {
                stack.extend(top_level_function_call.clone());
            }
            found.push(ForcedReflowEvent {
                name: reflow.name.clone(),
                ts: reflow.ts,
                duration_ms: reflow.duration().as_millis_f64(),
                stack,
                top_level_function_call,
            });
        }
    }
    found
}

struct Aggregate {
    call: CallFrame,
    total_ms: f64,
    stacks: Vec<BottomUpCallStack>,
}

/// Group `events` by top-level call and keep the most expensive one
pub fn aggregate(events: Vec<ForcedReflowEvent>) -> ForcedReflowInsight {
    let mut aggregates: Vec<(String, Aggregate)> = Vec::new();

    for event in &events {
        let Some(call) = &event.top_level_function_call else {
            continue;
        };
        if event.stack.is_empty() {
            continue;
        }

        let key = call.key();
        let index = match aggregates.iter().position(|(k, _)| *k == key) {
            Some(index) => index,
            None => {
                aggregates.push((
                    key,
                    Aggregate {
                        call: call.clone(),
                        total_ms: 0.0,
                        stacks: Vec::new(),
                    },
                ));
                aggregates.len() - 1
            }
        };
        let entry = &mut aggregates[index].1;
        entry.total_ms += event.duration_ms;

        let stack_index = match entry.stacks.iter().position(|s| s.bottom_up == event.stack) {
            Some(index) => index,
            None => {
                entry.stacks.push(BottomUpCallStack {
                    bottom_up: event.stack.clone(),
                    recalc: Vec::new(),
                });
                entry.stacks.len() - 1
            }
        };
        if let Some(frame) = event.recalc_frame() {
            let stack = &mut entry.stacks[stack_index];
            if !stack.recalc.iter().any(|known| known.key() == frame.key()) {
                stack.recalc.push(frame.clone());
            }
        }
    }

    let mut top: Option<Aggregate> = None;
    for (_, candidate) in aggregates {
        if top.as_ref().map_or(true, |best| candidate.total_ms > best.total_ms) {
            top = Some(candidate);
        }
    }

    match top {
        Some(top) => ForcedReflowInsight {
            top_level_function_call: Some(top.call),
            top_level_reflow_time_ms: top.total_ms,
            aggregated_bottom_up: top.stacks,
            events,
        },
        None => ForcedReflowInsight {
            events,
            ..ForcedReflowInsight::default()
        },
    }
}

/// Forced-reflow insight of one navigation
///
/// # Errors
/// * `InsightError::MissingData` - Meta or Renderer missing
pub fn generate_insight(
    parsed: &ParsedTraceData,
    context: &InsightContext<'_>,
) -> Result<ForcedReflowInsight, InsightError> {
    let scope = context.scope(parsed)?;
    let renderer = parsed.renderer()?;

    let mut events = Vec::new();
    for (_, thread) in renderer.main_frame_main_threads() {
        for task in thread.tasks.iter().filter(|task| scope.contains(task.start_time)) {
            events.extend(find_forced_reflows(task));
        }
    }
    events.sort_by_key(|event| event.ts);
    debug!("{} forced reflow(s) in navigation {}", events.len(), context.navigation_id);

    Ok(aggregate(events))
}
