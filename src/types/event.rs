//! The canonical trace event.
//!
//! Events are read once from the trace file and never mutated. Handlers
//! receive them as `Arc<TraceEvent>` so derived structures can keep
//! references without copying payloads.

use super::timing::MicroSeconds;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Process id of a trace event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub i64);

/// Thread id of a trace event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub i64);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trace event phase (`ph`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Begin,
    End,
    Complete,
    Instant,
    Counter,
    AsyncNestableStart,
    AsyncNestableInstant,
    AsyncNestableEnd,
    AsyncStart,
    AsyncStepInto,
    AsyncStepPast,
    AsyncEnd,
    FlowStart,
    FlowStep,
    FlowEnd,
    Sample,
    Metadata,
    ObjectCreated,
    ObjectSnapshot,
    ObjectDestroyed,
    Mark,
    Unknown,
}

impl Phase {
    pub fn from_code(code: &str) -> Self {
        match code {
            "B" => Phase::Begin,
            "E" => Phase::End,
            "X" => Phase::Complete,
            "I" | "i" => Phase::Instant,
            "C" => Phase::Counter,
            "b" => Phase::AsyncNestableStart,
            "n" => Phase::AsyncNestableInstant,
            "e" => Phase::AsyncNestableEnd,
            "S" => Phase::AsyncStart,
            "T" => Phase::AsyncStepInto,
            "p" => Phase::AsyncStepPast,
            "F" => Phase::AsyncEnd,
            "s" => Phase::FlowStart,
            "t" => Phase::FlowStep,
            "f" => Phase::FlowEnd,
            "P" => Phase::Sample,
            "M" => Phase::Metadata,
            "N" => Phase::ObjectCreated,
            "O" => Phase::ObjectSnapshot,
            "D" => Phase::ObjectDestroyed,
            "R" => Phase::Mark,
            _ => Phase::Unknown,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Phase::Begin => "B",
            Phase::End => "E",
            Phase::Complete => "X",
            Phase::Instant => "I",
            Phase::Counter => "C",
            Phase::AsyncNestableStart => "b",
            Phase::AsyncNestableInstant => "n",
            Phase::AsyncNestableEnd => "e",
            Phase::AsyncStart => "S",
            Phase::AsyncStepInto => "T",
            Phase::AsyncStepPast => "p",
            Phase::AsyncEnd => "F",
            Phase::FlowStart => "s",
            Phase::FlowStep => "t",
            Phase::FlowEnd => "f",
            Phase::Sample => "P",
            Phase::Metadata => "M",
            Phase::ObjectCreated => "N",
            Phase::ObjectSnapshot => "O",
            Phase::ObjectDestroyed => "D",
            Phase::Mark => "R",
            Phase::Unknown => "?",
        }
    }
}

impl Serialize for Phase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Phase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Ok(Phase::from_code(&code))
    }
}

/// A single raw (or synthetic) trace event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub name: String,

    /// Comma-separated category list
    #[serde(default)]
    pub cat: String,

    pub ph: Phase,

    #[serde(default)]
    pub ts: MicroSeconds,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dur: Option<MicroSeconds>,

    #[serde(default)]
    pub pid: ProcessId,

    #[serde(default)]
    pub tid: ThreadId,

    #[serde(default)]
    pub args: Value,

    /// Ids are strings in most traces but some producers write numbers
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_loose_id"
    )]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id2: Option<EventId2>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Instant event scope (`g`, `p`, `t`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<String>,
}

/// Two-level async id used by newer trace producers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventId2 {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_loose_id"
    )]
    pub local: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_loose_id"
    )]
    pub global: Option<String>,
}

fn deserialize_loose_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl TraceEvent {
    /// Build a minimal event; mostly useful for synthetic events and tests
    pub fn new(name: impl Into<String>, ph: Phase, ts: MicroSeconds) -> Self {
        Self {
            name: name.into(),
            cat: String::new(),
            ph,
            ts,
            dur: None,
            pid: ProcessId::default(),
            tid: ThreadId::default(),
            args: Value::Null,
            id: None,
            id2: None,
            scope: None,
            s: None,
        }
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.cat.split(',').any(|c| c.trim() == category)
    }

    pub fn duration(&self) -> MicroSeconds {
        self.dur.unwrap_or_default()
    }

    pub fn end_time(&self) -> MicroSeconds {
        self.ts + self.duration()
    }

    /// Whether this event's span fully contains `other`
    pub fn contains(&self, other: &TraceEvent) -> bool {
        other.ts >= self.ts && other.end_time() <= self.end_time()
    }

    pub fn arg(&self, key: &str) -> Option<&Value> {
        self.args.get(key)
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.arg(key).and_then(Value::as_str)
    }

    /// The `args.data` payload, if any
    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.args.get("data").and_then(Value::as_object)
    }

    pub fn data_value(&self, key: &str) -> Option<&Value> {
        self.data().and_then(|d| d.get(key))
    }

    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data_value(key).and_then(Value::as_str)
    }

    pub fn data_f64(&self, key: &str) -> Option<f64> {
        self.data_value(key).and_then(Value::as_f64)
    }

    pub fn data_i64(&self, key: &str) -> Option<i64> {
        self.data_value(key).and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
    }

    pub fn data_bool(&self, key: &str) -> Option<bool> {
        self.data_value(key).and_then(Value::as_bool)
    }

    /// Frame id from `args.frame` or `args.data.frame`
    pub fn frame_id(&self) -> Option<&str> {
        self.arg_str("frame").or_else(|| self.data_str("frame"))
    }

    /// Async pairing id, scoped by category/scope where present
    pub fn async_id(&self) -> Option<String> {
        let raw = self
            .id2
            .as_ref()
            .and_then(|id2| id2.global.clone().or_else(|| id2.local.clone()))
            .or_else(|| self.id.clone())?;
        Some(match &self.scope {
            Some(scope) => format!("{}:{}", scope, raw),
            None => raw,
        })
    }
}

/// Event names the pipeline cares about
pub mod names {
    pub const THREAD_NAME: &str = "thread_name";
    pub const PROCESS_NAME: &str = "process_name";
    pub const TRACING_STARTED_IN_BROWSER: &str = "TracingStartedInBrowser";
    pub const TRACING_STARTED_IN_PAGE: &str = "TracingStartedInPage";
    pub const FRAME_COMMITTED_IN_BROWSER: &str = "FrameCommittedInBrowser";
    pub const NAVIGATION_START: &str = "navigationStart";
    pub const PARSE_META_VIEWPORT: &str = "ParseMetaViewport";

    pub const RESOURCE_WILL_SEND_REQUEST: &str = "ResourceWillSendRequest";
    pub const RESOURCE_SEND_REQUEST: &str = "ResourceSendRequest";
    pub const RESOURCE_CHANGE_PRIORITY: &str = "ResourceChangePriority";
    pub const RESOURCE_RECEIVE_RESPONSE: &str = "ResourceReceiveResponse";
    pub const RESOURCE_RECEIVED_DATA: &str = "ResourceReceivedData";
    pub const RESOURCE_FINISH: &str = "ResourceFinish";
    pub const RESOURCE_MARK_AS_CACHED: &str = "ResourceMarkAsCached";

    pub const FIRST_PAINT: &str = "firstPaint";
    pub const FIRST_CONTENTFUL_PAINT: &str = "firstContentfulPaint";
    pub const LCP_CANDIDATE: &str = "largestContentfulPaint::Candidate";
    pub const LCP_INVALIDATE: &str = "largestContentfulPaint::Invalidate";
    pub const LARGEST_IMAGE_PAINT_CANDIDATE: &str = "LargestImagePaint::Candidate";
    pub const MARK_DOM_CONTENT: &str = "MarkDOMContent";
    pub const MARK_LOAD: &str = "MarkLoad";

    pub const SCREENSHOT: &str = "Screenshot";
    pub const ANIMATION: &str = "Animation";
    pub const LAYOUT_SHIFT: &str = "LayoutShift";
    pub const RENDER_FRAME_IMPL_CREATE_CHILD_FRAME: &str = "RenderFrameImplCreateChildFrame";
    pub const EVENT_TIMING: &str = "EventTiming";
    pub const AUCTION_WORKLET_RUNNING: &str = "AuctionWorkletRunningInProcess";
    pub const AUCTION_WORKLET_DONE: &str = "AuctionWorkletDoneWithProcess";

    pub const EVALUATE_SCRIPT: &str = "EvaluateScript";
    pub const FUNCTION_CALL: &str = "FunctionCall";
    pub const V8_COMPILE: &str = "v8.compile";
    pub const PARSE_AUTHOR_STYLE_SHEET: &str = "ParseAuthorStyleSheet";
    pub const PARSE_HTML: &str = "ParseHTML";
    pub const XHR_READY_STATE_CHANGE: &str = "XHRReadyStateChange";
    pub const TIMER_INSTALL: &str = "TimerInstall";
    pub const TIMER_FIRE: &str = "TimerFire";
    pub const INVALIDATE_LAYOUT: &str = "InvalidateLayout";
    pub const SCHEDULE_STYLE_RECALCULATION: &str = "ScheduleStyleRecalculation";
    pub const LAYOUT: &str = "Layout";
    pub const UPDATE_LAYOUT_TREE: &str = "UpdateLayoutTree";
    pub const PAINT: &str = "Paint";

    pub const SET_LAYER_TREE_ID: &str = "SetLayerTreeId";
    pub const BEGIN_FRAME: &str = "BeginFrame";
    pub const DROPPED_FRAME: &str = "DroppedFrame";
    pub const DRAW_FRAME: &str = "DrawFrame";
    pub const REQUEST_MAIN_THREAD_FRAME: &str = "RequestMainThreadFrame";
    pub const BEGIN_MAIN_THREAD_FRAME: &str = "BeginMainThreadFrame";
    pub const NEEDS_BEGIN_FRAME_CHANGED: &str = "NeedsBeginFrameChanged";
    pub const COMMIT: &str = "Commit";
    pub const ACTIVATE_LAYER_TREE: &str = "ActivateLayerTree";
    pub const COMPOSITE_LAYERS: &str = "CompositeLayers";
}
