//! Network request reconstruction.
//!
//! Chrome emits one event per stage of a fetch (`ResourceSendRequest`,
//! `ResourceReceiveResponse`, `ResourceFinish`, ...). This handler groups
//! them by request id and builds one [`SyntheticNetworkRequest`] per fetch,
//! with redirects folded into the final request.

use super::types::{HandlerData, HandlerName, HandlerState, ParsedTraceData, TraceHandler};
use crate::helpers::cache::TraceCache;
use crate::types::{names, MicroSeconds, ProcessId, ThreadId, TraceEvent};
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Fetch priority as reported by the loader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    VeryLow,
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

impl Priority {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "VeryLow" => Some(Priority::VeryLow),
            "Low" => Some(Priority::Low),
            "Medium" => Some(Priority::Medium),
            "High" => Some(Priority::High),
            "VeryHigh" => Some(Priority::VeryHigh),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    TextTrack,
    Xhr,
    Fetch,
    Prefetch,
    EventSource,
    WebSocket,
    Manifest,
    SignedExchange,
    Ping,
    CspViolationReport,
    Preflight,
    #[default]
    Other,
}

impl ResourceType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Document" => ResourceType::Document,
            "Stylesheet" => ResourceType::Stylesheet,
            "Image" => ResourceType::Image,
            "Media" => ResourceType::Media,
            "Font" => ResourceType::Font,
            "Script" => ResourceType::Script,
            "TextTrack" => ResourceType::TextTrack,
            "XHR" => ResourceType::Xhr,
            "Fetch" => ResourceType::Fetch,
            "Prefetch" => ResourceType::Prefetch,
            "EventSource" => ResourceType::EventSource,
            "WebSocket" => ResourceType::WebSocket,
            "Manifest" => ResourceType::Manifest,
            "SignedExchange" => ResourceType::SignedExchange,
            "Ping" => ResourceType::Ping,
            "CSPViolationReport" => ResourceType::CspViolationReport,
            "Preflight" => ResourceType::Preflight,
            _ => ResourceType::Other,
        }
    }

    /// Best guess when the loader did not report a resource type
    pub fn from_mime_type(mime: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        if mime == "text/html" || mime == "application/xhtml+xml" {
            ResourceType::Document
        } else if mime == "text/css" {
            ResourceType::Stylesheet
        } else if mime.contains("javascript") || mime.contains("ecmascript") {
            ResourceType::Script
        } else if mime.starts_with("image/") {
            ResourceType::Image
        } else if mime.starts_with("font/") || mime.contains("font") {
            ResourceType::Font
        } else if mime.starts_with("video/") || mime.starts_with("audio/") {
            ResourceType::Media
        } else if mime == "application/manifest+json" {
            ResourceType::Manifest
        } else {
            ResourceType::Other
        }
    }
}

/// Render-blocking status reported on `ResourceSendRequest`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderBlocking {
    Blocking,
    InBodyParserBlocking,
    NonBlocking,
    DynamicallyInjectedNonBlocking,
    PotentiallyBlocking,
    #[default]
    Unknown,
}

impl RenderBlocking {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "blocking" => RenderBlocking::Blocking,
            "in_body_parser_blocking" => RenderBlocking::InBodyParserBlocking,
            "non_blocking" => RenderBlocking::NonBlocking,
            "dynamically_injected_non_blocking" => RenderBlocking::DynamicallyInjectedNonBlocking,
            "potentially_blocking" => RenderBlocking::PotentiallyBlocking,
            _ => RenderBlocking::Unknown,
        }
    }

    pub fn is_render_blocking(self) -> bool {
        matches!(
            self,
            RenderBlocking::Blocking | RenderBlocking::InBodyParserBlocking
        )
    }
}

fn unset() -> f64 {
    -1.0
}

/// Loader timing block; offsets are milliseconds after `request_time` (seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTiming {
    #[serde(default)]
    pub request_time: f64,
    #[serde(default = "unset")]
    pub dns_start: f64,
    #[serde(default = "unset")]
    pub dns_end: f64,
    #[serde(default = "unset")]
    pub connect_start: f64,
    #[serde(default = "unset")]
    pub connect_end: f64,
    #[serde(default = "unset")]
    pub ssl_start: f64,
    #[serde(default = "unset")]
    pub ssl_end: f64,
    #[serde(default = "unset")]
    pub send_start: f64,
    #[serde(default = "unset")]
    pub send_end: f64,
    #[serde(default = "unset")]
    pub receive_headers_start: f64,
    #[serde(default = "unset")]
    pub receive_headers_end: f64,
}

impl ResourceTiming {
    /// Absolute trace time of an offset within this block
    pub fn at(&self, offset_ms: f64) -> MicroSeconds {
        MicroSeconds::from_seconds(self.request_time) + MicroSeconds::from_millis(offset_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Initiator {
    pub kind: String,
    pub url: Option<String>,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Redirect {
    pub url: String,
    pub priority: Priority,
    pub request_method: String,
    pub ts: MicroSeconds,
    pub dur: MicroSeconds,
}

/// One fetch, assembled from its lifecycle events
#[derive(Debug, Clone, Default)]
pub struct SyntheticNetworkRequest {
    pub request_id: String,
    pub url: String,
    /// `null` for opaque origins, empty when the URL does not parse
    pub origin: String,
    pub host: String,
    pub scheme: String,
    pub frame: String,
    pub pid: ProcessId,
    pub tid: ThreadId,
    /// First time the request appears (before any redirect)
    pub ts: MicroSeconds,
    pub dur: MicroSeconds,
    pub send_start_time: MicroSeconds,
    pub response_headers_end: Option<MicroSeconds>,
    pub finish_time: MicroSeconds,
    pub priority: Priority,
    pub initial_priority: Priority,
    pub fetch_priority_hint: Option<String>,
    pub resource_type: ResourceType,
    pub mime_type: String,
    pub transfer_size: u64,
    pub decoded_body_length: u64,
    pub protocol: String,
    pub connection_id: Option<u64>,
    pub connection_reused: bool,
    pub from_cache: bool,
    pub from_service_worker: bool,
    pub status_code: Option<u16>,
    pub failed: bool,
    pub render_blocking: RenderBlocking,
    pub initiator: Option<Initiator>,
    pub is_link_preload: bool,
    pub request_method: String,
    pub timing: Option<ResourceTiming>,
    pub redirects: Vec<Redirect>,
}

impl SyntheticNetworkRequest {
    pub fn end_time(&self) -> MicroSeconds {
        self.finish_time
    }

    pub fn is_secure(&self) -> bool {
        matches!(self.scheme.as_str(), "https" | "wss")
    }

    pub fn is_h2(&self) -> bool {
        let protocol = self.protocol.to_ascii_lowercase();
        protocol.starts_with("h2") || protocol.starts_with("h3") || protocol == "quic"
    }

    /// Served without touching the network (cache hit or non-http scheme)
    pub fn is_connectionless(&self) -> bool {
        self.from_cache || !self.is_network_scheme()
    }

    pub fn is_network_scheme(&self) -> bool {
        matches!(self.scheme.as_str(), "http" | "https" | "ws" | "wss")
    }

    /// Priorities that block the first paint when fetched early
    pub fn has_render_blocking_priority(&self) -> bool {
        let blocking_script =
            self.priority == Priority::High && self.resource_type == ResourceType::Script;
        let blocking_import =
            self.priority == Priority::High && self.resource_type == ResourceType::Document;
        self.priority == Priority::VeryHigh || blocking_script || blocking_import
    }

    /// Time the first response byte arrived, falling back to finish
    pub fn first_byte_time(&self) -> MicroSeconds {
        self.response_headers_end.unwrap_or(self.finish_time)
    }

    pub fn initiator_type(&self) -> Option<&str> {
        self.initiator.as_ref().map(|i| i.kind.as_str())
    }
}

/// Requests grouped by origin
#[derive(Debug, Clone, Default)]
pub struct OriginRequests {
    pub render_blocking: Vec<Arc<SyntheticNetworkRequest>>,
    pub non_render_blocking: Vec<Arc<SyntheticNetworkRequest>>,
    pub all: Vec<Arc<SyntheticNetworkRequest>>,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkRequestsData {
    /// Sorted by start time, then request id
    pub by_time: Vec<Arc<SyntheticNetworkRequest>>,
    pub by_id: HashMap<String, Arc<SyntheticNetworkRequest>>,
    pub by_origin: BTreeMap<String, OriginRequests>,
}

#[derive(Debug, Default)]
struct RequestEvents {
    will_send: Option<Arc<TraceEvent>>,
    send_requests: Vec<Arc<TraceEvent>>,
    change_priority: Option<Arc<TraceEvent>>,
    receive_response: Option<Arc<TraceEvent>>,
    received_data: Vec<Arc<TraceEvent>>,
    finish: Option<Arc<TraceEvent>>,
    marked_as_cached: bool,
}

#[derive(Debug, Default)]
pub struct NetworkRequestsHandler {
    state: HandlerState,
    requests: HashMap<String, RequestEvents>,
    cache: TraceCache,
    result: Option<Arc<NetworkRequestsData>>,
}

impl NetworkRequestsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn build(&mut self) -> NetworkRequestsData {
        let requests = std::mem::take(&mut self.requests);
        let mut by_time: Vec<Arc<SyntheticNetworkRequest>> = requests
            .into_iter()
            .filter_map(|(id, events)| build_request(id, events, &mut self.cache))
            .map(Arc::new)
            .collect();
        by_time.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.request_id.cmp(&b.request_id)));

        let mut by_id = HashMap::new();
        let mut by_origin: BTreeMap<String, OriginRequests> = BTreeMap::new();
        for request in &by_time {
            by_id.insert(request.request_id.clone(), Arc::clone(request));
            let group = by_origin.entry(request.origin.clone()).or_default();
            if request.render_blocking.is_render_blocking() {
                group.render_blocking.push(Arc::clone(request));
            } else {
                group.non_render_blocking.push(Arc::clone(request));
            }
            group.all.push(Arc::clone(request));
        }

        NetworkRequestsData {
            by_time,
            by_id,
            by_origin,
        }
    }
}

fn build_request(
    request_id: String,
    events: RequestEvents,
    cache: &mut TraceCache,
) -> Option<SyntheticNetworkRequest> {
    let first_send = events.send_requests.first()?;
    let last_send = events.send_requests.last()?;
    let url = last_send.data_str("url")?.to_string();
    if url.is_empty() {
        return None;
    }

    let (origin, host, scheme) = match cache.parse_url(&url) {
        Some(parsed) => (parsed.origin.clone(), parsed.host.clone(), parsed.scheme.clone()),
        None => (String::new(), String::new(), String::new()),
    };

    let response = events.receive_response.as_deref();
    let finish = events.finish.as_deref();

    let timing: Option<ResourceTiming> = response
        .and_then(|r| r.data_value("timing"))
        .and_then(|t| serde_json::from_value(t.clone()).ok());

    let ts = events
        .will_send
        .as_ref()
        .map(|e| e.ts)
        .unwrap_or(first_send.ts)
        .min(first_send.ts);

    let send_start_time = timing
        .as_ref()
        .filter(|t| t.send_start >= 0.0)
        .map(|t| t.at(t.send_start))
        .unwrap_or(last_send.ts);

    let response_headers_end = timing
        .as_ref()
        .filter(|t| t.receive_headers_end >= 0.0)
        .map(|t| t.at(t.receive_headers_end))
        .or_else(|| response.map(|r| r.ts));

    let finish_time = finish
        .and_then(|f| f.data_f64("finishTime"))
        .filter(|t| *t > 0.0)
        .map(MicroSeconds::from_seconds)
        .or_else(|| finish.map(|f| f.ts))
        .or_else(|| events.received_data.last().map(|d| d.ts))
        .or_else(|| response.map(|r| r.ts))
        .unwrap_or(last_send.ts)
        .max(ts);

    let initial_priority = first_send
        .data_str("priority")
        .and_then(Priority::parse)
        .unwrap_or_default();
    let priority = events
        .change_priority
        .as_ref()
        .and_then(|e| e.data_str("priority"))
        .and_then(Priority::parse)
        .or_else(|| last_send.data_str("priority").and_then(Priority::parse))
        .unwrap_or(initial_priority);

    let mime_type = response
        .and_then(|r| r.data_str("mimeType"))
        .unwrap_or_default()
        .to_string();
    let resource_type = last_send
        .data_str("resourceType")
        .map(ResourceType::parse)
        .unwrap_or_else(|| ResourceType::from_mime_type(&mime_type));

    let received_encoded: u64 = events
        .received_data
        .iter()
        .filter_map(|d| d.data_f64("encodedDataLength"))
        .map(|v| v.max(0.0) as u64)
        .sum();
    let transfer_size = finish
        .and_then(|f| f.data_f64("encodedDataLength"))
        .map(|v| v.max(0.0) as u64)
        .or_else(|| (received_encoded > 0).then_some(received_encoded))
        .or_else(|| {
            response
                .and_then(|r| r.data_f64("encodedDataLength"))
                .map(|v| v.max(0.0) as u64)
        })
        .unwrap_or(0);
    let decoded_body_length = finish
        .and_then(|f| f.data_f64("decodedBodyLength"))
        .map(|v| v.max(0.0) as u64)
        .unwrap_or_else(|| {
            events
                .received_data
                .iter()
                .filter_map(|d| d.data_f64("dataLength"))
                .map(|v| v.max(0.0) as u64)
                .sum()
        });

    let initiator = first_send.data_value("initiator").and_then(|i| {
        let kind = i.get("type").and_then(Value::as_str)?.to_string();
        Some(Initiator {
            kind,
            url: i.get("url").and_then(Value::as_str).map(str::to_string),
            request_id: i.get("requestId").and_then(Value::as_str).map(str::to_string),
        })
    });

    let redirects = events
        .send_requests
        .windows(2)
        .map(|pair| Redirect {
            url: pair[0].data_str("url").unwrap_or_default().to_string(),
            priority: pair[0]
                .data_str("priority")
                .and_then(Priority::parse)
                .unwrap_or_default(),
            request_method: pair[0].data_str("requestMethod").unwrap_or("GET").to_string(),
            ts: pair[0].ts,
            dur: pair[1].ts - pair[0].ts,
        })
        .collect();

    Some(SyntheticNetworkRequest {
        request_id,
        url,
        origin,
        host,
        scheme,
        frame: first_send.data_str("frame").unwrap_or_default().to_string(),
        pid: first_send.pid,
        tid: first_send.tid,
        ts,
        dur: finish_time - ts,
        send_start_time,
        response_headers_end,
        finish_time,
        priority,
        initial_priority,
        fetch_priority_hint: first_send.data_str("fetchPriorityHint").map(str::to_string),
        resource_type,
        mime_type,
        transfer_size,
        decoded_body_length,
        protocol: response
            .and_then(|r| r.data_str("protocol"))
            .unwrap_or_default()
            .to_string(),
        connection_id: response
            .and_then(|r| r.data_f64("connectionId"))
            .map(|v| v.max(0.0) as u64),
        connection_reused: response
            .and_then(|r| r.data_bool("connectionReused"))
            .unwrap_or(false),
        from_cache: events.marked_as_cached
            || response.and_then(|r| r.data_bool("fromCache")).unwrap_or(false),
        from_service_worker: response
            .and_then(|r| r.data_bool("fromServiceWorker"))
            .unwrap_or(false),
        status_code: response
            .and_then(|r| r.data_i64("statusCode"))
            .and_then(|s| u16::try_from(s).ok()),
        failed: finish.and_then(|f| f.data_bool("didFail")).unwrap_or(false),
        render_blocking: first_send
            .data_str("renderBlocking")
            .map(RenderBlocking::parse)
            .unwrap_or_default(),
        initiator,
        is_link_preload: first_send.data_bool("isLinkPreload").unwrap_or(false),
        request_method: first_send.data_str("requestMethod").unwrap_or("GET").to_string(),
        timing,
        redirects,
    })
}

#[async_trait]
impl TraceHandler for NetworkRequestsHandler {
    fn name(&self) -> HandlerName {
        HandlerName::NetworkRequests
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

        let is_network_event = matches!(
            event.name.as_str(),
            names::RESOURCE_WILL_SEND_REQUEST
                | names::RESOURCE_SEND_REQUEST
                | names::RESOURCE_CHANGE_PRIORITY
                | names::RESOURCE_RECEIVE_RESPONSE
                | names::RESOURCE_RECEIVED_DATA
                | names::RESOURCE_FINISH
                | names::RESOURCE_MARK_AS_CACHED
        );
        if !is_network_event {
            return Ok(());
        }
        let Some(request_id) = event.data_str("requestId") else {
            return Ok(());
        };

        let entry = self.requests.entry(request_id.to_string()).or_default();
        match event.name.as_str() {
            names::RESOURCE_WILL_SEND_REQUEST => {
                entry.will_send.get_or_insert_with(|| Arc::clone(event));
            }
            names::RESOURCE_SEND_REQUEST => entry.send_requests.push(Arc::clone(event)),
            names::RESOURCE_CHANGE_PRIORITY => entry.change_priority = Some(Arc::clone(event)),
            names::RESOURCE_RECEIVE_RESPONSE => entry.receive_response = Some(Arc::clone(event)),
            names::RESOURCE_RECEIVED_DATA => entry.received_data.push(Arc::clone(event)),
            names::RESOURCE_FINISH => entry.finish = Some(Arc::clone(event)),
            _ => entry.marked_as_cached = true,
        }
        Ok(())
    }

    async fn finalize(&mut self, _parsed: &ParsedTraceData) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;
        let data = self.build();
        debug!(
            "NetworkRequests: {} requests across {} origins",
            data.by_time.len(),
            data.by_origin.len()
        );
        self.result = Some(Arc::new(data));
        self.state = HandlerState::Finalized;
        Ok(())
    }

    fn data(&self) -> Result<HandlerData, HandlerError> {
        self.state.ensure_finalized(self.name())?;
        self.result
            .clone()
            .map(HandlerData::NetworkRequests)
            .ok_or(HandlerError::NotFinalized(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    fn event(value: Value) -> Arc<TraceEvent> {
        Arc::new(serde_json::from_value(value).unwrap())
    }

    fn run(events: Vec<Arc<TraceEvent>>) -> Arc<NetworkRequestsData> {
        let mut handler = NetworkRequestsHandler::new();
        handler.reset();
        for e in &events {
            handler.handle_event(e).unwrap();
        }
        block_on(handler.finalize(&ParsedTraceData::default())).unwrap();
        match handler.data().unwrap() {
            HandlerData::NetworkRequests(data) => data,
            other => panic!("unexpected data {:?}", other.name()),
        }
    }

    #[test]
    fn test_request_assembled_from_lifecycle_events() {
        let data = run(vec![
            event(json!({"name": "ResourceSendRequest", "ph": "I", "ts": 1_000_000, "pid": 2, "tid": 1,
                "args": {"data": {"requestId": "R1", "url": "https://a.test/style.css", "frame": "F",
                    "priority": "VeryHigh", "renderBlocking": "blocking", "resourceType": "Stylesheet",
                    "initiator": {"type": "parser", "url": "https://a.test/"}}}})),
            event(json!({"name": "ResourceReceiveResponse", "ph": "I", "ts": 1_050_000, "pid": 2, "tid": 1,
                "args": {"data": {"requestId": "R1", "mimeType": "text/css", "protocol": "h2",
                    "connectionId": 12, "connectionReused": false, "statusCode": 200,
                    "timing": {"requestTime": 1.0, "sendStart": 1.0, "receiveHeadersEnd": 40.0,
                               "connectStart": 2.0, "connectEnd": 30.0}}}})),
            event(json!({"name": "ResourceFinish", "ph": "I", "ts": 1_080_000, "pid": 2, "tid": 1,
                "args": {"data": {"requestId": "R1", "finishTime": 1.075, "encodedDataLength": 5000, "decodedBodyLength": 20000}}})),
        ]);

        assert_eq!(data.by_time.len(), 1);
        let request = &data.by_time[0];
        assert_eq!(request.origin, "https://a.test");
        assert_eq!(request.resource_type, ResourceType::Stylesheet);
        assert_eq!(request.priority, Priority::VeryHigh);
        assert!(request.render_blocking.is_render_blocking());
        assert!(request.has_render_blocking_priority());
        assert!(request.is_h2());
        assert_eq!(request.send_start_time, MicroSeconds(1_001_000));
        assert_eq!(request.response_headers_end, Some(MicroSeconds(1_040_000)));
        assert_eq!(request.finish_time, MicroSeconds(1_075_000));
        assert_eq!(request.dur, MicroSeconds(75_000));
        assert_eq!(request.transfer_size, 5000);
        assert_eq!(request.connection_id, Some(12));
        assert_eq!(request.initiator_type(), Some("parser"));
        assert_eq!(data.by_origin["https://a.test"].render_blocking.len(), 1);
    }

    #[test]
    fn test_redirects_fold_into_final_request() {
        let data = run(vec![
            event(json!({"name": "ResourceSendRequest", "ph": "I", "ts": 100, "args": {"data": {"requestId": "R", "url": "http://a.test/", "priority": "VeryHigh"}}})),
            event(json!({"name": "ResourceSendRequest", "ph": "I", "ts": 300, "args": {"data": {"requestId": "R", "url": "https://a.test/", "priority": "VeryHigh"}}})),
            event(json!({"name": "ResourceFinish", "ph": "I", "ts": 900, "args": {"data": {"requestId": "R"}}})),
        ]);

        let request = &data.by_id["R"];
        assert_eq!(request.url, "https://a.test/");
        assert_eq!(request.ts, MicroSeconds(100));
        assert_eq!(request.redirects.len(), 1);
        assert_eq!(request.redirects[0].url, "http://a.test/");
        assert_eq!(request.redirects[0].dur, MicroSeconds(200));
        assert_eq!(request.finish_time, MicroSeconds(900));
    }

    #[test]
    fn test_cache_and_priority_changes() {
        let data = run(vec![
            event(json!({"name": "ResourceSendRequest", "ph": "I", "ts": 10, "args": {"data": {"requestId": "I", "url": "https://a.test/hero.png", "priority": "Low"}}})),
            event(json!({"name": "ResourceChangePriority", "ph": "I", "ts": 20, "args": {"data": {"requestId": "I", "priority": "High"}}})),
            event(json!({"name": "ResourceReceiveResponse", "ph": "I", "ts": 30, "args": {"data": {"requestId": "I", "mimeType": "image/png"}}})),
            event(json!({"name": "ResourceMarkAsCached", "ph": "I", "ts": 31, "args": {"data": {"requestId": "I"}}})),
        ]);

        let request = &data.by_id["I"];
        assert_eq!(request.initial_priority, Priority::Low);
        assert_eq!(request.priority, Priority::High);
        assert_eq!(request.resource_type, ResourceType::Image);
        assert!(request.from_cache);
        assert!(request.is_connectionless());
        assert_eq!(request.finish_time, MicroSeconds(30));
    }

    #[test]
    fn test_requests_without_send_are_dropped() {
        let data = run(vec![event(json!({"name": "ResourceFinish", "ph": "I", "ts": 10, "args": {"data": {"requestId": "orphan"}}}))]);
        assert!(data.by_time.is_empty());
    }
}
