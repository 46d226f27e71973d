//! Shared trace fixtures for integration tests.
#![allow(dead_code)]

use futures::executor::block_on;
use page_trace_studio::handlers::ParsedTraceData;
use page_trace_studio::parser::{parse_trace, TraceFile};
use page_trace_studio::processor::TraceProcessor;
use serde_json::{json, Value};

pub const FRAME: &str = "MAIN";
pub const BROWSER_PID: i64 = 1;
pub const RENDERER_PID: i64 = 2;
pub const MAIN_TID: i64 = 1;

/// A network request to add to a trace, times in microseconds
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub id: String,
    pub url: String,
    pub resource_type: &'static str,
    pub priority: &'static str,
    pub render_blocking: &'static str,
    pub mime_type: &'static str,
    pub start: i64,
    /// Offset of the response headers from `start`, milliseconds
    pub headers_end_ms: f64,
    pub end: i64,
    pub transfer_size: u64,
}

impl RequestSpec {
    pub fn new(id: &str, url: &str, resource_type: &'static str, start: i64, end: i64) -> Self {
        let (mime_type, priority) = match resource_type {
            "Document" => ("text/html", "VeryHigh"),
            "Stylesheet" => ("text/css", "VeryHigh"),
            "Script" => ("application/javascript", "High"),
            "Font" => ("font/woff2", "High"),
            "Image" => ("image/png", "Low"),
            _ => ("text/plain", "Low"),
        };
        Self {
            id: id.to_string(),
            url: url.to_string(),
            resource_type,
            priority,
            render_blocking: "non_blocking",
            mime_type,
            start,
            headers_end_ms: ((end - start) as f64 / 1000.0) / 2.0,
            end,
            transfer_size: 10_000,
        }
    }

    pub fn blocking(mut self) -> Self {
        self.render_blocking = "blocking";
        self
    }

    pub fn headers_after_ms(mut self, ms: f64) -> Self {
        self.headers_end_ms = ms;
        self
    }

    pub fn size(mut self, bytes: u64) -> Self {
        self.transfer_size = bytes;
        self
    }
}

/// Builds trace JSON the way Chrome writes it
#[derive(Debug, Clone)]
pub struct TraceBuilder {
    events: Vec<Value>,
}

impl Default for TraceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceBuilder {
    /// Browser and renderer main threads, and a main frame hosted by the renderer
    pub fn new() -> Self {
        let events = vec![
            json!({"name": "thread_name", "ph": "M", "ts": 0, "pid": BROWSER_PID, "tid": MAIN_TID,
                "args": {"name": "CrBrowserMain"}}),
            json!({"name": "thread_name", "ph": "M", "ts": 0, "pid": RENDERER_PID, "tid": MAIN_TID,
                "args": {"name": "CrRendererMain"}}),
            json!({"name": "TracingStartedInBrowser", "ph": "I", "ts": 100, "pid": BROWSER_PID, "tid": MAIN_TID,
                "cat": "disabled-by-default-devtools.timeline",
                "args": {"data": {"frames": [{"frame": FRAME, "url": "about:blank", "processId": RENDERER_PID}]}}}),
        ];
        Self { events }
    }

    /// Only the raw events, without the default threads and frame
    pub fn empty() -> Self {
        Self { events: Vec::new() }
    }

    pub fn event(mut self, event: Value) -> Self {
        self.events.push(event);
        self
    }

    pub fn navigation(self, ts: i64, navigation_id: &str, url: &str) -> Self {
        self.event(json!({"name": "navigationStart", "ph": "R", "ts": ts, "pid": RENDERER_PID, "tid": MAIN_TID,
            "cat": "blink.user_timing",
            "args": {"frame": FRAME, "data": {"navigationId": navigation_id, "documentLoaderURL": url,
                "isLoadingMainFrame": true, "isOutermostMainFrame": true}}}))
    }

    /// Send, response and finish events for `request`
    pub fn request(self, request: &RequestSpec) -> Self {
        let request_time = request.start as f64 / 1_000_000.0;
        let headers_ts = request.start + (request.headers_end_ms * 1000.0) as i64;
        self.event(json!({"name": "ResourceSendRequest", "ph": "I", "ts": request.start,
                "pid": RENDERER_PID, "tid": MAIN_TID, "cat": "devtools.timeline",
                "args": {"data": {"requestId": request.id, "url": request.url, "frame": FRAME,
                    "priority": request.priority, "renderBlocking": request.render_blocking,
                    "resourceType": request.resource_type, "requestMethod": "GET",
                    "initiator": {"type": "parser", "url": "https://example.test/"}}}}))
            .event(json!({"name": "ResourceReceiveResponse", "ph": "I", "ts": headers_ts,
                "pid": RENDERER_PID, "tid": MAIN_TID, "cat": "devtools.timeline",
                "args": {"data": {"requestId": request.id, "frame": FRAME, "mimeType": request.mime_type,
                    "protocol": "http/1.1", "statusCode": 200, "connectionId": 7, "connectionReused": false,
                    "encodedDataLength": 300,
                    "timing": {"requestTime": request_time, "dnsStart": -1, "dnsEnd": -1,
                        "connectStart": -1, "connectEnd": -1, "sslStart": -1, "sslEnd": -1,
                        "sendStart": 0.5, "sendEnd": 1.0, "receiveHeadersStart": request.headers_end_ms - 1.0,
                        "receiveHeadersEnd": request.headers_end_ms}}}}))
            .event(json!({"name": "ResourceFinish", "ph": "I", "ts": request.end,
                "pid": RENDERER_PID, "tid": MAIN_TID, "cat": "devtools.timeline",
                "args": {"data": {"requestId": request.id, "finishTime": request.end as f64 / 1_000_000.0,
                    "encodedDataLength": request.transfer_size, "decodedBodyLength": request.transfer_size * 3,
                    "didFail": false}}}))
    }

    /// A top-level renderer main-thread task with nested complete events
    pub fn task(self, ts: i64, dur: i64, children: &[(&str, Value)]) -> Self {
        let mut builder = self.event(json!({"name": "RunTask", "ph": "X", "ts": ts, "dur": dur,
            "pid": RENDERER_PID, "tid": MAIN_TID, "cat": "disabled-by-default-devtools.timeline", "args": {}}));
        let step = dur / (children.len() as i64 + 1);
        for (i, (name, data)) in children.iter().enumerate() {
            let child_ts = ts + step * i as i64 + 1;
            builder = builder.event(json!({"name": name, "ph": "X", "ts": child_ts, "dur": step.max(1) - 1,
                "pid": RENDERER_PID, "tid": MAIN_TID, "cat": "devtools.timeline", "args": {"data": data}}));
        }
        builder
    }

    pub fn first_contentful_paint(self, ts: i64, navigation_id: &str) -> Self {
        self.event(json!({"name": "firstContentfulPaint", "ph": "R", "ts": ts, "pid": RENDERER_PID, "tid": MAIN_TID,
            "cat": "loading,rail,devtools.timeline",
            "args": {"frame": FRAME, "data": {"navigationId": navigation_id}}}))
    }

    pub fn largest_contentful_paint(
        self,
        ts: i64,
        navigation_id: &str,
        candidate_index: i64,
    ) -> Self {
        self.event(json!({"name": "largestContentfulPaint::Candidate", "ph": "R", "ts": ts,
            "pid": RENDERER_PID, "tid": MAIN_TID, "cat": "loading,rail,devtools.timeline",
            "args": {"frame": FRAME, "data": {"navigationId": navigation_id, "candidateIndex": candidate_index,
                "isOutermostMainFrame": true, "isMainFrame": true, "type": "text", "size": 5000}}}))
    }

    pub fn user_timing_mark(self, ts: i64, name: &str) -> Self {
        self.event(json!({"name": name, "ph": "R", "ts": ts, "pid": RENDERER_PID, "tid": MAIN_TID,
            "cat": "blink.user_timing", "args": {"data": {}}}))
    }

    pub fn viewport(self, ts: i64, content: &str) -> Self {
        self.event(json!({"name": "ParseMetaViewport", "ph": "I", "ts": ts, "pid": RENDERER_PID, "tid": MAIN_TID,
            "cat": "loading", "args": {"data": {"frame": FRAME, "content": content}}}))
    }

    pub fn build(self) -> Value {
        json!({"traceEvents": self.events, "metadata": {"source": "DevTools"}})
    }

    pub fn trace_file(self) -> TraceFile {
        parse_trace(&self.build()).unwrap()
    }
}

/// Run every handler over `file`
pub fn process(file: TraceFile) -> ParsedTraceData {
    let mut processor = TraceProcessor::with_all_handlers().unwrap();
    block_on(processor.run(file.trace_events)).unwrap()
}

/// One navigation loading a document, a render-blocking stylesheet and a
/// text LCP at +472.3 ms
pub fn simple_page_load() -> TraceBuilder {
    let nav = 1_000_000;
    TraceBuilder::new()
        .navigation(nav, "NAV-1", "https://example.test/")
        .request(
            &RequestSpec::new(
                "NAV-1",
                "https://example.test/",
                "Document",
                nav + 1_000,
                nav + 120_000,
            )
                .headers_after_ms(80.0)
                .size(20_000),
        )
        .task(nav + 125_000, 30_000, &[("ParseHTML", json!({"frame": FRAME}))])
        .request(
            &RequestSpec::new(
                "CSS-1",
                "https://example.test/style.css",
                "Stylesheet",
                nav + 130_000,
                nav + 230_000,
            )
                .blocking()
                .headers_after_ms(50.0)
                .size(10_000),
        )
        .task(nav + 240_000, 40_000, &[
            ("ParseAuthorStyleSheet", json!({"styleSheetUrl": "https://example.test/style.css"})),
            ("Layout", json!({})),
            ("Paint", json!({"frame": FRAME})),
        ])
        .first_contentful_paint(nav + 300_000, "NAV-1")
        .largest_contentful_paint(nav + 472_300, "NAV-1", 1)
        .viewport(nav + 126_000, "width=device-width, initial-scale=1")
}
