//! Largest Contentful Paint phases and image discovery.
//!
//! The LCP time is split into
//! - time to first byte of the document,
//! - resource load delay (first byte until the LCP image request starts),
//! - resource load time,
//! - render delay (until the paint).
//!
//! Text LCPs have no request, so only TTFB and render delay apply.

use super::{InsightContext, InsightWarning, RequestSummary};
use crate::handlers::network_requests::SyntheticNetworkRequest;
use crate::handlers::page_load_metrics::MetricName;
use crate::handlers::ParsedTraceData;
use crate::helpers::NavigationScope;
use crate::lantern::graph_builder::find_main_document;
use crate::types::MicroSeconds;
use crate::utils::error::InsightError;
use serde::Serialize;
use std::sync::Arc;

/// Phase durations in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LcpPhases {
    pub ttfb: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_delay: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_time: Option<f64>,
    pub render_delay: f64,
}

impl LcpPhases {
    pub fn total(&self) -> f64 {
        self.ttfb
            + self.load_delay.unwrap_or(0.0)
            + self.load_time.unwrap_or(0.0)
            + self.render_delay
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LcpInsight {
    /// Relative to the navigation start
    pub lcp_ms: Option<f64>,
    /// Trace clock, in milliseconds
    pub lcp_ts: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phases: Option<LcpPhases>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lcp_request: Option<RequestSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub should_remove_lazy_loading: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub should_preload_image: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub should_increase_priority_hint: Option<bool>,
    pub warnings: Vec<InsightWarning>,
}

/// Arrival of the document's first byte
fn first_byte_of(document: &SyntheticNetworkRequest) -> MicroSeconds {
    document
        .timing
        .as_ref()
        .filter(|timing| timing.receive_headers_end >= 0.0)
        .map(|timing| timing.at(timing.receive_headers_end))
        .unwrap_or_else(|| document.first_byte_time())
}

/// Split `lcp_ms` into phases
///
/// # Arguments
/// * `navigation_start` - Trace time of the navigation
/// * `first_byte` - Trace time the document's first byte arrived
/// * `lcp_ms` - LCP relative to the navigation start
/// * `lcp_request` - `(start, end)` trace times of the LCP image request
pub fn breakdown_phases(
    navigation_start: MicroSeconds,
    first_byte: MicroSeconds,
    lcp_ms: f64,
    lcp_request: Option<(MicroSeconds, MicroSeconds)>,
) -> LcpPhases {
    let ttfb = (first_byte - navigation_start).as_millis_f64();
    let Some((start, end)) = lcp_request else {
        return LcpPhases {
            ttfb,
            load_delay: None,
            load_time: None,
            render_delay: lcp_ms - ttfb,
        };
    };
    let resource_start = (start - navigation_start).as_millis_f64();
    let resource_end = (end - navigation_start).as_millis_f64();
    LcpPhases {
        ttfb,
        load_delay: Some(resource_start - ttfb),
        load_time: Some(resource_end - resource_start),
        render_delay: lcp_ms - resource_end,
    }
}

/// The request that fetched the LCP image, if the LCP was an image
fn find_lcp_request(
    parsed: &ParsedTraceData,
    scope: &NavigationScope,
    dom_node_id: Option<i64>,
) -> Result<Option<Arc<SyntheticNetworkRequest>>, InsightError> {
    let Some(dom_node_id) = dom_node_id else {
        return Ok(None);
    };
    let images = parsed.largest_image_paint()?;
    let Some(url) = images.image_url(dom_node_id) else {
        return Ok(None);
    };
    let requests = parsed.network_requests()?;
    Ok(requests
        .by_time
        .iter()
        .find(|request| request.url == url && scope.contains(request.ts))
        .cloned())
}

/// LCP insight of one navigation
///
/// # Errors
/// * `InsightError::MissingData` - Meta, PageLoadMetrics, NetworkRequests or
///   LargestImagePaint missing
/// * `InsightError::NavigationNotFound` - unknown navigation
pub fn generate_insight(
    parsed: &ParsedTraceData,
    context: &InsightContext<'_>,
) -> Result<LcpInsight, InsightError> {
    let scope = context.scope(parsed)?;
    let metrics = parsed.page_load_metrics()?;

    let lcp = metrics.score(
        context.frame_id,
        context.navigation_id,
        MetricName::LargestContentfulPaint,
    );
    let Some(score) = lcp else {
        return Ok(LcpInsight {
            warnings: vec![InsightWarning::NoLcp],
            ..LcpInsight::default()
        });
    };
    let lcp_event = Arc::clone(&score.event);
    let lcp_ms = score.timing_ms();
    let mut insight = LcpInsight {
        lcp_ms: Some(lcp_ms),
        lcp_ts: Some(lcp_event.ts.as_millis_f64()),
        ..LcpInsight::default()
    };

    let lcp_request = find_lcp_request(parsed, &scope, lcp_event.data_i64("nodeId"))?;

    let requests = parsed.network_requests()?;
    let Some(document) = find_main_document(&requests.by_time, &scope) else {
        insight.warnings.push(InsightWarning::NoDocumentRequest);
        return Ok(insight);
    };

    insight.phases = Some(breakdown_phases(
        scope.navigation.ts,
        first_byte_of(&document),
        lcp_ms,
        lcp_request.as_ref().map(|request| (request.ts, request.finish_time)),
    ));

    if let Some(request) = lcp_request {
        let preloaded = request.is_link_preload || request.initiator_type() == Some("preload");
        insight.should_remove_lazy_loading =
            Some(lcp_event.data_str("loadingAttr") == Some("lazy"));
        insight.should_preload_image = Some(!preloaded);
        insight.should_increase_priority_hint =
            Some(request.fetch_priority_hint.as_deref() != Some("high"));
        insight.lcp_request = Some(RequestSummary::new(&request));
    }
    Ok(insight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_text_lcp_has_two_phases() {
        let phases =
            breakdown_phases(MicroSeconds(1_000_000), MicroSeconds(1_100_000), 472.3, None);
        assert_eq!(phases.ttfb, 100.0);
        assert!((phases.render_delay - 372.3).abs() < 1e-9);
        assert_eq!(phases.load_delay, None);
        assert!((phases.total() - 472.3).abs() < 1e-9);
    }

    #[test]
    fn test_image_lcp_has_four_phases() {
        let phases = breakdown_phases(
            MicroSeconds(0),
            MicroSeconds(100_000),
            600.0,
            Some((MicroSeconds(250_000), MicroSeconds(450_000))),
        );
        assert_eq!(
            phases,
            LcpPhases {
                ttfb: 100.0,
                load_delay: Some(150.0),
                load_time: Some(200.0),
                render_delay: 150.0,
            }
        );
        assert_eq!(phases.total(), 600.0);
    }

    #[test]
    fn test_first_byte_prefers_loader_timing() {
        use crate::handlers::network_requests::ResourceTiming;
        let request = SyntheticNetworkRequest {
            response_headers_end: Some(MicroSeconds(9_000_000)),
            timing: Some(ResourceTiming {
                request_time: 1.0,
                dns_start: -1.0,
                dns_end: -1.0,
                connect_start: -1.0,
                connect_end: -1.0,
                ssl_start: -1.0,
                ssl_end: -1.0,
                send_start: 1.0,
                send_end: 2.0,
                receive_headers_start: 40.0,
                receive_headers_end: 50.0,
            }),
            ..SyntheticNetworkRequest::default()
        };
        assert_eq!(first_byte_of(&request), MicroSeconds(1_050_000));
        let without = SyntheticNetworkRequest {
            timing: None,
            ..request
        };
        assert_eq!(first_byte_of(&without), MicroSeconds(9_000_000));
    }
}
