//! Requests that blocked the first contentful paint.

use super::{InsightContext, InsightWarning, RequestSummary};
use crate::handlers::network_requests::{
    Priority, RenderBlocking, ResourceType, SyntheticNetworkRequest,
};
use crate::handlers::page_load_metrics::MetricName;
use crate::handlers::ParsedTraceData;
use crate::lantern::{NavigationEstimate, NodeId};
use crate::utils::error::InsightError;
use log::debug;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderBlockingInsight {
    pub requests: Vec<RequestSummary>,
    /// FCP improvement if every request above were deferred, per Lantern
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_fcp_savings_ms: Option<f64>,
    pub warnings: Vec<InsightWarning>,
}

/// Whether the loader marked `request` as blocking rendering
///
/// Body parser-blocking requests only count when fetched at a priority
/// that actually holds up the paint.
pub fn is_render_blocking(request: &SyntheticNetworkRequest) -> bool {
    match request.render_blocking {
        RenderBlocking::Blocking => true,
        RenderBlocking::InBodyParserBlocking => {
            let blocking_script = request.resource_type == ResourceType::Script
                && request.priority == Priority::High;
            request.priority == Priority::VeryHigh || blocking_script
        }
        _ => false,
    }
}

/// FCP gain from removing `deferred` request ids from the optimistic FCP graph
///
/// Deferred requests are spliced out, so the work that waited on them now
/// waits only on what they waited on.
fn estimate_savings(
    estimate: &NavigationEstimate,
    deferred: &HashSet<&str>,
) -> Result<f64, InsightError> {
    let fcp_graph = &estimate.metrics.first_contentful_paint.optimistic_graph;
    let deferred_nodes: BTreeSet<NodeId> = fcp_graph
        .nodes()
        .filter(|node| {
            node.request()
                .is_some_and(|request| deferred.contains(request.request_id.as_str()))
        })
        .map(|node| node.id)
        .filter(|id| *id != fcp_graph.root())
        .collect();
    if deferred_nodes.is_empty() {
        return Ok(0.0);
    }

    let before = estimate.simulator.simulate(fcp_graph, Some("renderBlockingBefore"))?;
    let mut minimal = fcp_graph.clone();
    for id in &deferred_nodes {
        minimal.splice_out(*id)?;
    }
    let after = estimate.simulator.simulate(&minimal, Some("renderBlockingAfter"))?;
    debug!(
        "Deferring {} render-blocking node(s): {:.1}ms -> {:.1}ms",
        deferred_nodes.len(),
        before.time_in_ms,
        after.time_in_ms
    );
    Ok((before.time_in_ms - after.time_in_ms).max(0.0))
}

/// Render-blocking insight of one navigation
///
/// # Errors
/// * `InsightError::MissingData` - Meta, PageLoadMetrics or NetworkRequests missing
/// * `InsightError::Lantern` - the savings simulation failed
pub fn generate_insight(
    parsed: &ParsedTraceData,
    context: &InsightContext<'_>,
) -> Result<RenderBlockingInsight, InsightError> {
    let scope = context.scope(parsed)?;
    let metrics = parsed.page_load_metrics()?;
    let requests = parsed.network_requests()?;

    let fcp = metrics.score(
        context.frame_id,
        context.navigation_id,
        MetricName::FirstContentfulPaint,
    );
    let Some(fcp) = fcp else {
        return Ok(RenderBlockingInsight {
            warnings: vec![InsightWarning::NoFcp],
            ..RenderBlockingInsight::default()
        });
    };
    let fcp_ts = fcp.event.ts;

    let blocking: Vec<_> = requests
        .by_time
        .iter()
        .filter(|request| request.frame == context.frame_id)
        .filter(|request| scope.contains(request.ts) && request.ts < fcp_ts)
        .filter(|request| is_render_blocking(request))
        .collect();

    let estimated_fcp_savings_ms = match context.lantern {
        Some(estimate) => {
            let ids: HashSet<&str> = blocking
                .iter()
                .map(|request| request.request_id.as_str())
                .collect();
            Some(estimate_savings(estimate, &ids)?)
        }
        None => None,
    };

    Ok(RenderBlockingInsight {
        requests: blocking.iter().map(|request| RequestSummary::new(request)).collect(),
        estimated_fcp_savings_ms,
        warnings: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(
        blocking: RenderBlocking,
        kind: ResourceType,
        priority: Priority,
    ) -> SyntheticNetworkRequest {
        SyntheticNetworkRequest {
            render_blocking: blocking,
            resource_type: kind,
            priority,
            ..SyntheticNetworkRequest::default()
        }
    }

    #[test]
    fn test_blocking_classification() {
        assert!(is_render_blocking(&request(
            RenderBlocking::Blocking,
            ResourceType::Stylesheet,
            Priority::Low
        )));
        assert!(is_render_blocking(&request(
            RenderBlocking::InBodyParserBlocking,
            ResourceType::Script,
            Priority::High
        )));
        assert!(!is_render_blocking(&request(
            RenderBlocking::InBodyParserBlocking,
            ResourceType::Script,
            Priority::Medium
        )));
        assert!(!is_render_blocking(&request(
            RenderBlocking::NonBlocking,
            ResourceType::Stylesheet,
            Priority::VeryHigh
        )));
    }
}
