//! Per-navigation insights.
//!
//! This module handles:
//! - Resolving a `{frame_id, navigation_id}` context against Meta
//! - Running each insight over the navigation's slice of the trace
//! - Aggregating every insight for every main-frame navigation
//!
//! Expected absences (no LCP, no FCP, no document request) are reported as
//! [`InsightWarning`]s inside a successful result. Missing handler data is
//! an `Err`.

pub mod cls;
pub mod forced_reflow;
pub mod inp;
pub mod lcp;
pub mod render_blocking;
pub mod third_parties;
pub mod viewport;

pub use cls::{CumulativeLayoutShiftInsight, LayoutShiftRootCauses, NonCompositedAnimation};
pub use forced_reflow::{BottomUpCallStack, CallFrame, ForcedReflowEvent, ForcedReflowInsight};
pub use inp::InteractionToNextPaintInsight;
pub use lcp::{LcpInsight, LcpPhases};
pub use render_blocking::RenderBlockingInsight;
pub use third_parties::{EntitySummary, ThirdPartiesInsight};
pub use viewport::ViewportInsight;

use crate::handlers::network_requests::{Priority, ResourceType, SyntheticNetworkRequest};
use crate::handlers::ParsedTraceData;
use crate::helpers::NavigationScope;
use crate::lantern::{self, MetricSummary, NavigationEstimate, SimulationProfile};
use crate::types::MicroSeconds;
use crate::utils::error::InsightError;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Expected data absence, reported alongside a partial result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsightWarning {
    NoFcp,
    NoLcp,
    NoDocumentRequest,
}

/// Report view of a network request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSummary {
    pub request_id: String,
    pub url: String,
    pub resource_type: ResourceType,
    pub priority: Priority,
    pub start_ts: MicroSeconds,
    pub end_ts: MicroSeconds,
    pub transfer_size: u64,
}

impl RequestSummary {
    pub fn new(request: &SyntheticNetworkRequest) -> Self {
        Self {
            request_id: request.request_id.clone(),
            url: request.url.clone(),
            resource_type: request.resource_type,
            priority: request.priority,
            start_ts: request.ts,
            end_ts: request.finish_time,
            transfer_size: request.transfer_size,
        }
    }
}

/// The navigation an insight is computed for
#[derive(Debug, Clone, Copy)]
pub struct InsightContext<'a> {
    pub frame_id: &'a str,
    pub navigation_id: &'a str,
    /// Lantern estimate of the navigation, when one could be computed
    pub lantern: Option<&'a NavigationEstimate>,
}

impl<'a> InsightContext<'a> {
    pub fn new(frame_id: &'a str, navigation_id: &'a str) -> Self {
        Self {
            frame_id,
            navigation_id,
            lantern: None,
        }
    }

    pub fn with_lantern(mut self, estimate: Option<&'a NavigationEstimate>) -> Self {
        self.lantern = estimate;
        self
    }

    /// Resolve the context to its navigation window
    ///
    /// # Errors
    /// * `InsightError::MissingData` - Meta was not run
    /// * `InsightError::NavigationNotFound` - no such navigation in the frame
    pub fn scope(&self, parsed: &ParsedTraceData) -> Result<NavigationScope, InsightError> {
        let meta = parsed.meta()?;
        NavigationScope::resolve(meta, self.frame_id, self.navigation_id)
            .ok_or_else(|| InsightError::NavigationNotFound(self.navigation_id.to_string()))
    }
}

/// Every insight of one navigation
#[derive(Debug, Clone, Default, Serialize)]
pub struct NavigationInsights {
    pub navigation_id: String,
    pub frame_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub start_ts: MicroSeconds,
    /// Lantern metric estimates; empty when the navigation could not be simulated
    pub metrics: Vec<MetricSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lantern_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub largest_contentful_paint: Option<LcpInsight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_blocking: Option<RenderBlockingInsight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<ViewportInsight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cumulative_layout_shift: Option<CumulativeLayoutShiftInsight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub third_parties: Option<ThirdPartiesInsight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction_to_next_paint: Option<InteractionToNextPaintInsight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forced_reflow: Option<ForcedReflowInsight>,
    /// Insights that failed, keyed by insight name
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

impl NavigationInsights {
    pub fn warnings(&self) -> Vec<InsightWarning> {
        let mut warnings: Vec<InsightWarning> = [
            self.largest_contentful_paint.as_ref().map(|i| i.warnings.as_slice()),
            self.render_blocking.as_ref().map(|i| i.warnings.as_slice()),
        ]
        .into_iter()
        .flatten()
        .flatten()
        .copied()
        .collect();
        warnings.sort();
        warnings.dedup();
        warnings
    }
}

/// **Private** - store an insight result, moving failures into `errors`
fn record<T>(
    errors: &mut BTreeMap<String, String>,
    name: &str,
    result: Result<T, InsightError>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("{} insight failed: {}", name, err);
            errors.insert(name.to_string(), err.to_string());
            None
        }
    }
}

/// Run every insight for one navigation
///
/// **Public** - the per-navigation aggregate runner
///
/// # Arguments
/// * `parsed` - Finalized handler data
/// * `frame_id` / `navigation_id` - The navigation
/// * `profile` - Simulation profile for Lantern-backed estimates; `None`
///   skips simulation
///
/// # Errors
/// * `InsightError::NavigationNotFound` - the navigation does not exist
pub fn generate_navigation_insights(
    parsed: &ParsedTraceData,
    frame_id: &str,
    navigation_id: &str,
    profile: Option<&SimulationProfile>,
) -> Result<NavigationInsights, InsightError> {
    let scope = InsightContext::new(frame_id, navigation_id).scope(parsed)?;

    let mut insights = NavigationInsights {
        navigation_id: navigation_id.to_string(),
        frame_id: frame_id.to_string(),
        url: scope.document_url().map(str::to_string),
        start_ts: scope.navigation.ts,
        ..NavigationInsights::default()
    };

    let estimate = match profile {
        Some(profile) => match lantern::estimate_navigation(
            parsed,
            frame_id,
            navigation_id,
            profile,
        ) {
            Ok(estimate) => Some(estimate),
            Err(err) => {
                debug!("Lantern estimate unavailable for {}: {}", navigation_id, err);
                insights.lantern_error = Some(err.to_string());
                None
            }
        },
        None => None,
    };
    if let Some(estimate) = &estimate {
        insights.metrics = estimate.metrics.summaries();
    }

    let context = InsightContext::new(frame_id, navigation_id).with_lantern(estimate.as_ref());
    let errors = &mut insights.errors;
    insights.largest_contentful_paint =
        record(errors, "LargestContentfulPaint", lcp::generate_insight(parsed, &context));
    insights.render_blocking =
        record(errors, "RenderBlocking", render_blocking::generate_insight(parsed, &context));
    insights.viewport = record(errors, "Viewport", viewport::generate_insight(parsed, &context));
    insights.cumulative_layout_shift =
        record(errors, "CumulativeLayoutShift", cls::generate_insight(parsed, &context));
    insights.third_parties =
        record(errors, "ThirdParties", third_parties::generate_insight(parsed, &context));
    insights.interaction_to_next_paint =
        record(errors, "InteractionToNextPaint", inp::generate_insight(parsed, &context));
    insights.forced_reflow =
        record(errors, "ForcedReflow", forced_reflow::generate_insight(parsed, &context));

    Ok(insights)
}

/// Run every insight for every main-frame navigation, in time order
///
/// # Errors
/// * `InsightError::MissingData` - Meta was not run
pub fn generate_insights(
    parsed: &ParsedTraceData,
    profile: Option<&SimulationProfile>,
) -> Result<Vec<NavigationInsights>, InsightError> {
    let meta = parsed.meta()?;
    let frame_id = meta.main_frame_id.clone();
    let navigation_ids = meta.main_frame_navigation_ids();
    info!(
        "Generating insights for {} navigation(s) of frame {}",
        navigation_ids.len(),
        frame_id
    );

    navigation_ids
        .iter()
        .map(|navigation_id| {
            generate_navigation_insights(parsed, &frame_id, navigation_id, profile)
        })
        .collect()
}
