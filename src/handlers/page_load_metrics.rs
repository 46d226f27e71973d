//! Page-load marker events (FP, FCP, LCP, DCL, load) per navigation.

use super::types::{
    require, HandlerData, HandlerName, HandlerState, ParsedTraceData, TraceHandler,
};
use crate::helpers::navigation::navigation_for_timestamp;
use crate::types::{names, MicroSeconds, TraceEvent};
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetricName {
    FirstPaint,
    FirstContentfulPaint,
    LargestContentfulPaint,
    DomContentLoaded,
    Load,
}

impl MetricName {
    pub fn short_name(self) -> &'static str {
        match self {
            MetricName::FirstPaint => "FP",
            MetricName::FirstContentfulPaint => "FCP",
            MetricName::LargestContentfulPaint => "LCP",
            MetricName::DomContentLoaded => "DCL",
            MetricName::Load => "L",
        }
    }

    fn for_event(name: &str) -> Option<Self> {
        match name {
            names::FIRST_PAINT => Some(MetricName::FirstPaint),
            names::FIRST_CONTENTFUL_PAINT => Some(MetricName::FirstContentfulPaint),
            names::LCP_CANDIDATE => Some(MetricName::LargestContentfulPaint),
            names::MARK_DOM_CONTENT => Some(MetricName::DomContentLoaded),
            names::MARK_LOAD => Some(MetricName::Load),
            _ => None,
        }
    }
}

/// A marker event measured against its navigation
#[derive(Debug, Clone)]
pub struct MetricScore {
    pub metric: MetricName,
    pub event: Arc<TraceEvent>,
    pub navigation: Arc<TraceEvent>,
    /// Offset from the navigation start
    pub timing: MicroSeconds,
}

impl MetricScore {
    pub fn timing_ms(&self) -> f64 {
        self.timing.as_millis_f64()
    }
}

pub type ScoresByNavigation = HashMap<String, BTreeMap<MetricName, MetricScore>>;

#[derive(Debug, Clone, Default)]
pub struct PageLoadMetricsData {
    /// frame id -> navigation id -> metric -> score
    pub metric_scores_by_frame_id: HashMap<String, ScoresByNavigation>,
    pub all_marker_events: Vec<Arc<TraceEvent>>,
}

impl PageLoadMetricsData {
    pub fn score(
        &self,
        frame_id: &str,
        navigation_id: &str,
        metric: MetricName,
    ) -> Option<&MetricScore> {
        self.metric_scores_by_frame_id
            .get(frame_id)?
            .get(navigation_id)?
            .get(&metric)
    }
}

#[derive(Debug, Default)]
pub struct PageLoadMetricsHandler {
    state: HandlerState,
    markers: Vec<Arc<TraceEvent>>,
    result: Option<Arc<PageLoadMetricsData>>,
}

impl PageLoadMetricsHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

fn candidate_index(event: &TraceEvent) -> i64 {
    event.data_i64("candidateIndex").unwrap_or(0)
}

/// DCL and load marks from subframes are ignored
fn is_main_frame_marker(event: &TraceEvent) -> bool {
    event
        .data_bool("isOutermostMainFrame")
        .or_else(|| event.data_bool("isMainFrame"))
        .unwrap_or(true)
}

#[async_trait]
impl TraceHandler for PageLoadMetricsHandler {
    fn name(&self) -> HandlerName {
        HandlerName::PageLoadMetrics
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
        if MetricName::for_event(&event.name).is_some() || event.name == names::LCP_INVALIDATE {
            self.markers.push(Arc::clone(event));
        }
        Ok(())
    }

    async fn finalize(&mut self, parsed: &ParsedTraceData) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;
        let meta = require(self.name(), HandlerName::Meta, parsed.meta())?;

        let mut markers = std::mem::take(&mut self.markers);
        markers.sort_by_key(|m| m.ts);

        let mut scores: HashMap<String, ScoresByNavigation> = HashMap::new();
        for marker in &markers {
            let Some(frame_id) = marker.frame_id() else {
                continue;
            };
            let navigation = marker
                .data_str("navigationId")
                .and_then(|id| meta.navigations_by_navigation_id.get(id))
                .filter(|nav| nav.ts <= marker.ts)
                .or_else(|| {
                    navigation_for_timestamp(marker.ts, frame_id, &meta.navigations_by_frame_id)
                });
            let Some(navigation) = navigation else {
                continue;
            };
            let Some(navigation_id) = navigation.data_str("navigationId") else {
                continue;
            };

            let by_metric = scores
                .entry(frame_id.to_string())
                .or_default()
                .entry(navigation_id.to_string())
                .or_default();

            if marker.name == names::LCP_INVALIDATE {
                by_metric.remove(&MetricName::LargestContentfulPaint);
                continue;
            }
            let Some(metric) = MetricName::for_event(&marker.name) else {
                continue;
            };

            let replace = match (metric, by_metric.get(&metric)) {
                (_, None) => true,
                (MetricName::LargestContentfulPaint, Some(existing)) => {
                    candidate_index(marker) >= candidate_index(&existing.event)
                }
                // First FP/FCP/DCL/load wins
                _ => false,
            };
            let relevant = match metric {
                MetricName::DomContentLoaded | MetricName::Load => is_main_frame_marker(marker),
                _ => true,
            };
            if replace && relevant {
                by_metric.insert(
                    metric,
                    MetricScore {
                        metric,
                        event: Arc::clone(marker),
                        navigation: Arc::clone(navigation),
                        timing: marker.ts - navigation.ts,
                    },
                );
            }
        }

        debug!("PageLoadMetrics: {} markers across {} frames", markers.len(), scores.len());
        self.result = Some(Arc::new(PageLoadMetricsData {
            metric_scores_by_frame_id: scores,
            all_marker_events: markers,
        }));
        self.state = HandlerState::Finalized;
        Ok(())
    }

    fn data(&self) -> Result<HandlerData, HandlerError> {
        self.state.ensure_finalized(self.name())?;
        self.result
            .clone()
            .map(HandlerData::PageLoadMetrics)
            .ok_or(HandlerError::NotFinalized(self.name()))
    }
}
