//! Layout shifts clustered into session windows.
//!
//! A new cluster starts when more than a second passes since the previous
//! shift, when a cluster would exceed five seconds, or when a main-frame
//! navigation happens in between. Shifts right after user input do not
//! count.

use super::types::{
    require, HandlerData, HandlerName, HandlerState, ParsedTraceData, TraceHandler,
};
use crate::helpers::navigation::navigation_id;
use crate::types::{names, MicroSeconds, TraceEvent};
use crate::utils::config::{LAYOUT_SHIFT_MAX_SESSION_US, LAYOUT_SHIFT_SESSION_GAP_US};
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// Weighted score of one shift
pub fn shift_score(event: &TraceEvent) -> f64 {
    event
        .data_f64("weighted_score_delta")
        .or_else(|| event.data_f64("score"))
        .unwrap_or(0.0)
}

#[derive(Debug, Clone)]
pub struct LayoutShiftCluster {
    pub events: Vec<Arc<TraceEvent>>,
    pub start: MicroSeconds,
    /// Timestamp of the last shift in the cluster
    pub end: MicroSeconds,
    pub cumulative_score: f64,
    pub navigation_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LayoutShiftsData {
    /// Shifts that count towards CLS, in time order
    pub layout_shifts: Vec<Arc<TraceEvent>>,
    pub clusters: Vec<Arc<LayoutShiftCluster>>,
    pub render_frame_impl_create_child_frame_events: Vec<Arc<TraceEvent>>,
    /// Worst cluster score per main-frame navigation
    pub cls_by_navigation: HashMap<String, f64>,
    /// Worst cluster score across the trace
    pub session_max_score: f64,
}

#[derive(Debug, Default)]
pub struct LayoutShiftsHandler {
    state: HandlerState,
    shifts: Vec<Arc<TraceEvent>>,
    child_frames: Vec<Arc<TraceEvent>>,
    result: Option<Arc<LayoutShiftsData>>,
}

impl LayoutShiftsHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

fn counts_towards_cls(event: &TraceEvent) -> bool {
    !event.data_bool("had_recent_input").unwrap_or(false)
        && event.data_bool("is_main_frame").unwrap_or(true)
}

/// Group time-ordered shifts into session windows
pub fn cluster_shifts(
    shifts: &[Arc<TraceEvent>],
    main_frame_navigations: &[Arc<TraceEvent>],
) -> Vec<LayoutShiftCluster> {
    let navigation_for = |ts: MicroSeconds| -> Option<String> {
        let index = main_frame_navigations.partition_point(|nav| nav.ts <= ts);
        index
            .checked_sub(1)
            .and_then(|i| navigation_id(&main_frame_navigations[i]).map(str::to_string))
    };

    let mut clusters: Vec<LayoutShiftCluster> = Vec::new();
    for shift in shifts {
        let nav = navigation_for(shift.ts);
        let starts_new = match clusters.last() {
            None => true,
            Some(current) => {
                shift.ts - current.end > MicroSeconds(LAYOUT_SHIFT_SESSION_GAP_US)
                    || shift.ts - current.start > MicroSeconds(LAYOUT_SHIFT_MAX_SESSION_US)
                    || current.navigation_id != nav
            }
        };
        if starts_new {
            clusters.push(LayoutShiftCluster {
                events: Vec::new(),
                start: shift.ts,
                end: shift.ts,
                cumulative_score: 0.0,
                navigation_id: nav,
            });
        }
        if let Some(current) = clusters.last_mut() {
            current.events.push(Arc::clone(shift));
            current.end = shift.ts;
            current.cumulative_score += shift_score(shift);
        }
    }
    clusters
}

#[async_trait]
impl TraceHandler for LayoutShiftsHandler {
    fn name(&self) -> HandlerName {
        HandlerName::LayoutShifts
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
        match event.name.as_str() {
            names::LAYOUT_SHIFT if counts_towards_cls(event) => self.shifts.push(Arc::clone(event)),
            names::RENDER_FRAME_IMPL_CREATE_CHILD_FRAME => {
                self.child_frames.push(Arc::clone(event))
            }
            _ => {}
        }
        Ok(())
    }

    async fn finalize(&mut self, parsed: &ParsedTraceData) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;
        let meta = require(self.name(), HandlerName::Meta, parsed.meta())?;

        let mut shifts = std::mem::take(&mut self.shifts);
        shifts.sort_by_key(|s| s.ts);
        let mut child_frames = std::mem::take(&mut self.child_frames);
        child_frames.sort_by_key(|e| e.ts);

        let clusters: Vec<Arc<LayoutShiftCluster>> =
            cluster_shifts(&shifts, &meta.main_frame_navigations)
                .into_iter()
                .map(Arc::new)
                .collect();

        let mut cls_by_navigation: HashMap<String, f64> = HashMap::new();
        for cluster in &clusters {
            if let Some(nav) = &cluster.navigation_id {
                let worst = cls_by_navigation.entry(nav.clone()).or_insert(0.0);
                *worst = worst.max(cluster.cumulative_score);
            }
        }
        let session_max_score = clusters
            .iter()
            .map(|c| c.cumulative_score)
            .fold(0.0, f64::max);

        debug!(
            "LayoutShifts: {} shifts in {} clusters, max score {:.4}",
            shifts.len(),
            clusters.len(),
            session_max_score
        );

        self.result = Some(Arc::new(LayoutShiftsData {
            layout_shifts: shifts,
            clusters,
            render_frame_impl_create_child_frame_events: child_frames,
            cls_by_navigation,
            session_max_score,
        }));
        self.state = HandlerState::Finalized;
        Ok(())
    }

    fn data(&self) -> Result<HandlerData, HandlerError> {
        self.state.ensure_finalized(self.name())?;
        self.result
            .clone()
            .map(HandlerData::LayoutShifts)
            .ok_or(HandlerError::NotFinalized(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Phase;
    use serde_json::json;

    fn shift(ts: i64, score: f64) -> Arc<TraceEvent> {
        let mut event = TraceEvent::new("LayoutShift", Phase::Instant, MicroSeconds(ts));
        event.args = json!({"data": {"weighted_score_delta": score, "had_recent_input": false}});
        Arc::new(event)
    }

    fn nav(ts: i64, id: &str) -> Arc<TraceEvent> {
        let mut event = TraceEvent::new("navigationStart", Phase::Mark, MicroSeconds(ts));
        event.args = json!({"frame": "F", "data": {"navigationId": id}});
        Arc::new(event)
    }

    #[test]
    fn test_session_gap_splits_clusters() {
        let shifts = vec![shift(1_000_000, 0.1), shift(1_500_000, 0.05), shift(2_600_000, 0.2)];
        let clusters = cluster_shifts(&shifts, &[nav(0, "N1")]);

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].events.len(), 2);
        assert!((clusters[0].cumulative_score - 0.15).abs() < 1e-9);
        assert_eq!(clusters[1].navigation_id.as_deref(), Some("N1"));
    }

    #[test]
    fn test_max_session_duration_splits_clusters() {
        let shifts: Vec<_> = (0..12).map(|i| shift(i * 500_000, 0.01)).collect();
        let clusters = cluster_shifts(&shifts, &[]);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].events.len(), 11);
    }

    #[test]
    fn test_navigation_splits_clusters() {
        let shifts = vec![shift(100, 0.1), shift(300, 0.1)];
        let clusters = cluster_shifts(&shifts, &[nav(0, "N1"), nav(200, "N2")]);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[1].navigation_id.as_deref(), Some("N2"));
    }

    #[test]
    fn test_recent_input_excluded() {
        let mut event = TraceEvent::new("LayoutShift", Phase::Instant, MicroSeconds(1));
        event.args = json!({"data": {"score": 0.5, "had_recent_input": true}});
        assert!(!counts_towards_cls(&event));
        assert!(counts_towards_cls(&shift(1, 0.1)));
    }
}
