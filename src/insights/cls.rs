//! Layout shift culprits.
//!
//! Each shift of the navigation is matched with the iframes created and
//! the fonts fetched in the half second before it. Animations that could
//! not run on the compositor are listed with their failure reasons.

use super::{InsightContext, RequestSummary};
use crate::handlers::animations::SyntheticAnimationPair;
use crate::handlers::layout_shifts::shift_score;
use crate::handlers::network_requests::{ResourceType, SyntheticNetworkRequest};
use crate::handlers::ParsedTraceData;
use crate::types::{MicroSeconds, TraceEvent};
use crate::utils::config::LAYOUT_SHIFT_ROOT_CAUSE_WINDOW_US;
use crate::utils::error::InsightError;
use serde::Serialize;
use std::sync::Arc;

/// Actionable compositor failure reasons and their mask bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnimationFailureReason {
    UnsupportedCssProperty,
    TransformBoxSizeDependent,
    FilterMayMovePixels,
    NonReplaceCompositeMode,
    IncompatibleAnimations,
    UnsupportedTimingParams,
}

const FAILURE_REASONS: [(u64, AnimationFailureReason); 6] = [
    (1 << 13, AnimationFailureReason::UnsupportedCssProperty),
    (1 << 11, AnimationFailureReason::TransformBoxSizeDependent),
    (1 << 12, AnimationFailureReason::FilterMayMovePixels),
    (1 << 4, AnimationFailureReason::NonReplaceCompositeMode),
    (1 << 6, AnimationFailureReason::IncompatibleAnimations),
    (1 << 3, AnimationFailureReason::UnsupportedTimingParams),
];

pub fn failure_reasons(mask: u64) -> Vec<AnimationFailureReason> {
    FAILURE_REASONS
        .iter()
        .filter(|(flag, _)| mask & flag != 0)
        .map(|(_, reason)| *reason)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NonCompositedAnimation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub failure_reasons: Vec<AnimationFailureReason>,
    pub unsupported_properties: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutShiftRootCauses {
    pub ts: MicroSeconds,
    pub score: f64,
    /// Start times of iframes created just before the shift
    pub iframes: Vec<MicroSeconds>,
    pub font_requests: Vec<RequestSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CumulativeLayoutShiftInsight {
    /// Worst session window of the navigation
    pub cluster_score: f64,
    pub animation_failures: Vec<NonCompositedAnimation>,
    pub shifts: Vec<LayoutShiftRootCauses>,
}

/// `end` falls in the half second before `shift_ts`
fn in_invalidation_window(end: MicroSeconds, shift_ts: MicroSeconds) -> bool {
    end < shift_ts && end >= shift_ts - MicroSeconds(LAYOUT_SHIFT_ROOT_CAUSE_WINDOW_US)
}

/// **Private** - one entry per instant event reporting both a mask and properties
fn non_composited_animations(
    animations: &[&Arc<SyntheticAnimationPair>],
) -> Vec<NonCompositedAnimation> {
    let mut failures = Vec::new();
    for animation in animations {
        for event in &animation.instant_events {
            let mask = event
                .data_value("compositeFailed")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0);
            let unsupported = event.data_value("unsupportedProperties");
            let Some(properties) = unsupported.and_then(|v| v.as_array()) else {
                continue;
            };
            if mask == 0 {
                continue;
            }
            failures.push(NonCompositedAnimation {
                name: animation.name.clone(),
                failure_reasons: failure_reasons(mask),
                unsupported_properties: properties
                    .iter()
                    .filter_map(|p| p.as_str().map(str::to_string))
                    .collect(),
            });
        }
    }
    failures
}

fn root_causes(
    shift: &TraceEvent,
    iframes: &[&Arc<TraceEvent>],
    requests: &[&Arc<SyntheticNetworkRequest>],
) -> LayoutShiftRootCauses {
    LayoutShiftRootCauses {
        ts: shift.ts,
        score: shift_score(shift),
        iframes: iframes
            .iter()
            .filter(|event| in_invalidation_window(event.end_time(), shift.ts))
            .map(|event| event.ts)
            .collect(),
        font_requests: requests
            .iter()
            .filter(|request| in_invalidation_window(request.ts + request.dur, shift.ts))
            .filter(|request| {
                request.resource_type == ResourceType::Font
                    && request.mime_type.starts_with("font")
            })
            .map(|request| RequestSummary::new(request))
            .collect(),
    }
}

/// CLS insight of one navigation
///
/// # Errors
/// * `InsightError::MissingData` - Meta, Animations, LayoutShifts or NetworkRequests missing
pub fn generate_insight(
    parsed: &ParsedTraceData,
    context: &InsightContext<'_>,
) -> Result<CumulativeLayoutShiftInsight, InsightError> {
    let scope = context.scope(parsed)?;
    let animations = parsed.animations()?;
    let layout_shifts = parsed.layout_shifts()?;
    let requests = parsed.network_requests()?;

    let navigation_animations: Vec<_> = animations
        .animations
        .iter()
        .filter(|animation| scope.contains(animation.ts))
        .collect();
    let iframes: Vec<_> = layout_shifts
        .render_frame_impl_create_child_frame_events
        .iter()
        .filter(|event| scope.contains(event.ts))
        .collect();
    let navigation_requests: Vec<_> = requests
        .by_time
        .iter()
        .filter(|request| scope.contains(request.ts))
        .collect();

    let clusters: Vec<_> = layout_shifts
        .clusters
        .iter()
        .filter(|cluster| cluster.events.first().is_some_and(|event| scope.contains(event.ts)))
        .collect();

    Ok(CumulativeLayoutShiftInsight {
        cluster_score: clusters
            .iter()
            .map(|cluster| cluster.cumulative_score)
            .fold(0.0, f64::max),
        animation_failures: non_composited_animations(&navigation_animations),
        shifts: clusters
            .iter()
            .flat_map(|cluster| cluster.events.iter())
            .map(|shift| root_causes(shift, &iframes, &navigation_requests))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Phase;

    #[test]
    fn test_failure_reasons_from_mask() {
        assert_eq!(
            failure_reasons((1 << 13) | (1 << 3)),
            vec![
                AnimationFailureReason::UnsupportedCssProperty,
                AnimationFailureReason::UnsupportedTimingParams
            ]
        );
        assert!(failure_reasons(1).is_empty());
    }

    #[test]
    fn test_invalidation_window_is_half_open() {
        let shift = MicroSeconds(1_000_000);
        assert!(in_invalidation_window(MicroSeconds(500_000), shift));
        assert!(in_invalidation_window(MicroSeconds(999_999), shift));
        assert!(!in_invalidation_window(shift, shift));
        assert!(!in_invalidation_window(MicroSeconds(499_999), shift));
    }

    #[test]
    fn test_font_and_iframe_causes() {
        let mut shift = TraceEvent::new("LayoutShift", Phase::Mark, MicroSeconds(2_000_000));
        shift.args = serde_json::json!({"data": {"weighted_score_delta": 0.2}});
        let iframe = Arc::new(TraceEvent::new(
            "RenderFrameImplCreateChildFrame",
            Phase::Mark,
            MicroSeconds(1_700_000),
        ));
        let font = Arc::new(SyntheticNetworkRequest {
            resource_type: ResourceType::Font,
            mime_type: "font/woff2".to_string(),
            ts: MicroSeconds(1_600_000),
            dur: MicroSeconds(200_000),
            ..SyntheticNetworkRequest::default()
        });
        let late_font = Arc::new(SyntheticNetworkRequest {
            ts: MicroSeconds(1_900_000),
            dur: MicroSeconds(200_000),
            ..(*font).clone()
        });

        let causes = root_causes(&shift, &[&iframe], &[&font, &late_font]);
        assert_eq!(causes.score, 0.2);
        assert_eq!(causes.iframes, vec![MicroSeconds(1_700_000)]);
        assert_eq!(causes.font_requests.len(), 1);
        assert_eq!(causes.font_requests[0].start_ts, MicroSeconds(1_600_000));
    }
}
