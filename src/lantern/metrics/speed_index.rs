//! Speed Index.
//!
//! Both bounds simulate the full graph. The optimistic side takes the
//! Speed Index observed from screenshots when the trace has one; the
//! pessimistic side (and the optimistic one without screenshots) weights
//! the end of every layout task by the log of its duration.

use super::{Coefficients, Extras};
use crate::lantern::graph::Graph;
use crate::lantern::simulator::SimulationResult;
use crate::types::names;
use crate::utils::config::{SPEED_INDEX_BASELINE_RTT_MS, SPEED_INDEX_REFERENCE_RTT_MS};
use crate::utils::error::LanternError;

pub const COEFFICIENTS: Coefficients = Coefficients {
    intercept: -250.0,
    optimistic: 1.4,
    pessimistic: 0.4,
};

/// Interpolate between an even blend at the baseline RTT and the fitted
/// coefficients at the reference RTT
pub fn scaled_coefficients(rtt_ms: f64) -> Coefficients {
    let excess = SPEED_INDEX_REFERENCE_RTT_MS - SPEED_INDEX_BASELINE_RTT_MS;
    let multiplier = ((rtt_ms - SPEED_INDEX_BASELINE_RTT_MS) / excess).max(0.0);
    Coefficients {
        intercept: COEFFICIENTS.intercept * multiplier,
        optimistic: 0.5 + (COEFFICIENTS.optimistic - 0.5) * multiplier,
        pessimistic: 0.5 + (COEFFICIENTS.pessimistic - 0.5) * multiplier,
    }
}

/// Layout-weighted visual completeness time, never earlier than FCP
pub fn layout_based_speed_index(graph: &Graph, simulation: &SimulationResult, fcp_ms: f64) -> f64 {
    let mut total_weighted_time = 0.0;
    let mut total_weight = 0.0;
    for (id, timing) in &simulation.node_timings {
        let is_layout = graph
            .node(*id)
            .and_then(|node| node.task())
            .is_some_and(|task| task.has_child(names::LAYOUT));
        if !is_layout {
            continue;
        }
        let weight = (timing.end_time - timing.start_time).log2().max(0.0);
        total_weighted_time += weight * timing.end_time.max(fcp_ms);
        total_weight += weight;
    }
    if total_weight == 0.0 {
        return fcp_ms;
    }
    total_weighted_time / total_weight
}

pub fn estimate(
    graph: &Graph,
    simulation: &SimulationResult,
    extras: &Extras<'_>,
    optimistic: bool,
) -> Result<f64, LanternError> {
    let fcp = extras
        .fcp_result
        .ok_or(LanternError::MissingFcpResult("SpeedIndex"))?;
    let fcp_ms = fcp.pessimistic_estimate.time_in_ms;
    match extras.observed_speed_index {
        Some(observed) if optimistic => Ok(observed),
        _ => Ok(layout_based_speed_index(graph, simulation, fcp_ms)),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{page, simulator};
    use super::*;
    use crate::lantern::graph::NodeId;
    use crate::lantern::simulator::NodeTiming;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_coefficients_scale_with_rtt() {
        assert_eq!(scaled_coefficients(150.0), COEFFICIENTS);
        let baseline = scaled_coefficients(30.0);
        assert_eq!(baseline.intercept, 0.0);
        assert_eq!(baseline.optimistic, 0.5);
        assert_eq!(baseline.pessimistic, 0.5);
        // never extrapolated below the baseline
        assert_eq!(scaled_coefficients(10.0), baseline);
    }

    #[test]
    fn test_layout_weights() {
        let graph = page();
        let mut simulation = SimulationResult::default();
        // node 2 is the only layout task: 8ms long, ends at 300ms
        simulation.node_timings.insert(
            NodeId(2),
            NodeTiming {
                start_time: 292.0,
                end_time: 300.0,
                duration: 8.0,
            },
        );
        simulation.node_timings.insert(
            NodeId(4),
            NodeTiming {
                start_time: 300.0,
                end_time: 800.0,
                duration: 500.0,
            },
        );
        assert_eq!(layout_based_speed_index(&graph, &simulation, 100.0), 300.0);
        // clamped to FCP
        assert_eq!(layout_based_speed_index(&graph, &simulation, 400.0), 400.0);
    }

    #[test]
    fn test_no_layout_falls_back_to_fcp() {
        let graph = page();
        assert_eq!(layout_based_speed_index(&graph, &SimulationResult::default(), 123.0), 123.0);
        let simulation = simulator().simulate(&graph, None).unwrap();
        assert!(layout_based_speed_index(&graph, &simulation, 0.0) > 0.0);
    }
}
