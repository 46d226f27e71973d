//! Time to Interactive.

use super::{Coefficients, Extras};
use crate::handlers::network_requests::{Priority, ResourceType};
use crate::lantern::graph::Graph;
use crate::lantern::simulator::SimulationResult;
use crate::utils::config::{CRITICAL_TASK_THRESHOLD_US, LONG_TASK_THRESHOLD_MS};
use crate::utils::error::LanternError;

pub const COEFFICIENTS: Coefficients = Coefficients {
    intercept: 0.0,
    optimistic: 0.45,
    pessimistic: 0.55,
};

/// Possible long tasks, scripts and high-priority non-image requests
pub fn optimistic_graph(graph: &Graph) -> Result<Graph, LanternError> {
    graph.clone_with_relationships(|node| match node.request() {
        None => node.duration().0 >= CRITICAL_TASK_THRESHOLD_US,
        Some(request) => {
            let is_image = request.resource_type == ResourceType::Image;
            let is_script = request.resource_type == ResourceType::Script;
            let is_high_priority = matches!(request.priority, Priority::High | Priority::VeryHigh);
            !is_image && (is_script || is_high_priority)
        }
    })
}

/// End of the last simulated CPU task of at least 50ms, or 0
pub fn last_long_task_end(graph: &Graph, simulation: &SimulationResult) -> f64 {
    simulation
        .node_timings
        .iter()
        .filter(|(id, _)| graph.node(**id).is_some_and(|node| node.is_cpu()))
        .filter(|(_, timing)| timing.duration >= LONG_TASK_THRESHOLD_MS)
        .map(|(_, timing)| timing.end_time)
        .fold(0.0, f64::max)
}

/// Whichever comes later: the LCP estimate of the same side or the last long task
pub fn estimate(
    graph: &Graph,
    simulation: &SimulationResult,
    extras: &Extras<'_>,
    optimistic: bool,
) -> Result<f64, LanternError> {
    let lcp = extras
        .lcp_result
        .ok_or(LanternError::MissingLcpResult("Interactive"))?;
    let minimum = if optimistic {
        lcp.optimistic_estimate.time_in_ms
    } else {
        lcp.pessimistic_estimate.time_in_ms
    };
    Ok(minimum.max(last_long_task_end(graph, simulation)))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{page, simulator, task};
    use super::*;
    use crate::lantern::graph::{Node, NodeId};

    #[test]
    fn test_optimistic_graph_drops_images() {
        let graph = page();
        let optimistic = optimistic_graph(&graph).unwrap();
        let ids: Vec<u32> = optimistic.nodes().map(|node| node.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2, 4]);
    }

    #[test]
    fn test_optimistic_graph_keeps_tasks_from_twenty_ms() {
        let mut graph = page();
        graph.add_node(Node::cpu(NodeId(5), task(700, 20, &[])));
        graph.add_node(Node::cpu(NodeId(6), task(800, 19, &[])));
        graph.add_dependency(NodeId(5), NodeId(0)).unwrap();
        graph.add_dependency(NodeId(6), NodeId(0)).unwrap();

        let optimistic = optimistic_graph(&graph).unwrap();
        assert!(optimistic.node(NodeId(5)).is_some());
        assert!(optimistic.node(NodeId(6)).is_none());
    }

    #[test]
    fn test_last_long_task_end() {
        let graph = page();
        let simulation = simulator().simulate(&graph, None).unwrap();
        let long_task = simulation.timing(NodeId(4)).unwrap();
        // 120ms observed, slowed down
        assert!(long_task.duration >= 50.0);
        let last = last_long_task_end(&graph, &simulation);
        assert!(last >= long_task.end_time);
        assert!(last <= simulation.time_in_ms);
    }
}
