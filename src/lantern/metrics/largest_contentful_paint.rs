//! Largest Contentful Paint.
//!
//! Reuses the paint-bounded graphs of FCP with the LCP timestamp as the
//! cutoff. Low-priority images are assumed to be offscreen: the optimistic
//! graph drops them and neither estimate waits for them.

use super::first_contentful_paint::{first_paint_based_graph, FirstPaintOptions};
use super::{Coefficients, ProcessedNavigation};
use crate::handlers::network_requests::{Priority, ResourceType};
use crate::lantern::graph::{Graph, Node};
use crate::lantern::simulator::SimulationResult;
use crate::utils::error::LanternError;

pub const COEFFICIENTS: Coefficients = Coefficients {
    intercept: 0.0,
    optimistic: 0.5,
    pessimistic: 0.5,
};

/// CPU nodes and every request except Low/VeryLow images
pub fn is_not_low_priority_image(node: &Node) -> bool {
    match node.request() {
        None => true,
        Some(request) => {
            request.resource_type != ResourceType::Image
                || !matches!(request.priority, Priority::Low | Priority::VeryLow)
        }
    }
}

pub fn optimistic_graph(
    graph: &Graph,
    navigation: &ProcessedNavigation,
) -> Result<Graph, LanternError> {
    let cutoff = navigation.lcp()?;
    first_paint_based_graph(
        graph,
        &FirstPaintOptions {
            cutoff,
            treat_node_as_render_blocking: &is_not_low_priority_image,
            additional_cpu_nodes: None,
        },
    )
}

pub fn pessimistic_graph(
    graph: &Graph,
    navigation: &ProcessedNavigation,
) -> Result<Graph, LanternError> {
    let cutoff = navigation.lcp()?;
    let layout = |node: &Node| node.did_perform_layout();
    first_paint_based_graph(
        graph,
        &FirstPaintOptions {
            cutoff,
            treat_node_as_render_blocking: &|_| true,
            additional_cpu_nodes: Some(&layout),
        },
    )
}

/// Latest end among the nodes that are not low-priority images
pub fn estimate(graph: &Graph, simulation: &SimulationResult) -> f64 {
    simulation
        .node_timings
        .iter()
        .filter(|(id, _)| graph.node(**id).map_or(true, is_not_low_priority_image))
        .map(|(_, timing)| timing.end_time)
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{page, simulator};
    use super::*;
    use crate::types::MicroSeconds;

    fn navigation(lcp_ms: i64) -> ProcessedNavigation {
        ProcessedNavigation {
            navigation_id: "N".to_string(),
            first_contentful_paint: Some(MicroSeconds(200_000)),
            largest_contentful_paint: Some(MicroSeconds(lcp_ms * 1000)),
        }
    }

    fn ids(graph: &Graph) -> Vec<u32> {
        graph.nodes().map(|node| node.id.0).collect()
    }

    #[test]
    fn test_low_priority_images_only_in_pessimistic_graph() {
        let graph = page();
        let optimistic = optimistic_graph(&graph, &navigation(450)).unwrap();
        assert_eq!(ids(&optimistic), vec![0, 1, 2]);
        let pessimistic = pessimistic_graph(&graph, &navigation(450)).unwrap();
        assert_eq!(ids(&pessimistic), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_estimate_ignores_low_priority_images() {
        let graph = page();
        let pessimistic = pessimistic_graph(&graph, &navigation(450)).unwrap();
        let simulation = simulator().simulate(&pessimistic, None).unwrap();
        let image_end = simulation.timing(crate::lantern::graph::NodeId(3)).unwrap().end_time;
        let value = estimate(&pessimistic, &simulation);
        assert!(value <= simulation.time_in_ms);
        if image_end >= simulation.time_in_ms {
            assert!(value < image_end);
        }
    }

    #[test]
    fn test_missing_lcp() {
        let nav = ProcessedNavigation {
            largest_contentful_paint: None,
            ..navigation(0)
        };
        assert!(matches!(
            optimistic_graph(&page(), &nav),
            Err(LanternError::NoLcp(_))
        ));
    }
}
