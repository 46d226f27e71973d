//! First Contentful Paint.
//!
//! Both bounding graphs keep the nodes that could have blocked the first
//! paint: network requests finished before the paint and considered render
//! blocking, plus the CPU tasks that had to run first (script evaluation of
//! those requests, the first layout, the first paint and the first parse).

use super::{Coefficients, ProcessedNavigation};
use crate::handlers::network_requests::ResourceType;
use crate::lantern::graph::{Graph, Node, NodeId};
use crate::types::{names, MicroSeconds};
use crate::utils::error::LanternError;
use std::collections::{BTreeSet, HashMap, HashSet};

pub const COEFFICIENTS: Coefficients = Coefficients {
    intercept: 0.0,
    optimistic: 0.5,
    pessimistic: 0.5,
};

/// Parameters of a paint-bounded graph
pub struct FirstPaintOptions<'a> {
    /// Trace timestamp of the paint
    pub cutoff: MicroSeconds,
    /// Whether a network node counts as render blocking
    pub treat_node_as_render_blocking: &'a dyn Fn(&Node) -> bool,
    /// CPU nodes to keep beyond the required ones
    pub additional_cpu_nodes: Option<&'a dyn Fn(&Node) -> bool>,
}

/// Which nodes block the paint
#[derive(Debug, Default)]
struct RenderBlockingData {
    definitely_not_render_blocking_urls: HashSet<String>,
    render_blocking_cpu_nodes: BTreeSet<NodeId>,
}

/// URLs of script requests matching `filter`
fn script_urls(graph: &Graph, filter: impl Fn(&Node) -> bool) -> BTreeSet<String> {
    graph
        .nodes()
        .filter_map(|node| node.request().map(|request| (node, request)))
        .filter(|(node, request)| request.resource_type == ResourceType::Script && filter(node))
        .map(|(_, request)| request.url.clone())
        .collect()
}

fn render_blocking_data(graph: &Graph, options: &FirstPaintOptions<'_>) -> RenderBlockingData {
    let mut cpu_nodes: Vec<&Node> = Vec::new();
    // earliest task that evaluated each script
    let mut evaluating_task: HashMap<&str, &Node> = HashMap::new();

    for node in graph.nodes() {
        let Some(task) = node.task() else {
            continue;
        };
        // the paint can be nested inside the task that blocked it
        if node.start_time <= options.cutoff {
            cpu_nodes.push(node);
        }
        for url in task.evaluate_script_urls() {
            let earliest = evaluating_task.entry(url).or_insert(node);
            if node.start_time < earliest.start_time {
                *earliest = node;
            }
        }
    }
    cpu_nodes.sort_by_key(|node| (node.start_time, node.id));

    let possibly_blocking = script_urls(graph, |node| {
        node.end_time <= options.cutoff && (options.treat_node_as_render_blocking)(node)
    });

    let mut data = RenderBlockingData::default();
    for url in possibly_blocking {
        let Some(task) = evaluating_task.get(url.as_str()) else {
            continue;
        };
        if cpu_nodes.iter().any(|node| node.id == task.id) {
            data.render_blocking_cpu_nodes.insert(task.id);
        } else {
            data.definitely_not_render_blocking_urls.insert(url);
        }
    }

    let first_with = |name: &str| {
        cpu_nodes
            .iter()
            .find(|node| node.task().is_some_and(|task| task.has_child(name)))
            .map(|node| node.id)
    };
    for name in [names::LAYOUT, names::PAINT, names::PARSE_HTML] {
        if let Some(id) = first_with(name) {
            data.render_blocking_cpu_nodes.insert(id);
        }
    }

    if let Some(additional) = options.additional_cpu_nodes {
        data.render_blocking_cpu_nodes
            .extend(cpu_nodes.iter().filter(|node| additional(node)).map(|node| node.id));
    }
    data
}

/// Subgraph of the nodes that could have blocked a paint at `options.cutoff`
///
/// **Public** - shared by the FCP and LCP bounding graphs
///
/// # Errors
/// * `LanternError::CycleDetected` - the copy is not a DAG
pub fn first_paint_based_graph(
    graph: &Graph,
    options: &FirstPaintOptions<'_>,
) -> Result<Graph, LanternError> {
    let data = render_blocking_data(graph, options);

    graph.clone_with_relationships(|node| match node.request() {
        Some(request) => {
            let ended_after_paint =
                node.end_time > options.cutoff || node.start_time > options.cutoff;
            if ended_after_paint && !node.is_main_document() {
                return false;
            }
            if data.definitely_not_render_blocking_urls.contains(&request.url) {
                return false;
            }
            (options.treat_node_as_render_blocking)(node)
        }
        None => data.render_blocking_cpu_nodes.contains(&node.id),
    })
}

/// Render-blocking requests that the parser discovered, excluding script-initiated ones
pub fn optimistic_graph(
    graph: &Graph,
    navigation: &ProcessedNavigation,
) -> Result<Graph, LanternError> {
    let cutoff = navigation.fcp()?;
    let blocking = |node: &Node| {
        node.request().is_some_and(|request| {
            request.has_render_blocking_priority() && request.initiator_type() != Some("script")
        })
    };
    first_paint_based_graph(
        graph,
        &FirstPaintOptions {
            cutoff,
            treat_node_as_render_blocking: &blocking,
            additional_cpu_nodes: None,
        },
    )
}

/// Every render-blocking-priority request plus every early layout task
pub fn pessimistic_graph(
    graph: &Graph,
    navigation: &ProcessedNavigation,
) -> Result<Graph, LanternError> {
    let cutoff = navigation.fcp()?;
    let blocking = |node: &Node| {
        node.request()
            .is_some_and(|request| request.has_render_blocking_priority())
    };
    let layout = |node: &Node| node.did_perform_layout();
    first_paint_based_graph(
        graph,
        &FirstPaintOptions {
            cutoff,
            treat_node_as_render_blocking: &blocking,
            additional_cpu_nodes: Some(&layout),
        },
    )
}
