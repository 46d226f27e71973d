//! Lantern: page-load simulation from a trace.
//!
//! This module handles:
//! - Building the dependency graph of one navigation
//! - Estimating network conditions observed in the trace
//! - Simulating the graph under a throttling profile
//! - Estimating FCP, LCP, Interactive and Speed Index
//! - Measuring the observed Speed Index from screenshots

pub mod filmstrip;
pub mod graph;
pub mod graph_builder;
pub mod metrics;
pub mod network_analyzer;
pub mod simulator;

pub use graph::{Graph, Node, NodeId, NodeKind};
pub use graph_builder::{build_graph, build_graph_for_navigation};
pub use metrics::{
    compute_navigation_metrics, Coefficients, Extras, MetricComputationData, MetricKind,
    MetricResult, MetricSummary, NavigationMetrics, ProcessedNavigation,
};
pub use network_analyzer::NetworkAnalysis;
pub use simulator::{SimulationProfile, SimulationResult, Simulator, SimulatorOptions};

use crate::handlers::ParsedTraceData;
use crate::utils::error::LanternError;
use log::info;

/// Everything Lantern derived for one navigation
#[derive(Debug, Clone)]
pub struct NavigationEstimate {
    pub graph: Graph,
    pub analysis: NetworkAnalysis,
    pub simulator: Simulator,
    pub processed_navigation: ProcessedNavigation,
    pub metrics: NavigationMetrics,
}

/// Simulate one navigation under `profile` and estimate its metrics
///
/// **Public** - main entry point of the metric pipeline
///
/// # Arguments
/// * `parsed` - Finalized handler data; needs Meta, NetworkRequests,
///   Renderer and PageLoadMetrics, and uses Screenshots when present
/// * `frame_id` / `navigation_id` - The navigation to estimate
/// * `profile` - Network and CPU conditions to simulate
///
/// # Errors
/// * `LanternError::NavigationNotFound` - unknown navigation
/// * `LanternError::NoDocumentRequest` / `NoFcp` - the navigation cannot be estimated
/// * Any graph or simulation failure
pub fn estimate_navigation(
    parsed: &ParsedTraceData,
    frame_id: &str,
    navigation_id: &str,
    profile: &SimulationProfile,
) -> Result<NavigationEstimate, LanternError> {
    let (graph, scope) = build_graph_for_navigation(parsed, frame_id, navigation_id)?;

    let records: Vec<_> = graph.nodes().filter_map(|node| node.request().cloned()).collect();
    let analysis = network_analyzer::analyze(&records);
    let simulator = Simulator::new(SimulatorOptions::new(profile, &analysis));
    let processed_navigation = ProcessedNavigation::from_parsed(parsed, &scope)?;
    let observed_speed_index = parsed
        .screenshots()
        .ok()
        .and_then(|data| filmstrip::observed_speed_index(&data.screenshots, &scope));

    let metrics = compute_navigation_metrics(
        &MetricComputationData {
            graph: &graph,
            simulator: &simulator,
            processed_navigation: &processed_navigation,
        },
        observed_speed_index,
    )?;

    info!(
        "Estimated navigation {} with profile '{}': FCP {:.0}ms over {} nodes",
        navigation_id,
        profile.name,
        metrics.first_contentful_paint.timing,
        graph.len()
    );

    Ok(NavigationEstimate {
        graph,
        analysis,
        simulator,
        processed_navigation,
        metrics,
    })
}
