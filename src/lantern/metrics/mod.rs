//! Lantern metric estimation.
//!
//! Every metric derives an optimistic and a pessimistic subgraph of the
//! page's dependency graph, simulates both, extracts an estimate from each
//! simulation and blends the two with fitted coefficients:
//!
//! ```text
//! timing = intercept × min(1, optimistic / 1000) + o × optimistic + p × pessimistic
//! ```
//!
//! The intercept correction only applies when the intercept is positive.

pub mod first_contentful_paint;
pub mod interactive;
pub mod largest_contentful_paint;
pub mod speed_index;

use super::graph::Graph;
use super::simulator::{SimulationResult, Simulator};
use crate::handlers::page_load_metrics::MetricName;
use crate::handlers::ParsedTraceData;
use crate::helpers::NavigationScope;
use crate::types::MicroSeconds;
use crate::utils::error::LanternError;
use log::{debug, info};
use serde::Serialize;
use std::fmt;

/// Blend weights of a metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coefficients {
    pub intercept: f64,
    pub optimistic: f64,
    pub pessimistic: f64,
}

/// The metrics Lantern can estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MetricKind {
    FirstContentfulPaint,
    LargestContentfulPaint,
    Interactive,
    SpeedIndex,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paint timestamps of the navigation, on the trace clock
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedNavigation {
    pub navigation_id: String,
    pub first_contentful_paint: Option<MicroSeconds>,
    pub largest_contentful_paint: Option<MicroSeconds>,
}

impl ProcessedNavigation {
    /// Read the paint markers of a navigation from PageLoadMetrics
    pub fn from_parsed(
        parsed: &ParsedTraceData,
        scope: &NavigationScope,
    ) -> Result<Self, LanternError> {
        let metrics = parsed.page_load_metrics()?;
        let timestamp = |metric| {
            metrics
                .score(&scope.frame_id, &scope.navigation_id, metric)
                .map(|score| score.event.ts)
        };
        Ok(Self {
            navigation_id: scope.navigation_id.clone(),
            first_contentful_paint: timestamp(MetricName::FirstContentfulPaint),
            largest_contentful_paint: timestamp(MetricName::LargestContentfulPaint),
        })
    }

    pub fn fcp(&self) -> Result<MicroSeconds, LanternError> {
        self.first_contentful_paint
            .ok_or_else(|| LanternError::NoFcp(self.navigation_id.clone()))
    }

    pub fn lcp(&self) -> Result<MicroSeconds, LanternError> {
        self.largest_contentful_paint
            .ok_or_else(|| LanternError::NoLcp(self.navigation_id.clone()))
    }
}

/// Inputs shared by every metric computation
#[derive(Debug, Clone, Copy)]
pub struct MetricComputationData<'a> {
    pub graph: &'a Graph,
    pub simulator: &'a Simulator,
    pub processed_navigation: &'a ProcessedNavigation,
}

/// Results of other metrics a metric builds on
#[derive(Debug, Clone, Copy, Default)]
pub struct Extras<'a> {
    pub fcp_result: Option<&'a MetricResult>,
    pub lcp_result: Option<&'a MetricResult>,
    /// Speed Index measured from screenshots, when available
    pub observed_speed_index: Option<f64>,
}

/// One side of a metric estimate
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub time_in_ms: f64,
    pub simulation: SimulationResult,
}

#[derive(Debug, Clone)]
pub struct MetricResult {
    pub metric: MetricKind,
    pub timing: f64,
    pub optimistic_estimate: Estimate,
    pub pessimistic_estimate: Estimate,
    pub optimistic_graph: Graph,
    pub pessimistic_graph: Graph,
}

/// Serializable digest of a [`MetricResult`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub metric: MetricKind,
    pub timing_ms: f64,
    pub optimistic_ms: f64,
    pub pessimistic_ms: f64,
    pub optimistic_nodes: usize,
    pub pessimistic_nodes: usize,
}

impl MetricResult {
    pub fn summary(&self) -> MetricSummary {
        MetricSummary {
            metric: self.metric,
            timing_ms: self.timing,
            optimistic_ms: self.optimistic_estimate.time_in_ms,
            pessimistic_ms: self.pessimistic_estimate.time_in_ms,
            optimistic_nodes: self.optimistic_graph.len(),
            pessimistic_nodes: self.pessimistic_graph.len(),
        }
    }
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::FirstContentfulPaint,
        MetricKind::LargestContentfulPaint,
        MetricKind::Interactive,
        MetricKind::SpeedIndex,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::FirstContentfulPaint => "FirstContentfulPaint",
            MetricKind::LargestContentfulPaint => "LargestContentfulPaint",
            MetricKind::Interactive => "Interactive",
            MetricKind::SpeedIndex => "SpeedIndex",
        }
    }

    pub fn coefficients(self) -> Coefficients {
        match self {
            MetricKind::FirstContentfulPaint => first_contentful_paint::COEFFICIENTS,
            MetricKind::LargestContentfulPaint => largest_contentful_paint::COEFFICIENTS,
            MetricKind::Interactive => interactive::COEFFICIENTS,
            MetricKind::SpeedIndex => speed_index::COEFFICIENTS,
        }
    }

    /// Coefficients adjusted to the simulated RTT; only Speed Index scales
    pub fn scaled_coefficients(self, rtt_ms: f64) -> Coefficients {
        match self {
            MetricKind::SpeedIndex => speed_index::scaled_coefficients(rtt_ms),
            other => other.coefficients(),
        }
    }

    pub fn optimistic_graph(
        self,
        graph: &Graph,
        navigation: &ProcessedNavigation,
    ) -> Result<Graph, LanternError> {
        match self {
            MetricKind::FirstContentfulPaint => {
                first_contentful_paint::optimistic_graph(graph, navigation)
            }
            MetricKind::LargestContentfulPaint => {
                largest_contentful_paint::optimistic_graph(graph, navigation)
            }
            MetricKind::Interactive => interactive::optimistic_graph(graph),
            MetricKind::SpeedIndex => Ok(graph.clone()),
        }
    }

    pub fn pessimistic_graph(
        self,
        graph: &Graph,
        navigation: &ProcessedNavigation,
    ) -> Result<Graph, LanternError> {
        match self {
            MetricKind::FirstContentfulPaint => {
                first_contentful_paint::pessimistic_graph(graph, navigation)
            }
            MetricKind::LargestContentfulPaint => {
                largest_contentful_paint::pessimistic_graph(graph, navigation)
            }
            MetricKind::Interactive | MetricKind::SpeedIndex => Ok(graph.clone()),
        }
    }

    /// Metric value of one simulation
    pub fn estimate_from_simulation(
        self,
        graph: &Graph,
        simulation: &SimulationResult,
        extras: &Extras<'_>,
        optimistic: bool,
    ) -> Result<f64, LanternError> {
        match self {
            MetricKind::FirstContentfulPaint => Ok(simulation.time_in_ms),
            MetricKind::LargestContentfulPaint => {
                Ok(largest_contentful_paint::estimate(graph, simulation))
            }
            MetricKind::Interactive => interactive::estimate(graph, simulation, extras, optimistic),
            MetricKind::SpeedIndex => speed_index::estimate(graph, simulation, extras, optimistic),
        }
    }

    /// Estimate this metric
    ///
    /// **Public** - the shared template every metric runs through
    ///
    /// # Errors
    /// * `LanternError::NoFcp` / `NoLcp` - the navigation lacks a required paint
    /// * `LanternError::MissingFcpResult` / `MissingLcpResult` - `extras` lacks a prerequisite
    /// * Any graph cloning or simulation failure
    pub fn compute(
        self,
        data: &MetricComputationData<'_>,
        extras: &Extras<'_>,
    ) -> Result<MetricResult, LanternError> {
        self.check_extras(extras)?;

        let optimistic_graph = self.optimistic_graph(data.graph, data.processed_navigation)?;
        let pessimistic_graph = self.pessimistic_graph(data.graph, data.processed_navigation)?;

        let optimistic_label = format!("optimistic{}", self.as_str());
        let optimistic_simulation = data
            .simulator
            .simulate(&optimistic_graph, Some(&optimistic_label))?;
        let pessimistic_label = format!("pessimistic{}", self.as_str());
        let pessimistic_simulation = data
            .simulator
            .simulate(&pessimistic_graph, Some(&pessimistic_label))?;

        let optimistic =
            self.estimate_from_simulation(&optimistic_graph, &optimistic_simulation, extras, true)?;
        let pessimistic = self.estimate_from_simulation(
            &pessimistic_graph,
            &pessimistic_simulation,
            extras,
            false,
        )?;

        let coefficients = self.scaled_coefficients(data.simulator.options().rtt);
        let mut timing = blend(coefficients, optimistic, pessimistic);
        timing = self.adjust_timing(timing, &pessimistic_graph, &pessimistic_simulation, extras)?;

        debug!(
            "{}: optimistic={:.1}ms pessimistic={:.1}ms -> {:.1}ms",
            self, optimistic, pessimistic, timing
        );

        Ok(MetricResult {
            metric: self,
            timing,
            optimistic_estimate: Estimate {
                time_in_ms: optimistic,
                simulation: optimistic_simulation,
            },
            pessimistic_estimate: Estimate {
                time_in_ms: pessimistic,
                simulation: pessimistic_simulation,
            },
            optimistic_graph,
            pessimistic_graph,
        })
    }

    fn check_extras(self, extras: &Extras<'_>) -> Result<(), LanternError> {
        match self {
            MetricKind::LargestContentfulPaint | MetricKind::SpeedIndex
                if extras.fcp_result.is_none() =>
            {
                Err(LanternError::MissingFcpResult(self.as_str()))
            }
            MetricKind::Interactive if extras.lcp_result.is_none() => {
                Err(LanternError::MissingLcpResult(self.as_str()))
            }
            _ => Ok(()),
        }
    }

    /// Lower bounds applied after blending
    fn adjust_timing(
        self,
        timing: f64,
        pessimistic_graph: &Graph,
        pessimistic_simulation: &SimulationResult,
        extras: &Extras<'_>,
    ) -> Result<f64, LanternError> {
        match self {
            MetricKind::FirstContentfulPaint => Ok(timing),
            MetricKind::LargestContentfulPaint | MetricKind::SpeedIndex => {
                let fcp = extras
                    .fcp_result
                    .ok_or(LanternError::MissingFcpResult(self.as_str()))?;
                Ok(timing.max(fcp.timing))
            }
            MetricKind::Interactive => {
                let lcp = extras
                    .lcp_result
                    .ok_or(LanternError::MissingLcpResult(self.as_str()))?;
                let last_long_task =
                    interactive::last_long_task_end(pessimistic_graph, pessimistic_simulation);
                Ok(timing.max(lcp.timing).max(last_long_task))
            }
        }
    }
}

/// Affine blend of the two estimates
pub fn blend(coefficients: Coefficients, optimistic: f64, pessimistic: f64) -> f64 {
    let intercept_multiplier = if coefficients.intercept > 0.0 {
        (optimistic / 1000.0).min(1.0)
    } else {
        1.0
    };
    coefficients.intercept * intercept_multiplier
        + coefficients.optimistic * optimistic
        + coefficients.pessimistic * pessimistic
}

/// Every metric of one navigation
#[derive(Debug, Clone)]
pub struct NavigationMetrics {
    pub first_contentful_paint: MetricResult,
    /// `None` when the navigation has no LCP candidate
    pub largest_contentful_paint: Option<MetricResult>,
    /// Requires LCP
    pub interactive: Option<MetricResult>,
    pub speed_index: MetricResult,
}

impl NavigationMetrics {
    pub fn summaries(&self) -> Vec<MetricSummary> {
        [
            Some(&self.first_contentful_paint),
            self.largest_contentful_paint.as_ref(),
            self.interactive.as_ref(),
            Some(&self.speed_index),
        ]
        .into_iter()
        .flatten()
        .map(MetricResult::summary)
        .collect()
    }
}

/// Compute FCP, LCP, Interactive and Speed Index in dependency order
///
/// # Errors
/// Fails if FCP is missing; a missing LCP only drops LCP and Interactive.
pub fn compute_navigation_metrics(
    data: &MetricComputationData<'_>,
    observed_speed_index: Option<f64>,
) -> Result<NavigationMetrics, LanternError> {
    let fcp = MetricKind::FirstContentfulPaint.compute(data, &Extras::default())?;

    let lcp = match MetricKind::LargestContentfulPaint.compute(
        data,
        &Extras {
            fcp_result: Some(&fcp),
            ..Extras::default()
        },
    ) {
        Ok(result) => Some(result),
        Err(LanternError::NoLcp(navigation)) => {
            info!("No LCP for navigation {}, skipping LCP and Interactive", navigation);
            None
        }
        Err(err) => return Err(err),
    };

    let interactive = match &lcp {
        Some(lcp) => Some(MetricKind::Interactive.compute(
            data,
            &Extras {
                lcp_result: Some(lcp),
                ..Extras::default()
            },
        )?),
        None => None,
    };

    let speed_index = MetricKind::SpeedIndex.compute(
        data,
        &Extras {
            fcp_result: Some(&fcp),
            observed_speed_index,
            ..Extras::default()
        },
    )?;

    Ok(NavigationMetrics {
        first_contentful_paint: fcp,
        largest_contentful_paint: lcp,
        interactive,
        speed_index,
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::{page, simulator};
    use super::*;

    fn navigation() -> ProcessedNavigation {
        ProcessedNavigation {
            navigation_id: "N".to_string(),
            first_contentful_paint: Some(MicroSeconds(250_000)),
            largest_contentful_paint: Some(MicroSeconds(450_000)),
        }
    }

    #[test]
    fn test_blend_intercept_correction() {
        let c = Coefficients {
            intercept: 600.0,
            optimistic: 0.5,
            pessimistic: 0.5,
        };
        // 600 * 0.5 + 250 + 250
        assert_eq!(blend(c, 500.0, 500.0), 800.0);
        let negative = Coefficients {
            intercept: -250.0,
            optimistic: 1.4,
            pessimistic: 0.4,
        };
        assert_eq!(blend(negative, 1000.0, 1000.0), 1550.0);
    }

    #[test]
    fn test_metric_ordering_holds() {
        let graph = page();
        let sim = simulator();
        let nav = navigation();
        let data = MetricComputationData {
            graph: &graph,
            simulator: &sim,
            processed_navigation: &nav,
        };
        let metrics = compute_navigation_metrics(&data, None).unwrap();
        let fcp = metrics.first_contentful_paint.timing;
        let lcp = metrics.largest_contentful_paint.as_ref().unwrap().timing;
        let tti = metrics.interactive.as_ref().unwrap().timing;
        assert!(fcp > 0.0);
        assert!(lcp >= fcp);
        assert!(tti >= lcp);
        assert!(metrics.speed_index.timing >= fcp);
        assert_eq!(metrics.summaries().len(), 4);
    }

    #[test]
    fn test_observed_speed_index_is_the_optimistic_side() {
        let graph = page();
        let sim = simulator();
        let nav = navigation();
        let data = MetricComputationData {
            graph: &graph,
            simulator: &sim,
            processed_navigation: &nav,
        };
        let layout_based = compute_navigation_metrics(&data, None).unwrap().speed_index;
        let observed = compute_navigation_metrics(&data, Some(50_000.0)).unwrap().speed_index;

        assert_eq!(observed.optimistic_estimate.time_in_ms, 50_000.0);
        assert_eq!(
            observed.pessimistic_estimate.time_in_ms,
            layout_based.pessimistic_estimate.time_in_ms
        );
        assert!(observed.timing > layout_based.timing);
    }

    #[test]
    fn test_missing_lcp_drops_dependent_metrics() {
        let graph = page();
        let sim = simulator();
        let nav = ProcessedNavigation {
            largest_contentful_paint: None,
            ..navigation()
        };
        let data = MetricComputationData {
            graph: &graph,
            simulator: &sim,
            processed_navigation: &nav,
        };
        let metrics = compute_navigation_metrics(&data, None).unwrap();
        assert!(metrics.largest_contentful_paint.is_none());
        assert!(metrics.interactive.is_none());
    }

    #[test]
    fn test_missing_extras_are_errors() {
        let graph = page();
        let sim = simulator();
        let nav = navigation();
        let data = MetricComputationData {
            graph: &graph,
            simulator: &sim,
            processed_navigation: &nav,
        };
        assert!(matches!(
            MetricKind::LargestContentfulPaint.compute(&data, &Extras::default()),
            Err(LanternError::MissingFcpResult(_))
        ));
        assert!(matches!(
            MetricKind::Interactive.compute(&data, &Extras::default()),
            Err(LanternError::MissingLcpResult(_))
        ));
        assert!(matches!(
            MetricKind::SpeedIndex.compute(&data, &Extras::default()),
            Err(LanternError::MissingFcpResult(_))
        ));
    }

    #[test]
    fn test_missing_fcp_is_reported() {
        let graph = page();
        let sim = simulator();
        let nav = ProcessedNavigation::default();
        let data = MetricComputationData {
            graph: &graph,
            simulator: &sim,
            processed_navigation: &nav,
        };
        assert!(matches!(
            compute_navigation_metrics(&data, None),
            Err(LanternError::NoFcp(_))
        ));
    }
}
