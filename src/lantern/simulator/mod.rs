//! Discrete-event replay of a dependency graph.
//!
//! This module handles:
//! - Starting nodes once all their dependencies completed
//! - Serializing CPU work on one simulated main thread
//! - Sharing bandwidth between in-flight requests over pooled connections
//! - Advancing a virtual clock to the next node completion
//!
//! The simulation is deterministic: ready nodes start in order of their
//! observed start time, ties broken by node id.

pub mod connection_pool;
pub mod dns_cache;
pub mod settings;
pub mod tcp_connection;

pub use settings::{SimulationProfile, SimulatorOptions, ThrottlingMethod};

use crate::lantern::graph::{Graph, Node, NodeId};
use crate::utils::config::{
    DISK_CACHE_BASE_MS, DISK_CACHE_MS_PER_MB, MAXIMUM_CPU_TASK_DURATION_MS,
    MAXIMUM_SIMULATION_ITERATIONS, NON_NETWORK_BASE_MS, NON_NETWORK_MS_PER_MB,
};
use crate::utils::error::LanternError;
use connection_pool::{ConnectionPool, PoolSettings};
use dns_cache::DnsCache;
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Simulated timing of one node, in milliseconds from the simulation start
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodeTiming {
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationResult {
    /// End of the last node (ms)
    pub time_in_ms: f64,
    pub node_timings: BTreeMap<NodeId, NodeTiming>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl SimulationResult {
    pub fn timing(&self, id: NodeId) -> Option<&NodeTiming> {
        self.node_timings.get(&id)
    }
}

/// Progress of a node that has started
#[derive(Debug, Clone, Copy, Default)]
struct InProgress {
    start_time: f64,
    time_elapsed: f64,
    time_elapsed_overshoot: f64,
    bytes_downloaded: f64,
    estimated_time_elapsed: f64,
}

/// Replays graphs under fixed network and CPU conditions
#[derive(Debug, Clone)]
pub struct Simulator {
    options: SimulatorOptions,
}

/// State of one `simulate` call
struct Run<'g> {
    graph: &'g Graph,
    options: &'g SimulatorOptions,
    flexible_ordering: bool,
    pool: ConnectionPool,
    dns: DnsCache,
    not_ready: BTreeSet<NodeId>,
    ready: BTreeSet<NodeId>,
    in_progress: BTreeMap<NodeId, InProgress>,
    completed: BTreeMap<NodeId, NodeTiming>,
}

impl Simulator {
    pub fn new(options: SimulatorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SimulatorOptions {
        &self.options
    }

    /// Simulate `graph` from its root
    ///
    /// **Public** - the graph is only read; every call starts from cold
    /// connections and an empty DNS cache
    ///
    /// # Errors
    /// * `LanternError::CycleDetected` - graph is not a DAG
    /// * `LanternError::NegativeDuration` - a node's remaining time went negative
    /// * `LanternError::SimulationStalled` - nodes remain that can never start
    /// * `LanternError::IterationLimit` - the clock advanced too many times
    pub fn simulate(
        &self,
        graph: &Graph,
        label: Option<&str>,
    ) -> Result<SimulationResult, LanternError> {
        if graph.has_cycle() {
            return Err(LanternError::CycleDetected);
        }

        let order = graph.traverse();
        let records: Vec<_> = order
            .iter()
            .filter_map(|id| graph.node(*id))
            .filter_map(|node| node.request().map(Arc::clone))
            .collect();
        let pool_settings = PoolSettings {
            rtt: self.options.rtt,
            throughput: self.options.throughput,
            additional_rtt_by_origin: self.options.additional_rtt_by_origin.clone(),
            server_response_time_by_origin: self.options.server_response_time_by_origin.clone(),
        };

        let mut run = Run {
            graph,
            options: &self.options,
            flexible_ordering: false,
            pool: ConnectionPool::new(&records, &pool_settings),
            dns: DnsCache::new(self.options.rtt),
            not_ready: order.iter().copied().collect(),
            ready: BTreeSet::new(),
            in_progress: BTreeMap::new(),
            completed: BTreeMap::new(),
        };

        let iterations = run.run()?;
        let time_in_ms = run
            .completed
            .values()
            .map(|timing| timing.end_time)
            .fold(0.0, f64::max);
        debug!(
            "Simulated {} nodes in {} iterations{}: {:.1}ms",
            run.completed.len(),
            iterations,
            label.map(|l| format!(" ({})", l)).unwrap_or_default(),
            time_in_ms
        );

        Ok(SimulationResult {
            time_in_ms,
            node_timings: run.completed,
            label: label.map(str::to_string),
        })
    }
}

impl Run<'_> {
    fn node(&self, id: NodeId) -> Result<&Node, LanternError> {
        self.graph.node(id).ok_or(LanternError::UnknownNode(id.0))
    }

    /// **Private** - main loop; returns the number of clock advances
    fn run(&mut self) -> Result<usize, LanternError> {
        let mut total_elapsed = 0.0;
        let mut iteration = 0;
        self.mark_ready(self.graph.root());

        while !self.ready.is_empty() || !self.in_progress.is_empty() {
            for id in self.ready_by_start_position()? {
                self.start_if_possible(id, total_elapsed)?;
            }

            if self.in_progress.is_empty() {
                if self.flexible_ordering {
                    return Err(LanternError::SimulationStalled {
                        remaining: self.ready.len() + self.not_ready.len(),
                    });
                }
                self.flexible_ordering = true;
                continue;
            }

            self.update_network_capacity();
            let period = self.next_completion_time()?;
            total_elapsed += period;

            let started: Vec<NodeId> = self.in_progress.keys().copied().collect();
            for id in started {
                self.update_progress(id, period, total_elapsed)?;
            }

            iteration += 1;
            if iteration > MAXIMUM_SIMULATION_ITERATIONS {
                return Err(LanternError::IterationLimit(MAXIMUM_SIMULATION_ITERATIONS));
            }
        }

        if !self.not_ready.is_empty() {
            return Err(LanternError::SimulationStalled {
                remaining: self.not_ready.len(),
            });
        }
        Ok(iteration)
    }

    fn mark_ready(&mut self, id: NodeId) {
        self.not_ready.remove(&id);
        self.ready.insert(id);
    }

    fn ready_by_start_position(&self) -> Result<Vec<NodeId>, LanternError> {
        let mut ready = self
            .ready
            .iter()
            .map(|id| self.node(*id).map(|node| (node.start_time, *id)))
            .collect::<Result<Vec<_>, _>>()?;
        ready.sort();
        Ok(ready.into_iter().map(|(_, id)| id).collect())
    }

    fn in_progress_count(&self, cpu: bool) -> usize {
        self.in_progress
            .keys()
            .filter_map(|id| self.graph.node(*id))
            .filter(|node| node.is_cpu() == cpu)
            .count()
    }

    fn start_if_possible(&mut self, id: NodeId, total_elapsed: f64) -> Result<(), LanternError> {
        let graph = self.graph;
        let node = graph.node(id).ok_or(LanternError::UnknownNode(id.0))?;

        if node.is_cpu() {
            if self.in_progress_count(true) == 0 {
                self.mark_in_progress(id, total_elapsed);
            }
            return Ok(());
        }

        if node.is_connectionless() {
            self.mark_in_progress(id, total_elapsed);
            return Ok(());
        }

        if self.in_progress_count(false) >= self.options.maximum_concurrent_requests {
            return Ok(());
        }
        let Some(request) = node.request() else {
            return Ok(());
        };
        if self.pool.acquire(request, self.flexible_ordering).is_some() {
            self.mark_in_progress(id, total_elapsed);
        }
        Ok(())
    }

    fn mark_in_progress(&mut self, id: NodeId, total_elapsed: f64) {
        self.ready.remove(&id);
        self.in_progress.insert(
            id,
            InProgress {
                start_time: total_elapsed,
                ..InProgress::default()
            },
        );
    }

    /// In-flight requests split the available throughput evenly
    fn update_network_capacity(&mut self) {
        let inflight = self.in_progress_count(false);
        if inflight == 0 {
            return;
        }
        let share = self.options.throughput / inflight as f64;
        for connection in self.pool.connections_in_use() {
            connection.set_throughput(share);
        }
    }

    fn next_completion_time(&mut self) -> Result<f64, LanternError> {
        let ids: Vec<NodeId> = self.in_progress.keys().copied().collect();
        let mut minimum = f64::INFINITY;
        for id in ids {
            let estimate = self.estimate_time_remaining(id)?;
            if estimate < 0.0 {
                return Err(LanternError::NegativeDuration {
                    node: id.0,
                    duration_ms: estimate,
                });
            }
            minimum = minimum.min(estimate);
        }
        Ok(minimum)
    }

    fn estimate_time_remaining(&mut self, id: NodeId) -> Result<f64, LanternError> {
        let graph = self.graph;
        let node = graph.node(id).ok_or(LanternError::UnknownNode(id.0))?;
        let progress = self.in_progress.get(&id).copied().unwrap_or_default();

        let estimate = if node.is_cpu() {
            let total = (node.duration().as_millis_f64() * self.options.cpu_slowdown_multiplier)
                .round()
                .min(MAXIMUM_CPU_TASK_DURATION_MS);
            total - progress.time_elapsed
        } else {
            let request = node.request().ok_or(LanternError::UnknownNode(id.0))?;
            let size_mb = request.decoded_body_length as f64 / 1024.0 / 1024.0;
            let time_elapsed = if request.from_cache {
                DISK_CACHE_BASE_MS + DISK_CACHE_MS_PER_MB * size_mb - progress.time_elapsed
            } else if !request.is_network_scheme() {
                NON_NETWORK_BASE_MS + NON_NETWORK_MS_PER_MB * size_mb - progress.time_elapsed
            } else {
                let dns_time = self
                    .dns
                    .time_until_resolution(&request.host, progress.start_time, true);
                let connection = self
                    .pool
                    .active_connection(request)
                    .ok_or(LanternError::NoConnection(id.0))?;
                connection
                    .simulate_download_until(
                        request.transfer_size as f64 - progress.bytes_downloaded,
                        progress.time_elapsed,
                        f64::INFINITY,
                        dns_time,
                    )
                    .time_elapsed
            };
            time_elapsed + progress.time_elapsed_overshoot
        };

        if let Some(entry) = self.in_progress.get_mut(&id) {
            entry.estimated_time_elapsed = estimate;
        }
        Ok(estimate)
    }

    fn update_progress(
        &mut self,
        id: NodeId,
        period: f64,
        total_elapsed: f64,
    ) -> Result<(), LanternError> {
        let graph = self.graph;
        let node = graph.node(id).ok_or(LanternError::UnknownNode(id.0))?;
        let Some(progress) = self.in_progress.get(&id).copied() else {
            return Ok(());
        };
        let is_finished = progress.estimated_time_elapsed == period;

        if node.is_cpu() || node.is_connectionless() {
            if is_finished {
                return self.mark_complete(id, total_elapsed);
            }
            if let Some(entry) = self.in_progress.get_mut(&id) {
                entry.time_elapsed += period;
            }
            return Ok(());
        }

        let request = node.request().ok_or(LanternError::UnknownNode(id.0))?;
        let dns_time = self
            .dns
            .time_until_resolution(&request.host, progress.start_time, true);
        let connection = self
            .pool
            .active_connection(request)
            .ok_or(LanternError::NoConnection(id.0))?;
        let calculation = connection.simulate_download_until(
            request.transfer_size as f64 - progress.bytes_downloaded,
            progress.time_elapsed,
            period - progress.time_elapsed_overshoot,
            dns_time,
        );
        connection.set_congestion_window(calculation.congestion_window);
        connection.set_h2_overflow_bytes_downloaded(calculation.extra_bytes_downloaded);

        if is_finished {
            connection.set_warmed(true);
            self.pool.release(request);
            return self.mark_complete(id, total_elapsed);
        }

        if let Some(entry) = self.in_progress.get_mut(&id) {
            entry.time_elapsed += calculation.time_elapsed;
            entry.time_elapsed_overshoot += calculation.time_elapsed - period;
            entry.bytes_downloaded += calculation.bytes_downloaded;
        }
        Ok(())
    }

    fn mark_complete(&mut self, id: NodeId, total_elapsed: f64) -> Result<(), LanternError> {
        let Some(progress) = self.in_progress.remove(&id) else {
            return Ok(());
        };
        self.completed.insert(
            id,
            NodeTiming {
                start_time: progress.start_time,
                end_time: total_elapsed,
                duration: total_elapsed - progress.start_time,
            },
        );

        let graph = self.graph;
        let node = graph.node(id).ok_or(LanternError::UnknownNode(id.0))?;
        for dependent in node.dependents() {
            let dependent_node = self.node(*dependent)?;
            let all_done = dependent_node
                .dependencies()
                .iter()
                .all(|dep| self.completed.contains_key(dep));
            if all_done {
                self.mark_ready(*dependent);
            }
        }
        Ok(())
    }
}
