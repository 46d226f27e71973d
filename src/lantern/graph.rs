//! Page dependency graph.
//!
//! Nodes live in an arena keyed by [`NodeId`]; edges are stored on both
//! ends (`dependencies` and `dependents`). Payloads (requests and tasks)
//! are shared by `Arc`, so cloning a graph only copies ids and edges.

use crate::handlers::network_requests::{ResourceType, SyntheticNetworkRequest};
use crate::handlers::renderer::MainThreadTask;
use crate::types::MicroSeconds;
use crate::utils::error::LanternError;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Stable node identifier; assigned in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Network {
        request: Arc<SyntheticNetworkRequest>,
        is_main_document: bool,
    },
    Cpu {
        task: Arc<MainThreadTask>,
    },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Observed start in the trace
    pub start_time: MicroSeconds,
    /// Observed end in the trace
    pub end_time: MicroSeconds,
    dependencies: BTreeSet<NodeId>,
    dependents: BTreeSet<NodeId>,
}

impl Node {
    pub fn network(
        id: NodeId,
        request: Arc<SyntheticNetworkRequest>,
        is_main_document: bool,
    ) -> Self {
        Self {
            id,
            start_time: request.ts,
            end_time: request.end_time(),
            kind: NodeKind::Network {
                request,
                is_main_document,
            },
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
        }
    }

    pub fn cpu(id: NodeId, task: Arc<MainThreadTask>) -> Self {
        Self {
            id,
            start_time: task.start_time,
            end_time: task.end_time,
            kind: NodeKind::Cpu { task },
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
        }
    }

    pub fn duration(&self) -> MicroSeconds {
        self.end_time - self.start_time
    }

    pub fn is_network(&self) -> bool {
        matches!(self.kind, NodeKind::Network { .. })
    }

    pub fn is_cpu(&self) -> bool {
        matches!(self.kind, NodeKind::Cpu { .. })
    }

    pub fn request(&self) -> Option<&Arc<SyntheticNetworkRequest>> {
        match &self.kind {
            NodeKind::Network { request, .. } => Some(request),
            NodeKind::Cpu { .. } => None,
        }
    }

    pub fn task(&self) -> Option<&Arc<MainThreadTask>> {
        match &self.kind {
            NodeKind::Cpu { task } => Some(task),
            NodeKind::Network { .. } => None,
        }
    }

    pub fn is_main_document(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Network {
                is_main_document: true,
                ..
            }
        )
    }

    /// Served from cache or a non-network scheme
    pub fn is_connectionless(&self) -> bool {
        self.request().is_some_and(|r| r.is_connectionless())
    }

    pub fn is_image_request(&self) -> bool {
        self.request().is_some_and(|r| r.resource_type == ResourceType::Image)
    }

    pub fn did_perform_layout(&self) -> bool {
        self.task().is_some_and(|t| t.did_perform_layout())
    }

    pub fn dependencies(&self) -> &BTreeSet<NodeId> {
        &self.dependencies
    }

    pub fn dependents(&self) -> &BTreeSet<NodeId> {
        &self.dependents
    }

    /// URL for network nodes, task name for CPU nodes
    pub fn label(&self) -> String {
        match &self.kind {
            NodeKind::Network { request, .. } => request.url.clone(),
            NodeKind::Cpu { task } => format!("{}@{}", task.event.name, task.start_time),
        }
    }
}

/// A rooted DAG of network and CPU nodes
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: BTreeMap<NodeId, Node>,
    root: NodeId,
}

impl Graph {
    /// New graph containing only `root`
    pub fn new(root: Node) -> Self {
        let id = root.id;
        let mut nodes = BTreeMap::new();
        nodes.insert(id, root);
        Self { nodes, root: id }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> Option<&Node> {
        self.nodes.get(&self.root)
    }

    /// Next free id
    pub fn next_id(&self) -> NodeId {
        self.nodes
            .keys()
            .next_back()
            .map_or(NodeId(0), |last| NodeId(last.0 + 1))
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Make `node` depend on `dependency`
    ///
    /// # Errors
    /// * `LanternError::SelfDependency` - `node == dependency`
    /// * `LanternError::UnknownNode` - either id is not in the graph
    pub fn add_dependency(&mut self, node: NodeId, dependency: NodeId) -> Result<(), LanternError> {
        if node == dependency {
            return Err(LanternError::SelfDependency(node.0));
        }
        if !self.nodes.contains_key(&dependency) {
            return Err(LanternError::UnknownNode(dependency.0));
        }
        let target = self
            .nodes
            .get_mut(&node)
            .ok_or(LanternError::UnknownNode(node.0))?;
        target.dependencies.insert(dependency);
        if let Some(dep) = self.nodes.get_mut(&dependency) {
            dep.dependents.insert(node);
        }
        Ok(())
    }

    pub fn remove_dependency(&mut self, node: NodeId, dependency: NodeId) {
        if let Some(target) = self.nodes.get_mut(&node) {
            target.dependencies.remove(&dependency);
        }
        if let Some(dep) = self.nodes.get_mut(&dependency) {
            dep.dependents.remove(&node);
        }
    }

    /// Detach `id` from the graph, rewiring its dependents onto its dependencies
    pub fn splice_out(&mut self, id: NodeId) -> Result<(), LanternError> {
        let Some(node) = self.nodes.get(&id) else {
            return Err(LanternError::UnknownNode(id.0));
        };
        let dependencies: Vec<NodeId> = node.dependencies.iter().copied().collect();
        let dependents: Vec<NodeId> = node.dependents.iter().copied().collect();

        for dependent in &dependents {
            self.remove_dependency(*dependent, id);
            for dependency in &dependencies {
                self.add_dependency(*dependent, *dependency)?;
            }
        }
        for dependency in &dependencies {
            self.remove_dependency(id, *dependency);
        }
        self.nodes.remove(&id);
        Ok(())
    }

    /// Breadth-first walk from the root along dependents; each node once
    pub fn traverse(&self) -> Vec<NodeId> {
        let mut seen = BTreeSet::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue = VecDeque::from([self.root]);
        seen.insert(self.root);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            if let Some(node) = self.nodes.get(&id) {
                for dependent in &node.dependents {
                    if seen.insert(*dependent) {
                        queue.push_back(*dependent);
                    }
                }
            }
        }
        order
    }

    /// Whether any dependency chain loops back on itself
    pub fn has_cycle(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        let mut marks: BTreeMap<NodeId, Mark> = BTreeMap::new();
        for start in self.nodes.keys() {
            if marks.contains_key(start) {
                continue;
            }
            // Iterative DFS: (node, next dependent index)
            let mut stack: Vec<(NodeId, Vec<NodeId>, usize)> = Vec::new();
            marks.insert(*start, Mark::Visiting);
            stack.push((*start, self.dependents_of(*start), 0));

            while let Some((id, dependents, index)) = stack.last_mut() {
                if *index >= dependents.len() {
                    marks.insert(*id, Mark::Done);
                    stack.pop();
                    continue;
                }
                let next = dependents[*index];
                *index += 1;
                match marks.get(&next) {
                    Some(Mark::Visiting) => return true,
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(next, Mark::Visiting);
                        let next_dependents = self.dependents_of(next);
                        stack.push((next, next_dependents, 0));
                    }
                }
            }
        }
        false
    }

    fn dependents_of(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&id)
            .map(|n| n.dependents.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Copy of the graph restricted to nodes matching `predicate`
    ///
    /// **Public** - used by every metric to derive its bounding graphs
    ///
    /// A kept node also keeps every transitive dependency, so the copy is
    /// still rooted. The root is always kept. Ids are preserved.
    ///
    /// # Errors
    /// * `LanternError::CycleDetected` - the copy is not a DAG
    pub fn clone_with_relationships<F>(&self, predicate: F) -> Result<Graph, LanternError>
    where
        F: Fn(&Node) -> bool,
    {
        let mut keep: BTreeSet<NodeId> = BTreeSet::new();
        keep.insert(self.root);

        for id in self.traverse() {
            if keep.contains(&id) {
                continue;
            }
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if !predicate(node) {
                continue;
            }
            let mut stack = vec![id];
            while let Some(current) = stack.pop() {
                if !keep.insert(current) {
                    continue;
                }
                if let Some(n) = self.nodes.get(&current) {
                    stack.extend(n.dependencies.iter().filter(|d| !keep.contains(d)));
                }
            }
        }

        let mut nodes = BTreeMap::new();
        for id in &keep {
            let Some(original) = self.nodes.get(id) else {
                continue;
            };
            let mut copy = original.clone();
            copy.dependencies.retain(|d| keep.contains(d));
            copy.dependents.retain(|d| keep.contains(d));
            nodes.insert(*id, copy);
        }

        let graph = Graph {
            nodes,
            root: self.root,
        };
        if graph.has_cycle() {
            return Err(LanternError::CycleDetected);
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::network_requests::SyntheticNetworkRequest;

    pub(crate) fn request(id: &str, start: i64, end: i64) -> Arc<SyntheticNetworkRequest> {
        Arc::new(SyntheticNetworkRequest {
            request_id: id.to_string(),
            url: format!("https://example.com/{}", id),
            ts: MicroSeconds(start),
            finish_time: MicroSeconds(end),
            ..SyntheticNetworkRequest::default()
        })
    }

    fn chain() -> Graph {
        // 0 <- 1 <- 2, 0 <- 3
        let mut graph = Graph::new(Node::network(NodeId(0), request("doc", 0, 10), true));
        for (i, (start, end)) in [(10, 20), (20, 30), (10, 40)].into_iter().enumerate() {
            let id = graph.next_id();
            graph.add_node(Node::network(id, request(&format!("r{}", i), start, end), false));
        }
        graph.add_dependency(NodeId(1), NodeId(0)).unwrap();
        graph.add_dependency(NodeId(2), NodeId(1)).unwrap();
        graph.add_dependency(NodeId(3), NodeId(0)).unwrap();
        graph
    }

    #[test]
    fn test_traverse_visits_each_node_once() {
        let graph = chain();
        assert_eq!(
            graph.traverse(),
            vec![NodeId(0), NodeId(1), NodeId(3), NodeId(2)]
        );
        assert!(!graph.has_cycle());
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = chain();
        graph.add_dependency(NodeId(1), NodeId(2)).unwrap();
        assert!(graph.has_cycle());
        assert!(matches!(
            graph.clone_with_relationships(|_| true),
            Err(LanternError::CycleDetected)
        ));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut graph = chain();
        assert!(matches!(
            graph.add_dependency(NodeId(2), NodeId(2)),
            Err(LanternError::SelfDependency(2))
        ));
    }

    #[test]
    fn test_clone_keeps_dependencies_of_kept_nodes() {
        let graph = chain();
        let clone = graph
            .clone_with_relationships(|node| node.id == NodeId(2))
            .unwrap();
        let ids: Vec<NodeId> = clone.nodes().map(|n| n.id).collect();
        assert_eq!(ids, vec![NodeId(0), NodeId(1), NodeId(2)]);
        assert!(clone.node(NodeId(0)).unwrap().dependents().contains(&NodeId(1)));
        assert!(!clone.node(NodeId(0)).unwrap().dependents().contains(&NodeId(3)));
        // Original untouched
        assert_eq!(graph.len(), 4);
    }

    #[test]
    fn test_splice_out_rewires_edges() {
        let mut graph = chain();
        graph.splice_out(NodeId(1)).unwrap();
        assert!(graph.node(NodeId(2)).unwrap().dependencies().contains(&NodeId(0)));
        assert_eq!(graph.len(), 3);
    }
}
