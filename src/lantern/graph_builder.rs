//! Dependency graph construction for one navigation.
//!
//! Network nodes are linked to their initiators; CPU nodes are linked to
//! the requests whose responses they consume (scripts, stylesheets, XHR
//! completions, frame documents) and to the tasks that installed their
//! timers. Short tasks are pruned afterwards.

use super::graph::{Graph, Node, NodeId};
use crate::handlers::network_requests::{ResourceType, SyntheticNetworkRequest};
use crate::handlers::renderer::MainThreadTask;
use crate::handlers::ParsedTraceData;
use crate::helpers::NavigationScope;
use crate::types::{names, MicroSeconds, TraceEvent};
use crate::utils::config::{SCRIPT_URL_MATCH_TOLERANCE_US, SIGNIFICANT_TASK_DURATION_US};
use crate::utils::error::LanternError;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;

/// Lookup tables over the network nodes
#[derive(Debug, Default)]
struct NetworkIndex {
    by_request_id: HashMap<String, NodeId>,
    by_url: HashMap<String, Vec<NodeId>>,
    /// `None` when a frame has more than one document request
    document_by_frame: HashMap<String, Option<NodeId>>,
}

/// Build the graph of the navigation in `scope`
///
/// **Public** - main entry point for graph construction
///
/// # Errors
/// * `LanternError::MissingData` - Meta, NetworkRequests or Renderer data missing
/// * `LanternError::NoDocumentRequest` - the navigation has no main-document request
/// * `LanternError::CycleDetected` - the linked graph is not a DAG
pub fn build_graph(
    parsed: &ParsedTraceData,
    scope: &NavigationScope,
) -> Result<Graph, LanternError> {
    let requests = &parsed.network_requests()?.by_time;
    let renderer = parsed.renderer()?;

    let main_thread = renderer
        .main_thread(scope.navigation.pid)
        .or_else(|| renderer.main_frame_main_threads().next().map(|(_, thread)| thread));
    let tasks: &[Arc<MainThreadTask>] = main_thread
        .map(|thread| thread.tasks.as_slice())
        .unwrap_or_default();

    build_graph_from(requests, tasks, scope)
}

/// Resolve the navigation and build its graph
pub fn build_graph_for_navigation(
    parsed: &ParsedTraceData,
    frame_id: &str,
    navigation_id: &str,
) -> Result<(Graph, NavigationScope), LanternError> {
    let meta = parsed.meta()?;
    let scope = NavigationScope::resolve(meta, frame_id, navigation_id)
        .ok_or_else(|| LanternError::NavigationNotFound(navigation_id.to_string()))?;
    let graph = build_graph(parsed, &scope)?;
    Ok((graph, scope))
}

/// The request that loaded the navigation's document
///
/// Matched by request id first (the browser reuses the navigation id),
/// then by document URL, including redirect hops, choosing the candidate
/// closest to the navigation start.
pub fn find_main_document(
    requests: &[Arc<SyntheticNetworkRequest>],
    scope: &NavigationScope,
) -> Option<Arc<SyntheticNetworkRequest>> {
    if let Some(by_id) = requests.iter().find(|r| r.request_id == scope.navigation_id) {
        return Some(Arc::clone(by_id));
    }

    let url = scope.document_url()?;
    requests
        .iter()
        .filter(|r| r.resource_type == ResourceType::Document)
        .filter(|r| r.frame.is_empty() || r.frame == scope.frame_id)
        .filter(|r| r.url == url || r.redirects.iter().any(|redirect| redirect.url == url))
        .filter(|r| r.ts <= scope.window.max && r.end_time() >= scope.window.min)
        .min_by_key(|r| (r.ts - scope.window.min).0.abs())
        .map(Arc::clone)
}

/// Build a graph from explicit requests and main-thread tasks
pub fn build_graph_from(
    requests: &[Arc<SyntheticNetworkRequest>],
    tasks: &[Arc<MainThreadTask>],
    scope: &NavigationScope,
) -> Result<Graph, LanternError> {
    let root_request = find_main_document(requests, scope)
        .ok_or_else(|| LanternError::NoDocumentRequest(scope.navigation_id.clone()))?;
    let start = root_request.ts;
    let end = scope.window.max;

    let mut graph = Graph::new(Node::network(NodeId(0), Arc::clone(&root_request), true));
    let mut index = NetworkIndex::default();
    index_request(&mut index, NodeId(0), &root_request);

    let mut network_ids = Vec::new();
    for request in requests {
        if request.request_id == root_request.request_id || request.ts < start || request.ts > end {
            continue;
        }
        let id = graph.next_id();
        graph.add_node(Node::network(id, Arc::clone(request), false));
        index_request(&mut index, id, request);
        network_ids.push(id);
    }

    let mut cpu_ids = Vec::new();
    for task in tasks {
        if task.start_time < start || task.start_time > end {
            continue;
        }
        let id = graph.next_id();
        graph.add_node(Node::cpu(id, Arc::clone(task)));
        cpu_ids.push(id);
    }

    link_network_nodes(&mut graph, &index, &network_ids)?;
    link_cpu_nodes(&mut graph, &index, &cpu_ids)?;
    prune_short_tasks(&mut graph, &cpu_ids)?;

    if graph.has_cycle() {
        return Err(LanternError::CycleDetected);
    }

    info!(
        "Built dependency graph for navigation {}: {} network, {} CPU nodes",
        scope.navigation_id,
        network_ids.len() + 1,
        graph.nodes().filter(|node| node.is_cpu()).count()
    );
    Ok(graph)
}

fn index_request(index: &mut NetworkIndex, id: NodeId, request: &SyntheticNetworkRequest) {
    index.by_request_id.insert(request.request_id.clone(), id);
    index.by_url.entry(request.url.clone()).or_default().push(id);
    if request.resource_type == ResourceType::Document && !request.frame.is_empty() {
        index
            .document_by_frame
            .entry(request.frame.clone())
            .and_modify(|existing| *existing = None)
            .or_insert(Some(id));
    }
}

fn start_of(graph: &Graph, id: NodeId) -> Result<MicroSeconds, LanternError> {
    graph
        .node(id)
        .map(|node| node.start_time)
        .ok_or(LanternError::UnknownNode(id.0))
}

fn end_of(graph: &Graph, id: NodeId) -> Result<MicroSeconds, LanternError> {
    graph
        .node(id)
        .map(|node| node.end_time)
        .ok_or(LanternError::UnknownNode(id.0))
}

/// Whether `node` may depend on `dependency` without running against
/// observed time
///
/// Cycles are not filtered here; `build_graph_from` rejects them once
/// every edge is in place.
fn can_depend_on(graph: &Graph, node: NodeId, dependency: NodeId) -> Result<bool, LanternError> {
    if node == dependency {
        return Ok(false);
    }
    Ok(start_of(graph, dependency)? <= start_of(graph, node)?)
}

fn link(graph: &mut Graph, node: NodeId, dependency: NodeId) -> Result<(), LanternError> {
    if can_depend_on(graph, node, dependency)? {
        graph.add_dependency(node, dependency)?;
    }
    Ok(())
}

fn link_network_nodes(
    graph: &mut Graph,
    index: &NetworkIndex,
    ids: &[NodeId],
) -> Result<(), LanternError> {
    let root = graph.root();
    for &id in ids {
        let Some(request) = graph.node(id).and_then(|n| n.request()).map(Arc::clone) else {
            continue;
        };
        let initiator = request.initiator.as_ref();

        let direct = initiator
            .and_then(|i| i.request_id.as_deref())
            .and_then(|request_id| index.by_request_id.get(request_id))
            .copied()
            .unwrap_or(root);
        let can_use_direct = can_depend_on(graph, id, direct)?;

        let initiator_url = initiator
            .and_then(|i| i.url.as_deref())
            .filter(|url| !url.is_empty());
        match initiator_url {
            Some(url) => {
                let candidates = index.by_url.get(url).map(Vec::as_slice).unwrap_or(&[]);
                if let [parent] = candidates {
                    if can_depend_on(graph, id, *parent)? {
                        graph.add_dependency(id, *parent)?;
                    } else if can_use_direct {
                        graph.add_dependency(id, direct)?;
                    }
                } else if can_use_direct {
                    graph.add_dependency(id, direct)?;
                }
            }
            None if can_use_direct => graph.add_dependency(id, direct)?,
            None => {}
        }

        let orphan = graph.node(id).is_some_and(|n| n.dependencies().is_empty());
        if orphan {
            link(graph, id, root)?;
        }
    }
    Ok(())
}

/// URLs of the JS stack that triggered `event`
fn stack_trace_urls(event: &TraceEvent) -> Vec<String> {
    event
        .data_value("stackTrace")
        .and_then(|stack| stack.as_array())
        .map(|frames| {
            frames
                .iter()
                .filter_map(|frame| frame.get("url").and_then(|u| u.as_str()))
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Depend on the closest request for `url` that finished before the task
/// (allowing a small overlap); nothing if any candidate started later
fn depend_on_url(
    graph: &mut Graph,
    index: &NetworkIndex,
    cpu: NodeId,
    url: Option<&str>,
) -> Result<(), LanternError> {
    let Some(url) = url.filter(|u| !u.is_empty()) else {
        return Ok(());
    };
    let Some(candidates) = index.by_url.get(url) else {
        return Ok(());
    };

    let cpu_start = start_of(graph, cpu)?;
    let mut best: Option<(NodeId, i64)> = None;
    for &candidate in candidates {
        if cpu_start <= start_of(graph, candidate)? {
            return Ok(());
        }
        let distance = (cpu_start - end_of(graph, candidate)?).0;
        let closer = best.map_or(true, |(_, min)| distance < min);
        if distance >= -SCRIPT_URL_MATCH_TOLERANCE_US && closer {
            best = Some((candidate, distance));
        }
    }

    if let Some((candidate, _)) = best {
        link(graph, cpu, candidate)?;
    }
    Ok(())
}

/// Depend on the document request of `frame` if it started before the task
fn depend_on_frame(
    graph: &mut Graph,
    index: &NetworkIndex,
    cpu: NodeId,
    frame: Option<&str>,
) -> Result<(), LanternError> {
    let Some(Some(document)) = frame.and_then(|f| index.document_by_frame.get(f)).copied() else {
        return Ok(());
    };
    if start_of(graph, document)? >= start_of(graph, cpu)? {
        return Ok(());
    }
    link(graph, cpu, document)
}

/// XHR and fetch requests sent from inside the task depend on it
fn add_dependent_request(
    graph: &mut Graph,
    index: &NetworkIndex,
    cpu: NodeId,
    request_id: Option<&str>,
) -> Result<(), LanternError> {
    let Some(&network) = request_id.and_then(|id| index.by_request_id.get(id)) else {
        return Ok(());
    };
    if start_of(graph, network)? <= start_of(graph, cpu)? {
        return Ok(());
    }
    let is_xhr = graph
        .node(network)
        .and_then(|n| n.request())
        .is_some_and(|r| matches!(r.resource_type, ResourceType::Xhr | ResourceType::Fetch));
    if is_xhr {
        link(graph, network, cpu)?;
    }
    Ok(())
}

fn link_cpu_nodes(
    graph: &mut Graph,
    index: &NetworkIndex,
    ids: &[NodeId],
) -> Result<(), LanternError> {
    let root = graph.root();
    let mut timers: HashMap<String, NodeId> = HashMap::new();

    for &id in ids {
        let Some(task) = graph.node(id).and_then(|n| n.task()).map(Arc::clone) else {
            continue;
        };

        for event in &task.children {
            if event.data().is_none() {
                continue;
            }
            let url = event.data_str("url");
            let frame = event.data_str("frame");

            match event.name.as_str() {
                names::TIMER_INSTALL => {
                    if let Some(timer) = event.data_value("timerId") {
                        timers.insert(timer.to_string(), id);
                    }
                    for stack_url in stack_trace_urls(event) {
                        depend_on_url(graph, index, id, Some(&stack_url))?;
                    }
                }
                names::TIMER_FIRE => {
                    let installer = event
                        .data_value("timerId")
                        .and_then(|timer| timers.get(&timer.to_string()))
                        .copied();
                    if let Some(installer) = installer {
                        if end_of(graph, installer)? <= start_of(graph, id)? {
                            link(graph, id, installer)?;
                        }
                    }
                }
                names::INVALIDATE_LAYOUT | names::SCHEDULE_STYLE_RECALCULATION => {
                    depend_on_frame(graph, index, id, frame)?;
                    for stack_url in stack_trace_urls(event) {
                        depend_on_url(graph, index, id, Some(&stack_url))?;
                    }
                }
                names::EVALUATE_SCRIPT => {
                    depend_on_frame(graph, index, id, frame)?;
                    depend_on_url(graph, index, id, url)?;
                    for stack_url in stack_trace_urls(event) {
                        depend_on_url(graph, index, id, Some(&stack_url))?;
                    }
                }
                names::XHR_READY_STATE_CHANGE => {
                    if event.data_i64("readyState") != Some(4) {
                        continue;
                    }
                    depend_on_url(graph, index, id, url)?;
                    for stack_url in stack_trace_urls(event) {
                        depend_on_url(graph, index, id, Some(&stack_url))?;
                    }
                }
                names::FUNCTION_CALL | names::V8_COMPILE => {
                    depend_on_frame(graph, index, id, frame)?;
                    depend_on_url(graph, index, id, url)?;
                }
                names::PARSE_AUTHOR_STYLE_SHEET => {
                    depend_on_frame(graph, index, id, frame)?;
                    depend_on_url(graph, index, id, event.data_str("styleSheetUrl"))?;
                }
                names::RESOURCE_SEND_REQUEST => {
                    depend_on_frame(graph, index, id, frame)?;
                    add_dependent_request(graph, index, id, event.data_str("requestId"))?;
                    for stack_url in stack_trace_urls(event) {
                        depend_on_url(graph, index, id, Some(&stack_url))?;
                    }
                }
                _ => {}
            }
        }

        let orphan = graph.node(id).is_some_and(|n| n.dependencies().is_empty());
        if orphan {
            link(graph, id, root)?;
        }
    }
    Ok(())
}

/// Splice out tasks below the noise floor that only pass dependencies
/// through, keeping the first task that laid out, painted or parsed HTML
fn prune_short_tasks(graph: &mut Graph, ids: &[NodeId]) -> Result<(), LanternError> {
    let mut found_layout = false;
    let mut found_paint = false;
    let mut found_parse = false;
    let mut pruned = 0;

    for &id in ids {
        let Some(node) = graph.node(id) else {
            continue;
        };
        let Some(task) = node.task() else {
            continue;
        };

        let mut is_first = false;
        if !found_layout && task.has_child(names::LAYOUT) {
            found_layout = true;
            is_first = true;
        }
        if !found_paint && task.has_child(names::PAINT) {
            found_paint = true;
            is_first = true;
        }
        if !found_parse && task.has_child(names::PARSE_HTML) {
            found_parse = true;
            is_first = true;
        }
        if is_first || node.duration().0 >= SIGNIFICANT_TASK_DURATION_US {
            continue;
        }

        if node.dependencies().len() == 1 || node.dependents().len() <= 1 {
            graph.splice_out(id)?;
            pruned += 1;
        }
    }
    debug!("Pruned {} short tasks", pruned);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::network_requests::Initiator;
    use crate::types::{Phase, ProcessId, ThreadId, TraceWindow};
    use serde_json::{json, Value};

    const NAV: &str = "NAV-1";

    fn scope() -> NavigationScope {
        let mut navigation = TraceEvent::new(names::NAVIGATION_START, Phase::Mark, MicroSeconds(0));
        navigation.args = json!({
            "frame": "F",
            "data": {"navigationId": NAV, "documentLoaderURL": "https://a.test/"}
        });
        NavigationScope {
            navigation: Arc::new(navigation),
            navigation_id: NAV.to_string(),
            frame_id: "F".to_string(),
            window: TraceWindow::new(MicroSeconds(0), MicroSeconds(10_000_000)),
        }
    }

    fn request(
        id: &str,
        url: &str,
        kind: ResourceType,
        start_ms: i64,
        end_ms: i64,
    ) -> SyntheticNetworkRequest {
        SyntheticNetworkRequest {
            request_id: id.to_string(),
            url: url.to_string(),
            origin: "https://a.test".to_string(),
            scheme: "https".to_string(),
            frame: "F".to_string(),
            resource_type: kind,
            ts: MicroSeconds(start_ms * 1000),
            finish_time: MicroSeconds(end_ms * 1000),
            ..SyntheticNetworkRequest::default()
        }
    }

    fn child(name: &str, ts_ms: i64, data: Value) -> Arc<TraceEvent> {
        let mut event = TraceEvent::new(name, Phase::Complete, MicroSeconds(ts_ms * 1000));
        event.args = json!({ "data": data });
        Arc::new(event)
    }

    fn task(start_ms: i64, dur_ms: i64, children: Vec<Arc<TraceEvent>>) -> Arc<MainThreadTask> {
        Arc::new(MainThreadTask {
            event: Arc::new(TraceEvent::new(
                "RunTask",
                Phase::Complete,
                MicroSeconds(start_ms * 1000),
            )),
            pid: ProcessId(1),
            tid: ThreadId(1),
            start_time: MicroSeconds(start_ms * 1000),
            end_time: MicroSeconds((start_ms + dur_ms) * 1000),
            duration: MicroSeconds(dur_ms * 1000),
            self_time: MicroSeconds(dur_ms * 1000),
            children,
            attributable_url: None,
        })
    }

    fn document() -> Arc<SyntheticNetworkRequest> {
        Arc::new(request(NAV, "https://a.test/", ResourceType::Document, 0, 100))
    }

    #[test]
    fn test_missing_document_request() {
        let result = build_graph_from(&[], &[], &scope());
        assert!(matches!(result, Err(LanternError::NoDocumentRequest(id)) if id == NAV));
    }

    #[test]
    fn test_document_found_by_url() {
        let doc = Arc::new(request("other-id", "https://a.test/", ResourceType::Document, 0, 100));
        let found = find_main_document(&[doc], &scope()).unwrap();
        assert_eq!(found.request_id, "other-id");
    }

    #[test]
    fn test_initiator_and_script_evaluation() {
        let mut script = request("2", "https://a.test/app.js", ResourceType::Script, 50, 200);
        script.initiator = Some(Initiator {
            kind: "parser".to_string(),
            url: Some("https://a.test/".to_string()),
            request_id: None,
        });
        let requests = vec![document(), Arc::new(script)];
        let tasks = vec![task(
            210,
            40,
            vec![child(names::EVALUATE_SCRIPT, 211, json!({"url": "https://a.test/app.js"}))],
        )];

        let graph = build_graph_from(&requests, &tasks, &scope()).unwrap();
        assert_eq!(graph.len(), 3);
        assert!(graph.node(NodeId(0)).unwrap().is_main_document());
        assert!(graph.node(NodeId(1)).unwrap().dependencies().contains(&NodeId(0)));
        assert!(graph.node(NodeId(2)).unwrap().dependencies().contains(&NodeId(1)));
        assert!(!graph.has_cycle());
    }

    #[test]
    fn test_xhr_depends_on_sending_task() {
        let xhr = request("3", "https://a.test/api", ResourceType::Xhr, 130, 300);
        let requests = vec![document(), Arc::new(xhr)];
        let tasks = vec![task(
            120,
            30,
            vec![child(names::RESOURCE_SEND_REQUEST, 125, json!({"requestId": "3"}))],
        )];

        let graph = build_graph_from(&requests, &tasks, &scope()).unwrap();
        let xhr_node = graph.node(NodeId(1)).unwrap();
        assert!(xhr_node.dependencies().contains(&NodeId(2)));
    }

    #[test]
    fn test_timers_link_tasks() {
        let requests = vec![document()];
        let tasks = vec![
            task(150, 20, vec![child(names::TIMER_INSTALL, 151, json!({"timerId": 7}))]),
            task(400, 20, vec![child(names::TIMER_FIRE, 401, json!({"timerId": 7}))]),
        ];
        let graph = build_graph_from(&requests, &tasks, &scope()).unwrap();
        assert!(graph.node(NodeId(2)).unwrap().dependencies().contains(&NodeId(1)));
    }

    #[test]
    fn test_short_tasks_are_pruned() {
        let requests = vec![document()];
        let tasks = vec![
            task(150, 2, vec![]),
            task(160, 3, vec![child(names::LAYOUT, 161, json!({}))]),
            task(170, 30, vec![]),
        ];
        let graph = build_graph_from(&requests, &tasks, &scope()).unwrap();
        // the first short task goes, the first layout stays
        assert!(graph.node(NodeId(1)).is_none());
        assert!(graph.node(NodeId(2)).is_some());
        assert!(graph.node(NodeId(3)).is_some());
    }

    #[test]
    fn test_mutual_initiators_are_a_cycle() {
        let initiated_by = |request_id: &str| {
            Some(Initiator {
                kind: "script".to_string(),
                url: None,
                request_id: Some(request_id.to_string()),
            })
        };
        let mut a = request("A", "https://a.test/a.js", ResourceType::Script, 50, 150);
        a.initiator = initiated_by("B");
        let mut b = request("B", "https://a.test/b.js", ResourceType::Script, 50, 150);
        b.initiator = initiated_by("A");

        let result = build_graph_from(&[document(), Arc::new(a), Arc::new(b)], &[], &scope());
        assert!(matches!(result, Err(LanternError::CycleDetected)));
    }

    #[test]
    fn test_requests_outside_window_are_skipped() {
        let late = request("9", "https://a.test/late.js", ResourceType::Script, 20_000, 20_100);
        let requests = vec![document(), Arc::new(late)];
        let graph = build_graph_from(&requests, &[], &scope()).unwrap();
        assert_eq!(graph.len(), 1);
    }
}
