//! Dependency-ordered execution of trace handlers.

use crate::handlers::{all_handlers, handler_for, HandlerName, ParsedTraceData, TraceHandler};
use crate::types::TraceEvent;
use crate::utils::error::ProcessorError;
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Runs a fixed set of handlers over a trace
///
/// **Public** - the entry point for turning raw events into parsed data
///
/// The execution order is computed once at construction. Every event is
/// delivered to every handler in that order, and handlers finalize in the
/// same order so each sees its dependencies' results.
pub struct TraceProcessor {
    handlers: Vec<Box<dyn TraceHandler>>,
    order: Vec<HandlerName>,
}

impl std::fmt::Debug for TraceProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceProcessor").field("order", &self.order).finish()
    }
}

impl TraceProcessor {
    /// Build a processor from explicit handlers
    ///
    /// # Errors
    /// * `ProcessorError::UnregisteredDependency` - a handler depends on one not given
    /// * `ProcessorError::DependencyCycle` - the dependencies form a cycle
    pub fn new(handlers: Vec<Box<dyn TraceHandler>>) -> Result<Self, ProcessorError> {
        let mut by_name: BTreeMap<HandlerName, Box<dyn TraceHandler>> = BTreeMap::new();
        for handler in handlers {
            by_name.insert(handler.name(), handler);
        }

        let order = sort_handlers(&by_name)?;
        debug!("Handler order: {:?}", order);

        let mut handlers = Vec::with_capacity(order.len());
        for name in &order {
            if let Some(handler) = by_name.remove(name) {
                handlers.push(handler);
            }
        }
        Ok(Self { handlers, order })
    }

    /// Processor with every known handler
    pub fn with_all_handlers() -> Result<Self, ProcessorError> {
        Self::new(all_handlers())
    }

    /// Processor for `names`, closed over their dependencies plus Meta
    pub fn with_subset(names: &[HandlerName]) -> Result<Self, ProcessorError> {
        let mut wanted: BTreeSet<HandlerName> = names.iter().copied().collect();
        wanted.insert(HandlerName::Meta);

        let mut stack: Vec<HandlerName> = wanted.iter().copied().collect();
        while let Some(name) = stack.pop() {
            for dep in handler_for(name).deps() {
                if wanted.insert(*dep) {
                    stack.push(*dep);
                }
            }
        }
        Self::new(wanted.into_iter().map(handler_for).collect())
    }

    /// Processor for handler names given as text (e.g. from the CLI)
    pub fn with_named_subset<S: AsRef<str>>(names: &[S]) -> Result<Self, ProcessorError> {
        let parsed = names
            .iter()
            .map(|raw| {
                raw.as_ref()
                    .parse::<HandlerName>()
                    .map_err(ProcessorError::UnknownHandler)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::with_subset(&parsed)
    }

    /// Add a handler and recompute the order
    pub fn register(&mut self, handler: Box<dyn TraceHandler>) -> Result<(), ProcessorError> {
        let mut handlers = std::mem::take(&mut self.handlers);
        handlers.retain(|h| h.name() != handler.name());
        handlers.push(handler);
        *self = Self::new(handlers)?;
        Ok(())
    }

    pub fn order(&self) -> &[HandlerName] {
        &self.order
    }

    /// Stream `events` through every handler and collect their results
    ///
    /// # Errors
    /// The first handler failure aborts the run; no partial result is returned.
    pub async fn run(
        &mut self,
        events: Vec<TraceEvent>,
    ) -> Result<ParsedTraceData, ProcessorError> {
        let events: Vec<Arc<TraceEvent>> = events.into_iter().map(Arc::new).collect();
        self.run_shared(&events).await
    }

    /// Like [`run`](Self::run) for events already behind `Arc`
    pub async fn run_shared(
        &mut self,
        events: &[Arc<TraceEvent>],
    ) -> Result<ParsedTraceData, ProcessorError> {
        info!(
            "Processing {} events with {} handlers",
            events.len(),
            self.handlers.len()
        );

        for handler in self.handlers.iter_mut() {
            handler.reset();
        }

        for event in events {
            for handler in self.handlers.iter_mut() {
                handler
                    .handle_event(event)
                    .map_err(|source| ProcessorError::Handler {
                        name: handler.name(),
                        source,
                    })?;
            }
        }

        let mut parsed = ParsedTraceData::default();
        for handler in self.handlers.iter_mut() {
            let name = handler.name();
            handler
                .finalize(&parsed)
                .await
                .map_err(|source| ProcessorError::Handler { name, source })?;
            let data = handler
                .data()
                .map_err(|source| ProcessorError::Handler { name, source })?;
            parsed.insert(data);
            debug!("Finalized {}", name);
        }

        info!("Finished processing ({} handler results)", parsed.len());
        Ok(parsed)
    }
}

/// Depth-first topological sort, visiting handlers in name order
fn sort_handlers(
    handlers: &BTreeMap<HandlerName, Box<dyn TraceHandler>>,
) -> Result<Vec<HandlerName>, ProcessorError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        name: HandlerName,
        handlers: &BTreeMap<HandlerName, Box<dyn TraceHandler>>,
        marks: &mut BTreeMap<HandlerName, Mark>,
        path: &mut Vec<HandlerName>,
        order: &mut Vec<HandlerName>,
    ) -> Result<(), ProcessorError> {
        match marks.get(&name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                path.push(name);
                let cycle: Vec<&str> = path.iter().map(|n| n.as_str()).collect();
                return Err(ProcessorError::DependencyCycle(cycle.join(" -> ")));
            }
            None => {}
        }

        let Some(handler) = handlers.get(&name) else {
            return Ok(());
        };
        marks.insert(name, Mark::Visiting);
        path.push(name);
        for dep in handler.deps() {
            if !handlers.contains_key(dep) {
                return Err(ProcessorError::UnregisteredDependency {
                    handler: name,
                    dependency: *dep,
                });
            }
            visit(*dep, handlers, marks, path, order)?;
        }
        path.pop();
        marks.insert(name, Mark::Done);
        order.push(name);
        Ok(())
    }

    let mut marks = BTreeMap::new();
    let mut order = Vec::with_capacity(handlers.len());
    for name in handlers.keys() {
        let mut path = Vec::new();
        visit(*name, handlers, &mut marks, &mut path, &mut order)?;
    }
    Ok(order)
}
