//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.

use crate::handlers::HandlerName;
use thiserror::Error;

/// Errors that can occur while reading a trace file
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("JSON deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid trace format: {0}")]
    InvalidFormat(String),

    #[error("Failed to read trace file: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors raised by a single handler
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("{0} handler received an event before being initialized")]
    NotInitialized(HandlerName),

    #[error("{0} handler data was read before finalize")]
    NotFinalized(HandlerName),

    #[error("{handler} handler requires finalized {dependency} data")]
    MissingDependency {
        handler: HandlerName,
        dependency: HandlerName,
    },

    #[error("{handler} handler failed on '{event}': {reason}")]
    InvalidEvent {
        handler: HandlerName,
        event: String,
        reason: String,
    },
}

/// Errors raised by the handler orchestrator
#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Handler dependency cycle detected: {0}")]
    DependencyCycle(String),

    #[error("{handler} depends on {dependency}, which is not registered")]
    UnregisteredDependency {
        handler: HandlerName,
        dependency: HandlerName,
    },

    #[error("Unknown handler: {0}")]
    UnknownHandler(String),

    #[error("Handler {name} failed: {source}")]
    Handler {
        name: HandlerName,
        #[source]
        source: HandlerError,
    },

    #[error("Trace index {0} is out of range")]
    TraceIndexOutOfRange(usize),
}

/// Errors raised while building graphs, simulating or estimating metrics
#[derive(Error, Debug)]
pub enum LanternError {
    #[error("Missing handler data: {0}")]
    MissingData(#[from] HandlerError),

    #[error("Navigation not found: {0}")]
    NavigationNotFound(String),

    #[error("No main document request for navigation {0}")]
    NoDocumentRequest(String),

    #[error("No first contentful paint for navigation {0}")]
    NoFcp(String),

    #[error("No largest contentful paint for navigation {0}")]
    NoLcp(String),

    #[error("Dependency graph contains a cycle")]
    CycleDetected,

    #[error("Node {0} cannot depend on itself")]
    SelfDependency(u32),

    #[error("Node {0} is not part of the graph")]
    UnknownNode(u32),

    #[error("Simulated node {node} finished with negative duration {duration_ms}ms")]
    NegativeDuration { node: u32, duration_ms: f64 },

    #[error("Simulation stalled with {remaining} nodes left")]
    SimulationStalled { remaining: usize },

    #[error("Simulation exceeded {0} iterations")]
    IterationLimit(usize),

    #[error("Node {0} has no connection available")]
    NoConnection(u32),

    #[error("{0} requires the first contentful paint result")]
    MissingFcpResult(&'static str),

    #[error("{0} requires the largest contentful paint result")]
    MissingLcpResult(&'static str),
}

/// Errors raised by insight runners
#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Missing handler data: {0}")]
    MissingData(#[from] HandlerError),

    #[error("Navigation {0} not found in frame")]
    NavigationNotFound(String),

    #[error("Lantern estimation failed: {0}")]
    Lantern(#[from] LanternError),
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}

/// Errors that can occur while loading simulation settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown simulation profile: {0}")]
    UnknownProfile(String),

    #[error("Failed to read profile file: {0}")]
    ReadFailed(#[from] std::io::Error),

    #[error("Invalid profile file: {0}")]
    InvalidToml(#[from] toml::de::Error),

    #[error("Invalid profile value: {0}")]
    InvalidValue(String),
}
