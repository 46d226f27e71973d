//! Page Trace Studio
//!
//! Trace-event processing and Lantern page-load simulation for web
//! performance traces.
//!
//! This crate provides the core implementation for the
//! `page-trace` CLI tool:
//! - [`processor`] streams trace events through the handler pipeline
//! - [`lantern`] builds the page dependency graph and simulates metrics
//! - [`insights`] turns handler data and estimates into per-navigation findings
//!
//! ## Getting Started
//!
//! ```bash
//! page-trace analyze --trace trace.json --summary
//! ```

pub mod aggregator;
pub mod commands;
pub mod handlers;
pub mod helpers;
pub mod insights;
pub mod lantern;
pub mod output;
pub mod parser;
pub mod processor;
pub mod types;
pub mod utils;
