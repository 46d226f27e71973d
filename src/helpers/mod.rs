//! Shared helpers: per-trace caches and navigation lookups.

pub mod cache;
pub mod navigation;

pub use cache::{root_domain, ParsedUrl, TraceCache};
pub use navigation::{navigation_for_timestamp, NavigationScope};
