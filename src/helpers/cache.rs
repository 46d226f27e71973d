//! Per-trace memoization.
//!
//! A `TraceCache` is owned by whoever processes one trace and is dropped
//! (or cleared) with it. Nothing here is process-wide.

use std::collections::HashMap;
use url::Url;

/// The parts of a URL the pipeline keys things by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    /// `scheme://host[:port]`, or `null` for opaque origins
    pub origin: String,
    pub host: String,
    pub scheme: String,
}

/// Memoized URL parsing scoped to one trace
#[derive(Debug, Default)]
pub struct TraceCache {
    urls: HashMap<String, Option<ParsedUrl>>,
}

impl TraceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `raw`, reusing an earlier result for the same string
    pub fn parse_url(&mut self, raw: &str) -> Option<&ParsedUrl> {
        self.urls
            .entry(raw.to_string())
            .or_insert_with(|| parse_url_parts(raw))
            .as_ref()
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn clear(&mut self) {
        self.urls.clear();
    }
}

fn parse_url_parts(raw: &str) -> Option<ParsedUrl> {
    let url = Url::parse(raw).ok()?;
    Some(ParsedUrl {
        origin: url.origin().ascii_serialization(),
        host: url.host_str().unwrap_or_default().to_string(),
        scheme: url.scheme().to_string(),
    })
}

/// Registrable-ish domain: the last two labels of a host
///
/// IP addresses and single-label hosts are returned unchanged.
pub fn root_domain(host: &str) -> String {
    if host.parse::<std::net::IpAddr>().is_ok() {
        return host.to_string();
    }
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 2 {
        return labels.join(".");
    }
    labels[labels.len() - 2..].join(".")
}
