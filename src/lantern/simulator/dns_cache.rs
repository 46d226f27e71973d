//! Per-host DNS resolution times for one simulation.

use crate::utils::config::DNS_RESOLUTION_RTT_MULTIPLIER;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct DnsCache {
    rtt: f64,
    /// host -> earliest simulated time the host was resolved
    resolved_at: HashMap<String, f64>,
}

impl DnsCache {
    pub fn new(rtt: f64) -> Self {
        Self {
            rtt,
            resolved_at: HashMap::new(),
        }
    }

    /// Milliseconds until `host` resolves for a lookup started at `requested_at`
    ///
    /// A cached host resolves when its first lookup finished (or
    /// immediately, if that is already in the past), never later than a
    /// fresh lookup would.
    pub fn time_until_resolution(
        &mut self,
        host: &str,
        requested_at: f64,
        update_cache: bool,
    ) -> f64 {
        let mut time_until_resolved = self.rtt * DNS_RESOLUTION_RTT_MULTIPLIER;
        if let Some(resolved_at) = self.resolved_at.get(host) {
            let cached = (resolved_at - requested_at).max(0.0);
            time_until_resolved = cached.min(time_until_resolved);
        }

        if update_cache {
            let resolved_at = requested_at + time_until_resolved;
            self.resolved_at
                .entry(host.to_string())
                .and_modify(|existing| *existing = existing.min(resolved_at))
                .or_insert(resolved_at);
        }
        time_until_resolved
    }

    pub fn set_resolved_at(&mut self, host: &str, resolved_at: f64) {
        self.resolved_at.insert(host.to_string(), resolved_at);
    }
}
