//! Per-origin TCP connections shared by the simulated requests.

use super::tcp_connection::TcpConnection;
use crate::handlers::network_requests::SyntheticNetworkRequest;
use crate::lantern::network_analyzer::{estimate_if_connection_was_reused, group_by_origin};
use crate::utils::config::{DEFAULT_CONNECTIONS_PER_ORIGIN, DEFAULT_SERVER_RESPONSE_TIME_MS};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Index of a connection inside its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(usize);

/// Network parameters the pool's connections are created with
#[derive(Debug, Clone, Default)]
pub struct PoolSettings {
    pub rtt: f64,
    /// Bits per second
    pub throughput: f64,
    pub additional_rtt_by_origin: BTreeMap<String, f64>,
    pub server_response_time_by_origin: BTreeMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct ConnectionPool {
    connections: Vec<TcpConnection>,
    by_origin: HashMap<String, Vec<ConnectionId>>,
    by_request: HashMap<String, ConnectionId>,
    in_use: BTreeSet<ConnectionId>,
    reused_by_request: HashMap<String, bool>,
}

impl ConnectionPool {
    /// One connection per request that opened a fresh connection, padded to
    /// [`DEFAULT_CONNECTIONS_PER_ORIGIN`] for non-h2 origins
    pub fn new(records: &[Arc<SyntheticNetworkRequest>], settings: &PoolSettings) -> Self {
        let reused_by_request = estimate_if_connection_was_reused(records, true);
        let mut connections = Vec::new();
        let mut by_origin = HashMap::new();

        for (origin, requests) in group_by_origin(records) {
            let additional_rtt = settings
                .additional_rtt_by_origin
                .get(&origin)
                .copied()
                .unwrap_or(0.0);
            let response_time = settings
                .server_response_time_by_origin
                .get(&origin)
                .copied()
                .unwrap_or(DEFAULT_SERVER_RESPONSE_TIME_MS);

            let mut origin_connections: Vec<TcpConnection> = requests
                .iter()
                .filter(|request| {
                    !reused_by_request
                        .get(&request.request_id)
                        .copied()
                        .unwrap_or(false)
                })
                .map(|request| {
                    TcpConnection::new(
                        settings.rtt + additional_rtt,
                        settings.throughput,
                        response_time,
                        request.is_secure(),
                        request.is_h2(),
                    )
                })
                .collect();

            let Some(first) = origin_connections.first().cloned() else {
                continue;
            };
            let minimum = if first.is_h2() {
                1
            } else {
                DEFAULT_CONNECTIONS_PER_ORIGIN
            };
            while origin_connections.len() < minimum {
                origin_connections.push(first.clone());
            }

            let ids = origin_connections
                .into_iter()
                .map(|connection| {
                    connections.push(connection);
                    ConnectionId(connections.len() - 1)
                })
                .collect();
            by_origin.insert(origin, ids);
        }

        Self {
            connections,
            by_origin,
            by_request: HashMap::new(),
            in_use: BTreeSet::new(),
            reused_by_request,
        }
    }

    /// Reserve a connection for `request`
    ///
    /// Picks the free connection with the largest congestion window whose
    /// warmth matches the observed reuse of the request. With
    /// `ignore_reuse` any free connection qualifies.
    ///
    /// # Returns
    /// `None` when nothing suitable is free, or the request already holds one
    pub fn acquire(
        &mut self,
        request: &SyntheticNetworkRequest,
        ignore_reuse: bool,
    ) -> Option<ConnectionId> {
        if self.by_request.contains_key(&request.request_id) {
            return None;
        }
        let observed_reuse = self
            .reused_by_request
            .get(&request.request_id)
            .copied()
            .unwrap_or(false);

        let mut best: Option<ConnectionId> = None;
        for id in self.by_origin.get(&request.origin)? {
            let connection = &self.connections[id.0];
            if !ignore_reuse && connection.is_warm() != observed_reuse {
                continue;
            }
            if self.in_use.contains(id) {
                continue;
            }
            let better = best.map_or(true, |current| {
                connection.congestion_window() > self.connections[current.0].congestion_window()
            });
            if better {
                best = Some(*id);
            }
        }

        let id = best?;
        self.in_use.insert(id);
        self.by_request.insert(request.request_id.clone(), id);
        Some(id)
    }

    /// Connection currently held by `request`
    pub fn active_connection(
        &mut self,
        request: &SyntheticNetworkRequest,
    ) -> Option<&mut TcpConnection> {
        let id = self.by_request.get(&request.request_id)?;
        self.connections.get_mut(id.0)
    }

    pub fn release(&mut self, request: &SyntheticNetworkRequest) {
        if let Some(id) = self.by_request.remove(&request.request_id) {
            self.in_use.remove(&id);
        }
    }

    pub fn connections_in_use(&mut self) -> impl Iterator<Item = &mut TcpConnection> + '_ {
        let in_use = &self.in_use;
        self.connections
            .iter_mut()
            .enumerate()
            .filter(move |(index, _)| in_use.contains(&ConnectionId(*index)))
            .map(|(_, connection)| connection)
    }

    pub fn connection_count(&self, origin: &str) -> usize {
        self.by_origin.get(origin).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MicroSeconds;

    fn request(
        id: &str,
        origin: &str,
        protocol: &str,
        start_ms: i64,
    ) -> Arc<SyntheticNetworkRequest> {
        Arc::new(SyntheticNetworkRequest {
            request_id: id.to_string(),
            origin: origin.to_string(),
            scheme: "https".to_string(),
            protocol: protocol.to_string(),
            ts: MicroSeconds(start_ms * 1000),
            finish_time: MicroSeconds((start_ms + 100) * 1000),
            ..SyntheticNetworkRequest::default()
        })
    }

    fn settings() -> PoolSettings {
        PoolSettings {
            rtt: 100.0,
            throughput: 1_000_000.0,
            ..PoolSettings::default()
        }
    }

    #[test]
    fn test_http1_origins_get_six_connections() {
        let records = vec![request("1", "https://a.test", "http/1.1", 0)];
        let pool = ConnectionPool::new(&records, &settings());
        assert_eq!(pool.connection_count("https://a.test"), 6);
    }

    #[test]
    fn test_h2_origins_get_one_connection() {
        let records = vec![
            request("1", "https://a.test", "h2", 0),
            request("2", "https://a.test", "h2", 10),
        ];
        let mut pool = ConnectionPool::new(&records, &settings());
        assert_eq!(pool.connection_count("https://a.test"), 1);

        // second request observed as reused, the only connection is cold and busy
        assert!(pool.acquire(&records[0], false).is_some());
        assert!(pool.acquire(&records[1], true).is_none());
        pool.release(&records[0]);
        assert!(pool.acquire(&records[1], true).is_some());
    }

    #[test]
    fn test_acquire_respects_observed_warmth() {
        let records = vec![
            request("1", "https://a.test", "http/1.1", 0),
            request("2", "https://a.test", "http/1.1", 500),
        ];
        let mut pool = ConnectionPool::new(&records, &settings());
        // request 2 started after request 1 ended, so it expects a warm connection
        assert!(pool.acquire(&records[1], false).is_none());
        assert!(pool.acquire(&records[1], true).is_some());

        let id = pool.acquire(&records[0], false);
        assert!(id.is_some());
        assert!(pool.active_connection(&records[0]).is_some());
        assert_eq!(pool.connections_in_use().count(), 2);
    }
}
