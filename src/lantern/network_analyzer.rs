//! Observed network characteristics of a trace.
//!
//! Estimates per-origin round-trip times and server response times from
//! the loader timing blocks, plus the overall throughput. The simulator
//! uses the per-origin extras under every profile, and the `observed`
//! profile also takes its RTT and throughput from here.

use crate::aggregator::statistics::{summarize_groups, ValueSummary};
use crate::handlers::network_requests::{ResourceType, SyntheticNetworkRequest};
use crate::utils::config::{
    COARSE_RTT_ESTIMATE_MULTIPLIER, DEFAULT_SERVER_RESPONSE_SHARE, DOCUMENT_SERVER_RESPONSE_SHARE,
    MINIMUM_COARSE_RTT_MS,
};
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Summary consumed by the simulator
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkAnalysis {
    /// Smallest per-origin RTT (ms); 0 when nothing could be estimated
    pub rtt: f64,
    /// Bits per second; infinite when no request downloaded anything
    pub throughput: f64,
    /// Extra RTT of each origin over `rtt`
    pub additional_rtt_by_origin: BTreeMap<String, f64>,
    /// Median server response time of each origin (ms)
    pub server_response_time_by_origin: BTreeMap<String, f64>,
}

/// Requests grouped by origin, keeping input order within a group
pub fn group_by_origin(
    records: &[Arc<SyntheticNetworkRequest>],
) -> BTreeMap<String, Vec<Arc<SyntheticNetworkRequest>>> {
    let mut grouped: BTreeMap<String, Vec<Arc<SyntheticNetworkRequest>>> = BTreeMap::new();
    for record in records {
        grouped
            .entry(record.origin.clone())
            .or_default()
            .push(Arc::clone(record));
    }
    grouped
}

/// Whether the protocol-reported connection ids and reuse flags look sane
///
/// They are trusted when there is more than one connection and every
/// connection was opened fresh by at least one request.
pub fn can_trust_connection_information(records: &[Arc<SyntheticNetworkRequest>]) -> bool {
    let mut fresh_by_connection: HashMap<u64, bool> = HashMap::new();
    for record in records {
        let Some(id) = record.connection_id else {
            continue;
        };
        let fresh = fresh_by_connection.entry(id).or_insert(false);
        *fresh = *fresh || !record.connection_reused;
    }
    fresh_by_connection.len() > 1 && fresh_by_connection.values().all(|fresh| *fresh)
}

/// Request id -> whether the request reused an existing connection
///
/// # Arguments
/// * `force_coarse` - ignore the protocol's reuse flags even when trustworthy
///
/// Coarse estimates treat a request as reused when it is h2 or starts after
/// the first request of its origin finished; the earliest request of each
/// origin is always fresh.
pub fn estimate_if_connection_was_reused(
    records: &[Arc<SyntheticNetworkRequest>],
    force_coarse: bool,
) -> HashMap<String, bool> {
    if !force_coarse && can_trust_connection_information(records) {
        return records
            .iter()
            .map(|record| (record.request_id.clone(), record.connection_reused))
            .collect();
    }

    let mut reused = HashMap::new();
    for origin_records in group_by_origin(records).values() {
        let earliest_reuse_possible = origin_records
            .iter()
            .map(|record| record.end_time())
            .min();

        for record in origin_records {
            let after_first = earliest_reuse_possible.is_some_and(|end| record.ts >= end);
            reused.insert(record.request_id.clone(), after_first || record.is_h2());
        }

        if let Some(first) = origin_records.iter().min_by_key(|record| record.ts) {
            reused.insert(first.request_id.clone(), false);
        }
    }
    reused
}

/// **Private** - RTT samples from the TCP/TLS handshake of a fresh connection
fn estimate_rtt_via_connection_timing(record: &SyntheticNetworkRequest, reused: bool) -> Vec<f64> {
    let Some(timing) = record.timing.as_ref() else {
        return Vec::new();
    };
    if reused {
        return Vec::new();
    }

    let (connect_start, ssl_start, connect_end) =
        (timing.connect_start, timing.ssl_start, timing.connect_end);
    if connect_end >= 0.0 && connect_start >= 0.0 && record.protocol.starts_with("h3") {
        vec![connect_end - connect_start]
    } else if ssl_start >= 0.0 && connect_end >= 0.0 && connect_start >= 0.0 {
        vec![connect_end - ssl_start, ssl_start - connect_start]
    } else if connect_start >= 0.0 && connect_end >= 0.0 {
        vec![connect_end - connect_start]
    } else {
        Vec::new()
    }
}

/// **Private** - rough RTT from time to response headers
fn estimate_rtt_via_headers_end(record: &SyntheticNetworkRequest, reused: bool) -> Option<f64> {
    let headers_end = record.timing.as_ref()?.receive_headers_end;
    if !headers_end.is_finite() || headers_end < 0.0 {
        return None;
    }

    let server_share = match record.resource_type {
        ResourceType::Document | ResourceType::Xhr | ResourceType::Fetch => {
            DOCUMENT_SERVER_RESPONSE_SHARE
        }
        _ => DEFAULT_SERVER_RESPONSE_SHARE,
    };
    let estimated_server_response_time = headers_end * server_share;

    let mut round_trips = 1.0;
    if !reused {
        round_trips += 1.0;
        if record.scheme == "https" {
            round_trips += 1.0;
        }
    }
    Some(((headers_end - estimated_server_response_time) / round_trips).max(MINIMUM_COARSE_RTT_MS))
}

/// RTT samples per origin, summarized
///
/// Handshake timings are preferred; origins without any fall back to the
/// coarse headers-end estimate scaled by [`COARSE_RTT_ESTIMATE_MULTIPLIER`].
pub fn estimate_rtt_by_origin(
    records: &[Arc<SyntheticNetworkRequest>],
) -> BTreeMap<String, ValueSummary> {
    let reused = estimate_if_connection_was_reused(records, false);
    let mut estimates: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    for (origin, origin_records) in group_by_origin(records) {
        let was_reused = |record: &SyntheticNetworkRequest| {
            reused.get(&record.request_id).copied().unwrap_or(false)
        };

        let mut samples: Vec<f64> = origin_records
            .iter()
            .flat_map(|record| estimate_rtt_via_connection_timing(record, was_reused(record)))
            .collect();

        if samples.is_empty() {
            samples = origin_records
                .iter()
                .filter_map(|record| estimate_rtt_via_headers_end(record, was_reused(record)))
                .map(|estimate| estimate * COARSE_RTT_ESTIMATE_MULTIPLIER)
                .collect();
        }

        if !samples.is_empty() {
            estimates.insert(origin, samples);
        }
    }
    summarize_groups(&estimates)
}

/// Server response time samples per origin, summarized
///
/// Each sample is the send-to-headers time minus the origin's RTT,
/// clamped at zero.
pub fn estimate_server_response_time_by_origin(
    records: &[Arc<SyntheticNetworkRequest>],
    rtt_by_origin: &BTreeMap<String, f64>,
) -> BTreeMap<String, ValueSummary> {
    let mut estimates: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (origin, origin_records) in group_by_origin(records) {
        let rtt = rtt_by_origin.get(&origin).copied().unwrap_or(0.0);
        let samples: Vec<f64> = origin_records
            .iter()
            .filter_map(|record| record.timing.as_ref())
            .filter(|timing| timing.receive_headers_end >= 0.0 && timing.send_end >= 0.0)
            .map(|timing| (timing.receive_headers_end - timing.send_end - rtt).max(0.0))
            .collect();
        if !samples.is_empty() {
            estimates.insert(origin, samples);
        }
    }
    summarize_groups(&estimates)
}

/// Observed throughput in bits per second
///
/// Bytes of every finished network download divided by the total time at
/// least one download was in flight.
pub fn estimate_throughput(records: &[Arc<SyntheticNetworkRequest>]) -> f64 {
    let mut total_bytes = 0.0;
    let mut boundaries: Vec<(i64, bool)> = Vec::new();
    for record in records {
        if record.from_cache
            || !record.is_network_scheme()
            || record.failed
            || record.status_code.is_some_and(|code| code >= 300)
        {
            continue;
        }
        let Some(headers_end) = record.response_headers_end else {
            continue;
        };
        total_bytes += record.transfer_size as f64;
        boundaries.push((headers_end.0, true));
        boundaries.push((record.end_time().0, false));
    }
    if boundaries.is_empty() {
        return f64::INFINITY;
    }
    boundaries.sort_by_key(|(time, _)| *time);

    let mut inflight = 0usize;
    let mut current_start = 0i64;
    let mut total_duration_us = 0i64;
    for (time, is_start) in boundaries {
        if is_start {
            if inflight == 0 {
                current_start = time;
            }
            inflight += 1;
        } else {
            inflight = inflight.saturating_sub(1);
            if inflight == 0 {
                total_duration_us += time - current_start;
            }
        }
    }

    if total_duration_us <= 0 {
        return f64::INFINITY;
    }
    total_bytes * 8.0 / (total_duration_us as f64 / 1_000_000.0)
}

/// Full analysis of `records`
///
/// **Public** - input to [`SimulatorOptions`](super::simulator::SimulatorOptions)
pub fn analyze(records: &[Arc<SyntheticNetworkRequest>]) -> NetworkAnalysis {
    let rtt_by_origin: BTreeMap<String, f64> = estimate_rtt_by_origin(records)
        .into_iter()
        .map(|(origin, summary)| (origin, summary.min))
        .collect();
    let rtt = rtt_by_origin
        .values()
        .copied()
        .reduce(f64::min)
        .unwrap_or(0.0);

    let response_times = estimate_server_response_time_by_origin(records, &rtt_by_origin);
    let mut additional_rtt_by_origin = BTreeMap::new();
    let mut server_response_time_by_origin = BTreeMap::new();
    for (origin, summary) in response_times {
        let origin_rtt = rtt_by_origin.get(&origin).copied().unwrap_or(rtt);
        additional_rtt_by_origin.insert(origin.clone(), origin_rtt - rtt);
        server_response_time_by_origin.insert(origin, summary.median);
    }

    let connections: HashSet<u64> = records.iter().filter_map(|r| r.connection_id).collect();
    let throughput = estimate_throughput(records);
    debug!(
        "Network analysis: rtt={:.1}ms throughput={:.0}bps over {} origins, {} connections",
        rtt,
        throughput,
        rtt_by_origin.len(),
        connections.len()
    );

    NetworkAnalysis {
        rtt,
        throughput,
        additional_rtt_by_origin,
        server_response_time_by_origin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::network_requests::ResourceTiming;
    use crate::types::MicroSeconds;

    fn request(id: &str, origin: &str, start_ms: i64, end_ms: i64) -> SyntheticNetworkRequest {
        SyntheticNetworkRequest {
            request_id: id.to_string(),
            url: format!("{}/{}", origin, id),
            origin: origin.to_string(),
            scheme: "https".to_string(),
            ts: MicroSeconds(start_ms * 1000),
            finish_time: MicroSeconds(end_ms * 1000),
            ..SyntheticNetworkRequest::default()
        }
    }

    fn timing(connect_start: f64, ssl_start: f64, connect_end: f64) -> ResourceTiming {
        ResourceTiming {
            request_time: 1.0,
            dns_start: -1.0,
            dns_end: -1.0,
            connect_start,
            connect_end,
            ssl_start,
            ssl_end: -1.0,
            send_start: connect_end,
            send_end: connect_end + 1.0,
            receive_headers_start: -1.0,
            receive_headers_end: connect_end + 101.0,
        }
    }

    #[test]
    fn test_coarse_reuse_estimate() {
        let records = vec![
            Arc::new(request("1", "https://a.test", 0, 100)),
            Arc::new(request("2", "https://a.test", 50, 200)),
            Arc::new(request("3", "https://a.test", 150, 300)),
            Arc::new(request("4", "https://b.test", 160, 300)),
        ];
        let reused = estimate_if_connection_was_reused(&records, true);
        assert!(!reused["1"]);
        assert!(!reused["2"]);
        assert!(reused["3"]);
        assert!(!reused["4"]);
    }

    #[test]
    fn test_untrusted_with_single_connection() {
        let mut a = request("1", "https://a.test", 0, 100);
        a.connection_id = Some(7);
        let mut b = request("2", "https://a.test", 10, 100);
        b.connection_id = Some(7);
        b.connection_reused = true;
        assert!(!can_trust_connection_information(&[Arc::new(a.clone()), Arc::new(b.clone())]));

        let mut c = request("3", "https://b.test", 10, 100);
        c.connection_id = Some(8);
        assert!(can_trust_connection_information(&[
            Arc::new(a),
            Arc::new(b),
            Arc::new(c)
        ]));
    }

    #[test]
    fn test_rtt_and_server_response_time() {
        let mut a = request("1", "https://a.test", 0, 500);
        a.timing = Some(timing(0.0, 40.0, 80.0));
        let mut b = request("2", "https://b.test", 0, 500);
        b.timing = Some(timing(0.0, 60.0, 120.0));

        let analysis = analyze(&[Arc::new(a), Arc::new(b)]);
        assert_eq!(analysis.rtt, 40.0);
        assert_eq!(analysis.additional_rtt_by_origin["https://a.test"], 0.0);
        assert_eq!(analysis.additional_rtt_by_origin["https://b.test"], 20.0);
        // 100ms between send end and headers, minus the origin RTT
        assert_eq!(analysis.server_response_time_by_origin["https://a.test"], 60.0);
        assert_eq!(analysis.server_response_time_by_origin["https://b.test"], 40.0);
    }

    #[test]
    fn test_throughput_merges_overlapping_downloads() {
        let mut a = request("1", "https://a.test", 0, 1000);
        a.response_headers_end = Some(MicroSeconds(0));
        a.transfer_size = 1000;
        let mut b = request("2", "https://a.test", 0, 1000);
        b.response_headers_end = Some(MicroSeconds(500_000));
        b.transfer_size = 1000;

        // 2000 bytes over one second
        assert_eq!(estimate_throughput(&[Arc::new(a), Arc::new(b)]), 16_000.0);
        assert!(estimate_throughput(&[]).is_infinite());
    }
}
