//! Model of a single TCP (optionally TLS, optionally h2) connection.
//!
//! Downloads advance in round trips. The congestion window starts at
//! [`INITIAL_CONGESTION_WINDOW`] segments and doubles every round trip up
//! to the bandwidth-delay product of the connection.

use crate::utils::config::{INITIAL_CONGESTION_WINDOW, TCP_SEGMENT_SIZE};

/// Outcome of [`TcpConnection::simulate_download_until`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadResult {
    pub round_trips: f64,
    /// Milliseconds spent in this call
    pub time_elapsed: f64,
    pub bytes_downloaded: f64,
    /// Bytes received past the end of the response; only tracked for h2
    pub extra_bytes_downloaded: f64,
    pub congestion_window: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TcpConnection {
    warmed: bool,
    ssl: bool,
    h2: bool,
    rtt: f64,
    /// Bits per second
    throughput: f64,
    server_latency: f64,
    congestion_window: f64,
    h2_overflow_bytes_downloaded: f64,
}

impl TcpConnection {
    pub fn new(rtt: f64, throughput: f64, server_latency: f64, ssl: bool, h2: bool) -> Self {
        Self {
            warmed: false,
            ssl,
            h2,
            rtt,
            throughput,
            server_latency,
            congestion_window: INITIAL_CONGESTION_WINDOW,
            h2_overflow_bytes_downloaded: 0.0,
        }
    }

    /// How many connections can run in parallel before they share bandwidth
    ///
    /// **Public** - bounds the simulator's concurrent request count
    pub fn maximum_saturated_connections(rtt: f64, available_throughput: f64) -> f64 {
        if rtt <= 0.0 || !available_throughput.is_finite() {
            return f64::INFINITY;
        }
        let round_trips_per_second = 1000.0 / rtt;
        let bytes_per_second = round_trips_per_second * TCP_SEGMENT_SIZE;
        let minimum_throughput_per_request = bytes_per_second * 8.0;
        (available_throughput / minimum_throughput_per_request).floor()
    }

    /// **Private** - bandwidth-delay product in segments
    fn maximum_congestion_window(&self) -> f64 {
        if !self.throughput.is_finite() {
            return f64::INFINITY;
        }
        let bytes_per_second = self.throughput / 8.0;
        let seconds_per_round_trip = self.rtt / 1000.0;
        (bytes_per_second * seconds_per_round_trip / TCP_SEGMENT_SIZE).floor()
    }

    pub fn set_throughput(&mut self, throughput: f64) {
        self.throughput = throughput;
    }

    pub fn set_congestion_window(&mut self, window: f64) {
        self.congestion_window = window;
    }

    pub fn set_warmed(&mut self, warmed: bool) {
        self.warmed = warmed;
    }

    pub fn is_warm(&self) -> bool {
        self.warmed
    }

    pub fn is_h2(&self) -> bool {
        self.h2
    }

    pub fn congestion_window(&self) -> f64 {
        self.congestion_window
    }

    /// Only h2 connections carry bytes over to the next response
    pub fn set_h2_overflow_bytes_downloaded(&mut self, bytes: f64) {
        if self.h2 {
            self.h2_overflow_bytes_downloaded = bytes;
        }
    }

    /// Simulate downloading `bytes_to_download`, stopping once
    /// `maximum_time_to_elapse` ms would be exceeded
    ///
    /// # Arguments
    /// * `time_already_elapsed` - time this request has already spent on the connection
    /// * `dns_resolution_time` - added to the handshake of a cold connection
    pub fn simulate_download_until(
        &self,
        bytes_to_download: f64,
        time_already_elapsed: f64,
        maximum_time_to_elapse: f64,
        dns_resolution_time: f64,
    ) -> DownloadResult {
        let mut bytes_to_download = bytes_to_download;
        if self.warmed && self.h2 {
            bytes_to_download -= self.h2_overflow_bytes_downloaded;
        }

        let two_way_latency = self.rtt;
        let one_way_latency = two_way_latency / 2.0;
        let maximum_congestion_window = self.maximum_congestion_window();

        let mut handshake_and_request = one_way_latency;
        if !self.warmed {
            // DNS, SYN, SYN-ACK, ACK + request, then TLS with false start
            handshake_and_request = dns_resolution_time
                + one_way_latency * 3.0
                + if self.ssl { two_way_latency } else { 0.0 };
        }

        let mut round_trips = if two_way_latency > 0.0 {
            (handshake_and_request / two_way_latency).ceil()
        } else {
            0.0
        };
        let mut time_to_first_byte = handshake_and_request + self.server_latency + one_way_latency;
        if self.warmed && self.h2 {
            time_to_first_byte = 0.0;
        }

        let time_elapsed_for_ttfb = (time_to_first_byte - time_already_elapsed).max(0.0);
        let maximum_download_time = maximum_time_to_elapse - time_elapsed_for_ttfb;

        let mut congestion_window = self.congestion_window.min(maximum_congestion_window);
        let mut total_bytes_downloaded = 0.0;
        if time_elapsed_for_ttfb > 0.0 {
            total_bytes_downloaded = congestion_window * TCP_SEGMENT_SIZE;
        } else {
            round_trips = 0.0;
        }

        let mut download_time_elapsed = 0.0;
        let mut bytes_remaining = bytes_to_download - total_bytes_downloaded;
        while bytes_remaining > 0.0 && download_time_elapsed <= maximum_download_time {
            round_trips += 1.0;
            download_time_elapsed += two_way_latency;
            congestion_window = (congestion_window * 2.0).min(maximum_congestion_window).max(1.0);

            let bytes_in_window = congestion_window * TCP_SEGMENT_SIZE;
            total_bytes_downloaded += bytes_in_window;
            bytes_remaining -= bytes_in_window;
        }

        let extra_bytes_downloaded = if self.h2 {
            (total_bytes_downloaded - bytes_to_download).max(0.0)
        } else {
            0.0
        };

        DownloadResult {
            round_trips,
            time_elapsed: time_elapsed_for_ttfb + download_time_elapsed,
            bytes_downloaded: total_bytes_downloaded.min(bytes_to_download).max(0.0),
            extra_bytes_downloaded,
            congestion_window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MBPS: f64 = 1000.0 * 1000.0;

    #[test]
    fn test_maximum_saturated_connections() {
        // 100ms RTT, 10 segments/s per request = 116,800 bits/s
        assert_eq!(TcpConnection::maximum_saturated_connections(100.0, 1.0 * MBPS), 8.0);
        assert!(TcpConnection::maximum_saturated_connections(0.0, MBPS).is_infinite());
    }

    #[test]
    fn test_cold_connection_handshake() {
        let connection = TcpConnection::new(100.0, 10.0 * MBPS, 0.0, true, false);
        let result = connection.simulate_download_until(1000.0, 0.0, f64::INFINITY, 0.0);
        // 1.5 RTT TCP + 1 RTT TLS + 0.5 RTT response
        assert_eq!(result.time_elapsed, 300.0);
        assert_eq!(result.bytes_downloaded, 1000.0);
    }

    #[test]
    fn test_warm_connection_skips_handshake() {
        let mut connection = TcpConnection::new(100.0, 10.0 * MBPS, 50.0, true, false);
        connection.set_warmed(true);
        let result = connection.simulate_download_until(1000.0, 0.0, f64::INFINITY, 0.0);
        assert_eq!(result.time_elapsed, 150.0);
    }

    #[test]
    fn test_large_download_needs_more_round_trips() {
        let connection = TcpConnection::new(100.0, 10.0 * MBPS, 0.0, false, false);
        // first window 14,600 bytes, next 29,200
        let result = connection.simulate_download_until(30_000.0, 0.0, f64::INFINITY, 0.0);
        assert_eq!(result.time_elapsed, 300.0);
        assert_eq!(result.congestion_window, 20.0);
    }

    #[test]
    fn test_dns_adds_to_cold_connection() {
        let connection = TcpConnection::new(100.0, 10.0 * MBPS, 0.0, false, false);
        let without = connection.simulate_download_until(100.0, 0.0, f64::INFINITY, 0.0);
        let with = connection.simulate_download_until(100.0, 0.0, f64::INFINITY, 200.0);
        assert_eq!(with.time_elapsed - without.time_elapsed, 200.0);
    }

    #[test]
    fn test_h2_overflow_bytes() {
        let connection = TcpConnection::new(100.0, 10.0 * MBPS, 0.0, true, true);
        let result = connection.simulate_download_until(1000.0, 0.0, f64::INFINITY, 0.0);
        assert_eq!(result.extra_bytes_downloaded, 10.0 * TCP_SEGMENT_SIZE - 1000.0);

        let mut warm = connection.clone();
        warm.set_warmed(true);
        warm.set_h2_overflow_bytes_downloaded(5000.0);
        let result = warm.simulate_download_until(4000.0, 0.0, f64::INFINITY, 0.0);
        assert_eq!(result.time_elapsed, 0.0);
    }
}
