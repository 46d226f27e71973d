//! Time units used across the trace model.
//!
//! Every timestamp in a trace is expressed in microseconds. Simulation
//! output and user-facing metrics are expressed in milliseconds.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A trace timestamp or duration in microseconds
///
/// Traces occasionally carry fractional microseconds; they are rounded
/// on read so that ordering and arithmetic stay exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct MicroSeconds(pub i64);

impl MicroSeconds {
    pub const ZERO: MicroSeconds = MicroSeconds(0);

    pub fn from_millis(ms: f64) -> Self {
        MicroSeconds((ms * 1000.0).round() as i64)
    }

    pub fn from_seconds(seconds: f64) -> Self {
        MicroSeconds((seconds * 1_000_000.0).round() as i64)
    }

    pub fn to_millis(self) -> MilliSeconds {
        MilliSeconds(self.0 as f64 / 1000.0)
    }

    pub fn as_millis_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl<'de> Deserialize<'de> for MicroSeconds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        Ok(MicroSeconds(raw.round() as i64))
    }
}

impl Add for MicroSeconds {
    type Output = MicroSeconds;

    fn add(self, rhs: MicroSeconds) -> MicroSeconds {
        MicroSeconds(self.0 + rhs.0)
    }
}

impl Sub for MicroSeconds {
    type Output = MicroSeconds;

    fn sub(self, rhs: MicroSeconds) -> MicroSeconds {
        MicroSeconds(self.0 - rhs.0)
    }
}

impl fmt::Display for MicroSeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}µs", self.0)
    }
}

/// A duration or offset in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MilliSeconds(pub f64);

impl fmt::Display for MilliSeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}ms", self.0)
    }
}

/// A closed time range `[min, max]` in microseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceWindow {
    pub min: MicroSeconds,
    pub max: MicroSeconds,
    pub range: MicroSeconds,
}

impl TraceWindow {
    pub fn new(min: MicroSeconds, max: MicroSeconds) -> Self {
        Self {
            min,
            max,
            range: max - min,
        }
    }

    pub fn contains(&self, ts: MicroSeconds) -> bool {
        ts >= self.min && ts <= self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fractional_timestamps_round() {
        let ts: MicroSeconds = serde_json::from_str("1234.6").unwrap();
        assert_eq!(ts, MicroSeconds(1235));

        let ts: MicroSeconds = serde_json::from_str("42").unwrap();
        assert_eq!(ts, MicroSeconds(42));
    }

    #[test]
    fn test_unit_conversions() {
        assert_eq!(MicroSeconds(472_300).to_millis(), MilliSeconds(472.3));
        assert_eq!(MicroSeconds::from_millis(1.5), MicroSeconds(1500));
        assert_eq!(MicroSeconds::from_seconds(0.25), MicroSeconds(250_000));
    }

    #[test]
    fn test_window_contains_bounds() {
        let window = TraceWindow::new(MicroSeconds(10), MicroSeconds(20));
        assert!(window.contains(MicroSeconds(10)));
        assert!(window.contains(MicroSeconds(20)));
        assert!(!window.contains(MicroSeconds(21)));
        assert_eq!(window.range, MicroSeconds(10));
    }
}
