//! Simulation profiles and the options derived from them.
//!
//! A profile names the network and CPU conditions to simulate. Presets
//! cover the common throttling targets; a TOML file can define a custom
//! profile, and individual values can be overridden afterwards.
//!
//! ```toml
//! name = "slow-desktop"
//! rtt_ms = 80.0
//! throughput_kbps = 4096.0
//! cpu_slowdown_multiplier = 2.0
//! ```

use super::tcp_connection::TcpConnection;
use crate::lantern::network_analyzer::NetworkAnalysis;
use crate::utils::config::{
    DEFAULT_MAXIMUM_CONCURRENT_REQUESTS, DESKTOP_CPU_SLOWDOWN, DESKTOP_DENSE_4G_RTT_MS,
    DESKTOP_DENSE_4G_THROUGHPUT_KBPS, MOBILE_CPU_SLOWDOWN, MOBILE_REGULAR_3G_RTT_MS,
    MOBILE_REGULAR_3G_THROUGHPUT_KBPS, MOBILE_SLOW_4G_RTT_MS, MOBILE_SLOW_4G_THROUGHPUT_KBPS,
};
use crate::utils::error::ConfigError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Where the network parameters come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrottlingMethod {
    /// Use the profile's RTT and throughput
    #[default]
    Simulate,
    /// Use the RTT and throughput measured from the trace itself
    Observed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationProfile {
    pub name: String,
    pub method: ThrottlingMethod,
    pub rtt_ms: f64,
    pub throughput_kbps: f64,
    pub cpu_slowdown_multiplier: f64,
    pub maximum_concurrent_requests: usize,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self::mobile_slow_4g()
    }
}

impl SimulationProfile {
    pub const PRESETS: [&'static str; 4] = [
        "mobile-slow-4g",
        "mobile-regular-3g",
        "desktop-dense-4g",
        "observed",
    ];

    pub fn mobile_slow_4g() -> Self {
        Self::preset(
            "mobile-slow-4g",
            MOBILE_SLOW_4G_RTT_MS,
            MOBILE_SLOW_4G_THROUGHPUT_KBPS,
            MOBILE_CPU_SLOWDOWN,
        )
    }

    pub fn mobile_regular_3g() -> Self {
        Self::preset(
            "mobile-regular-3g",
            MOBILE_REGULAR_3G_RTT_MS,
            MOBILE_REGULAR_3G_THROUGHPUT_KBPS,
            MOBILE_CPU_SLOWDOWN,
        )
    }

    pub fn desktop_dense_4g() -> Self {
        Self::preset(
            "desktop-dense-4g",
            DESKTOP_DENSE_4G_RTT_MS,
            DESKTOP_DENSE_4G_THROUGHPUT_KBPS,
            DESKTOP_CPU_SLOWDOWN,
        )
    }

    /// Replays the trace's own network conditions without CPU slowdown
    pub fn observed() -> Self {
        Self {
            method: ThrottlingMethod::Observed,
            ..Self::preset("observed", 0.0, 0.0, DESKTOP_CPU_SLOWDOWN)
        }
    }

    fn preset(name: &str, rtt_ms: f64, throughput_kbps: f64, cpu: f64) -> Self {
        Self {
            name: name.to_string(),
            method: ThrottlingMethod::Simulate,
            rtt_ms,
            throughput_kbps,
            cpu_slowdown_multiplier: cpu,
            maximum_concurrent_requests: DEFAULT_MAXIMUM_CONCURRENT_REQUESTS,
        }
    }

    /// Look up a preset by name
    ///
    /// # Errors
    /// * `ConfigError::UnknownProfile` - not one of [`Self::PRESETS`]
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name {
            "mobile-slow-4g" => Ok(Self::mobile_slow_4g()),
            "mobile-regular-3g" => Ok(Self::mobile_regular_3g()),
            "desktop-dense-4g" => Ok(Self::desktop_dense_4g()),
            "observed" => Ok(Self::observed()),
            other => Err(ConfigError::UnknownProfile(other.to_string())),
        }
    }

    /// Parse a profile from TOML; missing keys take the mobile-slow-4g values
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let profile: Self = toml::from_str(content)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Load a profile from a TOML file
    ///
    /// # Errors
    /// * `ConfigError::ReadFailed` - file cannot be read
    /// * `ConfigError::InvalidToml` - not a valid profile
    /// * `ConfigError::InvalidValue` - a value is out of range
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading simulation profile from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Apply command-line overrides
    pub fn with_overrides(
        mut self,
        rtt_ms: Option<f64>,
        throughput_kbps: Option<f64>,
        cpu_slowdown_multiplier: Option<f64>,
    ) -> Result<Self, ConfigError> {
        if let Some(rtt) = rtt_ms {
            self.rtt_ms = rtt;
        }
        if let Some(throughput) = throughput_kbps {
            self.throughput_kbps = throughput;
        }
        if let Some(cpu) = cpu_slowdown_multiplier {
            self.cpu_slowdown_multiplier = cpu;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rtt_ms.is_finite() || self.rtt_ms < 0.0 {
            return Err(ConfigError::InvalidValue(format!("rtt_ms = {}", self.rtt_ms)));
        }
        if self.throughput_kbps.is_nan() || self.throughput_kbps < 0.0 {
            return Err(ConfigError::InvalidValue(format!(
                "throughput_kbps = {}",
                self.throughput_kbps
            )));
        }
        if !self.cpu_slowdown_multiplier.is_finite() || self.cpu_slowdown_multiplier <= 0.0 {
            return Err(ConfigError::InvalidValue(format!(
                "cpu_slowdown_multiplier = {}",
                self.cpu_slowdown_multiplier
            )));
        }
        if self.maximum_concurrent_requests == 0 {
            return Err(ConfigError::InvalidValue(
                "maximum_concurrent_requests = 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Concrete parameters of one simulator instance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatorOptions {
    pub rtt: f64,
    /// Bits per second; infinite means unthrottled
    pub throughput: f64,
    pub maximum_concurrent_requests: usize,
    pub cpu_slowdown_multiplier: f64,
    pub additional_rtt_by_origin: BTreeMap<String, f64>,
    pub server_response_time_by_origin: BTreeMap<String, f64>,
}

impl SimulatorOptions {
    /// Combine a profile with the trace's network analysis
    pub fn new(profile: &SimulationProfile, analysis: &NetworkAnalysis) -> Self {
        let (rtt, throughput) = match profile.method {
            ThrottlingMethod::Simulate => (profile.rtt_ms, profile.throughput_kbps * 1024.0),
            ThrottlingMethod::Observed => (analysis.rtt, analysis.throughput),
        };
        let throughput = if throughput > 0.0 { throughput } else { f64::INFINITY };

        let saturated = TcpConnection::maximum_saturated_connections(rtt, throughput);
        let maximum_concurrent_requests = saturated
            .min(profile.maximum_concurrent_requests as f64)
            .max(1.0) as usize;

        debug!(
            "Simulator options for '{}': rtt={}ms throughput={}bps concurrency={}",
            profile.name, rtt, throughput, maximum_concurrent_requests
        );

        Self {
            rtt,
            throughput,
            maximum_concurrent_requests,
            cpu_slowdown_multiplier: profile.cpu_slowdown_multiplier,
            additional_rtt_by_origin: analysis.additional_rtt_by_origin.clone(),
            server_response_time_by_origin: analysis.server_response_time_by_origin.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_by_name() {
        for name in SimulationProfile::PRESETS {
            assert_eq!(SimulationProfile::from_name(name).unwrap().name, name);
        }
        assert!(matches!(
            SimulationProfile::from_name("dial-up"),
            Err(ConfigError::UnknownProfile(_))
        ));
    }

    #[test]
    fn test_toml_profile_with_defaults() {
        let profile = SimulationProfile::from_toml("name = \"custom\"\nrtt_ms = 80.0\n").unwrap();
        assert_eq!(profile.name, "custom");
        assert_eq!(profile.rtt_ms, 80.0);
        assert_eq!(profile.cpu_slowdown_multiplier, MOBILE_CPU_SLOWDOWN);

        assert!(matches!(
            SimulationProfile::from_toml("rtt_ms = \"fast\""),
            Err(ConfigError::InvalidToml(_))
        ));
        assert!(matches!(
            SimulationProfile::from_toml("cpu_slowdown_multiplier = 0.0"),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.toml");
        fs::write(&path, "name = \"file\"\nmethod = \"observed\"\n").unwrap();
        let profile = SimulationProfile::load(&path).unwrap();
        assert_eq!(profile.method, ThrottlingMethod::Observed);
        assert!(SimulationProfile::load(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_overrides() {
        let profile = SimulationProfile::mobile_slow_4g()
            .with_overrides(Some(40.0), None, Some(1.0))
            .unwrap();
        assert_eq!(profile.rtt_ms, 40.0);
        assert_eq!(profile.throughput_kbps, MOBILE_SLOW_4G_THROUGHPUT_KBPS);
        assert!(SimulationProfile::mobile_slow_4g()
            .with_overrides(Some(-1.0), None, None)
            .is_err());
    }

    #[test]
    fn test_options_from_profile() {
        let options = SimulatorOptions::new(
            &SimulationProfile::mobile_slow_4g(),
            &NetworkAnalysis::default(),
        );
        assert_eq!(options.rtt, 150.0);
        assert_eq!(options.maximum_concurrent_requests, 10);
        assert_eq!(options.cpu_slowdown_multiplier, MOBILE_CPU_SLOWDOWN);

        let analysis = NetworkAnalysis {
            rtt: 20.0,
            throughput: 0.0,
            ..NetworkAnalysis::default()
        };
        let observed = SimulatorOptions::new(&SimulationProfile::observed(), &analysis);
        assert_eq!(observed.rtt, 20.0);
        assert!(observed.throughput.is_infinite());
        assert_eq!(observed.cpu_slowdown_multiplier, 1.0);
    }
}
