use std::path::PathBuf;

/// Arguments for the analyze command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct AnalyzeArgs {
    /// Trace file to analyze
    pub trace_path: PathBuf,

    /// Output path for the JSON report
    pub output_json: PathBuf,

    /// Handler names to run (None = all); dependencies are added
    pub handlers: Option<Vec<String>>,

    /// Simulation preset name
    pub profile_name: Option<String>,

    /// TOML simulation profile (exclusive with `profile_name`)
    pub profile_file: Option<PathBuf>,

    /// Round trip time override, milliseconds
    pub rtt_ms: Option<f64>,

    /// Throughput override, kilobits per second
    pub throughput_kbps: Option<f64>,

    /// CPU slowdown override
    pub cpu_slowdown: Option<f64>,

    /// Print text summary to stdout
    pub print_summary: bool,
}

impl Default for AnalyzeArgs {
    fn default() -> Self {
        Self {
            trace_path: PathBuf::new(),
            output_json: PathBuf::from("report.json"),
            handlers: None,
            profile_name: None,
            profile_file: None,
            rtt_ms: None,
            throughput_kbps: None,
            cpu_slowdown: None,
            print_summary: false,
        }
    }
}
