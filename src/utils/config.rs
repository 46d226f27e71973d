//! Configuration and constants for the pipeline and the simulator.

/// Current report schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Profile used when none is requested on the command line
pub const DEFAULT_PROFILE: &str = "mobile-slow-4g";

// Main-thread task names that open a new top-level task
pub const TOP_LEVEL_TASK_NAMES: &[&str] = &[
    "RunTask",
    "ThreadControllerImpl::RunTask",
    "ThreadControllerImpl::DoWork",
    "TaskQueueManager::ProcessTaskFromWorkQueue",
    "MessageLoop::RunTask",
];

pub const BROWSER_MAIN_THREAD_NAME: &str = "CrBrowserMain";
pub const RENDERER_MAIN_THREAD_NAME: &str = "CrRendererMain";
pub const GPU_MAIN_THREAD_NAME: &str = "CrGpuMain";

// Layout shift session windows (µs)
pub const LAYOUT_SHIFT_SESSION_GAP_US: i64 = 1_000_000;
pub const LAYOUT_SHIFT_MAX_SESSION_US: i64 = 5_000_000;
/// Root causes (fonts, iframes) are searched this far before a shift
pub const LAYOUT_SHIFT_ROOT_CAUSE_WINDOW_US: i64 = 500_000;

// Graph builder
/// Tasks shorter than this are pruned unless they carry a significant child
pub const SIGNIFICANT_TASK_DURATION_US: i64 = 10_000;
/// Scripts can start evaluating slightly before their request is reported finished
pub const SCRIPT_URL_MATCH_TOLERANCE_US: i64 = 100_000;

// Simulator
pub const TCP_SEGMENT_SIZE: f64 = 1460.0;
pub const INITIAL_CONGESTION_WINDOW: f64 = 10.0;
pub const DEFAULT_CONNECTIONS_PER_ORIGIN: usize = 6;
pub const DEFAULT_MAXIMUM_CONCURRENT_REQUESTS: usize = 10;
pub const DEFAULT_SERVER_RESPONSE_TIME_MS: f64 = 30.0;
pub const DNS_RESOLUTION_RTT_MULTIPLIER: f64 = 2.0;
pub const MAXIMUM_CPU_TASK_DURATION_MS: f64 = 10_000.0;
pub const MAXIMUM_SIMULATION_ITERATIONS: usize = 100_000;
pub const DISK_CACHE_BASE_MS: f64 = 8.0;
pub const DISK_CACHE_MS_PER_MB: f64 = 20.0;
pub const NON_NETWORK_BASE_MS: f64 = 2.0;
pub const NON_NETWORK_MS_PER_MB: f64 = 10.0;

// Network analyzer
/// Coarse RTT estimates are scaled down by this factor
pub const COARSE_RTT_ESTIMATE_MULTIPLIER: f64 = 0.3;
/// Lower bound of a coarse RTT estimate (ms)
pub const MINIMUM_COARSE_RTT_MS: f64 = 3.0;
/// Share of time-to-first-byte spent on the server for documents and XHR
pub const DOCUMENT_SERVER_RESPONSE_SHARE: f64 = 0.9;
pub const DEFAULT_SERVER_RESPONSE_SHARE: f64 = 0.4;

// Metrics
pub const LONG_TASK_THRESHOLD_MS: f64 = 50.0;
pub const CRITICAL_TASK_THRESHOLD_US: i64 = 20_000;
/// Reflow time inside one script invocation reported as forced
pub const FORCED_REFLOW_THRESHOLD_US: i64 = 30_000;
/// Call frames kept per forced reflow stack
pub const FORCED_REFLOW_STACK_DEPTH: usize = 3;
/// RTT at which Speed Index blends optimistic and pessimistic equally
pub const SPEED_INDEX_BASELINE_RTT_MS: f64 = 30.0;
/// RTT the Speed Index coefficients were fitted against (mobile slow 4G)
pub const SPEED_INDEX_REFERENCE_RTT_MS: f64 = 150.0;

// Simulation profile presets
pub const MOBILE_SLOW_4G_RTT_MS: f64 = 150.0;
pub const MOBILE_SLOW_4G_THROUGHPUT_KBPS: f64 = 1.6 * 1024.0 * 0.9;
pub const MOBILE_REGULAR_3G_RTT_MS: f64 = 300.0;
pub const MOBILE_REGULAR_3G_THROUGHPUT_KBPS: f64 = 700.0 * 0.9;
pub const DESKTOP_DENSE_4G_RTT_MS: f64 = 40.0;
pub const DESKTOP_DENSE_4G_THROUGHPUT_KBPS: f64 = 10.0 * 1024.0;
pub const MOBILE_CPU_SLOWDOWN: f64 = 4.0;
pub const DESKTOP_CPU_SLOWDOWN: f64 = 1.0;

// Insights
/// Interactions beyond this many per navigation switch INP to a high percentile
pub const INP_INTERACTIONS_PER_PERCENTILE_STEP: usize = 50;
pub const INP_MAX_PERCENTILE_OFFSET: usize = 9;
