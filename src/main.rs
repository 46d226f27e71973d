//! Page Trace Studio CLI
//!
//! Analyzes browser performance traces: runs the handler pipeline,
//! estimates page-load metrics with Lantern and reports insights.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use page_trace_studio::commands::{
    display_schema, display_version, execute_analyze, validate_args, validate_report_file,
    AnalyzeArgs,
};

/// Page Trace Studio - web performance trace analysis
#[derive(Parser, Debug)]
#[command(name = "page-trace")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a trace file
    Analyze {
        /// Trace JSON file (event array or {traceEvents, metadata})
        #[arg(short, long)]
        trace: PathBuf,

        /// Output path for the JSON report
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,

        /// Comma-separated handler names to run (dependencies are added)
        #[arg(long, value_delimiter = ',')]
        handlers: Option<Vec<String>>,

        /// Simulation profile preset
        #[arg(short, long, env = "PAGE_TRACE_PROFILE", conflicts_with = "profile_file")]
        profile: Option<String>,

        /// TOML file with a simulation profile
        #[arg(long)]
        profile_file: Option<PathBuf>,

        /// Round trip time override in milliseconds
        #[arg(long)]
        rtt: Option<f64>,

        /// Throughput override in kilobits per second
        #[arg(long)]
        throughput: Option<f64>,

        /// CPU slowdown multiplier override
        #[arg(long)]
        cpu: Option<f64>,

        /// Print text summary to stdout
        #[arg(long)]
        summary: bool,
    },

    /// Validate a report JSON file
    Validate {
        /// Path to report JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display schema information
    Schema {
        /// Show full schema details
        #[arg(long)]
        show: bool,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Analyze {
            trace,
            output,
            handlers,
            profile,
            profile_file,
            rtt,
            throughput,
            cpu,
            summary,
        } => {
            let args = AnalyzeArgs {
                trace_path: trace,
                output_json: output,
                handlers,
                profile_name: profile,
                profile_file,
                rtt_ms: rtt,
                throughput_kbps: throughput,
                cpu_slowdown: cpu,
                print_summary: summary,
            };

            validate_args(&args)?;
            execute_analyze(args)?;
        }

        Commands::Validate { file } => {
            validate_report_file(&file)?;
        }

        Commands::Schema { show } => {
            display_schema(show);
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
