//! Analyze command implementation.
//!
//! The analyze command:
//! 1. Reads the trace file
//! 2. Runs the handler pipeline
//! 3. Resolves the simulation profile
//! 4. Estimates metrics and generates insights per navigation
//! 5. Writes the JSON report

use super::models::AnalyzeArgs;
use crate::handlers::HandlerName;
use crate::insights::{generate_insights, NavigationInsights};
use crate::lantern::SimulationProfile;
use crate::output::{write_report, AnalysisReport, TraceSummary};
use crate::parser::read_trace_file;
use crate::processor::TraceModel;
use crate::utils::config::DEFAULT_PROFILE;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use futures::executor::block_on;
use log::{debug, info, warn};
use std::time::Instant;

/// Execute the analyze command
///
/// **Public** - main entry point called from main.rs
///
/// # Arguments
/// * `args` - Analyze command arguments
///
/// # Returns
/// The report that was written
///
/// # Errors
/// * Unreadable or malformed trace file
/// * Unknown handler or profile names, invalid profile values
/// * Handler failures
/// * File write errors
pub fn execute_analyze(args: AnalyzeArgs) -> Result<AnalysisReport> {
    let start_time = Instant::now();

    info!("Analyzing trace: {}", args.trace_path.display());

    info!("Step 1/5: Reading trace file...");
    let file = read_trace_file(&args.trace_path).context("Failed to read trace file")?;
    let skipped_events = file.skipped_events;
    if skipped_events > 0 {
        warn!("Skipped {} unreadable event(s)", skipped_events);
    }

    info!("Step 2/5: Running handlers...");
    let mut model = match resolve_handlers(args.handlers.as_deref())? {
        Some(names) => TraceModel::with_handlers(names),
        None => TraceModel::new(),
    };
    let index = block_on(model.parse(file)).context("Failed to process trace events")?;
    let trace = model.parsed_trace(index)?;
    debug!("Handler data: {:?}", trace.data.keys().collect::<Vec<_>>());

    info!("Step 3/5: Resolving simulation profile...");
    let profile = resolve_profile(&args)?;
    debug!(
        "Profile '{}': rtt {}ms, throughput {}kbps, cpu x{}",
        profile.name, profile.rtt_ms, profile.throughput_kbps, profile.cpu_slowdown_multiplier
    );

    info!("Step 4/5: Generating insights...");
    let navigations =
        generate_insights(&trace.data, Some(&profile)).context("Failed to generate insights")?;

    info!("Step 5/5: Writing report...");
    let summary = TraceSummary {
        name: trace.name.clone(),
        path: Some(args.trace_path.display().to_string()),
        event_count: trace.events.len(),
        skipped_events,
        metadata: trace.metadata.clone(),
    };
    let report = AnalysisReport::new(summary, &trace.data, Some(profile), navigations);
    write_report(&report, &args.output_json).context("Failed to write report JSON")?;

    info!("✓ Report written to: {}", args.output_json.display());

    if args.print_summary {
        print_summary(&report);
    }

    info!("Analysis completed in {:.2}s", start_time.elapsed().as_secs_f64());

    Ok(report)
}

/// Parse the `--handlers` list
///
/// **Private** - `None` means every handler
fn resolve_handlers(names: Option<&[String]>) -> Result<Option<Vec<HandlerName>>> {
    let Some(names) = names else {
        return Ok(None);
    };
    let mut handlers = Vec::with_capacity(names.len());
    for name in names.iter().filter(|name| !name.trim().is_empty()) {
        match name.parse::<HandlerName>() {
            Ok(handler) => handlers.push(handler),
            Err(unknown) => bail!("Unknown handler: {}", unknown),
        }
    }
    if handlers.is_empty() {
        bail!("--handlers needs at least one handler name");
    }
    Ok(Some(handlers))
}

/// Build the simulation profile from a preset or file plus overrides
///
/// **Public** - exposed for tests and library callers
pub fn resolve_profile(args: &AnalyzeArgs) -> Result<SimulationProfile> {
    let base = match (&args.profile_name, &args.profile_file) {
        (Some(_), Some(_)) => bail!("--profile and --profile-file are mutually exclusive"),
        (_, Some(path)) => SimulationProfile::load(path)
            .with_context(|| format!("Failed to load profile {}", path.display()))?,
        (Some(name), None) => SimulationProfile::from_name(name)?,
        (None, None) => SimulationProfile::from_name(DEFAULT_PROFILE)?,
    };
    Ok(base.with_overrides(args.rtt_ms, args.throughput_kbps, args.cpu_slowdown)?)
}

/// Validate analyze arguments
///
/// **Public** - can be called before execute_analyze for early validation
pub fn validate_args(args: &AnalyzeArgs) -> Result<()> {
    if args.trace_path.as_os_str().is_empty() {
        bail!("Trace path cannot be empty");
    }

    if !args.trace_path.is_file() {
        bail!("Trace file not found: {}", args.trace_path.display());
    }

    if args.output_json.as_os_str().is_empty() {
        bail!("Output path cannot be empty");
    }

    resolve_handlers(args.handlers.as_deref())?;
    resolve_profile(args)?;

    Ok(())
}

/// Print a colored text summary of `report`
pub fn print_summary(report: &AnalysisReport) {
    println!("\n{}", "=".repeat(80));
    println!("{}", "PAGE TRACE SUMMARY".bold());
    println!("{}", "=".repeat(80));
    println!("Trace:       {}", report.trace.name);
    println!("Events:      {}", report.trace.event_count);
    if let Some(profile) = &report.profile {
        println!("Profile:     {}", profile.name);
    }
    if let Some(transfer) = &report.transfer {
        println!("Transfer:    {}", transfer.summary());
    }
    println!("Navigations: {}", report.navigations.len());

    for navigation in &report.navigations {
        print_navigation(navigation);
    }
    println!("{}", "=".repeat(80));
}

/// **Private** - one navigation block of the summary
fn print_navigation(navigation: &NavigationInsights) {
    println!();
    println!(
        "{} {}",
        "Navigation".cyan().bold(),
        navigation.url.as_deref().unwrap_or(&navigation.navigation_id)
    );

    for metric in &navigation.metrics {
        println!(
            "  {:<24} {:>9.1} ms  (optimistic {:.1}, pessimistic {:.1})",
            metric.metric.to_string(),
            metric.timing_ms,
            metric.optimistic_ms,
            metric.pessimistic_ms
        );
    }
    if let Some(error) = &navigation.lantern_error {
        println!("  {} {}", "Simulation unavailable:".yellow(), error);
    }

    if let Some(lcp) = &navigation.largest_contentful_paint {
        if let (Some(lcp_ms), Some(phases)) = (lcp.lcp_ms, &lcp.phases) {
            println!(
                "  Observed LCP {:.1} ms: TTFB {:.1}, render delay {:.1}",
                lcp_ms, phases.ttfb, phases.render_delay
            );
        }
    }
    if let Some(blocking) = &navigation.render_blocking {
        if !blocking.requests.is_empty() {
            println!("  {} render-blocking request(s)", blocking.requests.len());
        }
    }
    if let Some(cls) = &navigation.cumulative_layout_shift {
        println!("  CLS {:.3}", cls.cluster_score);
    }
    if let Some(inp) = navigation
        .interaction_to_next_paint
        .as_ref()
        .and_then(|inp| inp.high_percentile_interaction.as_ref())
    {
        println!("  INP {:.1} ms ({})", inp.duration_ms, inp.event_type);
    }
    if let Some(reflow) = &navigation.forced_reflow {
        if let Some(call) = &reflow.top_level_function_call {
            println!(
                "  {} forced reflow(s), {:.1} ms under {} ({})",
                reflow.events.len(),
                reflow.top_level_reflow_time_ms,
                call.function_name,
                call.url
            );
        }
    }

    for warning in navigation.warnings() {
        println!("  {} {:?}", "warning:".yellow(), warning);
    }
    for (insight, error) in &navigation.errors {
        println!("  {} {}: {}", "error:".red(), insight, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_resolve_handlers() {
        assert_eq!(resolve_handlers(None).unwrap(), None);
        assert_eq!(
            resolve_handlers(Some(&["animations".to_string(), " Meta ".to_string()])).unwrap(),
            Some(vec![HandlerName::Animations, HandlerName::Meta])
        );
        assert!(resolve_handlers(Some(&["Bogus".to_string()])).is_err());
        assert!(resolve_handlers(Some(&[String::new()])).is_err());
    }

    #[test]
    fn test_resolve_profile_default_and_overrides() {
        let profile = resolve_profile(&AnalyzeArgs::default()).unwrap();
        assert_eq!(profile.name, DEFAULT_PROFILE);

        let args = AnalyzeArgs {
            profile_name: Some("desktop-dense-4g".to_string()),
            rtt_ms: Some(10.0),
            ..AnalyzeArgs::default()
        };
        let profile = resolve_profile(&args).unwrap();
        assert_eq!(profile.rtt_ms, 10.0);
        assert_eq!(profile.cpu_slowdown_multiplier, 1.0);
    }

    #[test]
    fn test_resolve_profile_rejects_conflicts() {
        let args = AnalyzeArgs {
            profile_name: Some("observed".to_string()),
            profile_file: Some(PathBuf::from("profile.toml")),
            ..AnalyzeArgs::default()
        };
        assert!(resolve_profile(&args).is_err());

        let args = AnalyzeArgs {
            profile_name: Some("dial-up".to_string()),
            ..AnalyzeArgs::default()
        };
        assert!(resolve_profile(&args).is_err());

        let args = AnalyzeArgs {
            cpu_slowdown: Some(0.0),
            ..AnalyzeArgs::default()
        };
        assert!(resolve_profile(&args).is_err());
    }

    #[test]
    fn test_validate_args_missing_trace() {
        assert!(validate_args(&AnalyzeArgs::default()).is_err());

        let args = AnalyzeArgs {
            trace_path: PathBuf::from("/definitely/not/here.json"),
            ..AnalyzeArgs::default()
        };
        assert!(validate_args(&args).is_err());
    }
}
