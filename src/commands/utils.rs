use crate::output::read_report;
use crate::utils::config::SCHEMA_VERSION;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::Path;

/// Validate a report JSON file
pub fn validate_report_file(file_path: &Path) -> Result<()> {
    println!("Validating report: {}", file_path.display());

    let report = read_report(file_path).context("Not a valid report")?;
    if !report.is_compatible() {
        bail!(
            "Report schema v{} is incompatible with v{}",
            report.schema_version,
            SCHEMA_VERSION
        );
    }

    println!("{}", "✓ Valid report JSON".green());
    println!("  Schema:      {}", report.schema_version);
    println!("  Generated:   {}", report.generated_at.to_rfc3339());
    println!("  Trace:       {} ({} events)", report.trace.name, report.trace.event_count);
    if let Some(profile) = &report.profile {
        println!("  Profile:     {}", profile.name);
    }
    println!("  Handlers:    {}", report.handlers.len());
    println!("  Navigations: {}", report.navigations.len());
    for navigation in &report.navigations {
        let failures = navigation.errors.len() + usize::from(navigation.lantern_error.is_some());
        println!(
            "    {} - {} metric(s), {} failure(s)",
            navigation.url.as_deref().unwrap_or(&navigation.navigation_id),
            navigation.metrics.len(),
            failures
        );
    }

    Ok(())
}

/// Display schema information
pub fn display_schema(show_details: bool) {
    println!("Page Trace Studio Report Schema");
    println!("Current Version: {}", SCHEMA_VERSION);
    println!();

    if show_details {
        println!("Schema Structure:");
        println!("  schema_version: string     - Schema version (e.g., '1.0.0')");
        println!("  generated_at: string       - RFC 3339 timestamp");
        println!("  trace: object              - Name, path, event counts, producer metadata");
        println!(
            "  profile: object?           - Simulation profile (rtt_ms, throughput_kbps, ...)"
        );
        println!("  handlers: array            - Handlers that produced data");
        println!("  transfer: object?          - Transfer size distribution");
        println!("  navigations: array         - One entry per main-frame navigation");
        println!("    navigation_id: string");
        println!("    frame_id: string");
        println!("    url: string?             - Document URL");
        println!("    start_ts: number         - Navigation start, trace microseconds");
        println!("    metrics: array           - Lantern estimates (FCP, LCP, TTI, SI)");
        println!("    lantern_error: string?   - Why simulation was unavailable");
        println!("    largest_contentful_paint: object?");
        println!("    render_blocking: object?");
        println!("    viewport: object?");
        println!("    cumulative_layout_shift: object?");
        println!("    third_parties: object?");
        println!("    interaction_to_next_paint: object?");
        println!("    forced_reflow: object?   - Layout forced by script, by top-level call");
        println!("    errors: object?          - Failed insights by name");
    } else {
        println!("Use --show for detailed schema information");
    }
}

/// Display version information
pub fn display_version() {
    println!("Page Trace Studio v{}", env!("CARGO_PKG_VERSION"));
    println!("Report Schema: v{}", SCHEMA_VERSION);
    println!();
    println!("Trace-event analysis and Lantern page-load simulation.");
}
