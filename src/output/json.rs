//! JSON report writer.
//!
//! Writes analysis reports to JSON files and reads them back for validation.

use super::report::{AnalysisReport, ReportDigest};
use crate::utils::error::OutputError;
use log::{debug, info};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Write a report to a JSON file
///
/// **Public** - main entry point for JSON output
///
/// # Arguments
/// * `report` - Report to write
/// * `output_path` - Path to output JSON file
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::SerializationFailed` - JSON serialization error
/// * `OutputError::InvalidPath` - Path cannot be created or is invalid
pub fn write_report(
    report: &AnalysisReport,
    output_path: impl AsRef<Path>,
) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    info!("Writing report to: {}", output_path.display());

    validate_output_path(output_path)?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::InvalidPath(format!(
                    "Cannot create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let file = File::create(output_path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, report)?;

    info!(
        "Report written successfully ({} bytes)",
        calculate_file_size(output_path)
    );

    Ok(())
}

/// Serialize a report to a pretty JSON string
pub fn report_to_string(report: &AnalysisReport) -> Result<String, OutputError> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// **Private** - reject empty and directory paths
fn validate_output_path(path: &Path) -> Result<(), OutputError> {
    if path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("Path is empty".to_string()));
    }

    if path.is_dir() {
        return Err(OutputError::InvalidPath(format!(
            "Path is a directory: {}",
            path.display()
        )));
    }

    Ok(())
}

fn calculate_file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Read a report back from a JSON file
///
/// **Public** - used by the validate command
///
/// # Errors
/// * `OutputError::WriteFailed` - File read error (reusing WriteFailed for I/O)
/// * `OutputError::SerializationFailed` - Not a report
pub fn read_report(input_path: impl AsRef<Path>) -> Result<ReportDigest, OutputError> {
    let input_path = input_path.as_ref();

    debug!("Reading report from: {}", input_path.display());

    let file = File::open(input_path)?;
    let digest: ReportDigest = serde_json::from_reader(BufReader::new(file))?;

    debug!(
        "Report loaded: schema {}, {} navigation(s)",
        digest.schema_version,
        digest.navigations.len()
    );

    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::ParsedTraceData;
    use crate::insights::NavigationInsights;
    use crate::output::report::TraceSummary;
    use crate::types::MicroSeconds;
    use tempfile::NamedTempFile;

    fn create_test_report() -> AnalysisReport {
        let navigation = NavigationInsights {
            navigation_id: "nav-1".to_string(),
            frame_id: "FRAME".to_string(),
            url: Some("https://example.test/".to_string()),
            start_ts: MicroSeconds(1_000),
            ..NavigationInsights::default()
        };
        AnalysisReport::new(
            TraceSummary {
                name: "example.test (1)".to_string(),
                event_count: 42,
                ..TraceSummary::default()
            },
            &ParsedTraceData::default(),
            None,
            vec![navigation],
        )
    }

    #[test]
    fn test_write_and_read_report() {
        let report = create_test_report();
        let temp_file = NamedTempFile::new().unwrap();

        write_report(&report, temp_file.path()).unwrap();
        let loaded = read_report(temp_file.path()).unwrap();

        assert_eq!(loaded.schema_version, report.schema_version);
        assert_eq!(loaded.trace, report.trace);
        assert_eq!(loaded.navigations.len(), 1);
        assert_eq!(loaded.navigations[0].navigation_id, "nav-1");
        assert_eq!(loaded.navigations[0].url.as_deref(), Some("https://example.test/"));
        assert!(loaded.is_compatible());
    }

    #[test]
    fn test_validate_output_path_empty() {
        assert!(validate_output_path(Path::new("")).is_err());
    }

    #[test]
    fn test_validate_output_path_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(validate_output_path(temp_dir.path()).is_err());
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested_path = temp_dir.path().join("nested/dirs/report.json");

        write_report(&create_test_report(), &nested_path).unwrap();

        assert!(nested_path.exists());
    }

    #[test]
    fn test_read_rejects_non_report() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), r#"{"version": "1.0.0"}"#).unwrap();
        assert!(matches!(
            read_report(temp_file.path()),
            Err(OutputError::SerializationFailed(_))
        ));
    }
}
