//! JSON report writer and reader.
//!
//! Writes any serializable report to a pretty-printed JSON file and reads it
//! back.

use crate::utils::error::OutputError;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
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
pub fn write_report<T: Serialize>(report: &T, output_path: impl AsRef<Path>) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    info!("Writing report to: {}", output_path.display());

    validate_output_path(output_path)?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::InvalidPath(format!("Cannot create directory {}: {}", parent.display(), e))
            })?;
        }
    }

    let file = File::create(output_path).map_err(OutputError::WriteFailed)?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, report).map_err(OutputError::SerializationFailed)?;

    info!("Report written ({} bytes)", file_size(output_path));

    Ok(())
}

/// Read a report from a JSON file
///
/// **Public** - used by validate and summary
///
/// # Errors
/// * `OutputError::WriteFailed` - File read error (reusing WriteFailed for I/O)
/// * `OutputError::SerializationFailed` - JSON parse error
pub fn read_report<T: DeserializeOwned>(input_path: impl AsRef<Path>) -> Result<T, OutputError> {
    let input_path = input_path.as_ref();

    debug!("Reading report from: {}", input_path.display());

    let file = File::open(input_path).map_err(OutputError::WriteFailed)?;
    let report = serde_json::from_reader(BufReader::new(file)).map_err(OutputError::SerializationFailed)?;

    Ok(report)
}

/// Validate that output path is writable
///
/// **Private** - internal validation
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

/// **Private** - size in bytes, 0 if unknown
fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::schema::RunReport;
    use std::collections::BTreeMap;
    use tempfile::NamedTempFile;

    fn create_test_report() -> RunReport {
        let mut timing = BTreeMap::new();
        timing.insert("broadcast_0".to_string(), 1.25);
        RunReport::new("run-a", vec!["worker0".to_string()], timing)
    }

    #[test]
    fn test_write_and_read_report() {
        let report = create_test_report();
        let temp_file = NamedTempFile::new().unwrap();

        write_report(&report, temp_file.path()).unwrap();
        let loaded: RunReport = read_report(temp_file.path()).unwrap();

        assert_eq!(loaded, report);
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
    fn test_read_wrong_shape() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "{\"unrelated\": true}").unwrap();
        let result: Result<RunReport, _> = read_report(temp_file.path());
        assert!(matches!(result, Err(OutputError::SerializationFailed(_))));
    }
}
