//! Ingestion of text logs already exported to disk.
//!
//! Exported logs are named `YYYYMMDD_HHMM_<unit>_...`; the unit name is
//! taken from the file name.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use eas_ingest_models::TestCollection;
use eas_ingest_parser::LogParser;
use regex::Regex;

static EXPORT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{8}_\d{4}_([^_]+)_").expect("valid regex"));

/// Errors reading exported logs.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// A file or directory could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Unit name embedded in an exported log's file name, if the name follows
/// the export pattern.
#[must_use]
pub fn unit_name_from_file_name(file_name: &str) -> Option<&str> {
    EXPORT_NAME_RE
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Parses one exported log.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected; the
/// records around them are still recovered.
///
/// # Errors
///
/// Returns [`IngestError::Io`] if the file cannot be read.
pub fn ingest_log_file(path: &Path) -> Result<TestCollection, IngestError> {
    let bytes = std::fs::read(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let content = String::from_utf8_lossy(&bytes);
    if let std::borrow::Cow::Owned(_) = content {
        log::warn!("{} is not valid UTF-8; invalid bytes replaced", path.display());
    }

    let unit = path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(unit_name_from_file_name);

    let parser = match unit {
        Some(unit) => LogParser::new().with_unit_name(unit),
        None => {
            log::debug!("No unit name in {}", path.display());
            LogParser::new()
        }
    };
    Ok(parser.parse(&content))
}

/// Parses every exported log in `dir`, in file-name order.
///
/// Subdirectories are ignored. A file that cannot be read is logged and
/// skipped; the other files are still returned.
///
/// # Errors
///
/// Returns [`IngestError::Io`] if the directory cannot be listed.
pub fn ingest_log_dir(dir: &Path) -> Result<Vec<TestCollection>, IngestError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| IngestError::Io { path, source }
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err(dir))? {
        let entry = entry.map_err(io_err(dir))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    log::info!("Parsing {} exported logs from {}", files.len(), dir.display());

    Ok(files
        .iter()
        .filter_map(|path| match ingest_log_file(path) {
            Ok(tests) => {
                log::info!(
                    "{}: {} records",
                    tests.unit_name.as_deref().unwrap_or("unknown unit"),
                    tests.total()
                );
                Some(tests)
            }
            Err(err) => {
                log::warn!("Skipping {err}");
                None
            }
        })
        .collect())
}
