//! CSV export of query results.
//!
//! A side effect outside the lifecycle state machine: the current result is
//! written to a timestamped file on explicit user action.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;

use crate::session::TabularResult;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Write the result to `<dir>/results_YYYYMMDD_HHMMSS.csv` and return the
/// path.
pub fn write_csv(result: &TabularResult, dir: &Path) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(dir)?;
    let filename = format!("results_{}.csv", Local::now().format("%Y%m%d_%H%M%S"));
    let path = dir.join(filename);

    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(result.columns())?;
    for row in result.rows() {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(path)
}
