use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::models::TrendReport;

/// `{output_dir}/{app_id}/trend_report_{target_date}.csv`
pub fn report_path<P: AsRef<Path>>(output_dir: P, report: &TrendReport) -> PathBuf {
    output_dir
        .as_ref()
        .join(&report.app_id)
        .join(format!("trend_report_{}.csv", report.target_date.format("%Y-%m-%d")))
}

/// Writes the CSV through a temp file in the same directory and renames it
/// into place.
pub fn write_report<P: AsRef<Path>>(output_dir: P, report: &TrendReport) -> Result<PathBuf> {
    let path = report_path(output_dir, report);
    write_atomically(&path, report.to_csv().as_bytes())?;

    tracing::info!("Report written to {}", path.display());
    Ok(path)
}

pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Config(format!("Invalid output path {}", path.display())))?;
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
