use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, Timelike};
use serde_json::Value;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Writes the final run document to `loadsmith_results_YYYYMMDD_HHMMSS.json`
/// under `dir` and returns the path.
///
/// # Errors
///
/// Returns the underlying I/O error; the caller reports it as a runtime
/// error rather than failing the run.
pub async fn write_report(document: &Value, dir: &Path) -> Result<PathBuf, std::io::Error> {
    let path = dir.join(report_file_name());
    let file = tokio::fs::File::create(&path).await?;
    let mut writer = BufWriter::new(file);
    let json = serde_json::to_vec_pretty(document).map_err(std::io::Error::other)?;
    writer.write_all(&json).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(path)
}

fn report_file_name() -> String {
    let now = Local::now();
    format!(
        "loadsmith_results_{:04}{:02}{:02}_{:02}{:02}{:02}.json",
        now.year(),
        now.month(),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}
