use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::util::{ensure_parent_directory, write_json_pretty};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReportFormat {
    Csv,
    Json,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    /// Picks the format from a report file's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .with_context(|| format!("report path has no extension: {}", path.display()))?;
        ext.parse()
    }
}

impl FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => bail!("unsupported report format: {other}"),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

pub struct ReportTargets {
    pub global: PathBuf,
    pub by_section: PathBuf,
    pub manifest: PathBuf,
}

/// Derives the report file names from an output prefix. Any extension on the
/// prefix is dropped so `reports/run.csv` and `reports/run` are equivalent.
pub fn report_paths(output_path: &Path, format: ReportFormat) -> ReportTargets {
    let base = output_path.with_extension("");
    let stem = base
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "evaluation_report".to_string());
    let sibling = |suffix: &str| base.with_file_name(format!("{stem}_{suffix}"));

    ReportTargets {
        global: sibling(&format!("global.{}", format.extension())),
        by_section: sibling(&format!("by_section.{}", format.extension())),
        manifest: sibling("run.json"),
    }
}

pub fn write_report<T: Serialize>(rows: &[T], path: &Path, format: ReportFormat) -> Result<()> {
    match format {
        ReportFormat::Csv => write_csv(rows, path)?,
        ReportFormat::Json => write_json_pretty(path, rows)?,
    }

    info!(path = %path.display(), rows = rows.len(), format = %format, "report saved");
    Ok(())
}

fn write_csv<T: Serialize>(rows: &[T], path: &Path) -> Result<()> {
    ensure_parent_directory(path)?;

    let file = File::create(path)
        .with_context(|| format!("failed to create csv file: {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("failed to write csv row: {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush csv file: {}", path.display()))?;

    Ok(())
}

pub fn read_report<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    match ReportFormat::from_path(path)? {
        ReportFormat::Json => {
            let raw =
                fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_slice(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))
        }
        ReportFormat::Csv => {
            let mut reader = csv::Reader::from_path(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            let mut rows = Vec::new();
            for record in reader.deserialize::<T>() {
                rows.push(
                    record.with_context(|| format!("failed to parse row in {}", path.display()))?,
                );
            }
            Ok(rows)
        }
    }
}
