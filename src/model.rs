use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::util::deserialize_score;

/// One row of a cost estimate table.
///
/// Only `sectionName` and `rowTotalCostUsd` feed the scoring path; the rest
/// are carried so estimates round-trip without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub section_name: String,
    #[serde(default)]
    pub qty: Option<f64>,
    #[serde(default)]
    pub rate_usd: Option<f64>,
    pub row_total_cost_usd: f64,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub uom: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[cfg(test)]
impl LineItem {
    pub fn new(section_name: impl Into<String>, row_total_cost_usd: f64) -> Self {
        Self {
            section_name: section_name.into(),
            qty: None,
            rate_usd: None,
            row_total_cost_usd,
            label: None,
            uom: None,
            category: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroundTruthFile {
    #[serde(default)]
    pub rows: Option<Vec<LineItem>>,
    #[serde(default, rename = "totalCostUsd")]
    pub total_cost_usd: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct GroundTruthRecord {
    pub name: String,
    pub path: PathBuf,
    pub rows: Vec<LineItem>,
    pub declared_total: Option<f64>,
}

impl GroundTruthRecord {
    pub fn total_cost_usd(&self) -> f64 {
        self.declared_total
            .unwrap_or_else(|| self.rows.iter().map(|row| row.row_total_cost_usd).sum())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub valid_file_name: String,
    pub rows: Vec<LineItem>,
    pub time_to_estimate_sec: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ModelOutputFile {
    pub predictions: Vec<Prediction>,
    pub skipped_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalResult {
    pub model_file: String,
    pub metric: String,
    #[serde(deserialize_with = "deserialize_score")]
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionResult {
    pub model_file: String,
    #[serde(rename = "sectionName")]
    pub section_name: String,
    pub metric: String,
    #[serde(deserialize_with = "deserialize_score")]
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroundTruthEntry {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub row_count: usize,
    pub total_cost_usd: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelFileSummary {
    pub model_file: String,
    pub status: String,
    pub predictions_loaded: usize,
    pub predictions_resolved: usize,
    pub entries_skipped: usize,
    pub unresolved_file_names: Vec<String>,
    pub mean_time_to_estimate_sec: Option<f64>,
    pub sections: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportPaths {
    pub global: String,
    pub by_section: String,
    pub manifest: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunCounts {
    pub ground_truths_loaded: usize,
    pub model_files_seen: usize,
    pub model_files_evaluated: usize,
    pub global_rows: usize,
    pub section_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub command: String,
    pub ground_truth_dir: String,
    pub model_outputs_dir: String,
    pub format: String,
    pub metrics: Vec<String>,
    pub asymmetric_alpha: f64,
    pub counts: RunCounts,
    pub ground_truths: Vec<GroundTruthEntry>,
    pub model_files: Vec<ModelFileSummary>,
    pub reports: ReportPaths,
}
