use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::cli::EvaluateArgs;
use crate::metrics::{DEFAULT_ASYMMETRIC_ALPHA, DEFAULT_METRICS};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub ground_truth_dir: Option<PathBuf>,
    pub model_outputs_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub evaluation: EvaluationSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EvaluationSection {
    pub metrics: Option<Vec<String>>,
    pub format: Option<String>,
    pub output_path: Option<PathBuf>,
    pub asymmetric_alpha: Option<f64>,
}

/// Fully resolved run settings: command-line flags over the config file over
/// built-in defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalSettings {
    pub ground_truth_dir: PathBuf,
    pub model_outputs_dir: PathBuf,
    pub log_file: Option<PathBuf>,
    pub metrics: Vec<String>,
    pub format: String,
    pub output_path: PathBuf,
    pub asymmetric_alpha: f64,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            ground_truth_dir: PathBuf::from("data/ground_truth"),
            model_outputs_dir: PathBuf::from("data/model_outputs"),
            log_file: None,
            metrics: DEFAULT_METRICS.iter().map(|name| name.to_string()).collect(),
            format: "csv".to_string(),
            output_path: PathBuf::from("reports/evaluation_report"),
            asymmetric_alpha: DEFAULT_ASYMMETRIC_ALPHA,
        }
    }
}

/// A missing config file means defaults; a config file that does not parse is
/// an error.
pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        info!(path = %path.display(), "configuration file not found; using defaults");
        return Ok(FileConfig::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: FileConfig = if raw.trim().is_empty() {
        FileConfig::default()
    } else {
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?
    };

    info!(path = %path.display(), "configuration loaded");
    Ok(config)
}

impl EvalSettings {
    pub fn resolve(file: FileConfig, args: &EvaluateArgs) -> Self {
        let defaults = Self::default();
        let evaluation = file.evaluation;

        let metrics = if !args.metrics.is_empty() {
            args.metrics.clone()
        } else {
            evaluation.metrics.unwrap_or(defaults.metrics)
        };

        Self {
            ground_truth_dir: args
                .ground_truth_dir
                .clone()
                .or(file.ground_truth_dir)
                .unwrap_or(defaults.ground_truth_dir),
            model_outputs_dir: args
                .model_outputs_dir
                .clone()
                .or(file.model_outputs_dir)
                .unwrap_or(defaults.model_outputs_dir),
            log_file: args.log_file.clone().or(file.log_file),
            metrics,
            format: args
                .format
                .clone()
                .or(evaluation.format)
                .unwrap_or(defaults.format),
            output_path: args
                .output_path
                .clone()
                .or(evaluation.output_path)
                .unwrap_or(defaults.output_path),
            asymmetric_alpha: args
                .alpha
                .or(evaluation.asymmetric_alpha)
                .unwrap_or(defaults.asymmetric_alpha),
        }
    }
}
