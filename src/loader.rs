use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::model::{GroundTruthFile, GroundTruthRecord, ModelOutputFile, Prediction};
use crate::util::file_stem_string;

const PREDICTIONS_KEY: &str = "estimate_preds";
const REQUIRED_PREDICTION_KEYS: [&str; 3] = ["valid_file_name", "rows", "time_to_estimate_sec"];

/// Failures that only disqualify the file being loaded, never the run.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid ground truth {}: 'rows' key missing", path.display())]
    MissingRows { path: PathBuf },

    #[error("not a valid model output file {}: 'estimate_preds' key missing", path.display())]
    MissingPredictions { path: PathBuf },
}

fn read_json(path: &Path) -> Result<Value, LoadError> {
    let raw = fs::read(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_ground_truth_file(path: &Path) -> Result<GroundTruthRecord, LoadError> {
    let value = read_json(path)?;
    let file: GroundTruthFile =
        serde_json::from_value(value).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let rows = file.rows.ok_or_else(|| LoadError::MissingRows {
        path: path.to_path_buf(),
    })?;

    Ok(GroundTruthRecord {
        name: file_stem_string(path).unwrap_or_default(),
        path: path.to_path_buf(),
        rows,
        declared_total: file.total_cost_usd,
    })
}

/// Loads every `*.json` file in `dir`, keyed by file stem. Files that cannot
/// be loaded are skipped with a warning.
pub fn load_all_ground_truths(dir: &Path) -> Result<BTreeMap<String, GroundTruthRecord>> {
    let mut paths = list_files(dir)?;
    paths.retain(|path| {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false)
    });

    let mut ground_truths = BTreeMap::new();
    for path in paths {
        match load_ground_truth_file(&path) {
            Ok(record) => {
                ground_truths.insert(record.name.clone(), record);
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping ground truth file");
            }
        }
    }

    Ok(ground_truths)
}

pub fn load_model_output(path: &Path) -> Result<ModelOutputFile, LoadError> {
    let value = read_json(path)?;
    let Some(entries) = value.get(PREDICTIONS_KEY).and_then(Value::as_array) else {
        return Err(LoadError::MissingPredictions {
            path: path.to_path_buf(),
        });
    };

    let mut output = ModelOutputFile::default();
    for (index, entry) in entries.iter().enumerate() {
        let missing: Vec<&str> = REQUIRED_PREDICTION_KEYS
            .iter()
            .copied()
            .filter(|key| entry.get(key).is_none())
            .collect();
        if !missing.is_empty() {
            warn!(
                path = %path.display(),
                index,
                missing = ?missing,
                "skipping prediction with missing keys"
            );
            output.skipped_entries += 1;
            continue;
        }

        match Prediction::deserialize(entry) {
            Ok(prediction) => output.predictions.push(prediction),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    index,
                    error = %err,
                    "skipping malformed prediction"
                );
                output.skipped_entries += 1;
            }
        }
    }

    info!(
        path = %path.display(),
        predictions = output.predictions.len(),
        skipped = output.skipped_entries,
        "loaded model output"
    );

    Ok(output)
}

/// Regular files directly inside `dir`, sorted by path.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }
        files.push(path);
    }

    files.sort();
    Ok(files)
}
