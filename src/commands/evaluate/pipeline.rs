use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use tracing::{info, info_span, warn};

use crate::aggregate::{
    align_sections, evaluate_by_section, evaluate_by_section_per_section, section_totals,
};
use crate::loader::{LoadError, list_files, load_all_ground_truths, load_model_output};
use crate::metrics::Metric;
use crate::model::{
    GlobalResult, GroundTruthRecord, ModelFileSummary, Prediction, SectionResult,
};
use crate::notify::EvaluationNotifier;
use crate::util::file_name_string;

pub const STATUS_EVALUATED: &str = "evaluated";
pub const STATUS_SKIPPED: &str = "skipped";

#[derive(Debug, Clone)]
pub struct ModelFileEvaluation {
    pub global: Vec<GlobalResult>,
    pub by_section: Vec<SectionResult>,
    pub summary: ModelFileSummary,
}

impl ModelFileEvaluation {
    pub fn is_evaluated(&self) -> bool {
        self.summary.status == STATUS_EVALUATED
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunResults {
    pub global: Vec<GlobalResult>,
    pub by_section: Vec<SectionResult>,
    pub model_files: Vec<ModelFileSummary>,
}

impl RunResults {
    pub fn evaluated_count(&self) -> usize {
        self.model_files
            .iter()
            .filter(|summary| summary.status == STATUS_EVALUATED)
            .count()
    }
}

/// Scores every model-output file in a directory against a fixed set of
/// ground truths loaded up front.
pub struct EvaluationPipeline {
    ground_truths: BTreeMap<String, GroundTruthRecord>,
    model_outputs_dir: PathBuf,
    metrics: Vec<Metric>,
    notifier: EvaluationNotifier,
}

impl EvaluationPipeline {
    pub fn new(
        ground_truth_dir: &Path,
        model_outputs_dir: &Path,
        metrics: Vec<Metric>,
        notifier: EvaluationNotifier,
    ) -> Result<Self> {
        info!(dir = %ground_truth_dir.display(), "loading ground truths");
        let ground_truths = load_all_ground_truths(ground_truth_dir)?;
        if ground_truths.is_empty() {
            bail!(
                "no valid ground truth files found in {}",
                ground_truth_dir.display()
            );
        }

        for (name, record) in &ground_truths {
            info!(
                ground_truth = %name,
                rows = record.rows.len(),
                total_cost_usd = record.total_cost_usd(),
                "ground truth loaded"
            );
        }

        Ok(Self {
            ground_truths,
            model_outputs_dir: model_outputs_dir.to_path_buf(),
            metrics,
            notifier,
        })
    }

    pub fn ground_truths(&self) -> &BTreeMap<String, GroundTruthRecord> {
        &self.ground_truths
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn run(&mut self) -> Result<RunResults> {
        let model_files = list_files(&self.model_outputs_dir)?;
        info!(
            dir = %self.model_outputs_dir.display(),
            files = model_files.len(),
            metrics = self.metrics.len(),
            "evaluating model outputs"
        );

        let mut results = RunResults::default();
        for path in model_files {
            let evaluation = self.process_model_file(&path);
            if !evaluation.is_evaluated() {
                info!(path = %path.display(), "model output skipped");
            }
            results.global.extend(evaluation.global);
            results.by_section.extend(evaluation.by_section);
            results.model_files.push(evaluation.summary);
        }

        info!(
            evaluated = results.evaluated_count(),
            global_rows = results.global.len(),
            section_rows = results.by_section.len(),
            "evaluation completed"
        );
        Ok(results)
    }

    /// Load, resolve and score one model-output file. Files that cannot be
    /// scored come back with status `skipped` and no result rows.
    pub fn process_model_file(&mut self, path: &Path) -> ModelFileEvaluation {
        let model_file = file_name_string(path).unwrap_or_else(|| path.display().to_string());
        let _span = info_span!("model_file", file = %model_file).entered();
        info!(path = %path.display(), "processing model output");

        let mut summary = ModelFileSummary {
            model_file: model_file.clone(),
            status: STATUS_SKIPPED.to_string(),
            predictions_loaded: 0,
            predictions_resolved: 0,
            entries_skipped: 0,
            unresolved_file_names: Vec::new(),
            mean_time_to_estimate_sec: None,
            sections: 0,
        };

        let output = match load_model_output(path) {
            Ok(output) => output,
            Err(err @ LoadError::MissingPredictions { .. }) => {
                warn!(error = %err, "skipping file that is not a model output");
                return skipped(summary);
            }
            Err(err) => {
                warn!(error = %err, "failed to load model output");
                return skipped(summary);
            }
        };

        summary.predictions_loaded = output.predictions.len();
        summary.entries_skipped = output.skipped_entries;
        summary.mean_time_to_estimate_sec = mean_time_to_estimate(&output.predictions);

        let mut pairs: Vec<(&GroundTruthRecord, &Prediction)> = Vec::new();
        for prediction in &output.predictions {
            match self.ground_truths.get(&prediction.valid_file_name) {
                Some(ground_truth) => pairs.push((ground_truth, prediction)),
                None => {
                    warn!(
                        valid_file_name = %prediction.valid_file_name,
                        "ground truth not found for prediction"
                    );
                    summary
                        .unresolved_file_names
                        .push(prediction.valid_file_name.clone());
                }
            }
        }
        summary.predictions_resolved = pairs.len();

        if pairs.is_empty() {
            warn!("insufficient data for evaluation");
            return skipped(summary);
        }

        // Duplicated references are pooled as-is, inflating their sections.
        let ground_truth_rows = || pairs.iter().flat_map(|(truth, _)| truth.rows.iter());
        let prediction_rows = || pairs.iter().flat_map(|(_, prediction)| prediction.rows.iter());

        summary.sections = align_sections(
            &section_totals(ground_truth_rows()),
            &section_totals(prediction_rows()),
        )
        .sections
        .len();

        let mut global = Vec::with_capacity(self.metrics.len());
        for metric in &self.metrics {
            let score = evaluate_by_section(metric, ground_truth_rows(), prediction_rows());
            self.notifier.notify(&model_file, metric.name(), score);
            global.push(GlobalResult {
                model_file: model_file.clone(),
                metric: metric.name().to_string(),
                score,
            });
        }

        let mut by_section = Vec::new();
        for metric in &self.metrics {
            let scores =
                evaluate_by_section_per_section(metric, ground_truth_rows(), prediction_rows());
            for (section, score) in scores {
                self.notifier
                    .notify(&model_file, &section_tag(metric, &section), score);
                by_section.push(SectionResult {
                    model_file: model_file.clone(),
                    section_name: section,
                    metric: metric.name().to_string(),
                    score,
                });
            }
        }

        summary.status = STATUS_EVALUATED.to_string();
        info!(
            resolved = summary.predictions_resolved,
            sections = summary.sections,
            "model output scored"
        );

        ModelFileEvaluation {
            global,
            by_section,
            summary,
        }
    }
}

pub fn section_tag(metric: &Metric, section: &str) -> String {
    format!("{}[{}]", metric.name(), section)
}

fn skipped(summary: ModelFileSummary) -> ModelFileEvaluation {
    ModelFileEvaluation {
        global: Vec::new(),
        by_section: Vec::new(),
        summary,
    }
}

fn mean_time_to_estimate(predictions: &[Prediction]) -> Option<f64> {
    if predictions.is_empty() {
        return None;
    }
    let total: f64 = predictions
        .iter()
        .map(|prediction| prediction.time_to_estimate_sec)
        .sum();
    Some(total / predictions.len() as f64)
}
