use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde_json::{Value, json};
use tempfile::TempDir;

use super::pipeline::EvaluationPipeline;
use super::run::run;
use crate::cli::{Cli, Commands, EvaluateArgs};
use crate::metrics::Metric;
use crate::notify::EvaluationNotifier;
use crate::notify::testing::{Events, RecordingObserver};

struct Fixture {
    root: TempDir,
    ground_truth_dir: PathBuf,
    model_outputs_dir: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let root = TempDir::new().expect("tempdir");
        let ground_truth_dir = root.path().join("ground_truth");
        let model_outputs_dir = root.path().join("model_outputs");
        fs::create_dir_all(&ground_truth_dir).expect("create ground truth dir");
        fs::create_dir_all(&model_outputs_dir).expect("create model outputs dir");
        Self {
            root,
            ground_truth_dir,
            model_outputs_dir,
        }
    }

    fn root(&self) -> &Path {
        self.root.path()
    }

    fn ground_truth(&self, name: &str, sections: &[(&str, f64)]) {
        write_json(
            &self.ground_truth_dir.join(format!("{name}.json")),
            &json!({ "rows": rows_json(sections) }),
        );
    }

    fn model_output(&self, file: &str, predictions: Vec<Value>) {
        write_json(
            &self.model_outputs_dir.join(file),
            &json!({ "estimate_preds": predictions }),
        );
    }

    fn pipeline(&self, metrics: Vec<Metric>) -> (EvaluationPipeline, Events) {
        let (observer, events) = RecordingObserver::new();
        let mut notifier = EvaluationNotifier::new();
        notifier.add_observer(Box::new(observer));
        let pipeline = EvaluationPipeline::new(
            &self.ground_truth_dir,
            &self.model_outputs_dir,
            metrics,
            notifier,
        )
        .expect("pipeline should initialize");
        (pipeline, events)
    }
}

fn prediction(valid_file_name: &str, sections: &[(&str, f64)]) -> Value {
    json!({
        "valid_file_name": valid_file_name,
        "rows": rows_json(sections),
        "time_to_estimate_sec": 2.0
    })
}

fn rows_json(sections: &[(&str, f64)]) -> Vec<Value> {
    sections
        .iter()
        .map(|(section, total)| json!({ "sectionName": section, "rowTotalCostUsd": total }))
        .collect()
}

fn write_json(path: &Path, value: &Value) {
    fs::write(path, serde_json::to_vec_pretty(value).expect("serialize fixture"))
        .expect("write fixture");
}

fn evaluate_args(argv: &[&str]) -> EvaluateArgs {
    let cli = Cli::try_parse_from(argv).expect("cli should parse");
    match cli.command {
        Commands::Evaluate(args) => args,
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn global_mae_over_two_sections_is_fifty() {
    let fixture = Fixture::new();
    fixture.ground_truth("house", &[("Plumbing", 500.0), ("Electrical", 500.0)]);
    fixture.model_output(
        "gpt.json",
        vec![prediction("house", &[("Plumbing", 500.0), ("Electrical", 400.0)])],
    );

    let (mut pipeline, events) = fixture.pipeline(vec![Metric::Mae]);
    let evaluation = pipeline.process_model_file(&fixture.model_outputs_dir.join("gpt.json"));

    assert!(evaluation.is_evaluated());
    assert_eq!(evaluation.global.len(), 1);
    assert_eq!(evaluation.global[0].model_file, "gpt.json");
    assert_eq!(evaluation.global[0].metric, "MAE");
    assert_eq!(evaluation.global[0].score, 50.0);

    let by_section: Vec<(&str, f64)> = evaluation
        .by_section
        .iter()
        .map(|row| (row.section_name.as_str(), row.score))
        .collect();
    assert_eq!(by_section, vec![("Electrical", 100.0), ("Plumbing", 0.0)]);

    let tags: Vec<String> = events
        .borrow()
        .iter()
        .map(|(model, metric, _)| format!("{model}:{metric}"))
        .collect();
    assert_eq!(
        tags,
        vec![
            "gpt.json:MAE",
            "gpt.json:MAE[Electrical]",
            "gpt.json:MAE[Plumbing]",
        ]
    );
}

#[test]
fn global_rows_for_all_metrics_precede_section_rows() {
    let fixture = Fixture::new();
    fixture.ground_truth("house", &[("Plumbing", 500.0)]);
    fixture.model_output("gpt.json", vec![prediction("house", &[("Plumbing", 400.0)])]);

    let (mut pipeline, events) =
        fixture.pipeline(vec![Metric::Mae, Metric::Asymmetric { alpha: 2.0 }]);
    let evaluation = pipeline.process_model_file(&fixture.model_outputs_dir.join("gpt.json"));

    assert_eq!(evaluation.global[1].metric, "ASYMMETRIC");
    assert_eq!(evaluation.global[1].score, 200.0);

    let metrics: Vec<String> = events
        .borrow()
        .iter()
        .map(|(_, metric, _)| metric.clone())
        .collect();
    assert_eq!(
        metrics,
        vec!["MAE", "ASYMMETRIC", "MAE[Plumbing]", "ASYMMETRIC[Plumbing]"]
    );
}

#[test]
fn unresolved_prediction_is_dropped_without_aborting_the_file() {
    let fixture = Fixture::new();
    fixture.ground_truth("house", &[("Plumbing", 500.0)]);
    fixture.model_output(
        "gpt.json",
        vec![
            prediction("missing_estimate", &[("Roofing", 9000.0)]),
            prediction("house", &[("Plumbing", 450.0)]),
        ],
    );

    let (mut pipeline, _events) = fixture.pipeline(vec![Metric::Mae]);
    let evaluation = pipeline.process_model_file(&fixture.model_outputs_dir.join("gpt.json"));

    assert!(evaluation.is_evaluated());
    assert_eq!(evaluation.summary.predictions_loaded, 2);
    assert_eq!(evaluation.summary.predictions_resolved, 1);
    assert_eq!(
        evaluation.summary.unresolved_file_names,
        vec!["missing_estimate"]
    );
    assert_eq!(evaluation.global[0].score, 50.0);
    assert!(
        evaluation
            .by_section
            .iter()
            .all(|row| row.section_name != "Roofing")
    );
}

#[test]
fn file_without_resolvable_predictions_emits_no_rows() {
    let fixture = Fixture::new();
    fixture.ground_truth("house", &[("Plumbing", 500.0)]);
    fixture.model_output("gpt.json", vec![prediction("other", &[("Plumbing", 450.0)])]);

    let (mut pipeline, events) = fixture.pipeline(vec![Metric::Mae]);
    let evaluation = pipeline.process_model_file(&fixture.model_outputs_dir.join("gpt.json"));

    assert!(!evaluation.is_evaluated());
    assert!(evaluation.global.is_empty());
    assert!(evaluation.by_section.is_empty());
    assert!(events.borrow().is_empty());
}

#[test]
fn duplicate_references_are_pooled_not_deduplicated() {
    let fixture = Fixture::new();
    fixture.ground_truth("house", &[("Plumbing", 500.0)]);
    fixture.model_output(
        "gpt.json",
        vec![
            prediction("house", &[("Plumbing", 400.0)]),
            prediction("house", &[("Plumbing", 700.0)]),
        ],
    );

    let (mut pipeline, _events) = fixture.pipeline(vec![Metric::Mae]);
    let evaluation = pipeline.process_model_file(&fixture.model_outputs_dir.join("gpt.json"));

    // Ground truth 500 + 500 against predictions 400 + 700.
    assert_eq!(evaluation.global[0].score, 100.0);
    assert_eq!(evaluation.summary.predictions_resolved, 2);
}

#[test]
fn zero_ground_truth_sections_are_nan_for_ratio_metrics_per_section() {
    let fixture = Fixture::new();
    fixture.ground_truth("house", &[("Plumbing", 500.0), ("Permits", 0.0)]);
    fixture.model_output(
        "gpt.json",
        vec![prediction("house", &[("Plumbing", 450.0), ("Permits", 20.0)])],
    );

    let (mut pipeline, _events) = fixture.pipeline(vec![Metric::Mre]);
    let evaluation = pipeline.process_model_file(&fixture.model_outputs_dir.join("gpt.json"));

    assert!((evaluation.global[0].score - 0.1).abs() < 1e-9);
    let permits = evaluation
        .by_section
        .iter()
        .find(|row| row.section_name == "Permits")
        .expect("permits row");
    assert!(permits.score.is_nan());
}

#[test]
fn run_skips_invalid_files_and_keeps_file_order() {
    let fixture = Fixture::new();
    fixture.ground_truth("house", &[("Plumbing", 500.0)]);
    fixture.model_output("b_model.json", vec![prediction("house", &[("Plumbing", 400.0)])]);
    fixture.model_output("a_model.json", vec![prediction("house", &[("Plumbing", 550.0)])]);
    write_json(
        &fixture.model_outputs_dir.join("c_not_a_model.json"),
        &json!({ "rows": [] }),
    );
    fs::write(fixture.model_outputs_dir.join("d_broken.json"), "{").expect("write fixture");

    let (mut pipeline, _events) = fixture.pipeline(vec![Metric::Mae]);
    let results = pipeline.run().expect("run should succeed");

    let models: Vec<&str> = results
        .global
        .iter()
        .map(|row| row.model_file.as_str())
        .collect();
    assert_eq!(models, vec!["a_model.json", "b_model.json"]);
    assert_eq!(results.global[0].score, 50.0);
    assert_eq!(results.global[1].score, 100.0);
    assert_eq!(results.model_files.len(), 4);
    assert_eq!(results.evaluated_count(), 2);
}

#[test]
fn missing_ground_truths_are_fatal() {
    let fixture = Fixture::new();
    fs::write(fixture.ground_truth_dir.join("broken.json"), "{").expect("write fixture");
    fixture.model_output("gpt.json", vec![prediction("house", &[("Plumbing", 400.0)])]);

    let result = EvaluationPipeline::new(
        &fixture.ground_truth_dir,
        &fixture.model_outputs_dir,
        vec![Metric::Mae],
        EvaluationNotifier::new(),
    );
    let err = result.err().expect("pipeline should refuse to start");
    assert!(
        err.to_string().contains("no valid ground truth files found"),
        "unexpected error: {err}"
    );
}

#[test]
fn evaluate_command_writes_reports_and_manifest() {
    let fixture = Fixture::new();
    fixture.ground_truth("house", &[("Plumbing", 500.0), ("Electrical", 500.0)]);
    fixture.model_output(
        "gpt.json",
        vec![prediction("house", &[("Plumbing", 500.0), ("Electrical", 400.0)])],
    );
    let output_prefix = fixture.root().join("reports").join("evaluation_report");
    let log_file = fixture.root().join("logs").join("events.log");

    let args = evaluate_args(&[
        "estimate-eval",
        "evaluate",
        "--config",
        fixture.root().join("absent.yaml").to_str().expect("utf8"),
        "--ground-truth-dir",
        fixture.ground_truth_dir.to_str().expect("utf8"),
        "--model-outputs-dir",
        fixture.model_outputs_dir.to_str().expect("utf8"),
        "--output-path",
        output_prefix.to_str().expect("utf8"),
        "--log-file",
        log_file.to_str().expect("utf8"),
        "--format",
        "json",
        "--metric",
        "mae",
        "--metric",
        "bogus",
        "--quiet",
    ]);
    run(args).expect("evaluate should succeed");

    let reports = fixture.root().join("reports");
    let global: Value = serde_json::from_slice(
        &fs::read(reports.join("evaluation_report_global.json")).expect("global report"),
    )
    .expect("parse global report");
    assert_eq!(
        global,
        json!([{ "model_file": "gpt.json", "metric": "MAE", "score": 50.0 }])
    );

    let by_section: Value = serde_json::from_slice(
        &fs::read(reports.join("evaluation_report_by_section.json")).expect("section report"),
    )
    .expect("parse section report");
    assert_eq!(by_section.as_array().expect("array").len(), 2);

    let manifest: Value = serde_json::from_slice(
        &fs::read(reports.join("evaluation_report_run.json")).expect("manifest"),
    )
    .expect("parse manifest");
    assert_eq!(manifest["metrics"], json!(["MAE"]));
    assert_eq!(manifest["counts"]["model_files_evaluated"], 1);
    assert_eq!(manifest["ground_truths"][0]["name"], "house");
    assert_eq!(manifest["ground_truths"][0]["total_cost_usd"], 1000.0);
    assert_eq!(
        manifest["ground_truths"][0]["sha256"]
            .as_str()
            .expect("sha")
            .len(),
        64
    );

    let log = fs::read_to_string(&log_file).expect("event log");
    assert_eq!(
        log.lines().next(),
        Some("Model: gpt.json | Metric: MAE | Score: 50.0000")
    );
}

#[test]
fn unsupported_report_format_fails_before_loading_inputs() {
    let root = TempDir::new().expect("tempdir");
    let args = evaluate_args(&[
        "estimate-eval",
        "evaluate",
        "--config",
        root.path().join("absent.yaml").to_str().expect("utf8"),
        "--ground-truth-dir",
        root.path().join("does_not_exist").to_str().expect("utf8"),
        "--format",
        "xlsx",
        "--quiet",
    ]);

    let err = run(args).expect_err("xlsx is unsupported");
    assert_eq!(err.to_string(), "unsupported report format: xlsx");
}
