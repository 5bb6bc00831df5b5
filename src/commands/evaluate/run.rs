use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use super::pipeline::EvaluationPipeline;
use crate::cli::EvaluateArgs;
use crate::config::{EvalSettings, load_file_config};
use crate::metrics::resolve_metrics;
use crate::model::{EvaluationRunManifest, GroundTruthEntry, ReportPaths, RunCounts};
use crate::notify::{ConsoleLogger, EvaluationNotifier, FileLogger};
use crate::report::{ReportFormat, report_paths, write_report};
use crate::util::{now_utc_string, sha256_file, utc_compact_string, write_json_pretty};

const MANIFEST_VERSION: u32 = 1;

pub fn run(args: EvaluateArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("eval-{}", utc_compact_string(started_ts));

    let file_config = load_file_config(&args.config)?;
    let settings = EvalSettings::resolve(file_config, &args);
    let format: ReportFormat = settings.format.parse()?;

    info!(run_id = %run_id, format = %format, "starting evaluation");

    let metrics = resolve_metrics(&settings.metrics, settings.asymmetric_alpha);
    if metrics.is_empty() {
        warn!("no supported metrics enabled; reports will contain no rows");
    }

    let notifier = build_notifier(&settings, args.quiet)?;
    let mut pipeline = EvaluationPipeline::new(
        &settings.ground_truth_dir,
        &settings.model_outputs_dir,
        metrics,
        notifier,
    )?;
    let results = pipeline.run()?;

    let targets = report_paths(&settings.output_path, format);
    write_report(&results.global, &targets.global, format)?;
    write_report(&results.by_section, &targets.by_section, format)?;

    let mut ground_truths = Vec::with_capacity(pipeline.ground_truths().len());
    for (name, record) in pipeline.ground_truths() {
        ground_truths.push(GroundTruthEntry {
            name: name.clone(),
            path: record.path.display().to_string(),
            sha256: sha256_file(&record.path)?,
            row_count: record.rows.len(),
            total_cost_usd: record.total_cost_usd(),
        });
    }

    let manifest = EvaluationRunManifest {
        manifest_version: MANIFEST_VERSION,
        run_id,
        started_at,
        finished_at: now_utc_string(),
        command: std::env::args().collect::<Vec<_>>().join(" "),
        ground_truth_dir: settings.ground_truth_dir.display().to_string(),
        model_outputs_dir: settings.model_outputs_dir.display().to_string(),
        format: format.to_string(),
        metrics: pipeline
            .metrics()
            .iter()
            .map(|metric| metric.name().to_string())
            .collect(),
        asymmetric_alpha: settings.asymmetric_alpha,
        counts: RunCounts {
            ground_truths_loaded: ground_truths.len(),
            model_files_seen: results.model_files.len(),
            model_files_evaluated: results.evaluated_count(),
            global_rows: results.global.len(),
            section_rows: results.by_section.len(),
        },
        ground_truths,
        model_files: results.model_files,
        reports: ReportPaths {
            global: targets.global.display().to_string(),
            by_section: targets.by_section.display().to_string(),
            manifest: targets.manifest.display().to_string(),
        },
    };

    write_json_pretty(&targets.manifest, &manifest)?;
    info!(path = %targets.manifest.display(), "wrote evaluation run manifest");
    info!(
        global = %targets.global.display(),
        by_section = %targets.by_section.display(),
        "reports exported"
    );

    Ok(())
}

fn build_notifier(settings: &EvalSettings, quiet: bool) -> Result<EvaluationNotifier> {
    let mut notifier = EvaluationNotifier::new();
    if !quiet {
        notifier.add_observer(Box::new(ConsoleLogger::stdout()));
    }
    if let Some(log_file) = &settings.log_file {
        let logger = FileLogger::new(log_file.clone())?;
        info!(path = %logger.path().display(), "appending evaluation events to log file");
        notifier.add_observer(Box::new(logger));
    }
    if notifier.is_empty() {
        info!("no evaluation observers registered");
    } else {
        debug!(observers = notifier.len(), "evaluation observers registered");
    }
    Ok(notifier)
}
