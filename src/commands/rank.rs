use std::collections::BTreeMap;
use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::cli::RankArgs;
use crate::model::{GlobalResult, SectionResult};
use crate::report::read_report;

#[derive(Debug, Clone, PartialEq, Serialize)]
struct SectionLeader {
    metric: String,
    section_name: String,
    best_model: String,
    score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ModelStanding {
    metric: String,
    rank: usize,
    model_file: String,
    score: f64,
}

#[derive(Debug, Serialize)]
struct RankResponse {
    metrics: Vec<String>,
    section_leaders: Vec<SectionLeader>,
    global_standings: Vec<ModelStanding>,
}

pub fn run(args: RankArgs) -> Result<()> {
    let section_rows: Vec<SectionResult> = read_report(&args.by_section_report)?;
    let global_rows: Vec<GlobalResult> = match &args.global_report {
        Some(path) => read_report(path)?,
        None => Vec::new(),
    };
    info!(
        section_rows = section_rows.len(),
        global_rows = global_rows.len(),
        "loaded evaluation reports"
    );

    let metric_filter: Vec<String> = args
        .metrics
        .iter()
        .map(|metric| metric.trim().to_ascii_uppercase())
        .collect();
    let section_leaders = best_model_by_section(&section_rows, &metric_filter);
    let global_standings = rank_models(&global_rows, &metric_filter);

    let mut metrics: Vec<String> = section_leaders
        .iter()
        .map(|leader| leader.metric.clone())
        .chain(global_standings.iter().map(|standing| standing.metric.clone()))
        .collect();
    metrics.sort();
    metrics.dedup();

    let response = RankResponse {
        metrics,
        section_leaders,
        global_standings,
    };

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.json {
        serde_json::to_writer_pretty(&mut output, &response)
            .context("failed to serialize rank json output")?;
        writeln!(output)?;
    } else {
        write_text_response(&mut output, &response)?;
    }
    output.flush()?;
    Ok(())
}

fn metric_selected(metric: &str, filter: &[String]) -> bool {
    filter.is_empty() || filter.iter().any(|selected| selected.eq_ignore_ascii_case(metric))
}

/// Lowest defined score per (metric, section). Ties keep the model that
/// appears first in the report; sections where every score is NaN have no
/// leader.
fn best_model_by_section(rows: &[SectionResult], filter: &[String]) -> Vec<SectionLeader> {
    let mut leaders = BTreeMap::<(String, String), SectionLeader>::new();

    for row in rows {
        if !metric_selected(&row.metric, filter) {
            continue;
        }
        if row.score.is_nan() {
            debug!(
                model = %row.model_file,
                section = %row.section_name,
                metric = %row.metric,
                "ignoring undefined score"
            );
            continue;
        }

        let key = (row.metric.clone(), row.section_name.clone());
        let replace = leaders
            .get(&key)
            .map(|leader| row.score < leader.score)
            .unwrap_or(true);
        if replace {
            leaders.insert(
                key,
                SectionLeader {
                    metric: row.metric.clone(),
                    section_name: row.section_name.clone(),
                    best_model: row.model_file.clone(),
                    score: row.score,
                },
            );
        }
    }

    leaders.into_values().collect()
}

fn rank_models(rows: &[GlobalResult], filter: &[String]) -> Vec<ModelStanding> {
    let mut by_metric = BTreeMap::<&str, Vec<&GlobalResult>>::new();
    for row in rows {
        if metric_selected(&row.metric, filter) && !row.score.is_nan() {
            by_metric.entry(row.metric.as_str()).or_default().push(row);
        }
    }

    let mut standings = Vec::new();
    for (metric, mut rows) in by_metric {
        rows.sort_by(|a, b| {
            a.score
                .total_cmp(&b.score)
                .then_with(|| a.model_file.cmp(&b.model_file))
        });
        for (index, row) in rows.into_iter().enumerate() {
            standings.push(ModelStanding {
                metric: metric.to_string(),
                rank: index + 1,
                model_file: row.model_file.clone(),
                score: row.score,
            });
        }
    }
    standings
}

fn write_text_response<W: Write>(output: &mut W, response: &RankResponse) -> Result<()> {
    if response.metrics.is_empty() {
        writeln!(output, "No defined scores found.")?;
        return Ok(());
    }

    for metric in &response.metrics {
        writeln!(output, "Metric: {metric}")?;

        let standings: Vec<&ModelStanding> = response
            .global_standings
            .iter()
            .filter(|standing| &standing.metric == metric)
            .collect();
        if !standings.is_empty() {
            writeln!(output, "  Global:")?;
            for standing in standings {
                writeln!(
                    output,
                    "    {}.\t{}\t{:.4}",
                    standing.rank, standing.model_file, standing.score
                )?;
            }
        }

        let leaders: Vec<&SectionLeader> = response
            .section_leaders
            .iter()
            .filter(|leader| &leader.metric == metric)
            .collect();
        if !leaders.is_empty() {
            writeln!(output, "  Best model by section:")?;
            for leader in leaders {
                writeln!(
                    output,
                    "    {}\t{}\t{:.4}",
                    leader.section_name, leader.best_model, leader.score
                )?;
            }
        }
    }

    Ok(())
}
