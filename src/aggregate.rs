use std::collections::{BTreeMap, BTreeSet};

use crate::metrics::Metric;
use crate::model::LineItem;

/// Section totals of two tables aligned over the union of their sections.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlignedSections {
    pub sections: Vec<String>,
    pub ground_truth: Vec<f64>,
    pub predictions: Vec<f64>,
}

pub fn section_totals<'a, I>(rows: I) -> BTreeMap<String, f64>
where
    I: IntoIterator<Item = &'a LineItem>,
{
    let mut totals = BTreeMap::<String, f64>::new();
    for row in rows {
        *totals.entry(row.section_name.clone()).or_insert(0.0) += row.row_total_cost_usd;
    }
    totals
}

/// A section missing on one side is paired with 0 so that it scores as a
/// complete miss rather than being dropped.
pub fn align_sections(
    ground_truth: &BTreeMap<String, f64>,
    predictions: &BTreeMap<String, f64>,
) -> AlignedSections {
    let sections: BTreeSet<&String> = ground_truth.keys().chain(predictions.keys()).collect();

    let mut aligned = AlignedSections::default();
    for section in sections {
        aligned.sections.push(section.clone());
        aligned
            .ground_truth
            .push(ground_truth.get(section).copied().unwrap_or(0.0));
        aligned
            .predictions
            .push(predictions.get(section).copied().unwrap_or(0.0));
    }
    aligned
}

pub fn evaluate_by_section<'a, G, P>(
    metric: &Metric,
    ground_truth_rows: G,
    prediction_rows: P,
) -> f64
where
    G: IntoIterator<Item = &'a LineItem>,
    P: IntoIterator<Item = &'a LineItem>,
{
    let aligned = align_sections(
        &section_totals(ground_truth_rows),
        &section_totals(prediction_rows),
    );
    metric.evaluate(&aligned.ground_truth, &aligned.predictions)
}

/// Scores each section on its own, so a section whose ground truth is zero
/// yields NaN for ratio metrics without affecting its neighbours.
pub fn evaluate_by_section_per_section<'a, G, P>(
    metric: &Metric,
    ground_truth_rows: G,
    prediction_rows: P,
) -> BTreeMap<String, f64>
where
    G: IntoIterator<Item = &'a LineItem>,
    P: IntoIterator<Item = &'a LineItem>,
{
    let aligned = align_sections(
        &section_totals(ground_truth_rows),
        &section_totals(prediction_rows),
    );

    aligned
        .sections
        .into_iter()
        .zip(aligned.ground_truth)
        .zip(aligned.predictions)
        .map(|((section, truth), predicted)| {
            let score = metric.evaluate(&[truth], &[predicted]);
            (section, score)
        })
        .collect()
}
