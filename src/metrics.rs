use std::fmt;

use tracing::warn;

pub const DEFAULT_ASYMMETRIC_ALPHA: f64 = 2.0;
pub const DEFAULT_METRICS: [&str; 3] = ["MAE", "MAPE", "MRE"];

/// Scoring function over two aligned sequences of section totals.
///
/// Every variant returns NaN when it has nothing to average over instead of
/// reporting a perfect zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    Mae,
    Mape,
    Mre,
    /// Underestimates (`prediction < ground_truth`) cost `alpha` times the
    /// absolute error; overestimates cost the plain absolute error.
    Asymmetric { alpha: f64 },
}

impl Metric {
    pub fn from_name(name: &str, alpha: f64) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "mae" => Some(Self::Mae),
            "mape" => Some(Self::Mape),
            "mre" => Some(Self::Mre),
            "asymmetric" | "asymmetric_loss" | "asymmetricloss" => {
                Some(Self::Asymmetric { alpha })
            }
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mae => "MAE",
            Self::Mape => "MAPE",
            Self::Mre => "MRE",
            Self::Asymmetric { .. } => "ASYMMETRIC",
        }
    }

    pub fn evaluate(&self, ground_truth: &[f64], predictions: &[f64]) -> f64 {
        debug_assert_eq!(
            ground_truth.len(),
            predictions.len(),
            "metric inputs must be aligned"
        );

        let pairs = ground_truth.iter().copied().zip(predictions.iter().copied());
        match *self {
            Self::Mae => mean(pairs.map(|(truth, predicted)| (predicted - truth).abs())),
            Self::Mape => mean_relative_error(pairs) * 100.0,
            Self::Mre => mean_relative_error(pairs),
            Self::Asymmetric { alpha } => mean(pairs.map(|(truth, predicted)| {
                let error = predicted - truth;
                if error < 0.0 {
                    alpha * error.abs()
                } else {
                    error.abs()
                }
            })),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds the enabled metric list in configuration order. Unknown names are
/// dropped with a warning and repeated names keep their first position.
pub fn resolve_metrics<S: AsRef<str>>(names: &[S], alpha: f64) -> Vec<Metric> {
    let mut metrics: Vec<Metric> = Vec::with_capacity(names.len());

    for name in names {
        let name = name.as_ref();
        let Some(metric) = Metric::from_name(name, alpha) else {
            warn!(metric = %name, "unsupported metric in configuration; skipping");
            continue;
        };

        if metrics.iter().any(|known| known.name() == metric.name()) {
            continue;
        }
        metrics.push(metric);
    }

    metrics
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0_f64, 0_usize), |(sum, count), value| {
        (sum + value, count + 1)
    });

    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

// Zero ground truths have no defined ratio and are left out of the mean.
fn mean_relative_error(pairs: impl Iterator<Item = (f64, f64)>) -> f64 {
    mean(
        pairs
            .filter(|(truth, _)| *truth != 0.0)
            .map(|(truth, predicted)| ((truth - predicted) / truth).abs())
            .filter(|ratio| !ratio.is_nan()),
    )
}
