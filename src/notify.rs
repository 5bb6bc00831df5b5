use std::fs::OpenOptions;
use std::io::{self, Stdout, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

use crate::util::ensure_parent_directory;

pub trait EvaluationObserver {
    fn update(&mut self, model_name: &str, metric_name: &str, score: f64) -> Result<()>;
}

pub fn format_event(model_name: &str, metric_name: &str, score: f64) -> String {
    format!("Model: {model_name} | Metric: {metric_name} | Score: {score:.4}")
}

pub struct ConsoleLogger<W: Write = Stdout> {
    writer: W,
}

impl ConsoleLogger<Stdout> {
    pub fn stdout() -> Self {
        Self {
            writer: io::stdout(),
        }
    }
}

impl<W: Write> ConsoleLogger<W> {
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EvaluationObserver for ConsoleLogger<W> {
    fn update(&mut self, model_name: &str, metric_name: &str, score: f64) -> Result<()> {
        writeln!(
            self.writer,
            "[LOG] {}",
            format_event(model_name, metric_name, score)
        )
        .context("failed to write evaluation event to console")
    }
}

pub struct FileLogger {
    path: PathBuf,
}

impl FileLogger {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure_parent_directory(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EvaluationObserver for FileLogger {
    fn update(&mut self, model_name: &str, metric_name: &str, score: f64) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open log file: {}", self.path.display()))?;
        writeln!(file, "{}", format_event(model_name, metric_name, score))
            .with_context(|| format!("failed to append to log file: {}", self.path.display()))
    }
}

/// Fans evaluation events out to every registered observer in registration
/// order. An observer that fails is logged and skipped for that event; the
/// remaining observers still receive it.
#[derive(Default)]
pub struct EvaluationNotifier {
    observers: Vec<Box<dyn EvaluationObserver>>,
}

impl EvaluationNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&mut self, observer: Box<dyn EvaluationObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn notify(&mut self, model_name: &str, metric_name: &str, score: f64) {
        for (index, observer) in self.observers.iter_mut().enumerate() {
            if let Err(err) = observer.update(model_name, metric_name, score) {
                warn!(
                    observer = index,
                    model = %model_name,
                    metric = %metric_name,
                    error = %err,
                    "evaluation observer failed"
                );
            }
        }
    }
}
