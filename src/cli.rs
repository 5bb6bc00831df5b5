use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "estimate-eval",
    version,
    about = "Score model-generated cost estimates against ground-truth estimates"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Evaluate(EvaluateArgs),
    Rank(RankArgs),
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    #[arg(long, env = "CONFIG_PATH", default_value = "config.yaml")]
    pub config: PathBuf,

    #[arg(long)]
    pub ground_truth_dir: Option<PathBuf>,

    #[arg(long)]
    pub model_outputs_dir: Option<PathBuf>,

    #[arg(long = "metric")]
    pub metrics: Vec<String>,

    #[arg(long)]
    pub format: Option<String>,

    #[arg(long)]
    pub output_path: Option<PathBuf>,

    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[arg(long)]
    pub alpha: Option<f64>,

    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RankArgs {
    #[arg(long)]
    pub by_section_report: PathBuf,

    #[arg(long)]
    pub global_report: Option<PathBuf>,

    #[arg(long = "metric")]
    pub metrics: Vec<String>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}
