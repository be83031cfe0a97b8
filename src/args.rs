use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "edu-sense",
    version,
    about = "Detect learning gaps in a student's question attempts and suggest interventions"
)]
pub struct Args {
    /// Attempt table: comma-delimited with a header row, or a .json array
    pub input: PathBuf,

    /// YAML configuration file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Write the gap report to this file
    #[arg(long, conflicts_with = "report_dir")]
    pub report: Option<PathBuf>,

    /// Write a timestamped gap report into this directory
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// Print the analysis and recommendations as JSON
    #[arg(long)]
    pub json: bool,

    /// Maximum number of recommendations (overrides config)
    #[arg(long)]
    pub top: Option<usize>,
}
