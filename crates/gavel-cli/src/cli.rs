use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "gavel",
    version,
    about = "LLM benchmark harness: generate model responses over benchmark datasets, then judge-score them with rubric prompts"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate candidate-model responses for the configured benchmarks
    Generate(GenerateArgs),
    /// Judge-score previously generated responses
    Judge(JudgeArgs),
}

#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Path to the generate-phase YAML config
    #[arg(short, long)]
    pub config: PathBuf,
}

#[derive(Parser, Debug)]
pub struct JudgeArgs {
    /// Path to the judge-phase YAML config
    #[arg(short, long)]
    pub config: PathBuf,
}
