// src/cli/mod.rs — CLI definition (clap derive)

pub mod progress;
pub mod run;

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "analyst",
    about = "Answer analysis requests over a CSV dataset with self-repairing scripts",
    version
)]
pub struct Cli {
    /// Analysis request, e.g. "Which borough has the highest average ridership?"
    #[arg(trailing_var_arg = true, required = true)]
    pub request: Vec<String>,

    /// CSV dataset to analyze
    #[arg(short, long)]
    pub data: PathBuf,

    /// Model to use (provider/model format)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Execution attempts per subtask before giving up
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Suppress progress output (only emit final result)
    #[arg(long)]
    pub quiet: bool,

    /// Print the full run outcome as JSON
    #[arg(long)]
    pub json: bool,

    /// Verbose logging (debug level)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn request_text(&self) -> String {
        self.request.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_and_data() {
        let cli = Cli::try_parse_from([
            "analyst",
            "--data",
            "rides.csv",
            "--model",
            "ollama/llama3.1",
            "Top",
            "five",
            "stations",
        ])
        .unwrap();
        assert_eq!(cli.request_text(), "Top five stations");
        assert_eq!(cli.data, PathBuf::from("rides.csv"));
        assert_eq!(cli.model.as_deref(), Some("ollama/llama3.1"));
        assert!(!cli.json);
    }

    #[test]
    fn test_data_is_required() {
        assert!(Cli::try_parse_from(["analyst", "Top stations"]).is_err());
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "analyst",
            "-d",
            "x.csv",
            "--max-retries",
            "2",
            "--json",
            "--quiet",
            "-v",
            "q",
        ])
        .unwrap();
        assert_eq!(cli.max_retries, Some(2));
        assert!(cli.json && cli.quiet && cli.verbose);
    }
}
