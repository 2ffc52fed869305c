//! canvass - batch questionnaire validator
//!
//! Analyzes one or more questionnaire files and prints a JSON report per
//! file. The process exit code is the maximum of the per-file codes
//! (0 clean, 1 static errors, 2 cycle, 3 unreachable/infeasible/dead,
//! 4 inconsistent, 5 undecided).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rayon::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use canvass_core::{AnalysisConfig, Analyzer, Report, SolverConfig};

#[derive(Parser, Debug)]
#[command(name = "canvass", about = "Static analysis for YAML questionnaires")]
struct Args {
    /// Questionnaire files to analyze
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Per-query solver timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Pretty-print the JSON reports
    #[arg(long)]
    pretty: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = AnalysisConfig {
        solver: SolverConfig {
            timeout_ms: args.timeout_ms,
            ..SolverConfig::default()
        },
        ..AnalysisConfig::default()
    };

    // Distinct questionnaires are independent; fan out across threads
    let mut reports: Vec<(PathBuf, Report)> = args
        .files
        .par_iter()
        .map(|path| {
            let analyzer = Analyzer::new(config.clone());
            let report = match analyzer.analyze_path(path) {
                Ok(outcome) => Report::from_outcome(&outcome),
                Err(error) => Report::from_structural(&error),
            };
            (path.clone(), report)
        })
        .collect();
    reports.sort_by(|a, b| a.0.cmp(&b.0));

    let mut worst = 0;
    for (path, report) in &reports {
        info!(path = %path.display(), exit = report.exit_code(), "analyzed");
        let json = if args.pretty {
            serde_json::to_string_pretty(report)
        } else {
            serde_json::to_string(report)
        };
        match json {
            Ok(text) => println!("{}", text),
            Err(error) => {
                eprintln!("{}: failed to serialize report: {}", path.display(), error);
                return ExitCode::from(1);
            }
        }
        worst = worst.max(report.exit_code());
    }

    ExitCode::from(worst as u8)
}
