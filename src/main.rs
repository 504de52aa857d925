use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};

use covgate::cli;
use covgate::error::CovgateError;
use covgate::report::ReportContext;

/// covgate — Multi-format coverage measurement, diffing and CI threshold gating.
#[derive(Parser)]
#[command(name = "covgate", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure metrics and emit a report snapshot as JSON.
    Measure {
        /// Coverage report files or directories (format auto-detected).
        #[arg(long = "coverage")]
        coverage: Vec<PathBuf>,

        /// Repository slug recorded in the snapshot (owner/repo).
        #[arg(long)]
        repository: String,

        /// Git ref recorded in the snapshot.
        #[arg(long = "ref")]
        git_ref: String,

        /// Commit SHA recorded in the snapshot.
        #[arg(long)]
        commit: String,

        /// Root directory for code-to-test ratio measurement.
        #[arg(long)]
        ratio_root: Option<PathBuf>,

        /// Glob pattern classifying code files ('!' negates; repeatable).
        #[arg(long = "code")]
        code: Vec<String>,

        /// Glob pattern classifying test files ('!' negates; repeatable).
        #[arg(long = "test")]
        test: Vec<String>,
    },

    /// Diff two report snapshots.
    Diff {
        /// The newer snapshot.
        a: PathBuf,

        /// The older snapshot.
        b: PathBuf,
    },

    /// Gate a report snapshot against threshold conditions.
    Check {
        /// The snapshot to gate.
        report: PathBuf,

        /// Previous snapshot, enabling prev/diff in conditions.
        #[arg(long)]
        prev: Option<PathBuf>,

        /// Coverage condition, e.g. "80%" or "current >= prev".
        #[arg(long)]
        coverage: Option<String>,

        /// Code-to-test ratio condition, e.g. "1:1.2".
        #[arg(long = "code-to-test-ratio")]
        code_to_test_ratio: Option<String>,

        /// Test execution time condition, e.g. "<= 1min".
        #[arg(long = "test-execution-time")]
        test_execution_time: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Measure {
            coverage,
            repository,
            git_ref,
            commit,
            ratio_root,
            code,
            test,
        } => {
            let ctx = ReportContext {
                repository,
                ref_: git_ref,
                commit,
                timestamp: Utc::now(),
            };
            cli::cmd_measure(ctx, &coverage, ratio_root.as_deref(), &code, &test)
        }
        Commands::Diff { a, b } => cli::cmd_diff(&a, &b),
        Commands::Check {
            report,
            prev,
            coverage,
            code_to_test_ratio,
            test_execution_time,
        } => cli::cmd_check(
            &report,
            prev.as_deref(),
            coverage.as_deref(),
            code_to_test_ratio.as_deref(),
            test_execution_time.as_deref(),
        ),
    };

    match result {
        Ok(out) => {
            print!("{out}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {err:#}");
            // A failed gate exits 1; broken input or config exits 2.
            let failed_gate = err
                .downcast_ref::<CovgateError>()
                .is_some_and(CovgateError::is_threshold_not_met);
            if failed_gate {
                ExitCode::FAILURE
            } else {
                ExitCode::from(2)
            }
        }
    }
}
