use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use serde::Serialize;
use snapdiff_capture::{CaptureConfig, CapturePipeline};
use snapdiff_compare::{BatchReconciler, CompareConfig, DiffEngine};
use tracing::debug;

mod logging;

#[derive(Debug, Parser)]
#[command(name = "snapdiff")]
#[command(about = "Capture page signatures and diff them across runs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch one URL, or every URL in a list file, into signature records.
    Capture(CaptureArgs),
    /// Diff two signature records.
    Compare(CompareArgs),
    /// Diff every record stem present in both directories.
    CompareDirs(CompareDirsArgs),
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("source").required(true).args(["url", "file"])))]
struct CaptureArgs {
    #[arg(long)]
    url: Option<String>,
    /// Newline-delimited URL list.
    #[arg(long)]
    file: Option<PathBuf>,
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// PNG to embed in a single-URL record.
    #[arg(long, requires = "url")]
    screenshot: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct CompareArgs {
    #[arg(long)]
    first: PathBuf,
    #[arg(long)]
    second: PathBuf,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct CompareDirsArgs {
    #[arg(long)]
    base_dir: PathBuf,
    #[arg(long)]
    current_dir: PathBuf,
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

/// Usage errors reported as JSON rather than clap text.
#[derive(Debug, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
enum UsageError {
    OutRequiredForSingleUrl,
    OutDirRequiredForFileMode,
}

const FAILURE: u8 = 2;

fn emit<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn emit_failure<T: Serialize + ?Sized>(value: &T) -> Result<ExitCode> {
    emit(value)?;
    Ok(ExitCode::from(FAILURE))
}

async fn run_capture(args: CaptureArgs) -> Result<ExitCode> {
    let pipeline = CapturePipeline::new(CaptureConfig::from_env())?;

    if let Some(url) = args.url {
        let Some(out) = args.out else {
            return emit_failure(&UsageError::OutRequiredForSingleUrl);
        };
        return match pipeline
            .capture_single(&url, &out, args.screenshot.as_deref())
            .await
        {
            Ok(outcome) => {
                emit(&outcome)?;
                Ok(ExitCode::SUCCESS)
            }
            Err(err) => emit_failure(&err),
        };
    }

    let Some(file) = args.file else {
        bail!("either --url or --file is required");
    };
    let Some(out_dir) = args.out_dir else {
        return emit_failure(&UsageError::OutDirRequiredForFileMode);
    };
    match pipeline.capture_from_list(&file, &out_dir).await {
        Ok(report) => {
            emit(&report)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => emit_failure(&err),
    }
}

async fn run_compare(args: CompareArgs) -> Result<ExitCode> {
    let engine = DiffEngine::new(CompareConfig::from_env());
    debug!(visual = engine.visual_available(), "diff engine ready");
    match engine
        .compare_files(&args.first, &args.second, args.out.as_deref())
        .await
    {
        Ok(diff) => {
            emit(&diff)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => emit_failure(&err),
    }
}

async fn run_compare_dirs(args: CompareDirsArgs) -> Result<ExitCode> {
    let reconciler = BatchReconciler::new(DiffEngine::new(CompareConfig::from_env()));
    match reconciler
        .compare_dirs(&args.base_dir, &args.current_dir, args.out_dir.as_deref())
        .await
    {
        Ok(summary) => {
            emit(&summary)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => emit_failure(&err),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    logging::init(logging::LogFormat::from_env());
    let cli = Cli::parse();

    match cli.command {
        Commands::Capture(args) => run_capture(args).await,
        Commands::Compare(args) => run_compare(args).await,
        Commands::CompareDirs(args) => run_compare_dirs(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn capture_needs_a_source() {
        assert!(Cli::try_parse_from(["snapdiff", "capture", "--out", "x.json"]).is_err());
        assert!(Cli::try_parse_from(["snapdiff", "capture", "--url", "u", "--file", "f"]).is_err());
    }

    #[test]
    fn subcommands_parse_their_flags() {
        let cli = Cli::try_parse_from([
            "snapdiff",
            "compare-dirs",
            "--base-dir",
            "base",
            "--current-dir",
            "current",
        ])
        .unwrap();
        match cli.command {
            Commands::CompareDirs(args) => {
                assert_eq!(args.base_dir, PathBuf::from("base"));
                assert!(args.out_dir.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn usage_errors_serialize_with_error_key() {
        let value = serde_json::to_value(UsageError::OutDirRequiredForFileMode).unwrap();
        assert_eq!(value, serde_json::json!({"error": "out_dir_required_for_file_mode"}));
    }
}
