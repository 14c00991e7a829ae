use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::error;

use crate::core::{
  GenerateOptions, Sbench,
  preparators::MemoryBudget,
  settings::{Settings, load_settings, load_settings_from},
};

#[derive(Parser)]
#[command(version, about = "Generate HPC benchmark jobs and collect their results", long_about = None)]
struct Cli {
  /// Print debug messages
  #[arg(short, long, global = true)]
  verbose: bool,
  /// Settings file to use instead of the user one
  #[arg(long, global = true)]
  settings: Option<PathBuf>,
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Create one run directory per job of the matrix and submit it
  #[command(visible_alias = "run")]
  Generate {
    /// Benchmarks to run, all of them by default
    #[arg(long, value_delimiter = ',')]
    tests: Option<Vec<String>>,
    /// Clusters to run on, all of them by default
    #[arg(long, value_delimiter = ',')]
    clusters: Option<Vec<String>>,
    /// Extra arguments for sbatch, e.g. "--account=hpc --qos=debug"
    #[arg(long, allow_hyphen_values = true)]
    runner_args: Option<String>,
    /// Write the run directories but do not submit anything
    #[arg(long)]
    dry_run: bool,
    /// YAML file replacing the built-in benchmark tables
    #[arg(long)]
    tables: Option<PathBuf>,
    /// Directory whose files override the built-in templates
    #[arg(long)]
    templates: Option<PathBuf>,
    /// HPL problem sizing: percent-of-total or quadratic-footprint
    #[arg(long)]
    memory_formula: Option<MemoryBudget>,
    /// Existing directory receiving the run directories
    directory: PathBuf,
  },
  /// Store the results found under a directory into the database
  Collect {
    /// Database file, the configured one by default
    #[arg(long)]
    db: Option<PathBuf>,
    directory: PathBuf,
  },
}

pub fn main() -> ExitCode {
  let cli = Cli::parse();
  let level = if cli.verbose { "debug" } else { "info" };
  let _ = env_logger::Builder::from_env(Env::default().default_filter_or(level)).try_init();

  match run(cli) {
    Ok(code) => code,
    Err(e) => {
      error!("{:#}", e);
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<ExitCode> {
  let settings: Settings = match &cli.settings {
    Some(path) => load_settings_from(path),
    None => load_settings(),
  }
  .context("Failed to load settings")?;
  let sbench = Sbench::new(settings);

  match cli.command {
    Commands::Generate {
      tests,
      clusters,
      runner_args,
      dry_run,
      tables,
      templates,
      memory_formula,
      directory,
    } => {
      let options = GenerateOptions {
        directory,
        tests,
        clusters,
        runner_args: runner_args
          .map(|args| args.split_whitespace().map(str::to_string).collect())
          .unwrap_or_default(),
        dry_run,
        tables,
        templates,
        memory_formula,
      };
      let report = sbench.generate(&options)?;
      println!(
        "Created {} run directories, submitted {}",
        report.created.len(),
        report.submitted
      );
      for failure in &report.failures {
        println!(
          "  failed: {} on {} in {:?}: {}",
          failure.benchmark, failure.cluster, failure.directory, failure.error
        );
      }
      Ok(if report.is_success() {
        ExitCode::SUCCESS
      } else {
        ExitCode::FAILURE
      })
    }
    Commands::Collect { db, directory } => {
      let report = sbench
        .collect(&directory, db.as_deref())
        .with_context(|| format!("Failed to collect results from {:?}", directory))?;
      println!(
        "Ingested {} run directories ({} rows inserted, {} already present), skipped {}, failed {}",
        report.ingested.len(),
        report.rows_inserted(),
        report.rows_duplicated(),
        report.skipped.len(),
        report.failed.len()
      );
      for (directory, error) in &report.failed {
        println!("  failed: {:?}: {}", directory, error);
      }
      Ok(ExitCode::SUCCESS)
    }
  }
}
