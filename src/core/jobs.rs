mod slurm;
mod utils;
mod r#virtual;

#[cfg(test)]
mod tests;

use std::{
  fs,
  path::{Path, PathBuf},
};

use log::{debug, info, warn};
use serde_json::{Value, json};
use thiserror::Error;
use uuid::Uuid;

use crate::core::{
  context::{ContextError, RunContext, keys, write_manifest},
  preparators::{PrepareEnv, PrepareError, Preparators},
  tables::{BenchmarkSpec, ClusterSpec, RunConfiguration, SoftwareStack, Tables, TablesError},
  templates::{BATCH_TEMPLATE, Renderer, TemplateError},
};

pub use slurm::SlurmScheduler;
pub use r#virtual::VirtualScheduler;

/// File name of the rendered submission script.
pub const SCRIPT_FILE: &str = "slurm_batch.sh";
const OUTPUT_PATTERN: &str = "run.%A.out";
const ERROR_PATTERN: &str = "run.%A.err";

/// Accepts a rendered script and hands it to a batch system.
pub trait SchedulerTrait {
  /// Returns the job identifier when the scheduler assigns one.
  fn submit(&self, script: &Path, extra_args: &[String]) -> Result<Option<String>, JobError>;
}

#[derive(Error, Debug)]
pub enum JobError {
  #[error("IO Error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Context Error: {0}")]
  ContextError(#[from] ContextError),
  #[error("Preparation Error: {0}")]
  PrepareError(#[from] PrepareError),
  #[error("Template Error: {0}")]
  TemplateError(#[from] TemplateError),
  #[error("Job Spawn: {0}")]
  SpawnError(String),
  #[error("Submission failed: {0}")]
  SubmissionFailed(String),
}

/// Which part of the matrix to generate and where.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
  pub directory: PathBuf,
  /// `None` selects every benchmark
  pub tests: Option<Vec<String>>,
  /// `None` selects every cluster
  pub clusters: Option<Vec<String>>,
  pub scheduler_args: Vec<String>,
}

#[derive(Debug)]
pub struct LeafFailure {
  pub cluster: String,
  pub benchmark: String,
  pub directory: PathBuf,
  pub error: JobError,
}

/// Outcome of one generation pass.
#[derive(Debug, Default)]
pub struct GenerationReport {
  pub created: Vec<PathBuf>,
  pub submitted: usize,
  pub failures: Vec<LeafFailure>,
}

impl GenerationReport {
  pub fn is_success(&self) -> bool {
    self.failures.is_empty()
  }
}

/// Expands clusters × software stacks × benchmarks × configurations into run directories.
pub struct Generator<'a> {
  tables: &'a Tables,
  renderer: &'a dyn Renderer,
  preparators: &'a Preparators,
  scheduler: &'a dyn SchedulerTrait,
}

impl<'a> Generator<'a> {
  pub fn new(
    tables: &'a Tables,
    renderer: &'a dyn Renderer,
    preparators: &'a Preparators,
    scheduler: &'a dyn SchedulerTrait,
  ) -> Self {
    Generator {
      tables,
      renderer,
      preparators,
      scheduler,
    }
  }

  /// Unknown test or cluster names fail before anything touches the filesystem.
  /// Afterwards every leaf is independent: a failing leaf is recorded and the
  /// matrix goes on.
  pub fn generate(&self, request: &GenerateRequest) -> Result<GenerationReport, TablesError> {
    let benchmarks = self.tables.select_benchmarks(request.tests.as_deref())?;
    let clusters = self.tables.select_clusters(request.clusters.as_deref())?;

    let mut report = GenerationReport::default();
    for cluster in clusters {
      for stack in self.tables.stacks_for(cluster) {
        for &benchmark in &benchmarks {
          for configuration in &benchmark.configurations {
            let leaf = Leaf {
              cluster,
              stack,
              benchmark,
              configuration,
            };
            self.run_leaf(&leaf, request, &mut report);
          }
        }
      }
    }

    info!(
      "Generated {} run directories, submitted {}, {} failed",
      report.created.len(),
      report.submitted,
      report.failures.len()
    );
    Ok(report)
  }

  fn run_leaf(&self, leaf: &Leaf, request: &GenerateRequest, report: &mut GenerationReport) {
    let directory = request.directory.join(Uuid::new_v4().to_string());
    let result = fs::create_dir(&directory)
      .map_err(JobError::from)
      .and_then(|_| {
        report.created.push(directory.clone());
        self.prepare_and_submit(leaf, &directory, &request.scheduler_args)
      });

    match result {
      Ok(job_id) => {
        report.submitted += 1;
        info!(
          "Submitted {} on {} ({} + {}) in {:?}: job {}",
          leaf.benchmark.name,
          leaf.cluster.name,
          leaf.stack.compiler,
          leaf.stack.mpi,
          directory,
          job_id.as_deref().unwrap_or("-")
        );
      }
      Err(error) => {
        warn!(
          "Failed to generate {} on {} in {:?}: {}",
          leaf.benchmark.name, leaf.cluster.name, directory, error
        );
        report.failures.push(LeafFailure {
          cluster: leaf.cluster.name.clone(),
          benchmark: leaf.benchmark.name.clone(),
          directory,
          error,
        });
      }
    }
  }

  fn prepare_and_submit(
    &self,
    leaf: &Leaf,
    directory: &Path,
    scheduler_args: &[String],
  ) -> Result<Option<String>, JobError> {
    let mut context = leaf.context(directory);

    if let Some(preparator) = self.preparators.get(&leaf.benchmark.name) {
      debug!("Preparing {} in {:?}", leaf.benchmark.name, directory);
      let env = PrepareEnv {
        directory,
        cluster: leaf.cluster,
        renderer: self.renderer,
      };
      preparator.prepare(&env, &mut context)?;
    }

    if context.ntasks()?.is_none() {
      let ntasks = leaf.cluster.ncores * context.nnodes()?;
      context.set(keys::NTASKS, ntasks);
    }

    write_manifest(directory, &context)?;

    let script = self.renderer.render(BATCH_TEMPLATE, &context)?;
    let script_path = directory.join(SCRIPT_FILE);
    fs::write(&script_path, script)?;
    utils::make_script_executable(&script_path)?;

    self.scheduler.submit(&script_path, scheduler_args)
  }
}

/// One point of the matrix.
struct Leaf<'a> {
  cluster: &'a ClusterSpec,
  stack: &'a SoftwareStack,
  benchmark: &'a BenchmarkSpec,
  configuration: &'a RunConfiguration,
}

impl Leaf<'_> {
  fn context(&self, directory: &Path) -> RunContext {
    let mut context = RunContext::new();
    context.set(keys::CLUSTER, self.cluster.name.as_str());
    if let Some(target) = &self.cluster.target {
      context.set(keys::TARGET, target.as_str());
    }
    context.set(keys::COMPILER, self.stack.compiler.as_str());
    context.set(keys::MPI, self.stack.mpi.as_str());
    context.set(keys::NAME, self.benchmark.name.as_str());
    context.set(keys::TEST_TEMPLATE, self.benchmark.template.as_str());
    context.set(keys::COMMAND, self.benchmark.command.as_str());
    context.set(keys::SUBDIR, self.benchmark.subdir.as_str());
    context.set(keys::NNODES, self.configuration.nnodes);
    context.set(
      keys::NTASKS,
      self.configuration.ntasks.map_or(Value::Null, Value::from),
    );
    let directory_text = directory.to_string_lossy();
    context.set(keys::TEST_DIRECTORY, directory_text.as_ref());
    context.set(
      keys::OUTPUT_FILE,
      directory.join(OUTPUT_PATTERN).to_string_lossy().as_ref(),
    );
    context.set(
      keys::ERROR_FILE,
      directory.join(ERROR_PATTERN).to_string_lossy().as_ref(),
    );
    context.set(keys::EXTRA_DIRECTIVES, json!(self.benchmark.extra_directives));
    context
  }
}
