use std::{
  fs,
  path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDateTime};
use diesel::SqliteConnection;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::core::{
  context::{RunContext, keys},
  database::{find_job, insert_job, models::Job},
};

// Output of `date -R`
const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

static JOB_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^run\.(\d+)\.start$").unwrap());
static ENVIRONMENT_RE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"^(SLURM_NODELIST|SLURM_CLUSTER_NAME|SLURM_NNODES|SLURM_NTASKS|SPACK_TARGET_TYPE)=(.*)$")
    .unwrap()
});

#[derive(Error, Debug)]
pub enum ExtractError {
  #[error("IO Error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("No '*.{0}' file in run directory")]
  MissingArtifact(&'static str),
  #[error("More than one '*.{0}' file in run directory: {1:?}")]
  DuplicateArtifact(&'static str, Vec<PathBuf>),
  #[error("Cannot read a job id from {0:?}")]
  InvalidJobId(PathBuf),
  #[error("Environment dump lacks {}", .0.join(", "))]
  MissingVariables(Vec<&'static str>),
  #[error("Variable {0} is not a number: '{1}'")]
  InvalidNumber(&'static str, String),
  #[error("Invalid date in {0:?}: {1}")]
  InvalidDate(PathBuf, chrono::ParseError),
  #[error("Manifest Error: {0}")]
  ContextError(#[from] crate::core::context::ContextError),
  #[error("Database Error: {0}")]
  DatabaseError(#[from] diesel::result::Error),
}

/// Files the batch script leaves behind in a run directory.
#[derive(Debug, Clone, PartialEq)]
pub struct JobArtifacts {
  pub output: PathBuf,
  pub error: PathBuf,
  pub environment: PathBuf,
  pub start: PathBuf,
  pub finished: PathBuf,
}

impl JobArtifacts {
  /// Exactly one file of each kind must be present.
  pub fn discover(directory: &Path) -> Result<Self, ExtractError> {
    let mut files: Vec<PathBuf> = fs::read_dir(directory)?
      .map(|entry| entry.map(|e| e.path()))
      .collect::<Result<_, _>>()?;
    files.retain(|path| path.is_file());

    let pick = |extension: &'static str| -> Result<PathBuf, ExtractError> {
      let mut matching: Vec<PathBuf> = files
        .iter()
        .filter(|path| path.extension().is_some_and(|ext| ext == extension))
        .cloned()
        .collect();
      match matching.len() {
        0 => Err(ExtractError::MissingArtifact(extension)),
        1 => Ok(matching.remove(0)),
        _ => {
          matching.sort();
          Err(ExtractError::DuplicateArtifact(extension, matching))
        }
      }
    };

    Ok(JobArtifacts {
      output: pick("out")?,
      error: pick("err")?,
      environment: pick("env")?,
      start: pick("start")?,
      finished: pick("finished")?,
    })
  }

  /// Scheduler id, as embedded in the start marker name `run.<id>.start`.
  pub fn job_id(&self) -> Result<i64, ExtractError> {
    self
      .start
      .file_name()
      .and_then(|name| name.to_str())
      .and_then(|name| JOB_ID_RE.captures(name))
      .and_then(|caps| caps[1].parse().ok())
      .ok_or_else(|| ExtractError::InvalidJobId(self.start.clone()))
  }
}

/// What the environment dump tells about the allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentInfo {
  pub nodelist: String,
  pub cluster: String,
  pub nnodes: i32,
  pub ntasks: i32,
  pub target: String,
}

/// Scan `env` output line by line; every variable is required.
pub fn scan_environment(text: &str) -> Result<EnvironmentInfo, ExtractError> {
  let mut nodelist = None;
  let mut cluster = None;
  let mut nnodes = None;
  let mut ntasks = None;
  let mut target = None;

  for line in text.lines() {
    if let Some(caps) = ENVIRONMENT_RE.captures(line) {
      let value = caps[2].to_string();
      let slot = match &caps[1] {
        "SLURM_NODELIST" => &mut nodelist,
        "SLURM_CLUSTER_NAME" => &mut cluster,
        "SLURM_NNODES" => &mut nnodes,
        "SLURM_NTASKS" => &mut ntasks,
        _ => &mut target,
      };
      slot.get_or_insert(value);
    }
    if nodelist.is_some()
      && cluster.is_some()
      && nnodes.is_some()
      && ntasks.is_some()
      && target.is_some()
    {
      break;
    }
  }

  match (nodelist, cluster, nnodes, ntasks, target) {
    (Some(nodelist), Some(cluster), Some(nnodes), Some(ntasks), Some(target)) => {
      Ok(EnvironmentInfo {
        nodelist,
        cluster,
        nnodes: parse_number("SLURM_NNODES", &nnodes)?,
        ntasks: parse_number("SLURM_NTASKS", &ntasks)?,
        target,
      })
    }
    (nodelist, cluster, nnodes, ntasks, target) => {
      let missing = [
        ("SLURM_NODELIST", nodelist.is_none()),
        ("SLURM_CLUSTER_NAME", cluster.is_none()),
        ("SLURM_NNODES", nnodes.is_none()),
        ("SLURM_NTASKS", ntasks.is_none()),
        ("SPACK_TARGET_TYPE", target.is_none()),
      ]
      .into_iter()
      .filter_map(|(name, missing)| missing.then_some(name))
      .collect();
      Err(ExtractError::MissingVariables(missing))
    }
  }
}

fn parse_number(variable: &'static str, value: &str) -> Result<i32, ExtractError> {
  value
    .trim()
    .parse()
    .map_err(|_| ExtractError::InvalidNumber(variable, value.to_string()))
}

/// Read a marker written by `date -R`, as a UTC timestamp.
pub fn read_date_file(path: &Path) -> Result<NaiveDateTime, ExtractError> {
  let text = fs::read_to_string(path)?;
  DateTime::parse_from_str(text.trim(), DATE_FORMAT)
    .map(|date| date.naive_utc())
    .map_err(|e| ExtractError::InvalidDate(path.to_path_buf(), e))
}

/// Return the job row for this run directory, inserting it on first sight.
/// An existing (cluster, id) row is returned untouched.
pub fn resolve_job(
  conn: &mut SqliteConnection,
  directory: &Path,
  context: &RunContext,
  artifacts: &JobArtifacts,
) -> Result<Job, ExtractError> {
  let id = artifacts.job_id()?;
  let environment = scan_environment(&fs::read_to_string(&artifacts.environment)?)?;

  if let Some(job) = find_job(conn, &environment.cluster, id)? {
    debug!("Job {} on {} already known", id, environment.cluster);
    return Ok(job);
  }

  let job = Job {
    cluster: environment.cluster,
    id,
    start: read_date_file(&artifacts.start)?,
    finish: read_date_file(&artifacts.finished)?,
    nnodes: environment.nnodes,
    ntasks: environment.ntasks,
    target: environment.target,
    compiler: context.require_str(keys::COMPILER)?.to_string(),
    lapack: context.get_str(keys::BLAS).map(str::to_string),
    python: context.get_str(keys::PYTHON).map(str::to_string),
    mpi: context.require_str(keys::MPI)?.to_string(),
    nodelist: environment.nodelist,
    root: directory.to_string_lossy().into_owned(),
  };
  insert_job(conn, &job)?;
  debug!("Recorded job {} on {}", job.id, job.cluster);
  Ok(job)
}
