pub mod metadata;

#[cfg(test)]
mod tests;

use std::{
  fs, io,
  path::{Path, PathBuf},
};

use log::{debug, info, warn};
use thiserror::Error;
use walkdir::WalkDir;

use crate::core::{
  collect::metadata::{ExtractError, JobArtifacts, resolve_job},
  context::{ContextError, MANIFEST_FILE, keys, read_manifest},
  database::Database,
  parsers::{ParseError, ParseStats, Parsers},
};

#[derive(Error, Debug)]
pub enum IngestError {
  #[error("IO Error: {0}")]
  IoError(#[from] io::Error),
  #[error("Metadata Error: {0}")]
  ExtractError(#[from] ExtractError),
  #[error("Parse Error: {0}")]
  ParseError(#[from] ParseError),
  #[error("Database Error: {0}")]
  DatabaseError(#[from] diesel::result::Error),
  #[error("{0:?} is not a directory")]
  NotADirectory(PathBuf),
}

#[derive(Debug)]
pub enum SkipReason {
  /// The manifest is missing, unreadable or incomplete.
  Manifest(ContextError),
  /// No parser is registered for this benchmark.
  Unsupported(String),
}

#[derive(Debug)]
pub struct Ingested {
  pub directory: PathBuf,
  pub cluster: String,
  pub jobid: i64,
  pub stats: ParseStats,
}

/// Outcome of one collect pass, one entry per run directory.
#[derive(Debug, Default)]
pub struct CollectReport {
  pub ingested: Vec<Ingested>,
  pub skipped: Vec<(PathBuf, SkipReason)>,
  pub failed: Vec<(PathBuf, IngestError)>,
}

impl CollectReport {
  pub fn rows_inserted(&self) -> usize {
    self.ingested.iter().map(|i| i.stats.inserted).sum()
  }

  pub fn rows_duplicated(&self) -> usize {
    self.ingested.iter().map(|i| i.stats.duplicates).sum()
  }
}

/// Leaf directories (no subdirectory) under `root` holding a manifest, sorted by path.
pub fn find_run_directories(root: &Path) -> Result<Vec<PathBuf>, IngestError> {
  if !root.is_dir() {
    return Err(IngestError::NotADirectory(root.to_path_buf()));
  }

  let mut found = Vec::new();
  for entry in WalkDir::new(root).sort_by_file_name() {
    let entry = match entry {
      Ok(entry) => entry,
      Err(e) => {
        warn!("Skipping unreadable entry under {:?}: {}", root, e);
        continue;
      }
    };
    if !entry.file_type().is_dir() {
      continue;
    }
    let path = entry.path();
    match is_leaf(path) {
      Ok(true) if path.join(MANIFEST_FILE).is_file() => found.push(path.to_path_buf()),
      Ok(_) => {}
      Err(e) => warn!("Skipping unreadable directory {:?}: {}", path, e),
    }
  }
  debug!("Found {} run directories under {:?}", found.len(), root);
  Ok(found)
}

fn is_leaf(directory: &Path) -> io::Result<bool> {
  for entry in fs::read_dir(directory)? {
    if entry?.file_type()?.is_dir() {
      return Ok(false);
    }
  }
  Ok(true)
}

/// Walks a results tree and stores what every run directory produced.
pub struct Collector<'a> {
  parsers: &'a Parsers,
}

impl<'a> Collector<'a> {
  pub fn new(parsers: &'a Parsers) -> Self {
    Collector { parsers }
  }

  /// A bad run directory never stops the walk: it ends up skipped or failed in the report.
  pub fn collect(&self, db: &mut Database, root: &Path) -> Result<CollectReport, IngestError> {
    let mut report = CollectReport::default();
    for directory in find_run_directories(root)? {
      self.ingest_directory(db, directory, &mut report);
    }
    info!(
      "Collected {} run directories ({} rows inserted, {} already present), skipped {}, failed {}",
      report.ingested.len(),
      report.rows_inserted(),
      report.rows_duplicated(),
      report.skipped.len(),
      report.failed.len()
    );
    Ok(report)
  }

  fn ingest_directory(&self, db: &mut Database, directory: PathBuf, report: &mut CollectReport) {
    let context = match read_manifest(&directory) {
      Ok(context) => context,
      Err(e) => {
        warn!("Skipping {:?}: {}", directory, e);
        report.skipped.push((directory, SkipReason::Manifest(e)));
        return;
      }
    };

    // Name presence is checked by read_manifest
    let name = context.get_str(keys::NAME).unwrap_or_default();
    let Some(parser) = self.parsers.get(name) else {
      warn!("Skipping {:?}: no parser for benchmark '{}'", directory, name);
      report
        .skipped
        .push((directory, SkipReason::Unsupported(name.to_string())));
      return;
    };

    let result = db.transaction::<_, IngestError, _>(|conn| {
      let artifacts = JobArtifacts::discover(&directory)?;
      let job = resolve_job(conn, &directory, &context, &artifacts)?;
      let output = fs::read_to_string(&artifacts.output)?;
      let stats = parser.ingest(conn, &job, &output)?;
      Ok((job, stats))
    });

    match result {
      Ok((job, stats)) => {
        debug!(
          "Ingested {:?} as job {} on {}: {:?}",
          directory, job.id, job.cluster, stats
        );
        report.ingested.push(Ingested {
          directory,
          cluster: job.cluster,
          jobid: job.id,
          stats,
        });
      }
      Err(e) => {
        warn!("Failed to ingest {:?}: {}", directory, e);
        report.failed.push((directory, e));
      }
    }
  }
}
