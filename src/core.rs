pub mod collect;
pub mod context;
pub mod database;
pub mod jobs;
pub mod parsers;
pub mod preparators;
pub mod settings;
pub mod tables;
pub mod templates;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::core::{
  collect::{CollectReport, Collector},
  database::Database,
  jobs::{GenerateRequest, GenerationReport, Generator, SchedulerTrait, SlurmScheduler, VirtualScheduler},
  parsers::Parsers,
  preparators::{MemoryBudget, Preparators},
  settings::Settings,
  tables::Tables,
  templates::Templates,
};

#[derive(thiserror::Error, Debug)]
pub enum SbenchError {
  #[error("Tables Error: {0}")]
  TablesError(#[from] tables::TablesError),
  #[error("Template Error: {0}")]
  TemplateError(#[from] templates::TemplateError),
  #[error("Storage Error: {0}")]
  StorageError(#[from] database::StorageError),
  #[error("Settings Error: {0}")]
  SettingsError(#[from] settings::SettingsError),
  #[error("Ingest Error: {0}")]
  IngestError(#[from] collect::IngestError),
  #[error("Base directory {0:?} does not exist")]
  MissingBaseDirectory(PathBuf),
}

/// What `generate` was asked for on the command line. `None` falls back to the settings.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
  pub directory: PathBuf,
  pub tests: Option<Vec<String>>,
  pub clusters: Option<Vec<String>>,
  pub runner_args: Vec<String>,
  pub dry_run: bool,
  pub tables: Option<PathBuf>,
  pub templates: Option<PathBuf>,
  pub memory_formula: Option<MemoryBudget>,
}

/// Entry point wiring settings, tables, templates and registries together.
pub struct Sbench {
  settings: Settings,
}

impl Sbench {
  pub fn new(settings: Settings) -> Self {
    Sbench { settings }
  }

  /// Tables and templates are loaded and cross-checked before any directory is created.
  pub fn generate(&self, options: &GenerateOptions) -> Result<GenerationReport, SbenchError> {
    let tables = match options.tables.as_ref().or(self.settings.tables.as_ref()) {
      Some(path) => Tables::from_file(path)?,
      None => Tables::builtin()?,
    };
    let templates = match options.templates.as_ref().or(self.settings.templates.as_ref()) {
      Some(dir) => Templates::builtin().with_overrides(dir)?,
      None => Templates::builtin(),
    };
    tables.validate(&templates)?;

    if !options.directory.is_dir() {
      return Err(SbenchError::MissingBaseDirectory(options.directory.clone()));
    }

    let budget = options.memory_formula.unwrap_or(self.settings.memory_formula);
    let preparators = Preparators::builtin(budget);
    let dry_run = VirtualScheduler::new();
    let scheduler: &dyn SchedulerTrait = if options.dry_run {
      &dry_run
    } else {
      &SlurmScheduler
    };

    let mut scheduler_args = self.settings.scheduler_args.clone();
    scheduler_args.extend(options.runner_args.iter().cloned());
    debug!("Scheduler arguments: {:?}", scheduler_args);

    let request = GenerateRequest {
      directory: options.directory.clone(),
      tests: options.tests.clone(),
      clusters: options.clusters.clone(),
      scheduler_args,
    };
    let generator = Generator::new(&tables, &templates, &preparators, scheduler);
    let report = generator.generate(&request)?;
    if options.dry_run {
      info!("Dry run: {} scripts left unsubmitted", dry_run.submitted().len());
    }
    Ok(report)
  }

  /// Ingest every run directory under `directory` into the database at `db`
  /// (or the configured one).
  pub fn collect(&self, directory: &Path, db: Option<&Path>) -> Result<CollectReport, SbenchError> {
    let path = match db {
      Some(path) => path.to_path_buf(),
      None => self.settings.database_path()?,
    };
    let mut database = Database::open_path(&path)?;
    let parsers = Parsers::builtin();
    Ok(Collector::new(&parsers).collect(&mut database, directory)?)
  }
}
