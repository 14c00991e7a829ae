
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::preparators::MemoryBudget;

const APP_NAME: &str = "sbench";
const CONFIG_NAME: &str = "config";
const DATABASE_FILE: &str = "benchmarks.db";

#[derive(Error, Debug)]
pub enum SettingsError {
  #[error("Settings Error: {0}")]
  ConfyError(#[from] confy::ConfyError),
  #[error("Could not determine a data directory for the database")]
  NoDataDir,
}

/// User defaults, stored with confy under `sbench/config`.
/// Command line options take precedence over every field.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
  pub database: Option<PathBuf>,
  pub tables: Option<PathBuf>,
  pub templates: Option<PathBuf>,
  pub memory_formula: MemoryBudget,
  /// Passed to every `sbatch` call, before the command line ones
  pub scheduler_args: Vec<String>,
}

impl Settings {
  /// Configured database, or `<data dir>/sbench/benchmarks.db`.
  pub fn database_path(&self) -> Result<PathBuf, SettingsError> {
    match &self.database {
      Some(path) => Ok(path.clone()),
      None => default_database_path(),
    }
  }
}

pub fn default_database_path() -> Result<PathBuf, SettingsError> {
  dirs::data_local_dir()
    .map(|dir| dir.join(APP_NAME).join(DATABASE_FILE))
    .ok_or(SettingsError::NoDataDir)
}

/// Load the user settings, creating the file with defaults on first use.
pub fn load_settings() -> Result<Settings, SettingsError> {
  Ok(confy::load(APP_NAME, CONFIG_NAME)?)
}

pub fn load_settings_from(path: &Path) -> Result<Settings, SettingsError> {
  Ok(confy::load_path(path)?)
}

pub fn store_settings_to(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
  confy::store_path(path, settings)?;
  Ok(())
}
