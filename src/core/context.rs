
use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// File name of the manifest persisted in every run directory.
pub const MANIFEST_FILE: &str = "context.json";

/// Keys the generator and the preparators agree on.
pub mod keys {
  pub const CLUSTER: &str = "cluster";
  pub const TARGET: &str = "target";
  pub const COMPILER: &str = "compiler";
  pub const MPI: &str = "mpi";
  pub const NAME: &str = "name";
  pub const TEST_TEMPLATE: &str = "test_template";
  pub const COMMAND: &str = "command";
  pub const SUBDIR: &str = "subdir";
  pub const NNODES: &str = "nnodes";
  pub const NTASKS: &str = "ntasks";
  pub const TEST_DIRECTORY: &str = "test_directory";
  pub const OUTPUT_FILE: &str = "output_file";
  pub const ERROR_FILE: &str = "error_file";
  pub const EXTRA_DIRECTIVES: &str = "extra_directives";
  pub const BLAS: &str = "blas";
  pub const PYTHON: &str = "python";

  /// Keys a manifest must carry to be ingested.
  pub const REQUIRED: [&str; 4] = [NAME, CLUSTER, COMPILER, MPI];
}

#[derive(Error, Debug)]
pub enum ContextError {
  #[error("IO Error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON Error: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("Manifest is missing required key '{0}'")]
  MissingKey(String),
  #[error("Value of '{0}' is not {1}")]
  WrongType(String, String),
}

/// Flat key/value bag describing one run, persisted as the manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunContext(Map<String, Value>);

impl RunContext {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set(&mut self, key: &str, value: impl Into<Value>) {
    self.0.insert(key.to_string(), value.into());
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.0.get(key)
  }

  pub fn get_str(&self, key: &str) -> Option<&str> {
    self.0.get(key).and_then(Value::as_str)
  }

  pub fn require_str(&self, key: &str) -> Result<&str, ContextError> {
    match self.0.get(key) {
      None | Some(Value::Null) => Err(ContextError::MissingKey(key.to_string())),
      Some(Value::String(s)) => Ok(s.as_str()),
      Some(_) => Err(ContextError::WrongType(key.to_string(), "a string".to_string())),
    }
  }

  fn optional_count(&self, key: &str) -> Result<Option<u32>, ContextError> {
    match self.0.get(key) {
      None | Some(Value::Null) => Ok(None),
      Some(value) => value
        .as_u64()
        .filter(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok())
        .map(Some)
        .ok_or_else(|| ContextError::WrongType(key.to_string(), "a positive integer".to_string())),
    }
  }

  pub fn nnodes(&self) -> Result<u32, ContextError> {
    self
      .optional_count(keys::NNODES)?
      .ok_or_else(|| ContextError::MissingKey(keys::NNODES.to_string()))
  }

  /// `None` until the task count has been derived.
  pub fn ntasks(&self) -> Result<Option<u32>, ContextError> {
    self.optional_count(keys::NTASKS)
  }

  fn check_required(&self) -> Result<(), ContextError> {
    for key in keys::REQUIRED {
      self.require_str(key)?;
    }
    Ok(())
  }
}

/// Write `context.json` into `directory`.
pub fn write_manifest(directory: &Path, context: &RunContext) -> Result<(), ContextError> {
  context.check_required()?;
  let text = serde_json::to_string_pretty(context)?;
  fs::write(directory.join(MANIFEST_FILE), text)?;
  Ok(())
}

/// Read `context.json` back from `directory`, checking the required keys.
pub fn read_manifest(directory: &Path) -> Result<RunContext, ContextError> {
  let text = fs::read_to_string(directory.join(MANIFEST_FILE))?;
  let context: RunContext = serde_json::from_str(&text)?;
  context.check_required()?;
  Ok(context)
}
