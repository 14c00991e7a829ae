mod hpl;


use std::{collections::HashMap, path::Path};

use thiserror::Error;

use crate::core::{
  context::{ContextError, RunContext},
  tables::ClusterSpec,
  templates::{Renderer, TemplateError},
};

pub use hpl::{HplPreparator, MemoryBudget, math_library, process_grid};

#[derive(Error, Debug)]
pub enum PrepareError {
  #[error("IO Error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Context Error: {0}")]
  ContextError(#[from] ContextError),
  #[error("Template Error: {0}")]
  TemplateError(#[from] TemplateError),
  #[error("Cluster '{0}' has no memory tier")]
  NoMemoryTier(String),
  #[error("Memory budget of {0} bytes is too small for block size {1}")]
  ProblemTooSmall(u64, u32),
}

/// What a preparator may look at besides the context it mutates.
pub struct PrepareEnv<'a> {
  pub directory: &'a Path,
  pub cluster: &'a ClusterSpec,
  pub renderer: &'a dyn Renderer,
}

/// Per-benchmark hook that derives extra parameters and writes input files
/// into the run directory before the submission script is rendered.
pub trait Preparator {
  fn prepare(&self, env: &PrepareEnv, context: &mut RunContext) -> Result<(), PrepareError>;
}

/// Benchmark name to preparator. Benchmarks without an entry need no preparation.
#[derive(Default)]
pub struct Preparators {
  table: HashMap<String, Box<dyn Preparator>>,
}

impl Preparators {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn builtin(budget: MemoryBudget) -> Self {
    let mut preparators = Self::empty();
    preparators.register("hpl", Box::new(HplPreparator::new(budget)));
    preparators
  }

  pub fn register(&mut self, benchmark: &str, preparator: Box<dyn Preparator>) {
    self.table.insert(benchmark.to_string(), preparator);
  }

  pub fn get(&self, benchmark: &str) -> Option<&dyn Preparator> {
    self.table.get(benchmark).map(|p| p.as_ref())
  }
}
