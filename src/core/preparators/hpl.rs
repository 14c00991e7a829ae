use std::fs;

use log::debug;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::core::{
  context::{RunContext, keys},
  preparators::{PrepareEnv, PrepareError, Preparator},
};

const BLOCK_SIZE: u32 = 256;
const MEMORY_PERCENT: u32 = 82;
const BYTES_PER_GIB: u64 = 1 << 30;
// Size of one double-precision matrix element
const ELEMENT_SIZE: f64 = 8.0;
const INPUT_TEMPLATE: &str = "HPL.dat";

/// How the usable memory turns into an HPL problem size.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, Display, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum MemoryBudget {
  /// Take a share of the total memory, then fit the largest square matrix in it.
  #[default]
  PercentOfTotal,
  /// Scale the side of the largest matrix fitting in the total memory.
  QuadraticFootprint,
}

impl MemoryBudget {
  /// Returns `(memory, n)`: the budget in bytes and the problem size,
  /// both rounded down to a multiple of the block size.
  pub fn size(&self, total: u64, block: u32) -> (u64, u64) {
    let ratio = MEMORY_PERCENT as f64 / 100.0;
    let block = block as f64;
    match self {
      MemoryBudget::PercentOfTotal => {
        let memory = ((ratio * total as f64) / block).floor() * block;
        let n = ((memory / ELEMENT_SIZE).sqrt() / block).floor() * block;
        (memory as u64, n as u64)
      }
      MemoryBudget::QuadraticFootprint => {
        let n = ((ratio * (total as f64 / ELEMENT_SIZE).sqrt()) / block).floor() * block;
        let n = n as u64;
        (8 * n * n, n)
      }
    }
  }
}

/// Split `ntasks` into a P×Q grid, P being the divisor closest to the square root
/// (the first one found wins).
pub fn process_grid(ntasks: u32) -> (u32, u32) {
  let root = (ntasks as f64).sqrt();
  let mut best = 1;
  let mut p = 1u32;
  while (p as u64) * (p as u64) <= ntasks as u64 {
    if ntasks % p == 0 && (p as f64 - root).abs() < (best as f64 - root).abs() {
      best = p;
    }
    p += 1;
  }
  (best, ntasks / best)
}

/// Math library module matching the compiler family.
pub fn math_library(compiler: &str) -> &'static str {
  if compiler.contains("intel") {
    "intel-mkl"
  } else {
    "openblas"
  }
}

/// Derives the compute grid and problem size, then writes `HPL.dat`.
pub struct HplPreparator {
  budget: MemoryBudget,
}

impl HplPreparator {
  pub fn new(budget: MemoryBudget) -> Self {
    HplPreparator { budget }
  }
}

impl Preparator for HplPreparator {
  fn prepare(&self, env: &PrepareEnv, context: &mut RunContext) -> Result<(), PrepareError> {
    let nnodes = context.nnodes()?;
    let ntasks = match context.ntasks()? {
      Some(ntasks) => ntasks,
      None => {
        let ntasks = env.cluster.ncores * nnodes;
        context.set(keys::NTASKS, ntasks);
        ntasks
      }
    };

    let (p, q) = process_grid(ntasks);

    let tier = env
      .cluster
      .min_memory_gib()
      .ok_or_else(|| PrepareError::NoMemoryTier(env.cluster.name.clone()))?;
    let total = tier as u64 * nnodes as u64 * BYTES_PER_GIB;
    let (memory, n) = self.budget.size(total, BLOCK_SIZE);
    if n == 0 {
      return Err(PrepareError::ProblemTooSmall(memory, BLOCK_SIZE));
    }

    let blas = math_library(context.require_str(keys::COMPILER)?);
    debug!(
      "HPL on {} nodes of {}: grid {}x{}, N={}, memory={} ({})",
      nnodes, env.cluster.name, p, q, n, memory, self.budget
    );

    context.set("P", p);
    context.set("Q", q);
    context.set("NB", BLOCK_SIZE);
    context.set("N", n);
    context.set("memory", memory);
    context.set("memory_percent", MEMORY_PERCENT);
    context.set("memory_formula", self.budget.to_string());
    context.set(keys::BLAS, blas);

    let input = env.renderer.render(INPUT_TEMPLATE, context)?;
    fs::write(env.directory.join(INPUT_TEMPLATE), input)?;
    Ok(())
  }
}
