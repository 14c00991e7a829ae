mod hpl;
mod osu;


use std::collections::HashMap;

use diesel::SqliteConnection;
use thiserror::Error;

use crate::core::database::models::{
  Job, OsuAllreduce, OsuAlltoall, OsuBandwidth, OsuBiBandwidth, OsuLatency,
};

pub use hpl::{HplParser, parse_hpl_line};
pub use osu::{IntAndFloatParser, parse_int_and_float};

#[derive(Error, Debug)]
pub enum ParseError {
  #[error("Database Error: {0}")]
  DatabaseError(#[from] diesel::result::Error),
}

/// Rows written (and rows already present) while ingesting one output file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParseStats {
  pub inserted: usize,
  pub duplicates: usize,
}

impl ParseStats {
  fn record(&mut self, already_present: bool) {
    if already_present {
      self.duplicates += 1;
    } else {
      self.inserted += 1;
    }
  }
}

/// Turns the text output of one benchmark run into metric rows attached to `job`.
/// Lines that do not look like results are ignored.
pub trait OutputParser {
  fn ingest(
    &self,
    conn: &mut SqliteConnection,
    job: &Job,
    output: &str,
  ) -> Result<ParseStats, ParseError>;
}

/// Benchmark name to output parser.
#[derive(Default)]
pub struct Parsers {
  table: HashMap<String, Box<dyn OutputParser>>,
}

impl Parsers {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn builtin() -> Self {
    let mut parsers = Self::empty();
    parsers.register("osu_latency", Box::new(IntAndFloatParser::<OsuLatency>::new()));
    parsers.register("osu_bw", Box::new(IntAndFloatParser::<OsuBandwidth>::new()));
    parsers.register("osu_bibw", Box::new(IntAndFloatParser::<OsuBiBandwidth>::new()));
    parsers.register("osu_alltoall", Box::new(IntAndFloatParser::<OsuAlltoall>::new()));
    parsers.register("osu_allreduce", Box::new(IntAndFloatParser::<OsuAllreduce>::new()));
    parsers.register("hpl", Box::new(HplParser));
    parsers
  }

  pub fn register(&mut self, benchmark: &str, parser: Box<dyn OutputParser>) {
    self.table.insert(benchmark.to_string(), parser);
  }

  pub fn get(&self, benchmark: &str) -> Option<&dyn OutputParser> {
    self.table.get(benchmark).map(|p| p.as_ref())
  }
}
