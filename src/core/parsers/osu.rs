use std::marker::PhantomData;

use diesel::SqliteConnection;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::{
  database::models::{Job, SizedMetric},
  parsers::{OutputParser, ParseError, ParseStats},
};

// "<size> <value>", as printed by the OSU micro-benchmarks
static LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\s*([\d.]+)$").unwrap());

/// Size and measurement of one result line, if the line is one.
pub fn parse_int_and_float(line: &str) -> Option<(i64, f64)> {
  let caps = LINE_RE.captures(line.trim_end())?;
  let size = caps[1].parse().ok()?;
  let value = caps[2].parse().ok()?;
  Some((size, value))
}

/// Parser for every OSU benchmark printing one `<size> <value>` pair per line.
/// `R` picks the table the pairs go to.
pub struct IntAndFloatParser<R> {
  row: PhantomData<R>,
}

impl<R> IntAndFloatParser<R> {
  pub fn new() -> Self {
    IntAndFloatParser { row: PhantomData }
  }
}

impl<R: SizedMetric> OutputParser for IntAndFloatParser<R> {
  fn ingest(
    &self,
    conn: &mut SqliteConnection,
    job: &Job,
    output: &str,
  ) -> Result<ParseStats, ParseError> {
    let mut stats = ParseStats::default();
    for (size, value) in output.lines().filter_map(parse_int_and_float) {
      let present = R::exists(conn, &job.cluster, job.id, size)?;
      if !present {
        R::insert(conn, &job.cluster, job.id, size, value)?;
      }
      stats.record(present);
    }
    debug!(
      "{}: {} rows inserted, {} already present for job {} on {}",
      R::TABLE,
      stats.inserted,
      stats.duplicates,
      job.id,
      job.cluster
    );
    Ok(stats)
  }
}
