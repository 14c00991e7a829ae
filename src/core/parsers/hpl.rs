use diesel::SqliteConnection;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::{
  database::models::{HplRow, Job},
  parsers::{OutputParser, ParseError, ParseStats},
};

// T/V  N  NB  P  Q  Time  Gflops
static RESULT_RE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r"^(W[A-Z0-9]+)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+(?:\.\d*)?)\s+(\d+(?:\.\d*)?(?:[eE][+-]?\d+)?)\s*$",
  )
  .unwrap()
});

/// Row described by one line of the HPL summary table, keyed to `job`.
pub fn parse_hpl_line(job: &Job, line: &str) -> Option<HplRow> {
  let caps = RESULT_RE.captures(line)?;
  Some(HplRow {
    cluster: job.cluster.clone(),
    jobid: job.id,
    variant: caps[1].to_string(),
    n: caps[2].parse().ok()?,
    nb: caps[3].parse().ok()?,
    p: caps[4].parse().ok()?,
    q: caps[5].parse().ok()?,
    time: caps[6].parse().ok()?,
    gflops: caps[7].parse().ok()?,
  })
}

pub struct HplParser;

impl OutputParser for HplParser {
  fn ingest(
    &self,
    conn: &mut SqliteConnection,
    job: &Job,
    output: &str,
  ) -> Result<ParseStats, ParseError> {
    let mut stats = ParseStats::default();
    for row in output.lines().filter_map(|line| parse_hpl_line(job, line)) {
      let present = row.exists(conn)?;
      if !present {
        row.insert(conn)?;
      }
      stats.record(present);
    }
    debug!(
      "hpl: {} rows inserted, {} already present for job {} on {}",
      stats.inserted, stats.duplicates, job.id, job.cluster
    );
    Ok(stats)
  }
}
