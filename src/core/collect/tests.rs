use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde_json::json;
use tempfile::TempDir;

use crate::core::collect::metadata::*;
use crate::core::collect::*;
use crate::core::context::{RunContext, write_manifest};
use crate::core::database::Database;
use crate::core::parsers::Parsers;

const ENVIRONMENT: &str = "\
HOME=/home/bench
SLURM_NODELIST=r01-node[1-2]
SLURM_NNODES=2
SLURM_CLUSTER_NAME=deneb
SLURM_NTASKS=4
SPACK_TARGET_TYPE=ivybridge
SLURM_NODELIST=ignored
";

fn manifest(name: &str) -> RunContext {
  let mut context = RunContext::new();
  context.set("name", name);
  context.set("cluster", "deneb");
  context.set("compiler", "intel/18.0.2");
  context.set("mpi", "intel-mpi");
  context.set("nnodes", 2);
  context.set("ntasks", 4);
  context.set("blas", "intel-mkl");
  context.set("extra_directives", json!([]));
  context
}

/// Lay out a finished run directory as the batch script leaves it.
fn finished_run(directory: &Path, name: &str, jobid: u64, output: &str) {
  fs::create_dir_all(directory).unwrap();
  write_manifest(directory, &manifest(name)).unwrap();
  fs::write(directory.join("slurm_batch.sh"), "#!/bin/bash\n").unwrap();
  fs::write(directory.join(format!("run.{}.out", jobid)), output).unwrap();
  fs::write(directory.join(format!("run.{}.err", jobid)), "").unwrap();
  fs::write(directory.join(format!("run.{}.env", jobid)), ENVIRONMENT).unwrap();
  fs::write(
    directory.join(format!("run.{}.start", jobid)),
    "Fri, 01 Mar 2019 12:00:00 +0100\n",
  )
  .unwrap();
  fs::write(
    directory.join(format!("run.{}.finished", jobid)),
    "Fri, 01 Mar 2019 12:10:30 +0100\n",
  )
  .unwrap();
}

fn counts(db: &mut Database) -> Vec<(&'static str, i64)> {
  db.table_counts().unwrap()
}

fn count(db: &mut Database, table: &str) -> i64 {
  counts(db)
    .into_iter()
    .find(|(name, _)| *name == table)
    .unwrap()
    .1
}

#[test]
fn environment_scan() {
  let info = scan_environment(ENVIRONMENT).unwrap();
  assert_eq!(
    info,
    EnvironmentInfo {
      nodelist: "r01-node[1-2]".to_string(),
      cluster: "deneb".to_string(),
      nnodes: 2,
      ntasks: 4,
      target: "ivybridge".to_string(),
    }
  );

  let err = scan_environment("SLURM_NNODES=2\nXSLURM_NTASKS=4\n").unwrap_err();
  match err {
    ExtractError::MissingVariables(missing) => assert_eq!(
      missing,
      vec![
        "SLURM_NODELIST",
        "SLURM_CLUSTER_NAME",
        "SLURM_NTASKS",
        "SPACK_TARGET_TYPE"
      ]
    ),
    other => panic!("unexpected error {:?}", other),
  }

  let text = ENVIRONMENT.replace("SLURM_NTASKS=4", "SLURM_NTASKS=four");
  assert!(matches!(
    scan_environment(&text),
    Err(ExtractError::InvalidNumber("SLURM_NTASKS", _))
  ));
}

#[test]
fn date_markers_are_stored_as_utc() {
  let dir = TempDir::new().unwrap();
  let path = dir.path().join("run.1.start");
  fs::write(&path, "Fri, 01 Mar 2019 12:00:00 +0100\n").unwrap();
  let expected = NaiveDate::from_ymd_opt(2019, 3, 1)
    .unwrap()
    .and_hms_opt(11, 0, 0)
    .unwrap();
  assert_eq!(read_date_file(&path).unwrap(), expected);

  fs::write(&path, "2019-03-01 12:00:00").unwrap();
  assert!(matches!(
    read_date_file(&path),
    Err(ExtractError::InvalidDate(_, _))
  ));
}

#[test]
fn artifacts_are_discovered_by_extension() {
  let dir = TempDir::new().unwrap();
  finished_run(dir.path(), "osu_latency", 4242, "");
  let artifacts = JobArtifacts::discover(dir.path()).unwrap();
  assert_eq!(artifacts.output, dir.path().join("run.4242.out"));
  assert_eq!(artifacts.job_id().unwrap(), 4242);

  fs::write(dir.path().join("run.4243.out"), "").unwrap();
  assert!(matches!(
    JobArtifacts::discover(dir.path()),
    Err(ExtractError::DuplicateArtifact("out", files)) if files.len() == 2
  ));

  fs::remove_file(dir.path().join("run.4243.out")).unwrap();
  fs::remove_file(dir.path().join("run.4242.env")).unwrap();
  assert!(matches!(
    JobArtifacts::discover(dir.path()),
    Err(ExtractError::MissingArtifact("env"))
  ));
}

#[test]
fn only_leaf_directories_with_manifest_are_runs() {
  let dir = TempDir::new().unwrap();
  finished_run(&dir.path().join("b"), "osu_bw", 2, "");
  finished_run(&dir.path().join("a"), "osu_bw", 1, "");
  // A manifest above another run is not a leaf
  finished_run(&dir.path().join("c"), "osu_bw", 3, "");
  finished_run(&dir.path().join("c").join("inner"), "osu_bw", 4, "");
  fs::create_dir_all(dir.path().join("empty")).unwrap();

  let found = find_run_directories(dir.path()).unwrap();
  assert_eq!(
    found,
    vec![
      dir.path().join("a"),
      dir.path().join("b"),
      dir.path().join("c").join("inner"),
    ]
  );

  assert!(matches!(
    find_run_directories(&dir.path().join("missing")),
    Err(IngestError::NotADirectory(_))
  ));
}

#[test]
fn collect_twice_changes_nothing() {
  let dir = TempDir::new().unwrap();
  finished_run(
    &dir.path().join("run-a"),
    "osu_latency",
    100,
    "# Size Latency (us)\n1 0.25\n1024 12.34\n1024 12.34\n",
  );
  finished_run(&dir.path().join("run-b"), "osu_bw", 101, "4096 9000.0\n");

  let parsers = Parsers::builtin();
  let collector = Collector::new(&parsers);
  let mut db = Database::open(":memory:").unwrap();

  let report = collector.collect(&mut db, dir.path()).unwrap();
  assert_eq!(report.ingested.len(), 2);
  assert!(report.skipped.is_empty());
  assert!(report.failed.is_empty());
  assert_eq!(report.rows_inserted(), 3);
  assert_eq!(report.rows_duplicated(), 1);
  let first = counts(&mut db);

  let again = collector.collect(&mut db, dir.path()).unwrap();
  assert_eq!(again.rows_inserted(), 0);
  assert_eq!(again.rows_duplicated(), 4);
  assert_eq!(counts(&mut db), first);

  let jobs = db.jobs().unwrap();
  assert_eq!(jobs.len(), 2);
  let job = &jobs[0];
  assert_eq!(job.id, 100);
  assert_eq!(job.cluster, "deneb");
  assert_eq!(job.target, "ivybridge");
  assert_eq!(job.compiler, "intel/18.0.2");
  assert_eq!(job.lapack.as_deref(), Some("intel-mkl"));
  assert_eq!(job.python, None);
  assert_eq!((job.nnodes, job.ntasks), (2, 4));
  assert_eq!(job.finish - job.start, chrono::Duration::seconds(630));
  assert_eq!(job.root, dir.path().join("run-a").to_string_lossy());
}

#[test]
fn same_job_in_two_directories_is_one_row() {
  let dir = TempDir::new().unwrap();
  finished_run(&dir.path().join("one"), "osu_latency", 7, "8 1.5\n");
  finished_run(&dir.path().join("two"), "osu_latency", 7, "16 1.7\n");

  let parsers = Parsers::builtin();
  let mut db = Database::open(":memory:").unwrap();
  let report = Collector::new(&parsers).collect(&mut db, dir.path()).unwrap();

  assert_eq!(report.ingested.len(), 2);
  assert_eq!(count(&mut db, "jobs"), 1);
  assert_eq!(count(&mut db, "osu_latency"), 2);
  // The first directory seen owns the row
  assert_eq!(
    db.jobs().unwrap()[0].root,
    dir.path().join("one").to_string_lossy()
  );
}

#[test]
fn unfinished_run_fails_without_job_row() {
  let dir = TempDir::new().unwrap();
  let run = dir.path().join("running");
  finished_run(&run, "osu_latency", 9, "8 1.5\n");
  fs::remove_file(run.join("run.9.finished")).unwrap();

  let parsers = Parsers::builtin();
  let mut db = Database::open(":memory:").unwrap();
  let report = Collector::new(&parsers).collect(&mut db, dir.path()).unwrap();

  assert!(report.ingested.is_empty());
  assert_eq!(report.failed.len(), 1);
  assert_eq!(report.failed[0].0, run);
  assert!(matches!(
    report.failed[0].1,
    IngestError::ExtractError(ExtractError::MissingArtifact("finished"))
  ));
  assert!(counts(&mut db).iter().all(|(_, n)| *n == 0));
}

#[test]
fn bad_date_rolls_back_the_whole_directory() {
  let dir = TempDir::new().unwrap();
  let run = dir.path().join("garbled");
  finished_run(&run, "osu_latency", 10, "8 1.5\n");
  fs::write(run.join("run.10.finished"), "not a date\n").unwrap();
  finished_run(&dir.path().join("good"), "osu_latency", 11, "8 1.5\n");

  let parsers = Parsers::builtin();
  let mut db = Database::open(":memory:").unwrap();
  let report = Collector::new(&parsers).collect(&mut db, dir.path()).unwrap();

  assert_eq!(report.failed.len(), 1);
  assert_eq!(report.ingested.len(), 1);
  assert_eq!(report.ingested[0].jobid, 11);
  assert_eq!(count(&mut db, "jobs"), 1);
  assert_eq!(count(&mut db, "osu_latency"), 1);
}

#[test]
fn unsupported_and_broken_manifests_are_skipped() {
  let dir = TempDir::new().unwrap();
  finished_run(&dir.path().join("stream"), "stream", 20, "8 1.5\n");
  let broken = dir.path().join("broken");
  finished_run(&broken, "osu_latency", 21, "8 1.5\n");
  fs::write(broken.join("context.json"), "{\"name\": \"osu_latency\"").unwrap();

  let parsers = Parsers::builtin();
  let mut db = Database::open(":memory:").unwrap();
  let report = Collector::new(&parsers).collect(&mut db, dir.path()).unwrap();

  assert!(report.ingested.is_empty());
  assert!(report.failed.is_empty());
  assert_eq!(report.skipped.len(), 2);
  assert!(matches!(&report.skipped[0], (path, SkipReason::Manifest(_)) if *path == broken));
  assert!(matches!(&report.skipped[1], (_, SkipReason::Unsupported(name)) if name == "stream"));
  assert!(counts(&mut db).iter().all(|(_, n)| *n == 0));
}
