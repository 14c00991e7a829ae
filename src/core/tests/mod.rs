use std::fs;

use tempfile::TempDir;

use crate::core::{
  GenerateOptions, Sbench, SbenchError,
  database::Database,
  preparators::MemoryBudget,
  settings::Settings,
};

fn dry_run(dir: &TempDir, tests: &[&str], clusters: &[&str]) -> GenerateOptions {
  GenerateOptions {
    directory: dir.path().to_path_buf(),
    tests: Some(tests.iter().map(|s| s.to_string()).collect()),
    clusters: Some(clusters.iter().map(|s| s.to_string()).collect()),
    dry_run: true,
    ..Default::default()
  }
}

#[test]
fn generate_then_collect() {
  let dir = TempDir::new().unwrap();
  let db_path = dir.path().join("db").join("benchmarks.db");
  let runs = TempDir::new().unwrap();
  let sbench = Sbench::new(Settings {
    database: Some(db_path.clone()),
    ..Default::default()
  });

  let report = sbench
    .generate(&dry_run(&runs, &["osu_latency"], &["helvetios"]))
    .unwrap();
  assert!(report.is_success());
  assert_eq!(report.created.len(), 10);

  // Nothing ran yet: every directory lacks its scheduler output
  let collected = sbench.collect(runs.path(), None).unwrap();
  assert!(collected.ingested.is_empty());
  assert_eq!(collected.failed.len(), 10);
  assert!(db_path.is_file());

  let mut db = Database::open_path(&db_path).unwrap();
  assert!(db.table_counts().unwrap().iter().all(|(_, n)| *n == 0));
}

#[test]
fn unknown_test_is_fatal() {
  let runs = TempDir::new().unwrap();
  let sbench = Sbench::new(Settings::default());
  let err = sbench
    .generate(&dry_run(&runs, &["osu_nonexistent"], &["deneb"]))
    .unwrap_err();
  assert!(matches!(err, SbenchError::TablesError(_)));
  assert!(err.to_string().contains("osu_nonexistent"));
  assert_eq!(fs::read_dir(runs.path()).unwrap().count(), 0);
}

#[test]
fn base_directory_must_exist() {
  let runs = TempDir::new().unwrap();
  let sbench = Sbench::new(Settings::default());
  let mut options = dry_run(&runs, &["osu_bw"], &["deneb"]);
  options.directory = runs.path().join("absent");
  assert!(matches!(
    sbench.generate(&options),
    Err(SbenchError::MissingBaseDirectory(_))
  ));
}

#[test]
fn overrides_come_from_options_then_settings() {
  let runs = TempDir::new().unwrap();
  let config = TempDir::new().unwrap();
  let tables = config.path().join("tables.yaml");
  fs::write(
    &tables,
    r#"
software_stacks:
  only:
    - { compiler: gcc/9.0.0, mpi: openmpi }
clusters:
  lab:
    ncores: 8
    mem: [4]
    softwares: only
benchmarks:
  hpl:
    template: slurm_hpl.sh
    subdir: "."
    command: xhpl
    configurations: [[1, null]]
"#,
  )
  .unwrap();
  let templates = config.path().join("templates");
  fs::create_dir(&templates).unwrap();
  fs::write(templates.join("slurm_hpl.sh"), "run {{ command }} with {{ blas }}\n").unwrap();

  let sbench = Sbench::new(Settings {
    tables: Some(tables),
    memory_formula: MemoryBudget::PercentOfTotal,
    ..Default::default()
  });
  let options = GenerateOptions {
    directory: runs.path().to_path_buf(),
    dry_run: true,
    templates: Some(templates),
    memory_formula: Some(MemoryBudget::QuadraticFootprint),
    ..Default::default()
  };
  let report = sbench.generate(&options).unwrap();
  assert_eq!(report.created.len(), 1);

  let directory = &report.created[0];
  let script = fs::read_to_string(directory.join("slurm_batch.sh")).unwrap();
  assert!(script.contains("run xhpl with openblas"));
  assert!(script.contains("#SBATCH --ntasks=8"));
  let manifest = fs::read_to_string(directory.join("context.json")).unwrap();
  assert!(manifest.contains("quadratic-footprint"));
}
