use std::fs;
use std::path::Path;

use serde_json::json;
use tempfile::TempDir;

use crate::core::context::{RunContext, read_manifest};
use crate::core::jobs::slurm::parse_job_id;
use crate::core::jobs::*;
use crate::core::preparators::{MemoryBudget, PrepareEnv, PrepareError, Preparator, Preparators};
use crate::core::tables::Tables;
use crate::core::templates::Templates;

struct FailingPreparator;

impl Preparator for FailingPreparator {
  fn prepare(&self, _env: &PrepareEnv, _context: &mut RunContext) -> Result<(), PrepareError> {
    Err(PrepareError::NoMemoryTier("nowhere".to_string()))
  }
}

fn request(dir: &TempDir, tests: &[&str], clusters: &[&str]) -> GenerateRequest {
  GenerateRequest {
    directory: dir.path().to_path_buf(),
    tests: Some(tests.iter().map(|s| s.to_string()).collect()),
    clusters: Some(clusters.iter().map(|s| s.to_string()).collect()),
    scheduler_args: vec!["--account=bench".to_string()],
  }
}

fn run_directories(dir: &Path) -> Vec<std::path::PathBuf> {
  fs::read_dir(dir)
    .unwrap()
    .map(|entry| entry.unwrap().path())
    .filter(|path| path.is_dir())
    .collect()
}

#[test]
fn matrix_size_matches_tables() {
  let dir = TempDir::new().unwrap();
  let tables = Tables::builtin().unwrap();
  let templates = Templates::builtin();
  let preparators = Preparators::builtin(MemoryBudget::default());
  let scheduler = VirtualScheduler::new();
  let generator = Generator::new(&tables, &templates, &preparators, &scheduler);

  // 5 stacks × (2 configurations of osu_bw + 1 of hpl)
  let report = generator
    .generate(&request(&dir, &["osu_bw", "hpl"], &["deneb"]))
    .unwrap();

  assert!(report.is_success());
  assert_eq!(report.created.len(), 15);
  assert_eq!(report.submitted, 15);
  assert_eq!(run_directories(dir.path()).len(), 15);

  let submitted = scheduler.submitted();
  assert_eq!(submitted.len(), 15);
  assert!(submitted.iter().all(|(script, args)| {
    script.ends_with(SCRIPT_FILE) && args == &vec!["--account=bench".to_string()]
  }));
}

#[test]
fn run_directory_contents() {
  let dir = TempDir::new().unwrap();
  let tables = Tables::builtin().unwrap();
  let templates = Templates::builtin();
  let preparators = Preparators::builtin(MemoryBudget::default());
  let scheduler = VirtualScheduler::new();
  let generator = Generator::new(&tables, &templates, &preparators, &scheduler);

  let report = generator
    .generate(&request(&dir, &["hpl"], &["deneb"]))
    .unwrap();
  assert_eq!(report.created.len(), 5);

  for directory in &report.created {
    assert!(directory.join(SCRIPT_FILE).is_file());
    assert!(directory.join("HPL.dat").is_file());

    let context = read_manifest(directory).unwrap();
    assert_eq!(context.get_str("cluster"), Some("deneb"));
    assert_eq!(context.get_str("target"), Some("E5v2"));
    assert_eq!(context.ntasks().unwrap(), Some(32));
    assert_eq!(context.get("P"), Some(&json!(4)));
    assert_eq!(context.get("Q"), Some(&json!(8)));
    assert_eq!(
      context.get_str("test_directory"),
      Some(directory.to_string_lossy().as_ref())
    );

    let script = fs::read_to_string(directory.join(SCRIPT_FILE)).unwrap();
    assert!(script.contains("#SBATCH --ntasks=32\n"));
    assert!(script.contains("#SBATCH --time 1:0:0\n"));
    assert!(script.contains("srun xhpl"));
  }

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    let mode = fs::metadata(report.created[0].join(SCRIPT_FILE))
      .unwrap()
      .permissions()
      .mode();
    assert_eq!(mode & 0o111, 0o111);
  }
}

#[test]
fn null_task_count_uses_every_core() {
  let dir = TempDir::new().unwrap();
  let tables = Tables::builtin().unwrap();
  let templates = Templates::builtin();
  let preparators = Preparators::empty();
  let scheduler = VirtualScheduler::new();
  let generator = Generator::new(&tables, &templates, &preparators, &scheduler);

  let report = generator
    .generate(&request(&dir, &["osu_alltoall"], &["fidis"]))
    .unwrap();
  let mut tasks: Vec<u32> = report
    .created
    .iter()
    .map(|directory| read_manifest(directory).unwrap().ntasks().unwrap().unwrap())
    .collect();
  tasks.sort();
  tasks.dedup();
  assert_eq!(tasks, vec![28, 56]);
}

#[test]
fn unknown_benchmark_creates_nothing() {
  let dir = TempDir::new().unwrap();
  let tables = Tables::builtin().unwrap();
  let templates = Templates::builtin();
  let preparators = Preparators::empty();
  let scheduler = VirtualScheduler::new();
  let generator = Generator::new(&tables, &templates, &preparators, &scheduler);

  let err = generator
    .generate(&request(&dir, &["osu_bw", "osu_nonexistent"], &["deneb"]))
    .unwrap_err();
  assert!(err.to_string().contains("osu_nonexistent"));
  assert!(run_directories(dir.path()).is_empty());
  assert!(scheduler.submitted().is_empty());

  let err = generator
    .generate(&request(&dir, &["osu_bw"], &["andromeda"]))
    .unwrap_err();
  assert!(err.to_string().contains("andromeda"));
  assert!(run_directories(dir.path()).is_empty());
}

#[test]
fn failing_leaf_does_not_stop_the_matrix() {
  let dir = TempDir::new().unwrap();
  let tables = Tables::builtin().unwrap();
  let templates = Templates::builtin();
  let mut preparators = Preparators::empty();
  preparators.register("osu_latency", Box::new(FailingPreparator));
  let scheduler = VirtualScheduler::new();
  let generator = Generator::new(&tables, &templates, &preparators, &scheduler);

  let report = generator
    .generate(&request(&dir, &["osu_latency", "osu_bw"], &["eltanin"]))
    .unwrap();

  assert!(!report.is_success());
  assert_eq!(report.created.len(), 20);
  assert_eq!(report.failures.len(), 10);
  assert_eq!(report.submitted, 10);
  assert!(report.failures.iter().all(|f| f.benchmark == "osu_latency"
    && matches!(f.error, JobError::PrepareError(_))
    && !f.directory.join(SCRIPT_FILE).exists()));
}

#[test]
fn missing_base_directory_fails_every_leaf() {
  let dir = TempDir::new().unwrap();
  let tables = Tables::builtin().unwrap();
  let templates = Templates::builtin();
  let preparators = Preparators::empty();
  let scheduler = VirtualScheduler::new();
  let generator = Generator::new(&tables, &templates, &preparators, &scheduler);

  let mut request = request(&dir, &["osu_allreduce"], &["gacrux"]);
  request.directory = dir.path().join("absent");
  let report = generator.generate(&request).unwrap();
  assert!(report.created.is_empty());
  assert_eq!(report.failures.len(), 10);
  assert!(matches!(report.failures[0].error, JobError::IoError(_)));
}

#[test]
fn sbatch_output_yields_job_id() {
  assert_eq!(parse_job_id("123456\n"), Some("123456".to_string()));
  assert_eq!(parse_job_id("98;fidis\n"), Some("98".to_string()));
  assert_eq!(parse_job_id("  \n"), None);
}
