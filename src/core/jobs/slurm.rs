use std::{path::Path, process::Command};

use log::debug;

use super::{JobError, SchedulerTrait};

/// Submits through `sbatch --parsable`, which prints `<id>[;<cluster>]`.
pub struct SlurmScheduler;

impl SchedulerTrait for SlurmScheduler {
  fn submit(&self, script: &Path, extra_args: &[String]) -> Result<Option<String>, JobError> {
    let mut command = Command::new("sbatch");
    command.arg("--parsable").args(extra_args).arg(script);
    if let Some(directory) = script.parent() {
      command.current_dir(directory);
    }
    debug!("Running {:?}", command);

    let output = command
      .output()
      .map_err(|e| JobError::SpawnError(format!("Failed to run sbatch: {}", e)))?;
    if !output.status.success() {
      return Err(JobError::SubmissionFailed(format!(
        "sbatch exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
      )));
    }

    Ok(parse_job_id(&String::from_utf8_lossy(&output.stdout)))
  }
}

pub fn parse_job_id(stdout: &str) -> Option<String> {
  stdout
    .trim()
    .split(';')
    .next()
    .filter(|id| !id.is_empty())
    .map(str::to_string)
}
