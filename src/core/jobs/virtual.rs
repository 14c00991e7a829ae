use std::{cell::RefCell, path::Path};

use log::info;

use super::{JobError, SchedulerTrait};

/// Dry-run scheduler: remembers what would have been submitted.
#[derive(Debug, Default)]
pub struct VirtualScheduler {
  submitted: RefCell<Vec<(String, Vec<String>)>>,
}

impl VirtualScheduler {
  pub fn new() -> Self {
    Self::default()
  }

  /// Scripts seen so far, with the arguments they would have been submitted with.
  pub fn submitted(&self) -> Vec<(String, Vec<String>)> {
    self.submitted.borrow().clone()
  }
}

impl SchedulerTrait for VirtualScheduler {
  fn submit(&self, script: &Path, extra_args: &[String]) -> Result<Option<String>, JobError> {
    info!(
      "Dry run: would submit {:?} with sbatch --parsable {}",
      script,
      extra_args.join(" ")
    );
    self
      .submitted
      .borrow_mut()
      .push((script.to_string_lossy().into_owned(), extra_args.to_vec()));
    Ok(None)
  }
}
