mod local;
mod slurm;

pub use local::LocalScheduler;
pub use slurm::SlurmScheduler;

use crate::{config::SchedulerConfig, jobscript::JobDescriptor};
use std::path::{Path, PathBuf};

/// Result of one blocking submission, missing values mean the scheduler did not tell us
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub job_id: Option<String>,
    pub terminal_state: Option<String>,
    pub workspace: PathBuf,
}

impl JobOutcome {
    pub fn unknown(workspace: &Path) -> Self {
        Self {
            job_id: None,
            terminal_state: None,
            workspace: workspace.to_path_buf(),
        }
    }
}

pub trait Scheduler {
    /// Submit the job with `workspace` as its working directory and block until it terminated.
    ///
    /// Failures never surface as errors, they leave the fields of the outcome empty.
    fn submit(&self, descriptor: &JobDescriptor, workspace: &Path) -> JobOutcome;

    /// file the job's output ends up in
    fn artifact_path(&self, workspace: &Path, job_id: &str) -> PathBuf;
}

/// Scheduler selected in the configuration
#[derive(Debug)]
pub enum Schedulers {
    Slurm(SlurmScheduler),
    Local(LocalScheduler),
}

impl Schedulers {
    pub fn load(config: &SchedulerConfig) -> Self {
        match config {
            SchedulerConfig::Slurm {
                sbatch,
                sacct,
                log_name,
            } => Self::Slurm(SlurmScheduler::new(sbatch, sacct.as_deref(), log_name)),
            SchedulerConfig::Local { shell, timeout } => {
                Self::Local(LocalScheduler::new(shell, *timeout))
            }
        }
    }
}

impl Scheduler for Schedulers {
    fn submit(&self, descriptor: &JobDescriptor, workspace: &Path) -> JobOutcome {
        match self {
            Self::Slurm(scheduler) => scheduler.submit(descriptor, workspace),
            Self::Local(scheduler) => scheduler.submit(descriptor, workspace),
        }
    }

    fn artifact_path(&self, workspace: &Path, job_id: &str) -> PathBuf {
        match self {
            Self::Slurm(scheduler) => scheduler.artifact_path(workspace, job_id),
            Self::Local(scheduler) => scheduler.artifact_path(workspace, job_id),
        }
    }
}

/// Split a configured command line into program and leading arguments
fn command_line(line: &str) -> Option<(&str, Vec<&str>)> {
    let mut parts = line.split_whitespace();
    let program = parts.next()?;

    Some((program, parts.collect()))
}
