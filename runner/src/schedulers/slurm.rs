use super::{command_line, JobOutcome, Scheduler};
use crate::jobscript::JobDescriptor;
use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, error, info, instrument, warn};
use tracing_unwrap::ResultExt;

static JOB_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Submitted\s+batch\s+job\s*(\S+)").unwrap_or_log());
static STATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"State:\s*(\S+)").unwrap_or_log());

pub fn parse_job_id(output: &str) -> Option<String> {
    JOB_ID
        .captures(output)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_owned())
}

pub fn parse_state(output: &str) -> Option<String> {
    STATE
        .captures(output)
        .and_then(|captures| captures.get(1))
        .map(|state| state.as_str().to_owned())
}

/// Submits job scripts with `sbatch --wait`
#[derive(Debug, Clone)]
pub struct SlurmScheduler {
    sbatch: String,
    sacct: Option<String>,
    log_name: String,
}

impl SlurmScheduler {
    pub fn new(sbatch: &str, sacct: Option<&str>, log_name: &str) -> Self {
        Self {
            sbatch: sbatch.to_owned(),
            sacct: sacct.map(str::to_owned),
            log_name: log_name.to_owned(),
        }
    }

    fn state_from_accounting(&self, job_id: &str) -> Option<String> {
        let (program, args) = command_line(self.sacct.as_deref()?)?;

        match Command::new(program)
            .args(args)
            .args(["-j", job_id, "-n", "-X", "-P", "-o", "State"])
            .output()
        {
            Ok(output) => String::from_utf8_lossy(&output.stdout)
                .split_whitespace()
                .next()
                .map(str::to_owned),
            Err(error) => {
                warn!(error = ?error, "Failed to query {program} for job {job_id}");
                None
            }
        }
    }
}

impl Scheduler for SlurmScheduler {
    #[instrument(skip(self, descriptor), fields(script = ?descriptor.path), level = "debug")]
    fn submit(&self, descriptor: &JobDescriptor, workspace: &Path) -> JobOutcome {
        let Some((program, args)) = command_line(&self.sbatch) else {
            error!("scheduler.sbatch is empty");
            return JobOutcome::unknown(workspace);
        };

        let output = match Command::new(program)
            .args(args)
            .arg("--wait")
            .arg(&descriptor.path)
            .current_dir(workspace)
            .output()
        {
            Ok(output) => output,
            Err(error) => {
                error!(error = ?error, "Failed to run {program}");
                return JobOutcome::unknown(workspace);
            }
        };

        let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
        log.push_str(&String::from_utf8_lossy(&output.stderr));

        let log_path = workspace.join(&self.log_name);
        if let Err(error) = fs::write(&log_path, &log) {
            warn!(error = ?error, "Failed to write submission log {log_path:?}");
        }

        let Some(job_id) = parse_job_id(&log) else {
            warn!("No job id in the response of {program}: {}", log.trim());
            return JobOutcome::unknown(workspace);
        };
        info!("Job {job_id} finished");

        let terminal_state = match fs::read_to_string(self.artifact_path(workspace, &job_id)) {
            Ok(content) => parse_state(&content),
            Err(error) => {
                debug!(error = ?error, "Job output of {job_id} is not readable yet");
                None
            }
        }
        .or_else(|| self.state_from_accounting(&job_id));

        JobOutcome {
            job_id: Some(job_id),
            terminal_state,
            workspace: workspace.to_path_buf(),
        }
    }

    fn artifact_path(&self, workspace: &Path, job_id: &str) -> PathBuf {
        workspace.join(format!("slurm-{job_id}.out"))
    }
}
