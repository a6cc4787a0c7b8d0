use super::{command_line, JobOutcome, Scheduler};
use crate::jobscript::JobDescriptor;
use std::{
    fs::File,
    path::{Path, PathBuf},
    process::{self, Command, Stdio},
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};
use tracing::{debug, error, info, instrument, warn};
use wait_timeout::ChildExt;

/// Runs job scripts directly with a shell, without any batch system
#[derive(Debug)]
pub struct LocalScheduler {
    shell: String,
    timeout: Option<Duration>,
    counter: AtomicU64,
}

impl LocalScheduler {
    pub fn new(shell: &str, timeout: Option<u64>) -> Self {
        Self {
            shell: shell.to_owned(),
            timeout: timeout.map(Duration::from_secs),
            counter: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> String {
        format!(
            "{}.{}",
            process::id(),
            self.counter.fetch_add(1, Ordering::SeqCst) + 1
        )
    }
}

impl Scheduler for LocalScheduler {
    #[instrument(skip(self, descriptor), fields(script = ?descriptor.path), level = "debug")]
    fn submit(&self, descriptor: &JobDescriptor, workspace: &Path) -> JobOutcome {
        let Some((program, args)) = command_line(&self.shell) else {
            error!("scheduler.shell is empty");
            return JobOutcome::unknown(workspace);
        };

        let job_id = self.next_id();
        let artifact = self.artifact_path(workspace, &job_id);
        let (stdout, stderr) = match File::create(&artifact)
            .and_then(|file| Ok((file.try_clone()?, file)))
        {
            Ok(files) => files,
            Err(error) => {
                error!(error = ?error, "Failed to create job output {artifact:?}");
                return JobOutcome::unknown(workspace);
            }
        };

        let start = Instant::now();
        let mut child = match Command::new(program)
            .args(args)
            .arg(&descriptor.path)
            .current_dir(workspace)
            .env("SLURM_JOB_ID", &job_id)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
        {
            Ok(child) => child,
            Err(error) => {
                error!(error = ?error, "Failed to start {program}");
                return JobOutcome::unknown(workspace);
            }
        };

        let status = match self.timeout {
            Some(timeout) => child.wait_timeout(timeout),
            None => child.wait().map(Some),
        };

        let state = match status {
            Ok(Some(status)) if status.success() => "COMPLETED",
            Ok(Some(status)) => {
                debug!("Job {job_id} exited with {status}");
                "FAILED"
            }
            Ok(None) => {
                warn!("Job {job_id} ran into the timeout, killing it");
                if let Err(error) = child.kill().and_then(|_| child.wait()) {
                    error!(error = ?error, "Failed to kill job {job_id}");
                }
                "TIMEOUT"
            }
            Err(error) => {
                error!(error = ?error, "Failed to wait for job {job_id}");
                "FAILED"
            }
        };
        info!(
            "Job {job_id} finished in {:.3}s with {state}",
            start.elapsed().as_secs_f64()
        );

        JobOutcome {
            job_id: Some(job_id),
            terminal_state: Some(state.to_owned()),
            workspace: workspace.to_path_buf(),
        }
    }

    fn artifact_path(&self, workspace: &Path, job_id: &str) -> PathBuf {
        workspace.join(format!("local-{job_id}.out"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn job(workspace: &Path, body: &str) -> JobDescriptor {
        let path = workspace.join("job.sh");
        fs::write(&path, body).unwrap();

        JobDescriptor {
            path,
            postfix: String::new(),
        }
    }

    #[test]
    fn completed_job_writes_artifact() {
        let workspace = tempfile::tempdir().unwrap();
        let scheduler = LocalScheduler::new("sh", None);
        let descriptor = job(
            workspace.path(),
            "echo \"JOBID: ${SLURM_JOB_ID}\"\necho 'Time: 2.5' >&2\n",
        );

        let outcome = scheduler.submit(&descriptor, workspace.path());
        let job_id = outcome.job_id.unwrap();
        assert_eq!(outcome.terminal_state.as_deref(), Some("COMPLETED"));

        let output =
            fs::read_to_string(scheduler.artifact_path(workspace.path(), &job_id)).unwrap();
        assert!(output.contains(&format!("JOBID: {job_id}")));
        assert!(output.contains("Time: 2.5"));
    }

    #[test]
    fn ids_are_unique() {
        let workspace = tempfile::tempdir().unwrap();
        let scheduler = LocalScheduler::new("sh", None);
        let descriptor = job(workspace.path(), "true\n");

        let first = scheduler.submit(&descriptor, workspace.path());
        let second = scheduler.submit(&descriptor, workspace.path());
        assert_ne!(first.job_id, second.job_id);
    }

    #[test]
    fn runs_in_workspace() {
        let workspace = tempfile::tempdir().unwrap();
        let scheduler = LocalScheduler::new("sh", None);
        let descriptor = job(workspace.path(), "mkdir -p results\n");

        scheduler.submit(&descriptor, workspace.path());
        assert!(workspace.path().join("results").is_dir());
    }

    #[test]
    fn failed_and_timed_out_jobs() {
        let workspace = tempfile::tempdir().unwrap();

        let failing = job(workspace.path(), "exit 3\n");
        let outcome = LocalScheduler::new("sh", None).submit(&failing, workspace.path());
        assert_eq!(outcome.terminal_state.as_deref(), Some("FAILED"));

        let sleeping = job(workspace.path(), "sleep 10\n");
        let outcome = LocalScheduler::new("sh", Some(0)).submit(&sleeping, workspace.path());
        assert_eq!(outcome.terminal_state.as_deref(), Some("TIMEOUT"));
        assert!(outcome.job_id.is_some());
    }

    #[test]
    fn missing_shell() {
        let workspace = tempfile::tempdir().unwrap();
        let descriptor = job(workspace.path(), "true\n");

        let outcome =
            LocalScheduler::new("/does/not/exist/sh", None).submit(&descriptor, workspace.path());
        assert_eq!(outcome, JobOutcome::unknown(workspace.path()));
    }
}
