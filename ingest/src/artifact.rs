use crate::IngestError;
use std::{
    path::Path,
    thread,
    time::{Duration, Instant},
};
use tracing::debug;

/// Bounds for waiting on scheduler output that is written asynchronously to job completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub max_wait: Duration,
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(30),
            interval: Duration::from_millis(500),
        }
    }
}

/// Block until `path` exists as a file or `settings.max_wait` passed.
pub fn wait_for_artifact(path: &Path, settings: PollSettings) -> Result<(), IngestError> {
    let start = Instant::now();

    loop {
        if path.is_file() {
            return Ok(());
        }

        let elapsed = start.elapsed();
        if elapsed >= settings.max_wait {
            debug!(path = ?path, waited = ?elapsed, "Gave up waiting for artifact");

            return Err(IngestError::ArtifactTimeout(path.to_path_buf()));
        }

        thread::sleep(settings.interval.min(settings.max_wait - elapsed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn short() -> PollSettings {
        PollSettings {
            max_wait: Duration::from_millis(50),
            interval: Duration::from_millis(5),
        }
    }

    #[test]
    fn existing_artifact_returns_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slurm-1.out");
        fs::write(&path, "done").unwrap();

        assert!(wait_for_artifact(&path, short()).is_ok());
    }

    #[test]
    fn missing_artifact_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slurm-2.out");

        let start = Instant::now();
        assert!(matches!(
            wait_for_artifact(&path, short()),
            Err(IngestError::ArtifactTimeout(_))
        ));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn artifact_written_while_polling_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slurm-3.out");

        let writer = {
            let path = path.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                fs::write(path, "late").unwrap();
            })
        };

        let settings = PollSettings {
            max_wait: Duration::from_secs(5),
            interval: Duration::from_millis(5),
        };
        assert!(wait_for_artifact(&path, settings).is_ok());
        writer.join().unwrap();
    }

    #[test]
    fn directory_is_not_an_artifact() {
        let dir = tempfile::tempdir().unwrap();

        assert!(wait_for_artifact(dir.path(), short()).is_err());
    }
}
