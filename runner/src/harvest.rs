use crate::schedulers::Scheduler;
use hpcsweep_analysis::{MetricSource, SuccessfulRun};
use hpcsweep_ingest::{wait_for_artifact, IngestError, MetricPattern, PollSettings};
use std::path::{Path, PathBuf};

/// Reads metrics from the output artifacts a scheduler leaves in the workspaces
pub struct OutputHarvester<'a, S: ?Sized> {
    scheduler: &'a S,
    pattern: &'a MetricPattern,
    poll: PollSettings,
}

impl<'a, S: Scheduler + ?Sized> OutputHarvester<'a, S> {
    pub fn new(scheduler: &'a S, pattern: &'a MetricPattern, poll: PollSettings) -> Self {
        Self {
            scheduler,
            pattern,
            poll,
        }
    }
}

impl<S: Scheduler + ?Sized> MetricSource for OutputHarvester<'_, S> {
    type Error = IngestError;

    fn locate(&self, run: &SuccessfulRun) -> PathBuf {
        self.scheduler.artifact_path(&run.workspace, &run.job_id)
    }

    fn extract(&self, artifact: &Path) -> Result<Vec<f64>, Self::Error> {
        wait_for_artifact(artifact, self.poll)?;

        self.pattern.extract(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedulers::LocalScheduler;
    use hpcsweep_analysis::{aggregate, Selection};
    use std::{fs, time::Duration};

    #[test]
    fn reads_scheduler_artifacts() {
        let workspace = tempfile::tempdir().unwrap();
        fs::write(
            workspace.path().join("local-7.1.out"),
            "JOBID: 7.1\nElapsed time: 0.25 s\nElapsed time: 0.75 s\n",
        )
        .unwrap();

        let scheduler = LocalScheduler::new("sh", None);
        let pattern = MetricPattern::new("Elapsed time: .*").unwrap();
        let poll = PollSettings {
            max_wait: Duration::from_millis(10),
            interval: Duration::from_millis(1),
        };
        let harvester = OutputHarvester::new(&scheduler, &pattern, poll);

        let runs = vec![
            SuccessfulRun::new("7.1", workspace.path(), "8"),
            // never written, times out and is skipped
            SuccessfulRun::new("7.2", workspace.path(), "16"),
        ];
        let aggregation = aggregate(&runs, Selection::Last, &harvester);

        assert_eq!(
            aggregation.series.pairs().collect::<Vec<_>>(),
            vec![("8", 0.75)]
        );
        assert_eq!(aggregation.samples[0].values, vec![0.25, 0.75]);
    }
}
