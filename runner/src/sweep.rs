pub mod environment;
pub mod kind;
pub mod repetition;

use crate::{
    config::SweepConfig,
    jobscript::{JobScriptBuilder, JobScriptError},
    schedulers::Scheduler,
    workspace::{WorkspaceError, WorkspaceManager},
};
use environment::{JobEnvironment, JobSettings};
use hpcsweep_analysis::SuccessfulRun;
use kind::SweepKind;
use repetition::{run_point, RepetitionPolicy};
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Error, Debug)]
pub enum SweepError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    JobScript(#[from] JobScriptError),
}

/// Walks the axis of one sweep, one point at a time
#[derive(Debug)]
pub struct SweepDriver {
    kind: SweepKind,
    workspaces: WorkspaceManager,
    environment: JobEnvironment,
    scripts: JobScriptBuilder,
    policy: RepetitionPolicy,
}

impl SweepDriver {
    pub fn new(config: &SweepConfig, kind: SweepKind) -> Result<Self, SweepError> {
        Ok(Self {
            kind,
            workspaces: WorkspaceManager::new(config)?,
            environment: JobEnvironment::new(JobSettings::from_config(config)),
            scripts: JobScriptBuilder::new(&config.batch.script_base_name),
            policy: RepetitionPolicy::from_config(config),
        })
    }

    pub fn kind(&self) -> &SweepKind {
        &self.kind
    }

    /// Run every point of the sweep and collect the usable repetitions.
    ///
    /// Errors stop the sweep, unusable repetitions are only dropped.
    #[instrument(skip_all, fields(sweep = self.kind.name()))]
    pub fn run<S: Scheduler + ?Sized>(
        &mut self,
        scheduler: &S,
    ) -> Result<Vec<SuccessfulRun>, SweepError> {
        let total = self.kind.total();
        let mut runs = Vec::new();

        self.workspaces.prepare_root()?;
        info!(
            "Sweeping {total} points under {:?}",
            self.workspaces.root()
        );

        for (idx, point) in self.kind.points().enumerate() {
            let counter = idx + 1;
            info!("[{counter}/{total}] Starting test {}", point.label);

            let workspace = self.workspaces.isolate(&point.postfix)?;

            let descriptor = {
                let guard = self.environment.push(point.overrides);
                self.scripts
                    .build(guard.settings(), &workspace, &point.postfix)?
            };
            debug_assert_eq!(self.environment.depth(), 0);

            let point_runs = run_point(
                scheduler,
                &descriptor,
                &workspace,
                &point.label,
                &self.policy,
            );
            info!(
                "[{counter}/{total}] Done {} with {} usable runs",
                point.label,
                point_runs.len()
            );
            runs.extend(point_runs);
        }

        Ok(runs)
    }
}
