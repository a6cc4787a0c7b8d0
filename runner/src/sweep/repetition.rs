use crate::{
    config::SweepConfig,
    jobscript::JobDescriptor,
    schedulers::{JobOutcome, Scheduler},
};
use hpcsweep_analysis::SuccessfulRun;
use std::path::Path;
use tracing::{info, instrument, warn};

/// never usable, whatever the configuration says
pub const CANCELLED: &str = "CANCELLED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Usable,
    MissingJobId,
    /// terminal state the sweep does not trust
    Excluded(String),
}

/// How often a point is submitted and which outcomes count
#[derive(Debug, Clone)]
pub struct RepetitionPolicy {
    repetitions: usize,
    excluded_states: Vec<String>,
}

impl RepetitionPolicy {
    /// `excluded_states` extend the always excluded `CANCELLED` state
    pub fn new(repetitions: usize, excluded_states: &[String]) -> Self {
        let mut states = vec![CANCELLED.to_owned()];
        for state in excluded_states.iter().map(|state| state.trim().to_uppercase()) {
            if !state.is_empty() && !states.contains(&state) {
                states.push(state);
            }
        }

        Self {
            repetitions: repetitions.max(1),
            excluded_states: states,
        }
    }

    pub fn from_config(config: &SweepConfig) -> Self {
        Self::new(config.test.repetitions(), &config.test.exclude_states)
    }

    pub fn repetitions(&self) -> usize {
        self.repetitions
    }

    /// An outcome is usable if it has a job id and its state (first word, any case) is not excluded
    pub fn classify(&self, outcome: &JobOutcome) -> Classification {
        if outcome.job_id.is_none() {
            return Classification::MissingJobId;
        }

        match outcome
            .terminal_state
            .as_deref()
            .and_then(|state| state.split_whitespace().next())
        {
            Some(state)
                if self
                    .excluded_states
                    .iter()
                    .any(|excluded| excluded.eq_ignore_ascii_case(state)) =>
            {
                Classification::Excluded(state.to_uppercase())
            }
            _ => Classification::Usable,
        }
    }
}

/// Submit one sweep point `repetitions` times and keep the usable runs.
///
/// Repetitions run one after the other and a failed repetition is never resubmitted.
#[instrument(skip(scheduler, descriptor, policy), fields(postfix = %descriptor.postfix))]
pub fn run_point<S: Scheduler + ?Sized>(
    scheduler: &S,
    descriptor: &JobDescriptor,
    workspace: &Path,
    label: &str,
    policy: &RepetitionPolicy,
) -> Vec<SuccessfulRun> {
    let mut runs = Vec::with_capacity(policy.repetitions());

    for iteration in 1..=policy.repetitions() {
        info!("Iteration {iteration}/{}", policy.repetitions());
        let outcome = scheduler.submit(descriptor, workspace);

        match policy.classify(&outcome) {
            Classification::Usable => {
                if let Some(job_id) = outcome.job_id {
                    runs.push(
                        SuccessfulRun::new(job_id, outcome.workspace, label)
                            .with_state(outcome.terminal_state),
                    );
                }
            }
            Classification::MissingJobId => {
                warn!("Iteration {iteration} of {label} returned no job id, dropping it")
            }
            Classification::Excluded(state) => {
                warn!(
                    job_id = outcome.job_id.as_deref().unwrap_or_default(),
                    "Iteration {iteration} of {label} ended as {state}, dropping it"
                )
            }
        }
    }

    runs
}
