use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A repetition that reached a usable terminal state, the unit aggregation works on.
///
/// Repetitions of the same sweep point share `label` and are averaged together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessfulRun {
    pub job_id: String,
    pub workspace: PathBuf,
    pub label: String,
    #[serde(default)]
    pub state: Option<String>,
}

impl SuccessfulRun {
    pub fn new(
        job_id: impl Into<String>,
        workspace: impl Into<PathBuf>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            workspace: workspace.into(),
            label: label.into(),
            state: None,
        }
    }

    pub fn with_state(mut self, state: Option<String>) -> Self {
        self.state = state;
        self
    }
}
