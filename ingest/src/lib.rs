pub mod artifact;
pub mod metric;

pub use artifact::{wait_for_artifact, PollSettings};
pub use metric::MetricPattern;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Metric pattern is not a valid regex: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Artifact {0:?} did not appear in time")]
    ArtifactTimeout(PathBuf),
}
