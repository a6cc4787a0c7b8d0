use crate::IngestError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::{fs, path::Path};
use tracing::trace;
use tracing_unwrap::ResultExt;

/// integers, decimals (`1.`, `.5`, `1.5`) and scientific notation, optionally negative
static NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"-?(?:\d+\.?\d*[eE][+\-]?\d+|\d+\.\d*|\.\d+|\d+)").unwrap_or_log()
});

/// Compiled pattern that selects the lines/fragments holding a metric in job output
#[derive(Debug, Clone)]
pub struct MetricPattern {
    regex: Regex,
}

impl MetricPattern {
    pub fn new(pattern: &str) -> Result<Self, IngestError> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Find every match of the pattern and parse the first number inside of it.
    ///
    /// If the pattern has a capture group only the first group is scanned,
    /// otherwise the whole match. Matches without any number are skipped.
    pub fn extract_from_str(&self, text: &str) -> Vec<f64> {
        self.regex
            .captures_iter(text)
            .filter_map(|captures| {
                let fragment = captures.get(1).or_else(|| captures.get(0))?.as_str();
                let number = NUMBER.find(fragment)?;

                match number.as_str().parse::<f64>() {
                    Ok(value) => Some(value),
                    Err(error) => {
                        trace!(fragment = fragment, error = ?error, "Skipped unparsable number");
                        None
                    }
                }
            })
            .collect()
    }

    pub fn extract(&self, path: &Path) -> Result<Vec<f64>, IngestError> {
        let content = fs::read_to_string(path).map_err(|source| IngestError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(self.extract_from_str(&content))
    }
}
