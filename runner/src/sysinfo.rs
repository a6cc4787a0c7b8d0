use crate::{
    config::{SchedulerConfig, SweepConfig},
    mpi::MpiVendor,
};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::{
    env,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{info, warn};
use tracing_unwrap::ResultExt;

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap_or_log());

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub path: Option<PathBuf>,
    pub version: Option<String>,
    /// only probed for the MPI launcher
    pub mpi_vendor: Option<String>,
}

/// Host and tool chain a sweep is about to run with
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub system: String,
    pub kernel: String,
    pub machine: String,
    pub tools: Vec<ToolInfo>,
}

/// `major.minor.patch` from the first line of a `--version` output that contains a number
pub fn version_from(output: &str) -> Option<String> {
    let line = output.lines().find(|line| NUMBER.is_match(line))?;

    Some(NUMBER.find_iter(line).take(3).map(|number| number.as_str()).join("."))
}

fn find_in_path(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let path = Path::new(program);
        return path.is_file().then(|| path.to_path_buf());
    }

    env::split_paths(&env::var_os("PATH")?)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

fn version_output(path: &Path) -> Option<String> {
    let output = Command::new(path).arg("--version").output().ok()?;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    Some(text)
}

impl ToolInfo {
    /// `output` is what `--version` printed, the MPI vendor is only read for the launcher
    fn new(name: &str, path: Option<PathBuf>, output: Option<&str>, launcher: bool) -> Self {
        Self {
            name: name.to_owned(),
            path,
            version: output.and_then(version_from),
            mpi_vendor: output
                .filter(|_| launcher)
                .and_then(MpiVendor::from_version_output)
                .map(|vendor| vendor.to_string()),
        }
    }
}

fn probe(program: &str, launcher: bool) -> ToolInfo {
    let path = find_in_path(program);
    let output = path.as_deref().and_then(version_output);

    ToolInfo::new(program, path, output.as_deref(), launcher)
}

fn first_word(line: &str) -> Option<String> {
    line.split_whitespace().next().map(str::to_owned)
}

/// programs the configuration is going to call
fn tools(config: &SweepConfig) -> Vec<String> {
    let mut tools = Vec::new();

    tools.extend(first_word(&config.test.compile_command));
    tools.extend(first_word(&config.batch.launcher));
    match &config.scheduler {
        SchedulerConfig::Slurm { sbatch, sacct, .. } => {
            tools.extend(first_word(sbatch));
            tools.extend(sacct.as_deref().and_then(first_word));
        }
        SchedulerConfig::Local { shell, .. } => tools.extend(first_word(shell)),
    }

    tools.into_iter().unique().collect()
}

impl SystemInfo {
    pub fn collect(config: &SweepConfig) -> Self {
        let (system, kernel, machine) = match nix::sys::utsname::uname() {
            Ok(uname) => (
                uname.sysname().to_string_lossy().into_owned(),
                uname.release().to_string_lossy().into_owned(),
                uname.machine().to_string_lossy().into_owned(),
            ),
            Err(error) => {
                warn!(error = ?error, "Failed to query uname");
                Default::default()
            }
        };

        let launcher = first_word(&config.batch.launcher);

        Self {
            system,
            kernel,
            machine,
            tools: tools(config)
                .iter()
                .map(|tool| probe(tool, launcher.as_ref() == Some(tool)))
                .collect(),
        }
    }

    pub fn log(&self) {
        info!("System: {} {} ({})", self.system, self.kernel, self.machine);

        for tool in self.tools.iter() {
            match (&tool.path, &tool.version) {
                (Some(path), Some(version)) => info!("  {}: {version} at {path:?}", tool.name),
                (Some(path), None) => info!("  {}: unknown version at {path:?}", tool.name),
                (None, _) => warn!("  {}: not found", tool.name),
            }
            if let Some(vendor) = &tool.mpi_vendor {
                info!("  {} vendor: {vendor}", tool.name);
            }
        }
    }
}
