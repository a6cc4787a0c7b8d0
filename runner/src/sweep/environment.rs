use crate::config::SweepConfig;
use itertools::Itertools;
use std::{
    fmt::{self, Display},
    ops::Deref,
};
use tracing::trace;

/// Compile step of a job, only present when sources are rebuilt in the workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileCommand {
    pub command: String,
    pub flags: String,
    pub sources: Vec<String>,
    pub output: String,
}

impl Display for CompileCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = [self.command.as_str(), self.flags.as_str()]
            .into_iter()
            .filter(|part| !part.trim().is_empty())
            .join(" ");
        f.write_str(&line)?;

        if !self.sources.is_empty() {
            write!(f, " {} -o {}", self.sources.join(" "), self.output)?;
        }

        Ok(())
    }
}

/// Everything a job script is rendered from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    pub modules: Vec<String>,
    pub nodes: u32,
    pub ntasks: u32,
    pub cpus: u32,
    pub partition: String,
    pub time: String,
    pub launcher: String,
    pub envars: Vec<(String, String)>,
    pub compile: Option<CompileCommand>,
    pub executable: String,
    pub executable_options: String,
}

impl JobSettings {
    pub fn from_config(config: &SweepConfig) -> Self {
        let test = &config.test;

        let compile = test.recompile.then(|| CompileCommand {
            command: test.compile_command.clone(),
            flags: test.compiler_flags.first().cloned().unwrap_or_default(),
            sources: test.source_files.clone(),
            output: test.executable_name.clone(),
        });

        Self {
            modules: config.modules.clone(),
            nodes: config.batch.nodes,
            ntasks: config.batch.ntasks,
            cpus: config.batch.cpus,
            partition: config.batch.partition.clone(),
            time: config.batch.time.to_string(),
            launcher: config.batch.launcher.clone(),
            envars: config.batch.envars(),
            compile,
            executable: test.executable_name.clone(),
            executable_options: config.batch.executable_options.clone(),
        }
    }

    fn set_envar(&mut self, name: &str, value: &str) {
        match self.envars.iter_mut().find(|(key, _)| key == name) {
            Some((_, current)) => *current = value.to_owned(),
            None => self.envars.push((name.to_owned(), value.to_owned())),
        }
    }
}

/// Changes one sweep point makes to the base job settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub envars: Vec<(String, String)>,
    /// MCA parameter passed on the launcher command line
    pub mca: Option<(String, u32)>,
    pub nodes: Option<u32>,
    pub ntasks: Option<u32>,
    pub cpus: Option<u32>,
    pub compiler_flags: Option<String>,
}

impl Overrides {
    pub fn apply(&self, settings: &mut JobSettings) {
        for (name, value) in self.envars.iter() {
            settings.set_envar(name, value);
        }

        if let Some((name, value)) = &self.mca {
            let mut parts = settings.launcher.split_whitespace().collect_vec();
            match parts.first_mut() {
                Some(program) if *program == "srun" => *program = "mpirun",
                Some(_) => {}
                None => parts.push("mpirun"),
            }

            settings.launcher = format!("{} --mca {name} {value}", parts.join(" "));
        }

        if let Some(nodes) = self.nodes {
            settings.nodes = nodes;
        }
        if let Some(ntasks) = self.ntasks {
            settings.ntasks = ntasks;
        }
        if let Some(cpus) = self.cpus {
            settings.cpus = cpus;
        }

        if let (Some(flags), Some(compile)) = (&self.compiler_flags, settings.compile.as_mut()) {
            compile.flags = flags.clone();
        }
    }
}

/// Base job settings plus the overrides of the points currently being prepared.
///
/// The stack is only changed through [`OverrideGuard`], every push is undone
/// when its guard goes out of scope.
#[derive(Debug)]
pub struct JobEnvironment {
    base: JobSettings,
    stack: Vec<Overrides>,
}

impl JobEnvironment {
    pub fn new(base: JobSettings) -> Self {
        Self {
            base,
            stack: Vec::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn push(&mut self, overrides: Overrides) -> OverrideGuard<'_> {
        trace!(depth = self.stack.len() + 1, overrides = ?overrides, "set");
        self.stack.push(overrides);

        OverrideGuard { environment: self }
    }

    /// Base settings with every pushed override applied in push order
    pub fn settings(&self) -> JobSettings {
        let mut settings = self.base.clone();
        for overrides in self.stack.iter() {
            overrides.apply(&mut settings);
        }

        settings
    }
}

pub struct OverrideGuard<'a> {
    environment: &'a mut JobEnvironment,
}

impl Deref for OverrideGuard<'_> {
    type Target = JobEnvironment;

    fn deref(&self) -> &Self::Target {
        self.environment
    }
}

impl Drop for OverrideGuard<'_> {
    fn drop(&mut self) {
        let removed = self.environment.stack.pop();
        trace!(depth = self.environment.stack.len(), overrides = ?removed, "remove");
    }
}
