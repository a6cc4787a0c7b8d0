use crate::{sweep::environment::JobSettings, workspace::OUTPUT_DIR};
use std::{
    fmt::Write as _,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum JobScriptError {
    #[error("Job script file name is empty")]
    EmptyFileName,
    #[error("Failed to write job script {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Submittable job script of one sweep point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    pub path: PathBuf,
    pub postfix: String,
}

#[derive(Debug, Clone)]
pub struct JobScriptBuilder {
    base_name: String,
}

impl JobScriptBuilder {
    pub fn new(base_name: &str) -> Self {
        Self {
            base_name: base_name.trim().to_owned(),
        }
    }

    pub fn file_name(&self, postfix: &str) -> Result<String, JobScriptError> {
        if self.base_name.is_empty() {
            return Err(JobScriptError::EmptyFileName);
        }

        Ok(format!("{}{postfix}.sh", self.base_name))
    }

    pub fn render(&self, settings: &JobSettings, postfix: &str) -> String {
        // writing into a String cannot fail
        let mut script = String::new();

        script.push_str("#!/bin/bash\n");
        let _ = writeln!(
            script,
            "# generated by hpcsweep {}\n",
            env!("CARGO_PKG_VERSION")
        );

        let _ = writeln!(script, "#SBATCH -J {}{postfix}", self.base_name);
        let _ = writeln!(script, "#SBATCH -N {}", settings.nodes);
        let _ = writeln!(script, "#SBATCH -n {}", settings.ntasks);
        let _ = writeln!(script, "#SBATCH -c {}", settings.cpus);
        let _ = writeln!(script, "#SBATCH -p {}", settings.partition);
        let _ = writeln!(script, "#SBATCH -t {}", settings.time);
        script.push_str("#SBATCH -o slurm-%j.out\n\n");

        if !settings.modules.is_empty() {
            script.push_str("module purge\n");
            let _ = writeln!(script, "module load {}\n", settings.modules.join(" "));
        }

        if settings.envars.is_empty() {
            script.push_str("# no environment variables set\n");
        } else {
            for (name, value) in settings.envars.iter() {
                let _ = writeln!(script, "export {name}={value}");
            }
        }
        script.push('\n');

        match &settings.compile {
            Some(compile) => {
                let _ = writeln!(script, "{compile}");
            }
            None => script.push_str("# do not rebuild sources\n"),
        }
        script.push('\n');

        script.push_str("echo \"JOBID: ${SLURM_JOB_ID}\"\n");
        let _ = writeln!(script, "mkdir -p {OUTPUT_DIR}\n");

        let run = format!(
            "{} ./{} {}",
            settings.launcher, settings.executable, settings.executable_options
        );
        let _ = writeln!(script, "{}", run.trim());

        script
    }

    /// Write the job script into `workspace`
    pub fn build(
        &self,
        settings: JobSettings,
        workspace: &Path,
        postfix: &str,
    ) -> Result<JobDescriptor, JobScriptError> {
        let path = workspace.join(self.file_name(postfix)?);

        fs::write(&path, self.render(&settings, postfix)).map_err(|source| {
            JobScriptError::Write {
                path: path.clone(),
                source,
            }
        })?;
        debug!("Wrote job script {path:?}");

        Ok(JobDescriptor {
            path,
            postfix: postfix.to_owned(),
        })
    }
}
