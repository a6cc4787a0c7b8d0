use crate::config::SweepConfig;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::{
    env, fs, io,
    os::unix::fs::symlink,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// directory created in every workspace for the job's own output files
pub const OUTPUT_DIR: &str = "results";

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Source directory {0:?} does not exist")]
    SourceNotFound(PathBuf),
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to walk the source tree: {0}")]
    Walk(#[from] ignore::Error),
    #[error("Invalid exclusion glob: {0}")]
    Globs(#[from] globset::Error),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> WorkspaceError + '_ {
    move |source| WorkspaceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Creates one isolated directory per sweep point under the working root
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
    source: PathBuf,
    executable: String,
    recompile: bool,
    exclude: GlobSet,
}

impl WorkspaceManager {
    pub fn new(config: &SweepConfig) -> Result<Self, WorkspaceError> {
        let root = &config.workspace.root;
        // job scripts are submitted from inside the workspace, paths must not depend on it
        let root = if root.is_absolute() {
            root.clone()
        } else {
            env::current_dir()
                .map_err(io_error(root))?
                .join(root)
        };

        let mut builder = GlobSetBuilder::new();
        for pattern in config.workspace.exclude.iter() {
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self {
            root,
            source: config.test.source_path.clone(),
            executable: config.test.executable_name.clone(),
            recompile: config.test.recompile,
            exclude: builder.build()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the working root, an existing directory is fine
    pub fn prepare_root(&self) -> Result<(), WorkspaceError> {
        fs::create_dir_all(&self.root).map_err(io_error(&self.root))
    }

    pub fn path_for(&self, postfix: &str) -> PathBuf {
        self.root.join(format!("run{postfix}"))
    }

    /// Populate the workspace of one sweep point and return its path
    pub fn isolate(&self, postfix: &str) -> Result<PathBuf, WorkspaceError> {
        let workspace = self.path_for(postfix);

        if self.recompile {
            if !self.source.is_dir() {
                return Err(WorkspaceError::SourceNotFound(self.source.clone()));
            }

            fs::create_dir_all(&workspace).map_err(io_error(&workspace))?;
            let copied = self.copy_tree(&workspace)?;
            info!("Copied {copied} entries from {:?} to {:?}", self.source, workspace);
        } else {
            fs::create_dir_all(&workspace).map_err(io_error(&workspace))?;

            let executable = self.source.join(&self.executable);
            if executable.is_file() {
                let target = workspace.join(&self.executable);
                fs::copy(&executable, &target).map_err(io_error(&target))?;
                debug!("Copied {executable:?} to {target:?}");
            } else {
                warn!("Executable {executable:?} not found, the job is going to fail");
            }
        }

        let output = workspace.join(OUTPUT_DIR);
        fs::create_dir_all(&output).map_err(io_error(&output))?;

        Ok(workspace)
    }

    fn copy_tree(&self, workspace: &Path) -> Result<usize, WorkspaceError> {
        let source = fs::canonicalize(&self.source).map_err(io_error(&self.source))?;
        let root = fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());

        let filter_source = source.clone();
        let exclude = self.exclude.clone();
        let walker = WalkBuilder::new(&source)
            .standard_filters(false)
            .follow_links(false)
            .filter_entry(move |entry| {
                // never copy the working root into itself
                if entry.path().starts_with(&root) {
                    return false;
                }

                entry
                    .path()
                    .strip_prefix(&filter_source)
                    .map(|relative| !exclude.is_match(relative))
                    .unwrap_or(true)
            })
            .build();

        let mut copied = 0;
        for entry in walker {
            let entry = entry?;
            let relative = match entry.path().strip_prefix(&source) {
                Ok(relative) if relative.as_os_str().is_empty() => continue,
                Ok(relative) => relative,
                Err(_) => continue,
            };
            let target = workspace.join(relative);

            match entry.file_type() {
                Some(kind) if kind.is_dir() => {
                    fs::create_dir_all(&target).map_err(io_error(&target))?;
                }
                Some(kind) if kind.is_symlink() => {
                    let link = fs::read_link(entry.path()).map_err(io_error(entry.path()))?;
                    if target.symlink_metadata().is_ok() {
                        fs::remove_file(&target).map_err(io_error(&target))?;
                    }
                    symlink(&link, &target).map_err(io_error(&target))?;
                }
                _ => {
                    fs::copy(entry.path(), &target).map_err(io_error(&target))?;
                }
            }
            copied += 1;
        }

        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(source: &Path, root: &Path, recompile: bool, exclude: &[&str]) -> SweepConfig {
        let mut config: SweepConfig = format!(
            r#"
batch: {{}}
test_setup:
  type: omp_scalability
  compile_command: gcc
  source_path: {}
  recompile: {recompile}
  executable_name: app
  metric_pattern: "Time: .*"
  threads: [1]
workspace:
  root: {}
"#,
            source.display(),
            root.display()
        )
        .parse()
        .unwrap();
        config.workspace.exclude = exclude.iter().map(|glob| glob.to_string()).collect();
        config
    }

    #[test]
    fn copies_full_tree_when_recompiling() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src");
        fs::create_dir_all(source.join("lib")).unwrap();
        fs::write(source.join("main.c"), "int main() {}").unwrap();
        fs::write(source.join("lib/util.c"), "").unwrap();
        fs::write(source.join("lib/util.o"), "").unwrap();
        symlink("main.c", source.join("link.c")).unwrap();

        let manager =
            WorkspaceManager::new(&config(&source, &dir.path().join("wrk"), true, &["**/*.o"]))
                .unwrap();
        manager.prepare_root().unwrap();
        let workspace = manager.isolate("_omp_4").unwrap();

        assert_eq!(workspace, dir.path().join("wrk/run_omp_4"));
        assert!(workspace.join("main.c").is_file());
        assert!(workspace.join("lib/util.c").is_file());
        assert!(!workspace.join("lib/util.o").exists());
        assert!(workspace.join(OUTPUT_DIR).is_dir());
        assert_eq!(
            fs::read_link(workspace.join("link.c")).unwrap(),
            PathBuf::from("main.c")
        );
    }

    #[test]
    fn root_inside_source_is_skipped() {
        let source = tempfile::tempdir().unwrap();
        fs::write(source.path().join("main.c"), "").unwrap();

        let manager = WorkspaceManager::new(&config(
            source.path(),
            &source.path().join("wrk"),
            true,
            &[],
        ))
        .unwrap();
        manager.prepare_root().unwrap();
        let first = manager.isolate("_flags_0").unwrap();
        let second = manager.isolate("_flags_1").unwrap();

        assert!(first.join("main.c").is_file());
        assert!(!second.join("wrk").exists());
    }

    #[test]
    fn prebuilt_executable_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app"), "#!/bin/sh\n").unwrap();
        fs::write(dir.path().join("main.c"), "").unwrap();

        let manager =
            WorkspaceManager::new(&config(dir.path(), &dir.path().join("wrk"), false, &[]))
                .unwrap();
        manager.prepare_root().unwrap();
        let workspace = manager.isolate("_mpi_2").unwrap();

        assert!(workspace.join("app").is_file());
        assert!(!workspace.join("main.c").exists());

        // isolating twice is not an error
        assert!(manager.isolate("_mpi_2").is_ok());
    }

    #[test]
    fn missing_executable_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let manager =
            WorkspaceManager::new(&config(dir.path(), &dir.path().join("wrk"), false, &[]))
                .unwrap();

        let workspace = manager.isolate("_omp_1").unwrap();
        assert!(workspace.join(OUTPUT_DIR).is_dir());
        assert!(!workspace.join("app").exists());
    }

    #[test]
    fn missing_source_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(&config(
            &dir.path().join("missing"),
            &dir.path().join("wrk"),
            true,
            &[],
        ))
        .unwrap();

        assert!(matches!(
            manager.isolate("_omp_1"),
            Err(WorkspaceError::SourceNotFound(_))
        ));
    }
}
