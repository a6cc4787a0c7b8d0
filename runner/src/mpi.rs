use crate::{config::ConfigErrors, sweep::environment::Overrides};
use std::{
    fmt::{self, Display},
    path::Path,
    process::Command,
};
use tracing::{debug, info, warn};

/// Collective call whose algorithm can be selected through a numeric setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collective {
    pub name: &'static str,
    /// highest valid setting, inclusive
    pub max: u32,
}

const INTEL_COLLECTIVES: [Collective; 4] = [
    Collective {
        name: "I_MPI_ADJUST_ALLREDUCE",
        max: 12,
    },
    Collective {
        name: "I_MPI_ADJUST_BARRIER",
        max: 9,
    },
    Collective {
        name: "I_MPI_ADJUST_BCAST",
        max: 14,
    },
    Collective {
        name: "I_MPI_ADJUST_REDUCE",
        max: 11,
    },
];

const OPENMPI_COLLECTIVES: [Collective; 4] = [
    Collective {
        name: "coll_tuned_allreduce_algorithm",
        max: 6,
    },
    Collective {
        name: "coll_tuned_barrier_algorithm",
        max: 9,
    },
    Collective {
        name: "coll_tuned_bcast_algorithm",
        max: 6,
    },
    Collective {
        name: "coll_tuned_reduce_algorithm",
        max: 7,
    },
];

const OPENMPI_WRAPPERS: [&str; 7] = [
    "mpiCC", "mpic++", "mpicc", "mpicxx", "mpif77", "mpif90", "mpifort",
];
const INTEL_WRAPPERS: [&str; 3] = ["mpiicc", "mpiicpc", "mpiifort"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpiVendor {
    Intel,
    OpenMpi,
}

impl Display for MpiVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Intel => f.write_str("Intel MPI"),
            Self::OpenMpi => f.write_str("Open MPI"),
        }
    }
}

impl MpiVendor {
    /// Vendor of a compiler wrapper, only the program name of `compile_command` is considered
    pub fn from_wrapper(compile_command: &str) -> Option<Self> {
        let program = compile_command.split_whitespace().next()?;
        let name = Path::new(program).file_name()?.to_str()?;

        if OPENMPI_WRAPPERS.contains(&name) {
            Some(Self::OpenMpi)
        } else if INTEL_WRAPPERS.contains(&name) {
            Some(Self::Intel)
        } else {
            None
        }
    }

    pub fn from_version_output(output: &str) -> Option<Self> {
        if output.contains("Intel") {
            Some(Self::Intel)
        } else if output.contains("Open MPI") {
            Some(Self::OpenMpi)
        } else {
            None
        }
    }

    /// Ask `program --version` which MPI it belongs to
    pub fn probe(program: &str) -> Option<Self> {
        match Command::new(program).arg("--version").output() {
            Ok(output) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));

                Self::from_version_output(&text)
            }
            Err(error) => {
                debug!(program = program, error = ?error, "Failed to probe MPI launcher");
                None
            }
        }
    }

    /// Resolve the vendor once per sweep, first by wrapper name, then by probing the launcher
    pub fn resolve(compile_command: &str, launcher: &str) -> Result<Self, ConfigErrors> {
        if let Some(vendor) = Self::from_wrapper(compile_command) {
            info!("MPI vendor from compiler wrapper: {vendor}");
            return Ok(vendor);
        }

        let program = match launcher.split_whitespace().next() {
            Some(program) if program != "srun" => program,
            // srun does not know about the MPI library in use
            _ => "mpirun",
        };

        match Self::probe(program) {
            Some(vendor) => {
                info!("MPI vendor reported by {program}: {vendor}");
                Ok(vendor)
            }
            None => {
                warn!("Neither `{compile_command}` nor `{program} --version` identify an MPI vendor");
                Err(ConfigErrors::UnknownMpiVendor(compile_command.to_owned()))
            }
        }
    }

    pub fn collectives(self) -> &'static [Collective] {
        match self {
            Self::Intel => &INTEL_COLLECTIVES,
            Self::OpenMpi => &OPENMPI_COLLECTIVES,
        }
    }

    /// first valid algorithm setting, Open MPI counts from zero
    pub fn lower_bound(self) -> u32 {
        match self {
            Self::Intel => 1,
            Self::OpenMpi => 0,
        }
    }

    /// number of (collective, setting) points of a full collective sweep
    pub fn point_count(self) -> usize {
        let lower = self.lower_bound();

        self.collectives()
            .iter()
            .map(|collective| (collective.max + 1).saturating_sub(lower) as usize)
            .sum()
    }

    /// Job changes selecting `value` for `collective`
    pub fn overrides(self, collective: &Collective, value: u32) -> Overrides {
        match self {
            Self::Intel => Overrides {
                envars: vec![(collective.name.to_owned(), value.to_string())],
                ..Overrides::default()
            },
            Self::OpenMpi => Overrides {
                mca: Some((collective.name.to_owned(), value)),
                ..Overrides::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrappers() {
        assert_eq!(MpiVendor::from_wrapper("mpicxx"), Some(MpiVendor::OpenMpi));
        assert_eq!(
            MpiVendor::from_wrapper("/opt/openmpi/bin/mpif90 -O2"),
            Some(MpiVendor::OpenMpi)
        );
        assert_eq!(MpiVendor::from_wrapper("mpiicpc"), Some(MpiVendor::Intel));
        assert_eq!(MpiVendor::from_wrapper("g++ -fopenmp"), None);
        assert_eq!(MpiVendor::from_wrapper(""), None);
    }

    #[test]
    fn version_output() {
        assert_eq!(
            MpiVendor::from_version_output("Intel(R) MPI Library for Linux* OS, Version 2021.6"),
            Some(MpiVendor::Intel)
        );
        assert_eq!(
            MpiVendor::from_version_output("mpirun (Open MPI) 4.1.4\n\nReport bugs to ..."),
            Some(MpiVendor::OpenMpi)
        );
        assert_eq!(MpiVendor::from_version_output("MPICH 4.0"), None);
    }

    #[test]
    fn point_counts_depend_on_lower_bound() {
        // Open MPI settings start at zero: 7 + 10 + 7 + 8
        assert_eq!(MpiVendor::OpenMpi.point_count(), 32);
        // Intel settings start at one: 12 + 9 + 14 + 11
        assert_eq!(MpiVendor::Intel.point_count(), 46);
    }

    #[test]
    fn unresolvable_vendor_is_an_error() {
        assert!(matches!(
            MpiVendor::resolve("g++", "/does/not/exist/launcher"),
            Err(ConfigErrors::UnknownMpiVendor(_))
        ));
        assert_eq!(
            MpiVendor::resolve("mpiifort", "srun").unwrap(),
            MpiVendor::Intel
        );
    }

    #[test]
    fn overrides_per_vendor() {
        let collective = OPENMPI_COLLECTIVES[0];
        let overrides = MpiVendor::OpenMpi.overrides(&collective, 3);
        assert_eq!(
            overrides.mca,
            Some(("coll_tuned_allreduce_algorithm".to_owned(), 3))
        );
        assert!(overrides.envars.is_empty());

        let collective = INTEL_COLLECTIVES[2];
        let overrides = MpiVendor::Intel.overrides(&collective, 14);
        assert_eq!(
            overrides.envars,
            vec![("I_MPI_ADJUST_BCAST".to_owned(), "14".to_owned())]
        );
        assert!(overrides.mca.is_none());
    }
}
