//! One-time discovery of the controllers confining this process.

use std::path::{Path, PathBuf};

use super::cpuset::AllowedCpuSet;
use super::{Error, Result};
use crate::fsutil;
use crate::mounts;
use crate::reader::CachedFile;

/// Limits above 1000 * 1000 GB are the kernel's way of saying "no limit".
pub const MEMORY_LIMIT_MAX_VALUE: u64 = 1000 * 1000 * 1000 * 1000 * 1000;

/// The cgroup v1 controllers the samplers depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Controller {
    Memory,
    CpuAcct,
    Cpuset,
}

impl Controller {
    pub const ALL: [Controller; 3] = [Controller::Memory, Controller::CpuAcct, Controller::Cpuset];

    /// Token searched for in the mount options.
    pub fn token(self) -> &'static str {
        match self {
            Controller::Memory => "memory",
            Controller::CpuAcct => "cpu,cpuacct",
            Controller::Cpuset => "cpuset",
        }
    }

    /// Alternative token tried when [`Controller::token`] is not mounted. Some
    /// distributions list the combined CPU controllers the other way round.
    pub fn inverted_token(self) -> Option<&'static str> {
        match self {
            Controller::CpuAcct => Some("cpuacct,cpu"),
            Controller::Memory | Controller::Cpuset => None,
        }
    }
}

impl std::fmt::Display for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// Mount points of the controllers, discovered once per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerPaths {
    memory: PathBuf,
    cpuacct: PathBuf,
    cpuset: PathBuf,
}

impl ControllerPaths {
    /// Looks up every controller of [`Controller::ALL`] in the mount table at `mounts_path`.
    ///
    /// # Errors
    ///
    /// Returns the first [`mounts::Error`] encountered; partial results are discarded.
    pub fn discover(mounts_path: impl AsRef<Path>) -> mounts::Result<Self> {
        let mounts_path = mounts_path.as_ref();
        let discover = |controller: Controller| discover_controller(mounts_path, controller);

        Ok(Self {
            memory: discover(Controller::Memory)?,
            cpuacct: discover(Controller::CpuAcct)?,
            cpuset: discover(Controller::Cpuset)?,
        })
    }

    pub fn get(&self, controller: Controller) -> &Path {
        match controller {
            Controller::Memory => &self.memory,
            Controller::CpuAcct => &self.cpuacct,
            Controller::Cpuset => &self.cpuset,
        }
    }
}

fn discover_controller(mounts_path: &Path, controller: Controller) -> mounts::Result<PathBuf> {
    match (
        mounts::discover_controller(mounts_path, controller.token()),
        controller.inverted_token(),
    ) {
        (Err(mounts::Error::MissingController { .. }), Some(inverted)) => {
            log::debug!("No `{controller}` cgroup controller, retrying as `{inverted}`");
            mounts::discover_controller(mounts_path, inverted)
        }
        (result, _) => result,
    }
}

/// Memory limit of the cgroup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLimit {
    Bytes(u64),
    Unlimited,
}

impl MemoryLimit {
    /// Interprets a raw `memory.limit_in_bytes` value. Returns `None` for `0`.
    pub fn from_raw(raw: u64) -> Option<Self> {
        match raw {
            0 => None,
            raw if raw > MEMORY_LIMIT_MAX_VALUE => Some(MemoryLimit::Unlimited),
            raw => Some(MemoryLimit::Bytes(raw)),
        }
    }

    /// The limit in bytes, `u64::MAX` when unlimited.
    pub fn as_bytes(self) -> u64 {
        match self {
            MemoryLimit::Bytes(bytes) => bytes,
            MemoryLimit::Unlimited => u64::MAX,
        }
    }
}

/// Everything learned about the confining cgroup at startup. Immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupConfig {
    pub paths: ControllerPaths,
    pub memory_limit: MemoryLimit,
    pub cpus: AllowedCpuSet,
}

/// Discovers all controllers and reads the memory limit and the allowed CPU list.
///
/// Succeeds only if every controller is found, the memory limit is nonzero and the CPU
/// list is nonempty.
///
/// # Errors
///
/// See [`Error`] for the individual failure modes.
pub fn initialize_all(mounts_path: impl AsRef<Path>) -> Result<CgroupConfig> {
    let paths = ControllerPaths::discover(mounts_path)?;
    let memory_limit = read_memory_limit(paths.get(Controller::Memory))?;
    let cpus = read_cpuset_cpus(paths.get(Controller::Cpuset))?;

    log::debug!(
        "Found cpuset cgroup limiting to {} CPUs ({}) mounted at {}",
        cpus.len(),
        cpus,
        paths.get(Controller::Cpuset).display()
    );
    log::debug!(
        "Found memory cgroup limiting to {:?} mounted at {}",
        memory_limit,
        paths.get(Controller::Memory).display()
    );

    Ok(CgroupConfig {
        paths,
        memory_limit,
        cpus,
    })
}

fn read_memory_limit(memory_path: &Path) -> Result<MemoryLimit> {
    let path = memory_path.join("memory.limit_in_bytes");
    let raw = CachedFile::new(&path)
        .read_integer()
        .map_err(Error::MemoryLimit)?;
    MemoryLimit::from_raw(raw).ok_or(Error::ZeroMemoryLimit { path })
}

fn read_cpuset_cpus(cpuset_path: &Path) -> Result<AllowedCpuSet> {
    let path = cpuset_path.join("cpuset.cpus");
    let list = fsutil::read_first_token(&path).map_err(|source| Error::CpusetRead {
        path: path.clone(),
        source,
    })?;
    let cpus = list
        .parse::<AllowedCpuSet>()
        .map_err(|source| Error::CpusetParse {
            path: path.clone(),
            source,
        })?;
    if cpus.is_empty() {
        return Err(Error::EmptyCpuset { path });
    }
    Ok(cpus)
}


#[cfg(test)]
mod tests {
    use super::testing::FakeCgroup;
    use super::*;

    #[test]
    fn test_initialize_all() {
        let fake = FakeCgroup::new("536870912\n", "0-1,3\n");

        let config = initialize_all(fake.mounts_path()).unwrap();

        assert_eq!(config.paths.get(Controller::Memory), fake.controller("memory"));
        assert_eq!(
            config.paths.get(Controller::CpuAcct),
            fake.controller("cpu,cpuacct")
        );
        assert_eq!(config.paths.get(Controller::Cpuset), fake.controller("cpuset"));
        assert_eq!(config.memory_limit, MemoryLimit::Bytes(536_870_912));
        assert_eq!(config.cpus.iter().collect::<Vec<_>>(), vec![0, 1, 3]);
    }

    #[test]
    fn test_initialize_all_unlimited_memory() {
        let fake = FakeCgroup::new("9223372036854771712\n", "0\n");
        let config = initialize_all(fake.mounts_path()).unwrap();
        assert_eq!(config.memory_limit, MemoryLimit::Unlimited);
        assert_eq!(config.memory_limit.as_bytes(), u64::MAX);
    }

    #[test]
    fn test_initialize_all_zero_memory_limit() {
        let fake = FakeCgroup::new("0\n", "0-3\n");
        let err = initialize_all(fake.mounts_path()).unwrap_err();
        assert!(matches!(err, Error::ZeroMemoryLimit { .. }));
    }

    #[test]
    fn test_initialize_all_empty_cpuset() {
        let fake = FakeCgroup::new("1048576\n", "\n");
        let err = initialize_all(fake.mounts_path()).unwrap_err();
        assert!(matches!(err, Error::EmptyCpuset { .. }));
    }

    #[test]
    fn test_initialize_all_invalid_cpuset() {
        let fake = FakeCgroup::new("1048576\n", "a-b\n");
        let err = initialize_all(fake.mounts_path()).unwrap_err();
        assert!(matches!(err, Error::CpusetParse { .. }));
    }

    #[test]
    fn test_initialize_all_missing_controller() {
        let fake = FakeCgroup::new("1048576\n", "0\n");
        let root = fake.path().display().to_string();
        std::fs::write(
            fake.mounts_path(),
            format!("cgroup {root}/memory cgroup rw,memory 0 0\n"),
        )
        .unwrap();

        let err = initialize_all(fake.mounts_path()).unwrap_err();
        match err {
            Error::Discovery(mounts::Error::MissingController { controller, .. }) => {
                assert_eq!(controller, "cpu,cpuacct")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_initialize_all_inverted_cpuacct_name() {
        let fake = FakeCgroup::new("1048576\n", "0\n");
        let root = fake.path().display().to_string();
        std::fs::write(
            fake.mounts_path(),
            format!(
                "\
cgroup {root}/cpuset cgroup rw,nosuid,nodev,noexec,relatime,cpuset 0 0
cgroup {root}/cpu,cpuacct cgroup rw,nosuid,nodev,noexec,relatime,cpuacct,cpu 0 0
cgroup {root}/memory cgroup rw,nosuid,nodev,noexec,relatime,memory 0 0
"
            ),
        )
        .unwrap();

        let config = initialize_all(fake.mounts_path()).unwrap();
        assert_eq!(
            config.paths.get(Controller::CpuAcct),
            fake.controller("cpu,cpuacct")
        );
    }

    #[test]
    fn test_inverted_token_not_tried_for_root_mount() {
        let fake = FakeCgroup::new("1048576\n", "0\n");
        let root = fake.path().display().to_string();
        std::fs::write(
            fake.mounts_path(),
            format!(
                "\
cgroup {root}/memory cgroup rw,memory 0 0
cgroup / cgroup rw,cpu,cpuacct 0 0
cgroup {root}/cpuacct,cpu cgroup rw,cpuacct,cpu 0 0
"
            ),
        )
        .unwrap();

        let err = initialize_all(fake.mounts_path()).unwrap_err();
        assert!(matches!(err, Error::Discovery(mounts::Error::Unconfined { .. })));
    }

    #[test]
    fn test_memory_limit_from_raw() {
        assert_eq!(MemoryLimit::from_raw(0), None);
        assert_eq!(MemoryLimit::from_raw(4096), Some(MemoryLimit::Bytes(4096)));
        assert_eq!(
            MemoryLimit::from_raw(MEMORY_LIMIT_MAX_VALUE),
            Some(MemoryLimit::Bytes(MEMORY_LIMIT_MAX_VALUE))
        );
        assert_eq!(
            MemoryLimit::from_raw(MEMORY_LIMIT_MAX_VALUE + 1),
            Some(MemoryLimit::Unlimited)
        );
    }
}
