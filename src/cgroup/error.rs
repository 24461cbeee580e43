use std::path::PathBuf;

use crate::{mounts, reader};

/// Reasons why cgroup-scoped sampling could not be enabled.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Discovery(#[from] mounts::Error),
    #[error("failed to read memory limit: {0}")]
    MemoryLimit(#[source] reader::Error),
    #[error("memory limit in `{path}` is zero")]
    ZeroMemoryLimit { path: PathBuf },
    #[error("failed to read CPU list `{path}`: {source}")]
    CpusetRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid CPU list in `{path}`: {source}")]
    CpusetParse {
        path: PathBuf,
        #[source]
        source: super::cpuset::ParseError,
    },
    #[error("CPU list in `{path}` is empty")]
    EmptyCpuset { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors of a single CPU accounting tick.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error(transparent)]
    Read(#[from] reader::Error),
    #[error("no counter line in `{path}`")]
    MissingLine { path: PathBuf },
    #[error("invalid counter `{value}` in `{path}`: {source}")]
    InvalidCounter {
        path: PathBuf,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("CPU count in `{path}` changed from {expected} to {found}")]
    CpuCountChanged {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
}
