//! Parsing of `cpuset.cpus` lists and membership tests against them.
//!
//! The kernel prints CPU lists as comma-separated tokens, each a single index or an
//! inclusive `start-stop` range, e.g. `0-3,5,7-8`.

use std::collections::BTreeSet;
use std::num::ParseIntError;
use std::str::FromStr;

/// Indices at or above this bound are dropped while parsing.
pub const MAX_CPU_INDEX: u64 = i32::MAX as u64;

/// Largest `CONFIG_NR_CPUS` the kernel can be built with. Ranges spanning more CPUs are
/// rejected.
pub const MAX_RANGE_LEN: u64 = 8192;

/// Errors that may occur when parsing a CPU list.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid CPU index `{token}`: {source}")]
    InvalidIndex {
        token: String,
        #[source]
        source: ParseIntError,
    },
    #[error("invalid CPU range `{token}`")]
    InvalidRange { token: String },
}

/// The set of logical CPUs a cgroup is allowed to run on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedCpuSet {
    cpus: BTreeSet<usize>,
}

impl AllowedCpuSet {
    pub fn contains(&self, cpu: usize) -> bool {
        self.cpus.contains(&cpu)
    }

    pub fn len(&self) -> usize {
        self.cpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty()
    }

    /// Iterates the CPU indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.cpus.iter().copied()
    }
}

fn parse_index(token: &str) -> Result<u64, ParseError> {
    token.parse::<u64>().map_err(|source| ParseError::InvalidIndex {
        token: token.to_owned(),
        source,
    })
}

impl FromStr for AllowedCpuSet {
    type Err = ParseError;

    /// Expands a CPU list such as `0-3,5,7-8`.
    ///
    /// An empty (or all-whitespace) input yields an empty set.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut cpus = BTreeSet::new();
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self { cpus });
        }

        for token in s.split(',') {
            let mut bounds = token.split('-');
            let (start, stop) = match (bounds.next(), bounds.next(), bounds.next()) {
                (Some(single), None, None) => {
                    let index = parse_index(single)?;
                    (index, index)
                }
                (Some(start), Some(stop), None) => (parse_index(start)?, parse_index(stop)?),
                _ => {
                    return Err(ParseError::InvalidRange {
                        token: token.to_owned(),
                    });
                }
            };
            if start > stop || stop - start >= MAX_RANGE_LEN {
                return Err(ParseError::InvalidRange {
                    token: token.to_owned(),
                });
            }

            // MAX_CPU_INDEX fits into usize on every supported target
            let stop = stop.min(MAX_CPU_INDEX - 1);
            cpus.extend((start..=stop).map(|cpu| cpu as usize));
        }

        Ok(Self { cpus })
    }
}

impl std::fmt::Display for AllowedCpuSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, cpu) in self.cpus.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{cpu}")?;
        }
        Ok(())
    }
}

/// Decides whether data for a logical CPU should be reported.
///
/// Without a confining cgroup every CPU is allowed.
#[derive(Debug, Clone, Copy)]
pub struct AllowedCpuFilter<'a> {
    cpus: Option<&'a AllowedCpuSet>,
}

impl<'a> AllowedCpuFilter<'a> {
    /// A filter that allows every CPU.
    pub fn unconfined() -> Self {
        Self { cpus: None }
    }

    /// A filter restricted to `cpus`.
    pub fn new(cpus: &'a AllowedCpuSet) -> Self {
        Self { cpus: Some(cpus) }
    }

    pub fn is_allowed(&self, cpu: usize) -> bool {
        self.cpus.is_none_or(|cpus| cpus.contains(cpu))
    }
}
