//! Per-CPU utilization from the cgroup v1 `cpuacct` controller.
//!
//! Newer kernels expose separate cumulative user and system counters per CPU
//! (`cpuacct.usage_percpu_user` / `cpuacct.usage_percpu_sys`), older ones (e.g. CentOS 7)
//! only the combined `cpuacct.usage_percpu`. The available flavour is probed once when
//! the sampler is created and never re-evaluated.
//!
//! Every tick turns the nanosecond counters into the fraction of one logical core used
//! since the previous tick:
//!
//! ```text
//! utilization[i] = (current[i] - previous[i]) / (elapsed_secs * 1e9)
//! ```
//!
//! The baseline starts at zero, so the first tick reports `current / (elapsed * 1e9)`
//! instead of a real delta. Such samples are flagged with [`CpuSample::warm_up`].

use std::num::ParseIntError;
use std::path::Path;

use super::SampleError;
use crate::reader::CachedFile;

/// Ticks closer together than this update the baselines but yield no rates.
pub const MIN_ELAPSED_SECS: f64 = 0.1;

const THROTTLING_STATS: [&str; 3] = ["nr_periods", "nr_throttled", "throttled_time"];

/// Which counter files the sampler reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuAcctMode {
    /// Separate user and system counters.
    Split,
    /// Combined user+system counters.
    Combined,
    /// Nothing readable, or the CPU count changed: no more output for this process.
    Disabled,
}

#[derive(Debug)]
enum Readers {
    Split { user: CachedFile, sys: CachedFile },
    Combined { usage: CachedFile },
    Disabled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counters {
    user: u64,
    sys: u64,
}

/// Utilization of one CPU (or of all CPUs summed) during the last tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuUtilization {
    /// User time in split mode, user+system time in combined mode.
    pub user: f64,
    /// System time, only available in split mode.
    pub sys: Option<f64>,
}

/// Deltas of the CFS throttling counters from `cpu.stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Throttling {
    pub nr_periods: u64,
    pub nr_throttled: u64,
    pub throttled_time_nsec: u64,
}

/// Result of one CPU accounting tick.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuSample {
    /// `true` for the first tick, whose rates are measured against a zero baseline.
    pub warm_up: bool,
    /// One entry per logical CPU, indexed by CPU number. Empty if the tick was too short.
    pub per_cpu: Vec<CpuUtilization>,
    /// Sum over all CPUs. `None` if the tick was too short.
    pub total: Option<CpuUtilization>,
    pub throttling: Option<Throttling>,
}

/// Converts the cumulative `cpuacct` counters into per-tick utilization.
///
/// Not reentrant; see [`crate::reader`].
#[derive(Debug)]
pub struct CpuAccountingSampler {
    readers: Readers,
    throttling_reader: CachedFile,
    /// CPU count fixed by the first successful read.
    num_cpus: Option<usize>,
    previous: Vec<Counters>,
    previous_throttling: Throttling,
    samples_collected: u64,
    // scratch buffers reused across ticks
    user_values: Vec<u64>,
    sys_values: Vec<u64>,
    current: Vec<Counters>,
}

impl CpuAccountingSampler {
    /// Probes the counter files below `cpuacct_path` and picks the sampling mode.
    pub fn new(cpuacct_path: &Path) -> Self {
        let readers = probe_readers(cpuacct_path);
        match &readers {
            Readers::Split { .. } => {
                log::debug!("Using per-CPU split user/system counters from cpuacct cgroup")
            }
            Readers::Combined { .. } => {
                log::debug!("Using per-CPU combined counters from cpuacct cgroup")
            }
            Readers::Disabled => log::error!(
                "Could not read any per-CPU counters below `{}`. Disabling cpuacct sampling.",
                cpuacct_path.display()
            ),
        }

        Self {
            readers,
            throttling_reader: CachedFile::new(cpuacct_path.join("cpu.stat")),
            num_cpus: None,
            previous: Vec::new(),
            previous_throttling: Throttling::default(),
            samples_collected: 0,
            user_values: Vec::new(),
            sys_values: Vec::new(),
            current: Vec::new(),
        }
    }

    pub fn mode(&self) -> CpuAcctMode {
        match self.readers {
            Readers::Split { .. } => CpuAcctMode::Split,
            Readers::Combined { .. } => CpuAcctMode::Combined,
            Readers::Disabled => CpuAcctMode::Disabled,
        }
    }

    /// The CPU count established by the first successful read.
    pub fn num_cpus(&self) -> Option<usize> {
        self.num_cpus
    }

    /// Samples the counters and computes the utilization since the previous tick.
    ///
    /// Returns `None` when disabled or when the counters could not be read this tick.
    /// A change in the number of reported CPUs disables the sampler for good.
    pub fn sample(&mut self, elapsed_secs: f64) -> Option<CpuSample> {
        if matches!(self.readers, Readers::Disabled) {
            return None;
        }

        match self.read_counters() {
            Ok(()) => {}
            Err(err @ SampleError::CpuCountChanged { .. }) => {
                log::error!("{err}. Disabling cpuacct sampling.");
                self.readers = Readers::Disabled;
                return None;
            }
            Err(err) => {
                log::warn!("skipping cpuacct sample: {err}");
                return None;
            }
        }

        if self.previous.len() != self.current.len() {
            self.previous = vec![Counters::default(); self.current.len()];
        }
        let split = matches!(self.readers, Readers::Split { .. });
        let warm_up = self.samples_collected == 0;
        self.samples_collected += 1;

        let report = elapsed_secs > MIN_ELAPSED_SECS;
        let mut per_cpu = Vec::with_capacity(if report { self.current.len() } else { 0 });
        // sum of per-CPU deltas; the cumulative counters themselves may add up past u64::MAX
        let mut total_delta = Counters::default();
        for (current, previous) in self.current.iter().zip(self.previous.iter_mut()) {
            if report {
                per_cpu.push(utilization(*current, *previous, elapsed_secs, split));
            }
            total_delta.user = total_delta
                .user
                .saturating_add(current.user.saturating_sub(previous.user));
            total_delta.sys = total_delta
                .sys
                .saturating_add(current.sys.saturating_sub(previous.sys));
            *previous = *current;
        }

        let total_utilization = report
            .then(|| utilization(total_delta, Counters::default(), elapsed_secs, split));

        log::trace!(
            "cpuacct: {} CPUs over {:.3}s (warm_up={})",
            self.current.len(),
            elapsed_secs,
            warm_up
        );

        Some(CpuSample {
            warm_up,
            per_cpu,
            total: total_utilization,
            throttling: self.sample_throttling(),
        })
    }

    fn read_counters(&mut self) -> Result<(), SampleError> {
        self.current.clear();
        match &mut self.readers {
            Readers::Split { user, sys } => {
                read_counter_line(user, &mut self.num_cpus, &mut self.user_values)?;
                read_counter_line(sys, &mut self.num_cpus, &mut self.sys_values)?;
                self.current.extend(
                    self.user_values
                        .iter()
                        .zip(&self.sys_values)
                        .map(|(&user, &sys)| Counters { user, sys }),
                );
            }
            Readers::Combined { usage } => {
                read_counter_line(usage, &mut self.num_cpus, &mut self.user_values)?;
                self.current
                    .extend(self.user_values.iter().map(|&user| Counters { user, sys: 0 }));
            }
            Readers::Disabled => {}
        }
        Ok(())
    }

    fn sample_throttling(&mut self) -> Option<Throttling> {
        let (values, _) = match self.throttling_reader.read_whitelisted_stats(&THROTTLING_STATS) {
            Ok(read) => read,
            Err(err) => {
                log::debug!("no throttling statistics: {err}");
                return None;
            }
        };

        let current = Throttling {
            nr_periods: values.get("nr_periods").copied().unwrap_or_default(),
            nr_throttled: values.get("nr_throttled").copied().unwrap_or_default(),
            throttled_time_nsec: values.get("throttled_time").copied().unwrap_or_default(),
        };
        let previous = std::mem::replace(&mut self.previous_throttling, current);

        Some(Throttling {
            nr_periods: current.nr_periods.saturating_sub(previous.nr_periods),
            nr_throttled: current.nr_throttled.saturating_sub(previous.nr_throttled),
            throttled_time_nsec: current
                .throttled_time_nsec
                .saturating_sub(previous.throttled_time_nsec),
        })
    }
}

fn probe_readers(cpuacct_path: &Path) -> Readers {
    let mut user = CachedFile::new(cpuacct_path.join("cpuacct.usage_percpu_user"));
    let mut sys = CachedFile::new(cpuacct_path.join("cpuacct.usage_percpu_sys"));
    if user.open_or_rewind().is_ok() && sys.open_or_rewind().is_ok() {
        return Readers::Split { user, sys };
    }

    let mut usage = CachedFile::new(cpuacct_path.join("cpuacct.usage_percpu"));
    if usage.open_or_rewind().is_ok() {
        return Readers::Combined { usage };
    }

    Readers::Disabled
}

/// Reloads `reader` and parses its first line into one counter per CPU.
fn read_counter_line(
    reader: &mut CachedFile,
    num_cpus: &mut Option<usize>,
    out: &mut Vec<u64>,
) -> Result<(), SampleError> {
    reader.open_or_rewind()?;

    out.clear();
    let parsed = match reader.next_line() {
        Some(line) => parse_counters(line, out),
        None => {
            return Err(SampleError::MissingLine {
                path: reader.path().to_path_buf(),
            });
        }
    };
    if let Err((value, source)) = parsed {
        return Err(SampleError::InvalidCounter {
            path: reader.path().to_path_buf(),
            value,
            source,
        });
    }

    match *num_cpus {
        Some(expected) if expected != out.len() => Err(SampleError::CpuCountChanged {
            path: reader.path().to_path_buf(),
            expected,
            found: out.len(),
        }),
        Some(_) => Ok(()),
        None if out.is_empty() => Err(SampleError::MissingLine {
            path: reader.path().to_path_buf(),
        }),
        None => {
            *num_cpus = Some(out.len());
            Ok(())
        }
    }
}

fn parse_counters(line: &str, out: &mut Vec<u64>) -> Result<(), (String, ParseIntError)> {
    for token in line.split_whitespace() {
        let value = token
            .parse::<u64>()
            .map_err(|source| (token.to_owned(), source))?;
        out.push(value);
    }
    Ok(())
}

fn utilization(
    current: Counters,
    previous: Counters,
    elapsed_secs: f64,
    split: bool,
) -> CpuUtilization {
    let elapsed_nsec = elapsed_secs * 1e9;
    let rate = |now: u64, before: u64| now.saturating_sub(before) as f64 / elapsed_nsec;
    CpuUtilization {
        user: rate(current.user, previous.user),
        sys: split.then(|| rate(current.sys, previous.sys)),
    }
}
