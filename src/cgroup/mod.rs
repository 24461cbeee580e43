//! Resource sampling scoped to the cgroup confining the current process.
//!
//! This module locates the cgroup v1 controllers of the process once at startup and then,
//! on every tick, turns the kernel's cumulative counters into metrics.
//!
//! # Key Components
//!
//! - [`initialize_all`]: Discovers the `memory`, `cpu,cpuacct` and `cpuset` controllers and
//!   reads the memory limit and the allowed CPUs into a [`CgroupConfig`].
//! - [`MemorySampler`]: Aggregate `memory.stat` counters, stateless across ticks.
//! - [`CpuAccountingSampler`]: Per-CPU utilization rates from the `cpuacct` counters.
//! - [`AllowedCpuFilter`]: Membership tests against the cgroup's `cpuset.cpus`.
//! - [`CgroupSampler`]: Owns all of the above and emits their output through an
//!   [`crate::emit::Emitter`].
//!
//! # Failure model
//!
//! Nothing here aborts the process. A failed discovery disables cgroup sampling for the
//! whole run, a failed read skips the affected metrics for one tick, and a change in the
//! number of reported CPUs disables CPU accounting for the rest of the run.
//!
//! # Supported Stats
//!
//! - `memory.limit_in_bytes`, `memory.stat` and `memory.failcnt`
//! - `cpuacct.usage_percpu_user` + `cpuacct.usage_percpu_sys`, or `cpuacct.usage_percpu`
//! - `cpu.stat` throttling counters
//! - `cpuset.cpus`
mod controllers;
mod cpuacct;
pub mod cpuset;
mod error;
mod memory;
mod sampler;

pub use controllers::{
    CgroupConfig, Controller, ControllerPaths, MEMORY_LIMIT_MAX_VALUE, MemoryLimit,
    initialize_all,
};
pub use cpuacct::{
    CpuAccountingSampler, CpuAcctMode, CpuSample, CpuUtilization, MIN_ELAPSED_SECS, Throttling,
};
pub use cpuset::{AllowedCpuFilter, AllowedCpuSet};
pub use error::{Error, Result, SampleError};
pub use memory::{MemorySample, MemorySampler};
pub use sampler::CgroupSampler;
