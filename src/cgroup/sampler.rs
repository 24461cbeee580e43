use std::path::Path;
use std::time::Duration;

use super::{
    AllowedCpuFilter, CgroupConfig, Controller, CpuAccountingSampler, CpuAcctMode,
    CpuUtilization, MemoryLimit, MemorySampler, initialize_all,
};
use crate::emit::{Emitter, Value};

pub const CONFIG_SECTION: &str = "cgroup_config";
pub const MEMORY_SECTION: &str = "cgroup_memory_stats";
pub const CPUACCT_SECTION: &str = "cgroup_cpuacct_stats";

/// Owns the discovered cgroup configuration and every per-controller sampler.
///
/// Constructed once at startup and then driven by a single periodic caller; none of its
/// methods are safe to call concurrently.
#[derive(Debug)]
pub struct CgroupSampler {
    active: Option<Active>,
}

#[derive(Debug)]
struct Active {
    config: CgroupConfig,
    memory: MemorySampler,
    cpuacct: CpuAccountingSampler,
}

impl CgroupSampler {
    /// Discovers the confining cgroup from the mount table at `mounts_path`.
    ///
    /// Any discovery failure is logged and yields a disabled sampler whose sampling
    /// methods do nothing.
    ///
    /// # Arguments
    ///
    /// * `mounts_path` - Mount table to scan, usually `/proc/self/mounts`.
    /// * `memory_stats` - Memory stat names to report; empty reports all of them.
    pub fn new(mounts_path: impl AsRef<Path>, memory_stats: Vec<String>) -> Self {
        match initialize_all(mounts_path) {
            Ok(config) => Self::from_config(config, memory_stats),
            Err(err) => {
                log::error!("{err}. CGroup mode disabled.");
                Self::disabled()
            }
        }
    }

    /// Builds the samplers for an already discovered configuration.
    pub fn from_config(config: CgroupConfig, memory_stats: Vec<String>) -> Self {
        let memory = MemorySampler::new(config.paths.get(Controller::Memory), memory_stats);
        let cpuacct = CpuAccountingSampler::new(config.paths.get(Controller::CpuAcct));
        Self {
            active: Some(Active {
                config,
                memory,
                cpuacct,
            }),
        }
    }

    /// A sampler for a process that is not confined by any cgroup.
    pub fn disabled() -> Self {
        Self { active: None }
    }

    pub fn is_cgroup_confined(&self) -> bool {
        self.active.is_some()
    }

    pub fn config(&self) -> Option<&CgroupConfig> {
        self.active.as_ref().map(|active| &active.config)
    }

    pub fn cpu_filter(&self) -> AllowedCpuFilter<'_> {
        match &self.active {
            Some(active) => AllowedCpuFilter::new(&active.config.cpus),
            None => AllowedCpuFilter::unconfined(),
        }
    }

    /// Whether data for logical CPU `cpu` should be reported. Always `true` when unconfined.
    pub fn allowed_cpu(&self, cpu: usize) -> bool {
        self.cpu_filter().is_allowed(cpu)
    }

    /// The cgroup memory limit; `0` if unknown, `u64::MAX` if unlimited.
    pub fn memory_limit_bytes(&self) -> u64 {
        self.config().map_or(0, |config| config.memory_limit.as_bytes())
    }

    pub fn cpuacct_mode(&self) -> CpuAcctMode {
        self.active
            .as_ref()
            .map_or(CpuAcctMode::Disabled, |active| active.cpuacct.mode())
    }

    /// Returns `false` once any of the controller directories disappeared, e.g. because
    /// the container is being torn down. Always `false` when unconfined.
    pub fn cgroup_still_exists(&self) -> bool {
        self.config().is_some_and(|config| {
            Controller::ALL
                .iter()
                .all(|&controller| config.paths.get(controller).is_dir())
        })
    }

    /// Emits the discovered paths and limits once.
    pub fn emit_config(&self, out: &mut dyn Emitter) {
        let Some(config) = self.config() else {
            return;
        };

        for (key, controller) in [
            ("memory_path", Controller::Memory),
            ("cpuacct_path", Controller::CpuAcct),
            ("cpuset_path", Controller::Cpuset),
        ] {
            let path = config.paths.get(controller).to_string_lossy();
            out.emit(CONFIG_SECTION, None, key, Value::Str(&path));
        }

        let cpus = config.cpus.to_string();
        out.emit(CONFIG_SECTION, None, "cpus", Value::Str(&cpus));
        match config.memory_limit {
            MemoryLimit::Bytes(bytes) => {
                out.emit(CONFIG_SECTION, None, "memory_limit_bytes", Value::U64(bytes))
            }
            MemoryLimit::Unlimited => {
                out.emit(CONFIG_SECTION, None, "memory_unlimited", Value::Bool(true))
            }
        }
    }

    /// Samples and emits the aggregate memory statistics.
    pub fn sample_memory(&mut self, out: &mut dyn Emitter) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let Some(sample) = active.memory.sample() else {
            return;
        };

        for (name, value) in &sample.stats {
            let key = format!("stat.{name}");
            out.emit(MEMORY_SECTION, None, &key, Value::U64(*value));
        }
        if let Some(failcnt) = sample.failcnt {
            out.emit(MEMORY_SECTION, None, "failcnt", Value::U64(failcnt));
        }
    }

    /// Samples and emits CPU utilization for the `elapsed` time since the previous call.
    ///
    /// Per-CPU values are only emitted for CPUs allowed by the cgroup's cpuset.
    pub fn sample_cpuacct(&mut self, elapsed: Duration, out: &mut dyn Emitter) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let Some(sample) = active.cpuacct.sample(elapsed.as_secs_f64()) else {
            return;
        };
        let filter = AllowedCpuFilter::new(&active.config.cpus);

        out.emit(CPUACCT_SECTION, None, "warm_up", Value::Bool(sample.warm_up));
        for (cpu, utilization) in sample.per_cpu.iter().enumerate() {
            if filter.is_allowed(cpu) {
                emit_utilization(out, &format!("cpu{cpu}"), utilization);
            }
        }
        if let Some(total) = &sample.total {
            emit_utilization(out, "cpu_tot", total);
        }
        if let Some(throttling) = sample.throttling {
            let sub = Some("throttling");
            out.emit(CPUACCT_SECTION, sub, "nr_periods", Value::U64(throttling.nr_periods));
            out.emit(CPUACCT_SECTION, sub, "nr_throttled", Value::U64(throttling.nr_throttled));
            out.emit(
                CPUACCT_SECTION,
                sub,
                "throttled_time",
                Value::U64(throttling.throttled_time_nsec),
            );
        }
    }

    /// Runs one full tick: memory first, then CPU accounting.
    pub fn sample(&mut self, elapsed: Duration, out: &mut dyn Emitter) {
        self.sample_memory(out);
        self.sample_cpuacct(elapsed, out);
    }
}

fn emit_utilization(out: &mut dyn Emitter, subsection: &str, utilization: &CpuUtilization) {
    match utilization.sys {
        Some(sys) => {
            out.emit(CPUACCT_SECTION, Some(subsection), "user", Value::F64(utilization.user));
            out.emit(CPUACCT_SECTION, Some(subsection), "sys", Value::F64(sys));
        }
        None => out.emit(CPUACCT_SECTION, Some(subsection), "usage", Value::F64(utilization.user)),
    }
}
