//! Cgroup Sampler: periodic, low-overhead sampling of the resource counters of the
//! cgroup confining the current process.
//!
//! This library locates the cgroup v1 `memory`, `cpu,cpuacct` and `cpuset` controllers once,
//! then re-reads their pseudo-files on every tick through long-lived descriptors and turns
//! the kernel's cumulative counters into rates, handing the results to an [`emit::Emitter`].
use error::ResultOkLogExt;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub mod cgroup;
pub mod config;
pub mod emit;
pub mod error;
pub mod fsutil;
pub mod mounts;
pub mod reader;

// cgroup v1 mount table entries look like
//      cgroup /sys/fs/cgroup/cpuset/lxc/container1-main cgroup rw,nosuid,nodev,noexec,relatime,cpuset 0 0
// the mount point is where the values of the cgroup confining this process live. A
// controller mounted at `/` means the process is not confined by that controller.

fn unix_timestamp() -> Result<u64, std::time::SystemTimeError> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Runs the sampler until the confining cgroup disappears.
///
/// Reads the [`config::Config`] from the environment, discovers the cgroup, emits its
/// configuration once and then samples memory and CPU accounting on every interval tick,
/// writing JSON lines to stdout.
///
/// # Returns
///
/// Returns `Ok(())` when the cgroup vanished or the process is not confined at all.
///
/// # Errors
///
/// Possible errors include:
/// - Invalid configuration environment variables.
/// - A panic inside the blocking sampling task.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::Config::from_env()?;
    log::debug!("Configuration: {config:?}");

    let mut sampler = cgroup::CgroupSampler::new(&config.mounts_path, config.memory_stats);
    if !sampler.is_cgroup_confined() {
        log::warn!("Process is not confined by cgroup v1 controllers, nothing to sample");
        return Ok(());
    }

    let mut emitter = emit::JsonLinesEmitter::new(std::io::stdout());
    emitter.set_timestamp(unix_timestamp()?);
    sampler.emit_config(&mut emitter);
    emitter.flush().ok_log();

    let mut interval = tokio::time::interval(config.interval);
    // the first tick completes immediately
    interval.tick().await;
    let mut last_sample = Instant::now();
    loop {
        interval.tick().await;
        if !sampler.cgroup_still_exists() {
            log::warn!("Cgroup disappeared, stopping");
            return Ok(());
        }

        let now = Instant::now();
        let elapsed = now.duration_since(last_sample);
        last_sample = now;
        let timestamp = unix_timestamp()?;
        log::trace!("Sampling@{timestamp}");
        emitter.set_timestamp(timestamp);

        (sampler, emitter) = tokio::task::spawn_blocking(move || {
            let before = Instant::now();
            sampler.sample(elapsed, &mut emitter);
            emitter.flush().ok_log();
            log::trace!("sample() took {} nanoseconds", before.elapsed().as_nanos());
            (sampler, emitter)
        })
        .await?;
    }
}
