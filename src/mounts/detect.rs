use crate::fsutil;

use super::parser::parse_mount_line;
use super::{Error, Result};
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Finds the mount point of the cgroup v1 hierarchy carrying `controller`.
///
/// The first line whose device is `cgroup` and whose mount options contain `controller`
/// wins; no further lines are inspected.
///
/// # Arguments
///
/// * `path` - Path to a mount table (e.g., `/proc/self/mounts`).
/// * `controller` - Controller token to look for, e.g. `memory` or `cpu,cpuacct`.
///
/// # Errors
///
/// - [`Error::FileOpen`] if the file can't be opened.
/// - [`Error::ReadLine`] if reading from the file fails.
/// - [`Error::Parse`] if a line before the match is malformed.
/// - [`Error::MissingController`] if no line qualifies.
/// - [`Error::Unconfined`] if the controller is mounted at `/`.
///
/// # Example
///
/// ```no_run
/// use cgroup_sampler::mounts::discover_controller;
///
/// let memory = discover_controller("/proc/self/mounts", "memory").unwrap();
/// println!("memory controller: {}", memory.display());
/// ```
pub fn discover_controller(path: impl AsRef<Path>, controller: &str) -> Result<PathBuf> {
    let path = path.as_ref();
    let buf = fsutil::open_file_reader(path)?;

    discover_controller_from_reader(buf, path, controller)
}

/// Internal implementation of [`discover_controller`] over any buffered reader.
///
/// `origin` is only used in error messages.
fn discover_controller_from_reader<R: BufRead>(
    mut reader: R,
    origin: &Path,
    controller: &str,
) -> Result<PathBuf> {
    let mut line = String::with_capacity(256);

    while reader
        .read_line(&mut line)
        .map_err(|source| Error::ReadLine {
            path: origin.to_path_buf(),
            source,
        })?
        != 0
    {
        let entry = parse_mount_line(line.as_str()).map_err(|source| Error::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        if entry.is_cgroup_with(controller) {
            if entry.mount_point == "/" {
                return Err(Error::Unconfined {
                    controller: controller.to_owned(),
                });
            }
            log::debug!(
                "Found `{}` cgroup controller mounted at {}",
                controller,
                entry.mount_point
            );
            return Ok(PathBuf::from(entry.mount_point));
        }

        line.clear();
    }

    Err(Error::MissingController {
        controller: controller.to_owned(),
        path: origin.to_path_buf(),
    })
}
