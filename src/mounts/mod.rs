//! One-shot discovery of cgroup v1 controller mount points from the mount table.
mod detect;
mod error;
mod parser;

pub use detect::discover_controller;
pub use error::{Error, Result};
pub use parser::{MountEntry, MountField, ParseError, parse_mount_line};

/// Default location of the mount table as seen by the current process.
pub const DEFAULT_MOUNTS_PATH: &str = "/proc/self/mounts";
