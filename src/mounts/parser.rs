//! Mount table line parser.
//!
//! Parses lines in `/proc/[pid]/mounts` format, i.e. the `fstab(5)` layout:
//! `device mountpoint fstype options dump pass`.

/// Represents a parsed mount table line.
#[derive(Debug, PartialEq, Eq)]
pub struct MountEntry<'a> {
    /// Mounted device, `cgroup` for cgroup v1 hierarchies.
    pub device: &'a str,
    /// Where the filesystem is mounted.
    pub mount_point: &'a str,
    /// Filesystem type (e.g., `cgroup`, `ext4`).
    pub fs_type: &'a str,
    /// Comma-separated mount options; cgroup v1 lists its controllers here.
    pub options: &'a str,
    /// Dump flag.
    pub dump: &'a str,
    /// fsck pass number.
    pub pass: &'a str,
}

impl MountEntry<'_> {
    /// Returns `true` for a cgroup v1 mount whose options mention `controller`.
    ///
    /// The match is a plain substring test, so `cpu,cpuacct` matches the combined
    /// `...,cpu,cpuacct` option list.
    pub fn is_cgroup_with(&self, controller: &str) -> bool {
        self.device == "cgroup" && self.options.contains(controller)
    }
}

/// Named fields in a mount table line.
#[derive(Debug)]
pub enum MountField {
    Device,
    MountPoint,
    FsType,
    Options,
    Dump,
    Pass,
}

impl std::fmt::Display for MountField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MountField::Device => "device",
            MountField::MountPoint => "mount_point",
            MountField::FsType => "fs_type",
            MountField::Options => "options",
            MountField::Dump => "dump",
            MountField::Pass => "pass",
        };
        write!(f, "{name}")
    }
}

/// Errors that may occur when parsing a mount table line.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("missing `{field}` in line: `{line}`")]
    MissingField { field: MountField, line: String },

    #[error("unexpected trailing fields in line: `{0}`")]
    TrailingFields(String),
}

/// Parses a single line of the mount table.
///
/// # Errors
///
/// Returns [`ParseError::MissingField`] if fewer than six fields are present, and
/// [`ParseError::TrailingFields`] if there are more.
pub fn parse_mount_line(line: &str) -> Result<MountEntry<'_>, ParseError> {
    let mut fields = line.split_whitespace();
    let mut next = |field: MountField| {
        fields.next().ok_or_else(|| ParseError::MissingField {
            field,
            line: line.to_owned(),
        })
    };

    let entry = MountEntry {
        device: next(MountField::Device)?,
        mount_point: next(MountField::MountPoint)?,
        fs_type: next(MountField::FsType)?,
        options: next(MountField::Options)?,
        dump: next(MountField::Dump)?,
        pass: next(MountField::Pass)?,
    };

    if fields.next().is_some() {
        return Err(ParseError::TrailingFields(line.to_owned()));
    }

    Ok(entry)
}
