//! Whitelisted `NAME value` parsing on top of [`CachedFile`].
//!
//! Files such as `cpu.stat` or `memory.stat` list one counter per line. Only the first two
//! whitespace-separated tokens of each line are considered; anything after them is ignored.

use std::collections::HashMap;

use super::{CachedFile, Result};

/// Per-load bookkeeping of how many lines were kept or thrown away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Lines parsed into a `NAME value` pair and kept.
    pub num_read: usize,
    /// Lines that were malformed or whose name was filtered out.
    pub num_discarded: usize,
}

/// Splits a `NAME value` line into its label and unsigned value.
///
/// Returns `None` if the line has fewer than two tokens or the value is not a `u64`.
///
/// # Example
///
/// ```
/// use cgroup_sampler::reader::parse_label_value;
///
/// assert_eq!(parse_label_value("nr_periods 42"), Some(("nr_periods", 42)));
/// assert_eq!(parse_label_value("nr_periods"), None);
/// ```
pub fn parse_label_value(line: &str) -> Option<(&str, u64)> {
    let mut parts = line.split_whitespace();
    let label = parts.next()?;
    let value = parts.next()?.parse::<u64>().ok()?;
    Some((label, value))
}

impl CachedFile {
    /// Reloads the file and collects every `NAME value` line whose name is in `allowed`.
    ///
    /// An empty `allowed` list keeps every well-formed line. Malformed and filtered lines
    /// are counted in [`ParseStats::num_discarded`]; they never fail the load.
    ///
    /// # Errors
    ///
    /// Returns any error of [`CachedFile::open_or_rewind`].
    pub fn read_whitelisted_stats(
        &mut self,
        allowed: &[&str],
    ) -> Result<(HashMap<String, u64>, ParseStats)> {
        self.open_or_rewind()?;

        let mut out = HashMap::new();
        let mut stats = ParseStats::default();
        while let Some(line) = self.next_line() {
            match parse_label_value(line) {
                Some((label, value)) if allowed.is_empty() || allowed.contains(&label) => {
                    out.insert(label.to_owned(), value);
                    stats.num_read += 1;
                }
                _ => stats.num_discarded += 1,
            }
        }

        Ok((out, stats))
    }
}
