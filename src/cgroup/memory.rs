//! Per-tick sampling of the memory controller's aggregate statistics.
//!
//! cgroup v1 `memory.stat` lists every counter twice: once for the cgroup itself and
//! once, prefixed with `total_`, for the cgroup including all of its descendants. Only
//! the `total_` values are kept, reported under their name without the prefix.

use std::path::Path;

use crate::reader::{CachedFile, ParseStats, parse_label_value};

const TOTAL_PREFIX: &str = "total_";

/// Result of one memory tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySample {
    /// `(name, value)` pairs in file order, `total_` prefix removed.
    pub stats: Vec<(String, u64)>,
    pub parse_stats: ParseStats,
    /// Value of `memory.failcnt`, if readable.
    pub failcnt: Option<u64>,
}

/// Samples `memory.stat` and `memory.failcnt` of one memory controller.
///
/// Holds no state across ticks besides the open descriptors.
#[derive(Debug)]
pub struct MemorySampler {
    stat_reader: CachedFile,
    failcnt_reader: CachedFile,
    /// Names (without `total_`) to keep; empty keeps all.
    allowed: Vec<String>,
    line: String,
}

impl MemorySampler {
    pub fn new(memory_path: &Path, allowed: Vec<String>) -> Self {
        Self {
            stat_reader: CachedFile::new(memory_path.join("memory.stat")),
            failcnt_reader: CachedFile::new(memory_path.join("memory.failcnt")),
            allowed,
            line: String::with_capacity(128),
        }
    }

    /// Reloads `memory.stat` and returns the aggregate counters.
    ///
    /// Returns `None` if the file cannot be (re)loaded; the next tick tries again.
    pub fn sample(&mut self) -> Option<MemorySample> {
        if let Err(err) = self.stat_reader.open_or_rewind() {
            log::warn!("skipping memory sample: {err}");
            return None;
        }

        let mut sample = MemorySample::default();
        while let Some(raw) = self.stat_reader.next_line() {
            self.line.clear();
            self.line.extend(raw.chars().map(normalize_char));

            let kept = parse_label_value(&self.line)
                .and_then(|(label, value)| Some((label.strip_prefix(TOTAL_PREFIX)?, value)))
                .filter(|(name, _)| {
                    self.allowed.is_empty() || self.allowed.iter().any(|allowed| allowed == name)
                });
            match kept {
                Some((name, value)) => {
                    sample.stats.push((name.to_owned(), value));
                    sample.parse_stats.num_read += 1;
                }
                None => sample.parse_stats.num_discarded += 1,
            }
        }

        sample.failcnt = match self.failcnt_reader.read_integer() {
            Ok(value) => Some(value),
            Err(err) => {
                log::debug!("no memory fail counter: {err}");
                None
            }
        };

        log::trace!(
            "memory.stat: {} lines, {} values kept, {} discarded",
            self.stat_reader.lines_consumed(),
            sample.parse_stats.num_read,
            sample.parse_stats.num_discarded
        );
        Some(sample)
    }
}

/// Turns keys like `pgpgin(total):x` into whitespace-separated tokens.
fn normalize_char(c: char) -> char {
    match c {
        '(' => '_',
        ')' | ':' => ' ',
        c => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMORY_STAT: &str = "\
cache 100
rss 200
total_cache 1000
total_rss 2000
total_mapped_file 300
total_broken abc
hierarchical_memory_limit 9223372036854771712
total_swap(kb): 42
";

    fn memory_dir(stat: &str, failcnt: Option<&str>) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("memory.stat"), stat).unwrap();
        if let Some(failcnt) = failcnt {
            std::fs::write(dir.path().join("memory.failcnt"), failcnt).unwrap();
        }
        dir
    }

    #[test]
    fn test_sample_keeps_only_totals() {
        let dir = memory_dir(MEMORY_STAT, Some("7\n"));
        let mut sampler = MemorySampler::new(dir.path(), Vec::new());

        let sample = sampler.sample().unwrap();

        assert_eq!(
            sample.stats,
            vec![
                ("cache".to_owned(), 1000),
                ("rss".to_owned(), 2000),
                ("mapped_file".to_owned(), 300),
                ("swap_kb".to_owned(), 42),
            ]
        );
        assert_eq!(sample.parse_stats.num_read, 4);
        assert_eq!(sample.parse_stats.num_discarded, 4);
        assert_eq!(sample.failcnt, Some(7));
    }

    #[test]
    fn test_sample_with_allow_list() {
        let dir = memory_dir(MEMORY_STAT, None);
        let mut sampler = MemorySampler::new(dir.path(), vec!["rss".to_owned()]);

        let sample = sampler.sample().unwrap();

        assert_eq!(sample.stats, vec![("rss".to_owned(), 2000)]);
        assert_eq!(sample.failcnt, None);
    }

    #[test]
    fn test_sample_retries_after_file_vanished() {
        let dir = memory_dir(MEMORY_STAT, None);
        let mut sampler = MemorySampler::new(dir.path(), Vec::new());
        assert!(sampler.sample().is_some());

        let stat_path = dir.path().join("memory.stat");
        std::fs::remove_file(&stat_path).unwrap();
        // the open descriptor still points at the unlinked inode
        assert!(sampler.sample().is_some());

        let mut fresh = MemorySampler::new(dir.path(), Vec::new());
        assert!(fresh.sample().is_none());
        std::fs::write(&stat_path, "total_rss 1\n").unwrap();
        assert_eq!(fresh.sample().unwrap().stats, vec![("rss".to_owned(), 1)]);
    }

    #[test]
    fn test_normalize_char() {
        let normalized: String = "a(b):c".chars().map(normalize_char).collect();
        assert_eq!(normalized, "a_b  c");
    }
}
