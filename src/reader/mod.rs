//! Repeated reads of small kernel pseudo-files through a single long-lived descriptor.
//!
//! Files under `/proc` and `/sys/fs/cgroup` are re-sampled on every monitoring tick.
//! Opening a fresh descriptor for each sample costs far more than the read itself, so
//! [`CachedFile`] opens its file once, rewinds it on every later load, and pulls the
//! whole content in with a single bounded `read(2)` into a buffer owned by the reader.
//!
//! # Usage
//!
//! ```no_run
//! use cgroup_sampler::reader::CachedFile;
//!
//! let mut reader = CachedFile::new("/proc/stat");
//! reader.open_or_rewind()?;
//! while let Some(line) = reader.next_line() {
//!     println!("{line}");
//! }
//! # Ok::<(), cgroup_sampler::reader::Error>(())
//! ```
//!
//! A [`CachedFile`] is not reentrant: its buffer and line cursor are plain mutable state,
//! so every instance must only be driven from one thread at a time. Borrowed lines are
//! tied to the current load and cannot outlive the next [`CachedFile::open_or_rewind`].

mod error;
mod stats;

pub use error::{Error, Result};
pub use stats::{ParseStats, parse_label_value};

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Capacity of the per-reader buffer.
///
/// `/proc/stat` on large hosts does not fit into 8 KiB, hence 16 KiB.
pub const MAX_FILE_SIZE: usize = 16 * 1024;

/// A small file that is loaded over and over through the same descriptor.
#[derive(Debug)]
pub struct CachedFile {
    path: PathBuf,
    file: Option<File>,
    buf: Box<[u8]>,
    /// Number of valid bytes in `buf` for the current load.
    len: usize,
    /// Offset of the next unconsumed line, `None` once exhausted or before the first load.
    cursor: Option<usize>,
    lines_consumed: usize,
}

impl CachedFile {
    /// Creates a reader bound to `path`. The file is not opened until the first
    /// [`CachedFile::open_or_rewind`].
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
            buf: vec![0u8; MAX_FILE_SIZE].into_boxed_slice(),
            len: 0,
            cursor: None,
            lines_consumed: 0,
        }
    }

    /// Returns the path this reader is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` while a descriptor is held open.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Opens the file on first use, rewinds it afterwards, and loads the whole content.
    ///
    /// The line cursor is reset to the first line.
    ///
    /// # Errors
    ///
    /// - [`Error::Open`], [`Error::Rewind`] or [`Error::Read`] if the syscall fails. The
    ///   descriptor is dropped so that the next call reopens the file.
    /// - [`Error::Empty`] if the read returned no data.
    /// - [`Error::TooLarge`] if the content fills the whole buffer; no partial content is
    ///   ever exposed.
    /// - [`Error::InvalidUtf8`] if the content is not UTF-8.
    pub fn open_or_rewind(&mut self) -> Result<()> {
        self.len = 0;
        self.cursor = None;
        self.lines_consumed = 0;

        // The descriptor is taken out while in use; a failed syscall drops it so that
        // the next call reopens the file.
        let mut file = match self.file.take() {
            Some(mut file) => {
                file.seek(SeekFrom::Start(0))
                    .map_err(|source| Error::Rewind {
                        path: self.path.clone(),
                        source,
                    })?;
                file
            }
            None => File::open(&self.path).map_err(|source| Error::Open {
                path: self.path.clone(),
                source,
            })?,
        };

        let nread = file.read(&mut self.buf).map_err(|source| Error::Read {
            path: self.path.clone(),
            source,
        })?;
        self.file = Some(file);

        if nread == 0 {
            return Err(Error::Empty {
                path: self.path.clone(),
            });
        }
        if nread >= self.buf.len() {
            return Err(Error::TooLarge {
                path: self.path.clone(),
                capacity: self.buf.len(),
            });
        }
        if std::str::from_utf8(&self.buf[..nread]).is_err() {
            return Err(Error::InvalidUtf8 {
                path: self.path.clone(),
            });
        }

        self.len = nread;
        self.cursor = Some(0);
        Ok(())
    }

    /// Returns the next newline-terminated line of the current load, without its `\n`.
    ///
    /// Trailing content that is not terminated by a newline is never returned. Once this
    /// returns `None` it keeps doing so until the next [`CachedFile::open_or_rewind`].
    pub fn next_line(&mut self) -> Option<&str> {
        let start = self.cursor?;
        let content = &self.buf[..self.len];
        if start >= content.len() {
            self.cursor = None;
            return None;
        }

        match content[start..].iter().position(|&b| b == b'\n') {
            Some(offset) => {
                let end = start + offset;
                self.cursor = Some(end + 1);
                self.lines_consumed += 1;
                std::str::from_utf8(&self.buf[start..end]).ok()
            }
            None => {
                self.cursor = None;
                None
            }
        }
    }

    /// Number of lines returned by [`CachedFile::next_line`] since the last load.
    pub fn lines_consumed(&self) -> usize {
        self.lines_consumed
    }

    /// The whole content of the current load, empty if the last load failed.
    pub fn content(&self) -> &str {
        std::str::from_utf8(&self.buf[..self.len]).unwrap_or_default()
    }

    /// Reloads the file and parses its whole content as a single unsigned integer.
    ///
    /// # Errors
    ///
    /// Returns any error of [`CachedFile::open_or_rewind`], or [`Error::InvalidInteger`].
    pub fn read_integer(&mut self) -> Result<u64> {
        self.open_or_rewind()?;
        let value = self.content().trim();
        value.parse::<u64>().map_err(|source| Error::InvalidInteger {
            path: self.path.clone(),
            value: value.to_owned(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn tempfile_with(contents: &[u8]) -> NamedTempFile {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(contents).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    fn collect_lines(reader: &mut CachedFile) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line() {
            lines.push(line.to_owned());
        }
        lines
    }

    #[test]
    fn test_lines_in_order_without_delimiter() {
        let tmp = tempfile_with(b"first line\nsecond\n\nfourth 4\n");
        let mut reader = CachedFile::new(tmp.path());

        reader.open_or_rewind().unwrap();
        let lines = collect_lines(&mut reader);

        assert_eq!(lines, vec!["first line", "second", "", "fourth 4"]);
        assert_eq!(reader.lines_consumed(), 4);
    }

    #[test]
    fn test_unterminated_tail_is_not_returned() {
        let tmp = tempfile_with(b"a\nb\ntail");
        let mut reader = CachedFile::new(tmp.path());

        reader.open_or_rewind().unwrap();
        assert_eq!(collect_lines(&mut reader), vec!["a", "b"]);
    }

    #[test]
    fn test_none_is_sticky_until_rewind() {
        let tmp = tempfile_with(b"only\n");
        let mut reader = CachedFile::new(tmp.path());

        reader.open_or_rewind().unwrap();
        assert_eq!(reader.next_line(), Some("only"));
        assert_eq!(reader.next_line(), None);
        assert_eq!(reader.next_line(), None);

        reader.open_or_rewind().unwrap();
        assert_eq!(reader.next_line(), Some("only"));
    }

    #[test]
    fn test_rewind_resets_cursor() {
        let tmp = tempfile_with(b"1\n2\n3\n");
        let mut reader = CachedFile::new(tmp.path());

        reader.open_or_rewind().unwrap();
        assert_eq!(reader.next_line(), Some("1"));
        assert_eq!(reader.next_line(), Some("2"));

        reader.open_or_rewind().unwrap();
        assert_eq!(reader.lines_consumed(), 0);
        assert_eq!(reader.next_line(), Some("1"));
    }

    #[test]
    fn test_rewind_sees_updated_content_on_same_descriptor() {
        let tmp = tempfile_with(b"100\n");
        let mut reader = CachedFile::new(tmp.path());

        assert_eq!(reader.read_integer().unwrap(), 100);
        std::fs::write(tmp.path(), b"250\n").unwrap();
        assert!(reader.is_open());
        assert_eq!(reader.read_integer().unwrap(), 250);
    }

    #[test]
    fn test_next_line_before_load() {
        let tmp = tempfile_with(b"x\n");
        let mut reader = CachedFile::new(tmp.path());
        assert_eq!(reader.next_line(), None);
    }

    #[test]
    fn test_missing_file() {
        let mut reader = CachedFile::new("/definitely/does/not/exist");
        let err = reader.open_or_rewind().unwrap_err();
        match err {
            Error::Open { path, source } => {
                assert_eq!(path, PathBuf::from("/definitely/does/not/exist"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!reader.is_open());
    }

    #[test]
    fn test_empty_file_is_an_error() {
        let tmp = tempfile_with(b"");
        let mut reader = CachedFile::new(tmp.path());
        assert!(matches!(
            reader.open_or_rewind().unwrap_err(),
            Error::Empty { .. }
        ));
        assert_eq!(reader.next_line(), None);
    }

    #[test]
    fn test_oversized_file_is_rejected() {
        let tmp = tempfile_with(&vec![b'x'; MAX_FILE_SIZE]);
        let mut reader = CachedFile::new(tmp.path());
        match reader.open_or_rewind().unwrap_err() {
            Error::TooLarge { capacity, .. } => assert_eq!(capacity, MAX_FILE_SIZE),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(reader.next_line(), None);
        assert_eq!(reader.content(), "");
    }

    #[test]
    fn test_largest_accepted_file() {
        let mut contents = vec![b'y'; MAX_FILE_SIZE - 2];
        contents.push(b'\n');
        let tmp = tempfile_with(&contents);
        let mut reader = CachedFile::new(tmp.path());

        reader.open_or_rewind().unwrap();
        assert_eq!(reader.next_line().map(str::len), Some(MAX_FILE_SIZE - 2));
    }

    #[test]
    fn test_read_integer() {
        let tmp = tempfile_with(b"9223372036854771712\n");
        let mut reader = CachedFile::new(tmp.path());
        assert_eq!(reader.read_integer().unwrap(), 9_223_372_036_854_771_712);

        std::fs::write(tmp.path(), b"12").unwrap();
        assert_eq!(reader.read_integer().unwrap(), 12);
    }

    #[test]
    fn test_read_invalid_integer() {
        let tmp = tempfile_with(b"max\n");
        let mut reader = CachedFile::new(tmp.path());
        match reader.read_integer().unwrap_err() {
            Error::InvalidInteger { value, .. } => assert_eq!(value, "max"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
