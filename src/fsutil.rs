use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// Error that occurs when opening a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to open file `{path}`: {source}")]
pub struct FileOpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// Used for one-shot reads such as the mount table, which may exceed the
/// [`crate::reader::MAX_FILE_SIZE`] bound of the cached readers.
///
/// # Errors
///
/// Returns a [`FileOpenError`] if the file cannot be opened.
///
/// # Example
/// ```no_run
/// # use cgroup_sampler::fsutil;
/// let reader = fsutil::open_file_reader("/proc/self/mounts")?;
/// # Ok::<(), fsutil::FileOpenError>(())
/// ```
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileOpenError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FileOpenError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Reads the first whitespace-delimited token of a file.
///
/// # Errors
///
/// Returns a [`FileOpenError`] if the file cannot be opened, or the read error otherwise.
pub fn read_first_token(path: impl AsRef<Path>) -> io::Result<String> {
    use std::io::Read;

    let mut contents = String::new();
    open_file_reader(path)
        .map_err(|err| io::Error::new(err.source.kind(), err))?
        .read_to_string(&mut contents)?;
    Ok(contents
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_owned())
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_open_file_reader_success() {
        let tmp = tempfile::NamedTempFile::new().expect("failed to create temp file");
        let path = tmp.path();
        let reader = open_file_reader(path).expect("should open test file");
        let metadata = reader.get_ref().metadata().unwrap();
        assert!(metadata.is_file());
    }

    #[test]
    fn test_open_file_reader_error() {
        let result = open_file_reader("/definitely/does/not/exist");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.path, PathBuf::from("/definitely/does/not/exist"));
        assert_eq!(err.source.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_read_first_token() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "0-3,5\n").unwrap();
        assert_eq!(read_first_token(tmp.path()).unwrap(), "0-3,5");

        std::fs::write(tmp.path(), "\n").unwrap();
        assert_eq!(read_first_token(tmp.path()).unwrap(), "");
    }

    #[test]
    fn test_read_first_token_missing_file() {
        let err = read_first_token("/definitely/does/not/exist").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
