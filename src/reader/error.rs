use std::path::PathBuf;

/// Errors raised while (re)loading a [`super::CachedFile`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open file `{path}`: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to rewind file `{path}`: {source}")]
    Rewind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("file `{path}` is empty")]
    Empty { path: PathBuf },
    #[error("file `{path}` does not fit into the {capacity} bytes read buffer")]
    TooLarge { path: PathBuf, capacity: usize },
    #[error("file `{path}` does not contain valid UTF-8")]
    InvalidUtf8 { path: PathBuf },
    #[error("invalid integer `{value}` in file `{path}`: {source}")]
    InvalidInteger {
        path: PathBuf,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
