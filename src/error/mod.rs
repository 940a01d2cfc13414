//! Build Errors.
use crate::version::{MAX_PG_VERSION, MIN_PG_VERSION};
use std::{io, path::PathBuf, time::Duration};
use thiserror::Error;

/// Build errors.
#[derive(Error, Debug)]
pub enum BuildError {
    /// The host OS family has no supported packaging toolchain.
    #[error("unsupported OS: {0}")]
    UnsupportedOs(String),

    /// A Postgres version string is not an integer.
    #[error("invalid PG version: {0}")]
    InvalidVersion(String),

    /// A Postgres major version lies outside the supported range.
    #[error("PG version {0} out of valid range ({min}-{max})", min = MIN_PG_VERSION, max = MAX_PG_VERSION)]
    VersionRange(i64),

    /// The RPM spec, Debian control file, or fallback Makefile is missing.
    #[error("build file not found: {}", .0.display())]
    MissingBuildFile(PathBuf),

    /// Command spawn failure or unsuccessful exit.
    #[error("executing `{0}`: {1}")]
    Command(String, String),

    /// First error-indicative line a failed command wrote to stderr.
    #[error("{0}")]
    Process(String),

    /// Command killed after exceeding its deadline.
    #[error("executing `{0}`: timed out after {1:?}")]
    Timeout(String, Duration),

    /// No package was built for any requested version.
    #[error("build failed for {package} ({}), see log: {}", .failed.join(", "), .log.display())]
    Failed {
        /// Package name.
        package: String,
        /// Labels of the failed tasks, e.g., `PG17` or `ALL`.
        failed: Vec<String>,
        /// Build log path.
        log: PathBuf,
    },

    /// IO error.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// File error.
    #[error("{0} {1}: {2}")]
    File(&'static str, String, io::ErrorKind),

    /// URL Error.
    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// URL lacks a file name segment.
    #[error("missing file name segment from {0}")]
    NoUrlFile(url::Url),

    /// URL scheme Error.
    #[error("unsupported URL scheme: {0}")]
    Scheme(String),

    /// HTTP error.
    #[error(transparent)]
    Http(#[from] Box<ureq::Error>),

    /// Downloaded byte count disagrees with the advertised length.
    #[error("size mismatch after download: got {got}, expected {expected}")]
    SizeMismatch {
        /// Bytes written.
        got: u64,
        /// Advertised `Content-Length`.
        expected: u64,
    },

    /// Serde JSON error.
    #[error("invalid JSON: {0}")]
    Serde(#[from] serde_json::Error),

    /// Invalid artifact glob.
    #[error(transparent)]
    Glob(#[from] glob::PatternError),

    /// Unexpected data error.
    #[error("{0}")]
    Invalid(&'static str),
}

impl From<ureq::Error> for BuildError {
    fn from(value: ureq::Error) -> Self {
        Self::Http(Box::new(value))
    }
}
