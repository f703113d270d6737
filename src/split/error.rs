use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Construction-time failures. Runtime filesystem errors travel as FUSE
/// errno values instead.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("chunk size must be larger than 0 bytes")]
    InvalidChunkSize,

    #[error("source {}: cannot stat: {source}", path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("source {}: not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("invalid exclude regexp {pattern:?}: {source}")]
    InvalidExcludeRegexp {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown filename hash {0:?}")]
    UnknownFilenameHash(String),
}
