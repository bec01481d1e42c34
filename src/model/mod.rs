use thiserror::Error;

pub mod goopfile;
pub mod lock;

pub use goopfile::Dependency;
pub use lock::LockFile;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading manifest: {0}")]
    IO(#[from] std::io::Error),
    #[error("Parse failed at line {line}: {reason}: {text}")]
    Line {
        line: usize,
        text: String,
        reason: LineError,
    },
}

/// Why a single manifest line was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("multiple revisions")]
    MultipleRevisions,
    #[error("multiple urls")]
    MultipleUrls,
    #[error("empty revision")]
    EmptyRevision,
    #[error("empty url")]
    EmptyUrl,
    #[error("unrecognized token `{0}`")]
    UnrecognizedToken(String),
}
