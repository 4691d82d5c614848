use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by corpus loading, training and model persistence.
///
/// Configuration problems never reach this type: clap reports them at the
/// process boundary, before any file is opened.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read corpus {path:?}: {source}")]
    CorpusIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path:?}:{line}: {reason}")]
    CorpusFormat {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("corpus {path:?} contains no instances")]
    EmptyCorpus { path: PathBuf },

    #[error("training failed: {0}")]
    Training(String),

    #[error("failed to read model {path:?}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    #[error("failed to write model {path:?}: {reason}")]
    Persistence { path: PathBuf, reason: String },
}

impl Error {
    /// Process exit code for this failure class. Code 2 is taken by clap for
    /// usage errors, 0 is success.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::CorpusIo { .. }
            | Error::CorpusFormat { .. }
            | Error::EmptyCorpus { .. }
            | Error::ModelLoad { .. } => 3,
            Error::Training(_) => 4,
            Error::Persistence { .. } => 5,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
