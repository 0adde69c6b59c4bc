use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("{file}:{line}: {message}")]
    Tokenize {
        file: String,
        line: usize,
        message: String,
    },

    #[error("Unable to run `{command}`: {message}")]
    Command { command: String, message: String },

    /// The only fatal extraction failure: the introspected values cannot be matched up with the
    /// requested fields.
    #[error("Mismatch between setup.py output lines and number of fields ({expected} fields, {actual} lines)")]
    FieldCountMismatch { expected: usize, actual: usize },

    #[error("unable to read {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ExtractResult<T> = Result<T, ExtractError>;
