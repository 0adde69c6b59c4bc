use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfError {
    #[error("variable {var} references itself")]
    RecursiveReference { var: String },

    #[error("{file}:{line}: unparsed line: '{text}'")]
    Syntax {
        file: String,
        line: usize,
        text: String,
    },

    #[error("could not include required file {file} (searched {search_path})")]
    MissingRequire { file: PathBuf, search_path: String },

    #[error("include cycle: {}", .chain.iter().map(|f| f.display().to_string()).collect::<Vec<_>>().join(" -> "))]
    IncludeCycle { chain: Vec<PathBuf> },

    #[error("unable to find {var} in {file:?}")]
    MissingAssignment { var: String, file: PathBuf },
}

pub type ConfResult<T> = anyhow::Result<T>;
