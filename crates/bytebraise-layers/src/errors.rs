use std::fmt;
use std::path::PathBuf;

use itertools::Itertools;
use thiserror::Error;

/// A `layer.conf` that could not be evaluated while searching for layers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerParseError {
    pub source: PathBuf,
    pub message: String,
}

impl fmt::Display for LayerParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source.display(), self.message)
    }
}

fn describe_parse_errors(errors: &[LayerParseError]) -> String {
    if errors.is_empty() {
        return String::new();
    }

    format!(
        ". Parse errors occurred:\n{}",
        errors.iter().map(|e| format!("  {e}\n")).join("")
    )
}

fn describe_paths(paths: &[PathBuf]) -> String {
    paths.iter().map(|p| format!("  {}\n", p.display())).join("")
}

#[derive(Error, Debug)]
pub enum LayerError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("Layer not found with name \"{name}\"{}", describe_parse_errors(.parse_errors))]
    LayerNotFound {
        name: String,
        parse_errors: Vec<LayerParseError>,
    },

    #[error("Duplicate layers with name \"{name}\":\n{}", describe_paths(.paths))]
    DuplicateLayers { name: String, paths: Vec<PathBuf> },

    #[error("Failed to find layers including \"{0}\"")]
    PathNotFound(String),

    #[error("No layers matching {} found in BBLAYERS", .0.join(", "))]
    NothingRemoved(Vec<String>),

    #[error("Unable to find bblayers.conf")]
    ConfigNotFound,

    #[error("these layers don't exist: {0:?}")]
    BrokenLayers(Vec<PathBuf>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LayerError {
    /// Process exit status bitbake-layers uses for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            LayerError::LayerNotFound { parse_errors, .. } if !parse_errors.is_empty() => 2,
            LayerError::DuplicateLayers { .. } => 3,
            _ => 1,
        }
    }
}

pub type LayerResult<T> = Result<T, LayerError>;
