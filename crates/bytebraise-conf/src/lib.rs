//! Evaluation of BitBake `.conf` files (`bblayers.conf`, `layer.conf`, ...) into a [`ConfData`]
//! variable store, and line-preserving edits of variable assignments in such files.
//!
//! Only the configuration subset of the BitBake language is understood: assignments with all
//! operators, varflags, `:append`/`:prepend`/`:remove`, `export`, `unset`, `include` and
//! `require`. Recipe-only constructs (tasks, `inherit`, python functions) are rejected.

pub mod data;
pub mod editor;
pub mod errors;
pub mod parse;

pub use data::ConfData;
pub use errors::{ConfError, ConfResult};
pub use parse::{parse_config_file, parse_config_str};
