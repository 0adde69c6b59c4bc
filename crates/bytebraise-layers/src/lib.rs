//! Layer management for a BitBake build directory: the configured layers and their
//! priorities, merging layers into one, searching for layers on disk, and editing
//! `conf/bblayers.conf`.

pub mod actions;
pub mod collection;
pub mod errors;
pub mod flatten;
pub mod registry;
pub mod resolve;

pub use collection::RecipeCollection;
pub use errors::{LayerError, LayerParseError, LayerResult};
pub use flatten::{FlattenReport, Flattener};
pub use registry::{find_builddir, Collection, Layer, LayerRegistry};
pub use resolve::{Resolver, DEFAULT_SEARCH_GLOBS};
