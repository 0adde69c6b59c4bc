//! Recipe creation helpers for Python projects: reads `setup.py`, `PKG-INFO` and egg-info
//! metadata and turns it into recipe variables and runtime dependencies.

pub mod context;
pub mod deps;
pub mod errors;
pub mod extract;
pub mod fields;
pub mod handler;
pub mod introspect;
pub mod metadata;
pub mod pkginfo;
pub mod pyliteral;
pub mod python;
pub mod setup_script;

pub use context::RecipeContext;
pub use deps::{DependencyScanner, PythondepsScanner};
pub use errors::{ExtractError, ExtractResult};
pub use extract::{Extraction, SetupExtractor};
pub use handler::{process_handlers, RecipeHandler};
pub use introspect::{PythonSetupIntrospector, SetupIntrospector};
pub use metadata::{FieldValue, SetupInfo};
pub use python::PythonRecipeHandler;
