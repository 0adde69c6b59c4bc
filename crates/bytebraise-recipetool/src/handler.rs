use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use tracing::debug;

use crate::errors::ExtractResult;

/// One step of recipe creation: inspects a source tree and fills in the recipe being written.
pub trait RecipeHandler {
    /// Add to `classes` (inherited classes) and the recipe lines before and after the `inherit`
    /// line. `handled` names the aspects earlier handlers already took care of; a handler adds to
    /// it what it covers. Returns whether it handled anything.
    fn process(
        &self,
        srctree: &Path,
        classes: &mut Vec<String>,
        lines_before: &mut Vec<String>,
        lines_after: &mut Vec<String>,
        handled: &mut IndexSet<String>,
    ) -> ExtractResult<bool>;
}

/// Files under `srctree` matching any of the glob `patterns`.
pub fn checkfiles(srctree: &Path, patterns: &[&str]) -> ExtractResult<Vec<PathBuf>> {
    let mut found = vec![];
    for pattern in patterns {
        let pattern = format!("{}/{pattern}", srctree.display());
        found.extend(glob::glob(&pattern)?.flatten());
    }
    Ok(found)
}

/// Run `handlers` in order.
pub fn process_handlers(
    handlers: &[Box<dyn RecipeHandler>],
    srctree: &Path,
    classes: &mut Vec<String>,
    lines_before: &mut Vec<String>,
    lines_after: &mut Vec<String>,
    handled: &mut IndexSet<String>,
) -> ExtractResult<bool> {
    let mut any = false;
    for handler in handlers {
        if handler.process(srctree, classes, lines_before, lines_after, handled)? {
            any = true;
        }
    }
    debug!("handled: {:?}", handled);
    Ok(any)
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;
    use indexmap::indexset;
    use pretty_assertions::assert_eq;

    struct Marker(&'static str);

    impl RecipeHandler for Marker {
        fn process(
            &self,
            _srctree: &Path,
            classes: &mut Vec<String>,
            _lines_before: &mut Vec<String>,
            _lines_after: &mut Vec<String>,
            handled: &mut IndexSet<String>,
        ) -> ExtractResult<bool> {
            if !handled.insert(self.0.to_string()) {
                return Ok(false);
            }
            classes.push(self.0.to_string());
            Ok(true)
        }
    }

    #[test]
    fn chain() {
        let handlers: Vec<Box<dyn RecipeHandler>> = vec![
            Box::new(Marker("buildsystem")),
            Box::new(Marker("buildsystem")),
            Box::new(Marker("license")),
        ];
        let mut classes = vec![];
        let mut handled = IndexSet::new();
        let any = process_handlers(
            &handlers,
            Path::new("."),
            &mut classes,
            &mut vec![],
            &mut vec![],
            &mut handled,
        )
        .unwrap();

        assert!(any);
        assert_eq!(classes, vec!["buildsystem", "license"]);
        assert_eq!(
            handled,
            indexset! {String::from("buildsystem"), String::from("license")}
        );
    }

    #[test]
    fn find_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("setup.py"), "").unwrap();

        assert_eq!(
            checkfiles(dir.path(), &["setup.py", "CMakeLists.txt"]).unwrap(),
            vec![dir.path().join("setup.py")]
        );
        assert!(checkfiles(dir.path(), &["*.cabal"]).unwrap().is_empty());
    }
}
