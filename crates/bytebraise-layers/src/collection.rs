use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use bytebraise_util::index_map::IntoIndexMap;

use crate::errors::LayerResult;
use crate::registry::LayerRegistry;

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Recipe name an append applies to: `foo_1.0.bbappend` -> `foo_1.0.bb`.
fn append_target(append: &Path) -> String {
    let name = file_name(append);
    match name.strip_suffix(".bbappend") {
        Some(stem) => format!("{stem}.bb"),
        None => name,
    }
}

/// Whether an append (given by its target name) applies to `recipe_name`. A `%` in the append
/// name matches any version suffix.
fn append_matches(target: &str, recipe_name: &str) -> bool {
    match target.split_once('%') {
        Some((prefix, _)) => recipe_name.starts_with(prefix),
        None => target == recipe_name,
    }
}

/// The recipes and appends found through `BBFILES`, with the overlay relation between recipes
/// of the same name.
#[derive(Clone, Debug, Default)]
pub struct RecipeCollection {
    recipes: Vec<PathBuf>,
    appends: Vec<(String, PathBuf)>,
    overlayed: IndexMap<PathBuf, Vec<PathBuf>>,
}

impl RecipeCollection {
    pub fn collect(registry: &LayerRegistry) -> LayerResult<Self> {
        let mut files = IndexSet::new();
        for entry in registry.bbfiles()? {
            for found in glob::glob(&entry)? {
                match found {
                    Ok(path) => {
                        files.insert(path);
                    }
                    Err(err) => warn!("unable to read {:?}: {}", err.path(), err.error()),
                }
            }
        }

        let mut recipes = vec![];
        let mut appends = vec![];
        for file in files {
            match file.extension().and_then(|e| e.to_str()) {
                Some("bb") => recipes.push(file),
                Some("bbappend") => appends.push((append_target(&file), file)),
                _ => debug!("ignoring {:?}", file),
            }
        }

        let mut overlayed = IndexMap::new();
        let groups = recipes.iter().cloned().into_index_map_by(|r| file_name(r));
        for (_, group) in groups {
            if group.len() < 2 {
                continue;
            }

            let mut ranked = group
                .into_iter()
                .map(|r| Ok((registry.file_priority(&r)?, r)))
                .collect::<LayerResult<Vec<_>>>()?;
            // Highest priority first; equal priorities keep discovery order
            ranked.sort_by_key(|(priority, _)| std::cmp::Reverse(*priority));

            let mut ranked = ranked.into_iter().map(|(_, r)| r);
            if let Some(top) = ranked.next() {
                overlayed.insert(top, ranked.collect());
            }
        }

        Ok(Self::from_parts(recipes, appends, overlayed))
    }

    pub fn from_parts(
        recipes: Vec<PathBuf>,
        appends: Vec<(String, PathBuf)>,
        overlayed: IndexMap<PathBuf, Vec<PathBuf>>,
    ) -> Self {
        Self {
            recipes,
            appends,
            overlayed,
        }
    }

    pub fn recipes(&self) -> &[PathBuf] {
        &self.recipes
    }

    /// Winning recipe -> the lower priority recipes it shadows.
    pub fn overlayed(&self) -> &IndexMap<PathBuf, Vec<PathBuf>> {
        &self.overlayed
    }

    pub fn is_overlayed<P: AsRef<Path>>(&self, path: P) -> bool {
        self.overlayed
            .values()
            .any(|shadowed| shadowed.iter().any(|p| p == path.as_ref()))
    }

    /// `(recipe name, append path)` pairs in discovery order.
    pub fn appends(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.appends
            .iter()
            .map(|(target, path)| (target.as_str(), path.as_path()))
    }

    pub fn appends_for<P: AsRef<Path>>(&self, recipe: P) -> Vec<&Path> {
        let recipe_name = file_name(recipe.as_ref());
        self.appends
            .iter()
            .filter(|(target, _)| append_matches(target, &recipe_name))
            .map(|(_, path)| path.as_path())
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn append_names() {
        assert_eq!(append_target(Path::new("/l/busybox_1.36.bbappend")), "busybox_1.36.bb");
        assert!(append_matches("busybox_%.bb", "busybox_1.36.bb"));
        assert!(append_matches("busybox_1.36.bb", "busybox_1.36.bb"));
        assert!(!append_matches("busybox_1.35.bb", "busybox_1.36.bb"));
        assert!(!append_matches("busy_%.bb", "zlib_1.0.bb"));
    }

    #[test]
    fn appends_for_recipe() {
        let collection = RecipeCollection::from_parts(
            vec![PathBuf::from("/a/recipes-x/foo/foo_1.0.bb")],
            vec![
                (String::from("foo_%.bb"), PathBuf::from("/b/foo_%.bbappend")),
                (String::from("bar_1.0.bb"), PathBuf::from("/b/bar_1.0.bbappend")),
                (String::from("foo_1.0.bb"), PathBuf::from("/c/foo_1.0.bbappend")),
            ],
            IndexMap::new(),
        );

        assert_eq!(
            collection.appends_for("/a/recipes-x/foo/foo_1.0.bb"),
            vec![Path::new("/b/foo_%.bbappend"), Path::new("/c/foo_1.0.bbappend")]
        );
        assert!(collection.appends_for("/a/zlib_1.0.bb").is_empty());
    }

    #[test]
    fn overlay_lookup() {
        let mut overlayed = IndexMap::new();
        overlayed.insert(
            PathBuf::from("/high/foo_1.0.bb"),
            vec![PathBuf::from("/low/foo_1.0.bb")],
        );
        let collection = RecipeCollection::from_parts(vec![], vec![], overlayed);

        assert!(collection.is_overlayed("/low/foo_1.0.bb"));
        assert!(!collection.is_overlayed("/high/foo_1.0.bb"));
    }
}
