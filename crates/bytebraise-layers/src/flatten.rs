//! Merge several layers into a single output layer.
//!
//! Recipes overlayed by a higher priority layer are left out, appends are concatenated onto the
//! recipes they extend, and every other file is copied to the same relative path in the output.
//! Only the lowest priority layer's `conf/layer.conf` is kept.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{info, warn};
use walkdir::WalkDir;

use bytebraise_util::path::fnmatch;

use crate::collection::RecipeCollection;
use crate::errors::{LayerError, LayerResult};
use crate::registry::{Layer, LayerRegistry};

/// What a flatten run did, in the order it happened.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlattenReport {
    pub copied: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub overwritten: Vec<PathBuf>,
    /// `(append, recipe in the output)`
    pub applied_appends: Vec<(PathBuf, PathBuf)>,
    pub orphaned_appends: Vec<PathBuf>,
    pub unmatched: Vec<PathBuf>,
    /// Source files that could not be copied or appended
    pub failed: Vec<PathBuf>,
}

pub struct Flattener<'a> {
    registry: &'a LayerRegistry,
    collection: &'a RecipeCollection,
}

fn is_vcs_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name == ".git" || name == ".hg")
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}

/// Copy `src` to `dest`. Symlinks are recreated, not followed, and an existing symlink at
/// `dest` is replaced rather than written through.
fn copy_file(src: &Path, dest: &Path) -> io::Result<()> {
    if is_symlink(dest) {
        fs::remove_file(dest)?;
    }

    if is_symlink(src) {
        return symlink(fs::read_link(src)?, dest);
    }

    fs::copy(src, dest).map(|_| ())
}

impl<'a> Flattener<'a> {
    pub fn new(registry: &'a LayerRegistry, collection: &'a RecipeCollection) -> Self {
        Self {
            registry,
            collection,
        }
    }

    /// Flatten the layers named in `layer_names` (all configured layers when empty) into
    /// `output_dir`, which must be missing or empty.
    pub fn flatten<P: AsRef<Path>>(
        &self,
        layer_names: &[String],
        output_dir: P,
    ) -> LayerResult<FlattenReport> {
        let output_dir = output_dir.as_ref();

        if layer_names.len() == 1 {
            return Err(LayerError::InvalidArgument(String::from(
                "If you specify layers to flatten you must specify at least two",
            )));
        }

        if output_dir.exists() && fs::read_dir(output_dir)?.next().is_some() {
            return Err(LayerError::InvalidArgument(format!(
                "Directory {} exists and is non-empty, please clear it out first",
                output_dir.display()
            )));
        }

        let mut layers = self.select_layers(layer_names)?;
        layers.sort_by_key(|layer| layer.priority());

        let mut report = FlattenReport::default();
        for layer in &layers {
            self.copy_layer(layer, &layers, output_dir, &mut report)?;
        }

        self.copy_orphaned_appends(&layers, output_dir, &mut report)?;

        if let Some(first) = layers.first() {
            self.check_bbfiles(first, output_dir, &mut report)?;
        }

        Ok(report)
    }

    fn select_layers(&self, layer_names: &[String]) -> LayerResult<Vec<&'a Layer>> {
        let configured = self.registry.layers();
        if layer_names.is_empty() {
            return Ok(configured.iter().collect());
        }

        for name in layer_names {
            if !configured.iter().any(|layer| &layer.name() == name) {
                return Err(LayerError::LayerNotFound {
                    name: name.clone(),
                    parse_errors: vec![],
                });
            }
        }

        Ok(configured
            .iter()
            .filter(|layer| layer_names.contains(&layer.name()))
            .collect())
    }

    fn copy_layer(
        &self,
        layer: &Layer,
        layers: &[&Layer],
        output_dir: &Path,
        report: &mut FlattenReport,
    ) -> LayerResult<()> {
        let overlayed = self
            .collection
            .overlayed()
            .values()
            .flatten()
            .filter(|of| layer.contains(of))
            .collect::<Vec<_>>();

        info!("Copying files from {}...", layer.path.display());

        let walker = WalkDir::new(&layer.path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_vcs_dir(e));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Unable to read {}: {e}", layer.path.display());
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }

            let full = entry.path();
            if entry.path_is_symlink() && full.is_dir() {
                info!("  Skipping symlinked directory {}", full.display());
                continue;
            }

            if overlayed.iter().any(|of| of.as_path() == full) {
                info!("  Skipping overlayed file {}", full.display());
                report.skipped.push(full.to_path_buf());
                continue;
            }

            if has_extension(full, "bbappend") {
                continue;
            }

            let Ok(relative) = full.strip_prefix(&layer.path) else {
                continue;
            };
            let dest = output_dir.join(relative);

            if dest.exists() {
                let is_layer_conf = entry.file_name() == "layer.conf"
                    && full.parent().is_some_and(|p| p.ends_with("conf"));
                if is_layer_conf {
                    info!("  Skipping layer config file {}", full.display());
                    continue;
                }

                warn!("Overwriting file {}", dest.display());
                report.overwritten.push(dest.clone());
            }

            if let Err(e) = self.copy_into(full, &dest) {
                warn!("Unable to copy {} to {}: {e}", full.display(), dest.display());
                report.failed.push(full.to_path_buf());
                continue;
            }
            report.copied.push(dest.clone());

            if has_extension(full, "bb") {
                for append in self.collection.appends_for(full) {
                    if !layers.iter().any(|l| l.contains(append)) {
                        continue;
                    }

                    info!("  Applying append {} to {}", append.display(), dest.display());
                    match self.apply_append(append, &dest) {
                        Ok(()) => report
                            .applied_appends
                            .push((append.to_path_buf(), dest.clone())),
                        Err(e) => {
                            warn!("Unable to apply append {}: {e}", append.display());
                            report.failed.push(append.to_path_buf());
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Appends for recipes that did not end up in the output, e.g. because the recipe's layer
    /// was not selected. The first one for a recipe is copied as is; later ones are appended
    /// to that copy.
    fn copy_orphaned_appends(
        &self,
        layers: &[&Layer],
        output_dir: &Path,
        report: &mut FlattenReport,
    ) -> LayerResult<()> {
        let mut first_appends: IndexMap<&str, PathBuf> = IndexMap::new();

        for (recipe_name, append) in self.collection.appends() {
            if report.applied_appends.iter().any(|(a, _)| a == append)
                || report.failed.iter().any(|f| f == append)
            {
                continue;
            }

            let Some(layer) = layers.iter().find(|l| l.contains(append)) else {
                continue;
            };

            match first_appends.get(recipe_name) {
                Some(first) => {
                    info!("  Applying append {} to {}", append.display(), first.display());
                    if let Err(e) = self.apply_append(append, first) {
                        warn!("Unable to apply append {}: {e}", append.display());
                        report.failed.push(append.to_path_buf());
                        continue;
                    }
                }
                None => {
                    let Ok(relative) = append.strip_prefix(&layer.path) else {
                        continue;
                    };
                    let dest = output_dir.join(relative);
                    if let Err(e) = self.copy_into(append, &dest) {
                        warn!("Unable to copy {} to {}: {e}", append.display(), dest.display());
                        report.failed.push(append.to_path_buf());
                        continue;
                    }
                    first_appends.insert(recipe_name, dest);
                }
            }

            report.orphaned_appends.push(append.to_path_buf());
        }

        Ok(())
    }

    /// Warn about recipes and appends in the output that the kept `layer.conf`'s `BBFILES`
    /// will not pick up.
    fn check_bbfiles(
        &self,
        first: &Layer,
        output_dir: &Path,
        report: &mut FlattenReport,
    ) -> LayerResult<()> {
        let probe = first.path.join("test");
        let Some(first_collection) = self.registry.config_priorities().find(|c| c.matches(&probe))
        else {
            return Ok(());
        };

        let bbfiles_layer = self
            .registry
            .bbfiles()?
            .iter()
            .filter(|item| first_collection.matches(item.as_str()))
            .filter_map(|item| Path::new(item).strip_prefix(&first.path).ok())
            .map(|relative| output_dir.join(relative).to_string_lossy().into_owned())
            .collect::<Vec<_>>();

        if bbfiles_layer.is_empty() {
            return Ok(());
        }

        for entry in WalkDir::new(output_dir).sort_by_file_name() {
            let Ok(entry) = entry else {
                continue;
            };
            let path = entry.path();
            if entry.file_type().is_dir()
                || !(has_extension(path, "bb") || has_extension(path, "bbappend"))
            {
                continue;
            }

            let full = path.to_string_lossy();
            if !bbfiles_layer.iter().any(|item| fnmatch(&full, item)) {
                warn!(
                    "File {} does not match the flattened layer's BBFILES setting, you may need to edit conf/layer.conf or move the file elsewhere",
                    full
                );
                report.unmatched.push(path.to_path_buf());
            }
        }

        Ok(())
    }

    fn copy_into(&self, src: &Path, dest: &Path) -> io::Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        copy_file(src, dest)
    }

    fn apply_append(&self, append: &Path, recipe: &Path) -> LayerResult<()> {
        let layer_name = self
            .registry
            .file_layer(append)?
            .map(|layer| layer.name())
            .unwrap_or_else(|| String::from("?"));

        let contents = fs::read_to_string(append)?;
        let mut recipe_file = OpenOptions::new().append(true).open(recipe)?;
        write!(recipe_file, "\n##### bbappended from {layer_name} #####\n{contents}")?;

        Ok(())
    }
}
