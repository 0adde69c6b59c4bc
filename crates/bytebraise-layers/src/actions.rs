use std::cmp::Reverse;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::warn;

use bytebraise_conf::editor::{edit_bblayers_conf, edit_metadata_file, EditAction};
use bytebraise_util::path::absolute;

use crate::errors::{LayerError, LayerResult};
use crate::registry::LayerRegistry;

/// Add a layer directory to `BBLAYERS`. Returns the layers that were already present.
pub fn add_layer<P: AsRef<Path>>(bblayers_conf: &Path, layer_dir: P) -> LayerResult<Vec<String>> {
    let layer_dir = absolute(layer_dir.as_ref());
    if !layer_dir.exists() {
        return Err(LayerError::InvalidArgument(String::from(
            "Specified layer directory doesn't exist",
        )));
    }

    if !layer_dir.join("conf").join("layer.conf").exists() {
        return Err(LayerError::InvalidArgument(String::from(
            "Specified layer directory doesn't contain a conf/layer.conf file",
        )));
    }

    if !bblayers_conf.exists() {
        return Err(LayerError::ConfigNotFound);
    }

    let (not_added, _) = edit_bblayers_conf(
        bblayers_conf,
        &[layer_dir.to_string_lossy().into_owned()],
        &[],
    )?;
    for item in &not_added {
        warn!("Specified layer {} is already in BBLAYERS", item);
    }

    Ok(not_added)
}

/// Turn a `remove-layer` argument into the pattern matched against `BBLAYERS` entries.
pub fn removal_pattern(layer: &str) -> String {
    if layer.starts_with('*') {
        layer.to_string()
    } else if !layer.contains('/') {
        format!("*/{layer}")
    } else {
        absolute(Path::new(layer)).to_string_lossy().into_owned()
    }
}

/// Remove the layers matching `layer` (a directory, a layer directory name, or a wildcard
/// pattern) from `BBLAYERS`.
pub fn remove_layer(bblayers_conf: &Path, layer: &str) -> LayerResult<()> {
    if !bblayers_conf.exists() {
        return Err(LayerError::ConfigNotFound);
    }

    let (_, not_removed) = edit_bblayers_conf(bblayers_conf, &[], &[removal_pattern(layer)])?;
    if !not_removed.is_empty() {
        return Err(LayerError::NothingRemoved(not_removed));
    }

    Ok(())
}

/// Rewrite `BBLAYERS` with the configured layers ordered by priority, highest first. Later
/// assignments to `BBLAYERS` are dropped.
pub fn sort_layers(registry: &LayerRegistry) -> LayerResult<bool> {
    let mut priorities: IndexMap<PathBuf, i64> = IndexMap::new();
    for layer in registry.layers() {
        for collection in &layer.collections {
            priorities.insert(layer.path.clone(), collection.priority);
        }
    }

    let mut sorted = priorities.into_iter().collect::<Vec<_>>();
    sorted.sort_by_key(|(_, priority)| Reverse(*priority));

    let mut bblayers = Some(
        sorted
            .into_iter()
            .map(|(path, _)| path.to_string_lossy().into_owned())
            .collect::<Vec<_>>(),
    );

    let bblayers_conf = registry.bblayers_conf();
    if !bblayers_conf.exists() {
        return Err(LayerError::ConfigNotFound);
    }

    let changed = edit_metadata_file(&bblayers_conf, &["BBLAYERS"], |_, _, _| {
        match bblayers.take() {
            Some(layers) => EditAction::ReplaceWithOp(String::from("="), layers),
            None => EditAction::Delete,
        }
    })?;

    Ok(changed)
}
