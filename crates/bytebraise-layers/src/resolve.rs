use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use tracing::debug;

use bytebraise_conf::{parse_config_file, ConfData};
use bytebraise_util::split::split_list_value;

use crate::errors::{LayerError, LayerParseError, LayerResult};
use crate::registry::LayerRegistry;

pub const DEFAULT_SEARCH_GLOBS: &str = "* */* ${COREBASE}/../* ${COREBASE}/../*/*";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FoundLayer {
    pub layer_conf: PathBuf,
    pub layer_dir: PathBuf,
}

/// Layer directories by declared name, plus the `layer.conf` files that failed to parse.
#[derive(Debug, Default)]
pub struct LayerSearch {
    pub by_name: IndexMap<String, IndexSet<PathBuf>>,
    pub errors: Vec<LayerParseError>,
}

/// Searches glob patterns for layers, with already configured layers taking precedence.
pub struct Resolver<'a> {
    data: &'a ConfData,
    configured: Vec<(String, PathBuf)>,
}

impl<'a> Resolver<'a> {
    /// `data` expands variables in search patterns; `configured` are `(collection, directory)`
    /// pairs of the active configuration.
    pub fn new(data: &'a ConfData, configured: Vec<(String, PathBuf)>) -> Self {
        Self { data, configured }
    }

    pub fn from_registry(registry: &'a LayerRegistry) -> Self {
        let configured = registry
            .layers()
            .iter()
            .flat_map(|layer| {
                layer
                    .collections
                    .iter()
                    .map(|c| (c.name.clone(), layer.path.clone()))
            })
            .collect();
        Self::new(registry.data(), configured)
    }

    /// Every `<pattern>/conf/layer.conf` matched by the whitespace separated `patterns`.
    pub fn find_layers(&self, patterns: &str) -> LayerResult<Vec<FoundLayer>> {
        let patterns = self.data.expand(patterns)?;

        let mut found = vec![];
        for pattern in patterns.split_whitespace() {
            let layer_conf_glob = Path::new(pattern).join("conf").join("layer.conf");
            for entry in glob::glob(&layer_conf_glob.to_string_lossy())? {
                let Ok(layer_conf) = entry else {
                    continue;
                };
                let layer_conf = layer_conf.canonicalize().unwrap_or(layer_conf);
                let Some(layer_dir) = layer_conf.parent().and_then(Path::parent) else {
                    continue;
                };
                found.push(FoundLayer {
                    layer_dir: layer_dir.to_path_buf(),
                    layer_conf,
                });
            }
        }

        Ok(found.into_iter().sorted().dedup().collect())
    }

    pub fn get_layers_by_name(&self, patterns: &str) -> LayerResult<LayerSearch> {
        let mut search = LayerSearch::default();
        for (name, dir) in &self.configured {
            search
                .by_name
                .entry(name.clone())
                .or_default()
                .insert(dir.clone());
        }

        let base = ConfData::new();
        for found in self.find_layers(patterns)? {
            let mut ldata = base.clone();
            ldata.set_path_var("LAYERDIR", &found.layer_dir);

            let names = parse_config_file(&found.layer_conf, &mut ldata)
                .and_then(|_| ldata.get_var_or_empty("BBFILE_COLLECTIONS"));
            let mut names = match names {
                Ok(names) => split_list_value(&names),
                Err(err) => {
                    debug!("unable to parse {:?}: {:#}", found.layer_conf, err);
                    search.errors.push(LayerParseError {
                        source: found.layer_conf.clone(),
                        message: format!("{err:#}"),
                    });
                    continue;
                }
            };

            if names.is_empty() {
                names.push(
                    found
                        .layer_dir
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                );
            }

            // Layers already in BBLAYERS win
            if names
                .iter()
                .any(|name| self.configured.iter().any(|(c, _)| c == name))
            {
                continue;
            }

            for name in names {
                search
                    .by_name
                    .entry(name)
                    .or_default()
                    .insert(found.layer_dir.clone());
            }
        }

        Ok(search)
    }

    /// Resolve each name to its single layer directory, calling `emit` for each one in order.
    /// Stops at the first name that is missing or ambiguous.
    pub fn find_layers_by_name<F>(&self, names: &[String], patterns: &str, mut emit: F) -> LayerResult<()>
    where
        F: FnMut(&str, &Path),
    {
        let search = self.get_layers_by_name(patterns)?;
        for name in names {
            match search.by_name.get(name).filter(|dirs| !dirs.is_empty()) {
                None => {
                    return Err(LayerError::LayerNotFound {
                        name: name.clone(),
                        parse_errors: search.errors.clone(),
                    });
                }
                Some(dirs) if dirs.len() > 1 => {
                    return Err(LayerError::DuplicateLayers {
                        name: name.clone(),
                        paths: dirs.iter().cloned().collect(),
                    });
                }
                Some(dirs) => {
                    if let Some(dir) = dirs.first() {
                        emit(name, dir);
                    }
                }
            }
        }

        Ok(())
    }

    /// For each requested relative path, call `emit` with every found layer containing it.
    /// Fails at the first path no layer contains.
    pub fn find_layer_with_path<F>(&self, paths: &[String], patterns: &str, mut emit: F) -> LayerResult<()>
    where
        F: FnMut(&str, &Path),
    {
        let found = self.find_layers(patterns)?;
        for path in paths {
            let containing = found
                .iter()
                .filter(|layer| layer.layer_dir.join(path).exists())
                .collect::<Vec<_>>();

            if containing.is_empty() {
                return Err(LayerError::PathNotFound(path.clone()));
            }

            for layer in containing {
                emit(path, &layer.layer_dir);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn write_layer(root: &Path, dir: &str, collections: &str) -> PathBuf {
        let layer = root.join(dir);
        fs::create_dir_all(layer.join("conf")).unwrap();
        fs::write(
            layer.join("conf").join("layer.conf"),
            format!("BBFILE_COLLECTIONS += \"{collections}\"\n"),
        )
        .unwrap();
        layer
    }

    #[test_log::test]
    fn find_layers_sorted_and_unique() {
        let root = tempfile::tempdir().unwrap();
        let root = root.path().canonicalize().unwrap();
        let b = write_layer(&root, "meta-b", "b");
        let a = write_layer(&root, "sub/meta-a", "a");

        let d = ConfData::new();
        let resolver = Resolver::new(&d, vec![]);
        let patterns = format!("{r}/* {r}/*/* {r}/meta-b", r = root.display());
        let found = resolver
            .find_layers(&patterns)
            .unwrap()
            .into_iter()
            .map(|f| f.layer_dir)
            .collect::<Vec<_>>();

        assert_eq!(found, vec![b, a]);
    }

    #[test]
    fn configured_layers_win() {
        let root = tempfile::tempdir().unwrap();
        let root = root.path().canonicalize().unwrap();
        write_layer(&root, "meta-foo", "foo");
        let bar = write_layer(&root, "meta-bar", "bar");

        let d = ConfData::new();
        let resolver = Resolver::new(&d, vec![(String::from("foo"), PathBuf::from("/configured/meta-foo"))]);
        let search = resolver
            .get_layers_by_name(&format!("{}/*", root.display()))
            .unwrap();

        assert_eq!(
            search.by_name["foo"].iter().collect::<Vec<_>>(),
            vec![Path::new("/configured/meta-foo")]
        );
        assert_eq!(search.by_name["bar"].iter().collect::<Vec<_>>(), vec![&bar]);
    }

    #[test]
    fn basename_when_no_collections() {
        let root = tempfile::tempdir().unwrap();
        let root = root.path().canonicalize().unwrap();
        let plain = write_layer(&root, "meta-plain", "");

        let d = ConfData::new();
        let resolver = Resolver::new(&d, vec![]);
        let mut found = vec![];
        resolver
            .find_layers_by_name(
                &[String::from("meta-plain")],
                &format!("{}/*", root.display()),
                |name, dir| found.push((name.to_string(), dir.to_path_buf())),
            )
            .unwrap();

        assert_eq!(found, vec![(String::from("meta-plain"), plain)]);
    }

    #[test]
    fn search_patterns_are_expanded() {
        let root = tempfile::tempdir().unwrap();
        let root = root.path().canonicalize().unwrap();
        let core = write_layer(&root, "meta", "core");
        fs::create_dir_all(root.join("poky")).unwrap();

        let mut d = ConfData::new();
        d.set_var("COREBASE", root.join("poky").display().to_string());
        let resolver = Resolver::new(&d, vec![]);
        let found = resolver.find_layers("${COREBASE}/../*").unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].layer_dir, core);
    }
}
