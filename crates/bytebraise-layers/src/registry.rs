use std::env::VarError;
use std::path::{Path, PathBuf};

use anyhow::Context;
use regex::Regex;
use tracing::{debug, error, warn};

use bytebraise_conf::{parse_config_file, ConfData};
use bytebraise_util::path::{absolute, canonicalise_path, fnmatch};
use bytebraise_util::split::split_list_value;

use crate::errors::{LayerError, LayerResult};

/// One entry of `BBFILE_COLLECTIONS` with its file pattern and priority.
#[derive(Clone, Debug)]
pub struct Collection {
    pub name: String,
    pub pattern: String,
    pub regex: Option<Regex>,
    pub priority: i64,
}

impl Collection {
    pub fn matches<P: AsRef<Path>>(&self, path: P) -> bool {
        self.regex
            .as_ref()
            .is_some_and(|re| re.is_match(&path.as_ref().to_string_lossy()))
    }
}

#[derive(Clone, Debug)]
pub struct Layer {
    pub path: PathBuf,
    pub collections: Vec<Collection>,
}

impl Layer {
    /// First declared collection, or the directory name for layers that declare none.
    pub fn name(&self) -> String {
        match self.collections.first() {
            Some(collection) => collection.name.clone(),
            None => basename(&self.path),
        }
    }

    pub fn priority(&self) -> i64 {
        self.collections.first().map(|c| c.priority).unwrap_or(0)
    }

    pub fn contains<P: AsRef<Path>>(&self, path: P) -> bool {
        path.as_ref().starts_with(&self.path)
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Locate the build directory: the one given explicitly, else the first `BBPATH` entry or
/// ancestor of the current directory holding `conf/bblayers.conf`.
pub fn find_builddir(explicit: Option<&Path>) -> LayerResult<PathBuf> {
    if let Some(dir) = explicit {
        let dir = absolute(dir);
        if !dir.join("conf").join("bblayers.conf").exists() {
            return Err(LayerError::ConfigNotFound);
        }
        return Ok(dir);
    }

    let bbpath = match std::env::var("BBPATH") {
        Ok(val) => val,
        Err(VarError::NotPresent) => String::new(),
        Err(other_err) => return Err(anyhow::Error::from(other_err).into()),
    };
    let bbpath_entries = bbpath
        .split(':')
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect::<Vec<_>>();

    let cwd = std::env::current_dir()?;
    let path_ancestors = cwd.ancestors().map(PathBuf::from);

    for search_path in bbpath_entries.into_iter().chain(path_ancestors) {
        if search_path.join("conf").join("bblayers.conf").exists() {
            return Ok(search_path.canonicalize().unwrap_or(search_path));
        }
    }

    Err(LayerError::ConfigNotFound)
}

/// The configured layers of a build directory, evaluated from `conf/bblayers.conf` and each
/// layer's `conf/layer.conf`.
#[derive(Debug)]
pub struct LayerRegistry {
    builddir: PathBuf,
    data: ConfData,
    layers: Vec<Layer>,
}

impl LayerRegistry {
    pub fn load<P: AsRef<Path>>(builddir: P) -> LayerResult<Self> {
        let builddir = builddir.as_ref().to_path_buf();
        let bblayers_conf = builddir.join("conf").join("bblayers.conf");
        if !bblayers_conf.exists() {
            return Err(LayerError::ConfigNotFound);
        }

        let mut data = ConfData::new();
        data.set_var("BB_CURRENT_MC", "default");
        data.set_path_var("TOPDIR", &builddir);
        parse_config_file(&bblayers_conf, &mut data)?;

        let layer_dirs = split_list_value(&data.get_var_or_empty("BBLAYERS")?)
            .iter()
            .map(|l| PathBuf::from(canonicalise_path(l)))
            .collect::<Vec<_>>();

        let broken_layers = layer_dirs
            .iter()
            .filter(|path| !path.join("conf").join("layer.conf").is_file())
            .cloned()
            .collect::<Vec<_>>();
        if !broken_layers.is_empty() {
            return Err(LayerError::BrokenLayers(broken_layers));
        }

        let mut declared = vec![];
        for layer in &layer_dirs {
            let before = split_list_value(&data.get_var_or_empty("BBFILE_COLLECTIONS")?);

            data.set_path_var("LAYERDIR", layer);
            data.set_var("LAYERDIR_RE", regex::escape(&layer.to_string_lossy()));

            let layer_conf = layer.join("conf").join("layer.conf");
            debug!("parsing {:?}", layer_conf);
            parse_config_file(&layer_conf, &mut data)
                .with_context(|| format!("unable to parse {layer_conf:?}"))?;

            data.expand_varref("LAYERDIR")?;
            data.expand_varref("LAYERDIR_RE")?;

            let names = split_list_value(&data.get_var_or_empty("BBFILE_COLLECTIONS")?)
                .into_iter()
                .filter(|name| !before.contains(name))
                .collect::<Vec<_>>();
            declared.push((layer.clone(), names));
        }

        data.del_var("LAYERDIR");
        data.del_var("LAYERDIR_RE");

        let mut layers = vec![];
        for (path, names) in declared {
            let collections = names
                .into_iter()
                .map(|name| collection_config(&data, name))
                .collect::<LayerResult<Vec<_>>>()?;
            layers.push(Layer { path, collections });
        }

        Ok(Self {
            builddir,
            data,
            layers,
        })
    }

    pub fn builddir(&self) -> &Path {
        &self.builddir
    }

    pub fn bblayers_conf(&self) -> PathBuf {
        self.builddir.join("conf").join("bblayers.conf")
    }

    pub fn data(&self) -> &ConfData {
        &self.data
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_by_name(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.name() == name)
    }

    /// Name of the collection whose pattern covers `layer_dir`, or its basename.
    pub fn layer_name<P: AsRef<Path>>(&self, layer_dir: P) -> String {
        let probe = layer_dir.as_ref().join("test");
        self.config_priorities()
            .find(|c| c.matches(&probe))
            .map(|c| c.name.clone())
            .unwrap_or_else(|| basename(layer_dir.as_ref()))
    }

    /// All collections, in `BBLAYERS` order.
    pub fn config_priorities(&self) -> impl Iterator<Item = &Collection> {
        self.layers.iter().flat_map(|layer| layer.collections.iter())
    }

    pub fn bbfiles(&self) -> LayerResult<Vec<String>> {
        Ok(split_list_value(&self.data.get_var_or_empty("BBFILES")?))
    }

    /// The collection owning `path`: the one whose pattern matches the first `BBFILES` entry
    /// covering `path` (or `path` itself), preferring the longest pattern for nested layers.
    pub fn file_collection<P: AsRef<Path>>(&self, path: P) -> LayerResult<Option<&Collection>> {
        let path = path.as_ref().to_string_lossy();

        let longest_match = |candidate: &str| {
            self.config_priorities()
                .filter(|c| c.regex.as_ref().is_some_and(|re| re.is_match(candidate)))
                .max_by_key(|c| c.pattern.len())
        };

        let bbfiles = self.bbfiles()?;
        Ok(match bbfiles.iter().find(|entry| fnmatch(&path, entry)) {
            Some(entry) => longest_match(entry),
            None => longest_match(&path),
        })
    }

    /// Layer a file belongs to, via its owning collection.
    pub fn file_layer<P: AsRef<Path>>(&self, path: P) -> LayerResult<Option<&Layer>> {
        let Some(collection) = self.file_collection(path)? else {
            return Ok(None);
        };

        Ok(self
            .layers
            .iter()
            .find(|layer| layer.collections.iter().any(|c| c.name == collection.name)))
    }

    pub fn file_priority<P: AsRef<Path>>(&self, path: P) -> LayerResult<i64> {
        Ok(self
            .file_collection(path)?
            .map(|c| c.priority)
            .unwrap_or(0))
    }
}

fn collection_config(data: &ConfData, name: String) -> LayerResult<Collection> {
    let pattern = data.get_var_or_empty(&format!("BBFILE_PATTERN_{name}"))?;
    let regex = match pattern.is_empty() {
        true => None,
        false => match Regex::new(&format!("^(?:{pattern})")) {
            Ok(re) => Some(re),
            Err(err) => {
                error!("BBFILE_PATTERN_{} \"{}\" is not a valid regular expression: {}", name, pattern, err);
                None
            }
        },
    };

    let priority = match data.get_var(&format!("BBFILE_PRIORITY_{name}"))? {
        None => 0,
        Some(value) => match value.trim().parse::<i64>() {
            Ok(priority) => priority,
            Err(_) => {
                warn!("invalid value for BBFILE_PRIORITY_{}: \"{}\"", name, value);
                0
            }
        },
    };

    Ok(Collection {
        name,
        pattern,
        regex,
        priority,
    })
}
