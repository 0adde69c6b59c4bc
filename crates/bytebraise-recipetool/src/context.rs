use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use tracing::debug;

use bytebraise_conf::{ConfData, ConfResult};

use crate::deps::provided_packages;
use crate::errors::ExtractResult;
use crate::fields::{ASSUME_PROVIDED, PYTHON_BUILTIN_MODULES};

/// Build configuration a recipe handler needs, created once per recipe creation run.
#[derive(Debug, Clone)]
pub struct RecipeContext {
    /// Packaged file lists of the build (`PKGDATA_DIR`)
    pub pkgdata_dir: Option<PathBuf>,
    /// Target `site-packages` directory
    pub python_sitedir: Option<PathBuf>,
    /// Modules never reported as unmapped dependencies
    pub assume_provided: BTreeSet<String>,
}

impl Default for RecipeContext {
    fn default() -> Self {
        Self {
            pkgdata_dir: None,
            python_sitedir: None,
            assume_provided: ASSUME_PROVIDED
                .iter()
                .chain(PYTHON_BUILTIN_MODULES.iter())
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl RecipeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_conf(d: &ConfData) -> ConfResult<Self> {
        let python_sitedir = match d.get_var("PYTHON_SITEPACKAGES_DIR")? {
            Some(dir) => Some(dir),
            None => Some(d.expand("${libdir}/${PYTHON_DIR}/site-packages")?)
                .filter(|dir| !dir.contains("${")),
        };

        Ok(Self {
            pkgdata_dir: d.get_var("PKGDATA_DIR")?.map(PathBuf::from),
            python_sitedir: python_sitedir.map(PathBuf::from),
            ..Self::default()
        })
    }

    /// Python module -> package providing it. Empty when the build has no package data.
    pub fn provided_packages(&self) -> ExtractResult<BTreeMap<String, String>> {
        match (&self.pkgdata_dir, &self.python_sitedir) {
            (Some(pkgdata_dir), Some(sitedir)) => provided_packages(pkgdata_dir, sitedir),
            _ => {
                debug!("no PKGDATA_DIR or python site directory; no dependency will be mapped");
                Ok(BTreeMap::new())
            }
        }
    }
}
