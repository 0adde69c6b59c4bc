#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A throwaway tree holding layers and a build directory.
pub struct Fixture {
    _dir: TempDir,
    pub root: PathBuf,
    pub build: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let build = root.join("build");
        fs::create_dir_all(build.join("conf")).unwrap();

        Self {
            _dir: dir,
            root,
            build,
        }
    }

    pub fn layer(&self, dir: &str, name: &str, priority: i64) -> PathBuf {
        let layer = self.root.join(dir);
        write(
            &layer.join("conf").join("layer.conf"),
            &format!(
                r#"BBPATH .= ":${{LAYERDIR}}"
BBFILES += "${{LAYERDIR}}/recipes-*/*/*.bb \
            ${{LAYERDIR}}/recipes-*/*/*.bbappend"
BBFILE_COLLECTIONS += "{name}"
BBFILE_PATTERN_{name} = "^${{LAYERDIR}}/"
BBFILE_PRIORITY_{name} = "{priority}"
"#
            ),
        );
        layer
    }

    pub fn bblayers_conf(&self) -> PathBuf {
        self.build.join("conf").join("bblayers.conf")
    }

    pub fn configure(&self, layers: &[&Path]) {
        let mut conf = String::from("BBPATH = \"${TOPDIR}\"\nBBFILES ?= \"\"\n\nBBLAYERS ?= \" \\\n");
        for layer in layers {
            conf.push_str(&format!("  {} \\\n", layer.display()));
        }
        conf.push_str("  \"\n");
        write(&self.bblayers_conf(), &conf);
    }
}

pub fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

pub fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}
