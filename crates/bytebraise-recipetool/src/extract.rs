use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::errors::ExtractResult;
use crate::introspect::{get_setup_args_info, SetupIntrospector};
use crate::metadata::{normalize_key, FieldValue, SetupInfo};
use crate::pkginfo::{read_pkginfo, read_requires_txt};
use crate::setup_script::read_setup_script;

/// Result of reading a Python source tree's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Metadata from the richest source available, cleaned up
    pub info: SetupInfo,
    /// Literal `setup()` arguments, used to locate sources for dependency scanning
    pub setup_info: SetupInfo,
    pub uses_setuptools: bool,
    /// Normalized names of computed `setup()` arguments
    pub non_literals: Vec<String>,
}

pub struct SetupExtractor<'a> {
    introspector: &'a dyn SetupIntrospector,
}

impl<'a> SetupExtractor<'a> {
    pub fn new(introspector: &'a dyn SetupIntrospector) -> Self {
        Self { introspector }
    }

    /// Read `srctree/setup.py` without running it. Any failure leaves no metadata and assumes
    /// setuptools.
    fn parse_setup_py(&self, script: &Path) -> (SetupInfo, bool, Vec<String>) {
        match read_setup_script(script) {
            Ok(parsed) => {
                let info = SetupInfo::from_literals(&parsed.setup_data);
                let non_literals = parsed
                    .non_literals
                    .iter()
                    .map(|k| normalize_key(k))
                    .collect();
                (info, parsed.uses_setuptools(), non_literals)
            }
            Err(e) => {
                error!("Failed to parse setup.py: {e}");
                (SetupInfo::new(), true, vec![])
            }
        }
    }

    /// Metadata precedence: `*.egg-info` (with `requires.txt`), then a bare `PKG-INFO`, then the
    /// literal `setup()` arguments, then asking `setup.py` itself.
    pub fn extract(&self, srctree: &Path) -> ExtractResult<Extraction> {
        let script = srctree.join("setup.py");
        let (setup_info, uses_setuptools, non_literals) = self.parse_setup_py(&script);

        let egg_info = first_match(&format!("{}/*.egg-info", srctree.display()))?;
        let pkg_info = srctree.join("PKG-INFO");

        let mut info = if let Some(egg_info) = egg_info {
            info!("Reading metadata from {}", egg_info.display());
            let mut info = read_pkginfo(&egg_info.join("PKG-INFO"))?;
            let requires_txt = egg_info.join("requires.txt");
            if requires_txt.exists() {
                let requires = read_requires_txt(&requires_txt)?;
                info.insert("Install-requires", requires.install);
                info.insert("Extras-require", requires.extras);
            }
            info
        } else if pkg_info.exists() {
            info!("Reading metadata from {}", pkg_info.display());
            let mut info = read_pkginfo(&pkg_info)?;
            if let Some(install_requires) = setup_info.get("Install-requires") {
                info.insert("Install-requires", install_requires.clone());
            }
            info
        } else if !setup_info.is_empty() {
            setup_info.clone()
        } else {
            debug!("no literal setup() arguments; querying setup.py");
            get_setup_args_info(self.introspector, &script)?
        };

        info.apply_replacements();

        Ok(Extraction {
            info,
            setup_info,
            uses_setuptools,
            non_literals,
        })
    }
}

fn first_match(pattern: &str) -> ExtractResult<Option<PathBuf>> {
    let mut matches = glob::glob(pattern)?.flatten().collect::<Vec<_>>();
    matches.sort();
    Ok(matches.into_iter().next())
}

impl Extraction {
    /// Requirement strings of `Install-requires`.
    pub fn install_requires(&self) -> Vec<String> {
        match self.info.get("Install-requires") {
            Some(FieldValue::Groups(_)) | None => vec![],
            Some(value) => value.values().into_iter().map(str::to_string).collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;
    use crate::introspect::test::FakeIntrospector;
    use pretty_assertions::assert_eq;

    fn write(root: &Path, path: &str, contents: &str) {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    const SETUP_PY: &str = "from setuptools import setup\n\
        setup(name='foo', version=VERSION, license='GPL', install_requires=['six>=1.0'])\n";

    #[test_log::test]
    fn egg_info_wins() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "setup.py", SETUP_PY);
        write(
            dir.path(),
            "foo.egg-info/PKG-INFO",
            "Name: foo\nVersion: 2.0\nLicense: BSD License\n",
        );
        write(dir.path(), "foo.egg-info/requires.txt", "six\n\n[extra]\nrequests\n");

        let fake = FakeIntrospector::default();
        let extraction = SetupExtractor::new(&fake).extract(dir.path()).unwrap();

        assert!(extraction.uses_setuptools);
        assert_eq!(extraction.non_literals, vec!["Version"]);
        assert_eq!(extraction.info.bitbake_vars()["PV"], "2.0");
        assert_eq!(extraction.info.bitbake_vars()["LICENSE"], "BSD");
        assert_eq!(extraction.install_requires(), vec!["six"]);
        assert_eq!(
            extraction.info.groups("Extras-require")["extra"],
            vec!["requests"]
        );
        assert!(fake.queries.borrow().is_empty());
    }

    #[test]
    fn pkg_info_keeps_install_requires() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "setup.py", SETUP_PY);
        write(dir.path(), "PKG-INFO", "Name: foo\nVersion: 2.0\n");

        let fake = FakeIntrospector::default();
        let extraction = SetupExtractor::new(&fake).extract(dir.path()).unwrap();
        assert_eq!(extraction.info.bitbake_vars()["PV"], "2.0");
        assert_eq!(extraction.install_requires(), vec!["six"]);
        assert!(!extraction.info.contains("License"));
    }

    #[test]
    fn literal_setup_arguments() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "setup.py", SETUP_PY);

        let fake = FakeIntrospector::default();
        let extraction = SetupExtractor::new(&fake).extract(dir.path()).unwrap();
        assert_eq!(extraction.info, {
            let mut info = extraction.setup_info.clone();
            info.apply_replacements();
            info
        });
        assert_eq!(extraction.info.bitbake_vars()["LICENSE"], "GPL");
        assert!(!extraction.info.contains("Version"));
    }

    #[test_log::test]
    fn unparsable_setup_py_is_introspected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "setup.py", "setup(name='broken\n");

        let mut fake = FakeIntrospector::default();
        fake.answers.insert(
            String::from("--name --version --url --description --license"),
            String::from("broken\n0.1\nUNKNOWN\nBroken\nUNKNOWN\n"),
        );
        let extraction = SetupExtractor::new(&fake).extract(dir.path()).unwrap();

        assert!(extraction.uses_setuptools);
        assert!(extraction.setup_info.is_empty());
        assert_eq!(extraction.info.name(), Some("broken"));
        assert_eq!(extraction.info.bitbake_vars()["LICENSE"], "");
    }
}
