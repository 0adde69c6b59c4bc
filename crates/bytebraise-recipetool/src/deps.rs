use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use indexmap::IndexMap;
use tracing::{debug, error, warn};

use bytebraise_util::path::which;

use crate::errors::ExtractResult;
use crate::fields::MODULE_SUFFIXES;
use crate::metadata::{FieldValue, SetupInfo};
use crate::pyliteral::{literal_eval, PyLiteral};

/// Finds the Python modules a source tree imports.
pub trait DependencyScanner {
    /// Modules imported by the sources under `paths` that those sources do not provide
    /// themselves. Scanning failures are logged and yield fewer names.
    fn scan(&self, paths: &[PathBuf]) -> BTreeSet<String>;
}

/// Scanner backed by the `pythondeps` script.
#[derive(Debug, Clone)]
pub struct PythondepsScanner {
    program: PathBuf,
}

impl PythondepsScanner {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Look for `pythondeps` on `PATH`.
    pub fn from_path() -> Option<Self> {
        let path = std::env::var("PATH").ok()?;
        which(path, "pythondeps", false, true).map(Self::new)
    }

    fn run(&self, mode: &str, paths: &[PathBuf]) -> Option<String> {
        let command = format!("{} {mode}", self.program.display());
        match Command::new(&self.program).arg(mode).args(paths).output() {
            Ok(output) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => {
                error!(
                    "Unable to run `{command}`: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                None
            }
            Err(e) => {
                error!("Unable to run `{command}`: {e}");
                None
            }
        }
    }
}

impl DependencyScanner for PythondepsScanner {
    fn scan(&self, paths: &[PathBuf]) -> BTreeSet<String> {
        let mut deps = self
            .run("-d", paths)
            .map(|output| parse_dependencies(&output))
            .unwrap_or_default();

        if let Some(output) = self.run("-p", paths) {
            for provided in parse_provides(&output) {
                deps.remove(&provided);
            }
        }
        deps
    }
}

/// `pythondeps -d` output: `module<TAB>file` per line. Imports made by `setup.py` itself are not
/// dependencies of the package.
pub fn parse_dependencies(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .map(str::trim_end)
        .filter_map(|line| line.split_once('\t'))
        .filter(|(_, file)| !file.ends_with("/setup.py"))
        .map(|(dep, _)| dep.to_string())
        .collect()
}

/// `pythondeps -p` output: one provided module per line.
pub fn parse_provides(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty() && *l != "setup")
        .map(str::to_string)
        .collect()
}

/// Directory holding `package`, following the `package_dir` rules of distutils' `build_py`.
pub fn package_dir(package_dirs: &IndexMap<String, String>, package: &str) -> PathBuf {
    let mut path = package
        .split('.')
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>();
    let mut tail: Vec<&str> = vec![];

    while !path.is_empty() {
        if let Some(dir) = package_dirs.get(&path.join(".")) {
            tail.insert(0, dir);
            return tail.iter().collect();
        }
        if let Some(last) = path.pop() {
            tail.insert(0, last);
        }
    }

    if let Some(root) = package_dirs.get("") {
        tail.insert(0, root);
    }
    tail.iter().collect()
}

/// Sources to scan, relative to the source tree: the modules, packages and scripts `setup()`
/// names, or the whole tree when any of them is computed.
pub fn scan_targets(setup_info: &SetupInfo, non_literals: &[String]) -> Vec<PathBuf> {
    let mut targets = vec![];
    let computed = ["Py-modules", "Scripts", "Packages"]
        .iter()
        .any(|f| non_literals.iter().any(|n| n.as_str() == *f));

    if !computed {
        let package_dirs: IndexMap<String, String> = match setup_info.get("Package-dir") {
            Some(FieldValue::Groups(groups)) => groups
                .iter()
                .filter_map(|(k, v)| v.first().map(|dir| (k.clone(), dir.clone())))
                .collect(),
            _ => IndexMap::new(),
        };

        for module in setup_info.strings("Py-modules") {
            let (package, module) = module.rsplit_once('.').unwrap_or(("", module.as_str()));
            targets.push(package_dir(&package_dirs, package).join(format!("{module}.py")));
        }

        for package in setup_info.strings("Packages") {
            targets.push(package_dir(&package_dirs, &package));
        }

        targets.extend(setup_info.strings("Scripts").into_iter().map(PathBuf::from));
    }

    if targets.is_empty() {
        targets.push(PathBuf::from("."));
    }
    targets
}

fn files_info(pkgdata_file: &Path) -> Option<PyLiteral> {
    let Ok(contents) = fs::read_to_string(pkgdata_file) else {
        warn!("unable to read {}", pkgdata_file.display());
        return None;
    };

    let value = contents
        .lines()
        .find_map(|line| line.strip_prefix("FILES_INFO: "))?;
    match literal_eval(value) {
        Ok(literal) => literal,
        Err(e) => {
            warn!("{}: bad FILES_INFO: {e}", pkgdata_file.display());
            None
        }
    }
}

/// Module name provided by `file` if it is an importable module under one of `python_dirs`.
fn provided_module(file: &str, python_dirs: &[String]) -> Option<String> {
    let relpath = python_dirs.iter().find_map(|dir| file.strip_prefix(dir.as_str()))?;

    let relpath = match relpath.split_once('/') {
        Some((first, rest)) if first.ends_with(".egg") => rest,
        _ => relpath,
    };

    // Strip the extension of the last component only
    let base = match relpath.rfind('.') {
        Some(dot) if !relpath[dot..].contains('/') => &relpath[..dot],
        _ => relpath,
    };

    if base.contains("/.debug/") {
        return None;
    }

    let base = match base.rsplit_once('/') {
        Some((dir, "__init__")) => dir,
        None if base == "__init__" => "",
        _ => base,
    };

    Some(base.replace("//", "/").replace('/', "."))
}

/// Reverse index from Python module name to the package shipping it, built from the
/// `FILES_INFO` of every `runtime/*` file in `pkgdata_dir`.
pub fn provided_packages(
    pkgdata_dir: &Path,
    python_sitedir: &Path,
) -> ExtractResult<BTreeMap<String, String>> {
    let parent = python_sitedir.parent().unwrap_or(python_sitedir);
    let dynload_dir = format!("{}/", parent.join("lib-dynload").display());
    let python_dirs = vec![
        format!("{}/", python_sitedir.display()),
        format!("{}/", parent.join("dist-packages").display()),
        format!("{}/", parent.display()),
    ];

    let mut packages = BTreeMap::new();
    let pattern = format!("{}/runtime/*", pkgdata_dir.display());
    for pkgdata_file in glob::glob(&pattern)?.flatten() {
        let Some(package) = pkgdata_file.file_name().map(|f| f.to_string_lossy().into_owned())
        else {
            continue;
        };
        let Some(PyLiteral::Dict(entries)) = files_info(&pkgdata_file) else {
            continue;
        };

        for file in entries.iter().filter_map(|(k, _)| k.as_str()) {
            if !MODULE_SUFFIXES.iter().any(|s| file.ends_with(s)) {
                continue;
            }

            if let Some(rest) = file.strip_prefix(&dynload_dir) {
                let name = rest.rsplit('/').next().unwrap_or(rest);
                let provided = name.split('.').next().unwrap_or(name);
                packages.insert(provided.to_string(), package.clone());
                continue;
            }

            if let Some(provided) = provided_module(file, &python_dirs) {
                packages.insert(provided, package.clone());
            }
        }
    }

    debug!("{} python modules provided by pkgdata", packages.len());
    Ok(packages)
}

#[cfg(test)]
mod test {
    use super::*;
    use indexmap::indexmap;
    use maplit::btreeset;
    use pretty_assertions::assert_eq;

    #[test]
    fn pythondeps_output() {
        let deps = parse_dependencies(
            "os\t/src/foo/foo/__init__.py\nrequests\t/src/foo/foo/http.py\n\
             setuptools\t/src/foo/setup.py\nmalformed line\n",
        );
        assert_eq!(deps, btreeset! {String::from("os"), String::from("requests")});

        let provides = parse_provides("foo\nfoo.http\nsetup\n\n");
        assert_eq!(provides, btreeset! {String::from("foo"), String::from("foo.http")});
    }

    #[test]
    fn distutils_package_dir() {
        let none = IndexMap::new();
        assert_eq!(package_dir(&none, "foo.bar"), PathBuf::from("foo/bar"));
        assert_eq!(package_dir(&none, ""), PathBuf::from(""));

        let dirs = indexmap! {
            String::from("") => String::from("src"),
            String::from("foo.vendored") => String::from("third_party"),
        };
        assert_eq!(package_dir(&dirs, "foo.bar"), PathBuf::from("src/foo/bar"));
        assert_eq!(
            package_dir(&dirs, "foo.vendored.six"),
            PathBuf::from("third_party/six")
        );
        assert_eq!(package_dir(&dirs, ""), PathBuf::from("src"));
    }

    #[test]
    fn targets() {
        let mut info = SetupInfo::new();
        info.insert(
            "Package-dir",
            indexmap! { String::from("") => vec![String::from("lib")] },
        );
        info.insert("Py-modules", vec![String::from("compat"), String::from("foo.util")]);
        info.insert("Packages", vec![String::from("foo")]);
        info.insert("Scripts", vec![String::from("bin/foo")]);

        assert_eq!(
            scan_targets(&info, &[]),
            vec![
                PathBuf::from("lib/compat.py"),
                PathBuf::from("lib/foo/util.py"),
                PathBuf::from("lib/foo"),
                PathBuf::from("bin/foo"),
            ]
        );
        assert_eq!(
            scan_targets(&info, &[String::from("Packages")]),
            vec![PathBuf::from(".")]
        );
        assert_eq!(scan_targets(&SetupInfo::new(), &[]), vec![PathBuf::from(".")]);
    }

    #[test]
    fn module_names() {
        let dirs = vec![
            String::from("/usr/lib/python3.8/site-packages/"),
            String::from("/usr/lib/python3.8/dist-packages/"),
            String::from("/usr/lib/python3.8/"),
        ];
        let provided = |f: &str| provided_module(f, &dirs);

        assert_eq!(
            provided("/usr/lib/python3.8/site-packages/six.py"),
            Some(String::from("six"))
        );
        assert_eq!(
            provided("/usr/lib/python3.8/site-packages/requests/__init__.py"),
            Some(String::from("requests"))
        );
        assert_eq!(
            provided("/usr/lib/python3.8/site-packages/foo-1.0.egg/foo/bar.pyc"),
            Some(String::from("foo.bar"))
        );
        assert_eq!(provided("/usr/lib/python3.8/json/decoder.py"), Some(String::from("json.decoder")));
        assert_eq!(provided("/usr/lib/python3.8/site-packages/x/.debug/y.so"), None);
        assert_eq!(provided("/usr/bin/foo.py"), None);
    }

    #[test_log::test]
    fn pkgdata_index() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = dir.path().join("runtime");
        fs::create_dir_all(&runtime).unwrap();
        fs::write(
            runtime.join("python3-six"),
            "PN: python3-six\nFILES_INFO: {\"/usr/lib/python3.8/site-packages/six.py\": 30000, \
             \"/usr/share/doc/six/README\": 10}\n",
        )
        .unwrap();
        fs::write(
            runtime.join("python3-core"),
            "FILES_INFO: {'/usr/lib/python3.8/lib-dynload/_json.cpython-38.so': 1, \
             '/usr/lib/python3.8/os.py': 2}\n",
        )
        .unwrap();
        fs::write(runtime.join("python3-misc"), "PN: python3\n").unwrap();

        let packages = provided_packages(
            dir.path(),
            Path::new("/usr/lib/python3.8/site-packages"),
        )
        .unwrap();

        assert_eq!(
            packages,
            maplit::btreemap! {
                String::from("_json") => String::from("python3-core"),
                String::from("os") => String::from("python3-core"),
                String::from("six") => String::from("python3-six"),
            }
        );
    }
}
