//! Fixed lookup tables for turning Python package metadata into recipe variables. Tables are
//! ordered: where several entries could apply, the first one wins.

use once_cell::sync::Lazy;
use phf::phf_ordered_map;
use regex::Regex;

/// PKG-INFO field -> BitBake variable.
pub static BBVAR_MAP: phf::OrderedMap<&'static str, &'static str> = phf_ordered_map! {
    "Name" => "PN",
    "Version" => "PV",
    "Home-page" => "HOMEPAGE",
    "Summary" => "SUMMARY",
    "Description" => "DESCRIPTION",
    "License" => "LICENSE",
    "Requires" => "RDEPENDS_${PN}",
    "Provides" => "RPROVIDES_${PN}",
    "Obsoletes" => "RREPLACES_${PN}",
};

// PN/PV come from the recipe file name and descriptions can be extremely long
pub const EXCLUDED_FIELDS: &[&str] = &["Name", "Version", "Description"];

/// Normalized `setup()` keyword -> PKG-INFO field, where the two differ.
pub static SETUP_PARSE_MAP: phf::OrderedMap<&'static str, &'static str> = phf_ordered_map! {
    "Url" => "Home-page",
    "Classifiers" => "Classifier",
    "Description" => "Summary",
};

/// PKG-INFO field -> `setup.py` command line option, where it is not just the lowercased name.
pub static SETUPARG_MAP: phf::OrderedMap<&'static str, &'static str> = phf_ordered_map! {
    "Home-page" => "url",
    "Classifier" => "classifiers",
    "Summary" => "description",
    "Description" => "long-description",
};

/// Fields that always hold a list, however many values there are.
pub const LIST_FIELDS: &[&str] = &[
    "Classifier",
    "Requires",
    "Provides",
    "Obsoletes",
    "Platform",
    "Supported-Platform",
];

/// Fields whose introspected value spans several lines and is kept whole.
pub const MULTI_LINE_FIELDS: &[&str] = &["Description"];

pub struct Replacement {
    pub field: &'static str,
    pub regex: Regex,
    pub replacement: &'static str,
}

fn replacement(field: &'static str, pattern: &str, replacement: &'static str) -> Replacement {
    Replacement {
        field,
        regex: Regex::new(pattern).unwrap(),
        replacement,
    }
}

pub static REPLACEMENTS: Lazy<Vec<Replacement>> = Lazy::new(|| {
    vec![
        replacement("License", r" ", "-"),
        replacement("License", r"-License$", ""),
        replacement("License", r"^UNKNOWN$", ""),
        // Version constraints are not handled
        replacement("Requires", r" *\([^)]*\)", ""),
        replacement("Provides", r" *\([^)]*\)", ""),
        replacement("Obsoletes", r" *\([^)]*\)", ""),
        replacement("Install-requires", r"^([^><= ]+).*", "${1}"),
        replacement("Extras-require", r"^([^><= ]+).*", "${1}"),
        replacement("Tests-require", r"^([^><= ]+).*", "${1}"),
    ]
});

/// Trove license classifier -> `LICENSE` value.
pub static LICENSE_CLASSIFIERS: phf::OrderedMap<&'static str, &'static str> = phf_ordered_map! {
    "License :: OSI Approved :: Academic Free License (AFL)" => "AFL",
    "License :: OSI Approved :: Apache Software License" => "Apache",
    "License :: OSI Approved :: Apple Public Source License" => "APSL",
    "License :: OSI Approved :: Artistic License" => "Artistic",
    "License :: OSI Approved :: Attribution Assurance License" => "AAL",
    "License :: OSI Approved :: BSD License" => "BSD",
    "License :: OSI Approved :: Common Public License" => "CPL",
    "License :: OSI Approved :: Eiffel Forum License" => "EFL",
    "License :: OSI Approved :: European Union Public Licence 1.0 (EUPL 1.0)" => "EUPL-1.0",
    "License :: OSI Approved :: European Union Public Licence 1.1 (EUPL 1.1)" => "EUPL-1.1",
    "License :: OSI Approved :: GNU Affero General Public License v3 or later (AGPLv3+)" => "AGPL-3.0+",
    "License :: OSI Approved :: GNU Affero General Public License v3" => "AGPL-3.0",
    "License :: OSI Approved :: GNU Free Documentation License (FDL)" => "GFDL",
    "License :: OSI Approved :: GNU General Public License (GPL)" => "GPL",
    "License :: OSI Approved :: GNU General Public License v2 (GPLv2)" => "GPL-2.0",
    "License :: OSI Approved :: GNU General Public License v2 or later (GPLv2+)" => "GPL-2.0+",
    "License :: OSI Approved :: GNU General Public License v3 (GPLv3)" => "GPL-3.0",
    "License :: OSI Approved :: GNU General Public License v3 or later (GPLv3+)" => "GPL-3.0+",
    "License :: OSI Approved :: GNU Lesser General Public License v2 (LGPLv2)" => "LGPL-2.0",
    "License :: OSI Approved :: GNU Lesser General Public License v2 or later (LGPLv2+)" => "LGPL-2.0+",
    "License :: OSI Approved :: GNU Lesser General Public License v3 (LGPLv3)" => "LGPL-3.0",
    "License :: OSI Approved :: GNU Lesser General Public License v3 or later (LGPLv3+)" => "LGPL-3.0+",
    "License :: OSI Approved :: GNU Library or Lesser General Public License (LGPL)" => "LGPL",
    "License :: OSI Approved :: IBM Public License" => "IPL",
    "License :: OSI Approved :: ISC License (ISCL)" => "ISC",
    "License :: OSI Approved :: Intel Open Source License" => "Intel",
    "License :: OSI Approved :: Jabber Open Source License" => "Jabber",
    "License :: OSI Approved :: MIT License" => "MIT",
    "License :: OSI Approved :: MITRE Collaborative Virtual Workspace License (CVW)" => "CVWL",
    "License :: OSI Approved :: Motosoto License" => "Motosoto",
    "License :: OSI Approved :: Mozilla Public License 1.0 (MPL)" => "MPL-1.0",
    "License :: OSI Approved :: Mozilla Public License 1.1 (MPL 1.1)" => "MPL-1.1",
    "License :: OSI Approved :: Mozilla Public License 2.0 (MPL 2.0)" => "MPL-2.0",
    "License :: OSI Approved :: Nethack General Public License" => "NGPL",
    "License :: OSI Approved :: Nokia Open Source License" => "Nokia",
    "License :: OSI Approved :: Open Group Test Suite License" => "OGTSL",
    "License :: OSI Approved :: Python License (CNRI Python License)" => "CNRI-Python",
    "License :: OSI Approved :: Python Software Foundation License" => "PSF",
    "License :: OSI Approved :: Qt Public License (QPL)" => "QPL",
    "License :: OSI Approved :: Ricoh Source Code Public License" => "RSCPL",
    "License :: OSI Approved :: Sleepycat License" => "Sleepycat",
    "License :: OSI Approved :: Sun Industry Standards Source License (SISSL)" => "SISSL",
    "License :: OSI Approved :: Sun Public License" => "SPL",
    "License :: OSI Approved :: University of Illinois/NCSA Open Source License" => "NCSA",
    "License :: OSI Approved :: Vovida Software License 1.0" => "VSL-1.0",
    "License :: OSI Approved :: W3C License" => "W3C",
    "License :: OSI Approved :: X.Net License" => "Xnet",
    "License :: OSI Approved :: Zope Public License" => "ZPL",
    "License :: OSI Approved :: zlib/libpng License" => "Zlib",
};

/// Packages every Python recipe depends on.
pub const BASE_PKGDEPS: &[&str] = &["python-core"];

pub const EXCLUDED_PKGDEPS: &[&str] = &["python-dbg"];

/// Modules that never need a runtime dependency. `os.path` is part of python-core.
pub const ASSUME_PROVIDED: &[&str] = &["builtins", "os.path"];

/// Modules compiled into the interpreter (`sys.builtin_module_names` of CPython 3).
pub const PYTHON_BUILTIN_MODULES: &[&str] = &[
    "_abc",
    "_ast",
    "_codecs",
    "_collections",
    "_functools",
    "_imp",
    "_io",
    "_locale",
    "_operator",
    "_signal",
    "_sre",
    "_stat",
    "_string",
    "_symtable",
    "_thread",
    "_tokenize",
    "_tracemalloc",
    "_typing",
    "_warnings",
    "_weakref",
    "atexit",
    "builtins",
    "errno",
    "faulthandler",
    "gc",
    "itertools",
    "marshal",
    "posix",
    "pwd",
    "sys",
    "time",
    "xxsubtype",
];

/// File suffixes of importable Python modules.
pub const MODULE_SUFFIXES: &[&str] = &[".so", ".py", ".pyc"];

/// Command line option `setup.py` accepts for querying `field`.
pub fn setup_arg(field: &str) -> String {
    match SETUPARG_MAP.get(field) {
        Some(arg) => arg.to_string(),
        None => field.to_lowercase(),
    }
}

/// License of the first classifier in `classifiers` found in [`LICENSE_CLASSIFIERS`].
pub fn classifier_license<S: AsRef<str>>(classifiers: &[S]) -> Option<&'static str> {
    LICENSE_CLASSIFIERS
        .entries()
        .find(|(classifier, _)| classifiers.iter().any(|c| c.as_ref() == **classifier))
        .map(|(_, license)| *license)
}
