use std::collections::HashSet;

use itertools::Itertools;
use lazy_static::lazy_static;

lazy_static! {
    static ref PRESERVED_ENVVARS_EXPORTED: Vec<&'static str> = vec![
        "BB_TASKHASH",
        "HOME",
        "LOGNAME",
        "PATH",
        "PWD",
        "SHELL",
        "USER",
        "LC_ALL",
        "BBSERVER",
    ];
    static ref PRESERVED_ENVVARS: Vec<&'static str> = {
        let mut ret = PRESERVED_ENVVARS_EXPORTED.clone();
        ret.extend_from_slice(&[
            "BBPATH",
            "BB_PRESERVE_ENV",
            "BB_ENV_PASSTHROUGH",
            "BB_ENV_PASSTHROUGH_ADDITIONS",
        ]);
        ret
    };
}

/// Names of the environment variables BitBake lets through to the metadata, sorted.
pub fn approved_variables() -> Vec<String> {
    if std::env::var("BB_PRESERVE_ENV").is_ok() {
        return std::env::vars().map(|k| k.0).sorted().collect();
    }

    let mut approved: HashSet<String> = match std::env::var("BB_ENV_PASSTHROUGH") {
        Ok(allowlist) => allowlist
            .split_whitespace()
            .map(String::from)
            .chain(std::iter::once(String::from("BB_ENV_PASSTHROUGH")))
            .collect(),
        Err(_) => PRESERVED_ENVVARS.iter().map(|s| String::from(*s)).collect(),
    };

    if let Ok(extra_allow) = std::env::var("BB_ENV_PASSTHROUGH_ADDITIONS") {
        approved.extend(extra_allow.split_whitespace().map(String::from));
        approved.insert(String::from("BB_ENV_PASSTHROUGH_ADDITIONS"));
    }

    approved.into_iter().sorted().collect()
}

pub fn is_approved(var: &str) -> bool {
    approved_variables().iter().any(|v| v == var)
}
