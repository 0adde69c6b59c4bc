//! Readers for the metadata files setuptools writes: `PKG-INFO` (mail header format) and
//! `*.egg-info/requires.txt`.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use tracing::debug;

use bytebraise_util::index_map::into_index_map;

use crate::errors::{ExtractError, ExtractResult};
use crate::fields::LIST_FIELDS;
use crate::metadata::{FieldValue, SetupInfo};

fn read(path: &Path) -> ExtractResult<String> {
    fs::read_to_string(path).map_err(|source| ExtractError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Headers of a mail-format document in order, folded lines joined. Parsing stops at the first
/// blank line, where the body starts.
pub fn parse_headers(text: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = vec![];
    for line in text.lines() {
        if line.trim().is_empty() {
            break;
        }

        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push('\n');
                value.push_str(line);
            }
            continue;
        }

        match line.split_once(':') {
            Some((key, value)) => headers.push((key.trim().to_string(), value.trim().to_string())),
            None => debug!("ignoring malformed header line {line:?}"),
        }
    }
    headers
}

pub fn parse_pkginfo(text: &str) -> SetupInfo {
    into_index_map(parse_headers(text).into_iter())
        .into_iter()
        .map(|(field, mut values)| {
            let value = match values.len() == 1 && !LIST_FIELDS.contains(&field.as_str()) {
                true => FieldValue::Text(values.remove(0)),
                false => FieldValue::List(values),
            };
            (field, value)
        })
        .collect()
}

pub fn read_pkginfo(path: &Path) -> ExtractResult<SetupInfo> {
    Ok(parse_pkginfo(&read(path)?))
}

/// Mandatory requirements and requirements per optional feature (`[feature]` sections).
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Requires {
    pub install: Vec<String>,
    pub extras: IndexMap<String, Vec<String>>,
}

pub fn parse_requires_txt(text: &str) -> Requires {
    let mut requires = Requires::default();
    let mut feature: Option<String> = None;

    for line in text.lines().map(str::trim_end) {
        if line.is_empty() {
            continue;
        }

        if let Some(section) = line.strip_prefix('[') {
            feature = Some(section.strip_suffix(']').unwrap_or(section).to_string());
        } else if let Some(feature) = &feature {
            requires
                .extras
                .entry(feature.clone())
                .or_default()
                .push(line.to_string());
        } else {
            requires.install.push(line.to_string());
        }
    }

    requires
}

pub fn read_requires_txt(path: &Path) -> ExtractResult<Requires> {
    Ok(parse_requires_txt(&read(path)?))
}
