use std::collections::BTreeMap;

use derive_more::From;
use indexmap::IndexMap;
use itertools::Itertools;

use crate::fields::{
    classifier_license, BBVAR_MAP, EXCLUDED_FIELDS, REPLACEMENTS, SETUP_PARSE_MAP,
};
use crate::pyliteral::PyLiteral;

#[derive(Clone, Debug, PartialEq, Eq, From)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
    /// Optional feature -> requirements, as in `extras_require`
    Groups(IndexMap<String, Vec<String>>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Every string held, in order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            FieldValue::Text(s) => vec![s.as_str()],
            FieldValue::List(items) => items.iter().map(String::as_str).collect(),
            FieldValue::Groups(groups) => groups.values().flatten().map(String::as_str).collect(),
        }
    }

    fn map_values<F: Fn(&str) -> String>(&mut self, f: F) {
        match self {
            FieldValue::Text(s) => *s = f(s),
            FieldValue::List(items) => items.iter_mut().for_each(|item| *item = f(item)),
            FieldValue::Groups(groups) => groups
                .values_mut()
                .flatten()
                .for_each(|item| *item = f(item)),
        }
    }
}

impl From<&PyLiteral> for FieldValue {
    fn from(literal: &PyLiteral) -> Self {
        match literal {
            PyLiteral::List(_) | PyLiteral::Tuple(_) | PyLiteral::Set(_) => {
                FieldValue::List(literal.to_strings())
            }
            PyLiteral::Dict(entries) => FieldValue::Groups(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_text(), v.to_strings()))
                    .collect(),
            ),
            scalar => FieldValue::Text(scalar.to_text()),
        }
    }
}

/// Map a `setup()` keyword to the PKG-INFO style field name: `install_requires` becomes
/// `Install-requires`, `url` becomes `Home-page`.
pub fn normalize_key(key: &str) -> String {
    let key = key.replace('_', "-");
    let mut chars = key.chars();
    let key = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => key,
    };

    match SETUP_PARSE_MAP.get(key.as_str()) {
        Some(mapped) => mapped.to_string(),
        None => key,
    }
}

/// Package metadata, keyed by PKG-INFO field name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetupInfo(IndexMap<String, FieldValue>);

impl SetupInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_literals(setup_data: &IndexMap<String, PyLiteral>) -> Self {
        Self(
            setup_data
                .iter()
                .map(|(key, value)| (normalize_key(key), FieldValue::from(value)))
                .collect(),
        )
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    pub fn insert<V: Into<FieldValue>>(&mut self, field: &str, value: V) {
        self.0.insert(field.to_string(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.0.shift_remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    /// Values of `field`, or nothing when it is not set.
    pub fn strings(&self, field: &str) -> Vec<String> {
        self.get(field)
            .map(|v| v.values().into_iter().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn name(&self) -> Option<&str> {
        self.get("Name").and_then(|v| v.values().first().copied())
    }

    /// Requirement groups of `Extras-require`; empty when the field is missing or not grouped.
    pub fn groups(&self, field: &str) -> IndexMap<String, Vec<String>> {
        match self.get(field) {
            Some(FieldValue::Groups(groups)) => groups.clone(),
            _ => IndexMap::new(),
        }
    }

    /// Clean up values with the fixed substitution table (version constraints, `License` suffix).
    pub fn apply_replacements(&mut self) {
        for replacement in REPLACEMENTS.iter() {
            if let Some(value) = self.0.get_mut(replacement.field) {
                value.map_values(|s| {
                    replacement
                        .regex
                        .replace_all(s, replacement.replacement)
                        .into_owned()
                });
            }
        }
    }

    fn mapped_vars(&self, excluded: &[&str]) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        let mut classifier = None;

        for (field, value) in self.iter() {
            if excluded.contains(&field.as_str()) {
                continue;
            }

            let bbvar = BBVAR_MAP.get(field.as_str());
            match (value, bbvar) {
                (FieldValue::Text(s), Some(bbvar)) => {
                    vars.entry(bbvar.to_string()).or_insert_with(|| s.clone());
                }
                (FieldValue::List(items), Some(bbvar)) => {
                    vars.entry(bbvar.to_string())
                        .or_insert_with(|| items.iter().filter(|v| !v.is_empty()).join(" "));
                }
                (FieldValue::List(items), None) if field == "Classifier" => {
                    classifier = classifier_license(items);
                }
                _ => {}
            }
        }

        if let Some(license) = classifier {
            vars.insert(String::from("LICENSE"), license.to_string());
        }

        vars
    }

    /// Every field that has a BitBake variable, `PN`/`PV` included.
    pub fn bitbake_vars(&self) -> BTreeMap<String, String> {
        self.mapped_vars(&[])
    }

    /// Variables to write into a recipe. The name and version come from the recipe file name.
    pub fn recipe_vars(&self) -> BTreeMap<String, String> {
        self.mapped_vars(EXCLUDED_FIELDS)
    }
}

impl FromIterator<(String, FieldValue)> for SetupInfo {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
