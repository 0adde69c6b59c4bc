use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use bytebraise_util::split::ReplaceFallible;

use crate::errors::{ConfError, ConfResult};

static VAR_EXPANSION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{[a-zA-Z0-9\-_+./~:]+?}").unwrap());

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingOp {
    Append,
    Prepend,
    Remove,
}

#[derive(Clone, Debug, Default)]
struct VarState {
    value: Option<String>,
    // Set by ??=, only used when nothing else assigns a value
    weak_default: Option<String>,
    pending: Vec<(PendingOp, String)>,
    flags: IndexMap<String, String>,
}

impl VarState {
    fn is_unset(&self) -> bool {
        self.value.is_none() && self.weak_default.is_none() && self.pending.is_empty()
    }
}

/// Variable store filled by evaluating configuration files.
///
/// Cloning gives an independent copy, which is how a layer's `layer.conf` gets parsed on top
/// of shared base data without modifying it.
#[derive(Clone, Debug, Default)]
pub struct ConfData {
    vars: IndexMap<String, VarState>,
    // Files currently being parsed, outermost first
    parsing: Vec<PathBuf>,
}

impl ConfData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `file` is being parsed. Fails if it is already being parsed further up the
    /// include chain.
    pub(crate) fn enter_file(&mut self, file: PathBuf) -> Result<(), ConfError> {
        if self.parsing.contains(&file) {
            let mut chain = self.parsing.clone();
            chain.push(file);
            return Err(ConfError::IncludeCycle { chain });
        }
        self.parsing.push(file);
        Ok(())
    }

    pub(crate) fn leave_file(&mut self) {
        self.parsing.pop();
    }

    pub fn set_var<K: Into<String>, V: Into<String>>(&mut self, var: K, value: V) {
        self.vars.entry(var.into()).or_default().value = Some(value.into());
    }

    pub fn set_path_var<K: Into<String>>(&mut self, var: K, path: &Path) {
        self.set_var(var, path.display().to_string());
    }

    pub fn set_weak_default<K: Into<String>, V: Into<String>>(&mut self, var: K, value: V) {
        self.vars.entry(var.into()).or_default().weak_default = Some(value.into());
    }

    pub fn push_pending<K: Into<String>, V: Into<String>>(&mut self, var: K, op: PendingOp, value: V) {
        self.vars
            .entry(var.into())
            .or_default()
            .pending
            .push((op, value.into()));
    }

    pub fn set_var_flag<K: Into<String>, F: Into<String>, V: Into<String>>(
        &mut self,
        var: K,
        flag: F,
        value: V,
    ) {
        self.vars
            .entry(var.into())
            .or_default()
            .flags
            .insert(flag.into(), value.into());
    }

    pub fn get_var_flag(&self, var: &str, flag: &str) -> Option<&str> {
        self.vars
            .get(var)
            .and_then(|state| state.flags.get(flag))
            .map(String::as_str)
    }

    pub fn del_var_flag(&mut self, var: &str, flag: &str) {
        if let Some(state) = self.vars.get_mut(var) {
            state.flags.shift_remove(flag);
        }
    }

    pub fn del_var(&mut self, var: &str) {
        self.vars.shift_remove(var);
    }

    /// The value as last assigned, without expansion and without pending operations. Weak
    /// defaults are not considered.
    pub fn get_var_raw(&self, var: &str) -> Option<&str> {
        self.vars.get(var).and_then(|state| state.value.as_deref())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.vars
            .iter()
            .filter(|(_, state)| !state.is_unset())
            .map(|(k, _)| k.as_str())
    }

    /// Final, expanded value of `var`.
    pub fn get_var(&self, var: &str) -> ConfResult<Option<String>> {
        let mut visited = vec![var.to_string()];
        self.get_var_visited(var, &mut visited)
    }

    /// Same as [`ConfData::get_var`], with unset variables and empty values collapsed.
    pub fn get_var_or_empty(&self, var: &str) -> ConfResult<String> {
        Ok(self.get_var(var)?.unwrap_or_default())
    }

    pub fn expand(&self, s: &str) -> ConfResult<String> {
        let mut visited = vec![];
        self.expand_visited(s, &mut visited)
    }

    /// Replace every `${var}` reference in the stored values with the current value of `var`.
    pub fn expand_varref(&mut self, var: &str) -> ConfResult<()> {
        let needle = format!("${{{var}}}");
        let Some(value) = self.get_var(var)? else {
            return Ok(());
        };

        for (key, state) in self.vars.iter_mut() {
            if key == var {
                continue;
            }

            for slot in state
                .value
                .iter_mut()
                .chain(state.weak_default.iter_mut())
                .chain(state.pending.iter_mut().map(|(_, v)| v))
            {
                if slot.contains(&needle) {
                    *slot = slot.replace(&needle, &value);
                }
            }
        }

        Ok(())
    }

    fn get_var_visited(&self, var: &str, visited: &mut Vec<String>) -> ConfResult<Option<String>> {
        let Some(state) = self.vars.get(var) else {
            return Ok(None);
        };
        if state.is_unset() {
            return Ok(None);
        }

        let mut value = state
            .value
            .clone()
            .or_else(|| state.weak_default.clone())
            .unwrap_or_default();

        for (op, extra) in &state.pending {
            match op {
                PendingOp::Append => value.push_str(extra),
                PendingOp::Prepend => value.insert_str(0, extra),
                PendingOp::Remove => {}
            }
        }

        let mut value = self.expand_visited(&value, visited)?;

        let mut removals = vec![];
        for (op, extra) in &state.pending {
            if *op == PendingOp::Remove {
                let expanded = self.expand_visited(extra, visited)?;
                removals.extend(expanded.split_whitespace().map(String::from));
            }
        }
        if !removals.is_empty() {
            value = value
                .split_whitespace()
                .filter(|word| !removals.iter().any(|r| r == word))
                .collect::<Vec<_>>()
                .join(" ");
        }

        Ok(Some(value))
    }

    fn expand_visited(&self, s: &str, visited: &mut Vec<String>) -> ConfResult<String> {
        let mut value = s.to_string();
        while value.contains("${") {
            let new_value = VAR_EXPANSION_REGEX
                .replace_all_fallible(&value, |caps: &Captures<'_>| {
                    let whole = &caps[0];
                    let referenced = &whole[2..whole.len() - 1];

                    if visited.iter().any(|v| v == referenced) {
                        return Err(anyhow::Error::from(ConfError::RecursiveReference {
                            var: referenced.to_string(),
                        }));
                    }

                    visited.push(referenced.to_string());
                    let ret = self.get_var_visited(referenced, visited);
                    visited.pop();

                    // Unset variables stay as literal references
                    Ok(ret?.unwrap_or_else(|| whole.to_string()))
                })?
                .into_owned();

            if new_value == value {
                break;
            }
            value = new_value;
        }

        Ok(value)
    }
}
