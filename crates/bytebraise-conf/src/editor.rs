use std::fs;
use std::path::Path;

use anyhow::Context;
use regex::Regex;
use tracing::debug;

use bytebraise_util::path::{canonicalise_path, fnmatch, remove_trailing_sep};
use bytebraise_util::split::split_list_value;

use crate::errors::{ConfError, ConfResult};

/// What to do with one assignment found by [`edit_metadata`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EditAction {
    Keep,
    Replace(Vec<String>),
    /// Replace the value and switch the assignment to a different operator.
    ReplaceWithOp(String, Vec<String>),
    Delete,
}

fn assignment_regex(var_names: &[&str]) -> ConfResult<Regex> {
    let names = var_names
        .iter()
        .map(|v| regex::escape(v))
        .collect::<Vec<_>>()
        .join("|");
    Ok(Regex::new(&format!(
        r"^(?P<var>{names})\s*(?P<op>\?\?=|\?=|:=|\+=|=\+|\.=|=\.|=)\s*(?P<rest>.*)$"
    ))?)
}

fn render_assignment(var: &str, op: &str, values: &[String]) -> String {
    if values.is_empty() {
        return format!("{var} {op} \"\"\n");
    }

    let mut ret = format!("{var} {op} \" \\\n");
    for value in values {
        ret.push_str(&format!("  {value} \\\n"));
    }
    ret.push_str("  \"\n");
    ret
}

/// Rewrite the assignments to `var_names` in `source`, leaving every other line untouched.
///
/// `f` receives the variable name, the current value split into words, and the operator. Values
/// spanning several lines (via `\` continuations) are handled as one assignment. Returns the new
/// text and whether anything changed.
pub fn edit_metadata<F>(source: &str, var_names: &[&str], mut f: F) -> ConfResult<(String, bool)>
where
    F: FnMut(&str, &[String], &str) -> EditAction,
{
    let re = assignment_regex(var_names)?;
    let lines = source.split_inclusive('\n').collect::<Vec<_>>();

    let mut out = String::with_capacity(source.len());
    let mut changed = false;
    let mut idx = 0;

    while idx < lines.len() {
        let line = lines[idx];
        let Some(caps) = re.captures(line.trim_end_matches(['\r', '\n'])) else {
            out.push_str(line);
            idx += 1;
            continue;
        };

        let rest = caps.name("rest").map(|m| m.as_str()).unwrap_or_default();
        let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            out.push_str(line);
            idx += 1;
            continue;
        };

        // Collect the full value, which ends at the closing quote
        let mut value = rest[1..].to_string();
        let mut end = idx;
        while !value.contains(quote) && end + 1 < lines.len() {
            end += 1;
            value.push('\n');
            value.push_str(lines[end].trim_end_matches(['\r', '\n']));
        }
        let inner = match value.find(quote) {
            Some(pos) => &value[..pos],
            None => value.as_str(),
        };

        let var = &caps["var"];
        let op = &caps["op"];
        let values = split_list_value(inner);

        let (new_op, new_values) = match f(var, &values, op) {
            EditAction::Keep => (op.to_string(), values.clone()),
            EditAction::Replace(new_values) => (op.to_string(), new_values),
            EditAction::ReplaceWithOp(new_op, new_values) => (new_op, new_values),
            EditAction::Delete => {
                debug!("removing {} assignment", var);
                changed = true;
                idx = end + 1;
                continue;
            }
        };

        if new_op != op || new_values != values {
            debug!("rewriting {} assignment", var);
            out.push_str(&render_assignment(var, &new_op, &new_values));
            changed = true;
        } else {
            for original in &lines[idx..=end] {
                out.push_str(original);
            }
        }

        idx = end + 1;
    }

    Ok((out, changed))
}

/// [`edit_metadata`] on a file; the file is only rewritten when something changed.
pub fn edit_metadata_file<P, F>(path: P, var_names: &[&str], f: F) -> ConfResult<bool>
where
    P: AsRef<Path>,
    F: FnMut(&str, &[String], &str) -> EditAction,
{
    let path = path.as_ref();
    let source = fs::read_to_string(path).with_context(|| format!("failed to read {path:?}"))?;
    let (new_source, changed) = edit_metadata(&source, var_names, f)?;
    if changed {
        fs::write(path, new_source).with_context(|| format!("failed to write {path:?}"))?;
    }
    Ok(changed)
}

/// Add and/or remove layers in the `BBLAYERS` assignment(s) of a `bblayers.conf`.
///
/// Entries of `remove` are wildcard patterns. Returns the layers that were not added because
/// they are already present, and the patterns that did not match anything.
pub fn edit_bblayers_conf<P: AsRef<Path>>(
    path: P,
    add: &[String],
    remove: &[String],
) -> ConfResult<(Vec<String>, Vec<String>)> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).with_context(|| format!("failed to read {path:?}"))?;

    let mut add_layers = add
        .iter()
        .map(|l| remove_trailing_sep(l).to_string())
        .collect::<Vec<_>>();
    let remove_layers = remove
        .iter()
        .map(|l| remove_trailing_sep(l).to_string())
        .collect::<Vec<_>>();

    // First pass: only look at what is currently configured
    let mut ops = vec![];
    let mut orig_bblayers: Vec<String> = vec![];
    edit_metadata(&source, &["BBLAYERS"], |_, values, op| {
        ops.push(op.to_string());
        if op == "=" {
            orig_bblayers.clear();
        }
        orig_bblayers.extend(values.iter().map(|v| canonicalise_path(v)));
        EditAction::Keep
    })?;

    if ops.is_empty() {
        return Err(ConfError::MissingAssignment {
            var: String::from("BBLAYERS"),
            file: path.to_path_buf(),
        }
        .into());
    }

    // With several += lines, new layers get their own line rather than joining one of them
    let plus_equals = ops.iter().filter(|op| *op == "+=").count() > 1;

    let remove_canon = remove_layers
        .iter()
        .map(|l| canonicalise_path(l))
        .collect::<Vec<_>>();
    let not_added = add_layers
        .iter()
        .filter(|l| {
            let canon = canonicalise_path(l);
            orig_bblayers.contains(&canon) && !remove_canon.contains(&canon)
        })
        .cloned()
        .collect::<Vec<_>>();
    add_layers.retain(|l| !not_added.contains(l));

    let mut removed = vec![];
    let (mut new_source, mut updated) = edit_metadata(&source, &["BBLAYERS"], |_, values, op| {
        let mut bblayers = values
            .iter()
            .map(|v| remove_trailing_sep(v).to_string())
            .collect::<Vec<_>>();
        let mut changed = false;

        for remove_layer in &remove_layers {
            let pattern = canonicalise_path(remove_layer);
            if let Some(pos) = bblayers
                .iter()
                .position(|layer| fnmatch(&canonicalise_path(layer), &pattern))
            {
                bblayers.remove(pos);
                removed.push(remove_layer.clone());
                changed = true;
            }
        }

        if !plus_equals && !add_layers.is_empty() {
            for add_layer in add_layers.drain(..) {
                if !bblayers.contains(&add_layer) {
                    bblayers.push(add_layer);
                    changed = true;
                }
            }
        }

        match changed {
            false => EditAction::Keep,
            true if op == "+=" && bblayers.is_empty() => EditAction::Delete,
            true => EditAction::Replace(bblayers),
        }
    })?;

    // Still need to add these
    for add_layer in &add_layers {
        if !new_source.is_empty() && !new_source.ends_with('\n') {
            new_source.push('\n');
        }
        new_source.push_str(&format!("BBLAYERS += \"{add_layer}\"\n"));
        updated = true;
    }

    if updated {
        fs::write(path, new_source).with_context(|| format!("failed to write {path:?}"))?;
    }

    let not_removed = remove_layers
        .into_iter()
        .filter(|l| !removed.contains(l))
        .collect::<Vec<_>>();

    Ok((not_added, not_removed))
}
