use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use once_cell::sync::Lazy;
use phf::phf_map;
use regex::{Captures, Regex};
use tracing::debug;

use bytebraise_util::path::which;

use crate::data::{ConfData, PendingOp};
use crate::errors::{ConfError, ConfResult};

static ASSIGNMENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        ^(?P<export>export\s+)?
        (?P<var>[a-zA-Z0-9\-_+.${}/~:]+?)
        (?:\[(?P<flag>[a-zA-Z0-9\-_+.]+)\])?
        \s*(?P<op>\?\?=|\?=|:=|\+=|=\+|\.=|=\.|=)\s*
        (?:"(?P<dq>.*)"|'(?P<sq>.*)')\s*$
        "#,
    )
    .unwrap()
});

static OVERRIDE_OP_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<base>.*?):(?P<op>append|prepend|remove)$").unwrap());

static VAR_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<var>[a-zA-Z0-9\-_+.${}/~:]+)(?:\[(?P<flag>[a-zA-Z0-9\-_+.]+)\])?$").unwrap()
});

#[derive(Clone, Copy, Debug)]
enum Directive {
    Include,
    Require,
    Export,
    Unset,
}

static DIRECTIVES: phf::Map<&'static str, Directive> = phf_map! {
    "include" => Directive::Include,
    "require" => Directive::Require,
    "export" => Directive::Export,
    "unset" => Directive::Unset,
};

/// A statement after joining continuation lines, with the line it started on.
struct LogicalLine {
    line_no: usize,
    text: String,
}

fn logical_lines(source: &str) -> Vec<LogicalLine> {
    let mut ret = vec![];
    let mut current: Option<LogicalLine> = None;

    for (idx, raw) in source.lines().enumerate() {
        let (content, continued) = match raw.strip_suffix('\\') {
            Some(stripped) => (stripped, true),
            None => (raw, false),
        };

        let line = current.get_or_insert_with(|| LogicalLine {
            line_no: idx + 1,
            text: String::new(),
        });
        line.text.push_str(content);

        if !continued {
            if let Some(done) = current.take() {
                ret.push(done);
            }
        }
    }

    ret.extend(current);
    ret
}

/// Evaluate configuration `source` into `d`. `file` is used for error messages and for
/// resolving relative includes.
pub fn parse_config_str(source: &str, file: Option<&Path>, d: &mut ConfData) -> ConfResult<()> {
    let file_name = file
        .map(|f| f.display().to_string())
        .unwrap_or_else(|| String::from("<string>"));

    for line in logical_lines(source) {
        let text = line.text.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        if let Some(caps) = ASSIGNMENT_REGEX.captures(text) {
            evaluate_assignment(&caps, d)
                .with_context(|| format!("{}:{}", &file_name, line.line_no))?;
            continue;
        }

        let (keyword, rest) = text
            .split_once(char::is_whitespace)
            .map(|(k, r)| (k, r.trim()))
            .unwrap_or((text, ""));

        let syntax_error = || ConfError::Syntax {
            file: file_name.clone(),
            line: line.line_no,
            text: text.to_string(),
        };

        match DIRECTIVES.get(keyword) {
            Some(directive @ (Directive::Include | Directive::Require)) if !rest.is_empty() => {
                let required = matches!(directive, Directive::Require);
                let files = d.expand(rest)?;
                for f in files.split_whitespace() {
                    include_single_file(f, file, required, d)?;
                }
            }
            Some(Directive::Export) => {
                let caps = VAR_NAME_REGEX.captures(rest).ok_or_else(syntax_error)?;
                if caps.name("flag").is_some() {
                    return Err(syntax_error().into());
                }
                d.set_var_flag(&caps["var"], "export", "1");
            }
            Some(Directive::Unset) => {
                let caps = VAR_NAME_REGEX.captures(rest).ok_or_else(syntax_error)?;
                match caps.name("flag") {
                    Some(flag) => d.del_var_flag(&caps["var"], flag.as_str()),
                    None => d.del_var(&caps["var"]),
                }
            }
            _ => return Err(syntax_error().into()),
        }
    }

    Ok(())
}

fn evaluate_assignment(caps: &Captures<'_>, d: &mut ConfData) -> ConfResult<()> {
    let var = caps["var"].to_string();
    let flag = caps.name("flag").map(|f| f.as_str().to_string());
    let op = &caps["op"];
    let value = caps
        .name("dq")
        .or_else(|| caps.name("sq"))
        .map(|m| m.as_str())
        .unwrap_or_default()
        .to_string();

    if caps.name("export").is_some() {
        d.set_var_flag(&var, "export", "1");
    }

    if let Some(flag) = flag {
        let current = d.get_var_flag(&var, &flag).map(String::from);
        let new_value = combine(op, current, value, d)?;
        if let Some(new_value) = new_value {
            d.set_var_flag(var, flag, new_value);
        }
        return Ok(());
    }

    if let Some(override_caps) = OVERRIDE_OP_REGEX.captures(&var) {
        let pending = match &override_caps["op"] {
            "append" => PendingOp::Append,
            "prepend" => PendingOp::Prepend,
            _ => PendingOp::Remove,
        };
        let value = match op {
            "+=" => format!(" {value}"),
            "=+" => format!("{value} "),
            _ => value,
        };
        d.push_pending(&override_caps["base"], pending, value);
        return Ok(());
    }

    if op == "??=" {
        d.set_weak_default(var, value);
        return Ok(());
    }

    let current = d.get_var_raw(&var).map(String::from);
    if let Some(new_value) = combine(op, current, value, d)? {
        d.set_var(var, new_value);
    }

    Ok(())
}

/// Apply assignment operator `op`. `None` means the assignment has no effect.
fn combine(
    op: &str,
    current: Option<String>,
    value: String,
    d: &ConfData,
) -> ConfResult<Option<String>> {
    let ret = match op {
        "=" => Some(value),
        "?=" | "??=" => match current {
            Some(_) => None,
            None => Some(value),
        },
        ":=" => Some(d.expand(&value)?),
        "+=" => Some(match current {
            Some(c) if !c.is_empty() => format!("{c} {value}"),
            _ => value,
        }),
        "=+" => Some(match current {
            Some(c) if !c.is_empty() => format!("{value} {c}"),
            _ => value,
        }),
        ".=" => Some(format!("{}{value}", current.unwrap_or_default())),
        "=." => Some(format!("{value}{}", current.unwrap_or_default())),
        _ => unreachable!("operator not matched by ASSIGNMENT_REGEX: {op}"),
    };

    Ok(ret)
}

fn include_single_file(
    name: &str,
    including_file: Option<&Path>,
    required: bool,
    d: &mut ConfData,
) -> ConfResult<()> {
    let mut path = PathBuf::from(name);

    if path.is_relative() {
        let bbpath = d.get_var_or_empty("BBPATH")?;
        let search_path = match including_file.and_then(Path::parent) {
            Some(dir) => format!("{}:{}", dir.display(), bbpath),
            None => bbpath,
        };

        match which(&search_path, &path, false, false) {
            Some(found) => path = found,
            None if required => {
                return Err(ConfError::MissingRequire {
                    file: path,
                    search_path,
                }
                .into())
            }
            None => {
                debug!("include {:?} not found, ignoring", &path);
                return Ok(());
            }
        }
    } else if !path.exists() {
        if required {
            return Err(ConfError::MissingRequire {
                file: path,
                search_path: String::new(),
            }
            .into());
        }
        debug!("include {:?} not found, ignoring", &path);
        return Ok(());
    }

    parse_config_file(&path, d).with_context(|| format!("failure including file {:?}", &path))
}

/// Evaluate the configuration file at `file` into `d`. Relative paths are looked up in `BBPATH`.
pub fn parse_config_file<F: AsRef<Path>>(file: F, d: &mut ConfData) -> ConfResult<()> {
    let mut file = file.as_ref().to_path_buf();

    if !file.is_absolute() && !file.exists() {
        let bbpath = d.get_var_or_empty("BBPATH")?;
        file = which(&bbpath, &file, false, false)
            .ok_or_else(|| anyhow::anyhow!("file {:?} not found in {}", &file, &bbpath))?;
    }

    debug!("parsing {:?}", &file);
    let source =
        fs::read_to_string(&file).with_context(|| format!("failed to read {:?}", &file))?;

    d.enter_file(fs::canonicalize(&file).unwrap_or_else(|_| file.clone()))?;
    let ret = parse_config_str(&source, Some(&file), d)
        .with_context(|| format!("failure to evaluate configuration in {:?}", &file));
    d.leave_file();
    ret
}
