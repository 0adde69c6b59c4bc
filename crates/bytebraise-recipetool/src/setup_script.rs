use std::fs;
use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::errors::{ExtractError, ExtractResult};
use crate::pyliteral::{parse_literal, tokenize, PyLiteral, PyToken};

/// What a static read of `setup.py` learns without running it.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SetupScript {
    /// Literal keyword arguments of `setup()`, by keyword
    pub setup_data: IndexMap<String, PyLiteral>,
    /// Keywords whose value is computed
    pub non_literals: Vec<String>,
    pub imported_modules: IndexSet<String>,
}

impl SetupScript {
    pub fn uses_setuptools(&self) -> bool {
        self.imported_modules.contains("setuptools")
    }
}

/// Index of the token closing the bracket opened at `open`.
fn matching_close(tokens: &[PyToken], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            PyToken::Op(op) if matches!(op.as_str(), "(" | "[" | "{") => depth += 1,
            PyToken::Op(op) if matches!(op.as_str(), ")" | "]" | "}") => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split call arguments on top-level commas.
fn split_arguments(tokens: &[PyToken]) -> Vec<&[PyToken]> {
    let mut args = vec![];
    let mut depth = 0usize;
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            PyToken::Op(op) if matches!(op.as_str(), "(" | "[" | "{") => depth += 1,
            PyToken::Op(op) if matches!(op.as_str(), ")" | "]" | "}") => {
                depth = depth.saturating_sub(1)
            }
            PyToken::Op(op) if op == "," && depth == 0 => {
                args.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    args.push(&tokens[start..]);
    args.retain(|arg| !arg.is_empty());
    args
}

fn ends_statement(token: Option<&PyToken>) -> bool {
    match token {
        None | Some(PyToken::Newline) => true,
        Some(t) => t.is_op(";"),
    }
}

struct SetupScriptVisitor<'t> {
    tokens: &'t [PyToken],
    script: SetupScript,
}

impl<'t> SetupScriptVisitor<'t> {
    fn dotted_name(&self, mut pos: usize) -> (String, usize) {
        let mut name = String::new();
        while let Some(token) = self.tokens.get(pos) {
            match token {
                PyToken::Name(n) if n != "import" && n != "as" => name.push_str(n),
                PyToken::Op(op) if op == "." || op == "..." => name.push_str(op),
                _ => break,
            }
            pos += 1;
        }
        (name, pos)
    }

    /// `import a.b as c, d`
    fn visit_import(&mut self, mut pos: usize) -> usize {
        loop {
            let (name, next) = self.dotted_name(pos);
            if !name.is_empty() {
                self.script.imported_modules.insert(name);
            }
            pos = next;

            if self.tokens.get(pos).is_some_and(|t| t.is_name("as")) {
                pos += 2;
            }
            match self.tokens.get(pos) {
                Some(t) if t.is_op(",") => pos += 1,
                _ => return pos,
            }
        }
    }

    /// `from a.b import c`; relative imports record the module part only
    fn visit_import_from(&mut self, pos: usize) -> usize {
        let (name, next) = self.dotted_name(pos);
        let module = name.trim_start_matches('.');
        if !module.is_empty() {
            self.script.imported_modules.insert(module.to_string());
        }
        next
    }

    fn visit_setup(&mut self, args: &[PyToken]) {
        for arg in split_arguments(args) {
            let (keyword, value) = match arg {
                [PyToken::Name(keyword), eq, value @ ..] if eq.is_op("=") => (keyword, value),
                // Positional and ** arguments
                _ => continue,
            };

            match parse_literal(value) {
                Some(PyLiteral::None) => {
                    debug!("skipping setup() keyword {keyword}=None");
                }
                Some(literal) => {
                    self.script.setup_data.insert(keyword.clone(), literal);
                }
                None => self.script.non_literals.push(keyword.clone()),
            }
        }
    }

    fn visit(mut self) -> SetupScript {
        let mut pos = 0;
        let mut depth = 0usize;
        let mut statement_start = true;

        while let Some(token) = self.tokens.get(pos) {
            if statement_start && depth == 0 {
                match token {
                    PyToken::Name(n) if n == "import" => {
                        pos = self.visit_import(pos + 1);
                        statement_start = false;
                        continue;
                    }
                    PyToken::Name(n) if n == "from" => {
                        pos = self.visit_import_from(pos + 1);
                        statement_start = false;
                        continue;
                    }
                    PyToken::Name(n)
                        if n == "setup"
                            && self.tokens.get(pos + 1).is_some_and(|t| t.is_op("(")) =>
                    {
                        if let Some(close) = matching_close(self.tokens, pos + 1) {
                            if ends_statement(self.tokens.get(close + 1)) {
                                self.visit_setup(&self.tokens[pos + 2..close]);
                                pos = close + 1;
                                statement_start = false;
                                continue;
                            }
                        }
                    }
                    _ => {}
                }
            }

            statement_start = match token {
                PyToken::Newline => true,
                PyToken::Op(op) if matches!(op.as_str(), "(" | "[" | "{") => {
                    depth += 1;
                    false
                }
                PyToken::Op(op) if matches!(op.as_str(), ")" | "]" | "}") => {
                    depth = depth.saturating_sub(1);
                    false
                }
                PyToken::Op(op) if op == ";" => true,
                // Compound statement bodies on the same line
                PyToken::Op(op) if op == ":" && depth == 0 => true,
                _ => false,
            };
            pos += 1;
        }

        self.script
    }
}

pub fn parse_setup_script(source: &str, file: &str) -> ExtractResult<SetupScript> {
    let tokens = tokenize(source, file)?;
    Ok(SetupScriptVisitor {
        tokens: &tokens,
        script: SetupScript::default(),
    }
    .visit())
}

pub fn read_setup_script(path: &Path) -> ExtractResult<SetupScript> {
    let source = fs::read_to_string(path).map_err(|source| ExtractError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_setup_script(&source, &path.display().to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use indexmap::indexset;
    use pretty_assertions::assert_eq;

    const SETUP_PY: &str = r#"#!/usr/bin/env python
import os, sys
import os.path as osp
from setuptools import setup, find_packages
from .version import __version__

with open(os.path.join(os.path.dirname(__file__), 'README.rst')) as f:
    long_description = f.read()

extra = {}
if sys.version_info >= (3,):
    extra['use_2to3'] = True

setup(
    name='foo',
    version=__version__,
    description="A foo " "library",
    long_description=long_description,
    url=None,
    packages=find_packages(exclude=['tests']),
    py_modules=['foo_compat'],
    install_requires=[
        'six>=1.10',  # compat
        'requests',
    ],
    classifiers=(
        'License :: OSI Approved :: MIT License',
    ),
    **extra
)
"#;

    #[test]
    fn visit_setup_py() {
        let script = parse_setup_script(SETUP_PY, "setup.py").unwrap();

        assert_eq!(
            script.imported_modules,
            indexset! {
                String::from("os"),
                String::from("sys"),
                String::from("os.path"),
                String::from("setuptools"),
                String::from("version"),
            }
        );
        assert!(script.uses_setuptools());

        assert_eq!(
            script.setup_data.keys().collect::<Vec<_>>(),
            vec!["name", "description", "py_modules", "install_requires", "classifiers"]
        );
        assert_eq!(script.setup_data["name"], PyLiteral::Str(String::from("foo")));
        assert_eq!(script.setup_data["description"].to_text(), "A foo library");
        assert_eq!(
            script.setup_data["install_requires"].to_strings(),
            vec!["six>=1.10", "requests"]
        );
        assert_eq!(
            script.non_literals,
            vec!["version", "long_description", "packages"]
        );
    }

    #[test]
    fn setup_in_block_and_attribute_calls() {
        let source = "from distutils.core import setup\n\
                      if __name__ == '__main__':\n    setup(name='bar')\n\
                      x = setup(name='ignored')\n\
                      other.setup(name='ignored')\n";
        let script = parse_setup_script(source, "setup.py").unwrap();
        assert!(!script.uses_setuptools());
        assert_eq!(script.setup_data.len(), 1);
        assert_eq!(script.setup_data["name"].to_text(), "bar");
    }

    #[test]
    fn windows_line_endings_and_bom() {
        let script = parse_setup_script(
            "setup(\r\n    name='foo', \\\r\n    version='1.0',\r\n)\r\n",
            "setup.py",
        )
        .unwrap();
        assert_eq!(script.setup_data.keys().collect::<Vec<_>>(), vec!["name", "version"]);
        assert_eq!(script.setup_data["version"].to_text(), "1.0");
        assert!(script.non_literals.is_empty());

        let script = parse_setup_script("\u{feff}setup(name='bom')\n", "setup.py").unwrap();
        assert_eq!(script.setup_data["name"].to_text(), "bom");
    }

    #[test]
    fn tokenize_error() {
        assert!(parse_setup_script("setup(name='unterminated)\n", "setup.py").is_err());
    }
}
