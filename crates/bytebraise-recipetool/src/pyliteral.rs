//! A tokenizer for Python source and an evaluator for literal expressions, enough to read the
//! keyword arguments of a `setup()` call without running it.

use std::fmt;

use itertools::Itertools;
use muncher::Muncher;

use crate::errors::{ExtractError, ExtractResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PyToken {
    Name(String),
    Number(String),
    Str {
        value: String,
        /// f-string; never a literal
        formatted: bool,
        bytes: bool,
    },
    Op(String),
    /// End of a logical line
    Newline,
}

impl PyToken {
    pub fn is_op(&self, op: &str) -> bool {
        matches!(self, PyToken::Op(o) if o == op)
    }

    pub fn is_name(&self, name: &str) -> bool {
        matches!(self, PyToken::Name(n) if n == name)
    }
}

static THREE_CHAR_OPS: &[&str] = &["**=", "//=", ">>=", "<<=", "..."];
static TWO_CHAR_OPS: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "->", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=",
    "@=", ":=", "<<", ">>",
];

fn is_string_prefix(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "r" | "u" | "b" | "f" | "br" | "rb" | "fr" | "rf"
    )
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

struct PyTokenizer<'input> {
    muncher: Muncher<'input>,
    file: String,
    line: usize,
    depth: usize,
    tokens: Vec<PyToken>,
}

impl<'input> PyTokenizer<'input> {
    fn new(source: &'input str, file: &str) -> Self {
        Self {
            muncher: Muncher::new(source),
            file: file.to_string(),
            line: 1,
            depth: 0,
            tokens: vec![],
        }
    }

    fn peek_n(&mut self, n: usize) -> String {
        let mut ret = String::new();
        for _ in 0..n {
            match self.muncher.peek() {
                Some(c) => ret.push(*c),
                None => break,
            }
        }
        self.muncher.reset_peek();
        ret
    }

    fn peek(&mut self) -> Option<char> {
        self.peek_n(1).chars().next()
    }

    fn eat(&mut self) -> Option<char> {
        let c = self.muncher.eat();
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn eat_n(&mut self, n: usize) {
        for _ in 0..n {
            self.eat();
        }
    }

    fn error<S: Into<String>>(&self, message: S) -> ExtractError {
        ExtractError::Tokenize {
            file: self.file.clone(),
            line: self.line,
            message: message.into(),
        }
    }

    fn push_newline(&mut self) {
        if !matches!(self.tokens.last(), None | Some(PyToken::Newline)) {
            self.tokens.push(PyToken::Newline);
        }
    }

    fn tokenize(mut self) -> ExtractResult<Vec<PyToken>> {
        while let Some(c) = self.peek() {
            match c {
                '#' => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.eat();
                    }
                }
                '\\' if self.peek_n(2) == "\\\n" => self.eat_n(2),
                '\n' => {
                    self.eat();
                    if self.depth == 0 {
                        self.push_newline();
                    }
                }
                c if c.is_whitespace() => {
                    self.eat();
                }
                '\'' | '"' => {
                    let token = self.scan_string("")?;
                    self.tokens.push(token);
                }
                c if c.is_alphabetic() || c == '_' => {
                    let mut name = String::new();
                    while let Some(c) = self.peek().filter(|c| is_name_char(*c)) {
                        name.push(c);
                        self.eat();
                    }

                    if is_string_prefix(&name) && matches!(self.peek(), Some('\'' | '"')) {
                        let token = self.scan_string(&name)?;
                        self.tokens.push(token);
                    } else {
                        self.tokens.push(PyToken::Name(name));
                    }
                }
                c if c.is_ascii_digit() => self.scan_number(),
                '.' if self.peek_n(2).chars().nth(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.scan_number()
                }
                _ => self.scan_op(),
            }
        }

        self.push_newline();
        Ok(self.tokens)
    }

    fn scan_number(&mut self) {
        let mut number = String::new();
        while let Some(c) = self.peek() {
            let exponent_sign = (c == '+' || c == '-')
                && number.ends_with(['e', 'E'])
                && !number.starts_with("0x")
                && !number.starts_with("0X");
            if is_name_char(c) || c == '.' || exponent_sign {
                number.push(c);
                self.eat();
            } else {
                break;
            }
        }
        self.tokens.push(PyToken::Number(number));
    }

    fn scan_op(&mut self) {
        let ahead = self.peek_n(3);
        let op = THREE_CHAR_OPS
            .iter()
            .chain(TWO_CHAR_OPS.iter())
            .find(|op| ahead.starts_with(**op))
            .map(|op| op.to_string())
            .unwrap_or_else(|| ahead.chars().take(1).collect());

        self.eat_n(op.chars().count());
        match op.as_str() {
            "(" | "[" | "{" => self.depth += 1,
            ")" | "]" | "}" => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
        self.tokens.push(PyToken::Op(op));
    }

    fn scan_hex_escape(&mut self, digits: usize) -> ExtractResult<char> {
        let hex = self.peek_n(digits);
        let c = u32::from_str_radix(&hex, 16)
            .ok()
            .filter(|_| hex.len() == digits)
            .and_then(char::from_u32)
            .ok_or_else(|| self.error(format!("invalid escape sequence \\x{hex}")))?;
        self.eat_n(digits);
        Ok(c)
    }

    /// Named escapes (`\N{...}`) are kept as written; there is no character name table here.
    fn scan_string(&mut self, prefix: &str) -> ExtractResult<PyToken> {
        let prefix = prefix.to_ascii_lowercase();
        let raw = prefix.contains('r');
        let bytes = prefix.contains('b');
        let formatted = prefix.contains('f');

        let Some(quote) = self.eat() else {
            return Err(self.error("expected string"));
        };
        let triple = self.peek_n(2).chars().all(|c| c == quote) && self.peek_n(2).len() == 2;
        if triple {
            self.eat_n(2);
        }

        let mut value = String::new();
        loop {
            let Some(c) = self.eat() else {
                return Err(self.error("unterminated string literal"));
            };

            match c {
                '\\' => {
                    let Some(escaped) = self.eat() else {
                        return Err(self.error("unterminated string literal"));
                    };
                    if raw {
                        value.push('\\');
                        value.push(escaped);
                        continue;
                    }

                    match escaped {
                        '\n' => {}
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        'a' => value.push('\x07'),
                        'b' => value.push('\x08'),
                        'f' => value.push('\x0c'),
                        'v' => value.push('\x0b'),
                        '\\' | '\'' | '"' => value.push(escaped),
                        'x' => value.push(self.scan_hex_escape(2)?),
                        'u' if !bytes => value.push(self.scan_hex_escape(4)?),
                        'U' if !bytes => value.push(self.scan_hex_escape(8)?),
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                }
                c if c == quote => {
                    if !triple {
                        break;
                    }
                    let ahead = self.peek_n(2);
                    if ahead.len() == 2 && ahead.chars().all(|a| a == quote) {
                        self.eat_n(2);
                        break;
                    }
                    value.push(c);
                }
                '\n' if !triple => {
                    // Reported on the line the string started on
                    self.line -= 1;
                    return Err(self.error("unterminated string literal"));
                }
                c => value.push(c),
            }
        }

        Ok(PyToken::Str {
            value,
            formatted,
            bytes,
        })
    }
}

/// Split Python source into tokens. `file` is only used in error messages.
///
/// Like Python reading a source file, a leading byte order mark is dropped and `\r\n` and `\r`
/// line endings are read as `\n`.
pub fn tokenize(source: &str, file: &str) -> ExtractResult<Vec<PyToken>> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let source = source.replace("\r\n", "\n").replace('\r', "\n");
    PyTokenizer::new(&source, file).tokenize()
}

/// Value of a Python literal expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PyLiteral {
    Str(String),
    Number(String),
    Bool(bool),
    None,
    List(Vec<PyLiteral>),
    Tuple(Vec<PyLiteral>),
    Set(Vec<PyLiteral>),
    Dict(Vec<(PyLiteral, PyLiteral)>),
}

impl PyLiteral {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PyLiteral::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The string itself for strings, the Python representation for everything else.
    pub fn to_text(&self) -> String {
        match self {
            PyLiteral::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Items of a sequence as text, or the value itself as a single item.
    pub fn to_strings(&self) -> Vec<String> {
        match self {
            PyLiteral::List(items) | PyLiteral::Tuple(items) | PyLiteral::Set(items) => {
                items.iter().map(PyLiteral::to_text).collect()
            }
            other => vec![other.to_text()],
        }
    }
}

impl fmt::Display for PyLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PyLiteral::Str(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            PyLiteral::Number(n) => write!(f, "{n}"),
            PyLiteral::Bool(true) => write!(f, "True"),
            PyLiteral::Bool(false) => write!(f, "False"),
            PyLiteral::None => write!(f, "None"),
            PyLiteral::List(items) => write!(f, "[{}]", items.iter().join(", ")),
            PyLiteral::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0]),
            PyLiteral::Tuple(items) => write!(f, "({})", items.iter().join(", ")),
            PyLiteral::Set(items) => write!(f, "{{{}}}", items.iter().join(", ")),
            PyLiteral::Dict(entries) => write!(
                f,
                "{{{}}}",
                entries.iter().map(|(k, v)| format!("{k}: {v}")).join(", ")
            ),
        }
    }
}

struct LiteralParser<'t> {
    tokens: &'t [PyToken],
    pos: usize,
}

impl<'t> LiteralParser<'t> {
    fn peek(&self) -> Option<&'t PyToken> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'t PyToken> {
        let ret = self.tokens.get(self.pos);
        self.pos += 1;
        ret
    }

    fn at_op(&self, op: &str) -> bool {
        self.peek().is_some_and(|t| t.is_op(op))
    }

    fn value(&mut self) -> Option<PyLiteral> {
        match self.next()? {
            PyToken::Str {
                value,
                formatted: false,
                bytes,
            } => {
                let mut joined = value.clone();
                // Adjacent strings are concatenated
                while let Some(PyToken::Str {
                    value: more,
                    formatted,
                    bytes: more_bytes,
                }) = self.peek()
                {
                    if *formatted || more_bytes != bytes {
                        return None;
                    }
                    joined.push_str(more);
                    self.pos += 1;
                }
                Some(PyLiteral::Str(joined))
            }
            PyToken::Number(n) => Some(PyLiteral::Number(n.clone())),
            PyToken::Name(name) => match name.as_str() {
                "True" => Some(PyLiteral::Bool(true)),
                "False" => Some(PyLiteral::Bool(false)),
                "None" => Some(PyLiteral::None),
                _ => None,
            },
            PyToken::Op(op) if op == "-" || op == "+" => match self.next()? {
                PyToken::Number(n) if op == "-" => Some(PyLiteral::Number(format!("-{n}"))),
                PyToken::Number(n) => Some(PyLiteral::Number(n.clone())),
                _ => None,
            },
            PyToken::Op(op) if op == "(" => {
                let (mut items, trailing_comma) = self.sequence(")")?;
                match items.len() == 1 && !trailing_comma {
                    true => items.pop(),
                    false => Some(PyLiteral::Tuple(items)),
                }
            }
            PyToken::Op(op) if op == "[" => Some(PyLiteral::List(self.sequence("]")?.0)),
            PyToken::Op(op) if op == "{" => self.dict_or_set(),
            _ => None,
        }
    }

    /// Comma separated values up to and including `close`.
    fn sequence(&mut self, close: &str) -> Option<(Vec<PyLiteral>, bool)> {
        let mut items = vec![];
        let mut trailing_comma = false;
        loop {
            if self.at_op(close) {
                self.pos += 1;
                return Some((items, trailing_comma));
            }

            items.push(self.value()?);
            trailing_comma = false;
            if self.at_op(",") {
                self.pos += 1;
                trailing_comma = true;
            } else if !self.at_op(close) {
                return None;
            }
        }
    }

    fn dict_or_set(&mut self) -> Option<PyLiteral> {
        if self.at_op("}") {
            self.pos += 1;
            return Some(PyLiteral::Dict(vec![]));
        }

        let first = self.value()?;
        if !self.at_op(":") {
            let mut items = vec![first];
            if self.at_op(",") {
                self.pos += 1;
                items.extend(self.sequence("}")?.0);
            } else if self.next()?.is_op("}") {
                return Some(PyLiteral::Set(items));
            } else {
                return None;
            }
            return Some(PyLiteral::Set(items));
        }

        let mut entries = vec![];
        let mut key = first;
        loop {
            if !self.next()?.is_op(":") {
                return None;
            }
            let value = self.value()?;
            entries.push((key, value));

            match self.next()? {
                t if t.is_op("}") => return Some(PyLiteral::Dict(entries)),
                t if t.is_op(",") => {
                    if self.at_op("}") {
                        self.pos += 1;
                        return Some(PyLiteral::Dict(entries));
                    }
                    key = self.value()?;
                }
                _ => return None,
            }
        }
    }
}

/// Evaluate `tokens` as one literal expression; `None` when they are anything else.
pub fn parse_literal(tokens: &[PyToken]) -> Option<PyLiteral> {
    let end = tokens
        .iter()
        .rposition(|t| *t != PyToken::Newline)
        .map(|p| p + 1)
        .unwrap_or(0);
    let tokens = &tokens[..end];

    let mut parser = LiteralParser { tokens, pos: 0 };
    let value = parser.value()?;
    match parser.pos == tokens.len() {
        true => Some(value),
        false => None,
    }
}

/// Like Python's `ast.literal_eval`: the value of `source` if it is a literal expression.
pub fn literal_eval(source: &str) -> ExtractResult<Option<PyLiteral>> {
    Ok(parse_literal(&tokenize(source, "<string>")?))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn eval(source: &str) -> Option<PyLiteral> {
        literal_eval(source).unwrap()
    }

    fn s(value: &str) -> PyLiteral {
        PyLiteral::Str(value.to_string())
    }

    #[test]
    fn strings() {
        assert_eq!(eval(r#""foo""#), Some(s("foo")));
        assert_eq!(eval(r#"'a\tb\'c'"#), Some(s("a\tb'c")));
        assert_eq!(eval(r#"r'\d+'"#), Some(s(r"\d+")));
        assert_eq!(eval(r#"u"café""#), Some(s("café")));
        assert_eq!(eval("('multi'\n  'part')"), Some(s("multipart")));
        assert_eq!(eval("'''line one\nline \"two\"'''"), Some(s("line one\nline \"two\"")));
        assert_eq!(eval(r#"f"{name}""#), None);
    }

    #[test]
    fn scalars() {
        assert_eq!(eval("42"), Some(PyLiteral::Number(String::from("42"))));
        assert_eq!(eval("-1.5e-3"), Some(PyLiteral::Number(String::from("-1.5e-3"))));
        assert_eq!(eval("True"), Some(PyLiteral::Bool(true)));
        assert_eq!(eval("None"), Some(PyLiteral::None));
        assert_eq!(eval("version"), None);
        assert_eq!(eval("'a' + 'b'"), None);
    }

    #[test]
    fn containers() {
        assert_eq!(
            eval("['six', 'requests>=2.0',]"),
            Some(PyLiteral::List(vec![s("six"), s("requests>=2.0")]))
        );
        assert_eq!(eval("('a',)"), Some(PyLiteral::Tuple(vec![s("a")])));
        assert_eq!(eval("()"), Some(PyLiteral::Tuple(vec![])));
        assert_eq!(eval("{'a', 'b'}"), Some(PyLiteral::Set(vec![s("a"), s("b")])));
        assert_eq!(
            eval("{'': 'src', 'tests': ['x', 'y']}"),
            Some(PyLiteral::Dict(vec![
                (s(""), s("src")),
                (s("tests"), PyLiteral::List(vec![s("x"), s("y")])),
            ]))
        );
        assert_eq!(eval("[open('README').read()]"), None);
        assert_eq!(eval("find_packages()"), None);
    }

    #[test]
    fn display_is_python_repr() {
        let value = eval("{'a': [1, None], 'b': ('x',)}").unwrap();
        assert_eq!(value.to_string(), "{'a': [1, None], 'b': ('x',)}");
        assert_eq!(s("plain").to_text(), "plain");
    }

    #[test]
    fn tokens_and_lines() {
        let tokens = tokenize("import os  # comment\nx = (1,\n  2)\\\n\n", "t.py").unwrap();
        assert_eq!(
            tokens,
            vec![
                PyToken::Name(String::from("import")),
                PyToken::Name(String::from("os")),
                PyToken::Newline,
                PyToken::Name(String::from("x")),
                PyToken::Op(String::from("=")),
                PyToken::Op(String::from("(")),
                PyToken::Number(String::from("1")),
                PyToken::Op(String::from(",")),
                PyToken::Number(String::from("2")),
                PyToken::Op(String::from(")")),
                PyToken::Newline,
            ]
        );
    }

    #[test]
    fn crlf_and_bom() {
        let tokens = tokenize("\u{feff}x = 1 + \\\r\n  2\r\ny = '''a\r\nb'''\r\n", "t.py").unwrap();
        assert_eq!(
            tokens,
            vec![
                PyToken::Name(String::from("x")),
                PyToken::Op(String::from("=")),
                PyToken::Number(String::from("1")),
                PyToken::Op(String::from("+")),
                PyToken::Number(String::from("2")),
                PyToken::Newline,
                PyToken::Name(String::from("y")),
                PyToken::Op(String::from("=")),
                PyToken::Str {
                    value: String::from("a\nb"),
                    formatted: false,
                    bytes: false,
                },
                PyToken::Newline,
            ]
        );
    }

    #[test]
    fn named_escapes_are_kept() {
        assert_eq!(eval(r"'\N{BULLET} item'"), Some(s(r"\N{BULLET} item")));
    }

    #[test]
    fn unterminated_string() {
        let err = tokenize("x = 'abc\n", "setup.py").unwrap_err();
        assert!(matches!(err, ExtractError::Tokenize { line: 1, .. }));
    }
}
