use std::borrow::Cow;

use regex::{Captures, Regex};

/// Split a BitBake list value into its words. Line continuations (`\`) left over from a
/// multi-line assignment are treated as whitespace.
///
/// ```
/// use bytebraise_util::split::split_list_value;
/// let value = " \\\n  /a/meta \\\n  /b/meta-oe \\\n  ";
/// assert_eq!(split_list_value(value), vec!["/a/meta", "/b/meta-oe"]);
/// ```
pub fn split_list_value(value: &str) -> Vec<String> {
    value
        .split(|c: char| c.is_whitespace() || c == '\\')
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

pub trait ReplaceFallible {
    /// Like [`Regex::replace_all`], but the replacer may fail. The first error aborts the
    /// replacement and is returned.
    fn replace_all_fallible<'t, F, E>(&self, text: &'t str, rep: F) -> Result<Cow<'t, str>, E>
    where
        F: FnMut(&Captures<'_>) -> Result<String, E>;
}

impl ReplaceFallible for Regex {
    fn replace_all_fallible<'t, F, E>(&self, text: &'t str, mut rep: F) -> Result<Cow<'t, str>, E>
    where
        F: FnMut(&Captures<'_>) -> Result<String, E>,
    {
        let mut new = String::with_capacity(text.len());
        let mut last_match = 0;
        let mut matched = false;
        for caps in self.captures_iter(text) {
            let Some(m) = caps.get(0) else {
                continue;
            };
            matched = true;
            new.push_str(&text[last_match..m.start()]);
            new.push_str(&rep(&caps)?);
            last_match = m.end();
        }

        if !matched {
            return Ok(Cow::Borrowed(text));
        }

        new.push_str(&text[last_match..]);
        Ok(Cow::Owned(new))
    }
}
