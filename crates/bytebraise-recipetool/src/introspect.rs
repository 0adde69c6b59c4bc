use std::path::Path;
use std::process::Command;

use itertools::Itertools;
use tracing::{debug, error};

use crate::errors::{ExtractError, ExtractResult};
use crate::fields::{setup_arg, BBVAR_MAP, LIST_FIELDS, MULTI_LINE_FIELDS};
use crate::metadata::{FieldValue, SetupInfo};

/// Runs `setup.py` with query options such as `--name` and returns what it prints.
pub trait SetupIntrospector {
    fn query(&self, script: &Path, args: &[String]) -> ExtractResult<String>;
}

#[derive(Debug, Clone)]
pub struct PythonSetupIntrospector {
    python: String,
}

impl PythonSetupIntrospector {
    pub fn new<S: Into<String>>(python: S) -> Self {
        Self {
            python: python.into(),
        }
    }
}

impl Default for PythonSetupIntrospector {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl SetupIntrospector for PythonSetupIntrospector {
    fn query(&self, script: &Path, args: &[String]) -> ExtractResult<String> {
        let command = format!("{} {} {}", self.python, script.display(), args.join(" "));
        let cwd = script
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        debug!("running `{command}`");
        let output = Command::new(&self.python)
            .arg(script)
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|e| {
                error!("Unable to run `{command}`: {e}");
                ExtractError::Command {
                    command: command.clone(),
                    message: e.to_string(),
                }
            })?;

        if !output.status.success() {
            let message = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!("Unable to run `{command}`: {message}");
            return Err(ExtractError::Command { command, message });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn query_arg(field: &str) -> String {
    format!("--{}", setup_arg(field))
}

/// Ask `setup.py` for every field the recipe can use. List fields and multi-line fields are
/// queried one at a time; single line fields share one invocation. A field whose query fails is
/// left out.
pub fn get_setup_args_info(
    introspector: &dyn SetupIntrospector,
    script: &Path,
) -> ExtractResult<SetupInfo> {
    let fields = BBVAR_MAP
        .keys()
        .chain(LIST_FIELDS.iter())
        .chain(MULTI_LINE_FIELDS.iter())
        .copied()
        .unique()
        .collect::<Vec<_>>();

    let (list_fields, rest): (Vec<&str>, Vec<&str>) =
        fields.into_iter().partition(|f| LIST_FIELDS.contains(f));
    let (multi_line_fields, scalar_fields): (Vec<&str>, Vec<&str>) =
        rest.into_iter().partition(|f| MULTI_LINE_FIELDS.contains(f));

    let mut info = SetupInfo::new();
    for field in list_fields {
        if let Ok(output) = introspector.query(script, &[query_arg(field)]) {
            let values = output.lines().map(|l| l.trim_end().to_string()).collect_vec();
            info.insert(field, values);
        }
    }

    for field in multi_line_fields {
        if let Ok(output) = introspector.query(script, &[query_arg(field)]) {
            info.insert(field, output);
        }
    }

    for (field, value) in get_setup_byline(introspector, &scalar_fields, script)?.iter() {
        info.insert(field, value.clone());
    }

    Ok(info)
}

/// Query all `fields` in one invocation; `setup.py` prints one line per option, in order.
pub fn get_setup_byline(
    introspector: &dyn SetupIntrospector,
    fields: &[&str],
    script: &Path,
) -> ExtractResult<SetupInfo> {
    let mut info = SetupInfo::new();
    if fields.is_empty() {
        return Ok(info);
    }

    let args = fields.iter().map(|f| query_arg(f)).collect_vec();
    let Ok(output) = introspector.query(script, &args) else {
        return Ok(info);
    };

    let lines = output.lines().collect_vec();
    if lines.len() != fields.len() {
        return Err(ExtractError::FieldCountMismatch {
            expected: fields.len(),
            actual: lines.len(),
        });
    }

    for (field, line) in fields.iter().zip(lines) {
        info.insert(field, FieldValue::Text(line.to_string()));
    }
    Ok(info)
}

#[cfg(test)]
pub(crate) mod test {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::*;
    use pretty_assertions::assert_eq;

    /// Answers queries from a table keyed by the joined option list.
    #[derive(Default)]
    pub struct FakeIntrospector {
        pub answers: HashMap<String, String>,
        pub queries: RefCell<Vec<String>>,
    }

    impl SetupIntrospector for FakeIntrospector {
        fn query(&self, _script: &Path, args: &[String]) -> ExtractResult<String> {
            let key = args.join(" ");
            self.queries.borrow_mut().push(key.clone());
            self.answers
                .get(&key)
                .cloned()
                .ok_or_else(|| ExtractError::Command {
                    command: key,
                    message: String::from("error: invalid command"),
                })
        }
    }

    fn script() -> PathBuf {
        PathBuf::from("/src/foo/setup.py")
    }

    #[test_log::test]
    fn args_info() {
        let mut fake = FakeIntrospector::default();
        fake.answers.insert(
            String::from("--name --version --url --description --license"),
            String::from("foo\n1.0\nhttps://example.com\nA foo\nMIT\n"),
        );
        fake.answers.insert(
            String::from("--classifiers"),
            String::from("License :: OSI Approved :: BSD License  \nTopic :: Utilities\n"),
        );
        fake.answers.insert(
            String::from("--long-description"),
            String::from("Long\ntext\n"),
        );

        let info = get_setup_args_info(&fake, &script()).unwrap();
        assert_eq!(info.name(), Some("foo"));
        assert_eq!(info.get("Summary"), Some(&FieldValue::Text(String::from("A foo"))));
        assert_eq!(
            info.get("Description"),
            Some(&FieldValue::Text(String::from("Long\ntext\n")))
        );
        assert_eq!(
            info.strings("Classifier"),
            vec!["License :: OSI Approved :: BSD License", "Topic :: Utilities"]
        );
        // --requires and friends failed and are left out
        assert!(!info.contains("Requires"));
        assert_eq!(info.bitbake_vars()["LICENSE"], "BSD");

        let queries = fake.queries.borrow();
        assert_eq!(queries.len(), 8);
        assert_eq!(
            queries.last().map(String::as_str),
            Some("--name --version --url --description --license")
        );
    }

    #[test]
    fn byline_mismatch_is_fatal() {
        let mut fake = FakeIntrospector::default();
        fake.answers
            .insert(String::from("--name --version"), String::from("foo\n"));

        let err = get_setup_byline(&fake, &["Name", "Version"], &script()).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::FieldCountMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn byline_command_failure_is_empty() {
        let fake = FakeIntrospector::default();
        let info = get_setup_byline(&fake, &["Name"], &script()).unwrap();
        assert!(info.is_empty());
    }
}
