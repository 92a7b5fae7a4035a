// src/command/mod.rs

//! Turning flag templates into argument vectors.
//!
//! A template is a program plus a whitespace-separated flag string such as
//! `-f {exportformat} -o {outputpath} {inputfiles}`. Tokens that start with
//! `{` and end with `}` are placeholders and are looked up, braces included,
//! in a [`ValueMap`]. Everything else is copied verbatim.
//!
//! The result is handed to the OS as-is: no shell is involved, so values with
//! spaces stay one argument and nothing is ever re-split.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::errors::{AutoconvertError, Result};
use crate::queue::Job;
use crate::types::Verbosity;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{.*\}$").expect("placeholder pattern is a valid regex")
});

/// Value bound to a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// Substituted as exactly one argument.
    Single(String),
    /// Spliced in as one argument per element, order preserved.
    List(Vec<String>),
}

impl ArgValue {
    /// Number of arguments this value expands to.
    pub fn len(&self) -> usize {
        match self {
            ArgValue::Single(_) => 1,
            ArgValue::List(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Single(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Single(value)
    }
}

impl From<&Path> for ArgValue {
    fn from(value: &Path) -> Self {
        ArgValue::Single(value.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for ArgValue {
    fn from(value: PathBuf) -> Self {
        ArgValue::from(value.as_path())
    }
}

impl From<Vec<String>> for ArgValue {
    fn from(values: Vec<String>) -> Self {
        ArgValue::List(values)
    }
}

impl From<Vec<&str>> for ArgValue {
    fn from(values: Vec<&str>) -> Self {
        ArgValue::List(values.into_iter().map(str::to_string).collect())
    }
}

/// Placeholder token (with braces, e.g. `{path}`) to value.
pub type ValueMap = HashMap<String, ArgValue>;

/// Whether `token` is a placeholder.
pub fn is_placeholder(token: &str) -> bool {
    PLACEHOLDER.is_match(token)
}

/// Program path plus flag template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub program: String,
    pub flags: String,
}

impl CommandTemplate {
    pub fn new(program: impl Into<String>, flags: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            flags: flags.into(),
        }
    }
}

/// Build an argument vector without any logging.
///
/// `program` is always element 0. Fails with
/// [`AutoconvertError::MissingPlaceholderBinding`] on the first placeholder
/// that has no entry in `values`.
pub fn build(program: &str, flags: &str, values: &ValueMap) -> Result<Vec<String>> {
    let mut argv = vec![program.to_string()];

    for token in flags.split_whitespace() {
        if !is_placeholder(token) {
            argv.push(token.to_string());
            continue;
        }

        match values.get(token) {
            Some(ArgValue::Single(value)) => argv.push(value.clone()),
            Some(ArgValue::List(items)) => argv.extend(items.iter().cloned()),
            None => {
                return Err(AutoconvertError::MissingPlaceholderBinding {
                    program: program.to_string(),
                    token: token.to_string(),
                });
            }
        }
    }

    Ok(argv)
}

/// Builds argument vectors and [`Job`]s, reporting at the configured
/// verbosity.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandBuilder {
    verbosity: Verbosity,
}

impl CommandBuilder {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// See [`build`].
    pub fn build(&self, program: &str, flags: &str, values: &ValueMap) -> Result<Vec<String>> {
        let argv = build(program, flags, values)?;

        if self.verbosity.is_debug() {
            info!(program, argv = ?argv, "built command");
        } else {
            debug!(program, argv = ?argv, "built command");
        }

        Ok(argv)
    }

    /// Resolve `template` against `values` into a ready-to-queue job.
    pub fn build_job(
        &self,
        template: &CommandTemplate,
        values: &ValueMap,
        working_dir: Option<PathBuf>,
        label: impl Into<String>,
    ) -> Result<Job> {
        let mut argv = self.build(&template.program, &template.flags, values)?.into_iter();
        // `build` always yields the program first.
        let program = argv.next().unwrap_or_else(|| template.program.clone());

        let mut job = Job::new(program).args(argv).label(label);
        if let Some(dir) = working_dir {
            job = job.in_dir(dir);
        }
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, ArgValue)]) -> ValueMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn list_values_are_spliced_in_order() {
        let map = values(&[
            ("{fmt}", "png".into()),
            ("{out}", "/tmp/o".into()),
            ("{files}", vec!["/a.sxm", "/b.sxm"].into()),
        ]);

        let argv = build("tool", "-f {fmt} -o {out} {files}", &map).unwrap();
        assert_eq!(
            argv,
            vec!["tool", "-f", "png", "-o", "/tmp/o", "/a.sxm", "/b.sxm"]
        );
    }

    #[test]
    fn empty_template_yields_program_only() {
        let argv = build("tool", "", &ValueMap::new()).unwrap();
        assert_eq!(argv, vec!["tool"]);
    }

    #[test]
    fn empty_list_contributes_no_arguments() {
        let map = values(&[("{files}", ArgValue::List(Vec::new()))]);
        let argv = build("tool", "-m {files} -s", &map).unwrap();
        assert_eq!(argv, vec!["tool", "-m", "-s"]);
    }

    #[test]
    fn values_with_spaces_stay_single_arguments() {
        let map = values(&[("{outdir}", "/data/my scans/out".into())]);
        let argv = build("tool", "-outdir {outdir}", &map).unwrap();
        assert_eq!(argv, vec!["tool", "-outdir", "/data/my scans/out"]);
    }

    #[test]
    fn missing_binding_names_the_token() {
        let map = values(&[("{path}", ".".into())]);
        let err = build("VernissageCmd", "-path {path} -outdir {outdir}", &map).unwrap_err();

        match err {
            AutoconvertError::MissingPlaceholderBinding { program, token } => {
                assert_eq!(program, "VernissageCmd");
                assert_eq!(token, "{outdir}");
            }
            other => panic!("expected MissingPlaceholderBinding, got {other:?}"),
        }
    }

    #[test]
    fn braces_inside_a_token_are_literal() {
        // Only whole tokens are placeholders.
        let argv = build("tool", "--filters{filterlist} \"{out}\"", &ValueMap::new()).unwrap();
        assert_eq!(argv, vec!["tool", "--filters{filterlist}", "\"{out}\""]);
    }

    #[test]
    fn build_job_keeps_working_dir_and_label() {
        let t = CommandTemplate::new("VernissageCmd", "-path {path}");
        let map = values(&[("{path}", ".".into())]);

        let job = CommandBuilder::default()
            .build_job(&t, &map, Some(PathBuf::from("/data/run1")), "flatten: run1")
            .unwrap();

        assert_eq!(job.program, "VernissageCmd");
        assert_eq!(job.args, vec!["-path", "."]);
        assert_eq!(job.working_dir.as_deref(), Some(Path::new("/data/run1")));
        assert_eq!(job.label, "flatten: run1");
    }
}
