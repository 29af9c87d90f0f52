//! Pipeline options and how unset ones are obtained.
//!
//! Every option the pipeline needs is carried as an `Option` in
//! [`PipelineOptions`]; `Some` means it was given explicitly and always wins.
//! Options left unset are asked of a [`Prompter`]. The interactive prompter
//! asks the user; [`BatchPrompter`] answers every question with its default
//! and fails on questions that have none.

use std::path::PathBuf;

use floatsmith_shared::{FloatSmithError, Result};

use crate::search::Strategy;

// ---------------------------------------------------------------------------
// Resolved choices
// ---------------------------------------------------------------------------

/// How a fresh copy of the project is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireSource {
    /// Recursive copy from a local folder.
    CopyFrom(PathBuf),
    /// `git clone` of a repository URL.
    GitClone(String),
    /// Literal script lines.
    Custom(Vec<String>),
}

/// How the project is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildSystem {
    Make,
    ConfigureMake,
    CMake,
    Custom(Vec<String>),
}

/// Which verification recipe to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    /// `stdout` must equal the baseline run's.
    Exact,
    /// `stdout` must contain a line matching a regex.
    RegexPresent,
    /// `stdout` must contain no line matching a regex.
    RegexAbsent,
    /// Every float in `stdout` must be within epsilon of the baseline run's.
    Epsilon,
    /// User-supplied script.
    Custom,
}

impl VerifyMode {
    /// Menu order.
    pub const ALL: [VerifyMode; 5] = [
        Self::Exact,
        Self::RegexPresent,
        Self::RegexAbsent,
        Self::Epsilon,
        Self::Custom,
    ];

    pub fn description(self) -> &'static str {
        match self {
            Self::Exact => "Exact match with original (stdout)",
            Self::RegexPresent => "Contains a line matching a regex (stdout)",
            Self::RegexAbsent => "Contains no lines matching a regex (stdout)",
            Self::Epsilon => "Ensure all floats in output are within an Epsilon (stdout)",
            Self::Custom => "Custom script",
        }
    }

    /// Whether this mode compares against a reference run.
    pub fn needs_baseline(self) -> bool {
        matches!(self, Self::Exact | Self::Epsilon)
    }
}

/// A fully resolved verification recipe.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyMethod {
    Exact,
    RegexPresent(String),
    RegexAbsent(String),
    Epsilon { threshold: f64, relative: bool },
    Custom(Vec<String>),
}

// ---------------------------------------------------------------------------
// Explicit options
// ---------------------------------------------------------------------------

/// Verification options given up front.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerifyOptions {
    pub mode: Option<VerifyMode>,
    pub regex: Option<String>,
    /// Lines of a custom verify script.
    pub script: Option<Vec<String>>,
    pub epsilon: Option<f64>,
    pub relative: Option<bool>,
}

impl VerifyOptions {
    /// The mode implied by the given options, if any.
    ///
    /// A regex alone selects [`VerifyMode::RegexPresent`]; a script alone
    /// selects [`VerifyMode::Custom`]; an epsilon alone selects
    /// [`VerifyMode::Epsilon`].
    pub fn implied_mode(&self) -> Option<VerifyMode> {
        self.mode.or_else(|| {
            if self.regex.is_some() {
                Some(VerifyMode::RegexPresent)
            } else if self.script.is_some() {
                Some(VerifyMode::Custom)
            } else if self.epsilon.is_some() {
                Some(VerifyMode::Epsilon)
            } else {
                None
            }
        })
    }
}

/// Search options given up front.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub strategy: Option<Strategy>,
    pub trials: Option<u32>,
    pub timeout_secs: Option<u64>,
    /// Job submission backend; excludes `workers`.
    pub job_backend: Option<String>,
    pub workers: Option<u32>,
    /// Label tag to cluster variables by.
    pub cluster: Option<String>,
    pub merge_groups: bool,
    pub passthrough: Option<String>,
    /// Whether existing search results are erased and the search re-run.
    pub rerun: Option<bool>,
}

/// Everything the pipeline may be told before it starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineOptions {
    pub acquire: Option<AcquireSource>,
    pub build: Option<BuildSystem>,
    pub run_commands: Option<Vec<String>>,
    pub verify: VerifyOptions,
    /// Unqualified variable names to drop during review.
    pub ignore: Option<Vec<String>>,
    /// Run the instrumentation phase.
    pub adapt: Option<bool>,
    pub search: SearchOptions,
}

// ---------------------------------------------------------------------------
// Prompting
// ---------------------------------------------------------------------------

/// Source of answers for options that were not given explicitly.
pub trait Prompter {
    /// Show informational text.
    fn say(&self, text: &str);

    /// Pick one of `options`; returns its index.
    fn choose(&self, question: &str, options: &[&str], default: usize) -> Result<usize>;

    fn confirm(&self, question: &str, default: bool) -> Result<bool>;

    fn integer(&self, question: &str, default: Option<i64>) -> Result<i64>;

    /// One line of text.
    fn line(&self, question: &str, default: Option<&str>) -> Result<String>;

    /// Lines of text up to an empty line.
    fn lines(&self, question: &str) -> Result<Vec<String>>;

    /// A path; with `must_exist` the answer must name an existing directory.
    fn path(&self, question: &str, default: Option<&str>, must_exist: bool) -> Result<PathBuf>;
}

/// Non-interactive prompter: every question gets its default.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchPrompter;

impl BatchPrompter {
    fn no_default(question: &str) -> FloatSmithError {
        FloatSmithError::config(format!(
            "no default for \"{}\" in batch mode; pass it as a flag",
            question.trim_end_matches([':', '?', ' '])
        ))
    }
}

impl Prompter for BatchPrompter {
    fn say(&self, text: &str) {
        tracing::debug!(text, "batch mode message");
    }

    fn choose(&self, _question: &str, options: &[&str], default: usize) -> Result<usize> {
        if default < options.len() {
            Ok(default)
        } else {
            Err(FloatSmithError::validation(format!(
                "default option {default} out of range"
            )))
        }
    }

    fn confirm(&self, _question: &str, default: bool) -> Result<bool> {
        Ok(default)
    }

    fn integer(&self, question: &str, default: Option<i64>) -> Result<i64> {
        default.ok_or_else(|| Self::no_default(question))
    }

    fn line(&self, question: &str, default: Option<&str>) -> Result<String> {
        default
            .map(String::from)
            .ok_or_else(|| Self::no_default(question))
    }

    fn lines(&self, question: &str) -> Result<Vec<String>> {
        Err(Self::no_default(question))
    }

    fn path(&self, question: &str, default: Option<&str>, must_exist: bool) -> Result<PathBuf> {
        let path = PathBuf::from(default.ok_or_else(|| Self::no_default(question))?);
        if must_exist && !path.is_dir() {
            return Err(FloatSmithError::config(format!(
                "{} does not exist (or is a regular file)",
                path.display()
            )));
        }
        Ok(path)
    }
}

/// The explicit value if given, otherwise whatever `ask` obtains.
pub(crate) fn resolve<T>(explicit: Option<T>, ask: impl FnOnce() -> Result<T>) -> Result<T> {
    match explicit {
        Some(value) => Ok(value),
        None => ask(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_value_wins_without_asking() {
        let value =
            resolve(Some(3), || -> Result<i32> { panic!("must not ask") }).expect("resolve");
        assert_eq!(value, 3);
    }

    #[test]
    fn batch_answers_with_defaults() {
        let batch = BatchPrompter;
        assert_eq!(batch.choose("Build?", &["a", "b", "c"], 2).expect("choose"), 2);
        assert!(batch.confirm("Run ADAPT?", true).expect("confirm"));
        assert_eq!(batch.integer("Trials?", Some(10)).expect("integer"), 10);
        assert_eq!(batch.line("Root?", Some("./x")).expect("line"), "./x");
    }

    #[test]
    fn batch_fails_without_default() {
        let batch = BatchPrompter;
        let err = batch.lines("Enter command(s) to run your program:").unwrap_err();
        assert!(matches!(err, FloatSmithError::Config { .. }));
        assert!(err.to_string().contains("Enter command(s) to run your program"));
        assert!(batch.line("Enter regex:", None).is_err());
    }

    #[test]
    fn implied_verify_mode() {
        let opts = VerifyOptions {
            regex: Some("^ok".into()),
            ..VerifyOptions::default()
        };
        assert_eq!(opts.implied_mode(), Some(VerifyMode::RegexPresent));

        let opts = VerifyOptions {
            script: Some(vec!["echo \"status:  pass\"".into()]),
            ..VerifyOptions::default()
        };
        assert_eq!(opts.implied_mode(), Some(VerifyMode::Custom));

        let opts = VerifyOptions {
            mode: Some(VerifyMode::RegexAbsent),
            regex: Some("nan".into()),
            ..VerifyOptions::default()
        };
        assert_eq!(opts.implied_mode(), Some(VerifyMode::RegexAbsent));
        assert_eq!(VerifyOptions::default().implied_mode(), None);
    }
}
