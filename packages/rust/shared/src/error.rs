//! Error types for FloatSmith.
//!
//! Library crates use [`FloatSmithError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics and maps each
//! variant to a process exit code via [`FloatSmithError::exit_code`].

use std::path::PathBuf;

/// Top-level error type for all FloatSmith operations.
#[derive(Debug, thiserror::Error)]
pub enum FloatSmithError {
    /// Configuration loading or option resolution error.
    #[error("config error: {message}")]
    Config { message: String },

    /// An action configuration file is missing or is not valid JSON for the schema.
    #[error("cannot parse action configuration {path:?}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    /// The discovery phase found nothing to tune.
    #[error("no candidate variables were discovered in {path:?}")]
    NoCandidateVariables { path: PathBuf },

    /// Variance-based statistics need at least two samples.
    #[error("statistics need at least 2 samples, got {count}")]
    DegenerateStatistics { count: usize },

    /// An optional output that a phase was expected to produce is absent.
    #[error("expected artifact was not produced: {path:?}")]
    MissingArtifact { path: PathBuf },

    /// A child process exited unsuccessfully.
    #[error("`{command}` exited with {}", describe_code(*.code))]
    SubprocessNonZeroExit { command: String, code: Option<i32> },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad option value, inconsistent layout, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Reading an interactive answer failed.
    #[error("prompt error: {0}")]
    Prompt(String),
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FloatSmithError>;

impl FloatSmithError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error for an action configuration file.
    pub fn parse(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::ConfigParse {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code reported by the CLI when this error ends a run.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,
            Self::ConfigParse { .. } => 3,
            Self::NoCandidateVariables { .. } => 4,
            Self::DegenerateStatistics { .. } => 5,
            Self::MissingArtifact { .. } => 6,
            Self::SubprocessNonZeroExit { .. } => 7,
            Self::Io { .. } => 74,
            Self::Validation { .. } => 65,
            Self::Prompt(_) => 66,
        }
    }
}
