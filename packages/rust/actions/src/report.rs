//! Helpers behind the read-only report commands.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::schema::{Action, ActionConfig, ParseMode};

/// One changed variable, as listed by `dump-vars`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableEntry {
    pub name: String,
    pub scope: Option<String>,
    pub source_file: Option<String>,
}

impl fmt::Display for VariableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(scope) = &self.scope {
            write!(f, " {scope}")?;
        }
        if let Some(file) = &self.source_file {
            write!(f, " {file}")?;
        }
        Ok(())
    }
}

/// Every `change_var_basetype` action in `config`.
pub fn changed_variables(config: &ActionConfig) -> Vec<VariableEntry> {
    config
        .actions
        .iter()
        .filter(|action| matches!(action, Action::ChangeVarBasetype(_)))
        .map(|action| VariableEntry {
            name: action.name().unwrap_or_default().to_string(),
            scope: action.scope().map(String::from),
            source_file: action.source_file().map(String::from),
        })
        .collect()
}

/// Per-file summary printed by `count-vars`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChangeCount {
    pub variables: usize,
    pub new_casts: Option<i64>,
}

pub fn count_changes(config: &ActionConfig) -> ChangeCount {
    ChangeCount {
        variables: changed_variables(config).len(),
        new_casts: config.new_casts(),
    }
}

/// Load configurations for a report.
///
/// Paths that do not exist are skipped. Files that fail to parse are reported
/// and stand in as empty configurations, so one bad file never hides the rest.
pub fn load_for_report<P: AsRef<Path>>(paths: &[P]) -> Vec<(PathBuf, ActionConfig)> {
    let mut loaded = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "skipping missing file");
            continue;
        }
        let config = match ActionConfig::parse(path, ParseMode::Lenient) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "treating unreadable configuration as empty");
                ActionConfig::new(Vec::new())
            }
        };
        loaded.push((path.to_path_buf(), config));
    }
    loaded
}
