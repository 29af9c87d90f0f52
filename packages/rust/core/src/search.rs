//! Command line for the narrowing search tool.
//!
//! [`SearchInvocation`] holds fully resolved search parameters and renders
//! them as one shell command. It enforces a single rule: local workers and job
//! submission are mutually exclusive, which the [`ExecutionMode`] enum makes
//! unrepresentable. Every other combination is passed through for the search
//! tool to judge.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use floatsmith_runner::shell_quote;
use floatsmith_shared::FloatSmithError;

/// Label tag offered when clustering is enabled interactively.
pub const DEFAULT_CLUSTER_TAG: &str = "typechain:cluster";

/// Search strategy understood by the search tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Compositional,
    Ddebug,
    Combinational,
    Simple,
    CompSimple,
}

impl Strategy {
    /// Menu order.
    pub const ALL: [Strategy; 5] = [
        Self::Compositional,
        Self::Ddebug,
        Self::Combinational,
        Self::Simple,
        Self::CompSimple,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compositional => "compositional",
            Self::Ddebug => "ddebug",
            Self::Combinational => "combinational",
            Self::Simple => "simple",
            Self::CompSimple => "comp_simple",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Compositional => {
                "Compositional - try individuals then try to compose passing configurations"
            }
            Self::Ddebug => "Delta debugging - binary search on the list of variables",
            Self::Combinational => "Combinational - try all combinations (very expensive!)",
            Self::Simple => {
                "Hierarchical - breadth-first search on program structure to find passing configurations"
            }
            Self::CompSimple => "Hierarchical + Compositional",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = FloatSmithError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|s| s.as_str()).collect();
                FloatSmithError::validation(format!(
                    "unknown search strategy '{s}' (expected one of: {})",
                    known.join(", ")
                ))
            })
    }
}

/// Where the search tool runs its trial configurations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// On this machine; `None` leaves the worker count to the search tool.
    Local { workers: Option<u32> },
    /// As jobs submitted through a batch backend (e.g. `slurm`).
    JobSubmission { backend: String },
}

/// Label clustering of variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clustering {
    /// Only labels starting with this tag form groups.
    pub tag: String,
    /// Merge groups that share a variable.
    pub merge_overlapping: bool,
}

/// Resolved parameters of one search run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchInvocation {
    pub program: String,
    pub initial_config: PathBuf,
    pub recommendation: Option<PathBuf>,
    pub strategy: Strategy,
    pub trials: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub execution: ExecutionMode,
    pub clustering: Option<Clustering>,
    /// Appended verbatim.
    pub passthrough: Option<String>,
}

impl SearchInvocation {
    /// A local, single-trial search over `initial_config`.
    pub fn new(
        program: impl Into<String>,
        initial_config: impl Into<PathBuf>,
        strategy: Strategy,
    ) -> Self {
        Self {
            program: program.into(),
            initial_config: initial_config.into(),
            recommendation: None,
            strategy,
            trials: None,
            timeout_secs: None,
            execution: ExecutionMode::Local { workers: None },
            clustering: None,
            passthrough: None,
        }
    }

    /// Use `path` as the instrumentation recommendation if that file exists.
    pub fn recommendation_if_present(mut self, path: &Path) -> Self {
        self.recommendation = path.is_file().then(|| path.to_path_buf());
        self
    }

    /// The full command line.
    pub fn command(&self) -> String {
        let mut args: Vec<String> = vec![
            self.program.clone(),
            "search".into(),
            "-V".into(),
            "-c".into(),
            quote_path(&self.initial_config),
        ];
        if let Some(rec) = &self.recommendation {
            args.extend(["-A".into(), quote_path(rec)]);
        }
        args.extend(["-s".into(), self.strategy.as_str().into()]);
        if let Some(trials) = self.trials.filter(|&t| t > 1) {
            args.extend(["-t".into(), trials.to_string()]);
        }
        if let Some(secs) = self.timeout_secs {
            args.extend(["-T".into(), secs.to_string()]);
        }
        match &self.execution {
            ExecutionMode::Local { workers: Some(n) } => {
                args.extend(["-j".into(), n.to_string()]);
            }
            ExecutionMode::Local { workers: None } => {}
            ExecutionMode::JobSubmission { backend } => {
                args.extend(["-J".into(), shell_quote(backend)]);
            }
        }
        if let Some(cluster) = &self.clustering {
            args.extend(["-g".into(), shell_quote(&cluster.tag)]);
            if cluster.merge_overlapping {
                args.push("-M".into());
            }
        }
        if let Some(extra) = self.passthrough.as_deref().filter(|s| !s.trim().is_empty()) {
            args.push(extra.to_string());
        }
        args.join(" ")
    }
}

fn quote_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> SearchInvocation {
        SearchInvocation::new("craft", "/r/craft_initial.json", Strategy::Compositional)
    }

    #[test]
    fn minimal_command() {
        assert_eq!(
            base().command(),
            "craft search -V -c /r/craft_initial.json -s compositional"
        );
    }

    #[test]
    fn full_local_command_in_order() {
        let inv = SearchInvocation {
            recommendation: Some("/r/adapt_recommend.json".into()),
            strategy: Strategy::CompSimple,
            trials: Some(10),
            timeout_secs: Some(60),
            execution: ExecutionMode::Local { workers: Some(8) },
            clustering: Some(Clustering {
                tag: DEFAULT_CLUSTER_TAG.into(),
                merge_overlapping: true,
            }),
            passthrough: Some("--extra 1".into()),
            ..base()
        };
        assert_eq!(
            inv.command(),
            "craft search -V -c /r/craft_initial.json -A /r/adapt_recommend.json \
             -s comp_simple -t 10 -T 60 -j 8 -g typechain:cluster -M --extra 1"
        );
    }

    #[test]
    fn single_trial_is_not_emitted() {
        let inv = SearchInvocation {
            trials: Some(1),
            ..base()
        };
        assert!(!inv.command().contains(" -t "));
    }

    #[test]
    fn job_submission_never_carries_a_worker_count() {
        let inv = SearchInvocation {
            execution: ExecutionMode::JobSubmission {
                backend: "slurm".into(),
            },
            ..base()
        };
        let cmd = inv.command();
        assert!(cmd.contains("-J slurm"));
        assert!(!cmd.contains("-j"));
    }

    #[test]
    fn merge_flag_only_with_clustering() {
        let inv = SearchInvocation {
            clustering: Some(Clustering {
                tag: "typechain:cluster".into(),
                merge_overlapping: false,
            }),
            ..base()
        };
        assert!(inv.command().ends_with("-g typechain:cluster"));
    }

    #[test]
    fn recommendation_only_when_file_exists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rec = dir.path().join("adapt_recommend.json");

        let inv = base().recommendation_if_present(&rec);
        assert!(inv.recommendation.is_none());

        std::fs::write(&rec, "{}").expect("write");
        let inv = base().recommendation_if_present(&rec);
        assert_eq!(inv.recommendation.as_deref(), Some(rec.as_path()));
    }

    #[test]
    fn strategy_names_round_trip() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.as_str().parse::<Strategy>().expect("parse"), strategy);
        }
        assert!("greedy".parse::<Strategy>().is_err());
    }
}
