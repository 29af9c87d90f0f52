//! Pipeline phases and the state recovered from disk.
//!
//! The artifacts a phase leaves behind are the only record that it ran.
//! [`PipelineState::probe`] inspects them once and names the furthest point a
//! previous run reached, so a run can resume from there.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use floatsmith_actions::{ActionConfig, ParseMode};
use floatsmith_shared::PipelineLayout;

/// One step of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Acquire,
    Build,
    Run,
    Verify,
    Sanity,
    Discovery,
    Review,
    Instrument,
    Search,
}

impl Phase {
    pub const ALL: [Phase; 9] = [
        Self::Acquire,
        Self::Build,
        Self::Run,
        Self::Verify,
        Self::Sanity,
        Self::Discovery,
        Self::Review,
        Self::Instrument,
        Self::Search,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Acquire => "acquire",
            Self::Build => "build",
            Self::Run => "run",
            Self::Verify => "verify",
            Self::Sanity => "sanity",
            Self::Discovery => "discovery",
            Self::Review => "review",
            Self::Instrument => "instrument",
            Self::Search => "search",
        }
    }

    /// The file or directory whose presence means this phase completed.
    pub fn artifact(self, layout: &PipelineLayout) -> PathBuf {
        match self {
            Self::Acquire => layout.acquire_script(),
            Self::Build => layout.build_script(),
            Self::Run => layout.run_script(),
            Self::Verify => layout.verify_script(),
            Self::Sanity => layout.sanity_marker(),
            Self::Discovery => layout.discovered_vars(),
            Self::Review => layout.initial_config(),
            Self::Instrument => layout.autodiff_dir(),
            Self::Search => layout.search_dir(),
        }
    }

    pub fn is_complete(self, layout: &PipelineLayout) -> bool {
        self.artifact(layout).exists()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How far the pipeline under a root has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Unconfigured,
    AcquireReady,
    BuildReady,
    RunReady,
    VerifyReady,
    SanityPassed,
    VariablesDiscovered,
    VariablesReviewed,
    InstrumentSkipped,
    Instrumented,
    SearchComplete,
    Done,
    /// Discovery produced no candidate variables; the pipeline cannot continue.
    AbortedNoVariables,
}

impl PipelineState {
    /// Recompute the state from the artifacts under `layout`.
    pub fn probe(layout: &PipelineLayout) -> Self {
        use Phase::*;

        let gates = [
            (Acquire, Self::AcquireReady),
            (Build, Self::BuildReady),
            (Run, Self::RunReady),
            (Verify, Self::VerifyReady),
            (Sanity, Self::SanityPassed),
        ];
        let mut state = Self::Unconfigured;
        for (phase, reached) in gates {
            if !phase.is_complete(layout) {
                return state;
            }
            state = reached;
        }

        if !Discovery.is_complete(layout) {
            return state;
        }
        let has_candidates = ActionConfig::parse(&layout.discovered_vars(), ParseMode::Strict)
            .is_ok_and(|cfg| !cfg.actions.is_empty());
        if !has_candidates {
            return Self::AbortedNoVariables;
        }
        if !Review.is_complete(layout) {
            return Self::VariablesDiscovered;
        }

        let instrumented = Instrument.is_complete(layout);
        if !Search.is_complete(layout) {
            return if instrumented {
                Self::Instrumented
            } else {
                Self::VariablesReviewed
            };
        }
        if layout.final_dir().is_dir() {
            Self::Done
        } else if layout.search_script().exists() {
            Self::SearchComplete
        } else if instrumented {
            Self::Instrumented
        } else {
            Self::InstrumentSkipped
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::AcquireReady => "acquire ready",
            Self::BuildReady => "build ready",
            Self::RunReady => "run ready",
            Self::VerifyReady => "verify ready",
            Self::SanityPassed => "sanity passed",
            Self::VariablesDiscovered => "variables discovered",
            Self::VariablesReviewed => "variables reviewed",
            Self::InstrumentSkipped => "instrumentation skipped",
            Self::Instrumented => "instrumented",
            Self::SearchComplete => "search complete",
            Self::Done => "done",
            Self::AbortedNoVariables => "aborted: no variables",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Presence of one phase's artifact, as shown by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseStatus {
    pub phase: Phase,
    pub artifact: PathBuf,
    pub present: bool,
}

/// Artifact presence for every phase.
pub fn phase_statuses(layout: &PipelineLayout) -> Vec<PhaseStatus> {
    Phase::ALL
        .into_iter()
        .map(|phase| {
            let artifact = phase.artifact(layout);
            let present = artifact.exists();
            PhaseStatus {
                phase,
                artifact,
                present,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: &str = r#"{ "version": "1", "tool_id": "TypeForge", "actions": [
        { "action": "change_var_basetype", "name": "x", "scope": "main",
          "from_type": "double", "to_type": "float", "uid": 1 } ] }"#;

    fn touch(path: PathBuf) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(path, "").expect("touch");
    }

    fn configured(dir: &std::path::Path) -> PipelineLayout {
        let layout = PipelineLayout::new(dir).expect("layout");
        for script in [
            layout.acquire_script(),
            layout.build_script(),
            layout.run_script(),
            layout.verify_script(),
        ] {
            touch(script);
        }
        layout
    }

    #[test]
    fn empty_root_is_unconfigured() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = PipelineLayout::new(dir.path()).expect("layout");
        assert_eq!(PipelineState::probe(&layout), PipelineState::Unconfigured);
    }

    #[test]
    fn gaps_stop_the_probe() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = PipelineLayout::new(dir.path()).expect("layout");
        touch(layout.acquire_script());
        touch(layout.run_script());
        assert_eq!(PipelineState::probe(&layout), PipelineState::AcquireReady);
    }

    #[test]
    fn progresses_through_discovery_and_review() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = configured(dir.path());
        assert_eq!(PipelineState::probe(&layout), PipelineState::VerifyReady);

        touch(layout.sanity_marker());
        assert_eq!(PipelineState::probe(&layout), PipelineState::SanityPassed);

        std::fs::write(layout.discovered_vars(), VARS).expect("write");
        assert_eq!(PipelineState::probe(&layout), PipelineState::VariablesDiscovered);

        std::fs::write(layout.initial_config(), VARS).expect("write");
        assert_eq!(PipelineState::probe(&layout), PipelineState::VariablesReviewed);

        std::fs::create_dir(layout.autodiff_dir()).expect("mkdir");
        assert_eq!(PipelineState::probe(&layout), PipelineState::Instrumented);

        touch(layout.search_script());
        assert_eq!(PipelineState::probe(&layout), PipelineState::SearchComplete);

        std::fs::create_dir(layout.final_dir()).expect("mkdir");
        assert_eq!(PipelineState::probe(&layout), PipelineState::Done);
    }

    #[test]
    fn empty_discovery_is_terminal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = configured(dir.path());
        touch(layout.sanity_marker());
        std::fs::write(layout.discovered_vars(), r#"{ "version": "1", "actions": [] }"#)
            .expect("write");
        assert_eq!(PipelineState::probe(&layout), PipelineState::AbortedNoVariables);
    }

    #[test]
    fn statuses_cover_every_phase() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = configured(dir.path());
        let statuses = phase_statuses(&layout);
        assert_eq!(statuses.len(), Phase::ALL.len());
        assert!(statuses[..4].iter().all(|s| s.present));
        assert!(statuses[4..].iter().all(|s| !s.present));
    }
}
