//! Pipeline orchestration for FloatSmith.
//!
//! This crate ties the generated scripts, the plugin recipes and the search
//! tool together into the resumable tuning workflow driven by
//! [`Pipeline::run`].

pub mod finalize;
pub mod options;
pub mod phase;
pub mod pipeline;
pub mod recipes;
pub mod search;

pub use options::{
    AcquireSource, BatchPrompter, BuildSystem, PipelineOptions, Prompter, SearchOptions,
    VerifyMethod, VerifyMode, VerifyOptions,
};
pub use phase::{Phase, PhaseStatus, PipelineState, phase_statuses};
pub use pipeline::{Pipeline, PipelineReport, ProgressReporter, SilentProgress};
pub use search::{Clustering, DEFAULT_CLUSTER_TAG, ExecutionMode, SearchInvocation, Strategy};
