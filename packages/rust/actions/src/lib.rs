//! The action-list schema shared by every FloatSmith stage and report tool.
//!
//! - [`schema`]: typed [`Action`] / [`ActionConfig`] with strict and lenient parsing
//! - [`transform`]: filtering, merging, and label extraction (always producing new configs)
//! - [`stats`]: label clustering and cast statistics
//! - [`report`]: variable listings and multi-file loading for the report commands

pub mod report;
pub mod schema;
pub mod stats;
pub mod transform;

pub use report::{ChangeCount, VariableEntry, changed_variables, count_changes, load_for_report};
pub use schema::{
    Action, ActionConfig, CraftAttrs, Include, Instrumentation, ParseMode, PragmaRewrite,
    TOOL_ID, TypeChange, Uid, VarChange,
};
pub use stats::{CastStatistics, LabelStatistics};
pub use transform::{extract_by_label, filter_by_index, filter_by_name, merge_dedupe_sort};
