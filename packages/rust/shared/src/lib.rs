//! Shared error model, configuration, and pipeline layout for FloatSmith.
//!
//! This crate is the foundation depended on by all other FloatSmith crates.
//! It provides:
//! - [`FloatSmithError`]: the unified error type
//! - [`PipelineLayout`]: every root-relative path the pipeline reads or writes
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod layout;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, AutodiffConfig, DefaultsConfig, ToolsConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{FloatSmithError, Result};
pub use layout::{PhaseLog, PipelineLayout};
