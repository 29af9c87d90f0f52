//! Application configuration for FloatSmith.
//!
//! User config lives at `~/.floatsmith/floatsmith.toml`.
//! CLI flags override interactive answers, which override config file values,
//! which override built-in defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FloatSmithError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "floatsmith.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".floatsmith";

// ---------------------------------------------------------------------------
// Config structs (matching floatsmith.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Defaults offered when an option is neither flagged nor answered.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// External tool commands.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Instrumentation build settings.
    #[serde(default)]
    pub autodiff: AutodiffConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Pipeline root directory (relative paths resolve against the cwd).
    #[serde(default = "default_root_dir")]
    pub root_dir: String,

    /// Search strategy offered by default.
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Trials per configuration offered by default.
    #[serde(default = "default_trials")]
    pub trials: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            strategy: default_strategy(),
            trials: default_trials(),
        }
    }
}

fn default_root_dir() -> String {
    "./.floatsmith".into()
}
fn default_strategy() -> String {
    "compositional".into()
}
fn default_trials() -> u32 {
    10
}

/// `[tools]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Type-rewriting compiler plugin driver.
    #[serde(default = "default_typeforge")]
    pub typeforge: String,

    /// Combinatorial search tool.
    #[serde(default = "default_craft")]
    pub craft: String,

    /// Interpreter line written at the top of every generated script.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            typeforge: default_typeforge(),
            craft: default_craft(),
            interpreter: default_interpreter(),
        }
    }
}

fn default_typeforge() -> String {
    "typeforge".into()
}
fn default_craft() -> String {
    "craft".into()
}
fn default_interpreter() -> String {
    "#!/usr/bin/env bash".into()
}

/// `[autodiff]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutodiffConfig {
    /// Extra compiler flags for the instrumented build.
    #[serde(default = "default_autodiff_flags")]
    pub cxx_flags: Vec<String>,
}

impl Default for AutodiffConfig {
    fn default() -> Self {
        Self {
            cxx_flags: default_autodiff_flags(),
        }
    }
}

fn default_autodiff_flags() -> Vec<String> {
    [
        "-std=c++11",
        "-I${CODIPACK_HOME}/include",
        "-I${ADAPT_HOME}",
        "-DCODI_EnableImplicitConversion",
        "-DCODI_DisableImplicitConversionWarning",
        "-DCODI_ZeroAdjointReverse=0",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.floatsmith/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| FloatSmithError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.floatsmith/floatsmith.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FloatSmithError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| FloatSmithError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FloatSmithError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| FloatSmithError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FloatSmithError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
