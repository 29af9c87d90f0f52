//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::Result;
use floatsmith_core::recipes::script_file_lines;
use floatsmith_core::{
    AcquireSource, BatchPrompter, BuildSystem, DEFAULT_CLUSTER_TAG, Phase, Pipeline,
    PipelineOptions, PipelineReport, PipelineState, ProgressReporter, Prompter, SearchOptions,
    Strategy, VerifyMode, VerifyOptions, phase_statuses,
};
use floatsmith_shared::{
    AppConfig, FloatSmithError, PipelineLayout, init_config, load_config, load_config_from,
};
use tracing::info;

use crate::prompt::TerminalPrompter;
use crate::reports::{self, CompareArgs};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// FloatSmith: guided mixed-precision tuning for C/C++ programs.
#[derive(Parser)]
#[command(
    name = "floatsmith",
    version,
    about = "Find floating-point variables that can run in lower precision without breaking your program.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.floatsmith/floatsmith.toml.
    #[arg(long, global = true, env = "FLOATSMITH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Configure (or resume) the tuning pipeline and run it.
    Run(RunArgs),

    /// Show how far the pipeline under a root has progressed.
    Status {
        /// Pipeline root directory.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Merge configurations, dropping duplicate variables, sorted by uid.
    Merge {
        /// Configuration files.
        files: Vec<PathBuf>,
    },

    /// Keep only the variables carrying a label.
    ExtractLabel {
        /// Label to keep.
        label: String,
        /// Configuration files.
        files: Vec<PathBuf>,
    },

    /// Label histogram, per-label variables and linked label groups.
    LabelStats {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
        /// Configuration files.
        files: Vec<PathBuf>,
    },

    /// Summary of the casts each configuration introduces.
    CastStats {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
        /// Configuration files.
        files: Vec<PathBuf>,
    },

    /// List the variables each configuration changes.
    DumpVars {
        /// Configuration files.
        files: Vec<PathBuf>,
    },

    /// Count the variables (and new casts) per configuration.
    CountVars {
        /// Configuration files.
        files: Vec<PathBuf>,
    },

    /// Compare the floating-point numbers in two outputs.
    CompareFloats(CompareArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

/// Canned build systems.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum BuildArg {
    /// `make`
    Make,
    /// `./configure && make`
    ConfigureMake,
    /// `cmake .`
    Cmake,
}

/// Verification modes.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum VerifyArg {
    Exact,
    RegexPresent,
    RegexAbsent,
    Epsilon,
    Custom,
}

impl From<VerifyArg> for VerifyMode {
    fn from(arg: VerifyArg) -> Self {
        match arg {
            VerifyArg::Exact => Self::Exact,
            VerifyArg::RegexPresent => Self::RegexPresent,
            VerifyArg::RegexAbsent => Self::RegexAbsent,
            VerifyArg::Epsilon => Self::Epsilon,
            VerifyArg::Custom => Self::Custom,
        }
    }
}

/// Arguments of `run`. Anything not given is asked, or defaulted with `--batch`.
#[derive(Args, Debug)]
pub(crate) struct RunArgs {
    /// Never prompt; unset options take their defaults.
    #[arg(short = 'B', long)]
    batch: bool,

    /// Pipeline root directory (default from config: ./.floatsmith).
    #[arg(long)]
    root: Option<PathBuf>,

    // --- Acquire ---
    /// Acquire by recursive copy of a local folder.
    #[arg(long, value_name = "DIR", group = "acquire")]
    acquire_copy: Option<PathBuf>,
    /// Acquire by cloning a git repository.
    #[arg(long, value_name = "URL", group = "acquire")]
    acquire_git: Option<String>,
    /// Acquire with the commands in a script file.
    #[arg(long, value_name = "FILE", group = "acquire")]
    acquire_script: Option<PathBuf>,

    // --- Build ---
    /// Build system.
    #[arg(long, value_enum, conflicts_with = "build_script")]
    build: Option<BuildArg>,
    /// Build with the commands in a script file.
    #[arg(long, value_name = "FILE")]
    build_script: Option<PathBuf>,

    // --- Run ---
    /// Command that runs the program on representative input (repeatable).
    #[arg(long = "run", value_name = "CMD")]
    run_commands: Vec<String>,

    // --- Verify ---
    /// Verification mode.
    #[arg(long, value_enum)]
    verify: Option<VerifyArg>,
    /// Regex for the regex verification modes (implies regex-present).
    #[arg(long, value_name = "REGEX")]
    verify_regex: Option<String>,
    /// Custom verification script (implies custom).
    #[arg(long, value_name = "FILE")]
    verify_script: Option<PathBuf>,
    /// Epsilon for the epsilon verification mode (implies epsilon).
    #[arg(long)]
    epsilon: Option<f64>,
    /// Compare relative rather than absolute error against epsilon.
    #[arg(long)]
    relative: bool,

    // --- Review ---
    /// Unqualified variable names to leave out of the search (space- or comma-separated).
    #[arg(long, value_name = "NAMES")]
    ignore: Option<String>,

    // --- Instrumentation ---
    /// Run the instrumented sensitivity analysis before searching.
    #[arg(long, conflicts_with = "no_adapt")]
    adapt: bool,
    /// Skip the instrumented sensitivity analysis.
    #[arg(long)]
    no_adapt: bool,

    // --- Search ---
    /// Search strategy: compositional, ddebug, combinational, simple or comp_simple.
    #[arg(short, long)]
    strategy: Option<Strategy>,
    /// Trials per configuration.
    #[arg(short, long)]
    trials: Option<u32>,
    /// Per-trial timeout in seconds.
    #[arg(short = 'T', long = "timeout", value_name = "SECS")]
    timeout: Option<u64>,
    /// Configurations run simultaneously.
    #[arg(short = 'j', long)]
    workers: Option<u32>,
    /// Submit configuration runs through a job backend (e.g. slurm).
    #[arg(short = 'J', long, value_name = "BACKEND", conflicts_with = "workers")]
    job_backend: Option<String>,
    /// Cluster variables by labels starting with TAG.
    #[arg(
        short = 'g',
        long = "group-by-label",
        value_name = "TAG",
        num_args = 0..=1,
        default_missing_value = DEFAULT_CLUSTER_TAG,
    )]
    cluster: Option<String>,
    /// Merge label groups that share a variable.
    #[arg(short = 'M', long, requires = "cluster")]
    merge_groups: bool,
    /// Extra arguments passed verbatim to the search tool.
    #[arg(short = 'C', long, value_name = "ARGS", allow_hyphen_values = true)]
    craft_args: Option<String>,
    /// Erase existing search results and search again.
    #[arg(long, conflicts_with = "keep_search")]
    rerun_search: bool,
    /// Keep existing search results.
    #[arg(long)]
    keep_search: bool,
}

fn flag_pair(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn read_script(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).map_err(|e| FloatSmithError::io(path, e))?;
    Ok(script_file_lines(&text))
}

impl RunArgs {
    fn options(&self) -> Result<PipelineOptions> {
        let acquire = match (&self.acquire_copy, &self.acquire_git, &self.acquire_script) {
            (Some(dir), _, _) => Some(AcquireSource::CopyFrom(dir.clone())),
            (_, Some(url), _) => Some(AcquireSource::GitClone(url.clone())),
            (_, _, Some(file)) => Some(AcquireSource::Custom(read_script(file)?)),
            _ => None,
        };
        let build = match (self.build, &self.build_script) {
            (Some(BuildArg::Make), _) => Some(BuildSystem::Make),
            (Some(BuildArg::ConfigureMake), _) => Some(BuildSystem::ConfigureMake),
            (Some(BuildArg::Cmake), _) => Some(BuildSystem::CMake),
            (None, Some(file)) => Some(BuildSystem::Custom(read_script(file)?)),
            (None, None) => None,
        };
        let verify = VerifyOptions {
            mode: self.verify.map(VerifyMode::from),
            regex: self.verify_regex.clone(),
            script: self.verify_script.as_deref().map(read_script).transpose()?,
            epsilon: self.epsilon,
            relative: self.relative.then_some(true),
        };
        let search = SearchOptions {
            strategy: self.strategy,
            trials: self.trials,
            timeout_secs: self.timeout,
            job_backend: self.job_backend.clone(),
            workers: self.workers,
            cluster: self.cluster.clone(),
            merge_groups: self.merge_groups,
            passthrough: self.craft_args.clone(),
            rerun: flag_pair(self.rerun_search, self.keep_search),
        };

        Ok(PipelineOptions {
            acquire,
            build,
            run_commands: (!self.run_commands.is_empty()).then(|| self.run_commands.clone()),
            verify,
            ignore: self.ignore.as_deref().map(|names| {
                names
                    .split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|name| !name.is_empty())
                    .map(String::from)
                    .collect()
            }),
            adapt: flag_pair(self.adapt, self.no_adapt),
            search,
        })
    }
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "floatsmith=warn",
        1 => "floatsmith=info",
        2 => "floatsmith=debug",
        _ => "floatsmith=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

fn app_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

fn layout_for(config: &AppConfig, root: Option<&Path>) -> Result<PipelineLayout> {
    let root = root.unwrap_or_else(|| Path::new(&config.defaults.root_dir));
    Ok(PipelineLayout::new(root)?)
}

/// Pipeline root for `run`: the flag, else the answer, else the configured default.
fn run_root(config: &AppConfig, root: Option<&Path>, prompter: &dyn Prompter) -> Result<PathBuf> {
    match root {
        Some(root) => Ok(root.to_path_buf()),
        None => Ok(prompter.path(
            "Where should the pipeline keep its scripts and results?",
            Some(config.defaults.root_dir.as_str()),
            false,
        )?),
    }
}

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run(args) => cmd_run(&app_config(config_path)?, &args).await,
        Command::Status { root, json } => {
            cmd_status(&app_config(config_path)?, root.as_deref(), json)
        }
        Command::Merge { files } => reports::merge(&files),
        Command::ExtractLabel { label, files } => reports::extract_label(&label, &files),
        Command::LabelStats { json, files } => reports::label_stats(&files, json),
        Command::CastStats { json, files } => reports::cast_stats(&files, json),
        Command::DumpVars { files } => reports::dump_vars(&files),
        Command::CountVars { files } => reports::count_vars(&files),
        Command::CompareFloats(args) => reports::compare_floats(&args),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

// ---------------------------------------------------------------------------
// Pipeline commands
// ---------------------------------------------------------------------------

async fn cmd_run(config: &AppConfig, args: &RunArgs) -> Result<()> {
    let options = args.options()?;
    let terminal = TerminalPrompter::stdio();
    let prompter: &dyn Prompter = if args.batch { &BatchPrompter } else { &terminal };

    let root = run_root(config, args.root.as_deref(), prompter)?;
    let layout = PipelineLayout::new(root)?;
    info!(
        root = %layout.root().display(),
        batch = args.batch,
        "running pipeline"
    );
    let reporter = CliProgress;

    Pipeline::new(layout, config, options, prompter, &reporter)
        .run()
        .await?;
    Ok(())
}

fn cmd_status(config: &AppConfig, root: Option<&Path>, json: bool) -> Result<()> {
    let layout = layout_for(config, root)?;
    let state = PipelineState::probe(&layout);
    let phases = phase_statuses(&layout);

    if json {
        let status = serde_json::json!({
            "root": layout.root(),
            "state": state,
            "phases": phases,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("  Root:  {}", layout.root().display());
    println!("  State: {state}");
    for status in phases {
        let mark = if status.present { "x" } else { " " };
        println!(
            "  [{mark}] {:<10} {}",
            status.phase.name(),
            status.artifact.display()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Prints phase transitions between the echoed subprocess output.
struct CliProgress;

impl ProgressReporter for CliProgress {
    fn phase(&self, phase: Phase) {
        println!("== {phase} ==");
    }

    fn skipped(&self, phase: Phase) {
        println!("== {phase} (using existing results) ==");
    }

    fn created(&self, what: &str, path: &Path) {
        println!("{what} created: {}", path.display());
    }

    fn done(&self, report: &PipelineReport) {
        println!();
        println!("  Pipeline state: {}", report.state);
        if let Some(dir) = &report.final_dir {
            println!("  Recommended configuration: {}", dir.display());
        }
        if !report.warnings.is_empty() {
            println!("  Warnings:");
            for warning in &report.warnings {
                println!("    - {warning}");
            }
        }
        println!();
    }
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = app_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(argv: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(
            ["floatsmith", "run"].into_iter().chain(argv.iter().copied()),
        )
        .expect("parse");
        match cli.command {
            Command::Run(args) => args,
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn bare_run_leaves_everything_to_the_prompter() {
        let options = run_args(&[]).options().expect("options");
        assert_eq!(options, PipelineOptions::default());
    }

    #[test]
    fn batch_flags_map_to_options() {
        let args = run_args(&[
            "-B",
            "--acquire-git",
            "https://example.org/p.git",
            "--build",
            "cmake",
            "--run",
            "./a.out 10",
            "--run",
            "./a.out 20",
            "--verify-regex",
            "^ok",
            "--ignore",
            "err tmp,",
            "--no-adapt",
            "-s",
            "ddebug",
            "-t",
            "5",
            "-j",
            "8",
            "-g",
            "-M",
            "--keep-search",
        ]);
        assert!(args.batch);
        let options = args.options().expect("options");

        assert_eq!(
            options.acquire,
            Some(AcquireSource::GitClone("https://example.org/p.git".into()))
        );
        assert_eq!(options.build, Some(BuildSystem::CMake));
        assert_eq!(
            options.run_commands,
            Some(vec!["./a.out 10".to_string(), "./a.out 20".to_string()])
        );
        assert_eq!(options.verify.implied_mode(), Some(VerifyMode::RegexPresent));
        assert_eq!(options.ignore, Some(vec!["err".to_string(), "tmp".to_string()]));
        assert_eq!(options.adapt, Some(false));
        assert_eq!(options.search.strategy, Some(Strategy::Ddebug));
        assert_eq!(options.search.trials, Some(5));
        assert_eq!(options.search.workers, Some(8));
        assert_eq!(options.search.cluster.as_deref(), Some(DEFAULT_CLUSTER_TAG));
        assert!(options.search.merge_groups);
        assert_eq!(options.search.rerun, Some(false));
    }

    #[test]
    fn job_backend_excludes_workers() {
        let parsed = Cli::try_parse_from(["floatsmith", "run", "-J", "slurm", "-j", "4"]);
        assert!(parsed.is_err());

        let options = run_args(&["-J", "slurm"]).options().expect("options");
        assert_eq!(options.search.job_backend.as_deref(), Some("slurm"));
        assert_eq!(options.search.workers, None);
    }

    #[test]
    fn merge_groups_needs_clustering() {
        assert!(Cli::try_parse_from(["floatsmith", "run", "-M"]).is_err());
        let options = run_args(&["-g", "tc:", "-M"]).options().expect("options");
        assert_eq!(options.search.cluster.as_deref(), Some("tc:"));
    }

    #[test]
    fn script_flags_read_files_without_shebang() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("check.sh");
        std::fs::write(&script, "#!/bin/bash\ngrep -q done stdout && echo \"status:  pass\"\n")
            .expect("write");

        let options = run_args(&["--verify-script", script.to_str().expect("utf8")])
            .options()
            .expect("options");
        assert_eq!(options.verify.implied_mode(), Some(VerifyMode::Custom));
        assert_eq!(
            options.verify.script,
            Some(vec!["grep -q done stdout && echo \"status:  pass\"".to_string()])
        );
    }

    #[test]
    fn missing_script_file_is_an_io_error() {
        let err = run_args(&["--build-script", "/no/such/build.sh"])
            .options()
            .unwrap_err();
        let typed = err.downcast_ref::<FloatSmithError>().expect("typed error");
        assert!(matches!(typed, FloatSmithError::Io { .. }));
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        assert!(Cli::try_parse_from(["floatsmith", "run", "-s", "annealing"]).is_err());
    }

    #[test]
    fn run_root_prefers_flag_then_answer_then_default() {
        let config = AppConfig::default();

        let terminal = |input: &str| {
            TerminalPrompter::new(std::io::Cursor::new(input.as_bytes().to_vec()), Vec::new())
        };

        let silent = terminal("");
        let root = run_root(&config, Some(Path::new("/tmp/explicit")), &silent).expect("flag");
        assert_eq!(root, PathBuf::from("/tmp/explicit"));

        let answering = terminal("work/tune\n");
        assert_eq!(
            run_root(&config, None, &answering).expect("answer"),
            PathBuf::from("work/tune")
        );

        let accepting = terminal("\n");
        assert_eq!(
            run_root(&config, None, &accepting).expect("default"),
            PathBuf::from(&config.defaults.root_dir)
        );
        assert_eq!(
            run_root(&config, None, &BatchPrompter).expect("batch"),
            PathBuf::from(&config.defaults.root_dir)
        );
    }
}
