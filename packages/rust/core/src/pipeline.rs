//! The staged tuning pipeline: configure → sanity → discover → review →
//! instrument → search.
//!
//! Each phase is gated by its artifact (see [`Phase::artifact`]): a phase whose
//! artifact exists is skipped, so an interrupted run resumes where it stopped.
//! The search phase is the exception; existing results are only kept when the
//! re-run question is answered no.
//!
//! Subprocess failures do not stop the pipeline. They are collected as
//! warnings in the [`PipelineReport`]; the verify script's status line is what
//! judges a run.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use floatsmith_actions::{Action, ActionConfig, ParseMode, filter_by_index, filter_by_name};
use floatsmith_runner::{Invocation, RunOutcome, ScriptEmitter, shell_quote};
use floatsmith_shared::{AppConfig, FloatSmithError, PhaseLog, PipelineLayout, Result};
use floatsmith_verify::VerifyStatus;

use crate::finalize::{apply_rewrites, prune_results};
use crate::options::{
    AcquireSource, BuildSystem, PipelineOptions, Prompter, VerifyMethod, VerifyMode, resolve,
};
use crate::phase::{Phase, PipelineState};
use crate::recipes;
use crate::search::{Clustering, DEFAULT_CLUSTER_TAG, ExecutionMode, SearchInvocation, Strategy};

/// Outcome of a pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    /// State probed after the run.
    pub state: PipelineState,
    /// Problems that did not stop the run.
    pub warnings: Vec<FloatSmithError>,
    /// Finalised result tree, when the search produced one.
    pub final_dir: Option<PathBuf>,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a phase starts doing work.
    fn phase(&self, phase: Phase);
    /// Called when a phase is skipped because its artifact exists or it was declined.
    fn skipped(&self, phase: Phase);
    /// Called after a script or other artifact has been written.
    fn created(&self, what: &str, path: &Path);
    /// Called when the pipeline completes.
    fn done(&self, report: &PipelineReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _phase: Phase) {}
    fn skipped(&self, _phase: Phase) {}
    fn created(&self, _what: &str, _path: &Path) {}
    fn done(&self, _report: &PipelineReport) {}
}

/// One pipeline run over a root directory.
pub struct Pipeline<'a> {
    layout: PipelineLayout,
    config: &'a AppConfig,
    options: PipelineOptions,
    prompter: &'a dyn Prompter,
    progress: &'a dyn ProgressReporter,
    emitter: ScriptEmitter,
    compare_floats: String,
    warnings: Vec<FloatSmithError>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        layout: PipelineLayout,
        config: &'a AppConfig,
        options: PipelineOptions,
        prompter: &'a dyn Prompter,
        progress: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            layout,
            emitter: ScriptEmitter::new(&config.tools.interpreter),
            config,
            options,
            prompter,
            progress,
            compare_floats: default_compare_floats(),
            warnings: Vec::new(),
        }
    }

    /// Command the epsilon verify script uses to compare outputs.
    pub fn with_compare_floats(mut self, command: impl Into<String>) -> Self {
        self.compare_floats = command.into();
        self
    }

    /// Run every phase that has not completed yet.
    #[instrument(skip_all, fields(root = %self.layout.root().display()))]
    pub async fn run(mut self) -> Result<PipelineReport> {
        self.layout.ensure_root()?;
        let resumed = PipelineState::probe(&self.layout);
        info!(state = %resumed, "starting pipeline");

        // --- Configuration ---
        self.configure_acquire()?;
        self.configure_build()?;
        self.configure_run()?;
        self.configure_verify().await?;
        self.sanity_check().await?;

        // --- Variables ---
        self.discover().await?;
        let discovered = self.check_candidates()?;
        self.review(&discovered)?;

        // --- Tuning ---
        self.instrument().await?;
        let final_dir = self.search().await?;

        let report = PipelineReport {
            state: PipelineState::probe(&self.layout),
            warnings: self.warnings,
            final_dir,
        };
        info!(state = %report.state, warnings = report.warnings.len(), "pipeline complete");
        self.progress.done(&report);
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Report whether `phase` still has work to do.
    fn should_run(&self, phase: Phase) -> bool {
        if phase.is_complete(&self.layout) {
            debug!(%phase, "artifact present, skipping");
            self.progress.skipped(phase);
            false
        } else {
            self.progress.phase(phase);
            true
        }
    }

    fn write_script(&self, path: &Path, lines: &[String], what: &str) -> Result<()> {
        self.emitter.write(path, lines)?;
        info!(path = %path.display(), "{what} created");
        self.progress.created(what, path);
        Ok(())
    }

    async fn exec(&mut self, invocation: Invocation) -> Result<RunOutcome> {
        let outcome = invocation.run().await?;
        if let Some(failure) = outcome.failure() {
            self.warnings.push(failure);
        }
        Ok(outcome)
    }

    /// Run acquire, build and run in `dir`, starting from an empty directory.
    async fn fresh_run(&mut self, dir: &Path, echo: bool) -> Result<()> {
        recreate_dir(dir)?;
        for script in [
            self.layout.acquire_script(),
            self.layout.build_script(),
            self.layout.run_script(),
        ] {
            self.exec(Invocation::script(&script, dir).echo_stdout(echo))
                .await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Configuring phases
    // -----------------------------------------------------------------------

    fn configure_acquire(&mut self) -> Result<()> {
        if !self.should_run(Phase::Acquire) {
            return Ok(());
        }
        let source = resolve(self.options.acquire.clone(), || self.ask_acquire())?;
        let source = match source {
            AcquireSource::CopyFrom(dir) => AcquireSource::CopyFrom(
                std::path::absolute(&dir).map_err(|e| FloatSmithError::io(&dir, e))?,
            ),
            other => other,
        };
        let lines = recipes::acquire_lines(&source);
        self.write_script(&self.layout.acquire_script(), &lines, "Acquisition script")
    }

    fn ask_acquire(&self) -> Result<AcquireSource> {
        let choice = self.prompter.choose(
            "How would you like to acquire a copy of your code?",
            &["Recursive copy from a local folder", "Clone a git repository"],
            0,
        )?;
        if choice == 0 {
            let path = self
                .prompter
                .path("Enter project root path:", Some("."), true)?;
            Ok(AcquireSource::CopyFrom(path))
        } else {
            let url = self.prompter.line("Enter repository URL:", None)?;
            Ok(AcquireSource::GitClone(url))
        }
    }

    fn configure_build(&mut self) -> Result<()> {
        if !self.should_run(Phase::Build) {
            return Ok(());
        }
        let build = resolve(self.options.build.clone(), || self.ask_build())?;
        let lines = recipes::build_lines(&build);
        self.write_script(&self.layout.build_script(), &lines, "Build script")
    }

    fn ask_build(&self) -> Result<BuildSystem> {
        let choice = self.prompter.choose(
            "How is your project built? (your build system must use CC/CXX)",
            &["\"make\"", "\"./configure && make\"", "\"cmake .\"", "Custom script"],
            0,
        )?;
        Ok(match choice {
            0 => BuildSystem::Make,
            1 => BuildSystem::ConfigureMake,
            2 => BuildSystem::CMake,
            _ => BuildSystem::Custom(self.prompter.lines(
                "Enter Bash code to build your program. Print \"status:  error\" if the \
                 build fails. Enter an empty line to finish.",
            )?),
        })
    }

    fn configure_run(&mut self) -> Result<()> {
        if !self.should_run(Phase::Run) {
            return Ok(());
        }
        let commands = resolve(self.options.run_commands.clone(), || {
            self.prompter.lines(
                "Enter command(s) to run your program with representative input. \
                 Enter an empty line to finish.",
            )
        })?;
        if commands.is_empty() {
            return Err(FloatSmithError::config("no command given to run the program"));
        }
        let lines = recipes::run_lines(&commands);
        self.write_script(&self.layout.run_script(), &lines, "Run script")
    }

    async fn configure_verify(&mut self) -> Result<()> {
        if !self.should_run(Phase::Verify) {
            return Ok(());
        }
        let mode = resolve(self.options.verify.implied_mode(), || self.ask_verify_mode())?;
        let method = self.verify_method(mode)?;

        if mode.needs_baseline() {
            self.prompter
                .say("Running original program to generate verification output.");
            let dir = self.layout.baseline_dir();
            self.fresh_run(&dir, false).await?;
        }

        let lines = recipes::verify_lines(&method, &self.layout, &self.compare_floats);
        self.write_script(&self.layout.verify_script(), &lines, "Verify script")
    }

    fn ask_verify_mode(&self) -> Result<VerifyMode> {
        let labels: Vec<&str> = VerifyMode::ALL.iter().map(|m| m.description()).collect();
        let choice = self
            .prompter
            .choose("How should the output be verified?", &labels, 0)?;
        VerifyMode::ALL
            .get(choice)
            .copied()
            .ok_or_else(|| FloatSmithError::Prompt(format!("no verification option {choice}")))
    }

    fn verify_method(&self, mode: VerifyMode) -> Result<VerifyMethod> {
        let verify = &self.options.verify;
        let regex = || resolve(verify.regex.clone(), || self.prompter.line("Enter regex:", None));
        Ok(match mode {
            VerifyMode::Exact => VerifyMethod::Exact,
            VerifyMode::RegexPresent => VerifyMethod::RegexPresent(regex()?),
            VerifyMode::RegexAbsent => VerifyMethod::RegexAbsent(regex()?),
            VerifyMode::Epsilon => {
                let threshold = resolve(verify.epsilon, || {
                    let text = self.prompter.line("Enter Epsilon:", None)?;
                    text.trim().parse::<f64>().map_err(|_| {
                        FloatSmithError::validation(format!("'{text}' is not a number"))
                    })
                })?;
                if !threshold.is_finite() || threshold < 0.0 {
                    return Err(FloatSmithError::validation(format!(
                        "epsilon must be a non-negative number, got {threshold}"
                    )));
                }
                let relative = resolve(verify.relative, || {
                    let choice = self.prompter.choose(
                        "Which error should be compared against epsilon?",
                        &["Absolute error", "Relative error"],
                        0,
                    )?;
                    Ok(choice == 1)
                })?;
                VerifyMethod::Epsilon {
                    threshold,
                    relative,
                }
            }
            VerifyMode::Custom => VerifyMethod::Custom(resolve(verify.script.clone(), || {
                self.prompter.lines(
                    "Enter Bash code to verify your program output (standard output will \
                     be in a file called stdout; empty line to finish):",
                )
            })?),
        })
    }

    // -----------------------------------------------------------------------
    // Sanity check
    // -----------------------------------------------------------------------

    async fn sanity_check(&mut self) -> Result<()> {
        if !self.should_run(Phase::Sanity) {
            return Ok(());
        }
        self.prompter.say("Running sanity check on generated scripts.");
        let dir = self.layout.sanity_dir();
        self.fresh_run(&dir, true).await?;

        let verify = Invocation::script(&self.layout.verify_script(), &dir).capture_stdout();
        let verdict = self.exec(verify).await?;
        match VerifyStatus::find(&verdict.stdout) {
            Some(VerifyStatus::Pass) => info!("sanity check passed"),
            other => {
                let status = other.map_or("no status line", VerifyStatus::as_str);
                warn!(status, "sanity check verification did not pass");
                self.warnings.push(FloatSmithError::validation(format!(
                    "sanity check verification reported: {status}"
                )));
            }
        }

        let marker = self.layout.sanity_marker();
        std::fs::write(&marker, "").map_err(|e| FloatSmithError::io(&marker, e))
    }

    // -----------------------------------------------------------------------
    // Variables
    // -----------------------------------------------------------------------

    async fn discover(&mut self) -> Result<()> {
        if !self.should_run(Phase::Discovery) {
            return Ok(());
        }
        self.prompter.say("Finding variables to be tuned.");
        let dir = self.layout.initial_dir();
        recreate_dir(&dir)?;
        recipes::discovery_config().save(&self.layout.discovery_recipe())?;
        self.exec(Invocation::script(&self.layout.acquire_script(), &dir))
            .await?;

        let script = self.layout.discovery_script();
        let lines = recipes::discovery_run_lines(&self.config.tools.typeforge, &self.layout);
        self.write_script(&script, &lines, "Discovery script")?;
        let log = self.layout.phase_log(PhaseLog::Discovery);
        self.exec(Invocation::script(&script, &dir).echo_stderr(true).log_to(log))
            .await?;

        let vars = self.layout.discovered_vars();
        if vars.exists() {
            self.progress.created("Variables discovered", &vars);
        }
        Ok(())
    }

    /// The discovered configuration; fatal when it has nothing to tune.
    fn check_candidates(&self) -> Result<ActionConfig> {
        let path = self.layout.discovered_vars();
        let discovered = ActionConfig::parse(&path, ParseMode::Strict)?;
        if discovered.actions.is_empty() {
            warn!(path = %path.display(), "no candidate variables, aborting");
            return Err(FloatSmithError::NoCandidateVariables { path });
        }
        info!(count = discovered.actions.len(), "candidate variables");
        Ok(discovered)
    }

    fn review(&mut self, discovered: &ActionConfig) -> Result<()> {
        if !self.should_run(Phase::Review) {
            return Ok(());
        }
        let reviewed = match &self.options.ignore {
            Some(names) => filter_by_name(discovered, names),
            None => {
                self.prompter.say(
                    "Some variables may not be appropriate candidates for tuning (e.g., if \
                     they are used for calculating error). You may wish to remove them from \
                     the list.",
                );
                if self
                    .prompter
                    .confirm("Do you wish to review/edit the list of variables?", false)?
                {
                    for (i, action) in discovered.actions.iter().enumerate() {
                        self.prompter.say(&review_line(i, action));
                    }
                    let answer = self.prompter.line(
                        "Enter ID numbers for any variables you wish to remove, separate by spaces:",
                        Some(""),
                    )?;
                    filter_by_index(discovered, &parse_indices(&answer))
                } else {
                    discovered.clone()
                }
            }
        };

        let removed = discovered.actions.len() - reviewed.actions.len();
        if removed > 0 {
            self.prompter.say(&format!("Ignoring {removed} variables."));
        }
        let path = self.layout.initial_config();
        reviewed.save(&path)?;
        info!(kept = reviewed.actions.len(), removed, "initial configuration created");
        self.progress.created("Initial configuration", &path);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Instrumentation
    // -----------------------------------------------------------------------

    async fn instrument(&mut self) -> Result<()> {
        if Phase::Instrument.is_complete(&self.layout) {
            self.progress.skipped(Phase::Instrument);
            return Ok(());
        }
        let wanted = resolve(self.options.adapt, || {
            self.prompter.say(
                "If you wish, now we can run your program with ADAPT instrumentation. This \
                 will most likely cause the search to converge faster, but your program must \
                 be compilable using '-std=c++11' and you must have included all of the \
                 appropriate pragmas.",
            );
            self.prompter.confirm("Do you wish to run ADAPT?", false)
        })?;
        if !wanted {
            debug!("instrumentation declined");
            self.progress.skipped(Phase::Instrument);
            return Ok(());
        }

        self.progress.phase(Phase::Instrument);
        let dir = self.layout.autodiff_dir();
        std::fs::create_dir_all(&dir).map_err(|e| FloatSmithError::io(&dir, e))?;
        recipes::instrumentation_config().save(&self.layout.instrument_recipe())?;
        self.exec(Invocation::script(&self.layout.acquire_script(), &dir))
            .await?;

        let script = self.layout.instrument_script();
        let lines = recipes::instrumentation_run_lines(
            &self.config.tools.typeforge,
            &self.config.autodiff.cxx_flags,
            &self.layout,
        );
        self.write_script(&script, &lines, "Instrumentation script")?;
        let log = self.layout.phase_log(PhaseLog::Instrumentation);
        self.exec(Invocation::script(&script, &dir).echo_stderr(true).log_to(log))
            .await?;

        let recommendation = self.layout.recommendation();
        if recommendation.exists() {
            self.progress
                .created("Instrumentation results", &recommendation);
        } else {
            warn!(path = %recommendation.display(), "instrumentation produced no recommendation");
            self.warnings.push(FloatSmithError::MissingArtifact {
                path: recommendation,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    async fn search(&mut self) -> Result<Option<PathBuf>> {
        let dir = self.layout.search_dir();
        let rerun = if dir.exists() {
            resolve(self.options.search.rerun, || {
                self.prompter.confirm(
                    "There are existing (possibly incomplete) search results. Do you wish to \
                     erase them and run again?",
                    true,
                )
            })?
        } else {
            true
        };
        let final_dir = self.layout.final_dir();
        if !rerun {
            self.progress.skipped(Phase::Search);
            return Ok(final_dir.is_dir().then_some(final_dir));
        }

        self.progress.phase(Phase::Search);
        let invocation = self.search_invocation()?;
        recreate_dir(&dir)?;

        let builder = self.layout.search_builder();
        self.emitter.compose(
            &builder,
            &recipes::search_builder_parts(&self.config.tools.typeforge, &self.layout),
        )?;
        self.progress.created("Search build script", &builder);
        let driver = self.layout.search_driver();
        self.emitter
            .compose(&driver, &recipes::search_driver_parts(&self.layout))?;
        self.progress.created("Search driver script", &driver);

        let script = self.layout.search_script();
        self.write_script(&script, &[invocation.command()], "Search script")?;
        let log = self.layout.phase_log(PhaseLog::Search);
        self.exec(Invocation::script(&script, &dir).echo_stderr(true).log_to(log))
            .await?;

        if !final_dir.is_dir() {
            info!("search produced no final configuration");
            return Ok(None);
        }
        let rewrites = prune_results(&final_dir)?;
        self.exec(Invocation::script(&self.layout.acquire_script(), &final_dir))
            .await?;
        apply_rewrites(&final_dir, &rewrites)?;
        self.progress.created("Recommended configuration", &final_dir);
        Ok(Some(final_dir))
    }

    fn search_invocation(&self) -> Result<SearchInvocation> {
        let opts = &self.options.search;
        let defaults = &self.config.defaults;

        let strategy = resolve(opts.strategy, || {
            let default: Strategy = defaults.strategy.parse()?;
            let labels: Vec<&str> = Strategy::ALL.iter().map(|s| s.description()).collect();
            let default_index = Strategy::ALL
                .iter()
                .position(|s| *s == default)
                .unwrap_or(0);
            let choice = self.prompter.choose(
                "Which strategy do you wish to use for the search?",
                &labels,
                default_index,
            )?;
            Strategy::ALL
                .get(choice)
                .copied()
                .ok_or_else(|| FloatSmithError::Prompt(format!("no strategy option {choice}")))
        })?;
        let trials = resolve(opts.trials, || {
            let n = self.prompter.integer(
                "How many trials of each configuration do you want to run?",
                Some(i64::from(defaults.trials)),
            )?;
            Ok(u32::try_from(n).unwrap_or(0))
        })?;
        let execution = self.execution_mode()?;
        let tag = match &opts.cluster {
            Some(tag) => Some(tag.clone()),
            None => self
                .prompter
                .confirm(
                    "Do you wish to use typechain clustering to test fewer configurations?",
                    false,
                )?
                .then(|| DEFAULT_CLUSTER_TAG.to_string()),
        };

        let invocation = SearchInvocation {
            trials: Some(trials),
            timeout_secs: opts.timeout_secs,
            execution,
            clustering: tag.map(|tag| Clustering {
                tag,
                merge_overlapping: opts.merge_groups,
            }),
            passthrough: opts.passthrough.clone(),
            ..SearchInvocation::new(
                &self.config.tools.craft,
                self.layout.initial_config(),
                strategy,
            )
        };
        Ok(invocation.recommendation_if_present(&self.layout.recommendation()))
    }

    fn execution_mode(&self) -> Result<ExecutionMode> {
        let opts = &self.options.search;
        if let Some(backend) = &opts.job_backend {
            if opts.workers.is_some() {
                warn!("worker count ignored with job submission");
            }
            return Ok(ExecutionMode::JobSubmission {
                backend: backend.clone(),
            });
        }
        if let Some(workers) = opts.workers {
            return Ok(ExecutionMode::Local {
                workers: Some(workers),
            });
        }
        if self.prompter.confirm(
            "Do you wish to submit configuration runs using 'sbatch'?",
            false,
        )? {
            return Ok(ExecutionMode::JobSubmission {
                backend: "slurm".into(),
            });
        }
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get() as i64)
            .unwrap_or(1);
        let workers = self.prompter.integer(
            "How many configurations should be run simultaneously?",
            Some(cpus),
        )?;
        Ok(ExecutionMode::Local {
            workers: u32::try_from(workers).ok().filter(|&n| n > 1),
        })
    }
}

/// `  3) ::main::sum (main) [sum2pi_x.cpp:14]`
fn review_line(index: usize, action: &Action) -> String {
    format!(
        "  {index}) {} ({}) [{}]",
        action.identifier(),
        action.scope().unwrap_or_default(),
        action.source_file().unwrap_or_default()
    )
}

/// Space-separated positions; anything that is not a position is ignored.
fn parse_indices(answer: &str) -> BTreeSet<usize> {
    answer
        .split_whitespace()
        .filter_map(|token| match token.parse::<usize>() {
            Ok(index) => Some(index),
            Err(_) => {
                warn!(token, "ignoring invalid variable number");
                None
            }
        })
        .collect()
}

fn recreate_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(|e| FloatSmithError::io(dir, e))?;
    }
    std::fs::create_dir_all(dir).map_err(|e| FloatSmithError::io(dir, e))
}

fn default_compare_floats() -> String {
    let exe = std::env::current_exe()
        .map(|path| shell_quote(&path.to_string_lossy()))
        .unwrap_or_else(|_| "floatsmith".to_string());
    format!("{exe} compare-floats")
}
