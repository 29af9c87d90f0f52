//! Contents of the generated scripts and plugin recipes.
//!
//! Everything here is pure: given resolved choices and the layout, produce the
//! lines of a script or the action list of a recipe. Writing them is the
//! pipeline's job.

use std::path::Path;

use floatsmith_actions::{
    Action, ActionConfig, Include, Instrumentation, PragmaRewrite, TypeChange, VarChange,
};
use floatsmith_runner::{ScriptPart, shell_quote};
use floatsmith_shared::PipelineLayout;
use floatsmith_verify::VerifyStatus;

use crate::options::{AcquireSource, BuildSystem, VerifyMethod};

/// File every run script tees program output into.
pub const OUTPUT_FILE: &str = "stdout";

/// Recommendation file name written by the instrumented run.
const RECOMMENDATION_FILE: &str = "adapt_recommend.json";

/// Type that instrumentation replaces floating-point types with.
const AD_TYPE: &str = "AD_real";

fn path_arg(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

fn echo_status(status: VerifyStatus) -> String {
    format!("echo \"{}\"", status.line())
}

fn on_failure_error(command: &str) -> String {
    format!("{command} || ({} && exit)", echo_status(VerifyStatus::Error))
}

// ---------------------------------------------------------------------------
// Configuring phases
// ---------------------------------------------------------------------------

/// `source` must already be absolute for [`AcquireSource::CopyFrom`].
pub fn acquire_lines(source: &AcquireSource) -> Vec<String> {
    match source {
        AcquireSource::CopyFrom(dir) => vec![format!("cp -rL {}/* .", path_arg(dir))],
        AcquireSource::GitClone(url) => vec![format!("git clone {} .", shell_quote(url))],
        AcquireSource::Custom(lines) => lines.clone(),
    }
}

pub fn build_lines(build: &BuildSystem) -> Vec<String> {
    match build {
        BuildSystem::Make => vec![on_failure_error("make")],
        BuildSystem::ConfigureMake => vec![on_failure_error("(./configure && make)")],
        BuildSystem::CMake => vec![on_failure_error("cmake .")],
        BuildSystem::Custom(lines) => lines.clone(),
    }
}

/// Each command's output is appended to [`OUTPUT_FILE`], which starts empty.
pub fn run_lines(commands: &[String]) -> Vec<String> {
    std::iter::once(format!("rm -f {OUTPUT_FILE}"))
        .chain(
            commands
                .iter()
                .map(|cmd| format!("{cmd} | tee -a {OUTPUT_FILE}")),
        )
        .collect()
}

/// Verify script body. `compare_floats` is the command that runs the float
/// comparator (this program's `compare-floats` subcommand).
pub fn verify_lines(
    method: &VerifyMethod,
    layout: &PipelineLayout,
    compare_floats: &str,
) -> Vec<String> {
    let baseline_output = layout.baseline_dir().join(OUTPUT_FILE);
    match method {
        VerifyMethod::Exact => if_empty(
            &format!("outdiff=$(diff {OUTPUT_FILE} {})", path_arg(&baseline_output)),
            "outdiff",
            VerifyStatus::Pass,
            VerifyStatus::Fail,
        ),
        VerifyMethod::RegexPresent(regex) => if_empty(
            &format!("search=$(grep -E {} {OUTPUT_FILE})", shell_quote(regex)),
            "search",
            VerifyStatus::Fail,
            VerifyStatus::Pass,
        ),
        VerifyMethod::RegexAbsent(regex) => if_empty(
            &format!("search=$(grep -E {} {OUTPUT_FILE})", shell_quote(regex)),
            "search",
            VerifyStatus::Pass,
            VerifyStatus::Fail,
        ),
        VerifyMethod::Epsilon {
            threshold,
            relative,
        } => {
            let kind = if *relative { " --relative" } else { "" };
            vec![format!(
                "{compare_floats} -q{kind} --threshold {threshold} {} {OUTPUT_FILE}",
                path_arg(&baseline_output)
            )]
        }
        VerifyMethod::Custom(lines) => lines.clone(),
    }
}

fn if_empty(
    capture: &str,
    var: &str,
    empty: VerifyStatus,
    otherwise: VerifyStatus,
) -> Vec<String> {
    vec![
        capture.to_string(),
        format!("if [ -z \"${var}\" ]; then"),
        format!("    {}", echo_status(empty)),
        "else".to_string(),
        format!("    {}", echo_status(otherwise)),
        "fi".to_string(),
    ]
}

/// Script lines read from a file, without its interpreter line.
pub fn script_file_lines(text: &str) -> Vec<String> {
    text.lines()
        .enumerate()
        .filter(|(i, line)| !(*i == 0 && line.starts_with("#!")))
        .map(|(_, line)| line.to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Plugin recipe asking for every `double` that could become `float`.
pub fn discovery_config() -> ActionConfig {
    ActionConfig::new(vec![Action::ListChangesBasetype(VarChange {
        name: None,
        scope: Some(String::new()),
        from_type: "double".into(),
        to_type: "float".into(),
        uid: None,
        labels: None,
        source_info: None,
        handle: None,
        extra: Default::default(),
    })])
}

/// Build wrapper that runs the discovery plugin over the project.
pub fn discovery_run_lines(typeforge: &str, layout: &PipelineLayout) -> Vec<String> {
    let compiler = format!(
        "{typeforge} --plugin initial.json --typeforge-out {} --compile",
        path_arg(&layout.discovered_vars())
    );
    vec![
        format!("export CC=\"{compiler}\""),
        format!("export CXX=\"{compiler}\""),
        path_arg(&layout.build_script()),
    ]
}

// ---------------------------------------------------------------------------
// Instrumentation
// ---------------------------------------------------------------------------

/// Fixed plugin recipe that instruments the program for sensitivity analysis.
pub fn instrumentation_config() -> ActionConfig {
    let pragma = |from: &str, to: &str| {
        Action::ReplacePragma(PragmaRewrite {
            from_type: from.into(),
            to_type: to.into(),
            extra: Default::default(),
        })
    };
    let include = |name: &str, scope: &str| {
        Action::AddInclude(Include {
            name: name.into(),
            scope: Some(scope.into()),
            extra: Default::default(),
        })
    };
    let retype = |scope: &str, from: &str| {
        Action::ChangeEveryBasetype(TypeChange {
            scope: Some(scope.into()),
            from_type: from.into(),
            to_type: AD_TYPE.into(),
            extra: Default::default(),
        })
    };

    ActionConfig::new(vec![
        pragma("adapt output", "AD_dependent($2, \"$2\", $3);"),
        pragma("adapt begin", "AD_begin();"),
        pragma("adapt end", "AD_end(); AD_report();"),
        include("adapt.h", "*"),
        include("adapt-impl.cpp", "main"),
        Action::AdIntermediateInstrumentation(Instrumentation {
            scope: "*".into(),
            extra: Default::default(),
        }),
        retype("*:args,ret,body", "double"),
        retype("$global", "double"),
        retype("*:args,ret,body", "float"),
        retype("$global", "float"),
    ])
}

/// Instrumented build and run, then copy of the recommendation to the root.
pub fn instrumentation_run_lines(
    typeforge: &str,
    cxx_flags: &[String],
    layout: &PipelineLayout,
) -> Vec<String> {
    let mut compiler = format!("{typeforge} --plugin instrument.json --compile");
    for flag in cxx_flags {
        compiler.push(' ');
        compiler.push_str(flag);
    }
    vec![
        format!("export CXX=\"{compiler}\""),
        path_arg(&layout.build_script()),
        path_arg(&layout.run_script()),
        format!(
            "cp {RECOMMENDATION_FILE} {}",
            path_arg(&layout.recommendation())
        ),
    ]
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Acquire, build with the candidate recipe `$1`, then report cast counts.
pub fn search_builder_parts(typeforge: &str, layout: &PipelineLayout) -> Vec<ScriptPart> {
    let compiler = format!("{typeforge} --plugin $1 --compile");
    vec![
        ScriptPart::include(layout.acquire_script()),
        ScriptPart::line(format!("export CC=\"{compiler}\"")),
        ScriptPart::line(format!("export CXX=\"{compiler}\"")),
        ScriptPart::include(layout.build_script()),
        ScriptPart::line(format!("{typeforge} --cast-stats rose_*")),
    ]
}

/// Timed run followed by verification.
pub fn search_driver_parts(layout: &PipelineLayout) -> Vec<ScriptPart> {
    vec![
        ScriptPart::line("t_start=$(date +%s.%3N)"),
        ScriptPart::include(layout.run_script()),
        ScriptPart::line("t_stop=$(date +%s.%3N)"),
        ScriptPart::line("echo \"time:    $(echo \"$t_stop - $t_start\" | bc)\""),
        ScriptPart::include(layout.verify_script()),
    ]
}
