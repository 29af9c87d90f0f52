//! Read-only report commands over action configuration files.

use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::Result;
use floatsmith_actions::{
    ActionConfig, CastStatistics, LabelStatistics, changed_variables, count_changes,
    extract_by_label, load_for_report, merge_dedupe_sort,
};
use floatsmith_verify::{CompareOptions, ErrorKind, Mode, compare_files};

fn configs(files: &[PathBuf]) -> Vec<ActionConfig> {
    load_for_report(files)
        .into_iter()
        .map(|(_, config)| config)
        .collect()
}

pub(crate) fn merge(files: &[PathBuf]) -> Result<()> {
    let merged = merge_dedupe_sort(&configs(files));
    println!("{}", merged.to_pretty_json()?);
    Ok(())
}

pub(crate) fn extract_label(label: &str, files: &[PathBuf]) -> Result<()> {
    let extracted = extract_by_label(&configs(files), label);
    println!("{}", extracted.to_pretty_json()?);
    Ok(())
}

pub(crate) fn label_stats(files: &[PathBuf], json: bool) -> Result<()> {
    let stats = LabelStatistics::compute(&configs(files));
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Label counts:");
    for (size, actions) in &stats.label_set_sizes {
        println!("  {size} label(s): {actions} variable(s)");
    }
    println!("Labels:");
    for (label, ids) in &stats.per_label {
        println!("  {label}: {}", ids.join(" "));
    }
    println!("Groups:");
    for (id, ids) in stats.linked_groups() {
        println!("  {id}: {}", ids.join(" "));
    }
    Ok(())
}

pub(crate) fn cast_stats(files: &[PathBuf], json: bool) -> Result<()> {
    let stats = CastStatistics::compute(&configs(files))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("Configs: {}", stats.count);
    println!("Min:     {}", stats.min);
    println!("Max:     {}", stats.max);
    println!("Mean:    {:.2}", stats.mean);
    println!("Median:  {}", stats.median);
    println!("Stddev:  {:.2}", stats.stddev);
    Ok(())
}

pub(crate) fn dump_vars(files: &[PathBuf]) -> Result<()> {
    for config in configs(files) {
        for entry in changed_variables(&config) {
            println!("{entry}");
        }
    }
    Ok(())
}

pub(crate) fn count_vars(files: &[PathBuf]) -> Result<()> {
    for (path, config) in load_for_report(files) {
        let count = count_changes(&config);
        match count.new_casts {
            Some(casts) => println!("{} {casts} {}", count.variables, path.display()),
            None => println!("{} {}", count.variables, path.display()),
        }
    }
    Ok(())
}

/// Arguments of `compare-floats`.
#[derive(Args, Debug)]
pub(crate) struct CompareArgs {
    /// Report every pair (default).
    #[arg(long, group = "mode")]
    all: bool,
    /// Judge the smallest error.
    #[arg(long, group = "mode")]
    min: bool,
    /// Judge the largest error.
    #[arg(long, group = "mode")]
    max: bool,
    /// Judge the mean error.
    #[arg(long, group = "mode")]
    avg: bool,

    /// Relative error (|new - orig| / |orig|).
    #[arg(short, long, conflicts_with = "absolute")]
    relative: bool,
    /// Absolute error (default).
    #[arg(short, long)]
    absolute: bool,

    /// Print only the status line.
    #[arg(short, long)]
    quiet: bool,

    /// Errors above this value fail; also enables the status line.
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Reference output.
    original: PathBuf,
    /// Output to check.
    new: PathBuf,
}

impl CompareArgs {
    fn options(&self) -> CompareOptions {
        let mode = match (self.all, self.min, self.max, self.avg) {
            (_, true, _, _) => Mode::Min,
            (_, _, true, _) => Mode::Max,
            (_, _, _, true) => Mode::Avg,
            _ => Mode::All,
        };
        CompareOptions {
            mode,
            kind: if self.relative {
                ErrorKind::Relative
            } else {
                ErrorKind::Absolute
            },
            threshold: self.threshold,
            quiet: self.quiet,
        }
    }
}

pub(crate) fn compare_floats(args: &CompareArgs) -> Result<()> {
    let options = args.options();
    let comparison = compare_files(&args.original, &args.new, &options)?;
    for line in comparison.render(options.quiet) {
        println!("{line}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: CompareArgs,
    }

    fn parse(argv: &[&str]) -> std::result::Result<CompareArgs, clap::Error> {
        Harness::try_parse_from(std::iter::once("compare-floats").chain(argv.iter().copied()))
            .map(|h| h.args)
    }

    #[test]
    fn compare_flags_map_to_options() {
        let args = parse(&["--max", "-r", "-q", "-t", "1e-6", "a", "b"]).expect("parse");
        let options = args.options();
        assert_eq!(options.mode, Mode::Max);
        assert_eq!(options.kind, ErrorKind::Relative);
        assert_eq!(options.threshold, Some(1e-6));
        assert!(options.quiet);

        let options = parse(&["a", "b"]).expect("parse").options();
        assert_eq!(options.mode, Mode::All);
        assert_eq!(options.kind, ErrorKind::Absolute);
        assert_eq!(options.threshold, None);
    }

    #[test]
    fn compare_modes_are_exclusive() {
        assert!(parse(&["--min", "--avg", "a", "b"]).is_err());
        assert!(parse(&["-r", "-a", "a", "b"]).is_err());
    }
}
