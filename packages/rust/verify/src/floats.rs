//! Tolerance-based comparison of floating-point output.
//!
//! Every decimal number (`1.25`, `-3.0e-7`) is pulled out of both outputs in
//! order of appearance, and the two sequences are compared pairwise. The
//! per-pair error is absolute (`|a - b|`) or relative (`|a - b| / |a|`), and is
//! either checked one by one or summarised as its minimum, maximum or average
//! before being held against the threshold. The threshold is exclusive: an
//! error equal to it passes.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use floatsmith_shared::{FloatSmithError, Result};

use crate::status::VerifyStatus;

static FLOAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[-+]?[0-9]+\.[0-9]+(?:[eE][-+]?[0-9]+)?").expect("valid regex")
});

/// How per-pair errors are judged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Every pair individually.
    #[default]
    All,
    Min,
    Max,
    Avg,
}

impl Mode {
    fn label(self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Min => "Min",
            Self::Max => "Max",
            Self::Avg => "Avg",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    #[default]
    Absolute,
    Relative,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompareOptions {
    pub mode: Mode,
    pub kind: ErrorKind,
    /// When set, the comparison yields a verify status.
    pub threshold: Option<f64>,
    /// Print only the status line.
    pub quiet: bool,
}

/// One compared pair, as printed in `All` mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Mismatch {
    pub original: f64,
    pub new: f64,
    pub error: f64,
}

/// Result of comparing two outputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub mode: Mode,
    /// Float counts `(original, new)` when they differ; nothing else is compared then.
    pub count_mismatch: Option<(usize, usize)>,
    /// Pairs worth reporting in `All` mode: every pair without a threshold,
    /// only the pairs above it otherwise.
    pub reported: Vec<Mismatch>,
    /// Summary error in `Min`, `Max` and `Avg` modes (absent when there was nothing to compare).
    pub aggregate: Option<f64>,
    /// Verdict, when a threshold was given.
    pub status: Option<VerifyStatus>,
}

impl Comparison {
    /// Lines to print, honouring quiet mode.
    pub fn render(&self, quiet: bool) -> Vec<String> {
        let mut lines = Vec::new();
        if self.count_mismatch.is_some() {
            lines.push(
                "The input files did not match, please check the format and try again."
                    .to_string(),
            );
        } else if !quiet {
            for m in &self.reported {
                lines.push(format!(
                    "orig: {:.7E}\tnew: {:.7E}\terror: {:.7E}",
                    m.original, m.new, m.error
                ));
            }
            if let Some(aggregate) = self.aggregate {
                lines.push(format!("{} error: {aggregate:.7E}", self.mode.label()));
            }
        }
        if let Some(status) = self.status {
            lines.push(status.line());
        }
        lines
    }
}

/// Every decimal number in `text`, in order.
pub fn extract_floats(text: &str) -> Vec<f64> {
    FLOAT_RE
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect()
}

/// Compare the numbers in `original` against those in `new`.
pub fn compare_text(original: &str, new: &str, options: &CompareOptions) -> Comparison {
    let orig = extract_floats(original);
    let comp = extract_floats(new);

    let mut result = Comparison {
        mode: options.mode,
        count_mismatch: None,
        reported: Vec::new(),
        aggregate: None,
        status: None,
    };

    if orig.len() != comp.len() {
        debug!(original = orig.len(), new = comp.len(), "float counts differ");
        result.count_mismatch = Some((orig.len(), comp.len()));
        result.status = options.threshold.map(|_| VerifyStatus::Error);
        return result;
    }

    let errors: Vec<f64> = orig
        .iter()
        .zip(&comp)
        .map(|(&a, &b)| pair_error(a, b, options.kind))
        .collect();
    let exceeds = |e: f64| options.threshold.is_some_and(|t| e > t);

    let passed = match options.mode {
        Mode::All => {
            for ((&a, &b), &error) in orig.iter().zip(&comp).zip(&errors) {
                if options.threshold.is_none() || exceeds(error) {
                    result.reported.push(Mismatch {
                        original: a,
                        new: b,
                        error,
                    });
                }
            }
            !errors.iter().any(|&e| exceeds(e))
        }
        Mode::Min | Mode::Max | Mode::Avg => {
            result.aggregate = aggregate(&errors, options.mode);
            !result.aggregate.is_some_and(exceeds)
        }
    };

    result.status = options.threshold.map(|_| {
        if passed {
            VerifyStatus::Pass
        } else {
            VerifyStatus::Fail
        }
    });
    result
}

/// Compare two output files.
pub fn compare_files(original: &Path, new: &Path, options: &CompareOptions) -> Result<Comparison> {
    let a = std::fs::read_to_string(original).map_err(|e| FloatSmithError::io(original, e))?;
    let b = std::fs::read_to_string(new).map_err(|e| FloatSmithError::io(new, e))?;
    Ok(compare_text(&a, &b, options))
}

fn pair_error(original: f64, new: f64, kind: ErrorKind) -> f64 {
    let diff = (original - new).abs();
    match kind {
        ErrorKind::Absolute => diff,
        ErrorKind::Relative if diff == 0.0 => 0.0,
        ErrorKind::Relative => diff / original.abs(),
    }
}

fn aggregate(errors: &[f64], mode: Mode) -> Option<f64> {
    if errors.is_empty() {
        return None;
    }
    let value = match mode {
        Mode::Min => errors.iter().copied().fold(f64::INFINITY, f64::min),
        Mode::Max => errors.iter().copied().fold(0.0, f64::max),
        Mode::Avg => errors.iter().sum::<f64>() / errors.len() as f64,
        Mode::All => return None,
    };
    Some(value)
}
