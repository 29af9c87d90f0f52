//! The verify-status line.
//!
//! A verify script reports its verdict by printing exactly one line of the
//! form `status:  pass`, `status:  fail` or `status:  error` (two spaces after
//! the colon). Build scripts reuse the `error` form when compilation fails.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use floatsmith_shared::FloatSmithError;

/// Prefix of every status line.
pub const STATUS_PREFIX: &str = "status:  ";

static STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^status:  (pass|fail|error)\r?$").expect("valid regex")
});

/// Verdict printed by a verify script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyStatus {
    Pass,
    Fail,
    Error,
}

impl VerifyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Error => "error",
        }
    }

    /// The full line a script prints for this verdict.
    pub fn line(self) -> String {
        format!("{STATUS_PREFIX}{}", self.as_str())
    }

    /// First status line found in `output`, if any.
    pub fn find(output: &str) -> Option<Self> {
        STATUS_RE
            .captures(output)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

impl fmt::Display for VerifyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerifyStatus {
    type Err = FloatSmithError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(Self::Pass),
            "fail" => Ok(Self::Fail),
            "error" => Ok(Self::Error),
            other => Err(FloatSmithError::validation(format!(
                "unknown verify status '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_status_among_other_output() {
        let out = "time:    0.25\nresult = 3.14159\nstatus:  pass\n";
        assert_eq!(VerifyStatus::find(out), Some(VerifyStatus::Pass));
        assert_eq!(VerifyStatus::find("status:  error"), Some(VerifyStatus::Error));
    }

    #[test]
    fn spacing_must_be_exact() {
        assert_eq!(VerifyStatus::find("status: pass"), None);
        assert_eq!(VerifyStatus::find("status:  passed"), None);
        assert_eq!(VerifyStatus::find("  status:  fail"), None);
        assert_eq!(VerifyStatus::find(""), None);
    }

    #[test]
    fn line_round_trips_through_find() {
        for status in [VerifyStatus::Pass, VerifyStatus::Fail, VerifyStatus::Error] {
            assert_eq!(VerifyStatus::find(&status.line()), Some(status));
        }
    }

    #[test]
    fn tolerates_crlf() {
        assert_eq!(VerifyStatus::find("status:  fail\r\n"), Some(VerifyStatus::Fail));
    }
}
