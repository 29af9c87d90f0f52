//! Turning the search tool's result directory into a buildable tree.
//!
//! The search tool leaves its best configuration's rewritten sources in
//! `search/final` as `rose_<name>` files, alongside scratch files. Finalising
//! removes everything else, re-acquires the project there, and moves each
//! rewritten file over the original it replaces.

use std::path::Path;

use tracing::{debug, info};

use floatsmith_shared::{FloatSmithError, Result};

/// Prefix the rewriting tool puts on its output files.
pub const REWRITE_PREFIX: &str = "rose_";

/// A rewritten file and the name it replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub from: String,
    pub to: String,
}

/// Delete every entry of `dir` that is not a rewritten source.
///
/// Returns the rewrites to apply once the project has been re-acquired. An
/// entry named exactly like the prefix has no target and is deleted too.
pub fn prune_results(dir: &Path) -> Result<Vec<Rewrite>> {
    let mut rewrites = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| FloatSmithError::io(dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| FloatSmithError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let target = name
            .strip_prefix(REWRITE_PREFIX)
            .filter(|rest| !rest.is_empty())
            .map(str::to_string);

        match target {
            Some(to) => rewrites.push(Rewrite { from: name, to }),
            None => {
                let path = entry.path();
                let is_dir = entry
                    .file_type()
                    .map_err(|e| FloatSmithError::io(&path, e))?
                    .is_dir();
                let removed = if is_dir {
                    std::fs::remove_dir_all(&path)
                } else {
                    std::fs::remove_file(&path)
                };
                removed.map_err(|e| FloatSmithError::io(&path, e))?;
                debug!(path = %path.display(), "removed search scratch entry");
            }
        }
    }

    rewrites.sort_by(|a, b| a.from.cmp(&b.from));
    Ok(rewrites)
}

/// Move every rewritten file over its original, replacing it.
pub fn apply_rewrites(dir: &Path, rewrites: &[Rewrite]) -> Result<()> {
    for rewrite in rewrites {
        let from = dir.join(&rewrite.from);
        let to = dir.join(&rewrite.to);
        std::fs::rename(&from, &to).map_err(|e| FloatSmithError::io(&from, e))?;
    }
    info!(dir = %dir.display(), files = rewrites.len(), "applied rewritten sources");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_rewritten_sources() {
        let dir = tempfile::tempdir().expect("tempdir");
        let d = dir.path();
        std::fs::write(d.join("rose_sum2pi_x.cpp"), "float sum;").expect("write");
        std::fs::write(d.join("rose_main.cpp"), "int main;").expect("write");
        std::fs::write(d.join("rose_"), "").expect("write");
        std::fs::write(d.join("craft.log"), "").expect("write");
        std::fs::create_dir(d.join("run_3")).expect("mkdir");
        std::fs::write(d.join("run_3").join("stdout"), "").expect("write");

        let rewrites = prune_results(d).expect("prune");
        assert_eq!(
            rewrites,
            vec![
                Rewrite {
                    from: "rose_main.cpp".into(),
                    to: "main.cpp".into()
                },
                Rewrite {
                    from: "rose_sum2pi_x.cpp".into(),
                    to: "sum2pi_x.cpp".into()
                },
            ]
        );
        let mut left: Vec<String> = std::fs::read_dir(d)
            .expect("read_dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec!["rose_main.cpp", "rose_sum2pi_x.cpp"]);
    }

    #[test]
    fn rewrites_overwrite_reacquired_sources() {
        let dir = tempfile::tempdir().expect("tempdir");
        let d = dir.path();
        std::fs::write(d.join("rose_sum.cpp"), "float sum;").expect("write");
        let rewrites = prune_results(d).expect("prune");

        // re-acquisition brings the original back
        std::fs::write(d.join("sum.cpp"), "double sum;").expect("write");
        apply_rewrites(d, &rewrites).expect("apply");

        assert_eq!(
            std::fs::read_to_string(d.join("sum.cpp")).expect("read"),
            "float sum;"
        );
        assert!(!d.join("rose_sum.cpp").exists());
    }
}
