//! Script emitter.
//!
//! Every generated script starts with the configured interpreter line followed
//! by its commands verbatim. Content goes to a hidden sibling file first; the
//! permission bits are set once that handle is closed, and the finished file is
//! renamed into place, so nothing ever observes a half-written executable.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use floatsmith_shared::{FloatSmithError, Result};

/// One piece of a composed script.
#[derive(Debug, Clone)]
pub enum ScriptPart {
    /// A literal command line.
    Line(String),
    /// The body of another script on disk (its interpreter line is dropped).
    Include(PathBuf),
}

impl ScriptPart {
    pub fn line(text: impl Into<String>) -> Self {
        Self::Line(text.into())
    }

    pub fn include(path: impl Into<PathBuf>) -> Self {
        Self::Include(path.into())
    }
}

/// Writes owner-executable scripts with a fixed interpreter line.
#[derive(Debug, Clone)]
pub struct ScriptEmitter {
    interpreter: String,
}

impl ScriptEmitter {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    /// Write `lines` as an executable script at `path`.
    pub fn write<I, S>(&self, path: &Path, lines: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut content = self.header();
        for line in lines {
            content.push_str(line.as_ref());
            content.push('\n');
        }
        persist(path, &content)
    }

    /// Write a script built from literal lines and the bodies of other scripts.
    pub fn compose(&self, path: &Path, parts: &[ScriptPart]) -> Result<()> {
        let mut content = self.header();
        for part in parts {
            match part {
                ScriptPart::Line(line) => {
                    content.push_str(line);
                    content.push('\n');
                }
                ScriptPart::Include(source) => {
                    let text = std::fs::read_to_string(source)
                        .map_err(|e| FloatSmithError::io(source, e))?;
                    let body = strip_interpreter(&text);
                    content.push_str(body);
                    if !body.is_empty() && !body.ends_with('\n') {
                        content.push('\n');
                    }
                }
            }
        }
        persist(path, &content)
    }

    fn header(&self) -> String {
        format!("{}\n", self.interpreter)
    }
}

fn strip_interpreter(text: &str) -> &str {
    if text.starts_with("#!") {
        text.split_once('\n').map(|(_, rest)| rest).unwrap_or("")
    } else {
        text
    }
}

fn persist(path: &Path, content: &str) -> Result<()> {
    let staging = staging_path(path);
    if let Err(e) = stage_and_rename(&staging, path, content) {
        if staging.exists() {
            let _ = std::fs::remove_file(&staging);
        }
        return Err(e);
    }
    debug!(path = %path.display(), bytes = content.len(), "script written");
    Ok(())
}

fn stage_and_rename(staging: &Path, path: &Path, content: &str) -> Result<()> {
    {
        let mut file = File::create(staging).map_err(|e| FloatSmithError::io(staging, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| FloatSmithError::io(staging, e))?;
        file.sync_all().map_err(|e| FloatSmithError::io(staging, e))?;
    }
    make_executable(staging)?;
    std::fs::rename(staging, path).map_err(|e| FloatSmithError::io(path, e))
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.partial"))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| FloatSmithError::io(path, e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emitter() -> ScriptEmitter {
        ScriptEmitter::new("#!/usr/bin/env bash")
    }

    #[test]
    fn writes_interpreter_then_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("build.sh");
        emitter()
            .write(&path, ["make || (echo \"status:  error\" && exit)"])
            .expect("write");

        let text = std::fs::read_to_string(&path).expect("read");
        assert_eq!(
            text,
            "#!/usr/bin/env bash\nmake || (echo \"status:  error\" && exit)\n"
        );
        assert!(!dir.path().join(".build.sh.partial").exists());
    }

    #[cfg(unix)]
    #[test]
    fn scripts_are_owner_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.sh");
        emitter().write(&path, ["true"]).expect("write");

        let mode = std::fs::metadata(&path).expect("stat").permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn compose_inlines_other_scripts_without_their_shebang() {
        let dir = tempfile::tempdir().expect("tempdir");
        let acquire = dir.path().join("acquire.sh");
        let build = dir.path().join("build.sh");
        emitter().write(&acquire, ["cp -rL /src/* ."]).expect("acquire");
        emitter().write(&build, ["make"]).expect("build");

        let builder = dir.path().join("craft_builder");
        emitter()
            .compose(
                &builder,
                &[
                    ScriptPart::include(&acquire),
                    ScriptPart::line("export CXX=\"typeforge --plugin $1 --compile\""),
                    ScriptPart::include(&build),
                    ScriptPart::line("typeforge --cast-stats rose_*"),
                ],
            )
            .expect("compose");

        let text = std::fs::read_to_string(&builder).expect("read");
        assert_eq!(
            text,
            "#!/usr/bin/env bash\ncp -rL /src/* .\nexport CXX=\"typeforge --plugin $1 --compile\"\nmake\ntypeforge --cast-stats rose_*\n"
        );
        assert_eq!(text.matches("#!").count(), 1);
    }

    #[test]
    fn compose_fails_on_missing_include() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = emitter()
            .compose(
                &dir.path().join("out"),
                &[ScriptPart::include(dir.path().join("nope.sh"))],
            )
            .unwrap_err();
        assert!(matches!(err, FloatSmithError::Io { .. }));
    }

    #[test]
    fn failed_write_leaves_no_staging_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        // a non-empty directory in the way makes the final rename fail
        let path = dir.path().join("run.sh");
        std::fs::create_dir(&path).expect("mkdir");
        std::fs::write(path.join("keep"), "").expect("write");

        let err = emitter().write(&path, ["true"]).unwrap_err();
        assert!(matches!(err, FloatSmithError::Io { .. }));
        assert!(!dir.path().join(".run.sh.partial").exists());
        assert!(path.join("keep").exists());
    }
}
