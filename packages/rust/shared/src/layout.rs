//! Filesystem layout of a pipeline root.
//!
//! Every artifact the pipeline reads or writes is a fixed path below one root
//! directory. [`PipelineLayout`] derives them all once and is then passed by
//! reference to whatever needs a path.

use std::path::{Path, PathBuf};

use crate::error::{FloatSmithError, Result};

/// Marker written once the end-to-end sanity run has finished.
pub const SANITY_MARKER: &str = ".FS_DONE";

/// Phase log files (`phase1.log`..`phase3.log`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseLog {
    /// Variable discovery build.
    Discovery,
    /// Autodiff instrumentation build and run.
    Instrumentation,
    /// Narrowing search.
    Search,
}

impl PhaseLog {
    fn file_name(self) -> &'static str {
        match self {
            Self::Discovery => "phase1.log",
            Self::Instrumentation => "phase2.log",
            Self::Search => "phase3.log",
        }
    }
}

/// All root-relative paths used by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineLayout {
    root: PathBuf,
}

impl PipelineLayout {
    /// Build a layout for `root`, made absolute against the current directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            let cwd = std::env::current_dir().map_err(|e| FloatSmithError::io(".", e))?;
            cwd.join(root)
        };
        Ok(Self { root })
    }

    /// Create the root directory if needed.
    ///
    /// Fails when the root path exists as a regular file.
    pub fn ensure_root(&self) -> Result<()> {
        if self.root.exists() && !self.root.is_dir() {
            return Err(FloatSmithError::validation(format!(
                "{} already exists as a regular file",
                self.root.display()
            )));
        }
        std::fs::create_dir_all(&self.root).map_err(|e| FloatSmithError::io(&self.root, e))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// End-to-end sanity run directory.
    pub fn sanity_dir(&self) -> PathBuf {
        self.root.join("sanity")
    }

    pub fn sanity_marker(&self) -> PathBuf {
        self.sanity_dir().join(SANITY_MARKER)
    }

    /// Reference run used by the exact-match and epsilon verifiers.
    pub fn baseline_dir(&self) -> PathBuf {
        self.root.join("baseline")
    }

    /// Discovery build directory.
    pub fn initial_dir(&self) -> PathBuf {
        self.root.join("initial")
    }

    pub fn search_dir(&self) -> PathBuf {
        self.root.join("search")
    }

    /// Result tree produced by the search tool.
    pub fn final_dir(&self) -> PathBuf {
        self.search_dir().join("final")
    }

    pub fn autodiff_dir(&self) -> PathBuf {
        self.root.join("autodiff")
    }

    /// Discovered variables (`typeforge_vars.json`).
    pub fn discovered_vars(&self) -> PathBuf {
        self.root.join("typeforge_vars.json")
    }

    /// Reviewed search input (`craft_initial.json`).
    pub fn initial_config(&self) -> PathBuf {
        self.root.join("craft_initial.json")
    }

    /// Instrumentation recommendation (`adapt_recommend.json`).
    pub fn recommendation(&self) -> PathBuf {
        self.root.join("adapt_recommend.json")
    }

    pub fn acquire_script(&self) -> PathBuf {
        self.root.join("acquire.sh")
    }

    pub fn build_script(&self) -> PathBuf {
        self.root.join("build.sh")
    }

    pub fn run_script(&self) -> PathBuf {
        self.root.join("run.sh")
    }

    pub fn verify_script(&self) -> PathBuf {
        self.root.join("verify.sh")
    }

    /// Plugin recipe used by the discovery build.
    pub fn discovery_recipe(&self) -> PathBuf {
        self.initial_dir().join("initial.json")
    }

    pub fn discovery_script(&self) -> PathBuf {
        self.initial_dir().join("run.sh")
    }

    /// Plugin recipe used by the instrumented build.
    pub fn instrument_recipe(&self) -> PathBuf {
        self.autodiff_dir().join("instrument.json")
    }

    pub fn instrument_script(&self) -> PathBuf {
        self.autodiff_dir().join("run.sh")
    }

    /// Build step the search tool calls with a candidate recipe as `$1`.
    pub fn search_builder(&self) -> PathBuf {
        self.search_dir().join("craft_builder")
    }

    /// Run-and-verify step the search tool calls for every trial.
    pub fn search_driver(&self) -> PathBuf {
        self.search_dir().join("craft_driver")
    }

    pub fn search_script(&self) -> PathBuf {
        self.search_dir().join("run.sh")
    }

    pub fn phase_log(&self, log: PhaseLog) -> PathBuf {
        self.root.join(log.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_hang_off_root() {
        let layout = PipelineLayout::new("/tmp/fs-root").expect("layout");
        assert_eq!(layout.acquire_script(), Path::new("/tmp/fs-root/acquire.sh"));
        assert_eq!(
            layout.sanity_marker(),
            Path::new("/tmp/fs-root/sanity/.FS_DONE")
        );
        assert_eq!(layout.final_dir(), Path::new("/tmp/fs-root/search/final"));
        assert_eq!(
            layout.search_builder(),
            Path::new("/tmp/fs-root/search/craft_builder")
        );
        assert_eq!(
            layout.discovery_recipe(),
            Path::new("/tmp/fs-root/initial/initial.json")
        );
        assert_eq!(
            layout.phase_log(PhaseLog::Search),
            Path::new("/tmp/fs-root/phase3.log")
        );
    }

    #[test]
    fn relative_root_is_made_absolute() {
        let layout = PipelineLayout::new(".floatsmith").expect("layout");
        assert!(layout.root().is_absolute());
        assert!(layout.root().ends_with(".floatsmith"));
    }

    #[test]
    fn ensure_root_rejects_regular_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("root");
        std::fs::write(&file, "").expect("write");

        let layout = PipelineLayout::new(&file).expect("layout");
        assert!(layout.ensure_root().is_err());

        let layout = PipelineLayout::new(dir.path().join("fresh")).expect("layout");
        layout.ensure_root().expect("create root");
        assert!(layout.root().is_dir());
    }
}
