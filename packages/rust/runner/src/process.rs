//! External process runner.
//!
//! A command runs under `sh -c` with both output streams piped. Two tasks
//! drain stdout and stderr independently, so a child that writes heavily to
//! one stream can never stall on the other. The call returns once both
//! streams are closed and the child has exited.
//!
//! The exit status is reported in [`RunOutcome`] but not turned into an
//! error: callers decide whether a non-zero exit matters.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use floatsmith_shared::{FloatSmithError, Result};

type SharedLog = Arc<Mutex<File>>;

/// Which stream a reader drains.
#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn label(self) -> &'static str {
        match self {
            Self::Stdout => "<stdout>",
            Self::Stderr => "<stderr>",
        }
    }
}

/// A command to launch and what to do with its output.
#[derive(Debug, Clone)]
pub struct Invocation {
    command: String,
    cwd: PathBuf,
    echo_stdout: bool,
    echo_stderr: bool,
    capture_stdout: bool,
    log_file: Option<PathBuf>,
}

impl Invocation {
    /// A shell command run in `cwd`. Stdout is echoed by default; nothing else is.
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            cwd: cwd.into(),
            echo_stdout: true,
            echo_stderr: false,
            capture_stdout: false,
            log_file: None,
        }
    }

    /// Run the script at `path` in `cwd`.
    pub fn script(path: &Path, cwd: impl Into<PathBuf>) -> Self {
        Self::new(shell_quote(&path.to_string_lossy()), cwd)
    }

    pub fn echo_stdout(mut self, echo: bool) -> Self {
        self.echo_stdout = echo;
        self
    }

    pub fn echo_stderr(mut self, echo: bool) -> Self {
        self.echo_stderr = echo;
        self
    }

    /// Collect stdout lines into [`RunOutcome::stdout`].
    pub fn capture_stdout(mut self) -> Self {
        self.capture_stdout = true;
        self
    }

    /// Append every stdout and stderr line to `path`.
    pub fn log_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Launch the command and wait for it and both stream readers to finish.
    #[instrument(skip_all, fields(command = %self.command, cwd = %self.cwd.display()))]
    pub async fn run(&self) -> Result<RunOutcome> {
        let log = match &self.log_file {
            Some(path) => Some(open_log(path, &self.command).await?),
            None => None,
        };

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FloatSmithError::io(&self.cwd, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FloatSmithError::validation("child stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FloatSmithError::validation("child stderr was not piped"))?;

        let out_reader = tokio::spawn(drain(
            stdout,
            Stream::Stdout,
            self.echo_stdout,
            self.capture_stdout,
            log.clone(),
        ));
        let err_reader = tokio::spawn(drain(
            stderr,
            Stream::Stderr,
            self.echo_stderr,
            false,
            log.clone(),
        ));

        let (out_drained, err_drained, status) =
            tokio::join!(out_reader, err_reader, child.wait());
        let captured = settle(out_drained, err_drained)?;
        let status = status.map_err(|e| FloatSmithError::io(&self.cwd, e))?;

        if let Some(log) = log {
            let mut file = log.lock().await;
            if let Some(path) = &self.log_file {
                file.flush().await.map_err(|e| FloatSmithError::io(path, e))?;
            }
        }

        let outcome = RunOutcome {
            command: self.command.clone(),
            stdout: captured.join("\n"),
            exit_code: status.code(),
        };
        if outcome.success() {
            debug!("command finished");
        } else {
            warn!(code = ?outcome.exit_code, "command exited unsuccessfully");
        }
        Ok(outcome)
    }
}

/// What a finished command printed and how it exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    command: String,
    /// Captured stdout lines joined by `\n`; empty unless capture was requested.
    pub stdout: String,
    /// Exit code, or `None` when the child was killed by a signal.
    pub exit_code: Option<i32>,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// The unsuccessful exit as a typed error, for callers that record warnings.
    pub fn failure(&self) -> Option<FloatSmithError> {
        (!self.success()).then(|| FloatSmithError::SubprocessNonZeroExit {
            command: self.command.clone(),
            code: self.exit_code,
        })
    }
}

/// Quote `text` for safe use as one word in a POSIX shell command.
pub fn shell_quote(text: &str) -> String {
    let plain = !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:=@%,".contains(c));
    if plain {
        text.to_string()
    } else {
        format!("'{}'", text.replace('\'', r"'\''"))
    }
}

async fn open_log(path: &Path, command: &str) -> Result<SharedLog> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| FloatSmithError::io(path, e))?;
    let header = format!(
        "== {} :: {command}\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    file.write_all(header.as_bytes())
        .await
        .map_err(|e| FloatSmithError::io(path, e))?;
    Ok(Arc::new(Mutex::new(file)))
}

async fn drain<R>(
    reader: R,
    stream: Stream,
    echo: bool,
    capture: bool,
    log: Option<SharedLog>,
) -> Result<Vec<String>>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut captured = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| FloatSmithError::io(stream.label(), e))?;
        if read == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);

        if echo {
            match stream {
                Stream::Stdout => println!("{line}"),
                Stream::Stderr => eprintln!("{line}"),
            }
        }
        if let Some(log) = &log {
            let mut file = log.lock().await;
            file.write_all(format!("{line}\n").as_bytes())
                .await
                .map_err(|e| FloatSmithError::io(stream.label(), e))?;
        }
        if capture {
            captured.push(line.to_string());
        }
    }

    Ok(captured)
}

type Drained = std::result::Result<Result<Vec<String>>, tokio::task::JoinError>;

fn joined(result: Drained) -> Result<Vec<String>> {
    result.map_err(|e| FloatSmithError::validation(format!("stream reader failed: {e}")))?
}

/// Captured stdout, or the first failure of either reader.
fn settle(stdout: Drained, stderr: Drained) -> Result<Vec<String>> {
    let captured = joined(stdout)?;
    joined(stderr)?;
    Ok(captured)
}
