//! Interactive prompter over a terminal (or any reader/writer pair).

use std::cell::RefCell;
use std::io::{self, BufRead, StdinLock, Stdout, Write};
use std::path::PathBuf;

use floatsmith_core::Prompter;
use floatsmith_shared::{FloatSmithError, Result};

/// Asks questions on `output` and reads answers from `input`.
pub(crate) struct TerminalPrompter<R, W> {
    input: RefCell<R>,
    output: RefCell<W>,
}

impl TerminalPrompter<StdinLock<'static>, Stdout> {
    pub(crate) fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

fn prompt_err(e: io::Error) -> FloatSmithError {
    FloatSmithError::Prompt(e.to_string())
}

impl<R: BufRead, W: Write> TerminalPrompter<R, W> {
    pub(crate) fn new(input: R, output: W) -> Self {
        Self {
            input: RefCell::new(input),
            output: RefCell::new(output),
        }
    }

    fn print(&self, text: &str) -> Result<()> {
        let mut out = self.output.borrow_mut();
        writeln!(out, "{text}").map_err(prompt_err)?;
        out.flush().map_err(prompt_err)
    }

    /// Show `question` and read one raw line, without its line terminator.
    fn ask(&self, question: &str, default: Option<&str>) -> Result<String> {
        {
            let mut out = self.output.borrow_mut();
            match default {
                Some(d) if !d.is_empty() => write!(out, "{question} [{d}] "),
                _ => write!(out, "{question} "),
            }
            .map_err(prompt_err)?;
            out.flush().map_err(prompt_err)?;
        }
        self.read_line()?
            .ok_or_else(|| FloatSmithError::Prompt("unexpected end of input".into()))
    }

    fn read_line(&self) -> Result<Option<String>> {
        let mut answer = String::new();
        let read = self
            .input
            .borrow_mut()
            .read_line(&mut answer)
            .map_err(prompt_err)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(answer.trim_end_matches(['\r', '\n']).to_string()))
    }
}

impl<R: BufRead, W: Write> Prompter for TerminalPrompter<R, W> {
    fn say(&self, text: &str) {
        if let Err(e) = self.print(text) {
            tracing::warn!(error = %e, "could not write to terminal");
        }
    }

    fn choose(&self, question: &str, options: &[&str], default: usize) -> Result<usize> {
        self.print(question)?;
        for (i, option) in options.iter().enumerate() {
            self.print(&format!("  {}) {option}", i + 1))?;
        }
        let default_label = (default + 1).to_string();
        loop {
            let answer = self.ask("Choice:", Some(&default_label))?;
            let answer = answer.trim();
            if answer.is_empty() && default < options.len() {
                return Ok(default);
            }
            match answer.parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => return Ok(n - 1),
                _ => self.print(&format!("Please enter a number from 1 to {}.", options.len()))?,
            }
        }
    }

    fn confirm(&self, question: &str, default: bool) -> Result<bool> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        loop {
            let answer = self.ask(&format!("{question} {hint}"), None)?;
            match answer.trim().to_ascii_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.print("Please answer y or n.")?,
            }
        }
    }

    fn integer(&self, question: &str, default: Option<i64>) -> Result<i64> {
        let default_label = default.map(|d| d.to_string());
        loop {
            let answer = self.ask(question, default_label.as_deref())?;
            let answer = answer.trim();
            match (answer, default) {
                ("", Some(d)) => return Ok(d),
                (text, _) => match text.parse() {
                    Ok(n) => return Ok(n),
                    Err(_) => self.print("Please enter a whole number.")?,
                },
            }
        }
    }

    fn line(&self, question: &str, default: Option<&str>) -> Result<String> {
        loop {
            let answer = self.ask(question, default)?;
            if !answer.trim().is_empty() {
                return Ok(answer);
            }
            if let Some(d) = default {
                return Ok(d.to_string());
            }
        }
    }

    fn lines(&self, question: &str) -> Result<Vec<String>> {
        self.print(question)?;
        let mut lines = Vec::new();
        while let Some(line) = self.read_line()? {
            if line.trim().is_empty() {
                break;
            }
            lines.push(line);
        }
        Ok(lines)
    }

    fn path(&self, question: &str, default: Option<&str>, must_exist: bool) -> Result<PathBuf> {
        loop {
            let path = PathBuf::from(self.line(question, default)?.trim());
            if !must_exist || path.is_dir() {
                return Ok(path);
            }
            self.print(&format!(
                "{} does not exist (or is a regular file)",
                path.display()
            ))?;
        }
    }
}
