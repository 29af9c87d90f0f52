//! Generated scripts and the subprocesses that run them.
//!
//! - [`ScriptEmitter`] writes executable scripts, optionally stitched together
//!   from other scripts already on disk.
//! - [`Invocation`] launches a command, drains both of its output streams
//!   concurrently, and reports what it printed and how it exited.

pub mod process;
pub mod script;

pub use process::{Invocation, RunOutcome, shell_quote};
pub use script::{ScriptEmitter, ScriptPart};
