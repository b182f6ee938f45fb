//! Execution runners.
//!
//! [`AdHocRunner`] runs a list of actions as one play against the hosts a
//! pattern selects; [`CommandRunner`] narrows that to a single shell-like
//! command; [`PlaybookRunner`] runs a pre-authored playbook file. All three
//! share [`RunnerOptions`] and drive an [`ExecutionBackend`].

pub mod action;
pub mod adhoc;
pub mod backend;
pub mod options;
pub mod playbook;
pub mod result;

pub use action::{Action, MODULES_REQUIRING_ARGS};
pub use adhoc::{AdHocRunner, CommandRunner};
pub use backend::{BackendFactory, CommandBackend, ExecutionBackend};
pub use options::{OptionOverrides, RunnerOptions};
pub use playbook::PlaybookRunner;
pub use result::{ActionResult, ExecOutcome, HostResult, RunResult, Summary};

/// Sink for the human-readable transcript of a run.
///
/// Each run gets its own sink, passed into the runner call.
pub trait RunOutput: Send + Sync {
    /// Append one line.
    fn line(&self, text: &str);
}

/// Discards all output.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl RunOutput for NullOutput {
    fn line(&self, _text: &str) {}
}

/// Collects lines in memory.
#[derive(Debug, Default)]
pub struct BufferOutput {
    lines: parking_lot::Mutex<Vec<String>>,
}

impl BufferOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the collected lines.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl RunOutput for BufferOutput {
    fn line(&self, text: &str) {
        self.lines.lock().push(text.to_string());
    }
}

/// `TITLE [name] ****` banner padded to 80 columns.
pub(crate) fn banner(title: &str, name: &str) -> String {
    let header = format!("{} [{}]", title, name);
    let stars = "*".repeat(80_usize.saturating_sub(header.len() + 1));
    format!("{} {}", header, stars)
}
