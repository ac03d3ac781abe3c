//! Output aggregation for a single run
//!
//! Chunk events arrive from the isolated side in delivery order per stream;
//! nothing is assumed about the relative order of stdout and stderr.

use crate::types::{ExecutionResult, StreamKind};

/// Accumulates stdout/stderr chunks into two ordered text buffers
#[derive(Debug, Default)]
pub struct OutputAggregator {
    stdout: String,
    stderr: String,
}

impl OutputAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk, terminating it with a newline if it lacks one
    pub fn push(&mut self, kind: StreamKind, text: &str) {
        let buffer = match kind {
            StreamKind::Stdout => &mut self.stdout,
            StreamKind::Stderr => &mut self.stderr,
        };
        buffer.push_str(text);
        if !text.ends_with('\n') {
            buffer.push('\n');
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }

    /// Finalize the run and reset both buffers for the next one
    ///
    /// Cancelled runs finish the same way, returning whatever was collected.
    pub fn finish(&mut self) -> ExecutionResult {
        let result = ExecutionResult {
            stdout: self.stdout.trim().to_owned(),
            stderr: self.stderr.trim().to_owned(),
            diagnostics: Vec::new(),
        };
        self.stdout.clear();
        self.stderr.clear();
        result
    }
}
