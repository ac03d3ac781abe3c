use serde::{Deserialize, Serialize};

/// A single request to run a snippet of code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Source code to run
    pub code: String,

    /// Language tag as supplied by the caller (e.g., "JS", " python ")
    pub language: String,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
        }
    }
}

/// Captured output of a single run
///
/// Both text fields are always present and trimmed. Failures of the run itself
/// (unsupported language, compilation errors, uncaught exceptions, crashed
/// workers) are reported through `stderr`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Standard output of the run
    pub stdout: String,

    /// Standard error of the run
    pub stderr: String,

    /// Structured compiler diagnostics, populated only when compilation failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<CompilationError>,
}

impl ExecutionResult {
    /// Result carrying only standard output
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    /// Result carrying only standard error
    pub fn failure(stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    /// Check whether the run reported anything on stderr
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.stderr.is_empty()
    }
}

/// A diagnostic reported by a compiler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationError {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl CompilationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            column: None,
        }
    }
}

/// Which output stream a chunk of text belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// An input request raised by running code (`prompt()` / `input()`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRequest {
    /// Canonical id of the language whose code asked for input
    pub language: String,

    /// Prompt text shown to the user
    pub message: String,
}
