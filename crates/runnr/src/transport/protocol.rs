//! Wire messages exchanged with isolated contexts
//!
//! Sandbox messages use the upper-case `EXECUTE_CODE` / `INPUT_REQUEST` style
//! tags; interpreter messages are snake_case. Every message is a JSON object
//! discriminated by its `type` field.

use serde::{Deserialize, Serialize};

/// Host → sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostMessage {
    ExecuteCode { code: String },
    InputResponse { value: String },
}

/// Sandbox → host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SandboxMessage {
    #[serde(rename = "stdout")]
    Stdout { data: String },

    #[serde(rename = "stderr")]
    Stderr { data: String },

    #[serde(rename = "INPUT_REQUEST")]
    InputRequest {
        #[serde(default)]
        message: String,
    },

    #[serde(rename = "EXECUTION_COMPLETE")]
    ExecutionComplete,
}

/// How the interpreter should run a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Execute the code as written
    Sync,
    /// Run the `__runnr_main__` coroutine defined by the code
    Async,
}

/// Worker thread → interpreter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InterpreterRequest {
    Run {
        code: String,
        mode: RunMode,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        packages: Vec<String>,
    },
    InputResponse {
        value: String,
    },
}

/// Interpreter → worker thread → host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    Ready,
    Stdout {
        data: String,
    },
    Stderr {
        data: String,
    },
    InputRequest {
        #[serde(default)]
        prompt: String,
    },
    Done,
    Error {
        data: String,
    },
}

/// Host → worker thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerRequest {
    Run { code: String },
    InputResponse { value: String },
    Terminate,
}

/// Worker thread → host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Message(WorkerMessage),
    /// The worker itself failed (interpreter exited, could not launch, ...)
    Fault(String),
}
