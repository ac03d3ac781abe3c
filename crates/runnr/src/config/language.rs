use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;

const INVALID_FILE_EXT_CHARS: [char; 2] = ['/', '.'];

/// Normalize a user-supplied language tag (trim + lowercase)
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_ascii_lowercase()
}

/// Which execution backend serves a language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Fresh isolated context per run (scripting languages)
    Sandbox,
    /// Long-lived interpreter hosted on a background worker thread
    Worker,
    /// Source-to-source compiler feeding a sandbox language
    Transpile,
    /// Ahead-of-time compile then run the produced artifact
    Toolchain,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendKind::Sandbox => "sandbox",
            BackendKind::Worker => "worker",
            BackendKind::Transpile => "transpile",
            BackendKind::Toolchain => "toolchain",
        };
        f.write_str(name)
    }
}

/// Configuration for a programming language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    /// Human-readable name for the language (e.g., "Python")
    pub name: String,

    /// File extension
    pub extension: FileExtension,

    /// Alternative tags resolving to this language (e.g., "js")
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Backend serving this language
    pub backend: BackendKind,

    /// Isolated runtime (sandbox and worker backends)
    #[serde(default)]
    pub runtime: Option<RuntimeConfig>,

    /// Source-to-source compiler (transpile backend)
    #[serde(default)]
    pub transpile: Option<TranspileConfig>,

    /// Compilation step (toolchain backend)
    #[serde(default)]
    pub compile: Option<CompileConfig>,

    /// Execution step (toolchain backend)
    #[serde(default)]
    pub run: Option<RunConfig>,
}

impl Language {
    /// Check whether a normalized tag names this language through an alias
    pub fn has_alias(&self, normalized: &str) -> bool {
        self.aliases
            .iter()
            .any(|alias| normalize_tag(alias) == normalized)
    }

    /// Get the source file name for this language
    pub fn source_name(&self) -> String {
        if let Some(ref compile) = self.compile {
            compile.source_name.clone()
        } else {
            format!("main.{}", self.extension)
        }
    }

    /// Expand placeholders in the given command
    pub fn expand_command(command: &[String], placeholders: &[(&str, &str)]) -> Vec<String> {
        command
            .iter()
            .map(|arg| {
                placeholders
                    .iter()
                    .fold(arg.clone(), |acc, (key, value)| acc.replace(key, value))
            })
            .collect()
    }
}

/// File extension without dot (e.g., "py")
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileExtension(String);

impl FileExtension {
    pub fn new(extension: &str) -> Result<Self, ConfigError> {
        let contains_invalid = extension
            .chars()
            .any(|c| INVALID_FILE_EXT_CHARS.contains(&c));
        if contains_invalid {
            return Err(ConfigError::InvalidFileExtChars);
        }
        Ok(Self(extension.to_owned()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Case-insensitive comparison against an extension taken from a path
    pub fn matches(&self, extension: &str) -> bool {
        self.0.eq_ignore_ascii_case(extension)
    }
}

impl<'de> Deserialize<'de> for FileExtension {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileExtension::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a file extension without '/' or '.' characters",
            )
        })
    }
}

impl std::fmt::Display for FileExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Command used to start an isolated runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {bootstrap}
    pub command: Vec<String>,

    /// Environment variables for the runtime process
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Configuration for a source-to-source compiler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranspileConfig {
    /// Command reading source on stdin and writing compiled code to stdout
    /// Placeholders: {target}, {module}
    pub command: Vec<String>,

    /// Environment variables for the compiler process
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Sandbox language that runs the compiled code (compile-only if unset)
    #[serde(default)]
    pub delegate: Option<String>,

    /// Language level of the emitted code
    #[serde(default)]
    pub target: Option<String>,

    /// Module format of the emitted code
    #[serde(default)]
    pub module: Option<String>,

    /// Enable strict checking where the compiler supports it
    #[serde(default)]
    pub strict: Option<bool>,
}

/// Configuration for the compilation step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {output}, {binary}, {dir}, {libs}
    pub command: Vec<String>,

    /// Source file name in the scratch directory (e.g., "Main.java")
    pub source_name: String,

    /// Artifact produced by a successful compilation (e.g., "Main.class")
    pub output_name: String,

    /// Environment variables to set during compilation
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Library artifacts made available to compiler and program ({libs})
    #[serde(default)]
    pub libraries: Vec<String>,
}

/// Configuration for the execution step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {output}, {binary}, {dir}, {libs}
    pub command: Vec<String>,

    /// Environment Variables to set
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Output fragments meaning the program has no entry point
    #[serde(default)]
    pub missing_entry_markers: Vec<String>,
}
