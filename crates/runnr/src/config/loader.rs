//! Configuration file loading for Runnr
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, File, FileFormat};

use crate::config::{BackendKind, Config, ConfigError, normalize_tag};

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        for (id, lang) in &self.languages {
            if normalize_tag(id) != *id {
                return Err(ConfigError::Invalid(format!(
                    "language id '{id}' must be lowercase without surrounding whitespace"
                )));
            }
            if lang.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty name"
                )));
            }
            if lang.extension.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty extension"
                )));
            }

            match lang.backend {
                BackendKind::Sandbox | BackendKind::Worker => {
                    let runtime = lang.runtime.as_ref().ok_or_else(|| {
                        ConfigError::Invalid(format!(
                            "{} language '{id}' has no [runtime] section",
                            lang.backend
                        ))
                    })?;
                    if runtime.command.is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "language '{id}' has empty runtime command"
                        )));
                    }
                }
                BackendKind::Transpile => {
                    let transpile = lang.transpile.as_ref().ok_or_else(|| {
                        ConfigError::Invalid(format!(
                            "transpile language '{id}' has no [transpile] section"
                        ))
                    })?;
                    if transpile.command.is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "language '{id}' has empty transpile command"
                        )));
                    }
                    if let Some(ref delegate) = transpile.delegate {
                        match self.languages.get(delegate) {
                            Some(target) if target.backend == BackendKind::Sandbox => {}
                            Some(_) => {
                                return Err(ConfigError::Invalid(format!(
                                    "language '{id}' delegates to '{delegate}', which is not a sandbox language"
                                )));
                            }
                            None => {
                                return Err(ConfigError::Invalid(format!(
                                    "language '{id}' delegates to unknown language '{delegate}'"
                                )));
                            }
                        }
                    }
                }
                BackendKind::Toolchain => {
                    let compile = lang.compile.as_ref().ok_or_else(|| {
                        ConfigError::Invalid(format!(
                            "toolchain language '{id}' has no [compile] section"
                        ))
                    })?;
                    if compile.command.is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "language '{id}' has empty compile command"
                        )));
                    }
                    let run = lang.run.as_ref().ok_or_else(|| {
                        ConfigError::Invalid(format!(
                            "toolchain language '{id}' has no [run] section"
                        ))
                    })?;
                    if run.command.is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "language '{id}' has empty run command"
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}
