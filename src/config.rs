//! Session configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::mode::SessionMode;
use crate::{AppError, Result};

/// File extension appended to the session name for checkpoint files.
pub const CHECKPOINT_EXTENSION: &str = "sav";

fn default_session_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_session_name() -> String {
    "default_run".into()
}

fn default_true() -> bool {
    true
}

/// Session configuration parsed from an optional `session.toml`.
///
/// Every field has a default, so an absent file behaves like an empty one.
/// CLI flags are applied on top through [`SessionConfig::apply_overrides`].
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Grammar file the candidate source is built from.
    #[serde(default)]
    pub grammar_path: Option<PathBuf>,
    /// Directory holding checkpoint files.
    #[serde(default = "default_session_dir")]
    pub session_dir: PathBuf,
    /// Session name; the checkpoint file is `<session_dir>/<session_name>.sav`.
    #[serde(default = "default_session_name")]
    pub session_name: String,
    /// Candidate generation strategy.
    #[serde(default)]
    pub mode: SessionMode,
    /// Whether the operator keystroke listener is started.
    #[serde(default = "default_true")]
    pub control_listener: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grammar_path: None,
            session_dir: default_session_dir(),
            session_name: default_session_name(),
            mode: SessionMode::default(),
            control_listener: true,
        }
    }
}

/// Values supplied on the command line that take precedence over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// `--grammar`
    pub grammar_path: Option<PathBuf>,
    /// `--session-dir`
    pub session_dir: Option<PathBuf>,
    /// `--session`
    pub session_name: Option<String>,
    /// `--mode`
    pub mode: Option<SessionMode>,
    /// `--no-control`
    pub disable_control: bool,
}

impl SessionConfig {
    /// Load configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        Ok(config)
    }

    /// Apply command-line overrides, then validate the merged result.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the merged configuration is invalid.
    pub fn apply_overrides(mut self, overrides: ConfigOverrides) -> Result<Self> {
        if let Some(grammar) = overrides.grammar_path {
            self.grammar_path = Some(grammar);
        }
        if let Some(dir) = overrides.session_dir {
            self.session_dir = dir;
        }
        if let Some(name) = overrides.session_name {
            self.session_name = name;
        }
        if let Some(mode) = overrides.mode {
            self.mode = mode;
        }
        if overrides.disable_control {
            self.control_listener = false;
        }
        self.validate()?;
        Ok(self)
    }

    /// Grammar path, required once overrides have been applied.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if no grammar was configured.
    pub fn grammar_path(&self) -> Result<&Path> {
        self.grammar_path.as_deref().ok_or_else(|| {
            AppError::Config("no grammar configured; pass --grammar or set grammar_path".into())
        })
    }

    /// Derived path of this session's checkpoint file.
    #[must_use]
    pub fn checkpoint_path(&self) -> PathBuf {
        self.session_dir
            .join(format!("{}.{CHECKPOINT_EXTENSION}", self.session_name))
    }

    fn validate(&self) -> Result<()> {
        let name = self.session_name.trim();
        if name.is_empty() {
            return Err(AppError::Config("session_name must not be empty".into()));
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(AppError::Config(format!(
                "session_name must be a plain file name: {name}"
            )));
        }
        self.grammar_path()?;
        Ok(())
    }
}
