//! Versioned, sectioned checkpoint document backed by a single file.
//!
//! Every component that owns resumable state serializes itself into a named
//! section via [`CheckpointStore::set_section`] and reads it back with
//! [`CheckpointStore::section`]. The whole document is rewritten on each
//! checkpoint; there are no partial or merge writes.
//!
//! ```toml
//! version = 1
//!
//! [session]
//! mode = "priority_queue"
//!
//! [progress]
//! candidates_processed = 2
//! ```

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::{AppError, Result};

/// Format version written to, and required from, every checkpoint.
pub const CHECKPOINT_VERSION: i64 = 1;

const VERSION_KEY: &str = "version";

/// In-memory checkpoint document: an ordered map of section name to table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckpointStore {
    sections: BTreeMap<String, toml::Table>,
}

impl CheckpointStore {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `value` into the section `name`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CheckpointIo` if `value` does not serialize to a
    /// TOML table.
    pub fn set_section<T: Serialize>(&mut self, name: &str, value: &T) -> Result<()> {
        if name == VERSION_KEY {
            return Err(AppError::CheckpointIo(format!(
                "section name `{VERSION_KEY}` is reserved"
            )));
        }
        let table = match toml::Value::try_from(value) {
            Ok(toml::Value::Table(table)) => table,
            Ok(other) => {
                return Err(AppError::CheckpointIo(format!(
                    "section `{name}` must serialize to a table, got {}",
                    other.type_str()
                )))
            }
            Err(err) => {
                return Err(AppError::CheckpointIo(format!(
                    "failed to serialize section `{name}`: {err}"
                )))
            }
        };
        self.sections.insert(name.to_owned(), table);
        Ok(())
    }

    /// Deserialize the section `name`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CheckpointCorrupt` if the section is absent or its
    /// contents do not match `T`.
    pub fn section<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let table = self.sections.get(name).ok_or_else(|| {
            AppError::CheckpointCorrupt(format!("missing required section `{name}`"))
        })?;
        toml::Value::Table(table.clone())
            .try_into()
            .map_err(|err| AppError::CheckpointCorrupt(format!("invalid section `{name}`: {err}")))
    }

    /// Whether a section named `name` is present.
    #[must_use]
    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Section names in document order.
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Reject any section not listed in `known`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CheckpointCorrupt` naming the first unknown section.
    pub fn ensure_known_sections(&self, known: &[&str]) -> Result<()> {
        match self.section_names().find(|name| !known.contains(name)) {
            Some(unknown) => Err(AppError::CheckpointCorrupt(format!(
                "unknown section `{unknown}`"
            ))),
            None => Ok(()),
        }
    }

    /// Render the document as TOML text.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CheckpointIo` if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        let mut root = toml::Table::new();
        root.insert(VERSION_KEY.into(), toml::Value::Integer(CHECKPOINT_VERSION));
        for (name, table) in &self.sections {
            root.insert(name.clone(), toml::Value::Table(table.clone()));
        }
        toml::to_string(&root)
            .map_err(|err| AppError::CheckpointIo(format!("failed to render checkpoint: {err}")))
    }

    /// Parse a document from TOML text, checking the format version.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CheckpointCorrupt` if the text is not valid TOML,
    /// the version is absent or unsupported, or a top-level entry is not a
    /// section.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut root: toml::Table = raw
            .parse()
            .map_err(|err| AppError::CheckpointCorrupt(format!("unparsable checkpoint: {err}")))?;

        match root.remove(VERSION_KEY) {
            Some(toml::Value::Integer(CHECKPOINT_VERSION)) => {}
            Some(toml::Value::Integer(other)) => {
                return Err(AppError::CheckpointCorrupt(format!(
                    "unsupported checkpoint version {other} (expected {CHECKPOINT_VERSION})"
                )))
            }
            Some(_) => {
                return Err(AppError::CheckpointCorrupt(
                    "checkpoint version must be an integer".into(),
                ))
            }
            None => {
                return Err(AppError::CheckpointCorrupt(
                    "checkpoint has no version".into(),
                ))
            }
        }

        let mut sections = BTreeMap::new();
        for (name, value) in root {
            match value {
                toml::Value::Table(table) => {
                    sections.insert(name, table);
                }
                other => {
                    return Err(AppError::CheckpointCorrupt(format!(
                        "top-level entry `{name}` must be a section, got {}",
                        other.type_str()
                    )))
                }
            }
        }
        Ok(Self { sections })
    }

    /// Write the document to `path`, replacing any previous checkpoint.
    ///
    /// The text goes to a temporary file in the same directory which is then
    /// renamed over `path`, so readers never observe a half-written file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CheckpointIo` on any serialization or file-system
    /// failure. Failures are not retried.
    pub fn write(&self, path: &Path) -> Result<()> {
        let text = self.to_toml_string()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let io_err = |what: &str, err: std::io::Error| {
            AppError::CheckpointIo(format!("{what} {}: {err}", path.display()))
        };

        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|err| io_err("cannot create temporary file for", err))?;
        tmp.write_all(text.as_bytes())
            .map_err(|err| io_err("cannot write", err))?;
        tmp.as_file()
            .sync_all()
            .map_err(|err| io_err("cannot sync", err))?;
        tmp.persist(path)
            .map_err(|err| io_err("cannot replace", err.error))?;

        debug!(path = %path.display(), sections = self.sections.len(), "checkpoint written");
        Ok(())
    }

    /// Read a document previously produced by [`CheckpointStore::write`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::CheckpointMissing` if `path` does not exist, and
    /// `AppError::CheckpointCorrupt` if it cannot be read or parsed.
    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                AppError::CheckpointMissing(format!("no checkpoint at {}", path.display()))
            } else {
                AppError::CheckpointCorrupt(format!("cannot read {}: {err}", path.display()))
            }
        })?;
        Self::from_toml_str(&raw)
    }
}
