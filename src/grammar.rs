//! Probabilistic grammar model consumed by the priority-queue source.
//!
//! A grammar is a TOML document listing base structures and, for every slot
//! a structure references, terminal groups of equally likely values:
//!
//! ```toml
//! name = "demo"
//!
//! [[structures]]
//! probability = 0.6
//! slots = ["word", "digits"]
//!
//! [[slots.word]]
//! probability = 0.25
//! values = ["password", "monkey"]
//!
//! [[slots.digits]]
//! probability = 0.5
//! values = ["1", "123"]
//! ```
//!
//! A structure's guesses each have probability
//! `structure.probability * Π group.probability`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::{AppError, Result};

/// Values that share one per-value probability within a slot.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TerminalGroup {
    /// Probability of each individual value in the group.
    pub probability: f64,
    /// Concrete strings substituted for the slot.
    pub values: Vec<String>,
}

/// A named slot with its terminal groups, most probable first.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    /// Slot name as referenced by structures.
    pub name: String,
    /// Terminal groups sorted by non-increasing probability.
    pub groups: Vec<TerminalGroup>,
}

/// A base structure: an ordered sequence of slots.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    /// Probability of the structure itself.
    pub probability: f64,
    /// Indices into [`Grammar::slots`], in output order.
    pub slot_ids: Vec<usize>,
    /// Slot names joined for display.
    pub label: String,
}

#[derive(Debug, Deserialize)]
struct RawStructure {
    probability: f64,
    slots: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawGrammar {
    #[serde(default)]
    name: Option<String>,
    structures: Vec<RawStructure>,
    #[serde(default)]
    slots: BTreeMap<String, Vec<TerminalGroup>>,
}

/// Validated grammar plus a fingerprint of its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Grammar {
    name: String,
    structures: Vec<Structure>,
    slots: Vec<Slot>,
    fingerprint: String,
}

impl Grammar {
    /// Load and validate a grammar file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Grammar` if the file cannot be read or is invalid.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AppError::Grammar(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate a grammar from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Grammar` if the text is not valid TOML, a
    /// probability lies outside `(0, 1]`, a group has no values, a structure
    /// has no slots, or a structure references an undefined slot.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let parsed: RawGrammar = toml::from_str(raw)
            .map_err(|err| AppError::Grammar(format!("invalid grammar: {err}")))?;

        let mut slots = Vec::with_capacity(parsed.slots.len());
        let mut slot_index = BTreeMap::new();
        for (name, mut groups) in parsed.slots {
            if groups.is_empty() {
                return Err(AppError::Grammar(format!("slot `{name}` has no groups")));
            }
            for group in &groups {
                check_probability(group.probability, &format!("slot `{name}`"))?;
                if group.values.is_empty() {
                    return Err(AppError::Grammar(format!(
                        "slot `{name}` has a group with no values"
                    )));
                }
            }
            groups.sort_by(|a, b| b.probability.total_cmp(&a.probability));
            slot_index.insert(name.clone(), slots.len());
            slots.push(Slot { name, groups });
        }

        if parsed.structures.is_empty() {
            return Err(AppError::Grammar("grammar defines no structures".into()));
        }

        let mut structures = Vec::with_capacity(parsed.structures.len());
        for (i, raw_structure) in parsed.structures.into_iter().enumerate() {
            check_probability(raw_structure.probability, &format!("structure {i}"))?;
            if raw_structure.slots.is_empty() {
                return Err(AppError::Grammar(format!("structure {i} has no slots")));
            }
            let slot_ids = raw_structure
                .slots
                .iter()
                .map(|name| {
                    slot_index.get(name).copied().ok_or_else(|| {
                        AppError::Grammar(format!("structure {i} references unknown slot `{name}`"))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            structures.push(Structure {
                probability: raw_structure.probability,
                slot_ids,
                label: raw_structure.slots.join(" "),
            });
        }

        Ok(Self {
            name: parsed.name.unwrap_or_else(|| "unnamed".into()),
            structures,
            slots,
            fingerprint: sha256_hex(raw.as_bytes()),
        })
    }

    /// Grammar name, or `unnamed`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base structures in file order.
    #[must_use]
    pub fn structures(&self) -> &[Structure] {
        &self.structures
    }

    /// Slots in name order.
    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Terminal groups of the slot with index `slot_id`.
    #[must_use]
    pub fn groups(&self, slot_id: usize) -> &[TerminalGroup] {
        self.slots.get(slot_id).map_or(&[], |slot| slot.groups.as_slice())
    }

    /// Hex SHA-256 of the grammar source text.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn check_probability(probability: f64, context: &str) -> Result<()> {
    if probability > 0.0 && probability <= 1.0 {
        Ok(())
    } else {
        Err(AppError::Grammar(format!(
            "{context}: probability {probability} outside (0, 1]"
        )))
    }
}

/// Compute SHA-256 hex digest of the given bytes.
fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
