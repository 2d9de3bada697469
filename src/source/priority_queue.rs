//! Priority-queue candidate source over a [`Grammar`].
//!
//! Pre-terminals (a structure plus one terminal group per slot) are kept in a
//! max-heap keyed by probability. Popping a node pushes its children, each of
//! which moves one slot at or after the node's pivot to the next, less
//! probable, group. Every pre-terminal has exactly one parent under this rule
//! and is never more probable than it, so pops come out in non-increasing
//! probability order without a visited set.
//!
//! Entries compare by probability, then structure index, then group indices,
//! so the pop sequence of a grammar is fully determined. A checkpoint records
//! the pre-terminal popped last; restoring replays the pops that precede it
//! and leaves it at the head of the queue.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt::{Display, Formatter};
use std::io::Write;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{CandidateSource, ConsumerGone, SourceFactory};
use crate::grammar::Grammar;
use crate::mode::SessionMode;
use crate::models::Candidate;
use crate::persistence::CheckpointStore;
use crate::{AppError, Result};

/// A structure with a chosen terminal group for each of its slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreTerminal {
    /// Index into [`Grammar::structures`].
    pub structure: usize,
    /// Group index per slot, parallel to the structure's slots.
    pub groups: Vec<usize>,
    label: Arc<str>,
}

impl Display for PreTerminal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?}", self.label, self.groups)
    }
}

#[derive(Debug)]
struct QueueEntry {
    probability: f64,
    pivot: usize,
    preterminal: PreTerminal,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.probability
            .total_cmp(&other.probability)
            .then_with(|| other.preterminal.structure.cmp(&self.preterminal.structure))
            .then_with(|| other.preterminal.groups.cmp(&self.preterminal.groups))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

/// Persisted state of the queue: the `priority_queue` checkpoint section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
struct QueueState {
    grammar_sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pending: Option<PendingState>,
}

/// The pre-terminal popped last before the checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
struct PendingState {
    structure: usize,
    groups: Vec<usize>,
}

/// Candidate source enumerating a grammar's pre-terminals by probability and
/// writing their guesses, one per line, to `sink`.
pub struct PriorityQueueSource<W> {
    grammar: Arc<Grammar>,
    labels: Vec<Arc<str>>,
    heap: BinaryHeap<QueueEntry>,
    sink: W,
    max_probability: Option<f64>,
    pending: Option<PreTerminal>,
}

impl<W: Write + Send + 'static> PriorityQueueSource<W> {
    /// Queue seeded with the most probable pre-terminal of every structure.
    #[must_use]
    pub fn new(grammar: Arc<Grammar>, sink: W) -> Self {
        let labels: Vec<Arc<str>> = grammar
            .structures()
            .iter()
            .map(|structure| Arc::from(structure.label.as_str()))
            .collect();
        let mut source = Self {
            grammar,
            labels,
            heap: BinaryHeap::new(),
            sink,
            max_probability: None,
            pending: None,
        };
        for (index, structure) in source.grammar.structures().iter().enumerate() {
            let groups = vec![0; structure.slot_ids.len()];
            let entry = source.entry(index, groups, 0);
            source.heap.push(entry);
        }
        source
    }

    /// Queue positioned at the checkpointed candidate.
    ///
    /// Every pre-terminal ordered before the one popped last ahead of the
    /// checkpoint is skipped, so that pre-terminal is the first one popped
    /// again. Pre-terminals tied with it on probability keep their place.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CheckpointCorrupt` if the section is missing or
    /// malformed, was written for a different grammar, or names a
    /// pre-terminal the grammar does not have.
    pub fn restore(grammar: Arc<Grammar>, sink: W, store: &CheckpointStore) -> Result<Self> {
        let state: QueueState = store.section(SessionMode::PriorityQueue.section_name())?;
        if state.grammar_sha256 != grammar.fingerprint() {
            return Err(AppError::CheckpointCorrupt(format!(
                "checkpoint was written for grammar {} but {} is loaded",
                state.grammar_sha256,
                grammar.fingerprint()
            )));
        }

        let mut source = Self::new(grammar, sink);
        let (threshold, pending) = match (state.max_probability, state.pending) {
            (None, None) => return Ok(source),
            (Some(threshold), Some(pending)) => (threshold, pending),
            _ => {
                return Err(AppError::CheckpointCorrupt(
                    "max_probability and pending must be saved together".into(),
                ))
            }
        };
        source.check_pending(&pending)?;

        let target = source.entry(pending.structure, pending.groups, 0);
        if target.probability.to_bits() != threshold.to_bits() {
            return Err(AppError::CheckpointCorrupt(format!(
                "max_probability {threshold} does not match pending pre-terminal ({})",
                target.probability
            )));
        }

        let mut skipped = 0u64;
        while source.heap.peek().is_some_and(|top| *top > target) {
            source.pop_entry();
            skipped += 1;
        }
        if source.heap.peek().map(|top| &top.preterminal) != Some(&target.preterminal) {
            return Err(AppError::CheckpointCorrupt(format!(
                "pending pre-terminal {} is not reachable in this grammar",
                target.preterminal
            )));
        }
        source.max_probability = Some(threshold);
        source.pending = Some(target.preterminal.clone());
        info!(skipped, threshold, pending = %target.preterminal, "priority queue restored");
        Ok(source)
    }

    /// Number of pre-terminals waiting in the queue.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.heap.len()
    }

    /// Probability of the most recently popped pre-terminal.
    #[must_use]
    pub fn max_probability(&self) -> Option<f64> {
        self.max_probability
    }

    /// Consume the source and return its sink.
    #[must_use]
    pub fn into_sink(self) -> W {
        self.sink
    }

    fn entry(&self, structure: usize, groups: Vec<usize>, pivot: usize) -> QueueEntry {
        let mut probability = self.grammar.structures()[structure].probability;
        for (slot_id, group) in self.grammar.structures()[structure]
            .slot_ids
            .iter()
            .zip(&groups)
        {
            probability *= self.grammar.groups(*slot_id)[*group].probability;
        }
        QueueEntry {
            probability,
            pivot,
            preterminal: PreTerminal {
                structure,
                groups,
                label: Arc::clone(&self.labels[structure]),
            },
        }
    }

    fn check_pending(&self, pending: &PendingState) -> Result<()> {
        let Some(structure) = self.grammar.structures().get(pending.structure) else {
            return Err(AppError::CheckpointCorrupt(format!(
                "pending structure {} out of range",
                pending.structure
            )));
        };
        let in_range = pending.groups.len() == structure.slot_ids.len()
            && structure
                .slot_ids
                .iter()
                .zip(&pending.groups)
                .all(|(slot_id, group)| *group < self.grammar.groups(*slot_id).len());
        if in_range {
            Ok(())
        } else {
            Err(AppError::CheckpointCorrupt(format!(
                "pending groups {:?} do not fit structure {}",
                pending.groups, pending.structure
            )))
        }
    }

    fn pop_entry(&mut self) -> Option<QueueEntry> {
        let entry = self.heap.pop()?;
        let structure = entry.preterminal.structure;
        let slot_ids = self.grammar.structures()[structure].slot_ids.clone();
        for position in entry.pivot..slot_ids.len() {
            let next_group = entry.preterminal.groups[position] + 1;
            if next_group < self.grammar.groups(slot_ids[position]).len() {
                let mut groups = entry.preterminal.groups.clone();
                groups[position] = next_group;
                let child = self.entry(structure, groups, position);
                self.heap.push(child);
            }
        }
        Some(entry)
    }

    fn write_guess(&mut self, guess: &str) -> std::result::Result<(), ConsumerGone> {
        self.sink
            .write_all(guess.as_bytes())
            .and_then(|()| self.sink.write_all(b"\n"))
            .map_err(|err| ConsumerGone::from_io(&err))
    }
}

impl<W: Write + Send + 'static> CandidateSource for PriorityQueueSource<W> {
    type Descriptor = PreTerminal;

    fn next_candidate(&mut self) -> Option<Candidate<PreTerminal>> {
        let entry = self.pop_entry()?;
        self.max_probability = Some(entry.probability);
        self.pending = Some(entry.preterminal.clone());
        Some(Candidate::new(entry.preterminal, entry.probability))
    }

    fn expand(
        &mut self,
        candidate: &Candidate<PreTerminal>,
    ) -> std::result::Result<u64, ConsumerGone> {
        let grammar = Arc::clone(&self.grammar);
        let preterminal = &candidate.descriptor;
        let Some(structure) = grammar.structures().get(preterminal.structure) else {
            return Ok(0);
        };
        let value_lists: Vec<&[String]> = structure
            .slot_ids
            .iter()
            .zip(&preterminal.groups)
            .filter_map(|(slot_id, group)| {
                grammar
                    .groups(*slot_id)
                    .get(*group)
                    .map(|g| g.values.as_slice())
            })
            .collect();
        if value_lists.len() != structure.slot_ids.len() {
            return Ok(0);
        }

        // Odometer over the cartesian product of the slot values.
        let mut cursor = vec![0usize; value_lists.len()];
        let mut guess = String::new();
        let mut count = 0u64;
        loop {
            guess.clear();
            for (values, index) in value_lists.iter().zip(&cursor) {
                guess.push_str(&values[*index]);
            }
            self.write_guess(&guess)?;
            count += 1;

            let mut position = cursor.len();
            loop {
                if position == 0 {
                    self.sink
                        .flush()
                        .map_err(|err| ConsumerGone::from_io(&err))?;
                    debug!(candidate = %preterminal, count, "candidate expanded");
                    return Ok(count);
                }
                position -= 1;
                cursor[position] += 1;
                if cursor[position] < value_lists[position].len() {
                    break;
                }
                cursor[position] = 0;
            }
        }
    }

    fn save_state(&self, store: &mut CheckpointStore) -> Result<()> {
        store.set_section(
            SessionMode::PriorityQueue.section_name(),
            &QueueState {
                grammar_sha256: self.grammar.fingerprint().to_owned(),
                max_probability: self.max_probability,
                pending: self.pending.as_ref().map(|preterminal| PendingState {
                    structure: preterminal.structure,
                    groups: preterminal.groups.clone(),
                }),
            },
        )
    }
}

/// Builds [`PriorityQueueSource`]s for one grammar and guess sink.
pub struct PriorityQueueFactory<W> {
    grammar: Arc<Grammar>,
    sink: W,
}

impl<W: Write + Send + 'static> PriorityQueueFactory<W> {
    /// Factory for `grammar` writing guesses to `sink`.
    #[must_use]
    pub fn new(grammar: Arc<Grammar>, sink: W) -> Self {
        Self { grammar, sink }
    }
}

impl<W: Write + Send + 'static> SourceFactory for PriorityQueueFactory<W> {
    type Source = PriorityQueueSource<W>;

    fn mode(&self) -> SessionMode {
        SessionMode::PriorityQueue
    }

    fn create(self) -> Result<Self::Source> {
        Ok(PriorityQueueSource::new(self.grammar, self.sink))
    }

    fn restore(self, store: &CheckpointStore) -> Result<Self::Source> {
        PriorityQueueSource::restore(self.grammar, self.sink, store)
    }
}
