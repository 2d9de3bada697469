//! Shared fixtures for session integration tests.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pcfg_session::mode::SessionMode;
use pcfg_session::models::Candidate;
use pcfg_session::orchestrator::ShutdownSignal;
use pcfg_session::persistence::CheckpointStore;
use pcfg_session::source::{CandidateSource, ConsumerGone, SourceFactory};
use serde::{Deserialize, Serialize};

/// Grammar whose six pre-terminals all have distinct probabilities and whose
/// guesses sum to a coverage of exactly 1.0.
pub const DEMO_GRAMMAR: &str = r#"
name = "demo"

[[structures]]
probability = 0.6
slots = ["word", "digits"]

[[structures]]
probability = 0.4
slots = ["word"]

[[slots.word]]
probability = 0.3
values = ["password", "monkey"]

[[slots.word]]
probability = 0.1
values = ["dragon", "letmein", "shadow", "qwerty"]

[[slots.digits]]
probability = 0.5
values = ["1"]

[[slots.digits]]
probability = 0.25
values = ["12", "123"]
"#;

/// Normalized single-slot grammar whose pre-terminals all share one
/// probability.
pub const TIED_GRAMMAR: &str = r#"
name = "tied"

[[structures]]
probability = 1.0
slots = ["key"]

[[slots.key]]
probability = 0.25
values = ["x"]

[[slots.key]]
probability = 0.25
values = ["y"]

[[slots.key]]
probability = 0.25
values = ["z"]

[[slots.key]]
probability = 0.25
values = ["w"]
"#;

/// One observed call into a [`ScriptedSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Next(Option<usize>),
    Expand(usize),
}

/// Everything a test wants to know about how the driver used its source.
#[derive(Debug, Default)]
pub struct CallLog {
    pub creates: AtomicUsize,
    pub restores: AtomicUsize,
    pub calls: Mutex<Vec<Call>>,
}

impl CallLog {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn expanded(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Expand(index) => Some(index),
                Call::Next(_) => None,
            })
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ScriptState {
    resume_at: usize,
}

/// Source that replays a fixed list of `(probability, guess_count)` pairs.
pub struct ScriptedSource {
    script: Vec<(f64, u64)>,
    position: usize,
    last_popped: Option<usize>,
    log: Arc<CallLog>,
    consumer_gone_at: Option<usize>,
    raise_after: Option<(usize, ShutdownSignal)>,
    expand_delay: Option<Duration>,
}

impl CandidateSource for ScriptedSource {
    type Descriptor = usize;

    fn next_candidate(&mut self) -> Option<Candidate<usize>> {
        let popped = self.script.get(self.position).map(|&(probability, _)| {
            let candidate = Candidate::new(self.position, probability);
            self.last_popped = Some(self.position);
            self.position += 1;
            candidate
        });
        self.log
            .calls
            .lock()
            .unwrap()
            .push(Call::Next(popped.as_ref().map(|c| c.descriptor)));
        popped
    }

    fn expand(&mut self, candidate: &Candidate<usize>) -> Result<u64, ConsumerGone> {
        let index = candidate.descriptor;
        self.log.calls.lock().unwrap().push(Call::Expand(index));
        if let Some(delay) = self.expand_delay {
            std::thread::sleep(delay);
        }
        if self.consumer_gone_at == Some(index) {
            return Err(ConsumerGone {
                reason: "broken pipe".into(),
            });
        }
        if let Some((at, signal)) = &self.raise_after {
            if *at == index {
                signal.raise();
            }
        }
        Ok(self.script[index].1)
    }

    fn save_state(&self, store: &mut CheckpointStore) -> pcfg_session::Result<()> {
        store.set_section(
            SessionMode::PriorityQueue.section_name(),
            &ScriptState {
                resume_at: self.last_popped.unwrap_or(0),
            },
        )
    }
}

/// Factory producing [`ScriptedSource`]s and recording how it was used.
pub struct ScriptedFactory {
    pub script: Vec<(f64, u64)>,
    pub log: Arc<CallLog>,
    pub consumer_gone_at: Option<usize>,
    pub raise_after: Option<(usize, ShutdownSignal)>,
    pub expand_delay: Option<Duration>,
}

impl ScriptedFactory {
    pub fn new(script: Vec<(f64, u64)>) -> Self {
        Self {
            script,
            log: Arc::default(),
            consumer_gone_at: None,
            raise_after: None,
            expand_delay: None,
        }
    }

    /// Candidates `[0.5, 0.3, 0.2]` expanding to `[10, 5, 1]` guesses.
    pub fn three_candidates() -> Self {
        Self::new(vec![(0.5, 10), (0.3, 5), (0.2, 1)])
    }

    fn build(self, position: usize) -> ScriptedSource {
        ScriptedSource {
            script: self.script,
            position,
            last_popped: None,
            log: self.log,
            consumer_gone_at: self.consumer_gone_at,
            raise_after: self.raise_after,
            expand_delay: self.expand_delay,
        }
    }
}

impl SourceFactory for ScriptedFactory {
    type Source = ScriptedSource;

    fn mode(&self) -> SessionMode {
        SessionMode::PriorityQueue
    }

    fn create(self) -> pcfg_session::Result<ScriptedSource> {
        self.log.creates.fetch_add(1, Ordering::SeqCst);
        Ok(self.build(0))
    }

    fn restore(self, store: &CheckpointStore) -> pcfg_session::Result<ScriptedSource> {
        self.log.restores.fetch_add(1, Ordering::SeqCst);
        let state: ScriptState = store.section(SessionMode::PriorityQueue.section_name())?;
        Ok(self.build(state.resume_at))
    }
}

/// Guess sink shared between the test and a source running on another
/// thread; optionally raises shutdown once enough lines were written.
#[derive(Clone, Default)]
pub struct SharedSink {
    buffer: Arc<Mutex<Vec<u8>>>,
    raise_after_lines: Option<(usize, ShutdownSignal)>,
}

impl SharedSink {
    pub fn raising_after(lines: usize, signal: ShutdownSignal) -> Self {
        Self {
            buffer: Arc::default(),
            raise_after_lines: Some((lines, signal)),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8(self.buffer.lock().unwrap().clone())
            .unwrap()
            .lines()
            .map(ToOwned::to_owned)
            .collect()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.extend_from_slice(buf);
        if let Some((lines, signal)) = &self.raise_after_lines {
            if buffer.iter().filter(|b| **b == b'\n').count() >= *lines {
                signal.raise();
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
