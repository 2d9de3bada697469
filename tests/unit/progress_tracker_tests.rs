//! Unit tests for progress accounting, persistence, and status rendering.

use std::time::Duration;

use pcfg_session::models::Candidate;
use pcfg_session::persistence::CheckpointStore;
use pcfg_session::status::render::{format_elapsed, help_text, key_hints, shutdown_notice};
use pcfg_session::status::{ProgressCounters, ProgressTracker};
use pcfg_session::AppError;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-12
}

#[test]
fn new_tracker_starts_at_zero() {
    let tracker = ProgressTracker::new();
    assert_eq!(tracker.counters(), ProgressCounters::default());
    assert!(tracker.snapshot().last_candidate.is_none());
}

#[test]
fn records_candidates_and_expansions() {
    let tracker = ProgressTracker::new();
    tracker.record_candidate(&Candidate::new("word digits", 0.25));
    tracker.record_expansion(4, 0.25);
    tracker.record_candidate(&Candidate::new("word", 0.125));
    tracker.record_expansion(2, 0.125);

    let counters = tracker.counters();
    assert_eq!(counters.candidates_processed, 2);
    assert_eq!(counters.guesses_emitted, 6);
    assert!(close(counters.probability_coverage, 1.25));

    let last = tracker.snapshot().last_candidate.expect("last candidate");
    assert_eq!(last.descriptor, "word");
}

#[test]
fn candidate_without_expansion_adds_no_guesses() {
    let tracker = ProgressTracker::new();
    tracker.record_candidate(&Candidate::new("word", 0.5));
    let counters = tracker.counters();
    assert_eq!(counters.candidates_processed, 1);
    assert_eq!(counters.guesses_emitted, 0);
}

#[test]
fn guesses_this_run_exclude_restored_progress() {
    let tracker = ProgressTracker::from_counters(ProgressCounters {
        candidates_processed: 10,
        guesses_emitted: 100,
        probability_coverage: 0.5,
    });
    tracker.record_expansion(7, 0.01);

    let snapshot = tracker.snapshot();
    assert_eq!(snapshot.counters.guesses_emitted, 107);
    assert_eq!(snapshot.guesses_this_run, 7);
}

#[test]
fn save_and_restore_round_trip() {
    let tracker = ProgressTracker::new();
    tracker.record_candidate(&Candidate::new("word", 0.3));
    tracker.record_expansion(2, 0.3);

    let mut store = CheckpointStore::new();
    tracker.save_state(&mut store).expect("save");
    assert!(store.has_section(ProgressTracker::SECTION));

    let text = store.to_toml_string().expect("render");
    let restored = ProgressTracker::restore(&CheckpointStore::from_toml_str(&text).expect("parse"))
        .expect("restore");
    assert_eq!(restored.counters(), tracker.counters());
    assert_eq!(restored.snapshot().guesses_this_run, 0);
}

#[test]
fn restore_rejects_negative_coverage() {
    let store = CheckpointStore::from_toml_str(
        "version = 1\n[progress]\ncandidates_processed = 1\nguesses_emitted = 1\nprobability_coverage = -1.0\n",
    )
    .expect("parse");
    let result = ProgressTracker::restore(&store);
    assert!(matches!(result, Err(AppError::CheckpointCorrupt(_))));
}

#[test]
fn restore_rejects_missing_section() {
    let result = ProgressTracker::restore(&CheckpointStore::new());
    assert!(matches!(result, Err(AppError::CheckpointCorrupt(msg)) if msg.contains("progress")));
}

#[test]
fn status_report_lists_counters_and_current_candidate() {
    let tracker = ProgressTracker::new();
    assert!(tracker.render().contains("(none yet)"));

    tracker.record_candidate(&Candidate::new("word digits [0, 1]", 0.045));
    tracker.record_expansion(4, 0.045);
    let report = tracker.render();
    assert!(report.starts_with("Status Report:"));
    assert!(report.contains("Guesses generated:     4"));
    assert!(report.contains("Candidates processed:  1"));
    assert!(report.contains("Current candidate:     word digits [0, 1]"));
    assert!(report.contains("4.5e-2"));
}

#[test]
fn help_and_hints_describe_every_key() {
    let tracker = ProgressTracker::new();
    assert_eq!(tracker.render_help(), help_text());
    assert!(help_text().contains("Probability coverage"));

    let hints = key_hints();
    assert!(hints.contains("[ENTER]"));
    assert!(hints.contains("'h'"));
    assert!(hints.contains("'q'"));
    assert!(shutdown_notice().contains("Exit command received"));
}

#[test]
fn elapsed_is_formatted_as_hours_minutes_seconds() {
    assert_eq!(format_elapsed(Duration::from_secs(0)), "0:00:00");
    assert_eq!(format_elapsed(Duration::from_secs(61)), "0:01:01");
    assert_eq!(format_elapsed(Duration::from_secs(3 * 3600 + 25 * 60 + 9)), "3:25:09");
}

#[test]
fn status_report_has_one_line_per_field() {
    let tracker = ProgressTracker::new();
    let empty = tracker.render();
    assert_eq!(empty.lines().count(), 7);
    assert!(empty.ends_with("(none yet)\n"));

    tracker.record_candidate(&Candidate::new("word", 0.5));
    let report = tracker.render();
    assert_eq!(report.lines().count(), 8);
    assert!(report.ends_with("Candidate probability: 5e-1\n"));
    assert!(report.lines().skip(1).all(|line| line.starts_with("    ")));
}
