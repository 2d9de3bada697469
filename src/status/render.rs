//! Text rendering for status and help screens.

use std::time::Duration;

use super::ProgressSnapshot;

/// Format a duration as `H:MM:SS`.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Render the status report shown when the operator presses `[ENTER]`.
#[must_use]
#[allow(clippy::cast_precision_loss)] // display-only rate
pub fn status_report(snapshot: &ProgressSnapshot) -> String {
    let counters = &snapshot.counters;
    let secs = snapshot.elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        snapshot.guesses_this_run as f64 / secs
    } else {
        0.0
    };

    let mut lines = vec![
        "Status Report:".to_owned(),
        format!("    Time running:          {}", format_elapsed(snapshot.elapsed)),
        format!("    Guesses generated:     {}", counters.guesses_emitted),
        format!(
            "    Guesses this run:      {} ({rate:.0}/sec)",
            snapshot.guesses_this_run
        ),
        format!("    Candidates processed:  {}", counters.candidates_processed),
        format!(
            "    Probability coverage:  {:.12} ({:.4}%)",
            counters.probability_coverage,
            counters.probability_coverage * 100.0
        ),
    ];
    match &snapshot.last_candidate {
        Some(last) => {
            lines.push(format!("    Current candidate:     {}", last.descriptor));
            lines.push(format!("    Candidate probability: {:e}", last.probability));
        }
        None => lines.push("    Current candidate:     (none yet)".to_owned()),
    }
    lines.push(String::new());
    lines.join("\n")
}

/// Render the explanation of every status field.
#[must_use]
pub fn help_text() -> String {
    [
        "Status Report Help:",
        "    Time running:          wall-clock time since this process started the session",
        "    Guesses generated:     total guesses written downstream, including resumed progress",
        "    Guesses this run:      guesses written by this process, with the average rate",
        "    Candidates processed:  pre-terminal structures popped and expanded so far",
        "    Probability coverage:  summed probability of every guess made; under a",
        "                           normalized grammar this approaches 1.0 as the",
        "                           guess space is exhausted",
        "    Current candidate:     the structure being expanded, with its per-guess probability",
        "",
    ]
    .join("\n")
}

/// Key hints printed after every listener response.
#[must_use]
pub fn key_hints() -> String {
    [
        "Press [ENTER] to display an updated status output",
        "Press 'h' [ENTER] for help on what the status reports mean",
        "Press 'q' [ENTER] to exit",
        "",
    ]
    .join("\n")
}

/// Notice printed once the operator has asked to quit.
#[must_use]
pub fn shutdown_notice() -> String {
    [
        "Exit command received",
        "Will exit after finishing the current candidate",
        "Note: a restarted session begins with the candidate that was",
        "      pending when the exit took effect",
        "",
    ]
    .join("\n")
}
