use crate::types::{CycleEvent, ExitSummary, MatchResult};

/// Emit a cycle event as a single JSON line to stdout.
pub fn report_event(event: &CycleEvent) {
    if let Ok(json) = serde_json::to_string(event) {
        println!("{json}");
    }
}

/// Emit one keyword-match result as a JSON line (probe output).
pub fn report_match(result: &MatchResult) {
    if let Ok(json) = serde_json::to_string(result) {
        println!("{json}");
    }
}

/// Emit the exit summary as pretty-printed JSON to stdout.
pub fn report_exit_summary(summary: &ExitSummary) {
    if let Ok(json) = serde_json::to_string_pretty(summary) {
        println!("{json}");
    }
}
