// src/cli/progress.rs — Terminal progress renderer for real-time run feedback

use crate::core::types::ProgressEvent;

/// Longest error headline shown for a repair attempt.
const ERROR_HEADLINE_CHARS: usize = 120;

/// One line of progress text for an event.
pub fn format_event(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::SubtasksReady { subtasks } => {
            format!("[plan] {} subtask(s)", subtasks.len())
        }
        ProgressEvent::SubtaskStart {
            index,
            total,
            subtask,
        } => format!("[{}/{}] {}", index + 1, total, subtask),
        ProgressEvent::SubtaskRepair {
            index,
            attempt,
            error,
        } => format!(
            "[{}]   repair #{}: {}",
            index + 1,
            attempt,
            error_headline(error)
        ),
        ProgressEvent::SubtaskComplete {
            index,
            success,
            retries,
        } => format!(
            "[{}] {} (retries={})",
            index + 1,
            if *success { "ok" } else { "failed" },
            retries
        ),
        ProgressEvent::Aggregating { results } => {
            format!("[summary] combining {} result(s)", results)
        }
        ProgressEvent::Complete { run_id } => format!("[done] run {}", run_id),
    }
}

/// First line of an error, clipped with an ellipsis.
fn error_headline(error: &str) -> String {
    let line = error.lines().next().unwrap_or("");
    if line.chars().count() <= ERROR_HEADLINE_CHARS {
        return line.to_string();
    }
    let clipped: String = line.chars().take(ERROR_HEADLINE_CHARS).collect();
    format!("{clipped}...")
}

/// Build a progress callback that writes formatted output to stderr.
///
/// All progress output goes to stderr so stdout remains clean for results.
/// Returns a closure suitable for `Orchestrator::with_progress()`.
pub fn terminal_progress() -> impl Fn(ProgressEvent) + Send + Sync + 'static {
    move |event| eprintln!("{}", format_event(&event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_start_and_complete() {
        let start = ProgressEvent::SubtaskStart {
            index: 0,
            total: 3,
            subtask: "Sum riders".into(),
        };
        assert_eq!(format_event(&start), "[1/3] Sum riders");

        let done = ProgressEvent::SubtaskComplete {
            index: 2,
            success: false,
            retries: 5,
        };
        assert_eq!(format_event(&done), "[3] failed (retries=5)");
    }

    #[test]
    fn test_repair_shows_first_error_line() {
        let event = ProgressEvent::SubtaskRepair {
            index: 1,
            attempt: 2,
            error: "column 'x' not found\nat line 3".into(),
        };
        assert_eq!(format_event(&event), "[2]   repair #2: column 'x' not found");
    }

    #[test]
    fn test_long_repair_error_is_clipped() {
        let event = ProgressEvent::SubtaskRepair {
            index: 0,
            attempt: 1,
            error: format!("Function not found: {}\nat line 1", "ü".repeat(200)),
        };
        let line = format_event(&event);
        let headline = line.trim_start_matches("[1]   repair #1: ");
        assert!(headline.ends_with("..."));
        assert_eq!(headline.chars().count(), ERROR_HEADLINE_CHARS + 3);
        assert!(!line.contains("at line 1"));
    }

    #[test]
    fn test_plan_and_summary() {
        let plan = ProgressEvent::SubtasksReady {
            subtasks: vec!["a".into(), "b".into()],
        };
        assert_eq!(format_event(&plan), "[plan] 2 subtask(s)");
        assert_eq!(
            format_event(&ProgressEvent::Aggregating { results: 2 }),
            "[summary] combining 2 result(s)"
        );
    }
}
