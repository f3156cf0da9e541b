// ABOUTME: Human-readable terminal rendering of execution and scoring results
// ABOUTME: Colored status lines for single runs and a comfy-table summary for scored submissions

use colored::*;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use timebox_sandbox::{CapturedOutput, ExecutionResult, ExecutionStatus, ScoringResult, ScoringStatus};

/// Longest stdout/stderr excerpt shown in the score table
const EXCERPT_CHARS: usize = 40;

pub fn status_label(status: ExecutionStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        ExecutionStatus::Completed => text.green().bold(),
        ExecutionStatus::TimedOut | ExecutionStatus::Killed => text.yellow().bold(),
        ExecutionStatus::Crashed => text.red().bold(),
        ExecutionStatus::InfrastructureFailure => text.magenta().bold(),
    }
}

pub fn verdict_label(status: ScoringStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        ScoringStatus::Accepted => text.green().bold(),
        ScoringStatus::WrongAnswer => text.red().bold(),
        ScoringStatus::Timeout | ScoringStatus::MemoryLimitExceeded => text.yellow().bold(),
        ScoringStatus::CompilationError | ScoringStatus::RuntimeError => text.red(),
    }
}

fn stream_section(name: &str, output: &CapturedOutput) -> String {
    let mut section = format!("{}\n", format!("--- {} ---", name).dimmed());
    section.push_str(&output.text);
    if !output.text.is_empty() && !output.text.ends_with('\n') {
        section.push('\n');
    }
    if output.truncated {
        section.push_str(&format!("{}\n", "[output truncated]".yellow()));
    }
    section
}

/// Full report for a single run: status line, streams, then failure details.
pub fn execution_report(result: &ExecutionResult) -> String {
    let mut report = format!(
        "{} {} in {}ms",
        "Status:".bold(),
        status_label(result.status),
        result.duration_ms
    );
    if let Some(code) = result.exit_code {
        report.push_str(&format!(" (exit code {})", code));
    }
    if let Some(kb) = result.max_memory_kb {
        report.push_str(&format!(", peak memory {} KB", kb));
    }
    report.push('\n');

    if !result.stdout.text.is_empty() || result.stdout.truncated {
        report.push_str(&stream_section("stdout", &result.stdout));
    }
    if !result.stderr.text.is_empty() || result.stderr.truncated {
        report.push_str(&stream_section("stderr", &result.stderr));
    }
    if let Some(failure) = result.failure {
        report.push_str(&format!("{} {:?}\n", "Failure:".bold(), failure));
    }
    if let Some(message) = &result.message {
        report.push_str(&format!("{} {}\n", "Message:".bold(), message));
    }
    report
}

/// First line of `text`, cut to the excerpt width.
pub fn excerpt(text: &str) -> String {
    let line = text.trim().lines().next().unwrap_or("");
    let mut cut: String = line.chars().take(EXCERPT_CHARS).collect();
    if line.chars().count() > EXCERPT_CHARS || text.trim().lines().nth(1).is_some() {
        cut.push('…');
    }
    cut
}

pub fn score_table(results: &[ScoringResult]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec!["Case", "Verdict", "Time (ms)", "Memory (KB)", "Output"]);

    for result in results {
        let memory = result
            .max_memory_kb
            .map(|kb| kb.to_string())
            .unwrap_or_else(|| "-".to_string());
        let shown = if result.status == ScoringStatus::Accepted || result.stderr.is_empty() {
            &result.stdout
        } else {
            &result.stderr
        };

        table.add_row(vec![
            result.case_id.to_string(),
            result.status.to_string(),
            result.elapsed_ms.to_string(),
            memory,
            excerpt(shown),
        ]);
    }

    table
}

pub fn score_summary(results: &[ScoringResult]) -> String {
    let passed = results
        .iter()
        .filter(|r| r.status == ScoringStatus::Accepted)
        .count();
    let line = format!("{}/{} test cases passed", passed, results.len());
    if passed == results.len() && !results.is_empty() {
        line.green().bold().to_string()
    } else {
        line.red().bold().to_string()
    }
}
