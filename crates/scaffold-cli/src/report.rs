//! Plain-text rendering of bulk and maintenance results.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use scaffold_core::{repo_display_name, BulkCommand, CommandResult, ProjectType};

use crate::bulk::{BulkReport, ResultSource};
use crate::maintenance::{BatchReport, MaintenanceOp, OutcomeStatus};

/// Lines of captured tool output shown per failure.
pub const DISPLAY_OUTPUT_LINES: usize = 15;

/// Keep the last `max_lines` lines of `text`, noting how many were hidden.
/// Stored records are never truncated; this is for display only.
pub fn truncate_output(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    if lines.len() <= max_lines {
        return lines.join("\n");
    }
    let hidden = lines.len() - max_lines;
    format!(
        "... ({hidden} earlier lines omitted)\n{}",
        lines[hidden..].join("\n")
    )
}

pub fn display_templates() -> String {
    let mut out = String::from("Available project templates:\n");
    for project_type in ProjectType::ALL {
        out.push_str(&format!(
            "  {:<8} - {}\n",
            project_type.as_str(),
            project_type.description()
        ));
    }
    out
}

pub fn display_discovered(root: &Path, repos: &[PathBuf]) -> String {
    let mut out = format!("Found {} project(s) under {}\n", repos.len(), root.display());
    for repo in repos {
        out.push_str(&format!("  {}\n", repo.display()));
    }
    out
}

fn outcome_tag(result: &CommandResult) -> &'static str {
    match result.status_label() {
        "passed" => "PASS",
        "timeout" => "TIME",
        "error" => "ERR ",
        _ => "FAIL",
    }
}

pub fn display_bulk_report(report: &BulkReport) -> String {
    let summary = report.summary();
    let mut out = format!(
        "Ran {} in {} repositories\n\n",
        report.command.label(),
        summary.total
    );

    for entry in &report.entries {
        let result = &entry.result;
        let source = match entry.source {
            ResultSource::Executed => "",
            ResultSource::Cached => " [cached]",
            ResultSource::Synthesized => " [internal]",
        };
        out.push_str(&format!(
            "  {} {:<24} {:>7.2}s{}\n",
            outcome_tag(result),
            result.repo_name,
            result.duration_seconds,
            source
        ));
    }

    out.push_str(&format!(
        "\nTotal: {} | Passed: {} | Failed: {} | Cached: {}\n",
        summary.total, summary.passed, summary.failed, summary.cached
    ));

    let failures: Vec<&CommandResult> = report
        .entries
        .iter()
        .map(|entry| &entry.result)
        .filter(|result| !result.passed())
        .collect();
    if failures.is_empty() {
        return out;
    }

    out.push_str("\nFailures:\n");
    for result in failures {
        out.push_str(&format!(
            "\n-- {} ({}, exit {}) {}\n",
            result.repo_name,
            result.status_label(),
            result.exit_code,
            result.repo_path.display()
        ));
        if result.timed_out() {
            out.push_str(&format!(
                "   timed out after {:.0}s\n",
                result.duration_seconds
            ));
        }
        for (name, stream) in [("stdout", &result.stdout), ("stderr", &result.stderr)] {
            if stream.trim().is_empty() {
                continue;
            }
            out.push_str(&format!("   {name}:\n"));
            for line in truncate_output(stream, DISPLAY_OUTPUT_LINES).lines() {
                out.push_str(&format!("     {line}\n"));
            }
        }
    }
    out
}

/// Latest result per repository, grouped by repository.
pub fn display_status(latest: &BTreeMap<BulkCommand, BTreeMap<PathBuf, CommandResult>>) -> String {
    let repos: BTreeSet<&PathBuf> = latest.values().flat_map(|by_repo| by_repo.keys()).collect();
    if repos.is_empty() {
        return "No results recorded yet.\n".to_string();
    }

    let mut out = String::new();
    for repo in repos {
        out.push_str(&format!("{} ({})\n", repo_display_name(repo), repo.display()));
        for (command, by_repo) in latest {
            match by_repo.get(repo) {
                Some(result) => {
                    let commit = result
                        .git_commit
                        .as_deref()
                        .map(|sha| format!(" @ {}", sha.chars().take(8).collect::<String>()))
                        .unwrap_or_default();
                    out.push_str(&format!(
                        "  {:<6} {:<7} exit {:<3} {}{}\n",
                        command.label(),
                        result.status_label(),
                        result.exit_code,
                        result.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                        commit
                    ));
                }
                None => out.push_str(&format!("  {:<6} never run\n", command.label())),
            }
        }
    }
    out
}

pub fn display_history(records: &[CommandResult]) -> String {
    if records.is_empty() {
        return "No matching records.\n".to_string();
    }
    let mut out = String::new();
    for record in records {
        out.push_str(&format!(
            "{}  {:<6} {:<20} {:<7} exit {:<3} {:.2}s\n",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.command.as_str(),
            record.repo_name,
            record.status_label(),
            record.exit_code,
            record.duration_seconds
        ));
    }
    out
}

pub fn display_batch_report(report: &BatchReport) -> String {
    let mut out = String::new();
    if report.dry_run {
        out.push_str("Dry run: no files were modified.\n");
    }

    for outcome in &report.outcomes {
        let name = repo_display_name(&outcome.repository);
        match outcome.status {
            OutcomeStatus::Success if outcome.details.is_empty() => {
                let note = match report.operation {
                    MaintenanceOp::Check => "no issues",
                    MaintenanceOp::Upgrade => "up to date",
                };
                out.push_str(&format!("  OK   {name}: {note}\n"));
            }
            OutcomeStatus::Success => {
                out.push_str(&format!("  OK   {name}:\n"));
                for detail in &outcome.details {
                    out.push_str(&format!("         - {detail}\n"));
                }
            }
            OutcomeStatus::Error => {
                out.push_str(&format!(
                    "  ERR  {name}: {}\n",
                    outcome.error.as_deref().unwrap_or("unknown error")
                ));
            }
        }
    }

    let detail_label = match report.operation {
        MaintenanceOp::Check => "Issues",
        MaintenanceOp::Upgrade => "Updated files",
    };
    out.push_str(&format!(
        "\nTotal: {} | Success: {} | Errors: {} | {}: {}\n",
        report.outcomes.len(),
        report.successes(),
        report.errors(),
        detail_label,
        report.detail_count()
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::BulkEntry;
    use crate::maintenance::MaintenanceOutcome;
    use chrono::{TimeZone, Utc};

    fn result(name: &str, exit_code: i32) -> CommandResult {
        CommandResult {
            repo_path: PathBuf::from(format!("/work/{name}")),
            repo_name: name.to_string(),
            command: BulkCommand::Test,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("ts"),
            exit_code,
            duration_seconds: 1.5,
            stdout: String::new(),
            stderr: String::new(),
            git_commit: Some("0123456789abcdef".to_string()),
        }
    }

    #[test]
    fn truncation_keeps_tail() {
        let text = (1..=30).map(|n| n.to_string()).collect::<Vec<_>>().join("\n");
        let shown = truncate_output(&text, 5);
        assert!(shown.starts_with("... (25 earlier lines omitted)"));
        assert!(shown.ends_with("26\n27\n28\n29\n30"));
        assert_eq!(truncate_output("a\nb\n", 5), "a\nb");
    }

    #[test]
    fn bulk_report_lists_summary_and_failures() {
        let mut failing = result("b", 1);
        failing.stderr = "AssertionError: boom\n".to_string();
        let report = BulkReport {
            command: BulkCommand::Test,
            entries: vec![
                BulkEntry {
                    source: ResultSource::Executed,
                    result: result("a", 0),
                },
                BulkEntry {
                    source: ResultSource::Cached,
                    result: failing,
                },
            ],
        };

        let text = display_bulk_report(&report);
        assert!(text.contains("Ran tests in 2 repositories"));
        assert!(text.contains("Total: 2 | Passed: 1 | Failed: 1 | Cached: 1"));
        assert!(text.contains("-- b (failed, exit 1)"));
        assert!(text.contains("AssertionError: boom"));
        assert!(text.contains("[cached]"));
    }

    #[test]
    fn status_groups_by_repository() {
        let mut latest = BTreeMap::new();
        latest.insert(
            BulkCommand::Test,
            BTreeMap::from([(PathBuf::from("/work/a"), result("a", 0))]),
        );
        latest.insert(BulkCommand::Lint, BTreeMap::new());

        let text = display_status(&latest);
        assert!(text.starts_with("a (/work/a)\n"));
        assert!(text.contains("tests  passed"));
        assert!(text.contains("@ 01234567"));
        assert!(text.contains("lint   never run"));
        assert_eq!(display_status(&BTreeMap::new()), "No results recorded yet.\n");
    }

    #[test]
    fn batch_report_counts_outcomes() {
        let report = BatchReport {
            operation: MaintenanceOp::Check,
            dry_run: false,
            outcomes: vec![
                MaintenanceOutcome {
                    repository: PathBuf::from("/work/a"),
                    status: OutcomeStatus::Success,
                    details: vec!["Missing tests/ directory".to_string()],
                    error: None,
                },
                MaintenanceOutcome {
                    repository: PathBuf::from("/work/b"),
                    status: OutcomeStatus::Error,
                    details: Vec::new(),
                    error: Some("invalid TOML".to_string()),
                },
            ],
        };

        let text = display_batch_report(&report);
        assert!(text.contains("- Missing tests/ directory"));
        assert!(text.contains("ERR  b: invalid TOML"));
        assert!(text.contains("Total: 2 | Success: 1 | Errors: 1 | Issues: 1"));
    }

    #[test]
    fn discovered_and_templates_listings() {
        let text = display_discovered(Path::new("/work"), &[PathBuf::from("/work/a")]);
        assert!(text.starts_with("Found 1 project(s) under /work"));
        assert!(display_templates().contains("webapp"));
        assert!(display_history(&[]).contains("No matching records"));
    }
}
