//! Formatting and reporting for health check results

use colored::Colorize;
use tabled::{
    builder::Builder,
    settings::{Alignment, Modify, Style, object::Rows},
};

use super::remediation::RemediationOutcome;
use super::runner::HealthCheckReport;
use super::triage::TriageOutcome;
use super::verdict::{TestOutcome, Verdict};
use super::PipelineEvent;

/// Formats the one-line status of a worker
pub fn status_line(worker: &str, verdict: Verdict) -> String {
    format!("Worker {} {}.", worker, verdict.as_colored_str())
}

/// Formats per-worker status lines followed by a table of individual tests
pub fn format_report(report: &HealthCheckReport) -> String {
    let mut output = String::new();

    for (worker, verdict) in report.verdicts.iter() {
        output.push_str(&status_line(worker, verdict));
        output.push('\n');
    }

    for (worker, error) in report.errors() {
        output.push_str(&format!(
            "Worker {} {} ({} error: {}).\n",
            worker,
            "could not be checked".bright_magenta(),
            error.kind(),
            error
        ));
    }

    if !report.outcomes.is_empty() {
        output.push('\n');
        output.push_str(&format_tests(&report.outcomes));
        output.push('\n');
    }

    output
}

/// Formats individual test outcomes as a table
fn format_tests(outcomes: &[TestOutcome]) -> String {
    let mut builder = Builder::default();

    builder.push_record(["Worker", "Endpoint", "Result", "Duration"]);

    for outcome in outcomes {
        let result = match &outcome.result {
            Ok(verdict) => verdict.as_colored_str(),
            Err(e) => format!("{} error", e.kind()).bright_magenta().to_string(),
        };
        builder.push_record([
            outcome.worker.as_str(),
            outcome.endpoint.as_str(),
            &result,
            &format!("{:.2?}", outcome.duration),
        ]);
    }

    let mut table = builder.build();
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    table.to_string()
}

/// Formats the result of queue triage
pub fn format_triage(outcome: &TriageOutcome) -> Option<String> {
    match outcome {
        TriageOutcome::NotNeeded | TriageOutcome::QueueNotFound => None,
        TriageOutcome::Declined { .. } => Some("Queue left untouched.".to_string()),
        TriageOutcome::Purged { pending } => Some(format!(
            "Cleared {} queued tasks; worker will be restarted.",
            pending
        )),
        TriageOutcome::PurgeFailed { error, .. } => Some(format!(
            "{} ({})",
            "Unable to clear queue. Not restarting worker.".bright_red(),
            error
        )),
        TriageOutcome::Skipped(error) => Some(format!(
            "{} ({})",
            "Unable to inspect queue.".bright_yellow(),
            error
        )),
    }
}

/// Formats the result of the restart stage
pub fn format_remediation(outcome: &RemediationOutcome) -> Option<String> {
    match outcome {
        RemediationOutcome::Disabled | RemediationOutcome::NothingToRestart => None,
        RemediationOutcome::Restarted(plan) => Some(format!(
            "\nRestarting workers...\nRestarted {}.\n{}",
            plan.targets.join(", "),
            "Done.".bright_green()
        )),
        RemediationOutcome::Failed { error, .. } => Some(format!(
            "\nRestarting workers...\n{} ({})",
            "Unable to restart workers.".bright_red(),
            error
        )),
    }
}

/// Prints progress for a pipeline stage to stdout
pub fn print_event(event: PipelineEvent<'_>) {
    match event {
        PipelineEvent::Probed(report) => print!("{}", format_report(report)),
        PipelineEvent::TriageStarting(worker) => {
            println!("\n{} timed out. Checking queue...", worker.bold());
        }
        PipelineEvent::Triaged(outcome) => {
            if let Some(text) = format_triage(outcome) {
                println!("{}", text);
            }
        }
        PipelineEvent::Remediated(outcome) => {
            if let Some(text) = format_remediation(outcome) {
                println!("{}", text);
            }
        }
    }
}
