//! Terminal output: script progress, timelines and audit results.
//!
//! Uses `indicatif` for the progress bar and `console` for colours.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use rescue_workflow::audit::AuditReport;
use rescue_workflow::script::StepOutcome;
use rescue_workflow::state_machine::{Case, EventKind, TimelineEvent};

/// Progress display for a script run.
pub struct ScriptProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    dim: Style,
}

impl ScriptProgress {
    pub fn start(total_steps: usize) -> Self {
        let pb = ProgressBar::new(total_steps as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{bar:30.cyan/blue} {pos}/{len} {msg}")
        {
            pb.set_style(style);
        }

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            dim: Style::new().dim(),
        }
    }

    /// Prints one step result above the bar and advances it.
    pub fn step(&self, outcome: &StepOutcome) {
        let prefix = format!(
            "{:>3} {:<16} {:<14} {:<10}",
            outcome.index + 1,
            outcome.action,
            outcome.alias,
            outcome.actor
        );
        match &outcome.result {
            Ok(success) => {
                let retries = if success.attempts > 1 {
                    format!(" (after {} attempts)", success.attempts)
                } else {
                    String::new()
                };
                self.pb.println(format!(
                    "  {} {prefix} → {} #{}{}",
                    self.green.apply_to("✓"),
                    success.status,
                    success.sequence,
                    self.dim.apply_to(retries)
                ));
            }
            Err(err) => {
                self.pb.println(format!(
                    "  {} {prefix} {}: {err}",
                    self.red.apply_to("✗"),
                    err.kind()
                ));
            }
        }
        self.pb.set_message(outcome.action);
        self.pb.set_position((outcome.index + 1) as u64);
    }

    pub fn finish(&self, failures: usize) {
        self.pb.finish_and_clear();
        if failures == 0 {
            println!("  {} all steps applied", self.green.apply_to("✓"));
        } else {
            println!("  {} {failures} step(s) rejected", self.red.apply_to("✗"));
        }
    }
}

/// Prints a case header followed by its timeline.
pub fn print_timeline(label: &str, case: &Case, timeline: &[TimelineEvent]) {
    let header = Style::new().cyan().bold();
    let dim = Style::new().dim();
    println!();
    let report = case.report();
    println!(
        "{} {} [{}] v{} helpers={:?}",
        header.apply_to(format!("─── {label}")),
        dim.apply_to(case.case_id()),
        case.status(),
        case.version(),
        case.assigned_helpers().iter().map(|h| h.as_str()).collect::<Vec<_>>()
    );
    println!(
        "      {} ({}) at {:.4}, {:.4}{}  {}",
        report.animal_type,
        report.urgency_level,
        report.location.latitude,
        report.location.longitude,
        report
            .location
            .landmark
            .as_deref()
            .map(|l| format!(" near {l}"))
            .unwrap_or_default(),
        dim.apply_to(format!("updated {}", case.updated_at().format("%H:%M:%S%.3f")))
    );
    for event in timeline {
        println!(
            "  {:>3}  {}  {:<16} {:<10} {}",
            event.sequence,
            dim.apply_to(event.timestamp.format("%H:%M:%S%.3f")),
            event.event_type(),
            event.actor_id,
            describe(&event.kind)
        );
    }
}

fn describe(kind: &EventKind) -> String {
    match kind {
        EventKind::Created {
            urgency_level,
            animal_type,
            photo_count,
        } => format!("{animal_type}, urgency {urgency_level}, {photo_count} photo(s)"),
        EventKind::Assigned {
            previous_status,
            helpers,
            ..
        } => format!("from {previous_status}, {} helper(s)", helpers.len()),
        EventKind::StatusUpdated {
            previous_status,
            new_status,
            note,
            photo_urls,
        } => match note {
            Some(note) => format!("\"{note}\" ({} photo(s))", photo_urls.len()),
            None => format!("{previous_status} → {new_status}"),
        },
        EventKind::Transferred { reason, .. } => format!("reason: {reason}"),
        EventKind::Resolved {
            previous_status, ..
        } => format!("from {previous_status}"),
        EventKind::ReporterApproved => String::new(),
        EventKind::ReporterRejected { reason, .. } => format!("reason: {reason}"),
    }
}

/// Prints audit results; returns how many cases had violations.
pub fn print_audit(reports: &[AuditReport]) -> usize {
    let green = Style::new().green().bold();
    let red = Style::new().red().bold();
    let mut dirty = 0;
    for report in reports {
        if report.is_clean() {
            println!("  {} {} [{}]", green.apply_to("✓"), report.case_id, report.status);
        } else {
            dirty += 1;
            println!("  {} {} [{}]", red.apply_to("✗"), report.case_id, report.status);
            for violation in &report.violations {
                println!("      - {violation}");
            }
        }
    }
    println!();
    println!(
        "{}",
        if dirty == 0 {
            green.apply_to(format!("{} case(s) consistent", reports.len()))
        } else {
            red.apply_to(format!("{dirty} of {} case(s) inconsistent", reports.len()))
        }
    );
    dirty
}
