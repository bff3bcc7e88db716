//! Read-only consistency checks over stored cases and their timelines.
//!
//! Detects the corruptions the workflow engine is built to rule out: a case
//! whose helper set disagrees with its status, timelines with gaps or a missing
//! `Created` event, and a case whose status has drifted from its own history.
//! Nothing here repairs data.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::state_machine::{
    ActorId, Case, CaseId, CaseStatus, EventType, ReporterApproval, TimelineEvent,
};
use crate::store::StoreSnapshot;

/// One inconsistency found in a stored case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum Violation {
    HelpersOnInactiveCase { status: CaseStatus, helpers: usize },
    NoHelpersOnActiveCase { status: CaseStatus },
    DuplicateHelper { helper: ActorId },
    MissingCreatedEvent,
    ExtraCreatedEvent { sequence: u64 },
    SequenceGap { expected: u64, found: u64 },
    ForeignEvent { sequence: u64, case_id: CaseId },
    StatusMismatch { case_status: CaseStatus, replayed: CaseStatus },
    VersionMismatch { version: u64, events: usize },
    ApprovalMismatch { status: CaseStatus, approval: Option<ReporterApproval> },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::HelpersOnInactiveCase { status, helpers } => {
                write!(f, "{status} case still lists {helpers} helper(s)")
            }
            Violation::NoHelpersOnActiveCase { status } => {
                write!(f, "{status} case has no helpers")
            }
            Violation::DuplicateHelper { helper } => write!(f, "helper {helper} listed twice"),
            Violation::MissingCreatedEvent => write!(f, "timeline does not start with Created"),
            Violation::ExtraCreatedEvent { sequence } => {
                write!(f, "second Created event at sequence {sequence}")
            }
            Violation::SequenceGap { expected, found } => {
                write!(f, "expected sequence {expected}, found {found}")
            }
            Violation::ForeignEvent { sequence, case_id } => {
                write!(f, "event {sequence} belongs to case {case_id}")
            }
            Violation::StatusMismatch {
                case_status,
                replayed,
            } => write!(f, "case is {case_status} but its timeline ends in {replayed}"),
            Violation::VersionMismatch { version, events } => {
                write!(f, "version {version} does not match {events} timeline event(s)")
            }
            Violation::ApprovalMismatch { status, approval } => {
                write!(f, "{status} case has reporter approval {approval:?}")
            }
        }
    }
}

/// Audit outcome for a single case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub case_id: CaseId,
    pub status: CaseStatus,
    pub violations: Vec<Violation>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Checks a case against its own invariants and its timeline.
pub fn audit_case(case: &Case, timeline: &[TimelineEvent]) -> AuditReport {
    let mut violations = Vec::new();
    let status = case.status();
    let helpers = case.assigned_helpers();

    if status.requires_helpers() && helpers.is_empty() {
        violations.push(Violation::NoHelpersOnActiveCase { status });
    }
    if !status.requires_helpers() && !helpers.is_empty() {
        violations.push(Violation::HelpersOnInactiveCase {
            status,
            helpers: helpers.len(),
        });
    }
    let mut seen = BTreeSet::new();
    for helper in helpers {
        if !seen.insert(helper) {
            violations.push(Violation::DuplicateHelper {
                helper: helper.clone(),
            });
        }
    }

    let expected_approval = match status {
        CaseStatus::Open | CaseStatus::Assigned | CaseStatus::InProgress => None,
        CaseStatus::Resolved => Some(ReporterApproval::Pending),
        CaseStatus::Closed => Some(ReporterApproval::Approved),
    };
    if case.reporter_approval() != expected_approval {
        violations.push(Violation::ApprovalMismatch {
            status,
            approval: case.reporter_approval(),
        });
    }

    match timeline.first() {
        Some(first) if first.event_type() == EventType::Created => {}
        _ => violations.push(Violation::MissingCreatedEvent),
    }
    for (index, event) in timeline.iter().enumerate() {
        let expected = index as u64;
        if event.sequence != expected {
            violations.push(Violation::SequenceGap {
                expected,
                found: event.sequence,
            });
        }
        if &event.case_id != case.case_id() {
            violations.push(Violation::ForeignEvent {
                sequence: event.sequence,
                case_id: event.case_id.clone(),
            });
        }
        if index > 0 && event.event_type() == EventType::Created {
            violations.push(Violation::ExtraCreatedEvent {
                sequence: event.sequence,
            });
        }
    }

    if let Some(last) = timeline.last() {
        let replayed = last.kind.resulting_status();
        if replayed != status {
            violations.push(Violation::StatusMismatch {
                case_status: status,
                replayed,
            });
        }
        // Non-empty here: one Created event plus one event per version.
        if case.version() != timeline.len() as u64 - 1 {
            violations.push(Violation::VersionMismatch {
                version: case.version(),
                events: timeline.len(),
            });
        }
    }

    AuditReport {
        case_id: case.case_id().clone(),
        status,
        violations,
    }
}

/// Audits every case of a snapshot, in snapshot order.
pub fn audit_snapshot(snapshot: &StoreSnapshot) -> Vec<AuditReport> {
    snapshot
        .cases
        .iter()
        .map(|record| audit_case(&record.case, &record.timeline))
        .collect()
}
