use chrono::{DateTime, Utc};

use super::case::{ActorId, Case, CaseStatus, ReporterApproval};
use super::command::Command;
use super::timeline::{EventKind, PendingEvent};
use crate::error::WorkflowError;

/// Tunable guards of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRules {
    /// Minimum trimmed length, in characters, of a status-update note.
    pub min_note_length: usize,
    /// Minimum number of photos attached to a status update.
    pub min_photos: usize,
}

impl Default for TransitionRules {
    fn default() -> Self {
        Self {
            min_note_length: 10,
            min_photos: 2,
        }
    }
}

/// The outcome of a legal command: the replacement case and its timeline entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: Case,
    pub event: PendingEvent,
}

/// Evaluates commands against the case transition table.
pub struct StateMachine;

impl StateMachine {
    /// Compute the transition `command` produces on `case`.
    ///
    /// The input case is never mutated. On success the returned case carries
    /// `version + 1`; on failure nothing changes and the error says why:
    ///
    /// - `Claim` on a Resolved or Closed case is `CaseNotClaimable`.
    /// - A malformed payload (blank actor, short note, too few photos,
    ///   blank reason) is `ValidationFailed`.
    /// - Any other state/guard pair outside the table is `IllegalTransition`.
    pub fn apply(
        case: &Case,
        command: &Command,
        rules: &TransitionRules,
        now: DateTime<Utc>,
    ) -> Result<Transition, WorkflowError> {
        let actor = command.actor();
        if actor.is_blank() {
            return Err(WorkflowError::ValidationFailed(
                "actor id must not be empty".into(),
            ));
        }
        let Some(version) = case.version.checked_add(1) else {
            return Err(Self::illegal(case, command, "version counter exhausted"));
        };

        let mut next = case.clone();
        let kind = match command {
            Command::Claim { responder } => Self::claim(case, &mut next, command, responder)?,
            Command::BeginWork { responder } => {
                Self::require_status(case, command, &[CaseStatus::Assigned])?;
                Self::require_helper(case, command, responder)?;
                next.status = CaseStatus::InProgress;
                EventKind::StatusUpdated {
                    previous_status: case.status,
                    new_status: CaseStatus::InProgress,
                    note: None,
                    photo_urls: Vec::new(),
                }
            }
            Command::StatusUpdate {
                responder,
                note,
                photo_urls,
            } => {
                Self::require_status(case, command, &[CaseStatus::InProgress])?;
                Self::require_helper(case, command, responder)?;
                let note = note.trim();
                if note.chars().count() < rules.min_note_length {
                    return Err(WorkflowError::ValidationFailed(format!(
                        "status note must be at least {} characters",
                        rules.min_note_length
                    )));
                }
                if photo_urls.len() < rules.min_photos {
                    return Err(WorkflowError::ValidationFailed(format!(
                        "status update needs at least {} photos, got {}",
                        rules.min_photos,
                        photo_urls.len()
                    )));
                }
                EventKind::StatusUpdated {
                    previous_status: case.status,
                    new_status: case.status,
                    note: Some(note.to_string()),
                    photo_urls: photo_urls.clone(),
                }
            }
            Command::Transfer { responder, reason } => {
                Self::require_status(case, command, &[CaseStatus::InProgress])?;
                Self::require_helper(case, command, responder)?;
                let reason = Self::require_reason(reason, "transfer")?;
                next.status = CaseStatus::Open;
                let released = std::mem::take(&mut next.assigned_helpers);
                EventKind::Transferred {
                    reason,
                    released_helpers: released,
                }
            }
            Command::Resolve { responder } => {
                Self::require_status(
                    case,
                    command,
                    &[CaseStatus::Assigned, CaseStatus::InProgress],
                )?;
                Self::require_helper(case, command, responder)?;
                next.status = CaseStatus::Resolved;
                next.resolved_by = std::mem::take(&mut next.assigned_helpers);
                next.reporter_approval = Some(ReporterApproval::Pending);
                EventKind::Resolved {
                    previous_status: case.status,
                    helpers: next.resolved_by.clone(),
                }
            }
            Command::ReporterApprove { reporter } => {
                Self::require_status(case, command, &[CaseStatus::Resolved])?;
                Self::require_reporter(case, command, reporter)?;
                next.status = CaseStatus::Closed;
                next.reporter_approval = Some(ReporterApproval::Approved);
                EventKind::ReporterApproved
            }
            Command::ReporterReject { reporter, reason } => {
                Self::require_status(case, command, &[CaseStatus::Resolved])?;
                Self::require_reporter(case, command, reporter)?;
                let reason = Self::require_reason(reason, "rejection")?;
                if case.resolved_by.is_empty() {
                    return Err(Self::illegal(
                        case,
                        command,
                        "no previous helpers to restore",
                    ));
                }
                next.status = CaseStatus::Assigned;
                next.assigned_helpers = std::mem::take(&mut next.resolved_by);
                next.reporter_approval = None;
                EventKind::ReporterRejected {
                    reason,
                    restored_helpers: next.assigned_helpers.clone(),
                }
            }
        };

        next.version = version;
        next.updated_at = now;
        debug_assert_eq!(
            next.status.requires_helpers(),
            !next.assigned_helpers.is_empty(),
            "transition produced a status/helpers mismatch"
        );

        Ok(Transition {
            next,
            event: PendingEvent {
                actor_id: actor.clone(),
                timestamp: now,
                kind,
            },
        })
    }

    fn claim(
        case: &Case,
        next: &mut Case,
        command: &Command,
        responder: &ActorId,
    ) -> Result<EventKind, WorkflowError> {
        match case.status {
            CaseStatus::Resolved | CaseStatus::Closed => Err(WorkflowError::CaseNotClaimable {
                case_id: case.case_id.clone(),
                status: case.status,
            }),
            CaseStatus::InProgress => {
                Err(Self::illegal(case, command, "work is already in progress"))
            }
            CaseStatus::Open if !case.assigned_helpers.is_empty() => Err(Self::illegal(
                case,
                command,
                "open case still lists helpers",
            )),
            CaseStatus::Assigned if case.is_helper(responder) => Err(Self::illegal(
                case,
                command,
                "responder already claimed this case",
            )),
            CaseStatus::Open | CaseStatus::Assigned => {
                next.status = CaseStatus::Assigned;
                next.assigned_helpers.push(responder.clone());
                Ok(EventKind::Assigned {
                    responder: responder.clone(),
                    previous_status: case.status,
                    helpers: next.assigned_helpers.clone(),
                })
            }
        }
    }

    fn require_status(
        case: &Case,
        command: &Command,
        allowed: &[CaseStatus],
    ) -> Result<(), WorkflowError> {
        if allowed.contains(&case.status) {
            Ok(())
        } else {
            Err(Self::illegal(case, command, "command not valid in this status"))
        }
    }

    fn require_helper(
        case: &Case,
        command: &Command,
        responder: &ActorId,
    ) -> Result<(), WorkflowError> {
        if case.is_helper(responder) {
            Ok(())
        } else {
            Err(Self::illegal(
                case,
                command,
                &format!("{responder} is not assigned to this case"),
            ))
        }
    }

    fn require_reporter(
        case: &Case,
        command: &Command,
        reporter: &ActorId,
    ) -> Result<(), WorkflowError> {
        if case.reporter_id() == reporter {
            Ok(())
        } else {
            Err(Self::illegal(
                case,
                command,
                &format!("{reporter} did not report this case"),
            ))
        }
    }

    fn require_reason(reason: &str, what: &str) -> Result<String, WorkflowError> {
        let reason = reason.trim();
        if reason.is_empty() {
            Err(WorkflowError::ValidationFailed(format!(
                "{what} reason must not be empty"
            )))
        } else {
            Ok(reason.to_string())
        }
    }

    fn illegal(case: &Case, command: &Command, reason: &str) -> WorkflowError {
        WorkflowError::IllegalTransition {
            case_id: case.case_id.clone(),
            status: case.status,
            command: command.kind(),
            reason: reason.to_string(),
        }
    }
}
