use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::case::{ActorId, CaseId, CaseStatus, UrgencyLevel};

/// Fieldless event type as shown in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Created,
    Assigned,
    StatusUpdated,
    Transferred,
    Resolved,
    ReporterApproved,
    ReporterRejected,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Created => write!(f, "Created"),
            EventType::Assigned => write!(f, "Assigned"),
            EventType::StatusUpdated => write!(f, "StatusUpdated"),
            EventType::Transferred => write!(f, "Transferred"),
            EventType::Resolved => write!(f, "Resolved"),
            EventType::ReporterApproved => write!(f, "ReporterApproved"),
            EventType::ReporterRejected => write!(f, "ReporterRejected"),
        }
    }
}

/// Event type together with its type-specific details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum EventKind {
    Created {
        urgency_level: UrgencyLevel,
        animal_type: String,
        photo_count: usize,
    },
    Assigned {
        responder: ActorId,
        previous_status: CaseStatus,
        helpers: Vec<ActorId>,
    },
    StatusUpdated {
        previous_status: CaseStatus,
        new_status: CaseStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        photo_urls: Vec<String>,
    },
    Transferred {
        reason: String,
        released_helpers: Vec<ActorId>,
    },
    Resolved {
        previous_status: CaseStatus,
        helpers: Vec<ActorId>,
    },
    ReporterApproved,
    ReporterRejected {
        reason: String,
        restored_helpers: Vec<ActorId>,
    },
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::Created { .. } => EventType::Created,
            EventKind::Assigned { .. } => EventType::Assigned,
            EventKind::StatusUpdated { .. } => EventType::StatusUpdated,
            EventKind::Transferred { .. } => EventType::Transferred,
            EventKind::Resolved { .. } => EventType::Resolved,
            EventKind::ReporterApproved => EventType::ReporterApproved,
            EventKind::ReporterRejected { .. } => EventType::ReporterRejected,
        }
    }

    /// Case status right after this event was committed.
    pub fn resulting_status(&self) -> CaseStatus {
        match self {
            EventKind::Created { .. } | EventKind::Transferred { .. } => CaseStatus::Open,
            EventKind::Assigned { .. } | EventKind::ReporterRejected { .. } => {
                CaseStatus::Assigned
            }
            EventKind::StatusUpdated { new_status, .. } => *new_status,
            EventKind::Resolved { .. } => CaseStatus::Resolved,
            EventKind::ReporterApproved => CaseStatus::Closed,
        }
    }
}

/// An event produced by a transition, not yet sequenced by the timeline store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEvent {
    pub actor_id: ActorId,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl PendingEvent {
    /// Binds the event to its case and timeline position.
    pub fn sequenced(self, case_id: CaseId, sequence: u64) -> TimelineEvent {
        TimelineEvent {
            case_id,
            sequence,
            actor_id: self.actor_id,
            timestamp: self.timestamp,
            kind: self.kind,
        }
    }
}

/// One committed, immutable entry of a case's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub case_id: CaseId,
    /// Gap-free per case, starting at 0 with the `Created` event.
    pub sequence: u64,
    pub actor_id: ActorId,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl TimelineEvent {
    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }
}

/// Event types of a timeline in order.
pub fn event_types(events: &[TimelineEvent]) -> Vec<EventType> {
    events.iter().map(TimelineEvent::event_type).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resulting_status_per_event() {
        let approved = EventKind::ReporterApproved;
        assert_eq!(approved.resulting_status(), CaseStatus::Closed);

        let begin = EventKind::StatusUpdated {
            previous_status: CaseStatus::Assigned,
            new_status: CaseStatus::InProgress,
            note: None,
            photo_urls: vec![],
        };
        assert_eq!(begin.resulting_status(), CaseStatus::InProgress);
        assert_eq!(begin.event_type(), EventType::StatusUpdated);

        let transferred = EventKind::Transferred {
            reason: "needs equipment".into(),
            released_helpers: vec![ActorId::from("r1")],
        };
        assert_eq!(transferred.resulting_status(), CaseStatus::Open);
    }

    #[test]
    fn event_json_has_type_and_details() {
        let event = PendingEvent {
            actor_id: ActorId::from("r1"),
            timestamp: Utc::now(),
            kind: EventKind::Assigned {
                responder: ActorId::from("r1"),
                previous_status: CaseStatus::Open,
                helpers: vec![ActorId::from("r1")],
            },
        }
        .sequenced(CaseId::from("c-1"), 1);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["sequence"], 1);
        assert_eq!(json["kind"]["type"], "Assigned");
        assert_eq!(json["kind"]["details"]["previous_status"], "Open");

        let back: TimelineEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn unit_event_without_details() {
        let json = serde_json::json!({ "type": "ReporterApproved" });
        let kind: EventKind = serde_json::from_value(json).unwrap();
        assert_eq!(kind, EventKind::ReporterApproved);
    }
}
