use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable external identifier of a case. Never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CaseId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CaseId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a reporter or responder acting on a case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for ActorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ActorId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a case.
///
/// Open → Assigned → InProgress → Resolved → Closed, with Transfer returning
/// to Open and a reporter rejection returning Resolved to Assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseStatus {
    Open,
    Assigned,
    InProgress,
    Resolved,
    Closed,
}

impl CaseStatus {
    /// Statuses in which at least one helper must be attached.
    pub fn requires_helpers(self) -> bool {
        matches!(self, CaseStatus::Assigned | CaseStatus::InProgress)
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseStatus::Open => write!(f, "Open"),
            CaseStatus::Assigned => write!(f, "Assigned"),
            CaseStatus::InProgress => write!(f, "InProgress"),
            CaseStatus::Resolved => write!(f, "Resolved"),
            CaseStatus::Closed => write!(f, "Closed"),
        }
    }
}

/// Reporter sign-off on a resolved case.
///
/// A rejection sends the case back to Assigned and clears the approval, so it
/// is only ever visible as a `ReporterRejected` timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReporterApproval {
    /// Resolved, waiting for the reporter.
    Pending,
    /// The reporter confirmed the resolution; the case is Closed.
    Approved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrgencyLevel::Low => write!(f, "low"),
            UrgencyLevel::Medium => write!(f, "medium"),
            UrgencyLevel::High => write!(f, "high"),
            UrgencyLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Where the animal was seen, in WGS84 degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Free-text hint for responders ("gate 3", "behind the bakery").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmark: Option<String>,
}

/// Descriptive payload submitted with a new report. Opaque to the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    /// The user who filed the case; the only one allowed to approve or reject.
    pub reporter_id: ActorId,
    pub urgency_level: UrgencyLevel,
    /// Must not be blank.
    pub animal_type: String,
    pub location: Location,
    /// Must not be blank.
    pub description: String,
    /// Photo URLs attached at report time.
    #[serde(default)]
    pub photos: Vec<String>,
}

/// A rescue case and its current workflow state.
///
/// Fields are crate-private: outside code reads through accessors and can
/// only change a case by submitting a command to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub(crate) case_id: CaseId,
    pub(crate) status: CaseStatus,
    pub(crate) assigned_helpers: Vec<ActorId>,
    /// Helpers released by the last Resolve, restored if the reporter rejects.
    #[serde(default)]
    pub(crate) resolved_by: Vec<ActorId>,
    #[serde(default)]
    pub(crate) reporter_approval: Option<ReporterApproval>,
    pub(crate) report: CaseReport,
    pub(crate) version: u64,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl Case {
    /// A freshly reported case: Open, no helpers, version 0.
    pub fn new(case_id: CaseId, report: CaseReport, now: DateTime<Utc>) -> Self {
        Self {
            case_id,
            status: CaseStatus::Open,
            assigned_helpers: Vec::new(),
            resolved_by: Vec::new(),
            reporter_approval: None,
            report,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn case_id(&self) -> &CaseId {
        &self.case_id
    }

    pub fn status(&self) -> CaseStatus {
        self.status
    }

    pub fn assigned_helpers(&self) -> &[ActorId] {
        &self.assigned_helpers
    }

    pub fn resolved_by(&self) -> &[ActorId] {
        &self.resolved_by
    }

    pub fn reporter_approval(&self) -> Option<ReporterApproval> {
        self.reporter_approval
    }

    pub fn reporter_id(&self) -> &ActorId {
        &self.report.reporter_id
    }

    pub fn report(&self) -> &CaseReport {
        &self.report
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_helper(&self, actor: &ActorId) -> bool {
        self.assigned_helpers.contains(actor)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn report(reporter: &str) -> CaseReport {
        CaseReport {
            reporter_id: ActorId::from(reporter),
            urgency_level: UrgencyLevel::High,
            animal_type: "dog".into(),
            location: Location {
                latitude: -23.55,
                longitude: -46.63,
                landmark: Some("near the bus terminal".into()),
            },
            description: "injured dog limping near the terminal".into(),
            photos: vec!["https://img.example/1.jpg".into()],
        }
    }

    pub fn open_case(id: &str) -> Case {
        Case::new(CaseId::from(id), report("reporter-1"), Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_case_defaults() {
        let case = fixtures::open_case("c-1");
        assert_eq!(case.status(), CaseStatus::Open);
        assert!(case.assigned_helpers().is_empty());
        assert!(case.resolved_by().is_empty());
        assert_eq!(case.reporter_approval(), None);
        assert_eq!(case.version(), 0);
        assert_eq!(case.reporter_id(), &ActorId::from("reporter-1"));
    }

    #[test]
    fn approval_has_no_stored_rejection() {
        let approved: ReporterApproval = serde_json::from_str("\"Approved\"").unwrap();
        assert_eq!(approved, ReporterApproval::Approved);
        assert!(serde_json::from_str::<ReporterApproval>("\"Rejected\"").is_err());
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(CaseId::generate(), CaseId::generate());
    }

    #[test]
    fn status_helper_requirements() {
        assert!(!CaseStatus::Open.requires_helpers());
        assert!(CaseStatus::Assigned.requires_helpers());
        assert!(CaseStatus::InProgress.requires_helpers());
        assert!(!CaseStatus::Resolved.requires_helpers());
        assert!(!CaseStatus::Closed.requires_helpers());
    }

    #[test]
    fn case_json_shape() {
        let case = fixtures::open_case("c-2");
        let json = serde_json::to_value(&case).unwrap();
        assert_eq!(json["case_id"], "c-2");
        assert_eq!(json["status"], "Open");
        assert_eq!(json["report"]["urgency_level"], "high");
        assert_eq!(json["report"]["reporter_id"], "reporter-1");
    }
}
