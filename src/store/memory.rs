use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use tracing::trace;

use super::{CasOutcome, CaseRecord, CaseStore, CaseWrite, StoreSnapshot};
use crate::error::StoreError;
use crate::state_machine::{Case, CaseId, CaseStatus, PendingEvent, TimelineEvent};

/// Process-local store. The mutex makes each write, together with its
/// timeline append, a single critical section.
#[derive(Debug, Default)]
pub struct InMemoryCaseStore {
    records: Mutex<BTreeMap<CaseId, CaseRecord>>,
}

impl InMemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from a snapshot as-is, without validating it.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let records = snapshot
            .cases
            .into_iter()
            .map(|record| (record.case.case_id().clone(), record))
            .collect();
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let records = self.records()?;
        let mut cases: Vec<CaseRecord> = records.values().cloned().collect();
        cases.sort_by(|a, b| {
            (a.case.created_at(), a.case.case_id()).cmp(&(b.case.created_at(), b.case.case_id()))
        });
        Ok(StoreSnapshot { cases })
    }

    fn records(&self) -> Result<MutexGuard<'_, BTreeMap<CaseId, CaseRecord>>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Backend("case store lock poisoned".into()))
    }
}

impl CaseStore for InMemoryCaseStore {
    async fn insert(&self, case: Case, created: PendingEvent) -> Result<TimelineEvent, StoreError> {
        let mut records = self.records()?;
        let case_id = case.case_id().clone();
        if records.contains_key(&case_id) {
            return Err(StoreError::DuplicateCase(case_id));
        }

        let event = created.sequenced(case_id.clone(), 0);
        records.insert(
            case_id,
            CaseRecord {
                case,
                timeline: vec![event.clone()],
            },
        );
        Ok(event)
    }

    async fn load(&self, case_id: &CaseId) -> Result<Option<Case>, StoreError> {
        let records = self.records()?;
        Ok(records.get(case_id).map(|record| record.case.clone()))
    }

    async fn compare_and_swap(&self, write: CaseWrite) -> Result<CasOutcome, StoreError> {
        let mut records = self.records()?;
        let case_id = write.case.case_id().clone();
        let record = records
            .get_mut(&case_id)
            .ok_or_else(|| StoreError::UnknownCase(case_id.clone()))?;

        let current_version = record.case.version();
        if current_version != write.expected_version {
            trace!(
                case = %case_id,
                expected = write.expected_version,
                current_version,
                "cas conflict"
            );
            return Ok(CasOutcome::Conflict { current_version });
        }

        let sequence = record.timeline.len() as u64;
        let event = write.event.sequenced(case_id, sequence);
        record.case = write.case;
        record.timeline.push(event.clone());
        Ok(CasOutcome::Committed(event))
    }

    async fn timeline(&self, case_id: &CaseId) -> Result<Vec<TimelineEvent>, StoreError> {
        let records = self.records()?;
        Ok(records
            .get(case_id)
            .map(|record| record.timeline.clone())
            .unwrap_or_default())
    }

    async fn list(&self, status: Option<CaseStatus>) -> Result<Vec<Case>, StoreError> {
        let records = self.records()?;
        let mut cases: Vec<Case> = records
            .values()
            .map(|record| &record.case)
            .filter(|case| status.is_none_or(|s| case.status() == s))
            .cloned()
            .collect();
        cases.sort_by(|a, b| (a.created_at(), a.case_id()).cmp(&(b.created_at(), b.case_id())));
        Ok(cases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::state_machine::fixtures::open_case;
    use crate::state_machine::{
        ActorId, Command, EventKind, EventType, StateMachine, TransitionRules, UrgencyLevel,
    };

    fn created(case: &Case) -> PendingEvent {
        PendingEvent {
            actor_id: case.reporter_id().clone(),
            timestamp: Utc::now(),
            kind: EventKind::Created {
                urgency_level: UrgencyLevel::High,
                animal_type: "dog".into(),
                photo_count: 1,
            },
        }
    }

    fn claim_write(case: &Case, responder: &str) -> CaseWrite {
        let t = StateMachine::apply(
            case,
            &Command::Claim {
                responder: ActorId::from(responder),
            },
            &TransitionRules::default(),
            Utc::now(),
        )
        .unwrap();
        CaseWrite {
            expected_version: case.version(),
            case: t.next,
            event: t.event,
        }
    }

    #[tokio::test]
    async fn insert_assigns_sequence_zero_and_rejects_duplicates() {
        let store = InMemoryCaseStore::new();
        let case = open_case("c-1");
        let event = store.insert(case.clone(), created(&case)).await.unwrap();
        assert_eq!(event.sequence, 0);
        assert_eq!(event.case_id, CaseId::from("c-1"));

        let err = store.insert(case.clone(), created(&case)).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCase(_)));
    }

    #[tokio::test]
    async fn cas_commits_once_per_version() {
        let store = InMemoryCaseStore::new();
        let case = open_case("c-1");
        store.insert(case.clone(), created(&case)).await.unwrap();

        // Two writers read the same version 0.
        let first = claim_write(&case, "r1");
        let second = claim_write(&case, "r2");

        match store.compare_and_swap(first).await.unwrap() {
            CasOutcome::Committed(event) => {
                assert_eq!(event.sequence, 1);
                assert_eq!(event.event_type(), EventType::Assigned);
            }
            other => panic!("expected commit, got {other:?}"),
        }
        assert_eq!(
            store.compare_and_swap(second).await.unwrap(),
            CasOutcome::Conflict { current_version: 1 }
        );

        let stored = store.load(&CaseId::from("c-1")).await.unwrap().unwrap();
        assert_eq!(stored.assigned_helpers(), &[ActorId::from("r1")]);
        assert_eq!(store.timeline(&CaseId::from("c-1")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cas_on_unknown_case_fails() {
        let store = InMemoryCaseStore::new();
        let case = open_case("ghost");
        let err = store.compare_and_swap(claim_write(&case, "r1")).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownCase(_)));
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let store = InMemoryCaseStore::new();
        for id in ["c-1", "c-2", "c-3"] {
            let case = open_case(id);
            store.insert(case.clone(), created(&case)).await.unwrap();
        }
        let c2 = store.load(&CaseId::from("c-2")).await.unwrap().unwrap();
        store.compare_and_swap(claim_write(&c2, "r1")).await.unwrap();

        assert_eq!(store.list(None).await.unwrap().len(), 3);
        let open = store.list(Some(CaseStatus::Open)).await.unwrap();
        assert_eq!(open.len(), 2);
        assert!(open.iter().all(|c| c.status() == CaseStatus::Open));
        let assigned = store.list(Some(CaseStatus::Assigned)).await.unwrap();
        assert_eq!(assigned[0].case_id(), &CaseId::from("c-2"));
    }

    #[tokio::test]
    async fn snapshot_survives_json() {
        let store = InMemoryCaseStore::new();
        let case = open_case("c-1");
        store.insert(case.clone(), created(&case)).await.unwrap();
        store.compare_and_swap(claim_write(&case, "r1")).await.unwrap();

        let json = serde_json::to_string(&store.snapshot().unwrap()).unwrap();
        let restored = InMemoryCaseStore::from_snapshot(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.snapshot().unwrap(), store.snapshot().unwrap());
        assert!(restored.timeline(&CaseId::from("missing")).await.unwrap().is_empty());
    }
}
