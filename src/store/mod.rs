//! Case Store and Timeline Log collaborator interface.
//!
//! A store keeps each case together with its timeline. The only way to change
//! a stored case is [`CaseStore::compare_and_swap`], which replaces the case
//! and appends its timeline event in one atomic step, and only if the stored
//! version still equals the version the caller read.

mod memory;

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::state_machine::{Case, CaseId, CaseStatus, PendingEvent, TimelineEvent};

pub use memory::InMemoryCaseStore;

/// A conditional case replacement plus the event that records it.
#[derive(Debug, Clone)]
pub struct CaseWrite {
    pub expected_version: u64,
    pub case: Case,
    pub event: PendingEvent,
}

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    /// The write was applied; carries the event as sequenced by the log.
    Committed(TimelineEvent),
    /// Someone else committed first. Nothing was written.
    Conflict { current_version: u64 },
}

/// A case with its full timeline, as exported in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case: Case,
    pub timeline: Vec<TimelineEvent>,
}

/// Serializable dump of every case in a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub cases: Vec<CaseRecord>,
}

pub trait CaseStore: Send + Sync {
    /// Stores a new case and its `Created` event at sequence 0.
    fn insert(
        &self,
        case: Case,
        created: PendingEvent,
    ) -> impl Future<Output = Result<TimelineEvent, StoreError>> + Send;

    fn load(
        &self,
        case_id: &CaseId,
    ) -> impl Future<Output = Result<Option<Case>, StoreError>> + Send;

    /// Replaces the case and appends the event iff the stored version is
    /// still `write.expected_version`.
    fn compare_and_swap(
        &self,
        write: CaseWrite,
    ) -> impl Future<Output = Result<CasOutcome, StoreError>> + Send;

    /// Committed events of a case in sequence order.
    fn timeline(
        &self,
        case_id: &CaseId,
    ) -> impl Future<Output = Result<Vec<TimelineEvent>, StoreError>> + Send;

    /// Cases ordered by creation time, optionally restricted to one status.
    fn list(
        &self,
        status: Option<CaseStatus>,
    ) -> impl Future<Output = Result<Vec<Case>, StoreError>> + Send;
}
