use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::WorkflowConfig;
use crate::error::WorkflowError;
use crate::notify::{Notification, NotificationDispatcher};
use crate::state_machine::{
    ActorId, Case, CaseId, CaseReport, CaseStatus, Command, EventKind, PendingEvent, StateMachine,
    TimelineEvent, TransitionRules,
};
use crate::store::{CasOutcome, CaseStore, CaseWrite};

/// Knobs of the command loop.
///
/// The default matches [`WorkflowConfig::default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Reloads allowed after a lost compare-and-swap, on top of the first attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds between reloads.
    pub retry_base_delay_ms: u64,
    /// Payload guards handed to [`StateMachine::apply`] on every attempt.
    pub rules: TransitionRules,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&WorkflowConfig::default())
    }
}

impl From<&WorkflowConfig> for EngineOptions {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_base_delay_ms: config.retry_base_delay_ms,
            rules: config.transition_rules(),
        }
    }
}

impl EngineOptions {
    /// delay = retry_base_delay_ms * 2^(attempt - 1), saturating at `u64::MAX`.
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        self.retry_base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// A successfully committed command.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed {
    /// The case as stored by the winning compare-and-swap.
    pub case: Case,
    /// The timeline entry appended with it, already sequenced.
    pub event: TimelineEvent,
    /// Load-apply-swap rounds it took, starting at 1.
    pub attempts: u32,
}

/// The only write path for cases.
///
/// Every command is evaluated by [`StateMachine::apply`] against the state it
/// will replace and committed through [`CaseStore::compare_and_swap`]. Lost
/// races are retried against freshly loaded state. Notifications go out only
/// after the commit.
pub struct WorkflowEngine<S, N> {
    store: S,
    dispatcher: N,
    options: EngineOptions,
}

impl<S: CaseStore, N: NotificationDispatcher> WorkflowEngine<S, N> {
    pub fn new(store: S, dispatcher: N, options: EngineOptions) -> Self {
        Self {
            store,
            dispatcher,
            options,
        }
    }

    pub fn from_config(store: S, dispatcher: N, config: &WorkflowConfig) -> Self {
        Self::new(store, dispatcher, EngineOptions::from(config))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Records a new report as an Open case and returns its id.
    pub async fn report_case(&self, report: CaseReport) -> Result<CaseId, WorkflowError> {
        if report.reporter_id.is_blank() {
            return Err(WorkflowError::ValidationFailed(
                "reporter id must not be empty".into(),
            ));
        }
        if report.animal_type.trim().is_empty() {
            return Err(WorkflowError::ValidationFailed(
                "animal type must not be empty".into(),
            ));
        }
        if report.description.trim().is_empty() {
            return Err(WorkflowError::ValidationFailed(
                "description must not be empty".into(),
            ));
        }

        let now = Utc::now();
        let created = PendingEvent {
            actor_id: report.reporter_id.clone(),
            timestamp: now,
            kind: EventKind::Created {
                urgency_level: report.urgency_level,
                animal_type: report.animal_type.clone(),
                photo_count: report.photos.len(),
            },
        };
        let case = Case::new(CaseId::generate(), report, now);
        let case_id = case.case_id().clone();

        let event = self.store.insert(case.clone(), created).await?;
        info!(case = %case_id, reporter = %case.reporter_id(), "case reported");
        self.dispatcher.notify(Notification::for_commit(&case, &event));
        Ok(case_id)
    }

    pub async fn claim(
        &self,
        case_id: &CaseId,
        responder: ActorId,
    ) -> Result<Committed, WorkflowError> {
        self.submit(case_id, Command::Claim { responder }, None).await
    }

    pub async fn begin_work(
        &self,
        case_id: &CaseId,
        responder: ActorId,
    ) -> Result<Committed, WorkflowError> {
        self.submit(case_id, Command::BeginWork { responder }, None).await
    }

    pub async fn status_update(
        &self,
        case_id: &CaseId,
        responder: ActorId,
        note: String,
        photo_urls: Vec<String>,
    ) -> Result<Committed, WorkflowError> {
        self.submit(
            case_id,
            Command::StatusUpdate {
                responder,
                note,
                photo_urls,
            },
            None,
        )
        .await
    }

    pub async fn transfer(
        &self,
        case_id: &CaseId,
        responder: ActorId,
        reason: String,
    ) -> Result<Committed, WorkflowError> {
        self.submit(case_id, Command::Transfer { responder, reason }, None).await
    }

    pub async fn resolve(
        &self,
        case_id: &CaseId,
        responder: ActorId,
    ) -> Result<Committed, WorkflowError> {
        self.submit(case_id, Command::Resolve { responder }, None).await
    }

    pub async fn reporter_approve(
        &self,
        case_id: &CaseId,
        reporter: ActorId,
    ) -> Result<Committed, WorkflowError> {
        self.submit(case_id, Command::ReporterApprove { reporter }, None).await
    }

    pub async fn reporter_reject(
        &self,
        case_id: &CaseId,
        reporter: ActorId,
        reason: String,
    ) -> Result<Committed, WorkflowError> {
        self.submit(case_id, Command::ReporterReject { reporter, reason }, None).await
    }

    /// Runs `command` against `case_id`.
    ///
    /// Without `expected_version` a lost compare-and-swap reloads the case and
    /// re-evaluates the command, up to `max_retries` times. With it, the
    /// command is pinned to that version: any mismatch is reported as
    /// `ConcurrentModification` straight away.
    pub async fn submit(
        &self,
        case_id: &CaseId,
        command: Command,
        expected_version: Option<u64>,
    ) -> Result<Committed, WorkflowError> {
        let max_attempts = match expected_version {
            Some(_) => 1,
            None => self.options.max_retries.saturating_add(1),
        };
        let mut attempt = 0;

        loop {
            attempt += 1;
            let case = self
                .store
                .load(case_id)
                .await?
                .ok_or_else(|| WorkflowError::NotFound(case_id.clone()))?;

            if let Some(expected) = expected_version
                && case.version() != expected
            {
                debug!(case = %case_id, expected, current = case.version(), "stale command");
                return Err(WorkflowError::ConcurrentModification {
                    case_id: case_id.clone(),
                    attempts: attempt,
                });
            }

            debug!(
                case = %case_id,
                command = %command.kind(),
                version = case.version(),
                attempt,
                "applying command"
            );
            let transition =
                StateMachine::apply(&case, &command, &self.options.rules, Utc::now())?;
            let next = transition.next.clone();
            let write = CaseWrite {
                expected_version: case.version(),
                case: transition.next,
                event: transition.event,
            };

            match self.store.compare_and_swap(write).await? {
                CasOutcome::Committed(event) => {
                    info!(
                        case = %case_id,
                        event = %event.event_type(),
                        sequence = event.sequence,
                        status = %next.status(),
                        actor = %event.actor_id,
                        "transition committed"
                    );
                    self.dispatcher.notify(Notification::for_commit(&next, &event));
                    return Ok(Committed {
                        case: next,
                        event,
                        attempts: attempt,
                    });
                }
                CasOutcome::Conflict { current_version } => {
                    if attempt >= max_attempts {
                        warn!(
                            case = %case_id,
                            command = %command.kind(),
                            attempts = attempt,
                            "giving up after repeated version conflicts"
                        );
                        return Err(WorkflowError::ConcurrentModification {
                            case_id: case_id.clone(),
                            attempts: attempt,
                        });
                    }
                    let delay_ms = self.options.delay_for_attempt(attempt);
                    warn!(
                        case = %case_id,
                        read_version = case.version(),
                        current_version,
                        attempt,
                        delay_ms,
                        "version conflict, reloading"
                    );
                    if delay_ms > 0 {
                        sleep(Duration::from_millis(delay_ms)).await;
                    }
                }
            }
        }
    }

    pub async fn get_case(&self, case_id: &CaseId) -> Result<Case, WorkflowError> {
        self.store
            .load(case_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(case_id.clone()))
    }

    /// Ordered audit trail of a case.
    pub async fn get_timeline(
        &self,
        case_id: &CaseId,
    ) -> Result<Vec<TimelineEvent>, WorkflowError> {
        let events = self.store.timeline(case_id).await?;
        if events.is_empty() {
            return Err(WorkflowError::NotFound(case_id.clone()));
        }
        Ok(events)
    }

    pub async fn list_cases(&self, status: Option<CaseStatus>) -> Result<Vec<Case>, WorkflowError> {
        Ok(self.store.list(status).await?)
    }
}
