//! Post-commit notification pipeline.
//!
//! The engine hands a [`Notification`] to a [`NotificationDispatcher`] after a
//! transition has committed. Dispatch never blocks and never fails the command:
//! [`ChannelDispatcher`] queues onto a bounded channel that a
//! [`DeliveryWorker`] drains into a [`NotificationSink`] with its own retries.

pub mod error;
pub mod sink;
pub mod worker;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::state_machine::{ActorId, Case, CaseStatus, EventKind, TimelineEvent};

pub use error::DeliveryError;
pub use sink::{LogSink, NotificationSink, WebhookSink};
pub use worker::{DeliveryPolicy, DeliveryStats, DeliveryWorker};

/// A committed timeline event addressed to the people who care about it.
///
/// This is also the JSON body the webhook sink posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// The event exactly as the timeline log stored it.
    pub event: TimelineEvent,
    /// Status of the case right after the event.
    pub case_status: CaseStatus,
    /// Who should hear about it, without duplicates and without the actor.
    pub recipients: Vec<ActorId>,
}

impl Notification {
    /// Builds the notification for `event`, just committed on `case`.
    ///
    /// Recipients are the reporter, the current helpers and any helpers the
    /// event released or restored, minus the actor who caused it.
    pub fn for_commit(case: &Case, event: &TimelineEvent) -> Self {
        let mut recipients: Vec<ActorId> = Vec::new();
        let mut push = |actor: &ActorId| {
            if actor != &event.actor_id && !recipients.contains(actor) {
                recipients.push(actor.clone());
            }
        };

        push(case.reporter_id());
        case.assigned_helpers().iter().for_each(&mut push);
        match &event.kind {
            EventKind::Transferred {
                released_helpers, ..
            } => released_helpers.iter().for_each(&mut push),
            EventKind::Resolved { helpers, .. } => helpers.iter().for_each(&mut push),
            EventKind::ReporterRejected {
                restored_helpers, ..
            } => restored_helpers.iter().for_each(&mut push),
            _ => {}
        }

        Self {
            event: event.clone(),
            case_status: case.status(),
            recipients,
        }
    }
}

/// Fire-and-forget hand-off of committed events.
pub trait NotificationDispatcher: Send + Sync {
    /// Must return promptly and must not report failure to the caller.
    fn notify(&self, notification: Notification);
}

impl<T: NotificationDispatcher + ?Sized> NotificationDispatcher for Arc<T> {
    fn notify(&self, notification: Notification) {
        (**self).notify(notification)
    }
}

/// Discards every notification. For engines nobody listens to.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDispatcher;

impl NotificationDispatcher for NoopDispatcher {
    fn notify(&self, _notification: Notification) {}
}

/// Queues notifications on a bounded channel; drops them when it is full.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::Sender<Notification>,
}

impl ChannelDispatcher {
    /// Returns the dispatcher and the receiving end to hand to a
    /// [`DeliveryWorker`]. A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl NotificationDispatcher for ChannelDispatcher {
    fn notify(&self, notification: Notification) {
        let case_id = notification.event.case_id.clone();
        let sequence = notification.event.sequence;
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(case = %case_id, sequence, "notification queue full, dropping");
            }
            Err(TrySendError::Closed(_)) => {
                warn!(case = %case_id, sequence, "notification worker gone, dropping");
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::state_machine::fixtures::open_case;
    use crate::state_machine::{CaseId, Command, PendingEvent, StateMachine, TransitionRules};

    fn commit(case: &Case, command: Command) -> (Case, TimelineEvent) {
        let t = StateMachine::apply(case, &command, &TransitionRules::default(), Utc::now())
            .unwrap();
        let seq = t.next.version();
        (t.next, t.event.sequenced(CaseId::from("c-1"), seq))
    }

    #[test]
    fn claim_notifies_reporter_not_actor() {
        let (case, event) = commit(
            &open_case("c-1"),
            Command::Claim {
                responder: ActorId::from("r1"),
            },
        );
        let n = Notification::for_commit(&case, &event);
        assert_eq!(n.recipients, vec![ActorId::from("reporter-1")]);
        assert_eq!(n.case_status, CaseStatus::Assigned);
    }

    #[test]
    fn transfer_notifies_released_helpers() {
        let (case, _) = commit(
            &open_case("c-1"),
            Command::Claim {
                responder: ActorId::from("r1"),
            },
        );
        let (case, _) = commit(
            &case,
            Command::Claim {
                responder: ActorId::from("r2"),
            },
        );
        let (case, _) = commit(
            &case,
            Command::BeginWork {
                responder: ActorId::from("r1"),
            },
        );
        let (case, event) = commit(
            &case,
            Command::Transfer {
                responder: ActorId::from("r1"),
                reason: "needs NGO help".into(),
            },
        );
        let n = Notification::for_commit(&case, &event);
        assert_eq!(
            n.recipients,
            vec![ActorId::from("reporter-1"), ActorId::from("r2")]
        );
    }

    #[tokio::test]
    async fn channel_dispatcher_drops_when_full() {
        let (dispatcher, mut rx) = ChannelDispatcher::new(1);
        let case = open_case("c-1");
        let event = PendingEvent {
            actor_id: ActorId::from("reporter-1"),
            timestamp: Utc::now(),
            kind: EventKind::ReporterApproved,
        }
        .sequenced(CaseId::from("c-1"), 0);

        dispatcher.notify(Notification::for_commit(&case, &event));
        dispatcher.notify(Notification::for_commit(&case, &event));

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn channel_dispatcher_survives_closed_receiver() {
        let (dispatcher, rx) = ChannelDispatcher::new(4);
        drop(rx);
        let case = open_case("c-1");
        let event = PendingEvent {
            actor_id: ActorId::from("r1"),
            timestamp: Utc::now(),
            kind: EventKind::ReporterApproved,
        }
        .sequenced(CaseId::from("c-1"), 3);
        // Must not panic or block.
        dispatcher.notify(Notification::for_commit(&case, &event));
    }
}
