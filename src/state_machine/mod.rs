mod case;
mod command;
mod property_tests;
mod state;
mod timeline;

pub use case::{
    ActorId, Case, CaseId, CaseReport, CaseStatus, Location, ReporterApproval, UrgencyLevel,
};
pub use command::{Command, CommandKind};
pub use state::{StateMachine, Transition, TransitionRules};
pub use timeline::{EventKind, EventType, PendingEvent, TimelineEvent, event_types};

#[cfg(test)]
pub(crate) use case::fixtures;
