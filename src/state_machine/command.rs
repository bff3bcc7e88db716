use std::fmt;

use serde::{Deserialize, Serialize};

use super::case::ActorId;

/// A lifecycle command addressed to an existing case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Claim {
        responder: ActorId,
    },
    BeginWork {
        responder: ActorId,
    },
    StatusUpdate {
        responder: ActorId,
        note: String,
        photo_urls: Vec<String>,
    },
    Transfer {
        responder: ActorId,
        reason: String,
    },
    Resolve {
        responder: ActorId,
    },
    ReporterApprove {
        reporter: ActorId,
    },
    ReporterReject {
        reporter: ActorId,
        reason: String,
    },
}

/// Fieldless tag of a [`Command`], used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    Claim,
    BeginWork,
    StatusUpdate,
    Transfer,
    Resolve,
    ReporterApprove,
    ReporterReject,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Claim { .. } => CommandKind::Claim,
            Command::BeginWork { .. } => CommandKind::BeginWork,
            Command::StatusUpdate { .. } => CommandKind::StatusUpdate,
            Command::Transfer { .. } => CommandKind::Transfer,
            Command::Resolve { .. } => CommandKind::Resolve,
            Command::ReporterApprove { .. } => CommandKind::ReporterApprove,
            Command::ReporterReject { .. } => CommandKind::ReporterReject,
        }
    }

    /// The actor issuing the command.
    pub fn actor(&self) -> &ActorId {
        match self {
            Command::Claim { responder }
            | Command::BeginWork { responder }
            | Command::StatusUpdate { responder, .. }
            | Command::Transfer { responder, .. }
            | Command::Resolve { responder } => responder,
            Command::ReporterApprove { reporter } | Command::ReporterReject { reporter, .. } => {
                reporter
            }
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Claim => write!(f, "Claim"),
            CommandKind::BeginWork => write!(f, "BeginWork"),
            CommandKind::StatusUpdate => write!(f, "StatusUpdate"),
            CommandKind::Transfer => write!(f, "Transfer"),
            CommandKind::Resolve => write!(f, "Resolve"),
            CommandKind::ReporterApprove => write!(f, "ReporterApprove"),
            CommandKind::ReporterReject => write!(f, "ReporterReject"),
        }
    }
}
