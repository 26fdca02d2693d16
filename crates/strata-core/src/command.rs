//! Handled-command markers used to detect duplicate submissions.

use chrono::{DateTime, Utc};

/// Message recorded alongside a handled command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandMessage {
    /// Type name used to deserialize the payload.
    pub type_name: String,
    /// Serialized message.
    pub payload: serde_json::Value,
}

/// A command to be recorded as handled.
#[derive(Debug, Clone, PartialEq)]
pub struct HandledCommand {
    /// Globally unique command identifier.
    pub command_id: String,
    /// Aggregate the command targeted.
    pub aggregate_root_id: String,
    /// Optional message produced while handling the command.
    pub message: Option<CommandMessage>,
}

/// A stored command marker.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandMarker {
    /// The recorded command.
    pub command: HandledCommand,
    /// When the marker was written.
    pub created_on: DateTime<Utc>,
}

/// Result of recording a handled command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAddOutcome {
    /// The marker was written.
    Success,
    /// The command was already recorded.
    DuplicateCommand,
}
