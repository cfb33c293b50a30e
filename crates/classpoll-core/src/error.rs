//! Error taxonomy for room commands.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain failures a command can produce. All are local and recoverable;
/// they are reported to the originating caller only, never broadcast,
/// and none of them is fatal to the server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandError {
    #[error("action not allowed for this role")]
    Forbidden,

    #[error("please wait for the current poll to complete")]
    PollInProgress,

    #[error("current poll is still active")]
    PollStillActive,

    #[error("no active poll")]
    NoActivePoll,

    #[error("you have already answered this poll")]
    AlreadyAnswered,

    #[error("participant not found")]
    NotFound,

    #[error("not registered in the room")]
    Unauthenticated,

    #[error("session already active")]
    SessionAlreadyActive,

    #[error("no active session")]
    SessionNotActive,
}

impl CommandError {
    /// Stable machine-readable name, used as the `data` field of wire errors.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::Forbidden => "forbidden",
            CommandError::PollInProgress => "poll_in_progress",
            CommandError::PollStillActive => "poll_still_active",
            CommandError::NoActivePoll => "no_active_poll",
            CommandError::AlreadyAnswered => "already_answered",
            CommandError::NotFound => "not_found",
            CommandError::Unauthenticated => "unauthenticated",
            CommandError::SessionAlreadyActive => "session_already_active",
            CommandError::SessionNotActive => "session_not_active",
        }
    }
}
