use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Process-local identifier of a live socket. Assigned by the server on
/// accept, never reused within a process lifetime.
pub type ConnectionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Teacher,
    Student,
}

/// One connected teacher or student. Created on join, removed on
/// disconnect or explicit removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub connection_id: ConnectionId,
    pub name: String,
    pub role: Role,
    pub connected_at: DateTime<Utc>,
    /// Whether this participant has answered the current poll.
    /// Reset for every student when a new poll is created.
    #[serde(default)]
    pub has_answered: bool,
}

/// Head counts sent alongside every participant-list update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCounts {
    pub total: usize,
    pub teachers: usize,
    pub students: usize,
}
