//! Domain events produced by engine operations.
//!
//! State-machine operations never broadcast anything themselves; they
//! return these events and the gateway translates them into outbound
//! frames. Each event carries a delivery scope so per-student feedback
//! and kick notices are never fanned out to the whole room.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use classpoll_core::results::PollResult;
use classpoll_core::types::{
    AnswerValue, ChatMessage, ConnectionId, Poll, Role, RoomCounts, SessionAnalytics,
};

/// Delivery target for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every connected client.
    All,
    /// Exactly one connection.
    Conn(ConnectionId),
}

/// A domain event plus where it should go.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub scope: Scope,
    pub event: RoomEvent,
}

impl Outbound {
    pub fn all(event: RoomEvent) -> Self {
        Self {
            scope: Scope::All,
            event,
        }
    }

    pub fn to(conn: ConnectionId, event: RoomEvent) -> Self {
        Self {
            scope: Scope::Conn(conn),
            event,
        }
    }
}

/// Wire view of a participant; omits the socket-local connection id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub connected_at: DateTime<Utc>,
}

/// One student's answer as shown on the teacher dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndividualAnswer {
    pub student_name: String,
    pub value: AnswerValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    pub response_time_ms: u64,
    pub submitted_at: DateTime<Utc>,
}

/// A completed poll together with its final result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub poll: Poll,
    pub result: PollResult,
}

/// Everything the server may push at clients. Serialized with an
/// adjacent tag; the gateway uses the tag as the notification method.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RoomEvent {
    PollCreated {
        poll: Poll,
    },
    PollResults {
        poll: Poll,
        result: PollResult,
        time_left: u64,
        individual_answers: Vec<IndividualAnswer>,
    },
    TimerUpdate {
        time_left: u64,
    },
    PollEnded {
        poll: Poll,
        result: PollResult,
    },
    PollHistoryUpdated {
        history: Vec<HistoryEntry>,
    },
    PollReset,
    /// Current-poll snapshot directed at a joining client.
    PollSnapshot {
        poll: Poll,
        result: PollResult,
        time_left: u64,
    },
    ChatHistory {
        messages: Vec<ChatMessage>,
    },
    NewMessage {
        message: ChatMessage,
    },
    ParticipantJoined {
        participant: ParticipantInfo,
        counts: RoomCounts,
    },
    ParticipantLeft {
        participant: ParticipantInfo,
        counts: RoomCounts,
    },
    ParticipantList {
        participants: Vec<ParticipantInfo>,
        counts: RoomCounts,
    },
    StudentRemoved {
        participant_id: Uuid,
        student_name: String,
    },
    /// Directed at the removed student before the forced disconnect.
    Kicked {
        message: String,
    },
    /// Directed at the submitting student when the poll is graded.
    AnswerFeedback {
        is_correct: bool,
        submitted: AnswerValue,
        correct_answer: AnswerValue,
        message: String,
    },
    SessionStarted {
        started_at: DateTime<Utc>,
        total_students: usize,
    },
    SessionEnded {
        ended_at: DateTime<Utc>,
        duration_ms: i64,
        analytics: SessionAnalytics,
    },
    /// Directed at joining teachers.
    SessionState {
        active: bool,
        started_at: Option<DateTime<Utc>>,
        analytics: Option<SessionAnalytics>,
    },
}
