//! The poll session state machine.
//!
//! Lifecycle: Idle -> Active -> Ended -> Idle (next question). Exactly
//! one poll may be active at a time; the engine enforces that, the
//! one-answer-per-student invariant, and the stale-timer guard.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use classpoll_core::CommandError;
use classpoll_core::grading::grade;
use classpoll_core::results::{PollResult, compute_results};
use classpoll_core::types::{
    AnswerValue, CHAT_LOG_CAP, ChatMessage, ConnectionId, Answer, Poll, PollDraft, Role,
    RoomCounts, SessionAnalytics, StudentPerformance,
};

use crate::clock::Clock;
use crate::events::{HistoryEntry, IndividualAnswer, Outbound, ParticipantInfo, RoomEvent};
use crate::registry::ConnectionRegistry;

type CommandResult = Result<Vec<Outbound>, CommandError>;

/// The poll currently shown to the room, together with its raw answers.
/// Kept after the poll ends (for late joiners and result reads) until
/// the teacher asks a new question.
#[derive(Debug)]
struct CurrentPoll {
    poll: Poll,
    /// Submission order; at most one entry per participant.
    answers: Vec<Answer>,
}

/// Snapshot of the current poll for reads and joining clients.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentPollView {
    pub poll: Option<Poll>,
    pub result: Option<PollResult>,
    pub time_left: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantListView {
    pub participants: Vec<ParticipantInfo>,
    pub counts: RoomCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub active: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    pub analytics: SessionAnalytics,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthView {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub counts: RoomCounts,
}

/// State container for one room, constructed per server instance.
/// Single-writer: the owning task serializes all calls, including timer
/// ticks, so a last-second answer and an expiry can never interleave.
pub struct PollEngine {
    clock: Arc<dyn Clock>,
    registry: ConnectionRegistry,
    current: Option<CurrentPoll>,
    history: Vec<HistoryEntry>,
    chat: Vec<ChatMessage>,
    session_active: bool,
    session_started_at: Option<DateTime<Utc>>,
    session_ended_at: Option<DateTime<Utc>>,
    analytics: SessionAnalytics,
}

impl PollEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            registry: ConnectionRegistry::new(),
            current: None,
            history: Vec::new(),
            chat: Vec::new(),
            session_active: false,
            session_started_at: None,
            session_ended_at: None,
            analytics: SessionAnalytics::default(),
        }
    }

    // -----------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------

    /// Register a connection. Always succeeds. The joiner receives the
    /// current poll snapshot, the chat history, and (teachers) the
    /// session state; everyone gets the updated participant list.
    pub fn join(&mut self, conn: ConnectionId, name: String, role: Role) -> Vec<Outbound> {
        let now = self.clock.now();
        let participant = self.registry.register(conn, name, role, now);
        info!(name = %participant.name, role = ?role, total = self.registry.len(), "participant joined");

        let mut events = Vec::new();

        if let Some(current) = &self.current {
            events.push(Outbound::to(
                conn,
                RoomEvent::PollSnapshot {
                    poll: current.poll.clone(),
                    result: compute_results(&current.poll, &current.answers),
                    time_left: current.poll.time_left(now),
                },
            ));
        }

        if !self.chat.is_empty() {
            events.push(Outbound::to(
                conn,
                RoomEvent::ChatHistory {
                    messages: self.chat.clone(),
                },
            ));
        }

        if role == Role::Teacher {
            events.push(Outbound::to(
                conn,
                RoomEvent::SessionState {
                    active: self.session_active,
                    started_at: self.session_started_at,
                    analytics: self.session_active.then(|| self.analytics.clone()),
                },
            ));
        }

        let counts = self.registry.counts();
        events.push(Outbound::all(RoomEvent::ParticipantJoined {
            participant: ParticipantInfo {
                id: participant.id,
                name: participant.name,
                role: participant.role,
                connected_at: participant.connected_at,
            },
            counts,
        }));
        events.push(self.participant_list_event());
        events
    }

    /// Unregister a connection. Idempotent; silent when unknown.
    pub fn leave(&mut self, conn: ConnectionId) -> Vec<Outbound> {
        let Some(participant) = self.registry.unregister(conn) else {
            return Vec::new();
        };
        info!(name = %participant.name, total = self.registry.len(), "participant left");
        vec![
            Outbound::all(RoomEvent::ParticipantLeft {
                participant: ParticipantInfo {
                    id: participant.id,
                    name: participant.name,
                    role: participant.role,
                    connected_at: participant.connected_at,
                },
                counts: self.registry.counts(),
            }),
            self.participant_list_event(),
        ]
    }

    // -----------------------------------------------------------------
    // Poll lifecycle
    // -----------------------------------------------------------------

    /// Teacher creates a poll. Rejected while another poll is active.
    /// The returned `PollCreated` event is the gateway's cue to start a
    /// timer for this poll id.
    pub fn create_poll(&mut self, conn: ConnectionId, draft: PollDraft) -> CommandResult {
        let teacher = self.require_role(conn, Role::Teacher)?;
        if matches!(&self.current, Some(c) if c.poll.is_active) {
            return Err(CommandError::PollInProgress);
        }

        let created_by = teacher.name.clone();
        let poll = Poll::from_draft(draft, created_by, self.clock.now());
        info!(
            poll_id = %poll.id,
            question = %poll.question,
            poll_type = ?poll.poll_type,
            time_limit_secs = poll.time_limit_secs,
            created_by = %poll.created_by,
            "poll created"
        );

        self.registry.reset_answered();
        let event = RoomEvent::PollCreated { poll: poll.clone() };
        self.current = Some(CurrentPoll {
            poll,
            answers: Vec::new(),
        });
        Ok(vec![Outbound::all(event)])
    }

    /// Student submits an answer to the active poll. The first answer
    /// wins; a second submission from the same participant is rejected
    /// and the original is left untouched. Ends the poll immediately
    /// when every registered student has answered.
    pub fn submit_answer(&mut self, conn: ConnectionId, value: AnswerValue) -> CommandResult {
        let student = self.require_role(conn, Role::Student)?;
        let (participant_id, student_name) = (student.id, student.name.clone());

        let now = self.clock.now();
        let current = match &mut self.current {
            Some(c) if c.poll.is_active => c,
            _ => return Err(CommandError::NoActivePoll),
        };
        if current
            .answers
            .iter()
            .any(|a| a.participant_id == participant_id)
        {
            return Err(CommandError::AlreadyAnswered);
        }

        let response_time_ms = now
            .signed_duration_since(current.poll.created_at)
            .num_milliseconds()
            .max(0) as u64;
        let graded = grade(&current.poll, &value);
        current.answers.push(Answer {
            participant_id,
            student_name: student_name.clone(),
            value: value.clone(),
            submitted_at: now,
            response_time_ms,
        });
        debug!(student = %student_name, response_time_ms, graded = ?graded, "answer recorded");

        if let Some(p) = self.registry.get_mut(conn) {
            p.has_answered = true;
        }
        if self.session_active {
            Self::record_performance(&mut self.analytics, &student_name, graded);
        }

        let mut events = Vec::new();
        if let (Some(is_correct), Some(correct_answer)) =
            (graded, current.poll.correct_answer.clone())
        {
            events.push(Outbound::to(
                conn,
                RoomEvent::AnswerFeedback {
                    is_correct,
                    submitted: value,
                    correct_answer,
                    message: if is_correct {
                        "Correct! Well done!".to_string()
                    } else {
                        "Incorrect. Keep trying!".to_string()
                    },
                },
            ));
        }
        events.push(Outbound::all(RoomEvent::PollResults {
            poll: current.poll.clone(),
            result: compute_results(&current.poll, &current.answers),
            time_left: current.poll.time_left(now),
            individual_answers: individual_answers(&current.poll, &current.answers),
        }));

        if self.registry.all_students_answered() {
            // Everyone is in: short-circuit the timer.
            let poll_id = current.poll.id;
            events.extend(self.end_poll(poll_id));
        }
        Ok(events)
    }

    /// End the identified poll. Idempotent and stale-guarded: a no-op
    /// unless that exact poll is currently active, so a late timer
    /// expiry racing an all-answered completion is harmless.
    pub fn end_poll(&mut self, poll_id: Uuid) -> Vec<Outbound> {
        let current = match &mut self.current {
            Some(c) if c.poll.id == poll_id && c.poll.is_active => c,
            _ => {
                debug!(%poll_id, "discarding end request for inactive or superseded poll");
                return Vec::new();
            }
        };

        current.poll.is_active = false;
        let result = compute_results(&current.poll, &current.answers);
        let poll = current.poll.clone();
        info!(poll_id = %poll.id, total_answers = result.total_answers, "poll ended");

        self.history.push(HistoryEntry {
            poll: poll.clone(),
            result: result.clone(),
        });
        if self.session_active {
            self.analytics.total_polls += 1;
        }

        vec![
            Outbound::all(RoomEvent::PollEnded { poll, result }),
            Outbound::all(RoomEvent::PollHistoryUpdated {
                history: self.history.clone(),
            }),
        ]
    }

    /// Periodic timer tick for a poll id. Stale ticks are discarded; an
    /// expired deadline runs the same end transition as every other
    /// path, exactly once.
    pub fn tick(&mut self, poll_id: Uuid) -> Vec<Outbound> {
        let time_left = match &self.current {
            Some(c) if c.poll.id == poll_id && c.poll.is_active => {
                c.poll.time_left(self.clock.now())
            }
            _ => {
                debug!(%poll_id, "discarding stale timer tick");
                return Vec::new();
            }
        };

        let mut events = vec![Outbound::all(RoomEvent::TimerUpdate { time_left })];
        if time_left == 0 {
            events.extend(self.end_poll(poll_id));
        }
        events
    }

    /// Teacher clears the ended poll to make room for the next one.
    pub fn ask_new_question(&mut self, conn: ConnectionId) -> CommandResult {
        self.require_role(conn, Role::Teacher)?;
        if matches!(&self.current, Some(c) if c.poll.is_active) {
            return Err(CommandError::PollStillActive);
        }
        self.current = None;
        info!("poll reset, ready for next question");
        Ok(vec![Outbound::all(RoomEvent::PollReset)])
    }

    // -----------------------------------------------------------------
    // Moderation & chat
    // -----------------------------------------------------------------

    /// Teacher removes a student. The target gets a directed kick notice
    /// (the gateway closes the socket afterwards); the room gets the
    /// removal broadcast and a fresh participant list.
    pub fn remove_student(&mut self, conn: ConnectionId, participant_id: Uuid) -> CommandResult {
        self.require_role(conn, Role::Teacher)?;
        let target_conn = self
            .registry
            .find_student(participant_id)
            .map(|p| p.connection_id)
            .ok_or(CommandError::NotFound)?;
        let removed = self
            .registry
            .unregister(target_conn)
            .ok_or(CommandError::NotFound)?;
        info!(student = %removed.name, %participant_id, "student removed by teacher");

        Ok(vec![
            Outbound::to(
                target_conn,
                RoomEvent::Kicked {
                    message: "You have been removed from the session by the teacher.".to_string(),
                },
            ),
            Outbound::all(RoomEvent::StudentRemoved {
                participant_id,
                student_name: removed.name,
            }),
            self.participant_list_event(),
        ])
    }

    /// Append a chat message, evicting the oldest past the cap.
    pub fn send_message(&mut self, conn: ConnectionId, text: String) -> CommandResult {
        let sender = self
            .registry
            .get(conn)
            .ok_or(CommandError::Unauthenticated)?;
        let message = ChatMessage {
            id: Uuid::new_v4(),
            sender_id: sender.id,
            sender_name: sender.name.clone(),
            sender_role: sender.role,
            text,
            timestamp: self.clock.now(),
        };
        self.chat.push(message.clone());
        if self.chat.len() > CHAT_LOG_CAP {
            let excess = self.chat.len() - CHAT_LOG_CAP;
            self.chat.drain(..excess);
        }
        Ok(vec![Outbound::all(RoomEvent::NewMessage { message })])
    }

    // -----------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------

    /// Start an analytics session, snapshotting the current student
    /// roster into the performance map.
    pub fn start_session(&mut self, conn: ConnectionId) -> CommandResult {
        self.require_role(conn, Role::Teacher)?;
        if self.session_active {
            return Err(CommandError::SessionAlreadyActive);
        }

        let now = self.clock.now();
        self.session_active = true;
        self.session_started_at = Some(now);
        self.session_ended_at = None;
        self.analytics = SessionAnalytics {
            total_students: self.registry.counts().students as u32,
            student_performance: self
                .registry
                .by_role(Role::Student)
                .map(|p| (p.name.clone(), StudentPerformance::default()))
                .collect(),
            ..Default::default()
        };
        info!(total_students = self.analytics.total_students, "session started");

        Ok(vec![Outbound::all(RoomEvent::SessionStarted {
            started_at: now,
            total_students: self.registry.counts().students,
        })])
    }

    /// End the session and publish the final analytics.
    pub fn end_session(&mut self, conn: ConnectionId) -> CommandResult {
        self.require_role(conn, Role::Teacher)?;
        if !self.session_active {
            return Err(CommandError::SessionNotActive);
        }

        let now = self.clock.now();
        self.session_active = false;
        self.session_ended_at = Some(now);
        self.analytics.finalize();
        let duration_ms = self
            .session_started_at
            .map(|start| now.signed_duration_since(start).num_milliseconds())
            .unwrap_or(0);
        info!(
            duration_ms,
            total_polls = self.analytics.total_polls,
            average_accuracy = self.analytics.average_accuracy,
            "session ended"
        );

        Ok(vec![Outbound::all(RoomEvent::SessionEnded {
            ended_at: now,
            duration_ms,
            analytics: self.analytics.clone(),
        })])
    }

    // -----------------------------------------------------------------
    // Reads (no side effects)
    // -----------------------------------------------------------------

    pub fn current_poll_view(&self) -> CurrentPollView {
        match &self.current {
            Some(c) => CurrentPollView {
                result: Some(compute_results(&c.poll, &c.answers)),
                time_left: c.poll.time_left(self.clock.now()),
                poll: Some(c.poll.clone()),
            },
            None => CurrentPollView {
                poll: None,
                result: None,
                time_left: 0,
            },
        }
    }

    pub fn participant_list_view(&self) -> ParticipantListView {
        ParticipantListView {
            participants: self.registry.infos(),
            counts: self.registry.counts(),
        }
    }

    pub fn chat_log(&self) -> &[ChatMessage] {
        &self.chat
    }

    pub fn poll_history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn session_view(&self) -> SessionView {
        let duration_ms = match (self.session_started_at, self.session_ended_at) {
            (Some(start), Some(end)) => Some(end.signed_duration_since(start).num_milliseconds()),
            _ => None,
        };
        SessionView {
            active: self.session_active,
            started_at: self.session_started_at,
            ended_at: self.session_ended_at,
            duration_ms,
            analytics: self.analytics.clone(),
        }
    }

    /// A student's own session stats.
    pub fn student_performance(
        &self,
        conn: ConnectionId,
    ) -> Result<StudentPerformance, CommandError> {
        let student = self.require_role(conn, Role::Student)?;
        self.analytics
            .student_performance
            .get(&student.name)
            .copied()
            .ok_or(CommandError::NotFound)
    }

    pub fn health(&self) -> HealthView {
        HealthView {
            status: "ok",
            timestamp: self.clock.now(),
            counts: self.registry.counts(),
        }
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn require_role(
        &self,
        conn: ConnectionId,
        role: Role,
    ) -> Result<&classpoll_core::types::Participant, CommandError> {
        match self.registry.get(conn) {
            Some(p) if p.role == role => Ok(p),
            _ => Err(CommandError::Forbidden),
        }
    }

    fn participant_list_event(&self) -> Outbound {
        Outbound::all(RoomEvent::ParticipantList {
            participants: self.registry.infos(),
            counts: self.registry.counts(),
        })
    }

    /// Session analytics track only students present when the session
    /// started; late joiners are not graded into the session.
    fn record_performance(
        analytics: &mut SessionAnalytics,
        student_name: &str,
        graded: Option<bool>,
    ) {
        let Some(performance) = analytics.student_performance.get_mut(student_name) else {
            return;
        };
        let correct = graded == Some(true);
        performance.record(correct);
        if correct {
            analytics.total_correct += 1;
        } else {
            analytics.total_incorrect += 1;
        }
    }

}

fn individual_answers(poll: &Poll, answers: &[Answer]) -> Vec<IndividualAnswer> {
    answers
        .iter()
        .map(|a| IndividualAnswer {
            student_name: a.student_name.clone(),
            value: a.value.clone(),
            is_correct: grade(poll, &a.value),
            response_time_ms: a.response_time_ms,
            submitted_at: a.submitted_at,
        })
        .collect()
}
