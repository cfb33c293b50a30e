//! Single-writer gateway task.
//!
//! Owns the [`PollEngine`] outright. Every mutation and read arrives as
//! a [`Command`] on one mpsc queue, so client requests, disconnects,
//! and timer ticks are applied in a single total order with no locks.
//! Resulting events are serialized once and fanned out to all client
//! handlers over a broadcast channel.

use std::collections::HashMap;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use classpoll_core::CommandError;
use classpoll_core::types::{AnswerValue, ConnectionId, PollDraft, Role};
use classpoll_engine::{Outbound, PollEngine, RoomEvent, Scope};

use crate::protocol::event_to_notification;
use crate::timer::spawn_poll_timer;

type Reply = oneshot::Sender<Result<serde_json::Value, CommandError>>;

#[derive(Debug)]
pub enum QueryKind {
    CurrentPoll,
    Participants,
    ChatLog,
    PollHistory,
    Session,
    StudentPerformance,
    Health,
}

/// One unit of work for the gateway. Replies carry the JSON-RPC result
/// payload; fire-and-forget variants come from timers and disconnects.
#[derive(Debug)]
pub enum Command {
    Join {
        conn: ConnectionId,
        name: String,
        role: Role,
        reply: Reply,
    },
    Disconnect {
        conn: ConnectionId,
    },
    CreatePoll {
        conn: ConnectionId,
        draft: PollDraft,
        reply: Reply,
    },
    SubmitAnswer {
        conn: ConnectionId,
        value: AnswerValue,
        reply: Reply,
    },
    AskNewQuestion {
        conn: ConnectionId,
        reply: Reply,
    },
    RemoveStudent {
        conn: ConnectionId,
        participant_id: Uuid,
        reply: Reply,
    },
    SendMessage {
        conn: ConnectionId,
        text: String,
        reply: Reply,
    },
    StartSession {
        conn: ConnectionId,
        reply: Reply,
    },
    EndSession {
        conn: ConnectionId,
        reply: Reply,
    },
    Tick {
        poll_id: Uuid,
    },
    Query {
        conn: ConnectionId,
        kind: QueryKind,
        reply: Reply,
    },
}

/// A pre-serialized push frame plus its delivery scope. Client handlers
/// filter on scope and write the frame verbatim.
#[derive(Debug, Clone)]
pub struct Push {
    pub scope: Scope,
    pub method: String,
    pub frame: String,
}

pub struct Gateway {
    engine: PollEngine,
    cmd_rx: mpsc::Receiver<Command>,
    /// Handed to spawned poll timers so their ticks join the queue.
    cmd_tx: mpsc::Sender<Command>,
    push_tx: broadcast::Sender<Push>,
    cancel: CancellationToken,
    timers: HashMap<Uuid, CancellationToken>,
}

impl Gateway {
    pub fn new(
        engine: PollEngine,
        cmd_rx: mpsc::Receiver<Command>,
        cmd_tx: mpsc::Sender<Command>,
        push_tx: broadcast::Sender<Push>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            engine,
            cmd_rx,
            cmd_tx,
            push_tx,
            cancel,
            timers: HashMap::new(),
        }
    }

    /// Drain the command queue until cancelled or all senders drop.
    pub async fn run(&mut self) {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle(cmd),
                        None => {
                            tracing::info!("gateway: all command senders dropped");
                            break;
                        }
                    }
                }
                _ = self.cancel.cancelled() => {
                    tracing::info!("gateway: cancellation requested, shutting down");
                    break;
                }
            }
        }
        for (_, token) in self.timers.drain() {
            token.cancel();
        }
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Join {
                conn,
                name,
                role,
                reply,
            } => {
                let events = self.engine.join(conn, name, role);
                self.publish(events);
                let _ = reply.send(Ok(serde_json::json!({ "joined": true })));
            }
            Command::Disconnect { conn } => {
                let events = self.engine.leave(conn);
                self.publish(events);
            }
            Command::CreatePoll { conn, draft, reply } => {
                let res = self.engine.create_poll(conn, draft).map(|events| {
                    self.publish(events);
                    serde_json::json!({ "created": true })
                });
                let _ = reply.send(res);
            }
            Command::SubmitAnswer { conn, value, reply } => {
                let res = self.engine.submit_answer(conn, value).map(|events| {
                    self.publish(events);
                    serde_json::json!({ "submitted": true })
                });
                let _ = reply.send(res);
            }
            Command::AskNewQuestion { conn, reply } => {
                let res = self.engine.ask_new_question(conn).map(|events| {
                    self.publish(events);
                    serde_json::json!({ "reset": true })
                });
                let _ = reply.send(res);
            }
            Command::RemoveStudent {
                conn,
                participant_id,
                reply,
            } => {
                let res = self
                    .engine
                    .remove_student(conn, participant_id)
                    .map(|events| {
                        self.publish(events);
                        serde_json::json!({ "removed": true })
                    });
                let _ = reply.send(res);
            }
            Command::SendMessage { conn, text, reply } => {
                let res = self.engine.send_message(conn, text).map(|events| {
                    self.publish(events);
                    serde_json::json!({ "sent": true })
                });
                let _ = reply.send(res);
            }
            Command::StartSession { conn, reply } => {
                let res = self.engine.start_session(conn).map(|events| {
                    self.publish(events);
                    serde_json::json!({ "started": true })
                });
                let _ = reply.send(res);
            }
            Command::EndSession { conn, reply } => {
                let res = self.engine.end_session(conn).map(|events| {
                    self.publish(events);
                    serde_json::json!({ "ended": true })
                });
                let _ = reply.send(res);
            }
            Command::Tick { poll_id } => {
                let events = self.engine.tick(poll_id);
                self.publish(events);
            }
            Command::Query { conn, kind, reply } => {
                let res = self.query(conn, kind);
                let _ = reply.send(res);
            }
        }
    }

    fn query(
        &self,
        conn: ConnectionId,
        kind: QueryKind,
    ) -> Result<serde_json::Value, CommandError> {
        let value = match kind {
            QueryKind::CurrentPoll => serde_json::json!(self.engine.current_poll_view()),
            QueryKind::Participants => serde_json::json!(self.engine.participant_list_view()),
            QueryKind::ChatLog => serde_json::json!({ "messages": self.engine.chat_log() }),
            QueryKind::PollHistory => serde_json::json!({ "history": self.engine.poll_history() }),
            QueryKind::Session => serde_json::json!(self.engine.session_view()),
            QueryKind::StudentPerformance => {
                serde_json::json!(self.engine.student_performance(conn)?)
            }
            QueryKind::Health => serde_json::json!(self.engine.health()),
        };
        Ok(value)
    }

    /// Serialize events once and fan them out; also the hook where poll
    /// timers are started and stopped, keyed by poll id.
    fn publish(&mut self, events: Vec<Outbound>) {
        for outbound in events {
            match &outbound.event {
                RoomEvent::PollCreated { poll } => self.start_timer(poll.id),
                RoomEvent::PollEnded { poll, .. } => self.stop_timer(poll.id),
                _ => {}
            }
            let notification = event_to_notification(&outbound.event);
            match serde_json::to_string(&notification) {
                Ok(frame) => {
                    // Send fails only when no client is connected.
                    let _ = self.push_tx.send(Push {
                        scope: outbound.scope,
                        method: notification.method,
                        frame,
                    });
                }
                Err(e) => {
                    tracing::error!(method = %notification.method, error = %e, "failed to serialize push frame");
                }
            }
        }
    }

    fn start_timer(&mut self, poll_id: Uuid) {
        let token = self.cancel.child_token();
        self.timers.insert(poll_id, token.clone());
        spawn_poll_timer(poll_id, self.cmd_tx.clone(), token);
    }

    fn stop_timer(&mut self, poll_id: Uuid) {
        if let Some(token) = self.timers.remove(&poll_id) {
            token.cancel();
        }
    }
}
