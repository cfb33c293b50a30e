//! Connection registry: who is in the room right now.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use classpoll_core::types::{ConnectionId, Participant, Role, RoomCounts};

use crate::events::ParticipantInfo;

/// Tracks connected participants in insertion order, keyed by connection
/// id. Purely in-memory; everything is lost on restart by design.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    participants: Vec<Participant>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Always succeeds; any number of teachers may
    /// join. Re-joining on the same connection replaces the old entry in
    /// place (same position, fresh participant id).
    pub fn register(
        &mut self,
        connection_id: ConnectionId,
        name: String,
        role: Role,
        now: DateTime<Utc>,
    ) -> Participant {
        let participant = Participant {
            id: Uuid::new_v4(),
            connection_id,
            name,
            role,
            connected_at: now,
            has_answered: false,
        };
        match self
            .participants
            .iter_mut()
            .find(|p| p.connection_id == connection_id)
        {
            Some(slot) => *slot = participant.clone(),
            None => self.participants.push(participant.clone()),
        }
        participant
    }

    /// Remove a connection. Idempotent; returns the removed participant.
    pub fn unregister(&mut self, connection_id: ConnectionId) -> Option<Participant> {
        let idx = self
            .participants
            .iter()
            .position(|p| p.connection_id == connection_id)?;
        Some(self.participants.remove(idx))
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.connection_id == connection_id)
    }

    pub fn get_mut(&mut self, connection_id: ConnectionId) -> Option<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|p| p.connection_id == connection_id)
    }

    /// Participants of one role, in insertion order.
    pub fn by_role(&self, role: Role) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(move |p| p.role == role)
    }

    /// Find a student by participant id (not connection id).
    pub fn find_student(&self, participant_id: Uuid) -> Option<&Participant> {
        self.by_role(Role::Student).find(|p| p.id == participant_id)
    }

    /// Reset every student's answered flag. Called on poll creation.
    pub fn reset_answered(&mut self) {
        for p in &mut self.participants {
            p.has_answered = false;
        }
    }

    /// True when every registered student has answered the current poll.
    /// Vacuously true with no students; callers only check this on a
    /// submission, so an empty room cannot end a poll early.
    pub fn all_students_answered(&self) -> bool {
        self.by_role(Role::Student).all(|p| p.has_answered)
    }

    pub fn counts(&self) -> RoomCounts {
        RoomCounts {
            total: self.participants.len(),
            teachers: self.by_role(Role::Teacher).count(),
            students: self.by_role(Role::Student).count(),
        }
    }

    pub fn infos(&self) -> Vec<ParticipantInfo> {
        self.participants
            .iter()
            .map(|p| ParticipantInfo {
                id: p.id,
                name: p.name.clone(),
                role: p.role,
                connected_at: p.connected_at,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
