use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Role;

/// Maximum retained chat messages; the oldest are evicted first.
pub const CHAT_LOG_CAP: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}
