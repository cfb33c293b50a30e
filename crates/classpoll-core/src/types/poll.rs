use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default answer window when the teacher does not specify one.
pub const DEFAULT_TIME_LIMIT_SECS: u64 = 60;

/// Default number of rating buckets.
pub const DEFAULT_RATING_SCALE: u32 = 5;

/// Poll question kind. Unknown strings map to `Unknown`, which aggregates
/// to an empty result instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PollType {
    MultipleChoice,
    SingleChoice,
    YesNo,
    Rating,
    Text,
    #[serde(other)]
    Unknown,
}

/// A submitted answer payload. Untagged: the wire shape decides the
/// variant. A number is a rating, a string a single selection or free
/// text, an array a multiple-choice selection set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Number(u32),
    Text(String),
    Many(Vec<String>),
}

impl AnswerValue {
    /// The selected options this value contributes to a choice tally.
    /// Scalar strings count as a one-element selection set; numbers
    /// select nothing.
    pub fn selections(&self) -> Vec<&str> {
        match self {
            AnswerValue::Text(s) => vec![s.as_str()],
            AnswerValue::Many(v) => v.iter().map(String::as_str).collect(),
            AnswerValue::Number(_) => Vec::new(),
        }
    }

    /// Single textual value, if this is one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AnswerValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric rating, accepting both native numbers and numeric strings.
    pub fn as_rating(&self) -> Option<u32> {
        match self {
            AnswerValue::Number(n) => Some(*n),
            AnswerValue::Text(s) => s.trim().parse().ok(),
            AnswerValue::Many(_) => None,
        }
    }
}

/// Teacher-supplied poll parameters, as received on `create_poll`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollDraft {
    pub question: String,
    #[serde(default = "default_poll_type")]
    pub poll_type: PollType,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default = "default_time_limit")]
    pub time_limit_secs: u64,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub rating_scale: Option<u32>,
    #[serde(default)]
    pub correct_answer: Option<AnswerValue>,
}

fn default_poll_type() -> PollType {
    PollType::MultipleChoice
}

fn default_time_limit() -> u64 {
    DEFAULT_TIME_LIMIT_SECS
}

/// A single question instance with a bounded answer window. At most one
/// poll is active system-wide; all fields except `is_active` are
/// immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub id: Uuid,
    pub question: String,
    pub poll_type: PollType,
    pub options: Vec<String>,
    pub time_limit_secs: u64,
    pub is_anonymous: bool,
    pub rating_scale: Option<u32>,
    pub correct_answer: Option<AnswerValue>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub is_active: bool,
}

impl Poll {
    /// Build an active poll from a draft, normalizing options.
    /// Yes/no polls always get the fixed `["Yes", "No"]` option pair.
    pub fn from_draft(draft: PollDraft, created_by: String, now: DateTime<Utc>) -> Self {
        let options = match draft.poll_type {
            PollType::YesNo => vec!["Yes".to_string(), "No".to_string()],
            _ => draft.options,
        };
        Poll {
            id: Uuid::new_v4(),
            question: draft.question,
            poll_type: draft.poll_type,
            options,
            time_limit_secs: draft.time_limit_secs,
            is_anonymous: draft.is_anonymous,
            rating_scale: draft.rating_scale,
            correct_answer: draft.correct_answer,
            created_at: now,
            created_by,
            is_active: true,
        }
    }

    /// Seconds remaining in the answer window, anchored to `created_at`
    /// wall-clock time rather than a decrementing counter, so missed
    /// ticks cannot drift the deadline.
    pub fn time_left(&self, now: DateTime<Utc>) -> u64 {
        if !self.is_active {
            return 0;
        }
        let elapsed = now.signed_duration_since(self.created_at).num_seconds();
        (self.time_limit_secs as i64 - elapsed).max(0) as u64
    }

    pub fn rating_scale_or_default(&self) -> u32 {
        self.rating_scale.unwrap_or(DEFAULT_RATING_SCALE)
    }
}

/// One student's answer to the active poll. At most one per participant;
/// a duplicate submission is rejected, never merged or overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub participant_id: Uuid,
    pub student_name: String,
    pub value: AnswerValue,
    pub submitted_at: DateTime<Utc>,
    pub response_time_ms: u64,
}
