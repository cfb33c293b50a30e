mod chat;
mod participant;
mod poll;
mod session;

pub use chat::{CHAT_LOG_CAP, ChatMessage};
pub use participant::{ConnectionId, Participant, Role, RoomCounts};
pub use poll::{Answer, AnswerValue, Poll, PollDraft, PollType};
pub use session::{SessionAnalytics, StudentPerformance};
