//! Answer grading against a poll's designated correct answer.

use crate::types::{AnswerValue, Poll, PollType};

/// Grade a submitted value against the poll's correct answer.
///
/// Returns `None` when the poll has no correct answer or its type is
/// never graded (free text, unknown). The comparison rules per type:
///
/// - multiple-choice: the selected set must equal the correct set
///   (same cardinality, every correct option present);
/// - single-choice / yes-no: exact string equality;
/// - rating: within a tolerance band of 1 of the correct value.
pub fn grade(poll: &Poll, value: &AnswerValue) -> Option<bool> {
    let correct = poll.correct_answer.as_ref()?;

    match poll.poll_type {
        PollType::MultipleChoice => {
            let expected = correct.selections();
            let selected = value.selections();
            Some(
                expected.len() == selected.len()
                    && expected.iter().all(|o| selected.contains(o)),
            )
        }
        PollType::SingleChoice | PollType::YesNo => {
            Some(match (value.as_text(), correct.as_text()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            })
        }
        PollType::Rating => Some(match (value.as_rating(), correct.as_rating()) {
            (Some(submitted), Some(expected)) => submitted.abs_diff(expected) <= 1,
            _ => false,
        }),
        PollType::Text | PollType::Unknown => None,
    }
}
