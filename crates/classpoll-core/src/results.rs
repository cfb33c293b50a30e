//! Result aggregation: a pure function of the poll and its raw answer set.
//!
//! Results are always recomputed from the answers, never patched
//! incrementally, so they cannot drift from the submissions.

use serde::{Deserialize, Serialize};

use crate::types::{Answer, AnswerValue, Poll, PollType};

/// Count and rounded percentage for one option (or rating bucket).
/// Tallies keep the poll's option declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub label: String,
    pub count: u32,
    pub percentage: u32,
}

/// One free-text answer, for text polls. `student_name` is `"Anonymous"`
/// when the poll is anonymous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextResponse {
    pub text: String,
    pub student_name: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Displayable summary of a poll's answers. Derived state only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollResult {
    pub tallies: Vec<Tally>,
    pub total_answers: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub responses: Vec<TextResponse>,
}

impl PollResult {
    pub fn tally(&self, label: &str) -> Option<&Tally> {
        self.tallies.iter().find(|t| t.label == label)
    }
}

/// Round to the nearest integer percent, halves away from zero.
/// Percentages are not forced to sum to 100; rounding drift is accepted.
fn percentage(count: u32, denominator: u32) -> u32 {
    if denominator == 0 {
        0
    } else {
        (f64::from(count) / f64::from(denominator) * 100.0).round() as u32
    }
}

/// Compute the displayable result for a poll from its raw answers.
pub fn compute_results(poll: &Poll, answers: &[Answer]) -> PollResult {
    let total_answers = answers.len() as u32;

    match poll.poll_type {
        PollType::MultipleChoice => {
            let mut counts = vec![0u32; poll.options.len()];
            // Denominator is total selections across all students, not
            // total respondents. Unknown options are ignored entirely.
            let mut total_selections = 0u32;
            for answer in answers {
                for selected in answer.value.selections() {
                    if let Some(idx) = poll.options.iter().position(|o| o == selected) {
                        counts[idx] += 1;
                        total_selections += 1;
                    }
                }
            }
            PollResult {
                tallies: tallies_from(&poll.options, &counts, total_selections),
                total_answers,
                ..Default::default()
            }
        }

        PollType::SingleChoice | PollType::YesNo => {
            let mut counts = vec![0u32; poll.options.len()];
            for answer in answers {
                if let Some(text) = answer.value.as_text() {
                    if let Some(idx) = poll.options.iter().position(|o| o == text) {
                        counts[idx] += 1;
                    }
                }
            }
            PollResult {
                tallies: tallies_from(&poll.options, &counts, total_answers),
                total_answers,
                ..Default::default()
            }
        }

        PollType::Rating => {
            let scale = poll.rating_scale_or_default();
            let mut counts = vec![0u32; scale as usize];
            let mut sum = 0u64;
            for answer in answers {
                if let Some(rating) = answer.value.as_rating() {
                    sum += u64::from(rating);
                    if (1..=scale).contains(&rating) {
                        counts[(rating - 1) as usize] += 1;
                    }
                }
            }
            let labels: Vec<String> = (1..=scale).map(|r| r.to_string()).collect();
            let average_rating = if total_answers > 0 {
                Some((sum as f64 / f64::from(total_answers) * 10.0).round() / 10.0)
            } else {
                None
            };
            PollResult {
                tallies: tallies_from(&labels, &counts, total_answers),
                total_answers,
                average_rating,
                ..Default::default()
            }
        }

        PollType::Text => {
            let responses = answers
                .iter()
                .filter_map(|answer| {
                    answer.value.as_text().map(|text| TextResponse {
                        text: text.to_string(),
                        student_name: if poll.is_anonymous {
                            "Anonymous".to_string()
                        } else {
                            answer.student_name.clone()
                        },
                        timestamp: answer.submitted_at,
                    })
                })
                .collect();
            PollResult {
                responses,
                total_answers,
                ..Default::default()
            }
        }

        // Defensive default for poll types this build does not know:
        // empty counts, zero totals, not an error.
        PollType::Unknown => PollResult::default(),
    }
}

fn tallies_from(labels: &[String], counts: &[u32], denominator: u32) -> Vec<Tally> {
    labels
        .iter()
        .zip(counts)
        .map(|(label, &count)| Tally {
            label: label.clone(),
            count,
            percentage: percentage(count, denominator),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PollDraft;
    use chrono::Utc;
    use uuid::Uuid;

    fn poll(poll_type: PollType, options: &[&str]) -> Poll {
        Poll::from_draft(
            PollDraft {
                question: "q".into(),
                poll_type,
                options: options.iter().map(|s| s.to_string()).collect(),
                time_limit_secs: 60,
                is_anonymous: false,
                rating_scale: None,
                correct_answer: None,
            },
            "teacher".into(),
            Utc::now(),
        )
    }

    fn answer(name: &str, value: AnswerValue) -> Answer {
        Answer {
            participant_id: Uuid::new_v4(),
            student_name: name.into(),
            value,
            submitted_at: Utc::now(),
            response_time_ms: 1000,
        }
    }

    #[test]
    fn single_choice_counts_and_percentages() {
        let poll = poll(PollType::SingleChoice, &["3", "4", "5"]);
        let answers = vec![
            answer("a", AnswerValue::Text("4".into())),
            answer("b", AnswerValue::Text("3".into())),
        ];
        let result = compute_results(&poll, &answers);
        assert_eq!(result.total_answers, 2);
        assert_eq!(result.tally("3").unwrap().count, 1);
        assert_eq!(result.tally("4").unwrap().count, 1);
        assert_eq!(result.tally("5").unwrap().count, 0);
        assert_eq!(result.tally("3").unwrap().percentage, 50);
        assert_eq!(result.tally("4").unwrap().percentage, 50);
        assert_eq!(result.tally("5").unwrap().percentage, 0);
    }

    #[test]
    fn single_choice_ignores_unknown_option() {
        let poll = poll(PollType::SingleChoice, &["a", "b"]);
        let answers = vec![answer("x", AnswerValue::Text("zzz".into()))];
        let result = compute_results(&poll, &answers);
        // The answer still counts toward the denominator, as observed.
        assert_eq!(result.total_answers, 1);
        assert_eq!(result.tally("a").unwrap().count, 0);
        assert_eq!(result.tally("b").unwrap().count, 0);
    }

    #[test]
    fn multiple_choice_denominator_is_total_selections() {
        let poll = poll(PollType::MultipleChoice, &["a", "b", "c"]);
        let answers = vec![
            answer("x", AnswerValue::Many(vec!["a".into(), "b".into()])),
            answer("y", AnswerValue::Text("a".into())),
        ];
        let result = compute_results(&poll, &answers);
        assert_eq!(result.total_answers, 2);
        // 3 selections total: a=2, b=1, c=0.
        assert_eq!(result.tally("a").unwrap().count, 2);
        assert_eq!(result.tally("a").unwrap().percentage, 67);
        assert_eq!(result.tally("b").unwrap().percentage, 33);
        assert_eq!(result.tally("c").unwrap().percentage, 0);
    }

    #[test]
    fn yes_no_tallies() {
        let poll = poll(PollType::YesNo, &[]);
        let answers = vec![
            answer("x", AnswerValue::Text("Yes".into())),
            answer("y", AnswerValue::Text("Yes".into())),
            answer("z", AnswerValue::Text("No".into())),
        ];
        let result = compute_results(&poll, &answers);
        assert_eq!(result.tally("Yes").unwrap().count, 2);
        assert_eq!(result.tally("No").unwrap().count, 1);
        assert_eq!(result.tally("Yes").unwrap().percentage, 67);
    }

    #[test]
    fn rating_buckets_average_and_out_of_range() {
        let mut poll = poll(PollType::Rating, &[]);
        poll.rating_scale = Some(5);
        let answers = vec![
            answer("x", AnswerValue::Number(4)),
            answer("y", AnswerValue::Number(5)),
            answer("z", AnswerValue::Text("2".into())),
            answer("w", AnswerValue::Number(9)), // outside 1..=5, not bucketed
        ];
        let result = compute_results(&poll, &answers);
        assert_eq!(result.tallies.len(), 5);
        assert_eq!(result.tally("4").unwrap().count, 1);
        assert_eq!(result.tally("5").unwrap().count, 1);
        assert_eq!(result.tally("2").unwrap().count, 1);
        assert_eq!(result.total_answers, 4);
        // Average includes every submitted rating: (4+5+2+9)/4 = 5.0
        assert_eq!(result.average_rating, Some(5.0));
    }

    #[test]
    fn rating_average_rounds_to_one_decimal() {
        let poll = poll(PollType::Rating, &[]);
        let answers = vec![
            answer("x", AnswerValue::Number(4)),
            answer("y", AnswerValue::Number(3)),
            answer("z", AnswerValue::Number(3)),
        ];
        let result = compute_results(&poll, &answers);
        assert_eq!(result.average_rating, Some(3.3));
    }

    #[test]
    fn text_responses_in_submission_order() {
        let poll = poll(PollType::Text, &[]);
        let answers = vec![
            answer("alice", AnswerValue::Text("first".into())),
            answer("bob", AnswerValue::Text("second".into())),
        ];
        let result = compute_results(&poll, &answers);
        assert!(result.tallies.is_empty());
        assert_eq!(result.responses.len(), 2);
        assert_eq!(result.responses[0].text, "first");
        assert_eq!(result.responses[0].student_name, "alice");
        assert_eq!(result.responses[1].student_name, "bob");
    }

    #[test]
    fn anonymous_text_poll_hides_names() {
        let mut poll = poll(PollType::Text, &[]);
        poll.is_anonymous = true;
        let answers = vec![answer("alice", AnswerValue::Text("hi".into()))];
        let result = compute_results(&poll, &answers);
        assert_eq!(result.responses[0].student_name, "Anonymous");
    }

    #[test]
    fn unknown_type_yields_empty_result() {
        let poll = poll(PollType::Unknown, &["a"]);
        let answers = vec![answer("x", AnswerValue::Text("a".into()))];
        let result = compute_results(&poll, &answers);
        assert!(result.tallies.is_empty());
        assert_eq!(result.total_answers, 0);
    }

    #[test]
    fn empty_answer_set_gives_zero_percentages() {
        let poll = poll(PollType::SingleChoice, &["a", "b"]);
        let result = compute_results(&poll, &[]);
        assert_eq!(result.total_answers, 0);
        assert!(result.tallies.iter().all(|t| t.percentage == 0));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Single-choice: every valid answer lands in exactly one
            /// bucket, so counts sum to the number of valid answers.
            #[test]
            fn single_choice_counts_sum_to_answers(picks in proptest::collection::vec(0usize..3, 0..40)) {
                let poll = poll(PollType::SingleChoice, &["a", "b", "c"]);
                let answers: Vec<Answer> = picks
                    .iter()
                    .enumerate()
                    .map(|(i, &p)| answer(&format!("s{i}"), AnswerValue::Text(poll.options[p].clone())))
                    .collect();
                let result = compute_results(&poll, &answers);
                let sum: u32 = result.tallies.iter().map(|t| t.count).sum();
                prop_assert_eq!(sum, result.total_answers);
            }

            /// Multiple-choice: counts never exceed answers × options,
            /// and percentages drift from 100 only by rounding.
            #[test]
            fn multiple_choice_bounds(masks in proptest::collection::vec(1u8..8, 1..40)) {
                let poll = poll(PollType::MultipleChoice, &["a", "b", "c"]);
                let answers: Vec<Answer> = masks
                    .iter()
                    .enumerate()
                    .map(|(i, &mask)| {
                        let selected: Vec<String> = poll.options
                            .iter()
                            .enumerate()
                            .filter(|(bit, _)| mask & (1 << bit) != 0)
                            .map(|(_, o)| o.clone())
                            .collect();
                        answer(&format!("s{i}"), AnswerValue::Many(selected))
                    })
                    .collect();
                let result = compute_results(&poll, &answers);
                let count_sum: u32 = result.tallies.iter().map(|t| t.count).sum();
                prop_assert!(count_sum >= result.total_answers);
                prop_assert!(count_sum <= result.total_answers * poll.options.len() as u32);
                let pct_sum: u32 = result.tallies.iter().map(|t| t.percentage).sum();
                // Each rounded term is off by at most half a point.
                prop_assert!((98..=102).contains(&pct_sum));
            }

            /// Rounding never produces a percentage above 100.
            #[test]
            fn percentages_bounded(picks in proptest::collection::vec(0usize..2, 1..40)) {
                let poll = poll(PollType::SingleChoice, &["a", "b"]);
                let answers: Vec<Answer> = picks
                    .iter()
                    .enumerate()
                    .map(|(i, &p)| answer(&format!("s{i}"), AnswerValue::Text(poll.options[p].clone())))
                    .collect();
                let result = compute_results(&poll, &answers);
                prop_assert!(result.tallies.iter().all(|t| t.percentage <= 100));
            }
        }
    }
}
