use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-student tally across all polls of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentPerformance {
    pub total_answers: u32,
    pub correct_answers: u32,
    pub incorrect_answers: u32,
    /// Percent of this student's answers that were correct, rounded.
    pub accuracy: u32,
}

impl StudentPerformance {
    pub fn record(&mut self, correct: bool) {
        self.total_answers += 1;
        if correct {
            self.correct_answers += 1;
        } else {
            self.incorrect_answers += 1;
        }
        self.accuracy =
            (f64::from(self.correct_answers) / f64::from(self.total_answers) * 100.0).round()
                as u32;
    }
}

/// Aggregate numbers for one teacher session. The per-student map is
/// keyed by student name and snapshotted from the roster when the
/// session starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionAnalytics {
    pub total_polls: u32,
    pub total_students: u32,
    pub total_correct: u32,
    pub total_incorrect: u32,
    pub average_accuracy: u32,
    pub student_performance: BTreeMap<String, StudentPerformance>,
}

impl SessionAnalytics {
    /// Recompute `average_accuracy` from the running totals.
    pub fn finalize(&mut self) {
        let total = self.total_correct + self.total_incorrect;
        self.average_accuracy = if total > 0 {
            (f64::from(self.total_correct) / f64::from(total) * 100.0).round() as u32
        } else {
            0
        };
    }
}
