//! Per-answer and aggregate scoring shared by both session types.
//!
//! Points depend only on correctness: no partial credit and no speed bonus.

use crate::types::{AnswerSubmission, BattleOutcome, Question};

pub const DEFAULT_POINTS_PER_CORRECT_ANSWER: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scorer {
    points_per_correct: u32,
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(DEFAULT_POINTS_PER_CORRECT_ANSWER)
    }
}

impl Scorer {
    pub fn new(points_per_correct: u32) -> Self {
        Self { points_per_correct }
    }

    pub fn points_per_correct(&self) -> u32 {
        self.points_per_correct
    }

    pub fn score(&self, submission: &AnswerSubmission, question: &Question) -> u32 {
        if question.is_correct(submission.chosen_option) {
            self.points_per_correct
        } else {
            0
        }
    }
}

/// Sum of per-question points
pub fn aggregate<I>(points: I) -> u32
where
    I: IntoIterator<Item = u32>,
{
    points.into_iter().fold(0u32, |total, p| total.saturating_add(p))
}

/// Fraction of correct answers, 0.0 for an empty session
pub fn accuracy(correct: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    }
}

/// Outcome from the perspective of the participant holding `own`
pub fn battle_outcome(own: u32, other: u32) -> BattleOutcome {
    match own.cmp(&other) {
        std::cmp::Ordering::Greater => BattleOutcome::Win,
        std::cmp::Ordering::Less => BattleOutcome::Loss,
        std::cmp::Ordering::Equal => BattleOutcome::Draw,
    }
}
