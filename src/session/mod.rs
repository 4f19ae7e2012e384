//! Timed session state machines
//!
//! Both session types are plain synchronous structs. They react to two kinds
//! of event, answer submissions and clock expiry, and never block. Callers
//! that share a session across tasks must serialize access (see
//! `crate::state`).

pub mod assessment;
pub mod battle;

pub use assessment::AssessmentSession;
pub use battle::{BattleSession, Opponent, SimulatedOpponent};

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::types::{
    BattleOutcome, Participant, ParticipantId, Question, ResultStatus, SessionId, SessionKind,
    SessionResult,
};

/// Where a session stands after handling an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Still waiting on the current question
    Waiting,
    /// Moved on to the question at `index`
    Advanced { index: usize },
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub points: u32,
    pub correct: bool,
    pub progress: Progress,
}

/// Result of feeding one tick into a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Counting { remaining: u32 },
    Expired(Progress),
    /// No live countdown (e.g. still matching)
    Idle,
}

/// How a participant's question was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    Answered { correct: bool },
    TimedOut,
}

impl Resolution {
    pub(crate) fn is_correct(&self) -> bool {
        matches!(self, Resolution::Answered { correct: true })
    }
}

/// Check that `question_id` is the current question, classifying the
/// rejection otherwise
pub(crate) fn check_question(
    questions: &[Arc<Question>],
    cursor: usize,
    question_id: &str,
    participant_id: &str,
    resolutions: &[Resolution],
) -> EngineResult<()> {
    match questions.iter().position(|q| q.id == question_id) {
        Some(i) if i == cursor => Ok(()),
        Some(i) if i < cursor => match resolutions.get(i) {
            Some(Resolution::Answered { .. }) => Err(EngineError::DuplicateSubmission {
                participant_id: participant_id.to_string(),
                question_id: question_id.to_string(),
            }),
            _ => Err(EngineError::QuestionClosed(question_id.to_string())),
        },
        _ => Err(EngineError::UnknownQuestion(question_id.to_string())),
    }
}

pub(crate) fn check_option(question: &Question, option: usize) -> EngineResult<()> {
    if option >= question.options.len() {
        return Err(EngineError::InvalidOption {
            option,
            available: question.options.len(),
        });
    }
    Ok(())
}

pub(crate) struct ResultParts<'a> {
    pub session_id: &'a SessionId,
    pub kind: SessionKind,
    pub status: ResultStatus,
    pub questions: &'a [Arc<Question>],
    pub completed_at_tick: u64,
}

pub(crate) fn build_result(
    parts: ResultParts<'_>,
    seats: &[(&Participant, &[Resolution], bool)],
    outcomes: BTreeMap<ParticipantId, BattleOutcome>,
) -> SessionResult {
    SessionResult {
        session_id: parts.session_id.clone(),
        kind: parts.kind,
        status: parts.status,
        participants: seats.iter().map(|(p, _, _)| (*p).clone()).collect(),
        question_ids: parts.questions.iter().map(|q| q.id.clone()).collect(),
        per_question_correctness: seats
            .iter()
            .map(|(p, res, _)| (p.id.clone(), res.iter().map(Resolution::is_correct).collect()))
            .collect(),
        outcomes,
        simulated: seats
            .iter()
            .filter(|(_, _, simulated)| *simulated)
            .map(|(p, _, _)| p.id.clone())
            .collect(),
        total_questions: parts.questions.len(),
        completed_at: chrono::Utc::now().to_rfc3339(),
        completed_at_tick: parts.completed_at_tick,
    }
}
