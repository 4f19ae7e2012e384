use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque ID types for type safety
pub type SessionId = String;
pub type ParticipantId = String;
pub type QuestionId = String;
pub type WordId = String;

/// Vocabulary record as supplied by the word store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Word {
    pub id: WordId,
    pub word: String,
    #[serde(default)]
    pub phonetic: String,
    pub meaning: String,
    #[serde(default)]
    pub example: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
}

fn default_difficulty() -> u8 {
    1
}

/// A multiple choice question. Immutable once loaded into a bank.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: QuestionId,
    /// The word being asked about
    pub prompt: String,
    /// 2-6 answer options
    pub options: Vec<String>,
    /// Index into `options`
    pub correct_option: usize,
}

impl Question {
    pub fn is_correct(&self, option: usize) -> bool {
        option == self.correct_option
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub score: u32,
}

impl Participant {
    pub fn new(id: impl Into<ParticipantId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            score: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Matching,
    InProgress { index: usize },
    Completed,
}

impl SessionState {
    pub fn is_completed(&self) -> bool {
        matches!(self, SessionState::Completed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Assessment,
    Battle,
}

/// A scored answer. Consumed by scoring, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerSubmission {
    pub participant_id: ParticipantId,
    pub question_id: QuestionId,
    pub chosen_option: usize,
    pub submitted_at_tick: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BattleOutcome {
    Win,
    Loss,
    Draw,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Finished,
    /// Participant-initiated or connectivity-triggered early end
    Abandoned,
}

/// Final record of a session, produced once at completion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionResult {
    pub session_id: SessionId,
    pub kind: SessionKind,
    pub status: ResultStatus,
    pub participants: Vec<Participant>,
    /// Ids of the session's questions, in order
    pub question_ids: Vec<QuestionId>,
    /// Per participant, one entry per resolved question (shorter than
    /// `question_ids` when abandoned)
    pub per_question_correctness: BTreeMap<ParticipantId, Vec<bool>>,
    /// Battle outcomes, empty for assessments and abandoned battles
    #[serde(default)]
    pub outcomes: BTreeMap<ParticipantId, BattleOutcome>,
    /// Participants played by the engine
    #[serde(default)]
    pub simulated: Vec<ParticipantId>,
    pub total_questions: usize,
    pub completed_at: String,
    pub completed_at_tick: u64,
}

impl SessionResult {
    pub fn participant(&self, participant_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == participant_id)
    }

    pub fn is_simulated(&self, participant_id: &str) -> bool {
        self.simulated.iter().any(|id| id == participant_id)
    }

    pub fn correct_count(&self, participant_id: &str) -> usize {
        self.per_question_correctness
            .get(participant_id)
            .map(|answers| answers.iter().filter(|c| **c).count())
            .unwrap_or(0)
    }

    /// Fraction of all session questions answered correctly
    pub fn accuracy(&self, participant_id: &str) -> f64 {
        crate::scoring::accuracy(self.correct_count(participant_id), self.total_questions)
    }

    /// Question ids this participant answered correctly
    pub fn correct_question_ids(&self, participant_id: &str) -> Vec<&QuestionId> {
        match self.per_question_correctness.get(participant_id) {
            Some(answers) => self
                .question_ids
                .iter()
                .zip(answers.iter())
                .filter(|(_, correct)| **correct)
                .map(|(id, _)| id)
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn outcome_for(&self, participant_id: &str) -> Option<BattleOutcome> {
        self.outcomes.get(participant_id).copied()
    }
}
