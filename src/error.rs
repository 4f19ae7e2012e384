use crate::types::{ParticipantId, QuestionId, SessionId};

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by sessions, the question bank and matchmaking
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Question bank cannot supply {requested} questions (only {available} distinct)")]
    InsufficientQuestions { requested: usize, available: usize },

    #[error("Participant {participant_id} already answered question {question_id}")]
    DuplicateSubmission {
        participant_id: ParticipantId,
        question_id: QuestionId,
    },

    #[error("Session already completed")]
    SessionAlreadyCompleted,

    #[error("No opponent found within {ticks} ticks")]
    MatchmakingTimeout { ticks: u32 },

    #[error("Session is still matching an opponent")]
    SessionNotStarted,

    #[error("Battle already has an opponent")]
    SessionFull,

    #[error("Session is still running")]
    SessionInProgress,

    #[error("Participant {0} is not part of this session")]
    UnknownParticipant(ParticipantId),

    #[error("Question {0} is not the current question")]
    UnknownQuestion(QuestionId),

    #[error("Question {0} already timed out")]
    QuestionClosed(QuestionId),

    #[error("Option {option} out of range (question has {available} options)")]
    InvalidOption { option: usize, available: usize },

    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error("Session {0} not found")]
    SessionNotFound(SessionId),

    #[error("Word source failed: {0}")]
    WordSource(String),
}

impl EngineError {
    /// Stable error code for wire messages
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InsufficientQuestions { .. } => "INSUFFICIENT_QUESTIONS",
            EngineError::DuplicateSubmission { .. } => "DUPLICATE_SUBMISSION",
            EngineError::SessionAlreadyCompleted => "SESSION_ALREADY_COMPLETED",
            EngineError::MatchmakingTimeout { .. } => "MATCHMAKING_TIMEOUT",
            EngineError::SessionNotStarted => "SESSION_NOT_STARTED",
            EngineError::SessionFull => "SESSION_FULL",
            EngineError::SessionInProgress => "SESSION_IN_PROGRESS",
            EngineError::UnknownParticipant(_) => "UNKNOWN_PARTICIPANT",
            EngineError::UnknownQuestion(_) => "UNKNOWN_QUESTION",
            EngineError::QuestionClosed(_) => "QUESTION_CLOSED",
            EngineError::InvalidOption { .. } => "INVALID_OPTION",
            EngineError::InvalidQuestion(_) => "INVALID_QUESTION",
            EngineError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            EngineError::WordSource(_) => "WORD_SOURCE",
        }
    }

    /// Errors where the original outcome stands and nothing changed
    pub fn is_ignorable(&self) -> bool {
        matches!(
            self,
            EngineError::DuplicateSubmission { .. } | EngineError::QuestionClosed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_no_op_rejections_are_ignorable() {
        let duplicate = EngineError::DuplicateSubmission {
            participant_id: "p1".to_string(),
            question_id: "q1".to_string(),
        };
        assert!(duplicate.is_ignorable());
        assert!(EngineError::QuestionClosed("q1".to_string()).is_ignorable());

        assert!(!EngineError::SessionAlreadyCompleted.is_ignorable());
        assert!(!EngineError::MatchmakingTimeout { ticks: 30 }.is_ignorable());
        assert!(!EngineError::InsufficientQuestions {
            requested: 5,
            available: 2
        }
        .is_ignorable());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            EngineError::SessionAlreadyCompleted.code(),
            "SESSION_ALREADY_COMPLETED"
        );
        let err = EngineError::InsufficientQuestions {
            requested: 5,
            available: 2,
        };
        assert_eq!(err.code(), "INSUFFICIENT_QUESTIONS");
        assert!(err.to_string().contains("5"));
    }
}
