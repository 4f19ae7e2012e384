use crate::leaderboard::{Metric, RankingEntry};
use crate::session::{AssessmentSession, BattleSession};
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a solo quiz
    StartQuiz {
        #[serde(default)]
        question_count: Option<usize>,
    },
    /// Enter matchmaking for a battle
    JoinBattle,
    SubmitAnswer {
        session_id: SessionId,
        question_id: QuestionId,
        option: usize,
    },
    Abandon {
        session_id: SessionId,
    },
    GetSession {
        session_id: SessionId,
    },
    GetLeaderboard {
        #[serde(default)]
        metric: Metric,
    },
    /// Play again after a finished battle
    Rematch {
        session_id: SessionId,
    },
}

/// A question as shown to participants (no answer key)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionView {
    pub id: QuestionId,
    pub prompt: String,
    pub options: Vec<String>,
}

impl From<&Question> for QuestionView {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id.clone(),
            prompt: question.prompt.clone(),
            options: question.options.clone(),
        }
    }
}

/// Point-in-time view of a session for polling clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub kind: SessionKind,
    pub state: SessionState,
    pub participants: Vec<Participant>,
    /// Ids of participants played by the engine
    #[serde(default)]
    pub simulated: Vec<ParticipantId>,
    pub question_index: usize,
    pub total_questions: usize,
    pub current_question: Option<QuestionView>,
    pub remaining_ticks: Option<u32>,
    /// Seed used for question selection and simulation
    pub seed: u64,
    pub result: Option<SessionResult>,
}

impl SessionSnapshot {
    pub fn from_assessment(session: &AssessmentSession, seed: u64) -> Self {
        Self {
            session_id: session.id().clone(),
            kind: SessionKind::Assessment,
            state: session.state(),
            participants: vec![session.participant().clone()],
            simulated: Vec::new(),
            question_index: session.question_index(),
            total_questions: session.total_questions(),
            current_question: session.current_question().map(|q| q.as_ref().into()),
            remaining_ticks: session.remaining_ticks(),
            seed,
            result: session.result().cloned(),
        }
    }

    pub fn from_battle(session: &BattleSession, seed: u64) -> Self {
        Self {
            session_id: session.id().clone(),
            kind: SessionKind::Battle,
            state: session.state(),
            participants: session.participants().cloned().collect(),
            simulated: session
                .participants()
                .filter(|p| session.is_simulated(&p.id))
                .map(|p| p.id.clone())
                .collect(),
            question_index: session.question_index(),
            total_questions: session.total_questions(),
            current_question: session.current_question().map(|q| q.as_ref().into()),
            remaining_ticks: session.remaining_ticks(),
            seed,
            result: session.result().cloned(),
        }
    }

    pub fn has_participant(&self, participant_id: &str) -> bool {
        self.participants.iter().any(|p| p.id == participant_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        participant_id: ParticipantId,
        server_now: String,
    },
    /// Reply to `StartQuiz`, `JoinBattle` and `Rematch` (battles may still be matching)
    SessionStarted {
        session: SessionSnapshot,
    },
    /// Reply to `GetSession`
    Session {
        session: SessionSnapshot,
    },
    /// Reply to `SubmitAnswer`
    AnswerReceived {
        session_id: SessionId,
        question_id: QuestionId,
        points: u32,
        correct: bool,
        /// Whether the question closed and the session moved on
        advanced: bool,
    },
    /// Reply to `Abandon`
    Abandoned {
        session_id: SessionId,
    },
    /// A new question is live
    Question {
        session_id: SessionId,
        index: usize,
        total: usize,
        question: QuestionView,
        remaining_ticks: u32,
    },
    Tick {
        session_id: SessionId,
        remaining: u32,
    },
    AnswerAccepted {
        session_id: SessionId,
        question_id: QuestionId,
        participant_id: ParticipantId,
        points: u32,
        correct: bool,
        score: u32,
    },
    /// Opponent seated, battle begins
    Matched {
        session_id: SessionId,
        participants: Vec<Participant>,
        simulated: bool,
    },
    MatchmakingFailed {
        session_id: SessionId,
        code: String,
        msg: String,
    },
    SessionCompleted {
        result: SessionResult,
    },
    Leaderboard {
        metric: Metric,
        entries: Vec<RankingEntry>,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    /// Session this message belongs to, if any
    pub fn session_id(&self) -> Option<&str> {
        match self {
            ServerMessage::SessionStarted { session } | ServerMessage::Session { session } => {
                Some(session.session_id.as_str())
            }
            ServerMessage::Question { session_id, .. }
            | ServerMessage::AnswerReceived { session_id, .. }
            | ServerMessage::Abandoned { session_id, .. }
            | ServerMessage::Tick { session_id, .. }
            | ServerMessage::AnswerAccepted { session_id, .. }
            | ServerMessage::Matched { session_id, .. }
            | ServerMessage::MatchmakingFailed { session_id, .. } => Some(session_id.as_str()),
            ServerMessage::SessionCompleted { result } => Some(result.session_id.as_str()),
            ServerMessage::Welcome { .. }
            | ServerMessage::Leaderboard { .. }
            | ServerMessage::Error { .. } => None,
        }
    }

    /// Whether `participant_id` takes part in the session this message is about
    pub fn concerns(&self, participant_id: &str) -> bool {
        match self {
            ServerMessage::SessionStarted { session } | ServerMessage::Session { session } => {
                session.has_participant(participant_id)
            }
            ServerMessage::Matched { participants, .. } => {
                participants.iter().any(|p| p.id == participant_id)
            }
            ServerMessage::SessionCompleted { result } => {
                result.participant(participant_id).is_some()
            }
            _ => false,
        }
    }
}

impl From<crate::error::EngineError> for ServerMessage {
    fn from(err: crate::error::EngineError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            msg: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[test]
    fn test_client_message_parsing() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"t":"submit_answer","session_id":"s1","question_id":"q1","option":2}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::SubmitAnswer {
                session_id,
                question_id,
                option,
            } => {
                assert_eq!(session_id, "s1");
                assert_eq!(question_id, "q1");
                assert_eq!(option, 2);
            }
            other => panic!("unexpected message {:?}", other),
        }

        let msg: ClientMessage = serde_json::from_str(r#"{"t":"get_leaderboard"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::GetLeaderboard {
                metric: Metric::TotalScore
            }
        ));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"t":"get_leaderboard","metric":"win_rate"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::GetLeaderboard {
                metric: Metric::WinRate
            }
        ));
    }

    #[test]
    fn test_question_view_hides_answer() {
        let question = Question {
            id: "q1".to_string(),
            prompt: "apple".to_string(),
            options: vec!["苹果".to_string(), "香蕉".to_string()],
            correct_option: 0,
        };
        let json = serde_json::to_value(QuestionView::from(&question)).unwrap();
        assert!(json.get("correct_option").is_none());
        assert_eq!(json["prompt"], "apple");
    }

    #[test]
    fn test_error_conversion() {
        let msg = ServerMessage::from(EngineError::SessionAlreadyCompleted);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["t"], "error");
        assert_eq!(json["code"], "SESSION_ALREADY_COMPLETED");
    }

    #[test]
    fn test_session_id_routing() {
        let tick = ServerMessage::Tick {
            session_id: "s1".to_string(),
            remaining: 3,
        };
        assert_eq!(tick.session_id(), Some("s1"));
        assert!(!tick.concerns("p1"));

        let matched = ServerMessage::Matched {
            session_id: "s2".to_string(),
            participants: vec![Participant::new("p1", "A"), Participant::new("p2", "B")],
            simulated: false,
        };
        assert!(matched.concerns("p2"));
        assert!(!matched.concerns("p3"));
    }
}
