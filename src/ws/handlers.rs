//! WebSocket message dispatch
//!
//! Each client message maps to one `AppState` operation. Engine errors
//! come back as `ServerMessage::Error` with the error's code.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::Progress;
use crate::state::AppState;
use crate::types::Participant;
use std::sync::Arc;

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    participant: &Participant,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    let response = match msg {
        ClientMessage::StartQuiz { question_count } => {
            tracing::info!("{} starts a quiz", participant.id);
            state
                .start_assessment(participant.clone(), question_count)
                .await
                .map(|session| ServerMessage::SessionStarted { session })
        }

        ClientMessage::JoinBattle => {
            tracing::info!("{} joins matchmaking", participant.id);
            state
                .join_battle(participant.clone())
                .await
                .map(|session| ServerMessage::SessionStarted { session })
        }

        ClientMessage::SubmitAnswer {
            session_id,
            question_id,
            option,
        } => state
            .submit_answer(&session_id, &participant.id, &question_id, option)
            .await
            .map(|receipt| ServerMessage::AnswerReceived {
                session_id,
                question_id,
                points: receipt.points,
                correct: receipt.correct,
                advanced: receipt.progress != Progress::Waiting,
            }),

        ClientMessage::Abandon { session_id } => state
            .abandon(&session_id, &participant.id)
            .await
            .map(|_| ServerMessage::Abandoned { session_id }),

        ClientMessage::GetSession { session_id } => state
            .snapshot(&session_id)
            .await
            .map(|session| ServerMessage::Session { session }),

        ClientMessage::GetLeaderboard { metric } => Ok(ServerMessage::Leaderboard {
            metric,
            entries: state.leaderboard(metric).await,
        }),

        ClientMessage::Rematch { session_id } => state
            .request_rematch(&session_id, &participant.id)
            .await
            .map(|session| ServerMessage::SessionStarted { session }),
    };

    match response {
        Ok(msg) => Some(msg),
        Err(e) => {
            if e.is_ignorable() {
                tracing::debug!("Ignored request from {}: {}", participant.id, e);
            } else {
                tracing::warn!("Request from {} failed: {}", participant.id, e);
            }
            Some(e.into())
        }
    }
}
