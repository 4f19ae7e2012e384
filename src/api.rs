//! HTTP API endpoints for read-only views.
//!
//! Leaderboards, session snapshots and the result log, for UIs that poll
//! instead of holding a WebSocket open.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::EngineError;
use crate::leaderboard::{Metric, ParticipantSnapshot, RankingEntry};
use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::SessionResult;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/leaderboard", get(leaderboard))
        .route("/api/participants", get(participants))
        .route("/api/sessions/{id}", get(session))
        .route("/api/results", get(results))
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default)]
    pub metric: Metric,
}

/// GET /api/leaderboard?metric=total_score|words_learned|win_rate
pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LeaderboardQuery>,
) -> Json<Vec<RankingEntry>> {
    Json(state.leaderboard(query.metric).await)
}

/// GET /api/participants
pub async fn participants(State(state): State<Arc<AppState>>) -> Json<Vec<ParticipantSnapshot>> {
    Json(state.participant_stats().await)
}

/// GET /api/sessions/{id}
pub async fn session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.snapshot(&id).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    pub participant_id: Option<String>,
}

/// GET /api/results[?participant_id=...]
pub async fn results(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ResultsQuery>,
) -> Json<Vec<SessionResult>> {
    match query.participant_id {
        Some(id) => Json(state.results_for(&id).await),
        None => Json(state.results().await),
    }
}

fn error_response(e: EngineError) -> Response {
    let status = match e {
        EngineError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(ServerMessage::from(e))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::state;
    use crate::types::Participant;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_session_endpoint() {
        let state = state();
        let snapshot = state
            .start_assessment(Participant::new("alice", "Alice"), None)
            .await
            .unwrap();

        let app = routes().with_state(state.clone());
        let (status, body) = get_json(app, &format!("/api/sessions/{}", snapshot.session_id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kind"], "assessment");
        assert_eq!(body["state"]["state"], "in_progress");
        assert!(body["current_question"].get("correct_option").is_none());

        let app = routes().with_state(state);
        let (status, body) = get_json(app, "/api/sessions/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_leaderboard_and_results_endpoints() {
        let state = state();
        for who in ["bob", "alice"] {
            let id = state
                .start_assessment(Participant::new(who, who), None)
                .await
                .unwrap()
                .session_id;
            state.abandon(&id, who).await.unwrap();
        }

        let (status, body) = get_json(
            routes().with_state(state.clone()),
            "/api/leaderboard?metric=win_rate",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["participant_id"], "alice");
        assert_eq!(entries[0]["rank"], 1);

        let (_, body) = get_json(
            routes().with_state(state.clone()),
            "/api/results?participant_id=bob",
        )
        .await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (_, body) = get_json(routes().with_state(state), "/api/results").await;
        assert_eq!(body.as_array().unwrap().len(), 2);
    }
}
