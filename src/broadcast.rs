use crate::clock::ClockHandle;
use crate::session::TickOutcome;
use crate::state::AppState;
use crate::types::SessionKind;
use std::sync::Arc;

/// Spawn the task that feeds one tick per tick interval into a question's
/// countdown. Each countdown gets its own ticker, so a question always starts
/// a full interval before its first tick. The task ends with its countdown.
pub fn spawn_session_ticker(
    state: Arc<AppState>,
    kind: SessionKind,
    session_id: String,
    countdown: ClockHandle,
) {
    let interval = state.config.tick_interval;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            match state.tick_countdown(kind, &session_id, Some(countdown)).await {
                Ok(TickOutcome::Counting { .. }) => {}
                // Expired, or superseded by a submission
                Ok(_) => break,
                Err(e) => {
                    tracing::debug!("Ticker for {} stopped: {}", session_id, e);
                    break;
                }
            }
        }
    });
}

/// Spawn a background task that resolves a battle still matching when its deadline passes
pub fn spawn_matchmaking_watcher(state: Arc<AppState>, session_id: String) {
    let deadline = state.config.matchmaking_timeout();
    tokio::spawn(async move {
        tokio::time::sleep(deadline).await;

        match state.resolve_matchmaking_timeout(&session_id).await {
            Ok(Some(_)) => {
                tracing::info!("Battle {} started against a simulated opponent", session_id)
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Matchmaking for battle {} failed: {}", session_id, e),
        }
    });
}

#[cfg(test)]
mod tests {
    use crate::state::test_support::state;
    use crate::types::{Participant, ResultStatus, SessionState};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_ticker_expires_unanswered_quiz() {
        let state = state();
        let snapshot = state
            .start_assessment(Participant::new("alice", "Alice"), None)
            .await
            .unwrap();

        // Two questions at 30 ticks each, one second per tick
        tokio::time::sleep(Duration::from_secs(61)).await;

        let after = state.snapshot(&snapshot.session_id).await.unwrap();
        assert_eq!(after.state, SessionState::Completed);
        let results = state.results().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ResultStatus::Finished);
        assert_eq!(results[0].correct_count("alice"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_answer_rearms_countdown_for_next_question() {
        let state = state();
        let snapshot = state
            .start_assessment(Participant::new("alice", "Alice"), None)
            .await
            .unwrap();
        let id = snapshot.session_id;

        // Answer late in the first interval
        tokio::time::sleep(Duration::from_millis(950)).await;
        let first = snapshot.current_question.unwrap();
        state.submit_answer(&id, "alice", &first.id, 0).await.unwrap();
        assert_eq!(state.snapshot(&id).await.unwrap().remaining_ticks, Some(30));

        // The old interval ends here; the new question must not lose a tick
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(state.snapshot(&id).await.unwrap().remaining_ticks, Some(30));

        tokio::time::sleep(Duration::from_millis(950)).await;
        assert_eq!(state.snapshot(&id).await.unwrap().remaining_ticks, Some(29));

        // Full countdown from the answer, not from the session start
        tokio::time::sleep(Duration::from_secs(28)).await;
        let at_last_tick = state.snapshot(&id).await.unwrap();
        assert_eq!(at_last_tick.remaining_ticks, Some(1));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            state.snapshot(&id).await.unwrap().state,
            SessionState::Completed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_seats_simulated_opponent() {
        let state = state();
        let snapshot = state
            .join_battle(Participant::new("alice", "Alice"))
            .await
            .unwrap();
        assert_eq!(snapshot.state, SessionState::Matching);

        tokio::time::sleep(state.config.matchmaking_timeout() + Duration::from_millis(10)).await;

        let after = state.snapshot(&snapshot.session_id).await.unwrap();
        assert_eq!(after.state, SessionState::InProgress { index: 0 });
        assert_eq!(after.simulated.len(), 1);
    }
}
