use super::{AppState, SessionSlot};
use crate::broadcast;
use crate::clock::ClockHandle;
use crate::error::{EngineError, EngineResult};
use crate::matchmaker::MatchDecision;
use crate::protocol::{ServerMessage, SessionSnapshot};
use crate::session::{BattleSession, Opponent, Progress, SubmissionReceipt, TickOutcome};
use crate::types::*;
use std::sync::Arc;

impl AppState {
    /// Enter matchmaking. Pairs with the earliest waiting participant, or
    /// opens a battle in `Matching` with a deadline watcher.
    pub async fn join_battle(self: &Arc<Self>, participant: Participant) -> EngineResult<SessionSnapshot> {
        let seed = self.next_seed();
        let questions = self
            .bank
            .load_shuffled(self.config.battle_question_count, seed)?;

        // Registered before entering the pool so a pairing can always find it
        let id = ulid::Ulid::new().to_string();
        let session = BattleSession::new(
            id.clone(),
            participant.clone(),
            questions,
            self.config.battle_timeout_ticks,
            self.scorer(),
        )?;
        let offered = SessionSnapshot::from_battle(&session, seed);
        self.battles
            .write()
            .await
            .insert(id.clone(), SessionSlot::new(seed, session));

        loop {
            match self.matchmaker.find_opponent(&participant, &id).await {
                MatchDecision::Enqueued => {
                    tracing::info!("Battle {} opened by {}, matching", id, participant.id);
                    broadcast::spawn_matchmaking_watcher(self.clone(), id);
                    return Ok(offered);
                }
                MatchDecision::AlreadyWaiting(existing) => {
                    self.battles.write().await.remove(&id);
                    return self.battle_snapshot(&existing).await;
                }
                MatchDecision::Paired(waiter) => {
                    let seated = self
                        .seat_opponent(&waiter.session_id, Opponent::Human(participant.clone()))
                        .await;
                    match seated {
                        Ok(snapshot) => {
                            self.battles.write().await.remove(&id);
                            return Ok(snapshot);
                        }
                        // Waiter left between pairing and seating
                        Err(EngineError::SessionAlreadyCompleted)
                        | Err(EngineError::SessionNotFound(_)) => {
                            tracing::debug!(
                                "Battle {} gone before {} was seated, retrying",
                                waiter.session_id,
                                participant.id
                            );
                        }
                        Err(e) => {
                            self.battles.write().await.remove(&id);
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Seat an opponent in a matching battle and start its ticker
    pub async fn seat_opponent(
        self: &Arc<Self>,
        session_id: &str,
        opponent: Opponent,
    ) -> EngineResult<SessionSnapshot> {
        let slot = self.battle_slot(session_id).await?;
        let mut session = slot.session.lock().await;

        let simulated = opponent.is_simulated();
        let progress = session.seat_opponent(opponent)?;
        let snapshot = SessionSnapshot::from_battle(&session, slot.seed);
        let countdown = session.clock_handle();
        drop(session);

        self.broadcast_to_all(ServerMessage::Matched {
            session_id: session_id.to_string(),
            participants: snapshot.participants.clone(),
            simulated,
        });
        self.publish_progress(&snapshot, progress);
        if let Some(handle) = countdown {
            broadcast::spawn_session_ticker(
                self.clone(),
                SessionKind::Battle,
                session_id.to_string(),
                handle,
            );
        }

        Ok(snapshot)
    }

    /// Matchmaking deadline for a battle. `Ok(None)` if it was paired in time.
    pub async fn resolve_matchmaking_timeout(
        self: &Arc<Self>,
        session_id: &str,
    ) -> EngineResult<Option<SessionSnapshot>> {
        let slot = match self.battle_slot(session_id).await {
            Ok(slot) => slot,
            // Abandoned while matching
            Err(EngineError::SessionAlreadyCompleted) => return Ok(None),
            Err(e) => return Err(e),
        };

        match self.matchmaker.resolve_timeout(session_id, slot.seed).await {
            Ok(None) => Ok(None),
            Ok(Some(opponent)) => self.seat_opponent(session_id, opponent).await.map(Some),
            Err(e) => {
                let mut session = slot.session.lock().await;
                if !session.state().is_completed() {
                    let result = session.abandon()?.clone();
                    let snapshot = SessionSnapshot::from_battle(&session, slot.seed);
                    self.record_result(snapshot, result).await;
                }
                self.broadcast_to_all(ServerMessage::MatchmakingFailed {
                    session_id: session_id.to_string(),
                    code: e.code().to_string(),
                    msg: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn battle_slot(&self, session_id: &str) -> EngineResult<Arc<SessionSlot<BattleSession>>> {
        self.live_slot(&self.battles, session_id).await
    }

    pub async fn battle_snapshot(&self, session_id: &str) -> EngineResult<SessionSnapshot> {
        match self.battle_slot(session_id).await {
            Ok(slot) => {
                let session = slot.session.lock().await;
                Ok(SessionSnapshot::from_battle(&session, slot.seed))
            }
            Err(EngineError::SessionAlreadyCompleted) => self.finished_snapshot(session_id).await,
            Err(e) => Err(e),
        }
    }

    pub async fn submit_battle_answer(
        self: &Arc<Self>,
        session_id: &str,
        participant_id: &str,
        question_id: &str,
        option: usize,
    ) -> EngineResult<SubmissionReceipt> {
        let slot = self.battle_slot(session_id).await?;
        let mut session = slot.session.lock().await;

        let receipt = session
            .submit_answer(participant_id, question_id, option)
            .inspect_err(|e| {
                if e.is_ignorable() {
                    tracing::debug!("Battle {}: {}", session_id, e);
                }
            })?;

        self.broadcast_to_all(ServerMessage::AnswerAccepted {
            session_id: session_id.to_string(),
            question_id: question_id.to_string(),
            participant_id: participant_id.to_string(),
            points: receipt.points,
            correct: receipt.correct,
            score: session
                .participant(participant_id)
                .map(|p| p.score)
                .unwrap_or(0),
        });
        self.settle_battle(&session, slot.seed, receipt.progress).await;
        Ok(receipt)
    }

    pub async fn tick_battle(
        self: &Arc<Self>,
        session_id: &str,
        armed: Option<ClockHandle>,
    ) -> EngineResult<TickOutcome> {
        let slot = self.battle_slot(session_id).await?;
        let mut session = slot.session.lock().await;
        if armed.is_some() && session.clock_handle() != armed {
            return Ok(TickOutcome::Idle);
        }

        let outcome = session.tick()?;
        self.publish_tick(session_id, outcome);
        if let TickOutcome::Expired(progress) = outcome {
            self.settle_battle(&session, slot.seed, progress).await;
        }
        Ok(outcome)
    }

    pub async fn abandon_battle(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> EngineResult<SessionResult> {
        let slot = self.battle_slot(session_id).await?;
        let mut session = slot.session.lock().await;
        if session.participant(participant_id).is_none() || session.is_simulated(participant_id) {
            return Err(EngineError::UnknownParticipant(participant_id.to_string()));
        }

        let result = session.abandon()?.clone();
        self.matchmaker.withdraw(session_id).await;
        let snapshot = SessionSnapshot::from_battle(&session, slot.seed);
        self.record_result(snapshot, result.clone()).await;
        Ok(result)
    }

    /// Queue up again after a finished battle
    pub async fn request_rematch(
        self: &Arc<Self>,
        session_id: &str,
        participant_id: &str,
    ) -> EngineResult<SessionSnapshot> {
        let snapshot = self.battle_snapshot(session_id).await?;
        if !snapshot.state.is_completed() {
            return Err(EngineError::SessionInProgress);
        }
        let participant = match snapshot.participants.iter().find(|p| p.id == participant_id) {
            Some(p) if !snapshot.simulated.iter().any(|id| id == participant_id) => {
                Participant::new(p.id.clone(), p.display_name.clone())
            }
            _ => return Err(EngineError::UnknownParticipant(participant_id.to_string())),
        };

        tracing::info!("{} requested a rematch after battle {}", participant.id, session_id);
        self.join_battle(participant).await
    }

    async fn settle_battle(self: &Arc<Self>, session: &BattleSession, seed: u64, progress: Progress) {
        let snapshot = SessionSnapshot::from_battle(session, seed);
        self.publish_progress(&snapshot, progress);
        match progress {
            Progress::Advanced { .. } => {
                if let Some(handle) = session.clock_handle() {
                    broadcast::spawn_session_ticker(
                        self.clone(),
                        SessionKind::Battle,
                        session.id().clone(),
                        handle,
                    );
                }
            }
            Progress::Completed => {
                if let Some(result) = session.result() {
                    self.record_result(snapshot, result.clone()).await;
                }
            }
            Progress::Waiting => {}
        }
    }
}
