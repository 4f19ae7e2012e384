mod assessment;
mod battle;
mod leaderboard;

use crate::bank::QuestionBank;
use crate::clock::ClockHandle;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::matchmaker::Matchmaker;
use crate::protocol::{ServerMessage, SessionSnapshot};
use crate::scoring::Scorer;
use crate::session::{AssessmentSession, BattleSession, Progress, SubmissionReceipt, TickOutcome};
use crate::types::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

/// A registered session behind its single-writer lock
#[derive(Debug)]
pub struct SessionSlot<S> {
    /// Seed the session's questions (and simulated opponent) were drawn from
    pub seed: u64,
    pub session: Mutex<S>,
}

impl<S> SessionSlot<S> {
    fn new(seed: u64, session: S) -> Arc<Self> {
        Arc::new(Self {
            seed,
            session: Mutex::new(session),
        })
    }
}

type Registry<S> = Arc<RwLock<HashMap<SessionId, Arc<SessionSlot<S>>>>>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: EngineConfig,
    pub bank: Arc<dyn QuestionBank>,
    pub assessments: Registry<AssessmentSession>,
    pub battles: Registry<BattleSession>,
    pub matchmaker: Arc<Matchmaker>,
    /// Final snapshots of completed sessions, whose slots have been released
    pub finished: Arc<RwLock<HashMap<SessionId, SessionSnapshot>>>,
    /// Every completed session, in completion order
    pub results: Arc<RwLock<Vec<SessionResult>>>,
    /// Session events for connected clients
    pub broadcast: broadcast::Sender<ServerMessage>,
    seeds: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(config: EngineConfig, bank: Arc<dyn QuestionBank>) -> Self {
        let (tx, _rx) = broadcast::channel(256);
        let first_seed = config.seed.unwrap_or_else(rand::random);
        Self {
            matchmaker: Arc::new(Matchmaker::new(&config)),
            config,
            bank,
            assessments: Arc::new(RwLock::new(HashMap::new())),
            battles: Arc::new(RwLock::new(HashMap::new())),
            finished: Arc::new(RwLock::new(HashMap::new())),
            results: Arc::new(RwLock::new(Vec::new())),
            broadcast: tx,
            seeds: Arc::new(AtomicU64::new(first_seed)),
        }
    }

    /// Broadcast a message to all subscribers
    pub fn broadcast_to_all(&self, msg: ServerMessage) {
        // No subscribers is fine
        let _ = self.broadcast.send(msg);
    }

    pub(crate) fn scorer(&self) -> Scorer {
        Scorer::new(self.config.points_per_correct_answer)
    }

    /// Per-session seed. Sequential from the configured seed so runs with
    /// `ENGINE_SEED` set are reproducible.
    pub(crate) fn next_seed(&self) -> u64 {
        self.seeds.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn find_kind(&self, session_id: &str) -> Option<SessionKind> {
        if self.assessments.read().await.contains_key(session_id) {
            Some(SessionKind::Assessment)
        } else if self.battles.read().await.contains_key(session_id) {
            Some(SessionKind::Battle)
        } else {
            self.finished
                .read()
                .await
                .get(session_id)
                .map(|snapshot| snapshot.kind)
        }
    }

    /// Look up a live session. Completed sessions are no longer live and
    /// report `SessionAlreadyCompleted`.
    async fn live_slot<S>(
        &self,
        registry: &Registry<S>,
        session_id: &str,
    ) -> EngineResult<Arc<SessionSlot<S>>> {
        if let Some(slot) = registry.read().await.get(session_id).cloned() {
            return Ok(slot);
        }
        if self.finished.read().await.contains_key(session_id) {
            Err(EngineError::SessionAlreadyCompleted)
        } else {
            Err(EngineError::SessionNotFound(session_id.to_string()))
        }
    }

    async fn finished_snapshot(&self, session_id: &str) -> EngineResult<SessionSnapshot> {
        self.finished
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))
    }

    pub async fn snapshot(&self, session_id: &str) -> EngineResult<SessionSnapshot> {
        match self.find_kind(session_id).await {
            Some(SessionKind::Assessment) => self.assessment_snapshot(session_id).await,
            Some(SessionKind::Battle) => self.battle_snapshot(session_id).await,
            None => Err(EngineError::SessionNotFound(session_id.to_string())),
        }
    }

    pub async fn submit_answer(
        self: &Arc<Self>,
        session_id: &str,
        participant_id: &str,
        question_id: &str,
        option: usize,
    ) -> EngineResult<SubmissionReceipt> {
        match self.find_kind(session_id).await {
            Some(SessionKind::Assessment) => {
                self.submit_assessment_answer(session_id, participant_id, question_id, option)
                    .await
            }
            Some(SessionKind::Battle) => {
                self.submit_battle_answer(session_id, participant_id, question_id, option)
                    .await
            }
            None => Err(EngineError::SessionNotFound(session_id.to_string())),
        }
    }

    /// Advance a session's clock by one tick
    pub async fn tick_session(
        self: &Arc<Self>,
        kind: SessionKind,
        session_id: &str,
    ) -> EngineResult<TickOutcome> {
        self.tick_countdown(kind, session_id, None).await
    }

    /// Tick a session on behalf of the ticker armed for `armed`. Once that
    /// countdown is no longer live the tick is dropped and `Idle` returned.
    pub async fn tick_countdown(
        self: &Arc<Self>,
        kind: SessionKind,
        session_id: &str,
        armed: Option<ClockHandle>,
    ) -> EngineResult<TickOutcome> {
        match kind {
            SessionKind::Assessment => self.tick_assessment(session_id, armed).await,
            SessionKind::Battle => self.tick_battle(session_id, armed).await,
        }
    }

    /// End a session early on behalf of one of its participants
    pub async fn abandon(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> EngineResult<SessionResult> {
        match self.find_kind(session_id).await {
            Some(SessionKind::Assessment) => {
                self.abandon_assessment(session_id, participant_id).await
            }
            Some(SessionKind::Battle) => self.abandon_battle(session_id, participant_id).await,
            None => Err(EngineError::SessionNotFound(session_id.to_string())),
        }
    }

    /// Abandon every live session a participant is in (connection lost)
    pub async fn abandon_all_for(&self, participant_id: &str) -> usize {
        let assessments: Vec<_> = self.assessments.read().await.values().cloned().collect();
        let battles: Vec<_> = self.battles.read().await.values().cloned().collect();

        let mut ids = Vec::new();
        for slot in assessments {
            let session = slot.session.lock().await;
            if session.participant().id == participant_id && !session.state().is_completed() {
                ids.push(session.id().clone());
            }
        }
        for slot in battles {
            let session = slot.session.lock().await;
            if session.participant(participant_id).is_some() && !session.state().is_completed() {
                ids.push(session.id().clone());
            }
        }

        let mut abandoned = 0;
        for id in ids {
            if self.abandon(&id, participant_id).await.is_ok() {
                abandoned += 1;
            }
        }
        abandoned
    }

    pub async fn results(&self) -> Vec<SessionResult> {
        self.results.read().await.clone()
    }

    pub async fn results_for(&self, participant_id: &str) -> Vec<SessionResult> {
        self.results
            .read()
            .await
            .iter()
            .filter(|r| r.participant(participant_id).is_some())
            .cloned()
            .collect()
    }

    /// Retire a completed session: keep its final snapshot, release the slot
    /// and append the result. Called once per session, at the transition into
    /// `Completed`, while the session lock is held.
    pub(crate) async fn record_result(&self, snapshot: SessionSnapshot, result: SessionResult) {
        let kind = snapshot.kind;
        self.finished
            .write()
            .await
            .insert(result.session_id.clone(), snapshot);
        match kind {
            SessionKind::Assessment => {
                self.assessments.write().await.remove(&result.session_id);
            }
            SessionKind::Battle => {
                self.battles.write().await.remove(&result.session_id);
            }
        }

        self.results.write().await.push(result.clone());
        self.broadcast_to_all(ServerMessage::SessionCompleted { result });
    }

    /// Publish the events that follow a state change
    pub(crate) fn publish_progress(&self, snapshot: &SessionSnapshot, progress: Progress) {
        if let Progress::Advanced { index } = progress {
            if let Some(question) = &snapshot.current_question {
                self.broadcast_to_all(ServerMessage::Question {
                    session_id: snapshot.session_id.clone(),
                    index,
                    total: snapshot.total_questions,
                    question: question.clone(),
                    remaining_ticks: snapshot.remaining_ticks.unwrap_or(0),
                });
            }
        }
    }

    pub(crate) fn publish_tick(&self, session_id: &str, outcome: TickOutcome) {
        if let TickOutcome::Counting { remaining } = outcome {
            self.broadcast_to_all(ServerMessage::Tick {
                session_id: session_id.to_string(),
                remaining,
            });
        }
    }
}
