//! Battle matchmaking
//!
//! Waiting participants sit in a FIFO pool. Pairing pops the earliest waiter
//! under the pool lock, so nobody can be handed out twice.

use std::collections::VecDeque;

use tokio::sync::Mutex;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::session::Opponent;
use crate::types::{Participant, SessionId};

/// A participant parked in the pool with the battle they opened
#[derive(Debug, Clone, PartialEq)]
pub struct Waiting {
    pub participant: Participant,
    pub session_id: SessionId,
}

#[derive(Debug, Default)]
pub struct MatchPool {
    waiting: VecDeque<Waiting>,
}

impl MatchPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    pub fn contains_session(&self, session_id: &str) -> bool {
        self.waiting.iter().any(|w| w.session_id == session_id)
    }

    /// Session a participant is currently waiting in
    pub fn session_of(&self, participant_id: &str) -> Option<&SessionId> {
        self.waiting
            .iter()
            .find(|w| w.participant.id == participant_id)
            .map(|w| &w.session_id)
    }

    /// Remove and return the earliest waiter that is not `participant_id`
    pub fn pair(&mut self, participant_id: &str) -> Option<Waiting> {
        let index = self
            .waiting
            .iter()
            .position(|w| w.participant.id != participant_id)?;
        self.waiting.remove(index)
    }

    /// Returns false when the participant is already waiting
    pub fn enqueue(&mut self, participant: Participant, session_id: SessionId) -> bool {
        if self.session_of(&participant.id).is_some() {
            return false;
        }
        self.waiting.push_back(Waiting {
            participant,
            session_id,
        });
        true
    }

    pub fn withdraw(&mut self, session_id: &str) -> Option<Waiting> {
        let index = self
            .waiting
            .iter()
            .position(|w| w.session_id == session_id)?;
        self.waiting.remove(index)
    }
}

/// What `find_opponent` decided for the caller
#[derive(Debug, Clone, PartialEq)]
pub enum MatchDecision {
    /// Seat the caller in the waiter's battle
    Paired(Waiting),
    /// Caller is now waiting in the battle it offered
    Enqueued,
    /// Caller was already waiting in this battle
    AlreadyWaiting(SessionId),
}

#[derive(Debug)]
pub struct Matchmaker {
    pool: Mutex<MatchPool>,
    allow_simulated: bool,
    correct_probability: f64,
    timeout_ticks: u32,
}

impl Matchmaker {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            pool: Mutex::new(MatchPool::new()),
            allow_simulated: config.allow_simulated_opponents,
            correct_probability: config.simulated_opponent_correct_probability,
            timeout_ticks: config.matchmaking_timeout_ticks,
        }
    }

    /// Pair `participant` with the earliest waiter, or park them in
    /// `session_id` until someone arrives or the deadline passes
    pub async fn find_opponent(
        &self,
        participant: &Participant,
        session_id: &SessionId,
    ) -> MatchDecision {
        let mut pool = self.pool.lock().await;
        if let Some(existing) = pool.session_of(&participant.id) {
            return MatchDecision::AlreadyWaiting(existing.clone());
        }
        if let Some(waiter) = pool.pair(&participant.id) {
            tracing::info!(
                "Matched {} with {} (battle {})",
                participant.id,
                waiter.participant.id,
                waiter.session_id
            );
            return MatchDecision::Paired(waiter);
        }
        pool.enqueue(participant.clone(), session_id.clone());
        tracing::debug!(
            "{} waiting for an opponent in battle {} ({} in pool)",
            participant.id,
            session_id,
            pool.len()
        );
        MatchDecision::Enqueued
    }

    /// Deadline reached for `session_id`. `Ok(None)` if it was paired in the
    /// meantime, otherwise a simulated opponent or `MatchmakingTimeout`.
    pub async fn resolve_timeout(
        &self,
        session_id: &str,
        seed: u64,
    ) -> EngineResult<Option<Opponent>> {
        let waiter = self.pool.lock().await.withdraw(session_id);
        let Some(waiter) = waiter else {
            return Ok(None);
        };
        if !self.allow_simulated {
            tracing::warn!(
                "No opponent for {} within {} ticks",
                waiter.participant.id,
                self.timeout_ticks
            );
            return Err(EngineError::MatchmakingTimeout {
                ticks: self.timeout_ticks,
            });
        }
        tracing::info!(
            "No opponent for {}, seating a simulated one",
            waiter.participant.id
        );
        Ok(Some(Opponent::simulated(seed, self.correct_probability)))
    }

    /// Drop a battle from the pool (abandoned while matching)
    pub async fn withdraw(&self, session_id: &str) -> bool {
        self.pool.lock().await.withdraw(session_id).is_some()
    }

    pub async fn waiting_count(&self) -> usize {
        self.pool.lock().await.len()
    }

    pub async fn is_waiting(&self, session_id: &str) -> bool {
        self.pool.lock().await.contains_session(session_id)
    }
}
