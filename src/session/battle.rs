//! Two-seat timed battle
//!
//! A battle is created in `Matching` and starts once an opponent is seated.
//! Submissions only score; a question closes when every human seat has
//! answered or its countdown expires, whichever is handled first. Simulated
//! seats answer at close time.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{
    build_result, check_option, check_question, Progress, Resolution, ResultParts,
    SubmissionReceipt, TickOutcome,
};
use crate::clock::{Clock, ClockEvent, ClockHandle};
use crate::error::{EngineError, EngineResult};
use crate::scoring::{battle_outcome, Scorer};
use crate::types::{
    AnswerSubmission, Participant, ParticipantId, Question, ResultStatus, SessionId, SessionKind,
    SessionResult, SessionState,
};

const SIMULATED_NAMES: &[&str] = &[
    "Lexi", "Wordsworth", "Quill", "Vocab Vee", "Syllabot", "Noun Hunter",
];

/// Seeded stand-in for a second player
#[derive(Debug, Clone)]
pub struct SimulatedOpponent {
    rng: StdRng,
    correct_probability: f64,
}

impl SimulatedOpponent {
    pub fn new(seed: u64, correct_probability: f64) -> Self {
        let correct_probability = if correct_probability.is_nan() {
            0.0
        } else {
            correct_probability.clamp(0.0, 1.0)
        };
        Self {
            rng: StdRng::seed_from_u64(seed),
            correct_probability,
        }
    }

    pub fn correct_probability(&self) -> f64 {
        self.correct_probability
    }

    /// Pick an option: the correct one with the configured probability,
    /// otherwise a uniformly chosen wrong one
    pub fn choose(&mut self, question: &Question) -> usize {
        let options = question.options.len();
        if options < 2 || self.rng.random_bool(self.correct_probability) {
            return question.correct_option;
        }
        let pick = self.rng.random_range(0..options - 1);
        if pick >= question.correct_option {
            pick + 1
        } else {
            pick
        }
    }
}

/// The second seat of a battle
#[derive(Debug, Clone)]
pub enum Opponent {
    Human(Participant),
    Simulated {
        participant: Participant,
        brain: SimulatedOpponent,
    },
}

impl Opponent {
    pub fn simulated(seed: u64, correct_probability: f64) -> Self {
        let name = SIMULATED_NAMES[(seed % SIMULATED_NAMES.len() as u64) as usize];
        Opponent::Simulated {
            participant: Participant::new(format!("bot-{:016x}", seed), name),
            brain: SimulatedOpponent::new(seed, correct_probability),
        }
    }

    pub fn participant(&self) -> &Participant {
        match self {
            Opponent::Human(participant) => participant,
            Opponent::Simulated { participant, .. } => participant,
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, Opponent::Simulated { .. })
    }
}

#[derive(Debug, Clone)]
struct Seat {
    participant: Participant,
    brain: Option<SimulatedOpponent>,
    resolutions: Vec<Resolution>,
    answered_current: bool,
}

impl Seat {
    fn new(mut participant: Participant, brain: Option<SimulatedOpponent>) -> Self {
        participant.score = 0;
        Self {
            participant,
            brain,
            resolutions: Vec::new(),
            answered_current: false,
        }
    }

    fn is_human(&self) -> bool {
        self.brain.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct BattleSession {
    id: SessionId,
    questions: Vec<Arc<Question>>,
    timeout_ticks: u32,
    scorer: Scorer,
    clock: Clock,
    question_clock: Option<ClockHandle>,
    cursor: usize,
    state: SessionState,
    seats: Vec<Seat>,
    /// Human seats that answered the current question
    answered: usize,
    result: Option<SessionResult>,
}

impl BattleSession {
    pub fn new(
        id: SessionId,
        challenger: Participant,
        questions: Vec<Arc<Question>>,
        timeout_ticks: u32,
        scorer: Scorer,
    ) -> EngineResult<Self> {
        if questions.is_empty() {
            return Err(EngineError::InsufficientQuestions {
                requested: 1,
                available: 0,
            });
        }
        Ok(Self {
            id,
            questions,
            timeout_ticks,
            scorer,
            clock: Clock::new(),
            question_clock: None,
            cursor: 0,
            state: SessionState::Matching,
            seats: vec![Seat::new(challenger, None)],
            answered: 0,
            result: None,
        })
    }

    /// Fill the second seat and start question 0
    pub fn seat_opponent(&mut self, opponent: Opponent) -> EngineResult<Progress> {
        match self.state {
            SessionState::Completed => return Err(EngineError::SessionAlreadyCompleted),
            SessionState::InProgress { .. } => return Err(EngineError::SessionFull),
            SessionState::Idle | SessionState::Matching => {}
        }
        if self.seats.len() >= 2 {
            return Err(EngineError::SessionFull);
        }

        let seat = match opponent {
            Opponent::Human(participant) => Seat::new(participant, None),
            Opponent::Simulated { participant, brain } => Seat::new(participant, Some(brain)),
        };
        tracing::info!(
            "Battle {}: {} vs {}{}",
            self.id,
            self.seats[0].participant.id,
            seat.participant.id,
            if seat.is_human() { "" } else { " (simulated)" }
        );
        self.seats.push(seat);
        self.state = SessionState::InProgress { index: 0 };
        self.question_clock = Some(self.clock.start(self.timeout_ticks));
        Ok(Progress::Advanced { index: 0 })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn questions(&self) -> &[Arc<Question>] {
        &self.questions
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    pub fn question_index(&self) -> usize {
        self.cursor
    }

    pub fn current_question(&self) -> Option<&Arc<Question>> {
        match self.state {
            SessionState::InProgress { index } => self.questions.get(index),
            _ => None,
        }
    }

    pub fn remaining_ticks(&self) -> Option<u32> {
        self.clock.remaining()
    }

    pub fn clock_handle(&self) -> Option<ClockHandle> {
        self.question_clock
    }

    pub fn elapsed_ticks(&self) -> u64 {
        self.clock.elapsed()
    }

    pub fn result(&self) -> Option<&SessionResult> {
        self.result.as_ref()
    }

    /// The participant who opened the battle
    pub fn challenger(&self) -> &Participant {
        &self.seats[0].participant
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.seats.iter().map(|s| &s.participant)
    }

    pub fn participant(&self, participant_id: &str) -> Option<&Participant> {
        self.seat(participant_id).map(|s| &s.participant)
    }

    pub fn opponent_of(&self, participant_id: &str) -> Option<&Participant> {
        self.seats
            .iter()
            .find(|s| s.participant.id != participant_id)
            .filter(|_| self.seat(participant_id).is_some())
            .map(|s| &s.participant)
    }

    pub fn is_simulated(&self, participant_id: &str) -> bool {
        self.seat(participant_id).is_some_and(|s| !s.is_human())
    }

    /// Whether `participant_id` already answered the current question
    pub fn has_answered(&self, participant_id: &str) -> bool {
        self.seat(participant_id).is_some_and(|s| s.answered_current)
    }

    pub fn submit_answer(
        &mut self,
        participant_id: &str,
        question_id: &str,
        chosen_option: usize,
    ) -> EngineResult<SubmissionReceipt> {
        match self.state {
            SessionState::Completed => return Err(EngineError::SessionAlreadyCompleted),
            SessionState::Idle | SessionState::Matching => {
                return Err(EngineError::SessionNotStarted)
            }
            SessionState::InProgress { .. } => {}
        }
        let seat_index = self
            .seats
            .iter()
            .position(|s| s.participant.id == participant_id && s.is_human())
            .ok_or_else(|| EngineError::UnknownParticipant(participant_id.to_string()))?;

        let question = self.questions[self.cursor].clone();
        let seat = &self.seats[seat_index];
        if seat.answered_current && question.id == question_id {
            return Err(EngineError::DuplicateSubmission {
                participant_id: participant_id.to_string(),
                question_id: question_id.to_string(),
            });
        }
        check_question(
            &self.questions,
            self.cursor,
            question_id,
            participant_id,
            &seat.resolutions,
        )?;
        check_option(&question, chosen_option)?;

        let submission = AnswerSubmission {
            participant_id: participant_id.to_string(),
            question_id: question_id.to_string(),
            chosen_option,
            submitted_at_tick: self.clock.elapsed(),
        };
        let points = self.scorer.score(&submission, &question);
        let correct = question.is_correct(chosen_option);

        let seat = &mut self.seats[seat_index];
        seat.participant.score = seat.participant.score.saturating_add(points);
        seat.resolutions.push(Resolution::Answered { correct });
        seat.answered_current = true;
        self.answered += 1;

        tracing::debug!(
            "Battle {}: {} answered {} (correct={}, {}/{} in)",
            self.id,
            participant_id,
            question_id,
            correct,
            self.answered,
            self.human_seats()
        );

        let progress = if self.answered >= self.human_seats() {
            self.close_question()
        } else {
            Progress::Waiting
        };
        Ok(SubmissionReceipt {
            points,
            correct,
            progress,
        })
    }

    pub fn on_expired(&mut self, handle: ClockHandle) -> EngineResult<Option<Progress>> {
        if self.state.is_completed() {
            return Err(EngineError::SessionAlreadyCompleted);
        }
        if self.question_clock != Some(handle) {
            tracing::debug!("Battle {}: ignoring stale expiry", self.id);
            return Ok(None);
        }
        tracing::debug!("Battle {}: question {} timed out", self.id, self.cursor);
        Ok(Some(self.close_question()))
    }

    pub fn tick(&mut self) -> EngineResult<TickOutcome> {
        if self.state.is_completed() {
            return Err(EngineError::SessionAlreadyCompleted);
        }
        match self.clock.advance() {
            Some(ClockEvent::Tick { remaining, .. }) => Ok(TickOutcome::Counting { remaining }),
            Some(ClockEvent::Expired { handle }) => Ok(match self.on_expired(handle)? {
                Some(progress) => TickOutcome::Expired(progress),
                None => TickOutcome::Idle,
            }),
            None => Ok(TickOutcome::Idle),
        }
    }

    /// End early without outcomes. Works while still matching.
    pub fn abandon(&mut self) -> EngineResult<&SessionResult> {
        if self.state.is_completed() {
            return Err(EngineError::SessionAlreadyCompleted);
        }
        if let Some(handle) = self.question_clock.take() {
            self.clock.cancel(handle);
        }
        self.finish(ResultStatus::Abandoned);
        tracing::info!("Battle {} abandoned at question {}", self.id, self.cursor);
        self.result
            .as_ref()
            .ok_or(EngineError::SessionAlreadyCompleted)
    }

    fn seat(&self, participant_id: &str) -> Option<&Seat> {
        self.seats
            .iter()
            .find(|s| s.participant.id == participant_id)
    }

    fn human_seats(&self) -> usize {
        self.seats.iter().filter(|s| s.is_human()).count()
    }

    /// Settle the current question for every seat, then advance
    fn close_question(&mut self) -> Progress {
        if let Some(handle) = self.question_clock.take() {
            self.clock.cancel(handle);
        }
        let question = self.questions[self.cursor].clone();
        let tick = self.clock.elapsed();

        for seat in &mut self.seats {
            match seat.brain.as_mut() {
                Some(brain) => {
                    let chosen_option = brain.choose(&question);
                    let submission = AnswerSubmission {
                        participant_id: seat.participant.id.clone(),
                        question_id: question.id.clone(),
                        chosen_option,
                        submitted_at_tick: tick,
                    };
                    seat.participant.score = seat
                        .participant
                        .score
                        .saturating_add(self.scorer.score(&submission, &question));
                    seat.resolutions.push(Resolution::Answered {
                        correct: question.is_correct(chosen_option),
                    });
                }
                None if !seat.answered_current => seat.resolutions.push(Resolution::TimedOut),
                None => {}
            }
            seat.answered_current = false;
        }
        self.answered = 0;
        self.advance()
    }

    fn advance(&mut self) -> Progress {
        self.cursor += 1;
        if self.cursor < self.questions.len() {
            self.state = SessionState::InProgress { index: self.cursor };
            self.question_clock = Some(self.clock.start(self.timeout_ticks));
            Progress::Advanced { index: self.cursor }
        } else {
            self.finish(ResultStatus::Finished);
            Progress::Completed
        }
    }

    fn finish(&mut self, status: ResultStatus) {
        self.state = SessionState::Completed;

        let mut outcomes = BTreeMap::<ParticipantId, _>::new();
        if status == ResultStatus::Finished {
            if let [a, b] = self.seats.as_slice() {
                outcomes.insert(
                    a.participant.id.clone(),
                    battle_outcome(a.participant.score, b.participant.score),
                );
                outcomes.insert(
                    b.participant.id.clone(),
                    battle_outcome(b.participant.score, a.participant.score),
                );
                tracing::info!(
                    "Battle {} completed: {} {} - {} {}",
                    self.id,
                    a.participant.id,
                    a.participant.score,
                    b.participant.score,
                    b.participant.id
                );
            }
        }

        let seats: Vec<_> = self
            .seats
            .iter()
            .map(|s| (&s.participant, s.resolutions.as_slice(), !s.is_human()))
            .collect();
        self.result = Some(build_result(
            ResultParts {
                session_id: &self.id,
                kind: SessionKind::Battle,
                status,
                questions: &self.questions,
                completed_at_tick: self.clock.elapsed(),
            },
            &seats,
            outcomes,
        ));
    }
}
