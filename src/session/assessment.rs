//! Single-participant timed quiz
//!
//! Starts in `InProgress { index: 0 }` with a countdown running. Each
//! question ends either by a submission or by expiry; both paths share the
//! same advance step, and whichever arrives first settles the question.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{
    build_result, check_option, check_question, Progress, Resolution, ResultParts,
    SubmissionReceipt, TickOutcome,
};
use crate::clock::{Clock, ClockEvent, ClockHandle};
use crate::error::{EngineError, EngineResult};
use crate::scoring::Scorer;
use crate::types::{
    AnswerSubmission, Participant, Question, ResultStatus, SessionId, SessionKind, SessionResult,
    SessionState,
};

#[derive(Debug, Clone)]
pub struct AssessmentSession {
    id: SessionId,
    participant: Participant,
    questions: Vec<Arc<Question>>,
    timeout_ticks: u32,
    scorer: Scorer,
    clock: Clock,
    /// Countdown of the current question
    question_clock: Option<ClockHandle>,
    cursor: usize,
    state: SessionState,
    resolutions: Vec<Resolution>,
    result: Option<SessionResult>,
}

impl AssessmentSession {
    pub fn new(
        id: SessionId,
        mut participant: Participant,
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
        participant.score = 0;

        let mut clock = Clock::new();
        let question_clock = Some(clock.start(timeout_ticks));

        Ok(Self {
            id,
            participant,
            resolutions: Vec::with_capacity(questions.len()),
            questions,
            timeout_ticks,
            scorer,
            clock,
            question_clock,
            cursor: 0,
            state: SessionState::InProgress { index: 0 },
            result: None,
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    pub fn questions(&self) -> &[Arc<Question>] {
        &self.questions
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    /// Index of the current question; equals `total_questions()` once finished
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

    /// Handle of the current question's countdown
    pub fn clock_handle(&self) -> Option<ClockHandle> {
        self.question_clock
    }

    pub fn elapsed_ticks(&self) -> u64 {
        self.clock.elapsed()
    }

    pub fn result(&self) -> Option<&SessionResult> {
        self.result.as_ref()
    }

    pub fn submit_answer(
        &mut self,
        participant_id: &str,
        question_id: &str,
        chosen_option: usize,
    ) -> EngineResult<SubmissionReceipt> {
        if self.state.is_completed() {
            return Err(EngineError::SessionAlreadyCompleted);
        }
        if participant_id != self.participant.id {
            return Err(EngineError::UnknownParticipant(participant_id.to_string()));
        }
        check_question(
            &self.questions,
            self.cursor,
            question_id,
            participant_id,
            &self.resolutions,
        )?;
        let question = self.questions[self.cursor].clone();
        check_option(&question, chosen_option)?;

        let submission = AnswerSubmission {
            participant_id: participant_id.to_string(),
            question_id: question_id.to_string(),
            chosen_option,
            submitted_at_tick: self.clock.elapsed(),
        };
        let points = self.scorer.score(&submission, &question);
        let correct = question.is_correct(chosen_option);
        self.participant.score = self.participant.score.saturating_add(points);
        self.resolutions.push(Resolution::Answered { correct });

        if let Some(handle) = self.question_clock.take() {
            self.clock.cancel(handle);
        }
        let progress = self.advance();

        tracing::debug!(
            "Assessment {}: {} answered {} (correct={}, +{})",
            self.id,
            participant_id,
            question_id,
            correct,
            points
        );
        Ok(SubmissionReceipt {
            points,
            correct,
            progress,
        })
    }

    /// Countdown for the current question ran out. Stale handles (the
    /// question was already answered) are a no-op.
    pub fn on_expired(&mut self, handle: ClockHandle) -> EngineResult<Option<Progress>> {
        if self.state.is_completed() {
            return Err(EngineError::SessionAlreadyCompleted);
        }
        if self.question_clock != Some(handle) {
            tracing::debug!("Assessment {}: ignoring stale expiry", self.id);
            return Ok(None);
        }
        self.question_clock = None;
        self.clock.cancel(handle);
        self.resolutions.push(Resolution::TimedOut);
        tracing::debug!(
            "Assessment {}: question {} timed out",
            self.id,
            self.cursor
        );
        Ok(Some(self.advance()))
    }

    /// One tick of wall-clock time elapsed
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

    /// End early; the result is flagged as abandoned
    pub fn abandon(&mut self) -> EngineResult<&SessionResult> {
        if self.state.is_completed() {
            return Err(EngineError::SessionAlreadyCompleted);
        }
        if let Some(handle) = self.question_clock.take() {
            self.clock.cancel(handle);
        }
        self.finish(ResultStatus::Abandoned);
        tracing::info!("Assessment {} abandoned at question {}", self.id, self.cursor);
        self.result
            .as_ref()
            .ok_or(EngineError::SessionAlreadyCompleted)
    }

    fn advance(&mut self) -> Progress {
        self.cursor += 1;
        if self.cursor < self.questions.len() {
            self.state = SessionState::InProgress { index: self.cursor };
            self.question_clock = Some(self.clock.start(self.timeout_ticks));
            Progress::Advanced { index: self.cursor }
        } else {
            self.finish(ResultStatus::Finished);
            tracing::info!(
                "Assessment {} completed: {} scored {}",
                self.id,
                self.participant.id,
                self.participant.score
            );
            Progress::Completed
        }
    }

    fn finish(&mut self, status: ResultStatus) {
        self.state = SessionState::Completed;
        self.result = Some(build_result(
            ResultParts {
                session_id: &self.id,
                kind: SessionKind::Assessment,
                status,
                questions: &self.questions,
                completed_at_tick: self.clock.elapsed(),
            },
            &[(&self.participant, self.resolutions.as_slice(), false)],
            BTreeMap::new(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::{questions, wrong};

    fn session(count: usize, timeout: u32) -> AssessmentSession {
        AssessmentSession::new(
            "s1".to_string(),
            Participant::new("p1", "Alice"),
            questions(count),
            timeout,
            Scorer::default(),
        )
        .unwrap()
    }

    fn current(s: &AssessmentSession) -> Arc<Question> {
        s.current_question().unwrap().clone()
    }

    #[test]
    fn test_starts_on_first_question_with_countdown() {
        let s = session(2, 30);
        assert_eq!(s.state(), SessionState::InProgress { index: 0 });
        assert_eq!(s.remaining_ticks(), Some(30));
        assert_eq!(s.participant().score, 0);
    }

    #[test]
    fn test_empty_question_set_is_rejected() {
        let result = AssessmentSession::new(
            "s1".to_string(),
            Participant::new("p1", "Alice"),
            Vec::new(),
            30,
            Scorer::default(),
        );
        assert!(matches!(
            result,
            Err(EngineError::InsufficientQuestions { .. })
        ));
    }

    #[test]
    fn test_correct_then_timeout_scores_one_of_two() {
        let mut s = session(2, 3);

        let q0 = current(&s);
        let receipt = s.submit_answer("p1", &q0.id, q0.correct_option).unwrap();
        assert_eq!(receipt.points, 10);
        assert!(receipt.correct);
        assert_eq!(receipt.progress, Progress::Advanced { index: 1 });

        // Let question 2 run out
        assert_eq!(s.tick().unwrap(), TickOutcome::Counting { remaining: 2 });
        assert_eq!(s.tick().unwrap(), TickOutcome::Counting { remaining: 1 });
        assert_eq!(s.tick().unwrap(), TickOutcome::Expired(Progress::Completed));

        assert_eq!(s.state(), SessionState::Completed);
        assert_eq!(s.question_index(), 2);
        let result = s.result().unwrap();
        assert_eq!(result.status, ResultStatus::Finished);
        assert_eq!(result.participants[0].score, 10);
        assert_eq!(result.correct_count("p1"), 1);
        assert_eq!(result.total_questions, 2);
        assert_eq!(result.accuracy("p1"), 0.5);
        assert_eq!(
            result.per_question_correctness.get("p1"),
            Some(&vec![true, false])
        );
    }

    #[test]
    fn test_wrong_answer_and_timeout_converge() {
        let mut by_wrong = session(2, 1);
        let q0 = current(&by_wrong);
        by_wrong.submit_answer("p1", &q0.id, wrong(&q0)).unwrap();

        let mut by_timeout = session(2, 1);
        assert_eq!(
            by_timeout.tick().unwrap(),
            TickOutcome::Expired(Progress::Advanced { index: 1 })
        );

        assert_eq!(by_wrong.state(), by_timeout.state());
        assert_eq!(by_wrong.participant(), by_timeout.participant());
        assert_eq!(by_wrong.remaining_ticks(), by_timeout.remaining_ticks());
    }

    #[test]
    fn test_duplicate_submission_is_rejected_without_effect() {
        let mut s = session(3, 30);
        let q0 = current(&s);
        s.submit_answer("p1", &q0.id, q0.correct_option).unwrap();
        let before = (s.state(), s.participant().score);

        let result = s.submit_answer("p1", &q0.id, q0.correct_option);
        assert!(matches!(
            result,
            Err(EngineError::DuplicateSubmission { .. })
        ));
        assert_eq!((s.state(), s.participant().score), before);
    }

    #[test]
    fn test_submission_then_stale_expiry_is_noop() {
        let mut s = session(2, 30);
        let q0 = current(&s);
        let first_clock = s.clock_handle().unwrap();

        s.submit_answer("p1", &q0.id, q0.correct_option).unwrap();
        let after_submit = (s.state(), s.participant().score, s.remaining_ticks());

        assert_eq!(s.on_expired(first_clock).unwrap(), None);
        assert_eq!(
            (s.state(), s.participant().score, s.remaining_ticks()),
            after_submit
        );
        assert_eq!(s.state(), SessionState::InProgress { index: 1 });
        assert_eq!(s.participant().score, 10);
    }

    #[test]
    fn test_expiry_then_late_submission_is_noop() {
        let mut s = session(2, 30);
        let q0 = current(&s);
        let first_clock = s.clock_handle().unwrap();

        assert_eq!(
            s.on_expired(first_clock).unwrap(),
            Some(Progress::Advanced { index: 1 })
        );
        let after_expiry = (s.state(), s.participant().score, s.remaining_ticks());

        let late = s.submit_answer("p1", &q0.id, q0.correct_option);
        assert_eq!(late.unwrap_err(), EngineError::QuestionClosed(q0.id.clone()));
        assert_eq!(
            (s.state(), s.participant().score, s.remaining_ticks()),
            after_expiry
        );
        assert_eq!(s.participant().score, 0);
    }

    #[test]
    fn test_index_is_monotonic_and_ends_at_total() {
        let mut s = session(4, 2);
        let mut last = s.question_index();
        let mut steps = 0;
        while !s.state().is_completed() {
            if steps % 2 == 0 {
                let q = current(&s);
                s.submit_answer("p1", &q.id, q.correct_option).unwrap();
            } else {
                s.tick().unwrap();
            }
            assert!(s.question_index() >= last);
            last = s.question_index();
            steps += 1;
        }
        assert_eq!(s.question_index(), 4);
    }

    #[test]
    fn test_score_is_sum_of_points() {
        let mut s = session(4, 30);
        let mut earned = Vec::new();
        let mut previous = 0;
        for i in 0..4 {
            let q = current(&s);
            let option = if i % 2 == 0 { q.correct_option } else { wrong(&q) };
            earned.push(s.submit_answer("p1", &q.id, option).unwrap().points);
            assert!(s.participant().score >= previous);
            previous = s.participant().score;
        }
        assert_eq!(
            s.result().unwrap().participants[0].score,
            crate::scoring::aggregate(earned)
        );
    }

    #[test]
    fn test_events_after_completion_fail() {
        let mut s = session(1, 30);
        let q0 = current(&s);
        let handle = s.clock_handle().unwrap();
        s.submit_answer("p1", &q0.id, q0.correct_option).unwrap();

        assert_eq!(
            s.submit_answer("p1", &q0.id, 0).unwrap_err(),
            EngineError::SessionAlreadyCompleted
        );
        assert_eq!(
            s.on_expired(handle).unwrap_err(),
            EngineError::SessionAlreadyCompleted
        );
        assert_eq!(s.tick().unwrap_err(), EngineError::SessionAlreadyCompleted);
        assert_eq!(
            s.abandon().unwrap_err(),
            EngineError::SessionAlreadyCompleted
        );
    }

    #[test]
    fn test_rejects_foreign_participant_and_bad_option() {
        let mut s = session(2, 30);
        let q0 = current(&s);

        assert_eq!(
            s.submit_answer("intruder", &q0.id, 0).unwrap_err(),
            EngineError::UnknownParticipant("intruder".to_string())
        );
        assert_eq!(
            s.submit_answer("p1", &q0.id, 9).unwrap_err(),
            EngineError::InvalidOption {
                option: 9,
                available: 4
            }
        );
        assert_eq!(
            s.submit_answer("p1", "q1", 0).unwrap_err(),
            EngineError::UnknownQuestion("q1".to_string())
        );
        assert_eq!(s.state(), SessionState::InProgress { index: 0 });
    }

    #[test]
    fn test_abandon() {
        let mut s = session(3, 30);
        let q0 = current(&s);
        s.submit_answer("p1", &q0.id, q0.correct_option).unwrap();

        let result = s.abandon().unwrap().clone();
        assert_eq!(result.status, ResultStatus::Abandoned);
        assert_eq!(result.participants[0].score, 10);
        assert_eq!(s.state(), SessionState::Completed);
        assert_eq!(s.remaining_ticks(), None);
        assert_eq!(s.tick().unwrap_err(), EngineError::SessionAlreadyCompleted);
    }
}
