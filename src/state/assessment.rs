use super::{AppState, SessionSlot};
use crate::broadcast;
use crate::clock::ClockHandle;
use crate::error::{EngineError, EngineResult};
use crate::protocol::{ServerMessage, SessionSnapshot};
use crate::session::{AssessmentSession, Progress, SubmissionReceipt, TickOutcome};
use crate::types::*;
use std::sync::Arc;

impl AppState {
    /// Start a solo quiz and its ticker
    pub async fn start_assessment(
        self: &Arc<Self>,
        participant: Participant,
        question_count: Option<usize>,
    ) -> EngineResult<SessionSnapshot> {
        let count = question_count.unwrap_or(self.config.assessment_question_count);
        let seed = self.next_seed();
        let questions = self.bank.load_shuffled(count, seed)?;

        let id = ulid::Ulid::new().to_string();
        let session = AssessmentSession::new(
            id.clone(),
            participant,
            questions,
            self.config.assessment_timeout_ticks,
            self.scorer(),
        )?;
        let snapshot = SessionSnapshot::from_assessment(&session, seed);
        let first_countdown = session.clock_handle();

        self.assessments
            .write()
            .await
            .insert(id.clone(), SessionSlot::new(seed, session));

        tracing::info!(
            "Assessment {} started for {} ({} questions, seed {})",
            id,
            snapshot.participants[0].id,
            snapshot.total_questions,
            seed
        );
        self.publish_progress(&snapshot, Progress::Advanced { index: 0 });
        if let Some(handle) = first_countdown {
            broadcast::spawn_session_ticker(self.clone(), SessionKind::Assessment, id, handle);
        }

        Ok(snapshot)
    }

    async fn assessment_slot(
        &self,
        session_id: &str,
    ) -> EngineResult<Arc<SessionSlot<AssessmentSession>>> {
        self.live_slot(&self.assessments, session_id).await
    }

    pub async fn assessment_snapshot(&self, session_id: &str) -> EngineResult<SessionSnapshot> {
        match self.assessment_slot(session_id).await {
            Ok(slot) => {
                let session = slot.session.lock().await;
                Ok(SessionSnapshot::from_assessment(&session, slot.seed))
            }
            Err(EngineError::SessionAlreadyCompleted) => self.finished_snapshot(session_id).await,
            Err(e) => Err(e),
        }
    }

    pub async fn submit_assessment_answer(
        self: &Arc<Self>,
        session_id: &str,
        participant_id: &str,
        question_id: &str,
        option: usize,
    ) -> EngineResult<SubmissionReceipt> {
        let slot = self.assessment_slot(session_id).await?;
        let mut session = slot.session.lock().await;

        let receipt = session
            .submit_answer(participant_id, question_id, option)
            .inspect_err(|e| {
                if e.is_ignorable() {
                    tracing::debug!("Assessment {}: {}", session_id, e);
                }
            })?;

        self.broadcast_to_all(ServerMessage::AnswerAccepted {
            session_id: session_id.to_string(),
            question_id: question_id.to_string(),
            participant_id: participant_id.to_string(),
            points: receipt.points,
            correct: receipt.correct,
            score: session.participant().score,
        });
        self.settle_assessment(&session, slot.seed, receipt.progress)
            .await;
        Ok(receipt)
    }

    pub async fn tick_assessment(
        self: &Arc<Self>,
        session_id: &str,
        armed: Option<ClockHandle>,
    ) -> EngineResult<TickOutcome> {
        let slot = self.assessment_slot(session_id).await?;
        let mut session = slot.session.lock().await;
        if armed.is_some() && session.clock_handle() != armed {
            return Ok(TickOutcome::Idle);
        }

        let outcome = session.tick()?;
        self.publish_tick(session_id, outcome);
        if let TickOutcome::Expired(progress) = outcome {
            self.settle_assessment(&session, slot.seed, progress).await;
        }
        Ok(outcome)
    }

    pub async fn abandon_assessment(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> EngineResult<SessionResult> {
        let slot = self.assessment_slot(session_id).await?;
        let mut session = slot.session.lock().await;
        if session.participant().id != participant_id {
            return Err(EngineError::UnknownParticipant(participant_id.to_string()));
        }

        let result = session.abandon()?.clone();
        let snapshot = SessionSnapshot::from_assessment(&session, slot.seed);
        self.record_result(snapshot, result.clone()).await;
        Ok(result)
    }

    /// Publish follow-up events, arm the next question's ticker and record
    /// the result on completion
    async fn settle_assessment(
        self: &Arc<Self>,
        session: &AssessmentSession,
        seed: u64,
        progress: Progress,
    ) {
        let snapshot = SessionSnapshot::from_assessment(session, seed);
        self.publish_progress(&snapshot, progress);
        match progress {
            Progress::Advanced { .. } => {
                if let Some(handle) = session.clock_handle() {
                    broadcast::spawn_session_ticker(
                        self.clone(),
                        SessionKind::Assessment,
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
