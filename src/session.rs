use crate::assessment::{AnswerOption, AnswerSheet, ApplicationId, QuestionId, SubmissionResult, SubmitPayload, Test};
use crate::coordinator::SubmitRequest;
use crate::guard::{GuardState, SubmitGuard, Trigger};
use crate::timer::Session;

/// Lifecycle of one attempt, as seen by the test view
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    NotStarted,
    Active,
    Submitting,
    Submitted,
    SubmitFailed,
    /// The service already holds a result for this application
    AlreadySubmitted,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionPhase::Submitted | SessionPhase::SubmitFailed | SessionPhase::AlreadySubmitted
        )
    }
}

/// How a submission resolved
#[derive(Clone, Debug, PartialEq)]
pub enum SessionOutcome {
    Submitted(SubmissionResult),
    Failed(String),
    AlreadySubmitted(String),
}

/// The live attempt owned by a single test view.
///
/// Holds the guard flag explicitly rather than in ambient state; every
/// trigger goes through [`AssessmentSession::try_fire`].
#[derive(Debug)]
pub struct AssessmentSession {
    pub application_id: ApplicationId,
    pub expires_at: i64,
    pub test: Test,
    answers: AnswerSheet,
    guard: SubmitGuard,
    outcome: Option<SessionOutcome>,
}

impl AssessmentSession {
    pub fn new(session: Session, test: Test) -> Self {
        let answers = AnswerSheet::for_test(&test);
        Self {
            application_id: session.application_id,
            expires_at: session.expires_at,
            test,
            answers,
            guard: SubmitGuard::new(),
            outcome: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match (&self.outcome, self.guard.state()) {
            (Some(SessionOutcome::Submitted(_)), _) => SessionPhase::Submitted,
            (Some(SessionOutcome::Failed(_)), _) => SessionPhase::SubmitFailed,
            (Some(SessionOutcome::AlreadySubmitted(_)), _) => SessionPhase::AlreadySubmitted,
            (None, GuardState::Active) => SessionPhase::Active,
            (None, GuardState::Submitting) => SessionPhase::Submitting,
            // finished without an outcome cannot happen through this API
            (None, GuardState::Terminal) => SessionPhase::SubmitFailed,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase() == SessionPhase::Active
    }

    pub fn answers(&self) -> &AnswerSheet {
        &self.answers
    }

    /// Changing an answer is only possible while the session is live
    pub fn select(&mut self, question_id: QuestionId, option: AnswerOption) -> bool {
        if !self.is_active() {
            return false;
        }
        self.answers.select(question_id, option)
    }

    pub fn clear_answer(&mut self, question_id: QuestionId) {
        if self.is_active() {
            self.answers.clear(question_id);
        }
    }

    pub fn fired_by(&self) -> Option<Trigger> {
        self.guard.fired_by()
    }

    /// Check-and-set the guard; on success, snapshot the answers into the
    /// one request this session will ever dispatch.
    pub fn try_fire(&mut self, trigger: Trigger) -> Option<SubmitRequest> {
        let reason = self.guard.try_fire(trigger)?;
        Some(SubmitRequest {
            application_id: self.application_id.clone(),
            payload: SubmitPayload::new(&self.answers, reason),
        })
    }

    /// Record how the submission ended. The first outcome sticks; later
    /// calls are ignored and return false.
    pub fn resolve(&mut self, outcome: SessionOutcome) -> bool {
        if self.outcome.is_some() {
            tracing::warn!(application_id = %self.application_id, "outcome already recorded; ignoring");
            return false;
        }
        self.outcome = Some(outcome);
        self.guard.finish();
        true
    }

    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    pub fn result(&self) -> Option<&SubmissionResult> {
        match &self.outcome {
            Some(SessionOutcome::Submitted(result)) => Some(result),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            Some(SessionOutcome::Failed(msg)) | Some(SessionOutcome::AlreadySubmitted(msg)) => Some(msg),
            _ => None,
        }
    }
}
