use std::sync::Arc;
use std::time::Duration;

use crate::api::AssessmentApi;
use crate::assessment::{ApplicationId, SubmissionResult, SubmitPayload, SubmitReason};
use crate::clock::Clock;
use crate::error::ApiError;
use crate::session::{AssessmentSession, SessionOutcome, SessionPhase};
use crate::store::KvStore;
use crate::timer::SessionTimerStore;

/// The single request a session is allowed to dispatch
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitRequest {
    pub application_id: ApplicationId,
    pub payload: SubmitPayload,
}

/// What the scoring endpoint answered
#[derive(Debug)]
pub enum SubmitOutcome {
    Accepted(SubmissionResult),
    /// A result already existed; terminal, not retryable
    AlreadySubmitted(String),
    Failed(ApiError),
}

/// Bounded retry for automatic submissions that hit a network error.
/// `retries == 0` keeps the single-attempt contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            backoff: Duration::from_millis(1000),
        }
    }
}

/// Sends the answers to the scoring service and applies the outcome
#[derive(Clone)]
pub struct SubmissionCoordinator {
    api: Arc<dyn AssessmentApi>,
    retry: RetryPolicy,
}

impl SubmissionCoordinator {
    pub fn new(api: Arc<dyn AssessmentApi>, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    /// Perform the network call. Blocking; safe to run off the event loop.
    ///
    /// Exactly-once is enforced upstream by the session guard; this only
    /// repeats the call for transport errors of auto-submissions, and only
    /// when a retry budget is configured.
    pub fn dispatch(&self, request: &SubmitRequest) -> SubmitOutcome {
        let budget = if request.payload.reason.is_auto() {
            self.retry.retries
        } else {
            0
        };

        let mut attempt = 0;
        loop {
            match self.api.submit_test(&request.application_id, &request.payload) {
                Ok(result) => {
                    tracing::info!(
                        application_id = %request.application_id,
                        score = result.score,
                        total = result.total,
                        passed = result.passed,
                        "test submitted"
                    );
                    return SubmitOutcome::Accepted(result);
                }
                Err(ApiError::Conflict(msg)) => {
                    tracing::warn!(application_id = %request.application_id, "test was already submitted");
                    return SubmitOutcome::AlreadySubmitted(msg);
                }
                Err(e) if e.is_transient() && attempt < budget => {
                    attempt += 1;
                    tracing::warn!(
                        application_id = %request.application_id,
                        attempt,
                        budget,
                        error = %e,
                        "submission failed; retrying"
                    );
                    std::thread::sleep(self.retry.backoff);
                }
                Err(e) => {
                    tracing::error!(application_id = %request.application_id, error = %e, "submission failed");
                    return SubmitOutcome::Failed(e);
                }
            }
        }
    }

    /// Apply a dispatched outcome on the event loop: store the result once,
    /// clear the persisted deadline and leave the session terminal.
    pub fn settle<S: KvStore, C: Clock>(
        session: &mut AssessmentSession,
        timers: &SessionTimerStore<S, C>,
        outcome: SubmitOutcome,
    ) -> SessionPhase {
        let reason = session
            .fired_by()
            .map(|t| t.reason())
            .unwrap_or(SubmitReason::Manual);

        let resolved = match outcome {
            SubmitOutcome::Accepted(result) => SessionOutcome::Submitted(result),
            SubmitOutcome::AlreadySubmitted(msg) => SessionOutcome::AlreadySubmitted(msg),
            SubmitOutcome::Failed(err) => SessionOutcome::Failed(failure_message(&err, reason)),
        };

        session.resolve(resolved);
        timers.clear(&session.application_id);
        session.phase()
    }
}

/// Candidate-facing text for a failed submission
pub fn failure_message(err: &ApiError, reason: SubmitReason) -> String {
    match err {
        ApiError::Transport(_) | ApiError::Decode(_) if reason.is_auto() => {
            "Could not auto-submit your test. Please contact support.".to_string()
        }
        ApiError::Transport(_) | ApiError::Decode(_) => crate::api::SUBMIT_FALLBACK.to_string(),
        ApiError::Server { detail, .. } => detail.clone(),
        other => other.to_string(),
    }
}
