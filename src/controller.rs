//! One controller per test view: gates entry, recovers the deadline, and
//! routes every timer tick, key press and focus change into the session.

use crate::api::AssessmentApi;
use crate::assessment::{AnswerOption, ApplicationId, QuestionId};
use crate::clock::Clock;
use crate::coordinator::{SubmissionCoordinator, SubmitOutcome, SubmitRequest};
use crate::countdown::{Countdown, CountdownStart, Tick};
use crate::error::{ApiError, StartError};
use crate::guard::Trigger;
use crate::lock::AttemptLockRegistry;
use crate::session::{AssessmentSession, SessionOutcome, SessionPhase};
use crate::store::KvStore;
use crate::timer::{SessionTimerStore, TimerRead};

/// Confirm "Start Now": refuse if ever started, otherwise lock the
/// application and persist a fresh deadline.
pub fn start_attempt<S: KvStore, C: Clock>(
    locks: &AttemptLockRegistry<S>,
    timers: &SessionTimerStore<S, C>,
    application_id: &ApplicationId,
    duration_ms: i64,
) -> Result<i64, StartError> {
    if locks.is_locked(application_id) {
        tracing::warn!(%application_id, "refusing to start a second attempt");
        return Err(StartError::AlreadyStarted(application_id.to_string()));
    }

    locks.lock(application_id);
    Ok(timers.start(application_id, duration_ms))
}

/// Why the test view cannot show questions
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Unavailable {
    NoTimer,
    InvalidTimer,
    TimeOver,
    LoadFailed(String),
}

impl Unavailable {
    pub fn message(&self) -> &str {
        match self {
            Unavailable::NoTimer => "Test is not available. Please start the test from My Applications.",
            Unavailable::InvalidTimer => "Invalid test timer. Please contact support.",
            Unavailable::TimeOver => "Test time is already over.",
            Unavailable::LoadFailed(msg) => msg,
        }
    }
}

/// Result of opening the test view
pub enum OpenOutcome<S: KvStore, C: Clock> {
    Ready(TestController<S, C>),
    Unavailable(Unavailable),
}

pub struct TestController<S: KvStore, C: Clock> {
    timers: SessionTimerStore<S, C>,
    session: AssessmentSession,
    countdown: Option<Countdown>,
}

impl<S: KvStore, C: Clock> TestController<S, C> {
    /// Recover the deadline from storage and, only if time remains, fetch
    /// the test. Missing, malformed or passed deadlines fail closed without
    /// touching the network.
    pub fn open(
        application_id: &ApplicationId,
        timers: SessionTimerStore<S, C>,
        api: &dyn AssessmentApi,
    ) -> OpenOutcome<S, C> {
        let session = match timers.read(application_id) {
            TimerRead::Active(session) => session,
            TimerRead::NotFound => return OpenOutcome::Unavailable(Unavailable::NoTimer),
            TimerRead::Invalid => return OpenOutcome::Unavailable(Unavailable::InvalidTimer),
            TimerRead::Expired(_) => {
                timers.clear(application_id);
                return OpenOutcome::Unavailable(Unavailable::TimeOver);
            }
        };

        let countdown = match Countdown::start(&session, timers.now_ms()) {
            CountdownStart::Running(countdown) => countdown,
            CountdownStart::Expired => {
                timers.clear(application_id);
                return OpenOutcome::Unavailable(Unavailable::TimeOver);
            }
        };

        let test = match api.fetch_test(application_id) {
            Ok(test) => test,
            Err(e) => {
                tracing::error!(%application_id, error = %e, "failed to load test");
                let message = match e {
                    ApiError::Transport(_) | ApiError::Decode(_) => crate::api::LOAD_FALLBACK.to_string(),
                    other => other.to_string(),
                };
                return OpenOutcome::Unavailable(Unavailable::LoadFailed(message));
            }
        };

        let completed = test.is_completed();
        let mut controller = TestController {
            timers,
            session: AssessmentSession::new(session, test),
            countdown: Some(countdown),
        };

        if completed {
            tracing::info!(%application_id, "service reports the test as already completed");
            controller
                .session
                .resolve(SessionOutcome::AlreadySubmitted(crate::api::ALREADY_SUBMITTED.to_string()));
            controller.stop_clock();
            controller.timers.clear(application_id);
        } else {
            tracing::info!(
                %application_id,
                questions = controller.session.test.questions.len(),
                remaining = %controller.remaining_display(),
                "test view opened"
            );
        }

        OpenOutcome::Ready(controller)
    }

    pub fn session(&self) -> &AssessmentSession {
        &self.session
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    pub fn remaining_secs(&self) -> u64 {
        self.countdown.as_ref().map(|c| c.remaining_secs()).unwrap_or(0)
    }

    pub fn remaining_display(&self) -> String {
        crate::countdown::format_mmss(self.remaining_secs())
    }

    /// Leaving now would abandon a live attempt
    pub fn should_warn_on_quit(&self) -> bool {
        matches!(self.phase(), SessionPhase::Active | SessionPhase::Submitting)
    }

    fn stop_clock(&mut self) {
        if let Some(countdown) = self.countdown.as_mut() {
            countdown.stop();
        }
    }

    /// Recompute the display from the clock; fires `Timeout` on expiry
    pub fn on_tick(&mut self) -> Option<SubmitRequest> {
        if !self.session.is_active() {
            self.stop_clock();
            return None;
        }

        let now = self.timers.now_ms();
        match self.countdown.as_mut()?.tick(now) {
            Tick::Expired => self.on_trigger(Trigger::Timeout),
            Tick::Remaining(_) | Tick::Idle => None,
        }
    }

    /// Feed a trigger through the session guard. Returns the request to
    /// dispatch if, and only if, this trigger won.
    ///
    /// The persisted deadline is dropped as soon as the guard fires, so a
    /// relaunch during the request finds no timer and cannot submit again.
    pub fn on_trigger(&mut self, trigger: Trigger) -> Option<SubmitRequest> {
        let request = self.session.try_fire(trigger)?;
        self.stop_clock();
        self.timers.clear(&self.session.application_id);
        Some(request)
    }

    pub fn select(&mut self, question_id: QuestionId, option: AnswerOption) -> bool {
        self.session.select(question_id, option)
    }

    pub fn clear_answer(&mut self, question_id: QuestionId) {
        self.session.clear_answer(question_id)
    }

    /// Apply the dispatched submission's outcome
    pub fn settle(&mut self, outcome: SubmitOutcome) -> SessionPhase {
        let phase = SubmissionCoordinator::settle(&mut self.session, &self.timers, outcome);
        self.stop_clock();
        phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ScriptedApi;
    use crate::assessment::{Question, SubmissionResult, SubmitReason, Test};
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use assert_matches::assert_matches;

    const TEN_AM: i64 = 1_760_004_000_000;
    const THIRTY_MIN_MS: i64 = 1_800_000;

    fn test_content(completed: bool) -> Test {
        Test {
            id: Some(1),
            application: Some(9),
            total_marks: 4,
            score: None,
            passed: false,
            completed_at: completed.then(|| "2026-10-18T10:00:00Z".to_string()),
            questions: (1..=2)
                .map(|id| Question {
                    id,
                    text: format!("Q{id}"),
                    option_a: "a".into(),
                    option_b: "b".into(),
                    option_c: "c".into(),
                    option_d: "d".into(),
                })
                .collect(),
        }
    }

    struct Fixture {
        store: MemoryStore,
        clock: ManualClock,
        id: ApplicationId,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: MemoryStore::new(),
                clock: ManualClock::new(TEN_AM),
                id: ApplicationId::from("9"),
            }
        }

        fn locks(&self) -> AttemptLockRegistry<MemoryStore> {
            AttemptLockRegistry::new(self.store.clone())
        }

        fn timers(&self) -> SessionTimerStore<MemoryStore, ManualClock> {
            SessionTimerStore::new(self.store.clone(), self.clock.clone())
        }

        fn start(&self) -> Result<i64, StartError> {
            start_attempt(&self.locks(), &self.timers(), &self.id, THIRTY_MIN_MS)
        }

        fn open(&self, api: &ScriptedApi) -> OpenOutcome<MemoryStore, ManualClock> {
            TestController::open(&self.id, self.timers(), api)
        }

        fn open_ready(&self, api: &ScriptedApi) -> TestController<MemoryStore, ManualClock> {
            match self.open(api) {
                OpenOutcome::Ready(c) => c,
                OpenOutcome::Unavailable(u) => panic!("unexpectedly unavailable: {u:?}"),
            }
        }
    }

    fn unavailable(outcome: OpenOutcome<MemoryStore, ManualClock>) -> Unavailable {
        match outcome {
            OpenOutcome::Unavailable(u) => u,
            OpenOutcome::Ready(_) => panic!("expected unavailable"),
        }
    }

    #[test]
    fn start_locks_and_sets_deadline() {
        let fx = Fixture::new();
        assert_eq!(fx.start(), Ok(TEN_AM + THIRTY_MIN_MS));
        assert!(fx.locks().is_locked(&fx.id));
    }

    #[test]
    fn second_start_is_refused_even_after_expiry() {
        let fx = Fixture::new();
        fx.start().unwrap();

        fx.clock.advance(THIRTY_MIN_MS * 2);
        let api = ScriptedApi::new(Some(test_content(false)));
        assert_eq!(unavailable(fx.open(&api)), Unavailable::TimeOver);

        assert_matches!(fx.start(), Err(StartError::AlreadyStarted(_)));
        assert_eq!(api.fetch_calls(), 0);
    }

    #[test]
    fn missing_or_bad_timer_never_fetches() {
        let fx = Fixture::new();
        let api = ScriptedApi::new(Some(test_content(false)));

        assert_eq!(unavailable(fx.open(&api)), Unavailable::NoTimer);

        fx.store.set("test_timer_9", "{broken").unwrap();
        assert_eq!(unavailable(fx.open(&api)), Unavailable::InvalidTimer);

        fx.store.set("test_timer_9", &format!(r#"{{"expiresAt": {TEN_AM}}}"#)).unwrap();
        assert_eq!(unavailable(fx.open(&api)), Unavailable::TimeOver);

        assert_eq!(api.fetch_calls(), 0);
    }

    #[test]
    fn expired_timer_is_cleared_on_open() {
        let fx = Fixture::new();
        fx.start().unwrap();
        fx.clock.advance(THIRTY_MIN_MS);

        let api = ScriptedApi::new(Some(test_content(false)));
        assert_eq!(unavailable(fx.open(&api)), Unavailable::TimeOver);
        assert_eq!(fx.timers().read(&fx.id), TimerRead::NotFound);
    }

    #[test]
    fn load_failure_is_blocking() {
        let fx = Fixture::new();
        fx.start().unwrap();
        let api = ScriptedApi::new(None);

        assert_matches!(unavailable(fx.open(&api)), Unavailable::LoadFailed(m) if m.contains("not available"));
        assert_eq!(api.fetch_calls(), 1);
    }

    #[test]
    fn reopen_resumes_remaining_time() {
        let fx = Fixture::new();
        fx.start().unwrap();
        fx.clock.advance(600_000);

        let api = ScriptedApi::new(Some(test_content(false)));
        let controller = fx.open_ready(&api);
        assert_eq!(controller.remaining_display(), "20:00");
        assert_eq!(controller.phase(), SessionPhase::Active);
    }

    #[test]
    fn timeout_fires_once_with_time_over() {
        let fx = Fixture::new();
        fx.start().unwrap();
        let api = ScriptedApi::new(Some(test_content(false)));
        let mut controller = fx.open_ready(&api);

        fx.clock.set(TEN_AM + THIRTY_MIN_MS - 1_000);
        assert!(controller.on_tick().is_none());
        assert_eq!(controller.remaining_display(), "00:01");

        fx.clock.set(TEN_AM + THIRTY_MIN_MS);
        let request = controller.on_tick().expect("expiry submits");
        assert_eq!(request.payload.reason, SubmitReason::TimeOver);
        assert!(request.payload.auto_submitted);

        fx.clock.advance(5_000);
        assert!(controller.on_tick().is_none());
        assert!(controller.on_trigger(Trigger::VisibilityLost).is_none());
        assert!(controller.on_trigger(Trigger::Manual).is_none());
    }

    #[test]
    fn settle_result_then_nothing_fires() {
        let fx = Fixture::new();
        fx.start().unwrap();
        let api = ScriptedApi::new(Some(test_content(false)));
        let mut controller = fx.open_ready(&api);

        assert!(controller.select(1, AnswerOption::C));
        let request = controller.on_trigger(Trigger::VisibilityLost).unwrap();
        assert_eq!(request.payload.reason, SubmitReason::TabSwitch);
        assert!(!controller.select(2, AnswerOption::A));

        let result = SubmissionResult {
            score: 2,
            total: 4,
            passed: false,
            application_status: None,
        };
        assert_eq!(controller.settle(SubmitOutcome::Accepted(result.clone())), SessionPhase::Submitted);
        assert_eq!(controller.session().result(), Some(&result));
        assert!(!controller.should_warn_on_quit());

        fx.clock.advance(THIRTY_MIN_MS);
        assert!(controller.on_tick().is_none());
        assert_eq!(fx.timers().read(&fx.id), TimerRead::NotFound);
    }

    #[test]
    fn fired_session_cannot_be_reopened_mid_request() {
        let fx = Fixture::new();
        fx.start().unwrap();
        let api = ScriptedApi::new(Some(test_content(false)));
        let mut controller = fx.open_ready(&api);

        controller.on_trigger(Trigger::Manual).unwrap();
        assert_eq!(controller.phase(), SessionPhase::Submitting);
        assert_eq!(fx.timers().read(&fx.id), TimerRead::NotFound);

        assert_eq!(unavailable(fx.open(&api)), Unavailable::NoTimer);
        assert_eq!(api.fetch_calls(), 1);
    }

    #[test]
    fn start_survives_failed_timer_write() {
        #[derive(Clone)]
        struct FailingTimerStore(MemoryStore);

        impl KvStore for FailingTimerStore {
            fn get(&self, key: &str) -> crate::store::Result<Option<String>> {
                self.0.get(key)
            }
            fn set(&self, key: &str, value: &str) -> crate::store::Result<()> {
                if key.starts_with("test_timer_") {
                    return Err(crate::error::StoreError::Unavailable("disk full".into()));
                }
                self.0.set(key, value)
            }
            fn remove(&self, key: &str) -> crate::store::Result<()> {
                self.0.remove(key)
            }
        }

        let store = FailingTimerStore(MemoryStore::new());
        let clock = ManualClock::new(TEN_AM);
        let id = ApplicationId::from("9");
        let locks = AttemptLockRegistry::new(store.clone());
        let timers = SessionTimerStore::new(store.clone(), clock.clone());

        assert_eq!(start_attempt(&locks, &timers, &id, THIRTY_MIN_MS), Ok(TEN_AM + THIRTY_MIN_MS));
        assert!(locks.is_locked(&id));

        let api = ScriptedApi::new(Some(test_content(false)));
        match TestController::open(&id, timers, &api) {
            OpenOutcome::Unavailable(u) => assert_eq!(u, Unavailable::NoTimer),
            OpenOutcome::Ready(_) => panic!("no persisted deadline means no test view"),
        }
        assert_eq!(api.fetch_calls(), 0);
    }

    #[test]
    fn completed_test_opens_as_already_submitted() {
        let fx = Fixture::new();
        fx.start().unwrap();
        let api = ScriptedApi::new(Some(test_content(true)));
        let mut controller = fx.open_ready(&api);

        assert_eq!(controller.phase(), SessionPhase::AlreadySubmitted);
        assert!(controller.on_trigger(Trigger::Manual).is_none());
        assert_eq!(fx.timers().read(&fx.id), TimerRead::NotFound);
    }
}
