use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::assessment::ApplicationId;
use crate::clock::Clock;
use crate::store::KvStore;

const TIMER_PREFIX: &str = "test_timer_";

/// The persisted deadline of one live attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub application_id: ApplicationId,
    /// Absolute deadline, epoch milliseconds
    pub expires_at: i64,
}

impl Session {
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        self.expires_at - now_ms
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.remaining_ms(now_ms) <= 0
    }
}

#[derive(Serialize)]
struct TimerRecord<'a> {
    #[serde(rename = "applicationId")]
    application_id: &'a ApplicationId,
    #[serde(rename = "expiresAt")]
    expires_at: i64,
}

#[derive(Deserialize)]
struct StoredRecord {
    #[serde(rename = "expiresAt", default)]
    expires_at: Option<Value>,
}

/// Outcome of recovering a deadline from storage
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimerRead {
    /// Deadline present and still in the future
    Active(Session),
    /// Deadline present but already passed
    Expired(Session),
    NotFound,
    /// Stored value unparseable or missing its deadline
    Invalid,
}

impl TimerRead {
    /// Everything but `Active` means no time remains
    pub fn active(self) -> Option<Session> {
        match self {
            TimerRead::Active(session) => Some(session),
            _ => None,
        }
    }
}

/// Durable single deadline per application.
///
/// Remaining time is always `expires_at - now`; nothing here counts down.
pub struct SessionTimerStore<S: KvStore, C: Clock> {
    store: S,
    clock: C,
}

impl<S: KvStore, C: Clock> SessionTimerStore<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    fn key(application_id: &ApplicationId) -> String {
        format!("{TIMER_PREFIX}{application_id}")
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Persist `now + duration_ms` as the deadline and return it.
    ///
    /// A failed write is logged and swallowed: the candidate proceeds, but a
    /// restart will then find no timer and fail closed.
    pub fn start(&self, application_id: &ApplicationId, duration_ms: i64) -> i64 {
        let expires_at = self.clock.now_ms().saturating_add(duration_ms);
        let record = TimerRecord {
            application_id,
            expires_at,
        };

        let written = serde_json::to_string(&record)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                self.store
                    .set(&Self::key(application_id), &json)
                    .map_err(|e| e.to_string())
            });

        match written {
            Ok(()) => tracing::info!(%application_id, expires_at, "session timer started"),
            Err(e) => tracing::error!(%application_id, error = %e, "failed to save session timer"),
        }

        expires_at
    }

    pub fn read(&self, application_id: &ApplicationId) -> TimerRead {
        let raw = match self.store.get(&Self::key(application_id)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return TimerRead::NotFound,
            Err(e) => {
                tracing::error!(%application_id, error = %e, "failed to read session timer");
                return TimerRead::Invalid;
            }
        };

        let Some(expires_at) = parse_deadline(&raw) else {
            tracing::warn!(%application_id, "stored session timer is invalid");
            return TimerRead::Invalid;
        };

        let session = Session {
            application_id: application_id.clone(),
            expires_at,
        };

        if session.is_expired(self.clock.now_ms()) {
            TimerRead::Expired(session)
        } else {
            TimerRead::Active(session)
        }
    }

    /// Remove the deadline so a later read cannot resurrect a finished session
    pub fn clear(&self, application_id: &ApplicationId) {
        match self.store.remove(&Self::key(application_id)) {
            Ok(()) => tracing::debug!(%application_id, "session timer cleared"),
            Err(e) => tracing::error!(%application_id, error = %e, "failed to clear session timer"),
        }
    }
}

/// A usable deadline is a positive number; anything else is invalid
fn parse_deadline(raw: &str) -> Option<i64> {
    let record: StoredRecord = serde_json::from_str(raw).ok()?;
    let deadline = match record.expires_at? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        _ => return None,
    };
    (deadline > 0).then_some(deadline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use assert_matches::assert_matches;

    const T: i64 = 1_760_000_000_000;
    const THIRTY_MIN_MS: i64 = 1_800_000;

    fn timer_store() -> (SessionTimerStore<MemoryStore, ManualClock>, MemoryStore, ManualClock) {
        let store = MemoryStore::new();
        let clock = ManualClock::new(T);
        (
            SessionTimerStore::new(store.clone(), clock.clone()),
            store,
            clock,
        )
    }

    #[test]
    fn start_persists_deadline_record() {
        let (timers, store, _clock) = timer_store();
        let id = ApplicationId::from("42");

        let expires_at = timers.start(&id, THIRTY_MIN_MS);
        assert_eq!(expires_at, T + THIRTY_MIN_MS);

        let raw = store.get("test_timer_42").unwrap().unwrap();
        let json: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["applicationId"], "42");
        assert_eq!(json["expiresAt"], T + THIRTY_MIN_MS);
    }

    #[test]
    fn read_just_before_and_after_deadline() {
        let (timers, _store, clock) = timer_store();
        let id = ApplicationId::from("42");
        timers.start(&id, THIRTY_MIN_MS);

        clock.set(T + THIRTY_MIN_MS - 1);
        let session = timers.read(&id).active().expect("still active");
        assert_eq!(session.remaining_ms(clock.now_ms()), 1);

        clock.set(T + THIRTY_MIN_MS);
        assert_matches!(timers.read(&id), TimerRead::Expired(_));

        clock.set(T + THIRTY_MIN_MS + 1);
        assert_matches!(timers.read(&id), TimerRead::Expired(s) if s.expires_at == T + THIRTY_MIN_MS);
    }

    #[test]
    fn missing_record_is_not_found() {
        let (timers, _store, _clock) = timer_store();
        assert_eq!(timers.read(&ApplicationId::from("1")), TimerRead::NotFound);
    }

    #[test]
    fn malformed_records_are_invalid() {
        let (timers, store, _clock) = timer_store();
        let id = ApplicationId::from("7");

        for raw in [
            "not json",
            "{}",
            r#"{"applicationId": 7}"#,
            r#"{"applicationId": 7, "expiresAt": "soon"}"#,
            r#"{"applicationId": 7, "expiresAt": 0}"#,
            r#"{"applicationId": 7, "expiresAt": null}"#,
            "[1, 2]",
        ] {
            store.set("test_timer_7", raw).unwrap();
            assert_eq!(timers.read(&id), TimerRead::Invalid, "raw = {raw}");
        }
    }

    #[test]
    fn numeric_application_id_from_older_records_still_reads() {
        let (timers, store, _clock) = timer_store();
        store
            .set(
                "test_timer_3",
                &format!(r#"{{"applicationId": 3, "expiresAt": {}}}"#, T + 5_000),
            )
            .unwrap();

        assert_matches!(timers.read(&ApplicationId::from("3")), TimerRead::Active(s) if s.expires_at == T + 5_000);
    }

    #[test]
    fn clear_removes_record() {
        let (timers, _store, _clock) = timer_store();
        let id = ApplicationId::from("42");
        timers.start(&id, THIRTY_MIN_MS);
        timers.clear(&id);
        assert_eq!(timers.read(&id), TimerRead::NotFound);
    }

    #[test]
    fn restart_recovers_same_deadline() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(T);
        let id = ApplicationId::from("42");
        SessionTimerStore::new(store.clone(), clock.clone()).start(&id, THIRTY_MIN_MS);

        // ten minutes later a fresh process reads the same store
        clock.advance(600_000);
        let recovered = SessionTimerStore::new(store, clock.clone());
        let session = recovered.read(&id).active().unwrap();
        assert_eq!(session.remaining_ms(clock.now_ms()), 1_200_000);
    }

    struct FailingStore;

    impl KvStore for FailingStore {
        fn get(&self, _key: &str) -> crate::store::Result<Option<String>> {
            Err(crate::error::StoreError::Unavailable("quota exceeded".into()))
        }
        fn set(&self, _key: &str, _value: &str) -> crate::store::Result<()> {
            Err(crate::error::StoreError::Unavailable("quota exceeded".into()))
        }
        fn remove(&self, _key: &str) -> crate::store::Result<()> {
            Err(crate::error::StoreError::Unavailable("quota exceeded".into()))
        }
    }

    #[test]
    fn failed_write_still_returns_deadline() {
        let timers = SessionTimerStore::new(FailingStore, ManualClock::new(T));
        let id = ApplicationId::from("42");

        assert_eq!(timers.start(&id, THIRTY_MIN_MS), T + THIRTY_MIN_MS);
        assert_eq!(timers.read(&id), TimerRead::Invalid);
        timers.clear(&id);
    }

    #[test]
    fn huge_duration_saturates() {
        let (timers, _store, _clock) = timer_store();
        assert_eq!(timers.start(&ApplicationId::from("1"), i64::MAX), i64::MAX);
    }
}
