use crate::assessment::ApplicationId;
use crate::store::KvStore;

const LOCK_PREFIX: &str = "test_lock_";

/// Durable record of which applications have ever had a test started.
///
/// No `unlock` exists: a lock survives expiry, failed
/// submissions and restarts of the client.
#[derive(Debug)]
pub struct AttemptLockRegistry<S: KvStore> {
    store: S,
}

impl<S: KvStore> AttemptLockRegistry<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn key(application_id: &ApplicationId) -> String {
        format!("{LOCK_PREFIX}{application_id}")
    }

    /// True if a session was ever started for this application.
    ///
    /// A store that cannot be read reports locked, so a broken disk never
    /// hands out a second attempt.
    pub fn is_locked(&self, application_id: &ApplicationId) -> bool {
        match self.store.get(&Self::key(application_id)) {
            Ok(value) => value.is_some(),
            Err(e) => {
                tracing::error!(%application_id, error = %e, "failed to read attempt lock; treating as locked");
                true
            }
        }
    }

    /// Mark the application as permanently started. Idempotent.
    pub fn lock(&self, application_id: &ApplicationId) {
        if self.is_locked(application_id) {
            tracing::debug!(%application_id, "attempt lock already set");
            return;
        }

        match self.store.set(&Self::key(application_id), "1") {
            Ok(()) => tracing::info!(%application_id, "attempt lock set"),
            Err(e) => tracing::error!(%application_id, error = %e, "failed to persist attempt lock"),
        }
    }
}
