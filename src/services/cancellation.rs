//! Cancellation registry for queued import jobs
//!
//! Cooperative only: the worker polls `is_cancelled` between chunks, nothing
//! is interrupted mid-row. `JobGuard` removes a job's entry once processing
//! ends.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// RAII guard that removes the job from the registry when dropped.
/// Keep it alive for the whole processing run.
pub struct JobGuard {
    job_id: Uuid,
    registry: CancellationRegistry,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.job_id);
    }
}

/// Thread-safe map of job id → cancellation token
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    jobs: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl CancellationRegistry {
    /// Register a job that is about to run. A token cancelled while the job
    /// was still queued is kept, so the first chunk check sees it.
    pub fn register(&self, job_id: Uuid) -> JobGuard {
        self.jobs
            .lock()
            .entry(job_id)
            .or_insert_with(CancellationToken::new);
        JobGuard {
            job_id,
            registry: self.clone(),
        }
    }

    /// Cancel a running job. Returns `false` when the job is not registered.
    pub fn cancel(&self, job_id: &Uuid) -> bool {
        match self.jobs.lock().get(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Record a cancellation for a job that has not started yet
    pub fn pre_cancel(&self, job_id: Uuid) {
        let token = CancellationToken::new();
        token.cancel();
        self.jobs.lock().insert(job_id, token);
    }

    pub fn is_cancelled(&self, job_id: &Uuid) -> bool {
        self.jobs
            .lock()
            .get(job_id)
            .map_or(false, |t| t.is_cancelled())
    }

    /// Drop a job's entry. Called by `JobGuard::drop`.
    pub fn remove(&self, job_id: &Uuid) {
        self.jobs.lock().remove(job_id);
    }

    #[cfg(test)]
    fn contains(&self, job_id: &Uuid) -> bool {
        self.jobs.lock().contains_key(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_is_cancelled_false() {
        let reg = CancellationRegistry::default();
        let job_id = Uuid::new_v4();

        let _guard = reg.register(job_id);

        assert!(!reg.is_cancelled(&job_id));
    }

    #[test]
    fn test_cancel_registered_job() {
        let reg = CancellationRegistry::default();
        let job_id = Uuid::new_v4();
        let _guard = reg.register(job_id);

        assert!(reg.cancel(&job_id));
        assert!(reg.is_cancelled(&job_id));
    }

    #[test]
    fn test_cancel_unknown_job_returns_false() {
        let reg = CancellationRegistry::default();
        assert!(!reg.cancel(&Uuid::new_v4()));
    }

    #[test]
    fn test_pre_cancel_survives_register() {
        let reg = CancellationRegistry::default();
        let job_id = Uuid::new_v4();

        reg.pre_cancel(job_id);
        let _guard = reg.register(job_id);

        assert!(reg.is_cancelled(&job_id));
    }

    #[test]
    fn test_guard_drop_removes_from_registry() {
        let reg = CancellationRegistry::default();
        let job_id = Uuid::new_v4();

        {
            let _guard = reg.register(job_id);
            assert!(reg.contains(&job_id));
        }

        assert!(!reg.contains(&job_id));
        assert!(!reg.is_cancelled(&job_id));
    }
}
