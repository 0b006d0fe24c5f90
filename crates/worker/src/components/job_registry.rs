//! In-flight job bookkeeping.
//!
//! `add` is the only admission primitive: a task that wants to own a job must
//! win `add` first, and must release the id on every exit path. [`JobGuard`]
//! ties the release to scope exit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use fleet_agent_core::models::JobRecord;
use tracing::{debug, warn};

pub trait JobRegistry: Send + Sync {
    /// Registers the job; `false` if a job with the same id is in flight.
    fn add(&self, record: JobRecord) -> bool;
    fn remove(&self, job_id: &str) -> bool;
    fn exists(&self, job_id: &str) -> bool;
    fn get(&self, job_id: &str) -> Option<JobRecord>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lock-protected table backing [`JobRegistry`].
#[derive(Debug, Default)]
pub struct InMemoryJobRegistry {
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl InMemoryJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<dyn JobRegistry> {
        Arc::new(Self::new())
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<String, JobRecord>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl JobRegistry for InMemoryJobRegistry {
    fn add(&self, record: JobRecord) -> bool {
        let mut jobs = self.jobs();
        if jobs.contains_key(&record.id) {
            return false;
        }
        jobs.insert(record.id.clone(), record);
        true
    }

    fn remove(&self, job_id: &str) -> bool {
        self.jobs().remove(job_id).is_some()
    }

    fn exists(&self, job_id: &str) -> bool {
        self.jobs().contains_key(job_id)
    }

    fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.jobs().get(job_id).cloned()
    }

    fn len(&self) -> usize {
        self.jobs().len()
    }
}

/// Proof of admission for one job. Dropping it removes the job from the
/// registry, whichever way the owning activity ends.
pub struct JobGuard {
    registry: Arc<dyn JobRegistry>,
    job_id: String,
}

impl JobGuard {
    pub fn admit(registry: &Arc<dyn JobRegistry>, record: JobRecord) -> Option<Self> {
        let job_id = record.id.clone();
        if !registry.add(record) {
            return None;
        }
        debug!(job_id = %job_id, "job admitted");
        Some(Self {
            registry: Arc::clone(registry),
            job_id,
        })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

impl std::fmt::Debug for JobGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobGuard").field("job_id", &self.job_id).finish()
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if self.registry.remove(&self.job_id) {
            debug!(job_id = %self.job_id, "job released");
        } else {
            warn!(job_id = %self.job_id, "job was already removed from the registry");
        }
    }
}
