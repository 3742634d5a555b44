use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Running,
    Finished,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub running: usize,
    pub finished: Vec<JobId>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    jobs: HashMap<JobId, JobState>,
}

// Ids come from a counter guarded by the same lock as the map, so two spawns can
// never share an id no matter how close together they happen.
#[derive(Default)]
pub struct JobRegistry {
    inner: Mutex<RegistryInner>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> JobId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = JobId(inner.next_id);
        inner.jobs.insert(id, JobState::Running);
        id
    }

    pub fn mark_finished(&self, id: JobId) {
        let mut inner = self.lock();
        if let Some(state) = inner.jobs.get_mut(&id) {
            *state = JobState::Finished;
        }
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let inner = self.lock();
        let mut snapshot = RegistrySnapshot::default();
        for (id, state) in &inner.jobs {
            match state {
                JobState::Running => snapshot.running += 1,
                JobState::Finished => snapshot.finished.push(*id),
            }
        }
        snapshot.finished.sort();
        snapshot
    }

    /// Removes the given entries, but only those still marked finished.
    pub fn reap(&self, ids: &[JobId]) -> usize {
        let mut inner = self.lock();
        let mut removed = 0;
        for id in ids {
            if inner.jobs.get(id) == Some(&JobState::Finished) {
                inner.jobs.remove(id);
                removed += 1;
            }
        }
        removed
    }

    pub fn entry_count(&self) -> usize {
        self.lock().jobs.len()
    }

    // Every mutation above leaves the map consistent, so a poisoned lock is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn ids_are_strictly_increasing() {
        let registry = JobRegistry::new();
        let first = registry.register();
        let second = registry.register();
        assert!(second > first);
        assert_eq!(registry.snapshot().running, 2);
    }

    #[test]
    fn finished_jobs_are_reported_then_reaped() {
        let registry = JobRegistry::new();
        let build = registry.register();
        let test = registry.register();
        registry.mark_finished(build);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.running, 1);
        assert_eq!(snapshot.finished, vec![build]);

        assert_eq!(registry.reap(&snapshot.finished), 1);
        assert_eq!(registry.entry_count(), 1);

        registry.mark_finished(test);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.running, 0);
        registry.reap(&snapshot.finished);
        assert_eq!(registry.entry_count(), 0);
    }

    #[test]
    fn reap_ignores_running_entries() {
        let registry = JobRegistry::new();
        let id = registry.register();
        assert_eq!(registry.reap(&[id]), 0);
        assert_eq!(registry.snapshot().running, 1);
    }

    #[test]
    fn concurrent_registration_yields_unique_ids() {
        let registry = Arc::new(JobRegistry::new());
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..250)
                        .map(|_| {
                            let id = registry.register();
                            registry.mark_finished(id);
                            id
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let ids: HashSet<JobId> = workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect();
        assert_eq!(ids.len(), 2_000);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.running, 0);
        assert_eq!(snapshot.finished.len(), 2_000);
    }
}
