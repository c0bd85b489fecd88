//! Coordination session: job assignment and the ready/done barriers.
//!
//! A session moves through
//! `Assigning -> AwaitingReady -> Released -> AwaitingDone -> Complete`,
//! driven only by counting distinct callers against the number of worker
//! slots declared by the jobs. `Complete` is terminal.

use dashmap::DashMap;
use fleetload_types::{Endpoint, Identity, JobConfiguration, WorkerAssignment};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised by a coordination session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("no such job: {0}")]
    UnknownJob(String),

    #[error("job {0} is configured more than once")]
    DuplicateJob(String),
}

/// Where a session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Assignments are still being handed out.
    Assigning,
    /// Nothing is left to assign; waiting for the fleet to report ready.
    AwaitingReady,
    /// The ready barrier has opened; workers are sending.
    Released,
    /// At least one worker reported done.
    AwaitingDone,
    /// Every worker reported done.
    Complete,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Assigning => "assigning",
            Phase::AwaitingReady => "awaiting_ready",
            Phase::Released => "released",
            Phase::AwaitingDone => "awaiting_done",
            Phase::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Snapshot of a session, served on `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub phase: Phase,
    pub total_workers: usize,
    pub assigned: usize,
    pub ready: usize,
    pub done: usize,
    pub remaining_work: BTreeMap<String, u64>,
}

#[derive(Default)]
struct AssignmentState {
    issued: usize,
    job_index: usize,
    slots_used: usize,
    exhausted: bool,
    by_caller: HashMap<String, WorkerAssignment>,
}

/// Set of distinct arrivals that opens once it reaches its size.
#[derive(Default)]
struct Barrier {
    members: HashSet<String>,
    released: bool,
}

impl Barrier {
    fn arrive(&mut self, id: &str, size: usize) -> bool {
        if !self.members.contains(id) {
            self.members.insert(id.to_string());
        }
        if self.members.len() >= size {
            self.released = true;
        }
        self.released
    }
}

/// Single source of truth for assignments and barriers.
///
/// Every counter has its own lock: the assignment cursor, each barrier, and
/// one map entry per job for the remaining work units.
pub struct CoordinatorSession {
    jobs: Vec<JobConfiguration>,
    identities: Vec<Identity>,
    endpoints: Vec<Endpoint>,
    total_workers: usize,
    assignments: Mutex<AssignmentState>,
    ready: Mutex<Barrier>,
    done: Mutex<Barrier>,
    remaining: DashMap<String, u64>,
}

impl CoordinatorSession {
    /// Create a session over the given jobs and pools.
    pub fn new(
        jobs: Vec<JobConfiguration>,
        identities: Vec<Identity>,
        endpoints: Vec<Endpoint>,
    ) -> Result<Self, SessionError> {
        let remaining = DashMap::new();
        for job in &jobs {
            if remaining.insert(job.name.clone(), job.count).is_some() {
                return Err(SessionError::DuplicateJob(job.name.clone()));
            }
        }

        let total_workers = jobs.iter().map(|job| job.workers).sum();
        if identities.len() < total_workers {
            warn!(
                identities = identities.len(),
                total_workers, "fewer identities than worker slots, the ready barrier cannot open"
            );
        }
        if endpoints.is_empty() {
            warn!("no endpoints configured, nothing will be assigned");
        }

        info!(
            jobs = jobs.len(),
            identities = identities.len(),
            endpoints = endpoints.len(),
            total_workers,
            "coordination session created"
        );

        Ok(Self {
            jobs,
            identities,
            endpoints,
            total_workers,
            assignments: Mutex::new(AssignmentState::default()),
            ready: Mutex::new(Barrier::default()),
            done: Mutex::new(Barrier::default()),
            remaining,
        })
    }

    /// Number of worker slots over all jobs.
    pub fn total_workers(&self) -> usize {
        self.total_workers
    }

    pub fn jobs(&self) -> &[JobConfiguration] {
        &self.jobs
    }

    /// Hand the next assignment to `caller`.
    ///
    /// A caller asking again before release gets its earlier assignment.
    /// Returns `None` once identities or job slots run out, and for every
    /// caller once the ready barrier has opened.
    pub fn assign(&self, caller: &str) -> Option<WorkerAssignment> {
        if self.ready.lock().released {
            info!(caller, "assignment requested after release");
            return None;
        }

        let mut state = self.assignments.lock();
        if let Some(previous) = state.by_caller.get(caller) {
            debug!(caller, "repeating earlier assignment");
            return Some(previous.clone());
        }

        while state.job_index < self.jobs.len()
            && state.slots_used >= self.jobs[state.job_index].workers
        {
            state.job_index += 1;
            state.slots_used = 0;
        }

        if state.issued >= self.identities.len()
            || state.job_index >= self.jobs.len()
            || self.endpoints.is_empty()
        {
            if !state.exhausted {
                info!(issued = state.issued, "assignments exhausted");
                state.exhausted = true;
            }
            return None;
        }

        let job = &self.jobs[state.job_index];
        let assignment = WorkerAssignment {
            account: self.identities[state.issued].clone(),
            endpoint: self.endpoints[state.issued % self.endpoints.len()].clone(),
            name: job.name.clone(),
            data: job.data.clone(),
        };
        state.issued += 1;
        state.slots_used += 1;
        state
            .by_caller
            .insert(caller.to_string(), assignment.clone());

        info!(
            caller,
            job = %assignment.name,
            identity = %assignment.account,
            endpoint = %assignment.endpoint,
            "assigned worker"
        );
        Some(assignment)
    }

    /// Record that `id` is ready; `true` once every worker is.
    pub fn ready(&self, id: &str) -> bool {
        let released = self.ready.lock().arrive(id, self.total_workers);
        debug!(id, released, "worker ready");
        released
    }

    /// Claim one work unit of `job`; `false` when none is left.
    pub fn work(&self, job: &str) -> Result<bool, SessionError> {
        let mut remaining = self
            .remaining
            .get_mut(job)
            .ok_or_else(|| SessionError::UnknownJob(job.to_string()))?;
        if *remaining == 0 {
            return Ok(false);
        }
        *remaining -= 1;
        debug!(job, remaining = *remaining, "work unit claimed");
        Ok(true)
    }

    /// Record that `id` is done; `true` once every worker is.
    pub fn done(&self, id: &str) -> bool {
        let complete = self.done.lock().arrive(id, self.total_workers);
        debug!(id, complete, "worker done");
        complete
    }

    pub fn phase(&self) -> Phase {
        let done = self.done.lock();
        if done.released {
            return Phase::Complete;
        }
        let ready = self.ready.lock();
        if ready.released {
            return if done.members.is_empty() {
                Phase::Released
            } else {
                Phase::AwaitingDone
            };
        }
        let assignments = self.assignments.lock();
        if assignments.exhausted
            || assignments.issued >= self.total_workers
            || !ready.members.is_empty()
        {
            Phase::AwaitingReady
        } else {
            Phase::Assigning
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: self.phase(),
            total_workers: self.total_workers,
            assigned: self.assignments.lock().issued,
            ready: self.ready.lock().members.len(),
            done: self.done.lock().members.len(),
            remaining_work: self
                .remaining
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn identities(n: usize) -> Vec<Identity> {
        (0..n).map(|i| Identity::new(format!("key{i}"))).collect()
    }

    fn endpoints(n: usize) -> Vec<Endpoint> {
        (0..n)
            .map(|i| Endpoint::new(format!("http://node{i}")))
            .collect()
    }

    fn session(jobs: Vec<JobConfiguration>, keys: usize, nodes: usize) -> CoordinatorSession {
        CoordinatorSession::new(jobs, identities(keys), endpoints(nodes)).unwrap()
    }

    #[test]
    fn test_assignments_are_distinct_and_round_robin() {
        let session = session(vec![JobConfiguration::new("fixed", 3, 10)], 5, 2);

        let a = session.assign("a").unwrap();
        let b = session.assign("b").unwrap();
        let c = session.assign("c").unwrap();

        assert_eq!(a.account, Identity::new("key0"));
        assert_eq!(b.account, Identity::new("key1"));
        assert_eq!(c.account, Identity::new("key2"));
        assert_eq!(a.endpoint, Endpoint::new("http://node0"));
        assert_eq!(b.endpoint, Endpoint::new("http://node1"));
        assert_eq!(c.endpoint, Endpoint::new("http://node0"));
    }

    #[test]
    fn test_jobs_fill_sequentially() {
        let jobs = vec![
            JobConfiguration::new("first", 2, 1).with_data(json!({"x": 1})),
            JobConfiguration::new("second", 1, 1),
        ];
        let session = session(jobs, 3, 1);

        let names: Vec<String> = ["a", "b", "c"]
            .iter()
            .map(|caller| session.assign(caller).unwrap().name)
            .collect();
        assert_eq!(names, vec!["first", "first", "second"]);
        assert_eq!(session.assign("a").unwrap().data, json!({"x": 1}));
    }

    #[test]
    fn test_exhausted_pool_returns_none() {
        let session = session(vec![JobConfiguration::new("fixed", 5, 1)], 2, 1);
        assert!(session.assign("a").is_some());
        assert!(session.assign("b").is_some());
        assert!(session.assign("c").is_none());
        assert_eq!(session.phase(), Phase::AwaitingReady);
    }

    #[test]
    fn test_exhausted_jobs_return_none() {
        let session = session(vec![JobConfiguration::new("fixed", 1, 1)], 5, 1);
        assert!(session.assign("a").is_some());
        assert!(session.assign("b").is_none());
    }

    #[test]
    fn test_same_caller_gets_same_assignment() {
        let session = session(vec![JobConfiguration::new("fixed", 2, 1)], 2, 2);
        let first = session.assign("10.0.0.1").unwrap();
        let again = session.assign("10.0.0.1").unwrap();
        assert_eq!(first, again);

        let other = session.assign("10.0.0.2").unwrap();
        assert_ne!(first.account, other.account);
    }

    #[test]
    fn test_ready_is_idempotent_and_release_latches() {
        let session = session(vec![JobConfiguration::new("fixed", 2, 1)], 2, 1);
        session.assign("a");
        session.assign("b");

        assert!(!session.ready("a"));
        assert!(!session.ready("a"));
        assert_eq!(session.phase(), Phase::AwaitingReady);
        assert!(session.ready("b"));
        assert!(session.ready("a"));
        assert_eq!(session.phase(), Phase::Released);
    }

    #[test]
    fn test_no_assignment_after_release() {
        let session = session(vec![JobConfiguration::new("fixed", 1, 1)], 3, 1);
        session.assign("a").unwrap();
        assert!(session.ready("a"));
        assert!(session.assign("a").is_none());
        assert!(session.assign("late").is_none());
    }

    #[test]
    fn test_work_counts_down_to_zero() {
        let session = session(vec![JobConfiguration::new("fixed", 1, 2)], 1, 1);
        assert_eq!(session.work("fixed"), Ok(true));
        assert_eq!(session.work("fixed"), Ok(true));
        assert_eq!(session.work("fixed"), Ok(false));
        assert_eq!(session.work("fixed"), Ok(false));
        assert_eq!(
            session.work("missing"),
            Err(SessionError::UnknownJob("missing".into()))
        );
    }

    #[test]
    fn test_concurrent_work_never_overshoots() {
        let session = Arc::new(session(vec![JobConfiguration::new("fixed", 1, 100)], 1, 1));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = Arc::clone(&session);
                std::thread::spawn(move || {
                    let mut claimed = 0u64;
                    while session.work("fixed").unwrap() {
                        claimed += 1;
                    }
                    claimed
                })
            })
            .collect();
        let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 100);
        assert_eq!(session.status().remaining_work["fixed"], 0);
    }

    #[test]
    fn test_phases_through_completion() {
        let session = session(vec![JobConfiguration::new("fixed", 2, 1)], 2, 1);
        assert_eq!(session.phase(), Phase::Assigning);
        session.assign("a");
        assert_eq!(session.phase(), Phase::Assigning);
        session.assign("b");
        assert_eq!(session.phase(), Phase::AwaitingReady);
        session.ready("a");
        session.ready("b");
        assert_eq!(session.phase(), Phase::Released);
        assert!(!session.done("a"));
        assert_eq!(session.phase(), Phase::AwaitingDone);
        assert!(session.done("b"));
        assert_eq!(session.phase(), Phase::Complete);
    }

    #[test]
    fn test_duplicate_job_names_rejected() {
        let result = CoordinatorSession::new(
            vec![
                JobConfiguration::new("fixed", 1, 1),
                JobConfiguration::new("fixed", 1, 1),
            ],
            identities(2),
            endpoints(1),
        );
        assert!(matches!(result, Err(SessionError::DuplicateJob(name)) if name == "fixed"));
    }
}
