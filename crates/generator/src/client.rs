//! Client of the coordinator service.

use crate::remote::{RemoteError, RemoteService};
use fleetload_types::{Endpoint, InitResponse, WorkerAssignment};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default time between two barrier polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Talks to the coordinator on behalf of one worker.
///
/// Every request carries the worker id, which the coordinator uses to make
/// assignment idempotent.
#[derive(Clone, Debug)]
pub struct CoordinatorClient {
    remote: RemoteService,
    poll_interval: Duration,
}

impl CoordinatorClient {
    pub fn new(base: Endpoint, worker_id: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        Ok(Self {
            remote: RemoteService::new(base, Some(worker_id.into()), timeout)?,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Set the time between two barrier polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn worker_id(&self) -> &str {
        self.remote.id().unwrap_or_default()
    }

    /// Ask for an assignment; `None` when the coordinator has nothing left.
    pub async fn assignment(&self) -> Result<Option<WorkerAssignment>, RemoteError> {
        let response: InitResponse = self.remote.get("/init").await?;
        Ok(response.config)
    }

    /// Report readiness; `true` once every worker is ready.
    pub async fn ready(&self, id: &str) -> Result<bool, RemoteError> {
        self.remote.get(&format!("/ready/{id}")).await
    }

    /// Report readiness and poll until the whole fleet is ready.
    ///
    /// Returns `false` when `cancel` fires before the barrier is released.
    pub async fn notify_ready_and_wait(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, RemoteError> {
        debug!(id, "notifying readiness");
        while !self.ready(id).await? {
            info!("other workers are not ready yet, waiting");
            if !self.pause(cancel).await {
                return Ok(false);
            }
        }
        debug!("all workers are ready");
        Ok(true)
    }

    /// Sleep one poll interval; `false` if cancelled meanwhile.
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.poll_interval) => true,
        }
    }

    /// Claim one work unit of `job`; `false` when none is left.
    pub async fn more_work(&self, job: &str) -> Result<bool, RemoteError> {
        self.remote.get(&format!("/work/{job}")).await
    }

    /// Report completion; `true` once every worker is done.
    pub async fn done(&self, id: &str) -> Result<bool, RemoteError> {
        self.remote.get(&format!("/done/{id}")).await
    }

    /// Report completion and poll until the whole fleet is done.
    ///
    /// Returns `false` when `cancel` fires before the barrier is released.
    pub async fn notify_done_and_wait(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, RemoteError> {
        debug!(id, "notifying completion");
        while !self.done(id).await? {
            info!("other workers are not done yet, waiting");
            if !self.pause(cancel).await {
                return Ok(false);
            }
        }
        debug!("all workers are done");
        Ok(true)
    }
}
