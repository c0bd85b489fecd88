//! Ordered pool of node endpoints with explicit rotation.
//!
//! The pool is owned by a single [`LoadGenerator`](crate::LoadGenerator);
//! the send loop and the retry helpers move it with the same
//! [`EndpointPool::advance`], so there is exactly one cursor per generator.

use crate::error::GeneratorError;
use crate::remote::{RemoteError, RemoteService};
use fleetload_types::Endpoint;
use tracing::debug;

/// What `advance` does after the last endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RotationPolicy {
    /// Start over from the first endpoint.
    #[default]
    Wrap,

    /// Fail with [`GeneratorError::EndpointsExhausted`].
    Exhaust,
}

/// Non-empty, ordered list of endpoints and the one currently in use.
#[derive(Clone, Debug)]
pub struct EndpointPool {
    endpoints: Vec<Endpoint>,
    current: usize,
    policy: RotationPolicy,
}

impl EndpointPool {
    /// Create a pool starting at the first endpoint.
    pub fn new(endpoints: Vec<Endpoint>, policy: RotationPolicy) -> Result<Self, GeneratorError> {
        if endpoints.is_empty() {
            return Err(GeneratorError::NoEndpoints);
        }
        Ok(Self {
            endpoints,
            current: 0,
            policy,
        })
    }

    /// Pool with a single endpoint.
    pub fn single(endpoint: Endpoint) -> Self {
        Self {
            endpoints: vec![endpoint],
            current: 0,
            policy: RotationPolicy::Wrap,
        }
    }

    /// Endpoint currently in use.
    pub fn current(&self) -> &Endpoint {
        &self.endpoints[self.current]
    }

    /// Move to the next endpoint according to the rotation policy.
    pub fn advance(&mut self) -> Result<&Endpoint, GeneratorError> {
        let next = self.current + 1;
        self.current = match self.policy {
            RotationPolicy::Wrap => next % self.endpoints.len(),
            RotationPolicy::Exhaust if next >= self.endpoints.len() => {
                return Err(GeneratorError::EndpointsExhausted(self.endpoints.len()))
            }
            RotationPolicy::Exhaust => next,
        };
        let endpoint = &self.endpoints[self.current];
        debug!(%endpoint, index = self.current, "switched endpoint");
        Ok(endpoint)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}

/// Fetch the endpoint list from the data service (`GET /nodes`).
///
/// The service rotates its list on every call, so consecutive workers start
/// on different nodes.
pub async fn fetch_remote_endpoints(remote: &RemoteService) -> Result<Vec<Endpoint>, RemoteError> {
    remote.get("/nodes").await
}
