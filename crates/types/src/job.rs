//! Job configuration and worker assignment types.

use crate::{Endpoint, Identity};
use serde::{Deserialize, Serialize};

/// Request header identifying the calling worker to the coordinator and
/// the data service.
pub const WORKER_ID_HEADER: &str = "x-worker-id";

/// A job the coordinator hands out to workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfiguration {
    /// Name of the load descriptor workers run for this job.
    pub name: String,

    /// Number of workers taking part in the job.
    #[serde(alias = "workerCount")]
    pub workers: usize,

    /// Number of work units shared by the job's workers.
    #[serde(alias = "workUnitCount", default)]
    pub count: u64,

    /// Opaque, load-specific configuration.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl JobConfiguration {
    /// Create a job with no load-specific data.
    pub fn new(name: impl Into<String>, workers: usize, count: u64) -> Self {
        Self {
            name: name.into(),
            workers,
            count,
            data: serde_json::Value::Null,
        }
    }

    /// Attach load-specific data.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// What a single worker is told to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerAssignment {
    /// Identity the worker sends transactions as.
    pub account: Identity,

    /// Node endpoint the worker starts with.
    pub endpoint: Endpoint,

    /// Job (load descriptor) name.
    pub name: String,

    /// Job data, copied from the job configuration.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Body of `GET /init`: `{"config": ...}` or `{}` once nothing is left to assign.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<WorkerAssignment>,
}

/// Body of every non-2xx response of the coordinator and data services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
