//! Coordinated worker run.
//!
//! A worker asks the coordinator for an assignment, generates its template,
//! meets the rest of the fleet at the ready barrier, sends one batch per
//! claimed work unit, optionally waits for inclusion and finally meets the
//! fleet at the done barrier.

use crate::client::CoordinatorClient;
use crate::config::{GeneratorConfig, SendConfig, WaitConfig};
use crate::endpoints::{EndpointPool, RotationPolicy};
use crate::error::GeneratorError;
use crate::generator::LoadGenerator;
use crate::loads::LoadRegistry;
use crate::network::{Network, TransactionAuthor};
use crate::report::WaitReport;
use crate::store::{LocalRecordStore, LocalTemplateStore};
use fleetload_types::{AccountId, Endpoint};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Why a worker run failed.
///
/// Failures before the ready barrier, including authoring the template,
/// mean the worker never started sending; the binary reports them with a
/// different exit code.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The coordinator handed out no assignment.
    #[error("coordinator refused to assign work")]
    Refused,

    #[error("worker initialization failed: {0}")]
    Init(#[source] GeneratorError),

    #[error("worker failed: {0}")]
    Run(#[source] GeneratorError),
}

impl WorkerError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            WorkerError::Refused | WorkerError::Init(_) => 2,
            WorkerError::Run(_) => 1,
        }
    }
}

/// Settings of a coordinated worker.
#[derive(Clone, Debug, Default)]
pub struct WorkerOptions {
    pub generator: GeneratorConfig,

    /// Batch sent for each claimed work unit.
    pub send: SendConfig,

    /// Inclusion wait after sending; `None` skips waiting.
    pub wait: Option<WaitConfig>,

    /// Endpoints to fall back on after the assigned one.
    pub extra_endpoints: Vec<Endpoint>,

    pub rotation: RotationPolicy,
}

/// What a completed worker run did.
#[derive(Debug, Clone)]
pub struct WorkerSummary {
    pub job: String,
    pub fee_payer: AccountId,
    pub work_units: u64,
    pub sent: u64,
    pub failed: u64,
    pub wait: Option<WaitReport>,
    pub cancelled: bool,
}

/// Run one worker against the coordinator.
pub async fn run_worker(
    client: &CoordinatorClient,
    registry: &LoadRegistry,
    network: Arc<dyn Network>,
    author: Arc<dyn TransactionAuthor>,
    options: &WorkerOptions,
    cancel: &CancellationToken,
) -> Result<WorkerSummary, WorkerError> {
    let assignment = client
        .assignment()
        .await
        .map_err(|e| WorkerError::Init(e.into()))?
        .ok_or(WorkerError::Refused)?;
    info!(
        job = %assignment.name,
        identity = %assignment.account,
        endpoint = %assignment.endpoint,
        "received assignment"
    );

    let load = registry
        .create(&assignment.name, &assignment.data)
        .map_err(WorkerError::Init)?;

    let mut endpoints = vec![assignment.endpoint.clone()];
    endpoints.extend(
        options
            .extra_endpoints
            .iter()
            .filter(|e| **e != assignment.endpoint)
            .cloned(),
    );
    let pool = EndpointPool::new(endpoints, options.rotation).map_err(WorkerError::Init)?;
    let mut generator = LoadGenerator::new(network, author, pool, options.generator.clone());

    let mut templates = LocalTemplateStore::new();
    let template = generator
        .generate(load.as_ref(), &mut templates, &assignment.account)
        .await
        .map_err(WorkerError::Init)?;
    let fee_payer = template.fee_payer().clone();
    let id = fee_payer.to_string();

    let released = client
        .notify_ready_and_wait(&id, cancel)
        .await
        .map_err(|e| WorkerError::Init(e.into()))?;

    let mut records = LocalRecordStore::new();
    let mut summary = WorkerSummary {
        job: assignment.name.clone(),
        fee_payer,
        work_units: 0,
        sent: 0,
        failed: 0,
        wait: None,
        cancelled: false,
    };
    if !released {
        warn!("worker interrupted at the ready barrier");
        summary.cancelled = true;
        client
            .done(&id)
            .await
            .map_err(|e| WorkerError::Run(e.into()))?;
        return Ok(summary);
    }

    while !cancel.is_cancelled() {
        let more = client
            .more_work(&assignment.name)
            .await
            .map_err(|e| WorkerError::Run(e.into()))?;
        if !more {
            break;
        }
        summary.work_units += 1;
        let report = generator
            .send_all(&mut templates, &mut records, &options.send, cancel)
            .await
            .map_err(WorkerError::Run)?;
        info!(unit = summary.work_units, sent = report.sent, "work unit finished");
        summary.sent += report.sent;
        summary.failed += report.failed;
    }

    if cancel.is_cancelled() {
        summary.cancelled = true;
        warn!("worker interrupted, skipping inclusion wait");
        client
            .done(&id)
            .await
            .map_err(|e| WorkerError::Run(e.into()))?;
        return Ok(summary);
    }

    if let Some(wait) = &options.wait {
        let report = generator
            .wait_all(&records, wait)
            .await
            .map_err(WorkerError::Run)?;
        summary.wait = Some(report);
    }

    if !client
        .notify_done_and_wait(&id, cancel)
        .await
        .map_err(|e| WorkerError::Run(e.into()))?
    {
        warn!("worker interrupted at the done barrier");
        summary.cancelled = true;
        return Ok(summary);
    }
    info!(work_units = summary.work_units, sent = summary.sent, "worker finished");
    Ok(summary)
}
